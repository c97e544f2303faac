//! ### Pascal directory structures
//! The directory is the volume header followed immediately by packed entries.
//! Entries are allowed to cross block boundaries.

use a2kit_macro::{DiskStruct,DiskStructError};
use a2kit_macro_derive::DiskStruct;
use super::types::*;

#[derive(DiskStruct,Clone,Copy,Debug,PartialEq)]
pub struct VolDirHeader {
    pub begin_block: [u8;2],
    pub end_block: [u8;2],
    pub file_type: [u8;2],
    pub name_len: u8, // LS 3 bits, max 7
    pub name: [u8;7],
    pub total_blocks: [u8;2],
    pub num_files: [u8;2],
    pub last_access_date: [u8;2],
    pub last_set_date: [u8;2],
    pub pad: [u8;4]
}

#[derive(DiskStruct,Clone,Copy,Debug,PartialEq)]
pub struct DirectoryEntry {
    pub begin_block: [u8;2],
    pub end_block: [u8;2],
    pub file_type: [u8;2],
    pub name_len: u8, // LS 4 bits, max 15
    pub name: [u8;15],
    pub bytes_remaining: [u8;2],
    pub mod_date: [u8;2]
}

impl DirectoryEntry {
    pub fn begin(&self) -> u16 {
        u16::from_le_bytes(self.begin_block)
    }
    pub fn end(&self) -> u16 {
        u16::from_le_bytes(self.end_block)
    }
    /// bytes in the file, the last block holds `bytes_remaining`
    pub fn eof(&self) -> usize {
        let blocks = self.end().saturating_sub(self.begin()) as usize;
        match blocks {
            0 => 0,
            n => (n-1)*BLOCK_SIZE + u16::from_le_bytes(self.bytes_remaining) as usize
        }
    }
}

impl VolDirHeader {
    pub fn total_blocks(&self) -> usize {
        u16::from_le_bytes(self.total_blocks) as usize
    }
    pub fn num_files(&self) -> usize {
        u16::from_le_bytes(self.num_files) as usize
    }
}

/// Header plus the live entries, the directory has no gaps
pub struct Directory {
    pub header: VolDirHeader,
    pub entries: Vec<DirectoryEntry>
}

impl DiskStruct for Directory {
    fn new() -> Self {
        Self {
            header: VolDirHeader::new(),
            entries: Vec::new()
        }
    }
    fn from_bytes(dat: &[u8]) -> Result<Self,DiskStructError> {
        let mut ans = Self::new();
        ans.update_from_bytes(dat)?;
        Ok(ans)
    }
    fn to_bytes(&self) -> Vec<u8> {
        let mut ans = self.header.to_bytes();
        for entry in &self.entries {
            ans.append(&mut entry.to_bytes());
        }
        ans
    }
    /// Entry count is taken from the header
    fn update_from_bytes(&mut self,dat: &[u8]) -> Result<(),DiskStructError> {
        if dat.len() < ENTRY_SIZE {
            return Err(DiskStructError::UnexpectedSize);
        }
        self.header.update_from_bytes(&dat[0..ENTRY_SIZE])?;
        let count = self.header.num_files();
        if count > MAX_FILES {
            return Err(DiskStructError::UnexpectedValue);
        }
        if dat.len() < (count+1)*ENTRY_SIZE {
            return Err(DiskStructError::UnexpectedSize);
        }
        self.entries = Vec::new();
        for i in 1..=count {
            self.entries.push(DirectoryEntry::from_bytes(&dat[i*ENTRY_SIZE..(i+1)*ENTRY_SIZE])?);
        }
        Ok(())
    }
    fn len(&self) -> usize {
        ENTRY_SIZE*(1 + self.entries.len())
    }
}
