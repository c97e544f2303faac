//! ### CP/M directory structures
//!
//! The directory is nothing other than a packed sequence of 32 byte entries.
//! Each entry is an extent, i.e., a piece of the file holding up to 16K, so
//! all information about file locations is contained in the extents.

use a2kit_macro::{DiskStruct,DiskStructError};
use a2kit_macro_derive::DiskStruct;
use super::types::*;

/// The extent as it appears in the directory
#[derive(DiskStruct,Clone,Copy,Debug,PartialEq)]
pub struct Extent {
    pub user: u8, // 0-15 for a file extent, 0xe5 means unused or deleted
    pub name: [u8;8], // positive ASCII, high bits are attributes
    pub typ: [u8;3], // high bits are read only, system file, archived
    pub idx_low: u8,
    pub last_bytes: u8,
    pub idx_high: u8,
    pub last_records: u8, // records of 128 bytes used in this extent
    pub block_list: [u8;16] // 8-bit block pointers on a 140K disk
}

impl Extent {
    pub fn is_live(&self) -> bool {
        self.user < USER_END
    }
    /// Index of this extent within the file
    pub fn index(&self) -> usize {
        (self.idx_low & 0x1f) as usize + ((self.idx_high as usize) << 5)
    }
    /// Change only the lowest 7 bits (change name, keep flags)
    pub fn set_name(&mut self,name: [u8;8],typ: [u8;3]) {
        for i in 0..8 {
            self.name[i] = (name[i] & 0x7f) + (self.name[i] & 0x80);
        }
        for i in 0..3 {
            self.typ[i] = (typ[i] & 0x7f) + (self.typ[i] & 0x80);
        }
    }
    /// Name with the attribute bits stripped
    pub fn plain_name(&self) -> ([u8;8],[u8;3]) {
        let mut ans = ([0;8],[0;3]);
        for i in 0..8 {
            ans.0[i] = self.name[i] & 0x7f;
        }
        for i in 0..3 {
            ans.1[i] = self.typ[i] & 0x7f;
        }
        ans
    }
    /// The t1' attribute
    pub fn is_read_only(&self) -> bool {
        self.typ[0] & 0x80 > 0
    }
    pub fn set_read_only(&mut self,read_only: bool) {
        match read_only {
            true => self.typ[0] |= 0x80,
            false => self.typ[0] &= 0x7f
        }
    }
    /// Number of bytes held by this extent
    pub fn data_len(&self) -> usize {
        usize::min(self.last_records as usize,MAX_RECORDS as usize) * RECORD_SIZE
    }
    /// Block pointers for the records that are in use
    pub fn blocks(&self) -> Vec<u8> {
        let count = (self.data_len() + BLOCK_SIZE - 1) / BLOCK_SIZE;
        self.block_list[0..count].to_vec()
    }
    /// Passes if the entry could be a file extent
    pub fn is_plausible(&self) -> bool {
        let printable = self.name.iter().chain(self.typ.iter()).all(|c| (c & 0x7f) >= 0x20 && (c & 0x7f) < 0x7f);
        printable && self.idx_low <= MAX_EXTENT && self.idx_high==0 && self.last_records <= MAX_RECORDS
    }
}
