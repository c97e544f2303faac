//! ### ProDOS directory structures
//!
//! A directory is a chain of 512 byte blocks, each holding two link pointers and 13 slots
//! of 39 bytes.  The first slot of the key block is the directory header, which is a
//! `VolDirHeader` for the volume directory or a `SubDirHeader` for a subdirectory.

use chrono::NaiveDateTime;
use a2kit_macro::{DiskStruct,DiskStructError};
use a2kit_macro_derive::DiskStruct;
use super::types::*;
use super::pack::*;

#[derive(DiskStruct,Clone,Copy,Debug,PartialEq)]
pub struct VolDirHeader {
    pub stor_len_nibs: u8,
    pub name: [u8;15],
    pub pad1: [u8;8],
    pub create_time: [u8;4],
    pub vers: u8,
    pub min_vers: u8,
    pub access: u8,
    pub entry_len: u8,
    pub entries_per_block: u8,
    pub file_count: [u8;2],
    pub bitmap_ptr: [u8;2],
    pub total_blocks: [u8;2]
}

#[derive(DiskStruct,Clone,Copy,Debug,PartialEq)]
pub struct SubDirHeader {
    pub stor_len_nibs: u8,
    pub name: [u8;15],
    pub pad1: [u8;8], // first byte must be 0x75
    pub create_time: [u8;4],
    pub vers: u8,
    pub min_vers: u8,
    pub access: u8,
    pub entry_len: u8,
    pub entries_per_block: u8,
    pub file_count: [u8;2],
    pub parent_ptr: [u8;2],
    pub parent_entry_num: u8,
    pub parent_entry_len: u8
}

#[derive(DiskStruct,Clone,Copy,Debug,PartialEq)]
pub struct Entry {
    pub stor_len_nibs: u8,
    pub name: [u8;15],
    pub file_type: u8,
    pub key_ptr: [u8;2],
    pub blocks_used: [u8;2],
    pub eof: [u8;3],
    pub create_time: [u8;4],
    pub vers: u8,
    pub min_vers: u8,
    pub access: u8,
    pub aux_type: [u8;2],
    pub last_mod: [u8;4],
    pub header_ptr: [u8;2]
}

impl Entry {
    pub fn storage_type(&self) -> u8 {
        self.stor_len_nibs >> 4
    }
    pub fn is_active(&self) -> bool {
        self.storage_type() > 0
    }
    pub fn change_storage_type(&mut self,stype: StorageType) {
        self.stor_len_nibs = (self.stor_len_nibs & 0x0f) + ((stype as u8) << 4);
    }
    pub fn name(&self) -> String {
        file_name_to_string(self.stor_len_nibs,self.name)
    }
    pub fn rename(&mut self,new_name: &str) -> Result<(),crate::fs::Error> {
        let (nibs,fname) = string_to_file_name(StorageType::Inactive,new_name)?;
        self.stor_len_nibs = (self.stor_len_nibs & 0xf0) + nibs;
        self.name = fname;
        Ok(())
    }
    pub fn get_ptr(&self) -> u16 {
        u16::from_le_bytes(self.key_ptr)
    }
    pub fn set_ptr(&mut self,ptr: u16) {
        self.key_ptr = u16::to_le_bytes(ptr);
    }
    pub fn eof(&self) -> usize {
        u32::from_le_bytes([self.eof[0],self.eof[1],self.eof[2],0]) as usize
    }
    pub fn set_eof(&mut self,eof: usize) {
        let bytes = u32::to_le_bytes(eof as u32);
        self.eof = [bytes[0],bytes[1],bytes[2]];
    }
    pub fn aux(&self) -> u16 {
        u16::from_le_bytes(self.aux_type)
    }
    pub fn blocks_used(&self) -> u16 {
        u16::from_le_bytes(self.blocks_used)
    }
    pub fn set_blocks_used(&mut self,blocks: u16) {
        self.blocks_used = u16::to_le_bytes(blocks);
    }
    pub fn can(&self,what: Access) -> bool {
        self.access & what as u8 > 0
    }
    /// Locked means writing is disabled
    pub fn is_locked(&self) -> bool {
        !self.can(Access::Write)
    }
    pub fn created(&self) -> Option<NaiveDateTime> {
        unpack_time(self.create_time)
    }
    pub fn modified(&self) -> Option<NaiveDateTime> {
        unpack_time(self.last_mod)
    }
    /// Fresh entry for an empty file or directory
    pub fn create(stype: StorageType,name: &str,file_type: u8,key: u16,header_ptr: u16) -> Result<Self,crate::fs::Error> {
        let (stor_len_nibs,name) = string_to_file_name(stype,name)?;
        let now = pack_time(None);
        let mut ans = Self::new();
        ans.stor_len_nibs = stor_len_nibs;
        ans.name = name;
        ans.file_type = file_type;
        ans.set_ptr(key);
        ans.set_blocks_used(1);
        ans.create_time = now;
        ans.last_mod = now;
        ans.access = STD_ACCESS;
        ans.header_ptr = u16::to_le_bytes(header_ptr);
        Ok(ans)
    }
}

impl VolDirHeader {
    pub fn total_blocks(&self) -> usize {
        u16::from_le_bytes(self.total_blocks) as usize
    }
    pub fn bitmap_ptr(&self) -> u16 {
        u16::from_le_bytes(self.bitmap_ptr)
    }
    pub fn name(&self) -> String {
        file_name_to_string(self.stor_len_nibs,self.name)
    }
}

/// One block of any directory, slot 0 of a key block is the header
#[derive(Clone)]
pub struct DirBlock {
    pub prev: u16,
    pub next: u16,
    slots: Vec<[u8;ENTRY_LEN]>
}

impl DiskStruct for DirBlock {
    fn new() -> Self {
        Self {
            prev: 0,
            next: 0,
            slots: vec![[0;ENTRY_LEN];ENTRIES_PER_BLOCK]
        }
    }
    fn from_bytes(dat: &[u8]) -> Result<Self,DiskStructError> {
        let mut ans = Self::new();
        ans.update_from_bytes(dat)?;
        Ok(ans)
    }
    fn to_bytes(&self) -> Vec<u8> {
        let mut ans = [u16::to_le_bytes(self.prev),u16::to_le_bytes(self.next)].concat();
        for slot in &self.slots {
            ans.extend_from_slice(slot);
        }
        ans.push(0);
        ans
    }
    fn update_from_bytes(&mut self,dat: &[u8]) -> Result<(),DiskStructError> {
        if dat.len() < BLOCK_SIZE {
            return Err(DiskStructError::UnexpectedSize);
        }
        self.prev = u16::from_le_bytes([dat[0],dat[1]]);
        self.next = u16::from_le_bytes([dat[2],dat[3]]);
        for i in 0..ENTRIES_PER_BLOCK {
            self.slots[i].copy_from_slice(&dat[4+i*ENTRY_LEN..4+(i+1)*ENTRY_LEN]);
        }
        Ok(())
    }
    fn len(&self) -> usize {
        BLOCK_SIZE
    }
}

impl DirBlock {
    pub fn entry(&self,idx: usize) -> Entry {
        // slots are always ENTRY_LEN bytes
        Entry::from_bytes(&self.slots[idx]).unwrap_or(Entry::new())
    }
    pub fn set_entry(&mut self,idx: usize,entry: &Entry) {
        self.slots[idx].copy_from_slice(&entry.to_bytes());
    }
    pub fn vol_header(&self) -> VolDirHeader {
        VolDirHeader::from_bytes(&self.slots[0]).unwrap_or(VolDirHeader::new())
    }
    pub fn sub_header(&self) -> SubDirHeader {
        SubDirHeader::from_bytes(&self.slots[0]).unwrap_or(SubDirHeader::new())
    }
    /// `header` is the flattened volume or subdirectory header
    pub fn set_header(&mut self,header: &[u8]) {
        self.slots[0].copy_from_slice(&header[0..ENTRY_LEN]);
    }
    /// Storage type of the header, only meaningful for a key block
    pub fn header_type(&self) -> u8 {
        self.slots[0][0] >> 4
    }
    pub fn file_count(&self) -> u16 {
        u16::from_le_bytes([self.slots[0][0x21],self.slots[0][0x22]])
    }
    pub fn set_file_count(&mut self,count: u16) {
        self.slots[0][0x21..0x23].copy_from_slice(&u16::to_le_bytes(count));
    }
}
