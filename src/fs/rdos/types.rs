use num_derive::FromPrimitive;
use std::str::FromStr;
use a2kit_macro::{DiskStruct,DiskStructError};
use a2kit_macro_derive::DiskStruct;
use crate::fs::Error;

/// RDOS works in 256 byte sectors, which it calls blocks
pub const BLOCK_SIZE: usize = 256;
pub const SECTORS_PER_TRACK: usize = 13;
pub const TRACKS: usize = 35;
pub const TOTAL_BLOCKS: usize = TRACKS*SECTORS_PER_TRACK;
pub const CATALOG_START: usize = 13;
pub const CATALOG_BLOCKS: usize = 10;
pub const ENTRY_SIZE: usize = 32;
pub const ENTRIES_PER_BLOCK: usize = BLOCK_SIZE/ENTRY_SIZE;
pub const MAX_ENTRIES: usize = CATALOG_BLOCKS*ENTRIES_PER_BLOCK;
/// blocks up to the end of the catalog, held by the system entry
pub const RESERVED_BLOCKS: usize = CATALOG_START + CATALOG_BLOCKS;
pub const NAME_LEN: usize = 24;
pub const SYSTEM_NAME: &str = "RDOS 2.1 COPYRIGHT 1981";
pub const DELETED: u8 = 0x80;
pub const UNUSED: u8 = 0x00;

/// File types are stored as negative ASCII
#[derive(FromPrimitive,Clone,Copy,Debug,PartialEq)]
pub enum FileType {
    Applesoft = 0xc1,
    Binary = 0xc2,
    Text = 0xd4
}

impl FileType {
    pub fn mnemonic(code: u8) -> String {
        match code {
            0xa0..=0xfe => ((code & 0x7f) as char).to_string(),
            _ => format!("${:02X}",code)
        }
    }
}

impl FromStr for FileType {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self,Self::Err> {
        match s.to_uppercase().as_str() {
            "A" => Ok(Self::Applesoft),
            "B" => Ok(Self::Binary),
            "T" => Ok(Self::Text),
            _ => Err(Error::BadFileType)
        }
    }
}

#[derive(DiskStruct,Clone,Copy,Debug,PartialEq)]
pub struct CatalogEntry {
    pub name: [u8;24], // negative ASCII padded with spaces
    pub file_type: u8,
    pub num_sectors: u8,
    pub load_addr: [u8;2],
    pub eof: [u8;2],
    pub start: [u8;2]
}

impl CatalogEntry {
    pub fn is_live(&self) -> bool {
        self.name[0]!=UNUSED && self.name[0]!=DELETED
    }
    pub fn start(&self) -> usize {
        u16::from_le_bytes(self.start) as usize
    }
    pub fn end(&self) -> usize {
        self.start() + self.num_sectors as usize
    }
}

pub fn is_name_valid(s: &str) -> bool {
    s.len() > 0 && s.len() <= NAME_LEN && !s.starts_with(' ')
        && s.chars().all(|c| c.is_ascii() && !c.is_ascii_control())
}

pub fn file_name_to_string(fname: &[u8]) -> String {
    fname.iter().map(|c| (c & 0x7f) as char).collect::<String>().trim_end().to_string()
}

pub fn string_to_file_name(s: &str) -> Result<[u8;NAME_LEN],Error> {
    if !is_name_valid(s) {
        return Err(Error::BadName);
    }
    let mut ans = [0xa0;NAME_LEN];
    for (i,c) in s.to_uppercase().bytes().enumerate() {
        ans[i] = c | 0x80;
    }
    Ok(ans)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn names_and_types() {
        let fname = string_to_file_name("hello world").unwrap();
        assert_eq!(fname[0],0xc8);
        assert_eq!(fname[23],0xa0);
        assert_eq!(file_name_to_string(&fname),"HELLO WORLD");
        assert_eq!(string_to_file_name(&"X".repeat(25)),Err(Error::BadName));
        assert_eq!(FileType::from_str("t"),Ok(FileType::Text));
        assert_eq!(FileType::mnemonic(0xc2),"B");
    }
}
