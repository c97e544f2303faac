use num_derive::FromPrimitive;

pub const BLOCK_SIZE: usize = 512;
pub const VOL_KEY_BLOCK: u16 = 2;
/// volume directory blocks written by `format`
pub const VOL_DIR_BLOCKS: [u16;4] = [2,3,4,5];
pub const BITMAP_START: u16 = 6;
pub const ENTRY_LEN: usize = 0x27;
pub const ENTRIES_PER_BLOCK: usize = 13;
/// Destroy, Rename, Backup, Write, Read
pub const STD_ACCESS: u8 = 1+2+32+64+128;
/// the access bits cleared by locking
pub const LOCK_MASK: u8 = 2+64+128;
pub const MAX_DIRECTORY_REPS: usize = 1000;
/// largest file a tree can hold
pub const MAX_EOF: usize = 0xffffff;
pub const SEEDLING_MAX: usize = 512;
pub const SAPLING_MAX: usize = 256*512;
pub const DIR_FILE_TYPE: u8 = 0x0f;

#[derive(Clone,Copy,Debug,FromPrimitive,PartialEq)]
pub enum StorageType {
    Inactive = 0x00,
    Seedling = 0x01,
    Sapling = 0x02,
    Tree = 0x03,
    Pascal = 0x04,
    SubDirEntry = 0x0d,
    SubDirHeader = 0x0e,
    VolDirHeader = 0x0f
}

impl StorageType {
    /// Tier needed to hold `eof` bytes
    pub fn for_eof(eof: usize) -> Self {
        match eof {
            x if x <= SEEDLING_MAX => Self::Seedling,
            x if x <= SAPLING_MAX => Self::Sapling,
            _ => Self::Tree
        }
    }
}

#[derive(Clone,Copy,FromPrimitive)]
pub enum Access {
    Read = 0x01,
    Write = 0x02,
    Backup = 0x20,
    Rename = 0x40,
    Destroy = 0x80
}
