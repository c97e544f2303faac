/// Status byte for a deleted file, also fill value for unused blocks.
pub const DELETED: u8 = 0xe5;
/// Largest possible user number plus one
pub const USER_END: u8 = 0x10;
/// Unit of data transfer in bytes as seen by the CP/M BDOS.
/// This was the sector size on the original 8 inch disks.
pub const RECORD_SIZE: usize = 128;
/// Size of the directory entry in bytes, always 32
pub const DIR_ENTRY_SIZE: usize = 32;
/// Characters forbidden from file names
pub const INVALID_CHARS: &str = " <>.,;:=?*[]";

// Apple II 5.25 inch disk parameters
pub const BLOCK_SIZE: usize = 1024;
pub const SECTOR_SIZE: usize = 256;
pub const SECTORS_PER_BLOCK: usize = BLOCK_SIZE/SECTOR_SIZE;
pub const RESERVED_TRACKS: usize = 3;
pub const TOTAL_BLOCKS: usize = 128;
pub const DIR_BLOCKS: usize = 2;
pub const DIR_ENTRIES: usize = DIR_BLOCKS*BLOCK_SIZE/DIR_ENTRY_SIZE;
/// Records in a full extent
pub const MAX_RECORDS: u8 = 0x80;
/// Extent numbers run up to 31 on CP/M 2
pub const MAX_EXTENT: u8 = 31;
