//! # Disk Image Module
//!
//! Disk images are represented by objects implementing the `DiskImage` trait.
//! The object type is named for the physical ordering it handles, e.g., `DosOrder`.
//! Each one owns an `ImageLayout`, i.e., the raw bytes of the image file after any
//! container (gzip, 2IMG) has been stripped.
//!
//! ## Basic Functions
//!
//! The trait includes reading and writing 256 byte sectors and 512 byte blocks.
//! Every ordering accepts both addressing styles, translating one into the other through
//! the tables in `bios::skew`.  An address outside the geometry, or an offset outside the
//! buffer, is refused with `Error::OutOfRange`.  Nothing is ever clamped.
//!
//! ## Relation to File Systems
//!
//! The `ImageOrder` enumeration wraps the concrete orderings.  File systems hold it through
//! a `SharedImage`, which lets two logical volumes (UniDOS, OzDOS) overlay one physical image.
//! The `fs` modules never touch the raw buffer, they only ask for sectors or blocks.

pub mod layout;
pub mod dot2mg;
pub mod dsk_do;
pub mod dsk_po;
pub mod nib;

use std::cell::RefCell;
use std::rc::Rc;
use std::fmt;
use crate::{STDRESULT,DYNERR};

pub use layout::ImageLayout;

/// Bytes in a DOS 3.3 sector
pub const SECTOR_SIZE: usize = 256;
/// Bytes in a ProDOS block
pub const BLOCK_SIZE: usize = 512;
/// Bytes in a 35 track, 16 sector floppy
pub const DSK_140K: usize = 143360;
/// Bytes in a 40 track, 16 sector floppy
pub const DSK_160K: usize = 163840;
/// Bytes in an 800K 3.5 inch disk
pub const DSK_800K: usize = 819200;

/// Enumerates disk image errors.  The `Display` trait will print equivalent long message.
#[derive(thiserror::Error,Debug,PartialEq)]
pub enum Error {
    #[error("RANGE ERROR")]
    OutOfRange,
    #[error("image size did not match the request")]
    ImageSizeMismatch,
    #[error("image type not compatible with request")]
    ImageTypeMismatch,
    #[error("WRITE PROTECTED")]
    WriteProtected,
    #[error("unknown container format")]
    UnknownContainer
}

/// Errors pertaining to nibble encoding
#[derive(thiserror::Error,Debug,PartialEq)]
pub enum NibbleError {
    #[error("invalid byte while decoding")]
    InvalidByte,
    #[error("bad checksum found in a sector")]
    BadChecksum,
    #[error("sector not found")]
    SectorNotFound
}

/// Enumerates the physical orderings
#[derive(PartialEq,Eq,Clone,Copy,Debug)]
pub enum DiskImageType {
    DO,
    PO,
    NIB
}

impl fmt::Display for DiskImageType {
    fn fmt(&self,f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DO => write!(f,"DOS ordered"),
            Self::PO => write!(f,"ProDOS ordered"),
            Self::NIB => write!(f,"nibble")
        }
    }
}

/// The main trait for working with any kind of disk image.
/// Reads take `&self`, only writes mutate the image.
pub trait DiskImage {
    fn what_am_i(&self) -> DiskImageType;
    fn file_extensions(&self) -> Vec<String>;
    fn layout(&self) -> &ImageLayout;
    fn layout_mut(&mut self) -> &mut ImageLayout;
    /// Number of 16 sector tracks the image can address
    fn track_count(&self) -> usize;
    /// Number of 512 byte blocks the image can address
    fn block_count(&self) -> usize;
    /// Size of the decoded buffer in bytes, for nibble images this is the nibble buffer
    fn physical_size(&self) -> usize {
        self.layout().len()
    }
    /// Logical capacity in bytes
    fn byte_capacity(&self) -> usize {
        self.block_count() * BLOCK_SIZE
    }
    /// Read a 256 byte sector, `sector` is a DOS 3.3 logical sector
    fn read_sector(&self,track: usize,sector: usize) -> Result<Vec<u8>,DYNERR>;
    /// Write a 256 byte sector, `dat` is padded or truncated to fit
    fn write_sector(&mut self,track: usize,sector: usize,dat: &[u8]) -> STDRESULT;
    /// Read a 512 byte block
    fn read_block(&self,block: usize) -> Result<Vec<u8>,DYNERR>;
    /// Write a 512 byte block, `dat` is padded or truncated to fit
    fn write_block(&mut self,block: usize,dat: &[u8]) -> STDRESULT;
}

/// Physical ordering of an image, owns the image buffer
pub enum ImageOrder {
    Dos(dsk_do::DosOrder),
    Prodos(dsk_po::ProdosOrder),
    Nibble(nib::NibbleOrder)
}

/// Handle used by file systems, two volumes can share one image
pub type SharedImage = Rc<RefCell<ImageOrder>>;

impl ImageOrder {
    pub fn share(self) -> SharedImage {
        Rc::new(RefCell::new(self))
    }
    fn inner(&self) -> &dyn DiskImage {
        match self {
            Self::Dos(img) => img,
            Self::Prodos(img) => img,
            Self::Nibble(img) => img
        }
    }
    fn inner_mut(&mut self) -> &mut dyn DiskImage {
        match self {
            Self::Dos(img) => img,
            Self::Prodos(img) => img,
            Self::Nibble(img) => img
        }
    }
    /// Take the layout back, e.g., to try it with another ordering
    pub fn into_layout(self) -> ImageLayout {
        match self {
            Self::Dos(img) => img.into_layout(),
            Self::Prodos(img) => img.into_layout(),
            Self::Nibble(img) => img.into_layout()
        }
    }
}

impl DiskImage for ImageOrder {
    fn what_am_i(&self) -> DiskImageType {
        self.inner().what_am_i()
    }
    fn file_extensions(&self) -> Vec<String> {
        self.inner().file_extensions()
    }
    fn layout(&self) -> &ImageLayout {
        self.inner().layout()
    }
    fn layout_mut(&mut self) -> &mut ImageLayout {
        self.inner_mut().layout_mut()
    }
    fn track_count(&self) -> usize {
        self.inner().track_count()
    }
    fn block_count(&self) -> usize {
        self.inner().block_count()
    }
    fn read_sector(&self,track: usize,sector: usize) -> Result<Vec<u8>,DYNERR> {
        self.inner().read_sector(track,sector)
    }
    fn write_sector(&mut self,track: usize,sector: usize,dat: &[u8]) -> STDRESULT {
        self.inner_mut().write_sector(track,sector,dat)
    }
    fn read_block(&self,block: usize) -> Result<Vec<u8>,DYNERR> {
        self.inner().read_block(block)
    }
    fn write_block(&mut self,block: usize,dat: &[u8]) -> STDRESULT {
        self.inner_mut().write_block(block,dat)
    }
}

/// Pad with zeros or truncate the data to the given size
pub fn quantize_block(src: &[u8],size: usize) -> Vec<u8> {
    let mut padded: Vec<u8> = Vec::new();
    for i in 0..size {
        if i<src.len() {
            padded.push(src[i])
        } else {
            padded.push(0);
        }
    }
    return padded;
}

/// Is this the size of a 5.25 inch 16 sector image (35 or 40 tracks)
pub fn is_dos_size(len: usize) -> bool {
    len==DSK_140K || len==DSK_160K
}
