//! # File System Module
//! 
//! File system modules handle interactions with directories and files.  There is a sub-module for
//! each supported file system.
//! 
//! File systems are represented by the `DiskFS` trait.  Each implementation holds a `SharedImage`,
//! which it uses as storage, and an `Rc<Config>` with the lookup tables.  The `FormattedVolume`
//! enumeration wraps the implementations so that a detected volume can be passed around by value.
//! 
//! Files and directories are represented by `FileEntry`, a snapshot of the directory entry taken
//! when the catalog was read.  The entry remembers where it came from (`EntryLocation`), so that
//! operations can go straight back to the right slot.  Before acting, every operation re-reads the
//! slot and compares the name; if the snapshot is stale the operation fails with `FileNotFound`.
//! 
//! Sector skews are not handled here.  Transformations that go between a file system and a disk,
//! such as sector skews, are kept in the `bios` module.

pub mod dos3x;
pub mod prodos;
pub mod pascal;
pub mod rdos;
pub mod cpm;

use std::fmt;
use bit_vec::BitVec;
use chrono::NaiveDateTime;
use log::error;
use crate::{STDRESULT,DYNERR};

/// Enumerates file system errors.  The `Display` trait will print equivalent long message.
#[derive(thiserror::Error,Debug,PartialEq)]
pub enum Error {
    #[error("DISK FULL")]
    DiskFull,
    #[error("FILE LOCKED")]
    Locked,
    #[error("file system structures are damaged")]
    CorruptFilesystem,
    #[error("operation not supported by this file system")]
    UnsupportedOperation,
    #[error("file system not compatible with request")]
    FormatMismatch,
    #[error("FILE NOT FOUND")]
    FileNotFound,
    #[error("DUPLICATE FILE NAME")]
    DuplicateFilename,
    #[error("SYNTAX ERROR")]
    BadName,
    #[error("FILE TYPE MISMATCH")]
    BadFileType,
    #[error("DIRECTORY FULL")]
    DirectoryFull,
    #[error("DIRECTORY NOT EMPTY")]
    DirectoryNotEmpty
}

/// Identifies a logical volume.  The UniDOS and OzDOS variants carry the volume index (0 or 1).
#[derive(Clone,Copy,Debug,PartialEq,Eq)]
pub enum FsKind {
    Dos33,
    UniDos(u8),
    OzDos(u8),
    Prodos,
    Pascal,
    Rdos,
    Cpm
}

impl fmt::Display for FsKind {
    fn fmt(&self,f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dos33 => write!(f,"DOS 3.3"),
            Self::UniDos(v) => write!(f,"UniDOS volume {}",v+1),
            Self::OzDos(v) => write!(f,"OzDOS volume {}",v+1),
            Self::Prodos => write!(f,"ProDOS"),
            Self::Pascal => write!(f,"Pascal"),
            Self::Rdos => write!(f,"RDOS"),
            Self::Cpm => write!(f,"CP/M")
        }
    }
}

/// Where a directory entry lives on the disk
#[derive(Clone,Debug,PartialEq)]
pub enum EntryLocation {
    /// catalog sector [track,sector], slot, first track/sector list [track,sector]
    Dos { catalog: [u8;2], idx: usize, tsl: [u8;2] },
    /// directory block, slot (0 is the header), key block, storage type
    Prodos { block: u16, idx: usize, key: u16, storage: u8 },
    /// slot (1 based, 0 is the volume header), extent [begin,end)
    Pascal { idx: usize, begin: u16, end: u16 },
    /// slot, first block, sector count
    Rdos { idx: usize, start: u16, count: u8 },
    /// user number, directory slots of every extent in order
    Cpm { user: u8, extents: Vec<usize> }
}

/// Snapshot of a directory entry
#[derive(Clone,Debug,PartialEq)]
pub struct FileEntry {
    pub fs: FsKind,
    pub name: String,
    /// file type mnemonic, e.g. `B` on DOS or `BIN` on ProDOS
    pub file_type: String,
    pub type_code: u8,
    /// load address or auxiliary type
    pub aux: u16,
    pub locked: bool,
    pub deleted: bool,
    pub directory: bool,
    /// length of the file data in bytes
    pub eof: usize,
    /// allocation units held by the file, including index or list sectors
    pub blocks: usize,
    pub created: Option<NaiveDateTime>,
    pub modified: Option<NaiveDateTime>,
    pub loc: EntryLocation
}

impl FileEntry {
    /// Metadata as a JSON object, raw codes are hex strings
    pub fn to_json_value(&self) -> json::JsonValue {
        let time_str = |t: &Option<NaiveDateTime>| match t {
            Some(t) => json::JsonValue::String(t.format("%Y/%m/%d %H:%M").to_string()),
            None => json::JsonValue::Null
        };
        json::object! {
            name: self.name.clone(),
            file_type: self.file_type.clone(),
            type_code: hex::encode_upper([self.type_code]),
            aux: hex::encode_upper(u16::to_be_bytes(self.aux)),
            locked: self.locked,
            deleted: self.deleted,
            directory: self.directory,
            eof: self.eof,
            blocks: self.blocks,
            created: time_str(&self.created),
            modified: time_str(&self.modified)
        }
    }
    /// Metadata as JSON, if indent=0 use unpretty form
    pub fn to_json(&self,indent: u16) -> String {
        match indent {
            0 => json::stringify(self.to_json_value()),
            _ => json::stringify_pretty(self.to_json_value(),indent)
        }
    }
}

/// Which allocation units are in use.  A set bit means the unit is used,
/// regardless of the polarity of the on-disk bitmap.
#[derive(Clone,Debug,PartialEq)]
pub struct UsageMap {
    bits: BitVec,
    unit_bytes: usize
}

impl UsageMap {
    /// all units start out free
    pub fn new(units: usize,unit_bytes: usize) -> Self {
        Self {
            bits: BitVec::from_elem(units,false),
            unit_bytes
        }
    }
    pub fn mark_used(&mut self,unit: usize) {
        if unit < self.bits.len() {
            self.bits.set(unit,true);
        }
    }
    pub fn mark_free(&mut self,unit: usize) {
        if unit < self.bits.len() {
            self.bits.set(unit,false);
        }
    }
    pub fn is_used(&self,unit: usize) -> bool {
        self.bits.get(unit).unwrap_or(false)
    }
    pub fn is_free(&self,unit: usize) -> bool {
        !self.is_used(unit)
    }
    pub fn len(&self) -> usize {
        self.bits.len()
    }
    pub fn unit_bytes(&self) -> usize {
        self.unit_bytes
    }
    pub fn count_used(&self) -> usize {
        self.bits.iter().filter(|b| *b).count()
    }
    pub fn count_free(&self) -> usize {
        self.len() - self.count_used()
    }
    pub fn used_bytes(&self) -> usize {
        self.count_used() * self.unit_bytes
    }
    pub fn free_bytes(&self) -> usize {
        self.count_free() * self.unit_bytes
    }
    /// iterate over units, yields true if used
    pub fn iter(&self) -> bit_vec::Iter<'_> {
        self.bits.iter()
    }
}

/// Error out if the entry belongs to a different kind of volume
pub fn verify_kind(entry: &FileEntry,kind: FsKind) -> STDRESULT {
    if entry.fs!=kind {
        error!("entry from {} used on {}",entry.fs,kind);
        return Err(Box::new(Error::FormatMismatch));
    }
    Ok(())
}

/// Abstract file system interface.  Every volume shares its underlying image with any other
/// volume on the same image, all operations are serialized by the caller.
pub trait DiskFS {
    fn kind(&self) -> FsKind;
    /// Volume name in the style of the file system, e.g. `/NAME/` for ProDOS
    fn disk_name(&self) -> Result<String,DYNERR>;
    /// Whether deleted entries can be listed
    fn supports_deleted_files(&self) -> bool;
    fn supports_directories(&self) -> bool {
        false
    }
    /// List live files in `dir`, or in the root directory if `None`
    fn list_files(&self,dir: Option<&FileEntry>) -> Result<Vec<FileEntry>,DYNERR>;
    /// List deleted files that still have a directory slot
    fn list_deleted(&self) -> Result<Vec<FileEntry>,DYNERR> {
        Err(Box::new(Error::UnsupportedOperation))
    }
    /// Usage of every allocation unit on the volume
    fn compute_usage_map(&self) -> Result<UsageMap,DYNERR>;
    /// Bytes in all allocation units
    fn total_capacity(&self) -> usize;
    fn free_space(&self) -> Result<usize,DYNERR> {
        Ok(self.compute_usage_map()?.free_bytes())
    }
    fn used_space(&self) -> Result<usize,DYNERR> {
        Ok(self.compute_usage_map()?.used_bytes())
    }
    /// Read the file data, stripping any header the file system puts in front
    fn read_file_data(&self,entry: &FileEntry) -> Result<Vec<u8>,DYNERR>;
    /// Replace the file data, returns the updated entry.  The `aux` field of the entry
    /// supplies the load address or aux type where the file system records one.
    fn write_file_data(&mut self,entry: &FileEntry,dat: &[u8]) -> Result<FileEntry,DYNERR>;
    /// Create an empty file, `typ` is a type mnemonic or code for the file system
    fn create_file(&mut self,dir: Option<&FileEntry>,name: &str,typ: &str) -> Result<FileEntry,DYNERR>;
    fn create_directory(&mut self,_dir: Option<&FileEntry>,_name: &str) -> Result<FileEntry,DYNERR> {
        error!("{} does not have directories",self.kind());
        Err(Box::new(Error::UnsupportedOperation))
    }
    fn delete_file(&mut self,entry: &FileEntry) -> STDRESULT;
    fn rename(&mut self,entry: &FileEntry,name: &str) -> Result<FileEntry,DYNERR>;
    fn lock(&mut self,entry: &FileEntry) -> STDRESULT;
    fn unlock(&mut self,entry: &FileEntry) -> STDRESULT;
    /// Write an empty file system, replacing whatever was there
    fn format(&mut self,vol_name: &str) -> STDRESULT;
    /// Find a file by path, components are separated by `/`, case is ignored
    fn find(&self,path: &str) -> Result<FileEntry,DYNERR> {
        let mut dir: Option<FileEntry> = None;
        let components: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if components.is_empty() {
            return Err(Box::new(Error::BadName));
        }
        for (i,comp) in components.iter().enumerate() {
            let found = self.list_files(dir.as_ref())?.into_iter()
                .find(|e| e.name.eq_ignore_ascii_case(comp));
            match found {
                Some(e) if i+1==components.len() => return Ok(e),
                Some(e) if e.directory => dir = Some(e),
                _ => break
            }
        }
        error!("{} not found",path);
        Err(Box::new(Error::FileNotFound))
    }
}

/// A logical volume detected on an image
pub enum FormattedVolume {
    Dos(dos3x::Disk),
    Prodos(prodos::Disk),
    Pascal(pascal::Disk),
    Rdos(rdos::Disk),
    Cpm(cpm::Disk)
}

impl FormattedVolume {
    fn inner(&self) -> &dyn DiskFS {
        match self {
            Self::Dos(fs) => fs,
            Self::Prodos(fs) => fs,
            Self::Pascal(fs) => fs,
            Self::Rdos(fs) => fs,
            Self::Cpm(fs) => fs
        }
    }
    fn inner_mut(&mut self) -> &mut dyn DiskFS {
        match self {
            Self::Dos(fs) => fs,
            Self::Prodos(fs) => fs,
            Self::Pascal(fs) => fs,
            Self::Rdos(fs) => fs,
            Self::Cpm(fs) => fs
        }
    }
}

impl DiskFS for FormattedVolume {
    fn kind(&self) -> FsKind {
        self.inner().kind()
    }
    fn disk_name(&self) -> Result<String,DYNERR> {
        self.inner().disk_name()
    }
    fn supports_deleted_files(&self) -> bool {
        self.inner().supports_deleted_files()
    }
    fn supports_directories(&self) -> bool {
        self.inner().supports_directories()
    }
    fn list_files(&self,dir: Option<&FileEntry>) -> Result<Vec<FileEntry>,DYNERR> {
        self.inner().list_files(dir)
    }
    fn list_deleted(&self) -> Result<Vec<FileEntry>,DYNERR> {
        self.inner().list_deleted()
    }
    fn compute_usage_map(&self) -> Result<UsageMap,DYNERR> {
        self.inner().compute_usage_map()
    }
    fn total_capacity(&self) -> usize {
        self.inner().total_capacity()
    }
    fn free_space(&self) -> Result<usize,DYNERR> {
        self.inner().free_space()
    }
    fn used_space(&self) -> Result<usize,DYNERR> {
        self.inner().used_space()
    }
    fn read_file_data(&self,entry: &FileEntry) -> Result<Vec<u8>,DYNERR> {
        self.inner().read_file_data(entry)
    }
    fn write_file_data(&mut self,entry: &FileEntry,dat: &[u8]) -> Result<FileEntry,DYNERR> {
        self.inner_mut().write_file_data(entry,dat)
    }
    fn create_file(&mut self,dir: Option<&FileEntry>,name: &str,typ: &str) -> Result<FileEntry,DYNERR> {
        self.inner_mut().create_file(dir,name,typ)
    }
    fn create_directory(&mut self,dir: Option<&FileEntry>,name: &str) -> Result<FileEntry,DYNERR> {
        self.inner_mut().create_directory(dir,name)
    }
    fn delete_file(&mut self,entry: &FileEntry) -> STDRESULT {
        self.inner_mut().delete_file(entry)
    }
    fn rename(&mut self,entry: &FileEntry,name: &str) -> Result<FileEntry,DYNERR> {
        self.inner_mut().rename(entry,name)
    }
    fn lock(&mut self,entry: &FileEntry) -> STDRESULT {
        self.inner_mut().lock(entry)
    }
    fn unlock(&mut self,entry: &FileEntry) -> STDRESULT {
        self.inner_mut().unlock(entry)
    }
    fn format(&mut self,vol_name: &str) -> STDRESULT {
        self.inner_mut().format(vol_name)
    }
    fn find(&self,path: &str) -> Result<FileEntry,DYNERR> {
        self.inner().find(path)
    }
}

fn catalog_dir(vol: &dyn DiskFS,dir: Option<&FileEntry>,depth: usize) -> Result<json::JsonValue,DYNERR> {
    if depth > 64 {
        error!("directory nesting too deep");
        return Err(Box::new(Error::CorruptFilesystem));
    }
    let mut ans = json::JsonValue::new_array();
    for entry in vol.list_files(dir)? {
        let mut obj = entry.to_json_value();
        if entry.directory {
            obj["files"] = catalog_dir(vol,Some(&entry),depth+1)?;
        }
        ans.push(obj)?;
    }
    Ok(ans)
}

/// Whole volume catalog as JSON, subdirectories are nested under `files`
pub fn catalog_to_json(vol: &dyn DiskFS,indent: u16) -> Result<String,DYNERR> {
    let mut root = json::JsonValue::new_object();
    root["file_system"] = json::JsonValue::String(vol.kind().to_string());
    root["volume"] = json::JsonValue::String(vol.disk_name()?);
    root["total_bytes"] = vol.total_capacity().into();
    root["free_bytes"] = vol.free_space()?.into();
    root["files"] = catalog_dir(vol,None,0)?;
    Ok(match indent {
        0 => json::stringify(root),
        _ => json::stringify_pretty(root,indent)
    })
}
