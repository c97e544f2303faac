//! ## Pascal file system module
//!
//! This module is *not* for the Pascal language, but rather the Pascal file system.
//! Every file is one contiguous run of blocks, the directory keeps the entries sorted by
//! their first block.  Text files are transformed to and from the page structure used by the
//! Pascal editor, other types are stored as is.

pub mod types;
pub mod directory;
pub mod pack;

use std::str::FromStr;
use num_traits::FromPrimitive;
use log::{debug,info,error};
use a2kit_macro::DiskStruct;
use crate::img::{DiskImage,SharedImage};
use super::{Error,FileEntry,EntryLocation,FsKind,UsageMap,DiskFS};
use crate::{STDRESULT,DYNERR};
use types::*;
use directory::*;

/// Blocks holding the directory
const DIR_BLOCKS: usize = 4;

/// The primary interface for disk operations.
pub struct Disk {
    img: SharedImage
}

impl Disk {
    /// Create a disk file system using the given image as storage.
    pub fn from_img(img: SharedImage) -> Self {
        Self {
            img
        }
    }
    /// Test an image to see if it already contains a Pascal volume.
    pub fn test_img(img: &SharedImage) -> bool {
        let disk = Self::from_img(img.clone());
        let buf = match disk.read_dir_bytes() {
            Ok(buf) => buf,
            Err(_) => return false
        };
        let header = match VolDirHeader::from_bytes(&buf[0..ENTRY_SIZE]) {
            Ok(h) => h,
            Err(_) => return false
        };
        let (beg,end) = (u16::from_le_bytes(header.begin_block),u16::from_le_bytes(header.end_block));
        if beg!=0 || end!=DIR_END_BLOCK || header.file_type!=[0,0] {
            debug!("bad Pascal header: begin block {}, end block {}",beg,end);
            return false;
        }
        if header.name_len < 1 || header.name_len > 7 {
            debug!("bad Pascal volume name length {}",header.name_len);
            return false;
        }
        if header.num_files() > MAX_FILES {
            debug!("Pascal file count {} too large",header.num_files());
            return false;
        }
        let total = header.total_blocks();
        if total <= DIR_END_BLOCK as usize || total > img.borrow().block_count() {
            debug!("Pascal total blocks {} does not fit image",total);
            return false;
        }
        true
    }
    fn read_dir_bytes(&self) -> Result<Vec<u8>,DYNERR> {
        let mut ans = Vec::new();
        let img = self.img.borrow();
        for b in VOL_HEADER_BLOCK..VOL_HEADER_BLOCK+DIR_BLOCKS {
            ans.append(&mut img.read_block(b)?);
        }
        Ok(ans)
    }
    fn read_directory(&self) -> Result<Directory,DYNERR> {
        match Directory::from_bytes(&self.read_dir_bytes()?) {
            Ok(dir) => Ok(dir),
            Err(e) => {
                error!("Pascal directory is damaged: {}",e);
                Err(Box::new(Error::CorruptFilesystem))
            }
        }
    }
    fn write_directory(&self,dir: &Directory) -> STDRESULT {
        let buf = crate::img::quantize_block(&dir.to_bytes(),DIR_BLOCKS*BLOCK_SIZE);
        let mut img = self.img.borrow_mut();
        for i in 0..DIR_BLOCKS {
            img.write_block(VOL_HEADER_BLOCK+i,&buf[i*BLOCK_SIZE..(i+1)*BLOCK_SIZE])?;
        }
        Ok(())
    }
    fn to_file_entry(&self,idx: usize,entry: &DirectoryEntry) -> FileEntry {
        let code = entry.file_type[0];
        FileEntry {
            fs: FsKind::Pascal,
            name: pack::file_name_to_string(&entry.name,entry.name_len & 0x0f),
            file_type: FileType::mnemonic(code),
            type_code: code,
            aux: 0,
            locked: false,
            deleted: false,
            directory: false,
            eof: entry.eof(),
            blocks: entry.end().saturating_sub(entry.begin()) as usize,
            created: None,
            modified: pack::unpack_date(entry.mod_date),
            loc: EntryLocation::Pascal { idx: idx+1, begin: entry.begin(), end: entry.end() }
        }
    }
    /// Go back to the directory and make sure the entry still describes the same file.
    /// Returns (directory,position in entries).
    fn verify_entry(&self,file: &FileEntry) -> Result<(Directory,usize),DYNERR> {
        super::verify_kind(file,FsKind::Pascal)?;
        let (idx,begin,end) = match file.loc {
            EntryLocation::Pascal { idx, begin, end } if idx > 0 => (idx-1,begin,end),
            _ => return Err(Box::new(Error::FormatMismatch))
        };
        let dir = self.read_directory()?;
        match dir.entries.get(idx) {
            Some(e) if e.begin()==begin && e.end()==end
                && pack::file_name_to_string(&e.name,e.name_len & 0x0f).eq_ignore_ascii_case(&file.name) => Ok((dir,idx)),
            _ => {
                error!("{} is no longer in the directory",file.name);
                Err(Box::new(Error::FileNotFound))
            }
        }
    }
    fn name_in_use(dir: &Directory,name: &str) -> bool {
        dir.entries.iter().any(|e| pack::file_name_to_string(&e.name,e.name_len & 0x0f).eq_ignore_ascii_case(name))
    }
    /// First block of the lowest gap that can hold `count` blocks, the entry at `skip` is ignored
    fn first_fit(dir: &Directory,count: usize,skip: Option<usize>) -> Option<u16> {
        let total = dir.header.total_blocks();
        let mut extents: Vec<(usize,usize)> = dir.entries.iter().enumerate()
            .filter(|(i,_)| Some(*i)!=skip)
            .map(|(_,e)| (e.begin() as usize,e.end() as usize))
            .collect();
        extents.sort();
        let mut start = DIR_END_BLOCK as usize;
        for (beg,end) in extents {
            if beg >= start + count {
                return Some(start as u16);
            }
            start = usize::max(start,end);
        }
        match start + count <= total {
            true => Some(start as u16),
            false => None
        }
    }
    /// Put an entry back in the directory, keeping the sort by first block.  Returns its position.
    fn insert_sorted(dir: &mut Directory,entry: DirectoryEntry) -> usize {
        let pos = dir.entries.iter().position(|e| e.begin() > entry.begin()).unwrap_or(dir.entries.len());
        dir.entries.insert(pos,entry);
        dir.header.num_files = u16::to_le_bytes(dir.entries.len() as u16);
        pos
    }
}

impl DiskFS for Disk {
    fn kind(&self) -> FsKind {
        FsKind::Pascal
    }
    fn disk_name(&self) -> Result<String,DYNERR> {
        let header = self.read_directory()?.header;
        Ok(format!("{}:",pack::file_name_to_string(&header.name,header.name_len & 0x07)))
    }
    fn supports_deleted_files(&self) -> bool {
        false
    }
    fn list_files(&self,dir: Option<&FileEntry>) -> Result<Vec<FileEntry>,DYNERR> {
        if dir.is_some() {
            return Err(Box::new(Error::UnsupportedOperation));
        }
        let catalog = self.read_directory()?;
        Ok(catalog.entries.iter().enumerate().map(|(i,e)| self.to_file_entry(i,e)).collect())
    }
    fn compute_usage_map(&self) -> Result<UsageMap,DYNERR> {
        let dir = self.read_directory()?;
        let total = dir.header.total_blocks();
        let mut ans = UsageMap::new(total,BLOCK_SIZE);
        for b in 0..DIR_END_BLOCK as usize {
            ans.mark_used(b);
        }
        for e in &dir.entries {
            if e.end() as usize > total || e.begin() > e.end() || e.begin() < DIR_END_BLOCK {
                error!("extent [{},{}) is outside the data area",e.begin(),e.end());
                return Err(Box::new(Error::CorruptFilesystem));
            }
            for b in e.begin()..e.end() {
                ans.mark_used(b as usize);
            }
        }
        Ok(ans)
    }
    fn total_capacity(&self) -> usize {
        match self.read_directory() {
            Ok(dir) => dir.header.total_blocks()*BLOCK_SIZE,
            Err(_) => self.img.borrow().byte_capacity()
        }
    }
    fn read_file_data(&self,file: &FileEntry) -> Result<Vec<u8>,DYNERR> {
        let (dir,idx) = self.verify_entry(file)?;
        let entry = &dir.entries[idx];
        let mut ans = Vec::new();
        {
            let img = self.img.borrow();
            for b in entry.begin()..entry.end() {
                ans.append(&mut img.read_block(b as usize)?);
            }
        }
        // text comes back as the stored page image, `decode_text` gives the lines
        ans.truncate(entry.eof());
        Ok(ans)
    }
    fn write_file_data(&mut self,file: &FileEntry,dat: &[u8]) -> Result<FileEntry,DYNERR> {
        let (mut dir,idx) = self.verify_entry(file)?;
        let mut entry = dir.entries[idx];
        let payload = match FileType::from_u8(entry.file_type[0]) {
            Some(FileType::Text) => encode_text(dat)?,
            _ => dat.to_vec()
        };
        let count = usize::max(1,(payload.len() + BLOCK_SIZE - 1) / BLOCK_SIZE);
        // the old extent is free for the new data, nothing is written unless it all fits
        let begin = match Self::first_fit(&dir,count,Some(idx)) {
            Some(b) => b,
            None => {
                error!("no gap of {} blocks for {}",count,file.name);
                return Err(Box::new(Error::DiskFull));
            }
        };
        debug!("writing {} blocks at {}",count,begin);
        {
            let mut img = self.img.borrow_mut();
            for i in 0..count {
                let end = usize::min((i+1)*BLOCK_SIZE,payload.len());
                let beg = usize::min(i*BLOCK_SIZE,end);
                img.write_block(begin as usize + i,&payload[beg..end])?;
            }
        }
        entry.begin_block = u16::to_le_bytes(begin);
        entry.end_block = u16::to_le_bytes(begin + count as u16);
        entry.bytes_remaining = u16::to_le_bytes((payload.len() - (count-1)*BLOCK_SIZE) as u16);
        entry.mod_date = pack::pack_date(None);
        dir.entries.remove(idx);
        let pos = Self::insert_sorted(&mut dir,entry);
        self.write_directory(&dir)?;
        Ok(self.to_file_entry(pos,&entry))
    }
    fn create_file(&mut self,dir: Option<&FileEntry>,name: &str,typ: &str) -> Result<FileEntry,DYNERR> {
        if dir.is_some() {
            error!("Pascal does not have directories");
            return Err(Box::new(Error::UnsupportedOperation));
        }
        let (name_len,fname) = pack::string_to_name::<15>(name)?;
        let file_type = FileType::from_str(typ)?;
        let mut catalog = self.read_directory()?;
        if Self::name_in_use(&catalog,name) {
            error!("{} already exists",name);
            return Err(Box::new(Error::DuplicateFilename));
        }
        if catalog.entries.len() >= MAX_FILES {
            error!("Pascal directory is full");
            return Err(Box::new(Error::DirectoryFull));
        }
        let begin = match Self::first_fit(&catalog,1,None) {
            Some(b) => b,
            None => return Err(Box::new(Error::DiskFull))
        };
        self.img.borrow_mut().write_block(begin as usize,&[0;BLOCK_SIZE])?;
        let mut entry = DirectoryEntry::new();
        entry.begin_block = u16::to_le_bytes(begin);
        entry.end_block = u16::to_le_bytes(begin+1);
        entry.file_type = [file_type as u8,0];
        entry.name_len = name_len;
        entry.name = fname;
        entry.mod_date = pack::pack_date(None);
        let pos = Self::insert_sorted(&mut catalog,entry);
        self.write_directory(&catalog)?;
        Ok(self.to_file_entry(pos,&entry))
    }
    fn delete_file(&mut self,file: &FileEntry) -> STDRESULT {
        let (mut dir,idx) = self.verify_entry(file)?;
        dir.entries.remove(idx);
        dir.header.num_files = u16::to_le_bytes(dir.entries.len() as u16);
        self.write_directory(&dir)
    }
    fn rename(&mut self,file: &FileEntry,name: &str) -> Result<FileEntry,DYNERR> {
        let (mut dir,idx) = self.verify_entry(file)?;
        let (name_len,fname) = pack::string_to_name::<15>(name)?;
        if !name.eq_ignore_ascii_case(&file.name) && Self::name_in_use(&dir,name) {
            return Err(Box::new(Error::DuplicateFilename));
        }
        dir.entries[idx].name_len = name_len;
        dir.entries[idx].name = fname;
        self.write_directory(&dir)?;
        Ok(self.to_file_entry(idx,&dir.entries[idx]))
    }
    fn lock(&mut self,_file: &FileEntry) -> STDRESULT {
        error!("Pascal files cannot be locked");
        Err(Box::new(Error::UnsupportedOperation))
    }
    fn unlock(&mut self,_file: &FileEntry) -> STDRESULT {
        error!("Pascal files cannot be locked");
        Err(Box::new(Error::UnsupportedOperation))
    }
    fn format(&mut self,vol_name: &str) -> STDRESULT {
        let (name_len,name) = pack::string_to_name::<7>(vol_name)?;
        let total = usize::min(self.img.borrow().block_count(),0x7fff);
        info!("formatting Pascal volume {}: with {} blocks",vol_name.to_uppercase(),total);
        {
            let mut img = self.img.borrow_mut();
            for b in 0..DIR_END_BLOCK as usize {
                img.write_block(b,&[0;BLOCK_SIZE])?;
            }
        }
        let mut dir = Directory::new();
        dir.header.end_block = u16::to_le_bytes(DIR_END_BLOCK);
        dir.header.name_len = name_len;
        dir.header.name = name;
        dir.header.total_blocks = u16::to_le_bytes(total as u16);
        dir.header.last_set_date = pack::pack_date(None);
        self.write_directory(&dir)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::img::ImageOrder;
    use crate::img::dsk_do::DosOrder;

    fn new_disk() -> Disk {
        let img = ImageOrder::Dos(DosOrder::create(35)).share();
        let mut disk = Disk::from_img(img);
        disk.format("blank").expect("format failed");
        disk
    }

    #[test]
    fn format_and_detect() {
        let disk = new_disk();
        assert!(Disk::test_img(&disk.img));
        assert_eq!(disk.disk_name().unwrap(),"BLANK:");
        assert_eq!(disk.used_space().unwrap(),6*512);
        assert_eq!(disk.total_capacity(),280*512);
    }

    #[test]
    fn text_file_blocks() {
        let mut disk = new_disk();
        let file = disk.create_file(None,"NOTES.TEXT","TEXT").expect("create failed");
        let txt: Vec<u8> = (0..300).map(|i| if i%50==49 { b'\n' } else { b'A' + (i%26) as u8 }).collect();
        let file = disk.write_file_data(&file,&txt).expect("write failed");
        assert_eq!(file.blocks,3);
        assert_eq!(file.eof,1536);
        let stored = disk.read_file_data(&file).unwrap();
        assert_eq!(stored,encode_text(&txt).unwrap());
        assert_eq!(decode_text(&stored),txt);
    }

    #[test]
    fn text_without_final_newline() {
        let mut disk = new_disk();
        let file = disk.create_file(None,"A.TEXT","TEXT").expect("create failed");
        let file = disk.write_file_data(&file,b"A").expect("write failed");
        assert_eq!(file.blocks,3);
        let stored = disk.read_file_data(&file).unwrap();
        assert_eq!(stored.len(),1536);
        assert_eq!(&stored[1024..1027],b"A\r\0");
        assert_eq!(decode_text(&stored),b"A\n".to_vec());
        // reading twice gives the same image
        assert_eq!(disk.read_file_data(&file).unwrap(),stored);
    }

    #[test]
    fn text_with_crlf() {
        let mut disk = new_disk();
        let file = disk.create_file(None,"X.TEXT","TEXT").expect("create failed");
        let file = disk.write_file_data(&file,b"X\r\n").expect("write failed");
        let stored = disk.read_file_data(&file).unwrap();
        assert_eq!(stored,encode_text(b"X\r\n").unwrap());
        assert_eq!(&stored[1024..1027],b"X\r\0");
        assert_eq!(decode_text(&stored),b"X\n".to_vec());
    }

    #[test]
    fn first_fit_and_order() {
        let mut disk = new_disk();
        let a = disk.create_file(None,"A","DATA").unwrap();
        disk.create_file(None,"B","DATA").unwrap();
        let c = disk.create_file(None,"C","DATA").unwrap();
        // A grows past B and C, so it moves to the end
        let a = disk.write_file_data(&a,&[1;1500]).unwrap();
        assert_eq!(a.loc,EntryLocation::Pascal { idx: 3, begin: 9, end: 12 });
        disk.delete_file(&disk.find("B").unwrap()).unwrap();
        // the hole left by A and B takes a two block file
        let d = disk.create_file(None,"D","DATA").unwrap();
        let d = disk.write_file_data(&d,&[2;1024]).unwrap();
        assert_eq!(d.loc,EntryLocation::Pascal { idx: 1, begin: 6, end: 8 });
        let names: Vec<String> = disk.list_files(None).unwrap().into_iter().map(|f| f.name).collect();
        assert_eq!(names,vec!["D","C","A"]);
        assert!(disk.read_file_data(&c).is_err());
        assert_eq!(disk.read_file_data(&disk.find("A").unwrap()).unwrap(),vec![1;1500]);
    }

    #[test]
    fn disk_full() {
        let mut disk = new_disk();
        let f = disk.create_file(None,"BIG","DATA").unwrap();
        let used = disk.used_space().unwrap();
        match disk.write_file_data(&f,&vec![0;275*512]) {
            Err(e) => assert_eq!(e.downcast_ref::<Error>(),Some(&Error::DiskFull)),
            Ok(_) => panic!("write should not fit")
        }
        assert_eq!(disk.used_space().unwrap(),used);
        assert!(disk.lock(&f).is_err());
    }
}
