//! # RDOS file system module
//! This manipulates disk images containing an RDOS volume, as used by SSI games.
//!
//! * The unit of allocation is a 256 byte sector, numbered `track*13 + sector`
//! * The catalog is on track 1, with 8 entries per sector
//! * Every file is one contiguous run of sectors, there is no bitmap on the disk

pub mod types;

use std::str::FromStr;
use log::{debug,info,warn,error};
use a2kit_macro::DiskStruct;
use crate::img::{DiskImage,SharedImage};
use crate::bios::skew::RDOS_LSEC_TO_DOS_LSEC;
use super::{Error,FileEntry,EntryLocation,FsKind,UsageMap,DiskFS};
use crate::{STDRESULT,DYNERR};
use types::*;

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
    /// Test an image to see if it already contains RDOS.
    pub fn test_img(img: &SharedImage) -> bool {
        let disk = Self::from_img(img.clone());
        match disk.read_block(CATALOG_START) {
            Ok(buf) => {
                let sig: Vec<u8> = "RDOS".bytes().map(|c| c | 0x80).collect();
                if buf[0..4]==sig[..] {
                    return true;
                }
                debug!("RDOS signature not found");
                false
            },
            Err(_) => false
        }
    }
    fn block_ts(block: usize) -> Result<(usize,usize),Error> {
        if block >= TOTAL_BLOCKS {
            error!("RDOS block {} is outside the volume",block);
            return Err(Error::CorruptFilesystem);
        }
        Ok((block/SECTORS_PER_TRACK,RDOS_LSEC_TO_DOS_LSEC[block%SECTORS_PER_TRACK]))
    }
    fn read_block(&self,block: usize) -> Result<Vec<u8>,DYNERR> {
        let (track,sector) = Self::block_ts(block)?;
        self.img.borrow().read_sector(track,sector)
    }
    fn write_block(&self,block: usize,dat: &[u8]) -> STDRESULT {
        let (track,sector) = Self::block_ts(block)?;
        self.img.borrow_mut().write_sector(track,sector,dat)
    }
    fn read_catalog(&self) -> Result<Vec<CatalogEntry>,DYNERR> {
        let mut ans = Vec::new();
        for b in CATALOG_START..CATALOG_START+CATALOG_BLOCKS {
            let buf = self.read_block(b)?;
            for i in 0..ENTRIES_PER_BLOCK {
                ans.push(CatalogEntry::from_bytes(&buf[i*ENTRY_SIZE..(i+1)*ENTRY_SIZE])?);
            }
        }
        Ok(ans)
    }
    /// Write the catalog block holding slot `idx`
    fn write_slot(&self,cat: &[CatalogEntry],idx: usize) -> STDRESULT {
        let b = idx/ENTRIES_PER_BLOCK;
        let mut buf = Vec::new();
        for entry in &cat[b*ENTRIES_PER_BLOCK..(b+1)*ENTRIES_PER_BLOCK] {
            buf.append(&mut entry.to_bytes());
        }
        self.write_block(CATALOG_START + b,&buf)
    }
    fn to_file_entry(idx: usize,entry: &CatalogEntry) -> FileEntry {
        let deleted = entry.name[0]==DELETED;
        let name = match deleted {
            // the first character is lost to the deletion mark
            true => format!("?{}",file_name_to_string(&entry.name[1..])),
            false => file_name_to_string(&entry.name)
        };
        FileEntry {
            fs: FsKind::Rdos,
            name,
            file_type: FileType::mnemonic(entry.file_type),
            type_code: entry.file_type & 0x7f,
            aux: u16::from_le_bytes(entry.load_addr),
            locked: false,
            deleted,
            directory: false,
            eof: u16::from_le_bytes(entry.eof) as usize,
            blocks: entry.num_sectors as usize,
            created: None,
            modified: None,
            loc: EntryLocation::Rdos { idx, start: u16::from_le_bytes(entry.start), count: entry.num_sectors }
        }
    }
    /// Go back to the catalog slot and make sure it still holds the same file.
    /// Returns (catalog,slot).
    fn verify_entry(&self,file: &FileEntry) -> Result<(Vec<CatalogEntry>,usize),DYNERR> {
        super::verify_kind(file,FsKind::Rdos)?;
        let (idx,start,count) = match file.loc {
            EntryLocation::Rdos { idx, start, count } if idx < MAX_ENTRIES => (idx,start,count),
            _ => return Err(Box::new(Error::FormatMismatch))
        };
        let cat = self.read_catalog()?;
        let e = &cat[idx];
        if file.deleted || !e.is_live() || e.start()!=start as usize || e.num_sectors!=count
            || !file_name_to_string(&e.name).eq_ignore_ascii_case(&file.name) {
            error!("{} is no longer in the catalog",file.name);
            return Err(Box::new(Error::FileNotFound));
        }
        Ok((cat,idx))
    }
    /// The system entry holds the operating system and the catalog
    fn check_system(file: &FileEntry,idx: usize) -> STDRESULT {
        if idx==0 {
            error!("{} is the system file",file.name);
            return Err(Box::new(Error::Locked));
        }
        Ok(())
    }
    fn name_in_use(cat: &[CatalogEntry],name: &str) -> bool {
        cat.iter().any(|e| e.is_live() && file_name_to_string(&e.name).eq_ignore_ascii_case(name))
    }
    /// First sector of the lowest gap that can hold `count` sectors, slot `skip` is ignored
    fn first_fit(cat: &[CatalogEntry],count: usize,skip: Option<usize>) -> Option<usize> {
        let mut extents: Vec<(usize,usize)> = cat.iter().enumerate()
            .filter(|(i,e)| e.is_live() && Some(*i)!=skip)
            .map(|(_,e)| (e.start(),e.end()))
            .collect();
        extents.sort();
        let mut start = RESERVED_BLOCKS;
        for (beg,end) in extents {
            if beg >= start + count {
                return Some(start);
            }
            start = usize::max(start,end);
        }
        match start + count <= TOTAL_BLOCKS {
            true => Some(start),
            false => None
        }
    }
}

impl DiskFS for Disk {
    fn kind(&self) -> FsKind {
        FsKind::Rdos
    }
    fn disk_name(&self) -> Result<String,DYNERR> {
        Ok(file_name_to_string(&self.read_catalog()?[0].name))
    }
    fn supports_deleted_files(&self) -> bool {
        true
    }
    fn list_files(&self,dir: Option<&FileEntry>) -> Result<Vec<FileEntry>,DYNERR> {
        if dir.is_some() {
            return Err(Box::new(Error::UnsupportedOperation));
        }
        Ok(self.read_catalog()?.iter().enumerate()
            .filter(|(_,e)| e.is_live())
            .map(|(i,e)| Self::to_file_entry(i,e))
            .collect())
    }
    fn list_deleted(&self) -> Result<Vec<FileEntry>,DYNERR> {
        Ok(self.read_catalog()?.iter().enumerate()
            .filter(|(_,e)| e.name[0]==DELETED)
            .map(|(i,e)| Self::to_file_entry(i,e))
            .collect())
    }
    fn compute_usage_map(&self) -> Result<UsageMap,DYNERR> {
        let mut ans = UsageMap::new(TOTAL_BLOCKS,BLOCK_SIZE);
        for b in CATALOG_START..RESERVED_BLOCKS {
            ans.mark_used(b);
        }
        for e in self.read_catalog()?.iter().filter(|e| e.is_live()) {
            if e.end() > TOTAL_BLOCKS {
                error!("extent [{},{}) is outside the volume",e.start(),e.end());
                return Err(Box::new(Error::CorruptFilesystem));
            }
            for b in e.start()..e.end() {
                ans.mark_used(b);
            }
        }
        Ok(ans)
    }
    fn total_capacity(&self) -> usize {
        TOTAL_BLOCKS*BLOCK_SIZE
    }
    fn read_file_data(&self,file: &FileEntry) -> Result<Vec<u8>,DYNERR> {
        let (cat,idx) = self.verify_entry(file)?;
        let e = &cat[idx];
        let mut ans = Vec::new();
        for b in e.start()..e.end() {
            ans.append(&mut self.read_block(b)?);
        }
        let eof = u16::from_le_bytes(e.eof) as usize;
        if eof > ans.len() {
            warn!("{} is shorter than its length field",file.name);
        }
        ans.truncate(eof);
        Ok(ans)
    }
    fn write_file_data(&mut self,file: &FileEntry,dat: &[u8]) -> Result<FileEntry,DYNERR> {
        let (mut cat,idx) = self.verify_entry(file)?;
        Self::check_system(file,idx)?;
        let count = usize::max(1,(dat.len() + BLOCK_SIZE - 1) / BLOCK_SIZE);
        if count > 255 || dat.len() > u16::MAX as usize {
            error!("{} bytes will not fit in an RDOS file",dat.len());
            return Err(Box::new(Error::UnsupportedOperation));
        }
        let start = match Self::first_fit(&cat,count,Some(idx)) {
            Some(s) => s,
            None => {
                error!("no gap of {} sectors for {}",count,file.name);
                return Err(Box::new(Error::DiskFull));
            }
        };
        debug!("writing {} sectors at {}",count,start);
        for i in 0..count {
            let end = usize::min((i+1)*BLOCK_SIZE,dat.len());
            let beg = usize::min(i*BLOCK_SIZE,end);
            self.write_block(start+i,&dat[beg..end])?;
        }
        let e = &mut cat[idx];
        e.start = u16::to_le_bytes(start as u16);
        e.num_sectors = count as u8;
        e.eof = u16::to_le_bytes(dat.len() as u16);
        e.load_addr = u16::to_le_bytes(file.aux);
        self.write_slot(&cat,idx)?;
        Ok(Self::to_file_entry(idx,&cat[idx]))
    }
    fn create_file(&mut self,dir: Option<&FileEntry>,name: &str,typ: &str) -> Result<FileEntry,DYNERR> {
        if dir.is_some() {
            error!("RDOS does not have directories");
            return Err(Box::new(Error::UnsupportedOperation));
        }
        let fname = string_to_file_name(name)?;
        let file_type = FileType::from_str(typ)?;
        let mut cat = self.read_catalog()?;
        if Self::name_in_use(&cat,name) {
            error!("{} already exists",name);
            return Err(Box::new(Error::DuplicateFilename));
        }
        let idx = match cat.iter().position(|e| !e.is_live()) {
            Some(i) => i,
            None => {
                error!("RDOS catalog is full");
                return Err(Box::new(Error::DirectoryFull));
            }
        };
        let start = match Self::first_fit(&cat,1,None) {
            Some(s) => s,
            None => return Err(Box::new(Error::DiskFull))
        };
        self.write_block(start,&[0;BLOCK_SIZE])?;
        cat[idx] = CatalogEntry {
            name: fname,
            file_type: file_type as u8,
            num_sectors: 1,
            load_addr: [0,0],
            eof: [0,0],
            start: u16::to_le_bytes(start as u16)
        };
        self.write_slot(&cat,idx)?;
        Ok(Self::to_file_entry(idx,&cat[idx]))
    }
    fn delete_file(&mut self,file: &FileEntry) -> STDRESULT {
        let (mut cat,idx) = self.verify_entry(file)?;
        Self::check_system(file,idx)?;
        cat[idx].name[0] = DELETED;
        self.write_slot(&cat,idx)
    }
    fn rename(&mut self,file: &FileEntry,name: &str) -> Result<FileEntry,DYNERR> {
        let (mut cat,idx) = self.verify_entry(file)?;
        Self::check_system(file,idx)?;
        let fname = string_to_file_name(name)?;
        if !name.eq_ignore_ascii_case(&file.name) && Self::name_in_use(&cat,name) {
            return Err(Box::new(Error::DuplicateFilename));
        }
        cat[idx].name = fname;
        self.write_slot(&cat,idx)?;
        Ok(Self::to_file_entry(idx,&cat[idx]))
    }
    fn lock(&mut self,_file: &FileEntry) -> STDRESULT {
        error!("RDOS files cannot be locked");
        Err(Box::new(Error::UnsupportedOperation))
    }
    fn unlock(&mut self,_file: &FileEntry) -> STDRESULT {
        error!("RDOS files cannot be locked");
        Err(Box::new(Error::UnsupportedOperation))
    }
    /// The volume name is fixed by the system entry
    fn format(&mut self,vol_name: &str) -> STDRESULT {
        if self.img.borrow().track_count() < TRACKS {
            return Err(Box::new(crate::img::Error::ImageSizeMismatch));
        }
        if !vol_name.is_empty() {
            debug!("RDOS ignores volume name {}",vol_name);
        }
        info!("formatting RDOS volume");
        for b in 0..TOTAL_BLOCKS {
            self.write_block(b,&[0;BLOCK_SIZE])?;
        }
        let mut cat = vec![CatalogEntry::new();MAX_ENTRIES];
        cat[0] = CatalogEntry {
            name: string_to_file_name(SYSTEM_NAME)?,
            file_type: FileType::Binary as u8,
            num_sectors: RESERVED_BLOCKS as u8,
            load_addr: [0,0],
            eof: u16::to_le_bytes((RESERVED_BLOCKS*BLOCK_SIZE) as u16),
            start: [0,0]
        };
        self.write_slot(&cat,0)
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
        disk.format("").expect("format failed");
        disk
    }

    #[test]
    fn format_and_detect() {
        let disk = new_disk();
        assert!(Disk::test_img(&disk.img));
        assert_eq!(disk.disk_name().unwrap(),SYSTEM_NAME);
        assert_eq!(disk.used_space().unwrap(),23*256);
        let files = disk.list_files(None).unwrap();
        assert_eq!(files.len(),1);
        assert_eq!(files[0].blocks,23);
        // block 13 is track 1, sector 0
        let raw = disk.img.borrow().read_sector(1,0).unwrap();
        assert_eq!(raw[0],0xd2);
    }

    #[test]
    fn write_and_delete() {
        let mut disk = new_disk();
        let mut file = disk.create_file(None,"GAME DATA","B").expect("create failed");
        file.aux = 0x4000;
        let dat: Vec<u8> = (0..513).map(|x| x as u8).collect();
        let file = disk.write_file_data(&file,&dat).expect("write failed");
        assert_eq!(file.loc,EntryLocation::Rdos { idx: 1, start: 23, count: 3 });
        assert_eq!(file.aux,0x4000);
        assert_eq!(disk.read_file_data(&file).unwrap(),dat);
        disk.delete_file(&file).expect("delete failed");
        let deleted = disk.list_deleted().unwrap();
        assert_eq!(deleted.len(),1);
        assert_eq!(deleted[0].name,"?AME DATA");
        assert_eq!(disk.used_space().unwrap(),23*256);
        let sys = disk.find(SYSTEM_NAME).unwrap();
        match disk.delete_file(&sys) {
            Err(e) => assert_eq!(e.downcast_ref::<Error>(),Some(&Error::Locked)),
            Ok(_) => panic!("system file was deleted")
        }
    }
}
