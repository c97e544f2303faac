//! ## CP/M file system module
//!
//! CP/M encompasses a broad space of computer hardware and disk formats.
//! This module handles the 5.25 inch Apple II disk used with the Z80 card:
//! 3 reserved tracks, 1K blocks, and a 64 entry directory in the first two blocks.
//!
//! The key concept of the CP/M directory is the "extent," which is a subset of a file's data.
//! Here directory entries and extents are one and the same, and the extent capacity is 16K.
//! Files are found by gathering the extents with the same user number and name, and
//! putting them in order of the extent index.
//!
//! Creating files and writing file data are not supported.

pub mod types;
pub mod directory;
pub mod pack;

use std::collections::HashMap;
use log::{debug,trace,info,error};
use a2kit_macro::DiskStruct;
use crate::img::{DiskImage,SharedImage};
use crate::bios::skew::CPM_LSEC_TO_DOS_LSEC;
use super::{Error,FileEntry,EntryLocation,FsKind,UsageMap,DiskFS};
use crate::{STDRESULT,DYNERR};
use types::*;
use directory::*;

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
    /// Test an image to see if it already contains a CP/M directory.
    pub fn test_img(img: &SharedImage) -> bool {
        let disk = Self::from_img(img.clone());
        let dir = match disk.read_directory() {
            Ok(d) => d,
            Err(_) => return false
        };
        let mut found = false;
        for (i,x) in dir.iter().enumerate() {
            match x.user {
                DELETED => found = true,
                u if u < USER_END => {
                    if !x.is_plausible() {
                        debug!("CP/M entry {} is not plausible",i);
                        return false;
                    }
                    found = true;
                },
                u => {
                    debug!("CP/M entry {} has user {}",i,u);
                    return false;
                }
            }
        }
        found
    }
    /// DOS track and sector of each CP/M sector in a block
    fn block_ts(block: usize) -> Result<Vec<(usize,usize)>,Error> {
        if block >= TOTAL_BLOCKS {
            error!("CP/M block {} is outside the volume",block);
            return Err(Error::CorruptFilesystem);
        }
        Ok((0..SECTORS_PER_BLOCK).map(|j| {
            let lsec = block*SECTORS_PER_BLOCK + j;
            (RESERVED_TRACKS + lsec/16,CPM_LSEC_TO_DOS_LSEC[lsec%16])
        }).collect())
    }
    fn read_block(&self,block: usize) -> Result<Vec<u8>,DYNERR> {
        let mut ans = Vec::new();
        let img = self.img.borrow();
        for (track,sector) in Self::block_ts(block)? {
            ans.append(&mut img.read_sector(track,sector)?);
        }
        Ok(ans)
    }
    fn write_block(&self,block: usize,dat: &[u8]) -> STDRESULT {
        let buf = crate::img::quantize_block(dat,BLOCK_SIZE);
        let mut img = self.img.borrow_mut();
        for (j,(track,sector)) in Self::block_ts(block)?.into_iter().enumerate() {
            img.write_sector(track,sector,&buf[j*SECTOR_SIZE..(j+1)*SECTOR_SIZE])?;
        }
        Ok(())
    }
    fn read_directory(&self) -> Result<Vec<Extent>,DYNERR> {
        let mut buf = Vec::new();
        for b in 0..DIR_BLOCKS {
            buf.append(&mut self.read_block(b)?);
        }
        let mut ans = Vec::new();
        for i in 0..DIR_ENTRIES {
            ans.push(Extent::from_bytes(&buf[i*DIR_ENTRY_SIZE..(i+1)*DIR_ENTRY_SIZE])?);
        }
        Ok(ans)
    }
    fn write_directory(&self,dir: &[Extent]) -> STDRESULT {
        let mut buf = Vec::new();
        for x in dir {
            buf.append(&mut x.to_bytes());
        }
        for b in 0..DIR_BLOCKS {
            self.write_block(b,&buf[b*BLOCK_SIZE..(b+1)*BLOCK_SIZE])?;
        }
        Ok(())
    }
    /// Group the extents into files, keyed by user and name, files are in order of first appearance.
    /// Each file has its directory slots in order of extent index.
    fn gather(dir: &[Extent],user_filter: impl Fn(u8) -> bool) -> Vec<(u8,Vec<usize>)> {
        let mut order: Vec<(u8,[u8;8],[u8;3])> = Vec::new();
        let mut groups: HashMap<(u8,[u8;8],[u8;3]),Vec<usize>> = HashMap::new();
        for (i,x) in dir.iter().enumerate() {
            if !user_filter(x.user) || !x.is_plausible() {
                continue;
            }
            let (name,typ) = x.plain_name();
            let key = (x.user,name,typ);
            if !groups.contains_key(&key) {
                order.push(key);
            }
            groups.entry(key).or_default().push(i);
        }
        order.into_iter().map(|key| {
            let mut slots = groups.remove(&key).unwrap_or_default();
            slots.sort_by_key(|i| dir[*i].index());
            (key.0,slots)
        }).collect()
    }
    fn to_file_entry(dir: &[Extent],user: u8,slots: Vec<usize>) -> FileEntry {
        let first = &dir[slots[0]];
        let (name,typ) = first.plain_name();
        let deleted = user==DELETED;
        let eof = slots.iter().map(|i| dir[*i].data_len()).sum();
        let blocks = slots.iter().map(|i| dir[*i].blocks().iter().filter(|b| **b > 0).count()).sum();
        let ext: String = typ.iter().map(|c| *c as char).collect();
        FileEntry {
            fs: FsKind::Cpm,
            name: pack::file_name_to_string(match deleted { true => 0, false => user },name,typ),
            file_type: ext.trim_end().to_string(),
            type_code: 0,
            aux: 0,
            locked: first.is_read_only(),
            deleted,
            directory: false,
            eof,
            blocks,
            created: None,
            modified: None,
            loc: EntryLocation::Cpm { user, extents: slots }
        }
    }
    /// Go back to the directory and make sure every extent still belongs to the file.
    fn verify_entry(&self,file: &FileEntry) -> Result<(Vec<Extent>,Vec<usize>),DYNERR> {
        super::verify_kind(file,FsKind::Cpm)?;
        let (user,slots) = match &file.loc {
            EntryLocation::Cpm { user, extents } if !extents.is_empty() => (*user,extents.clone()),
            _ => return Err(Box::new(Error::FormatMismatch))
        };
        let dir = self.read_directory()?;
        let (_,fname) = pack::split_user_filename(&file.name)?;
        let want = pack::string_to_file_name(&fname)?;
        for i in &slots {
            let ok = match dir.get(*i) {
                Some(x) => !file.deleted && x.user==user && x.plain_name()==want,
                None => false
            };
            if !ok {
                error!("{} is no longer in the directory",file.name);
                return Err(Box::new(Error::FileNotFound));
            }
        }
        Ok((dir,slots))
    }
    fn check_locked(dir: &[Extent],slots: &[usize],name: &str) -> STDRESULT {
        if dir[slots[0]].is_read_only() {
            error!("{} is read only",name);
            return Err(Box::new(Error::Locked));
        }
        Ok(())
    }
}

impl DiskFS for Disk {
    fn kind(&self) -> FsKind {
        FsKind::Cpm
    }
    fn disk_name(&self) -> Result<String,DYNERR> {
        Ok("CP/M".to_string())
    }
    fn supports_deleted_files(&self) -> bool {
        true
    }
    fn list_files(&self,dir: Option<&FileEntry>) -> Result<Vec<FileEntry>,DYNERR> {
        if dir.is_some() {
            return Err(Box::new(Error::UnsupportedOperation));
        }
        let catalog = self.read_directory()?;
        Ok(Self::gather(&catalog,|u| u < USER_END).into_iter()
            .map(|(user,slots)| Self::to_file_entry(&catalog,user,slots))
            .collect())
    }
    fn list_deleted(&self) -> Result<Vec<FileEntry>,DYNERR> {
        let catalog = self.read_directory()?;
        Ok(Self::gather(&catalog,|u| u==DELETED).into_iter()
            .map(|(user,slots)| Self::to_file_entry(&catalog,user,slots))
            .collect())
    }
    fn compute_usage_map(&self) -> Result<UsageMap,DYNERR> {
        let mut ans = UsageMap::new(TOTAL_BLOCKS,BLOCK_SIZE);
        for b in 0..DIR_BLOCKS {
            ans.mark_used(b);
        }
        for x in self.read_directory()?.iter().filter(|x| x.is_live()) {
            for b in x.blocks() {
                if b as usize >= TOTAL_BLOCKS {
                    error!("block pointer {} is outside the volume",b);
                    return Err(Box::new(Error::CorruptFilesystem));
                }
                if b > 0 {
                    ans.mark_used(b as usize);
                }
            }
        }
        Ok(ans)
    }
    fn total_capacity(&self) -> usize {
        TOTAL_BLOCKS*BLOCK_SIZE
    }
    fn read_file_data(&self,file: &FileEntry) -> Result<Vec<u8>,DYNERR> {
        let (dir,slots) = self.verify_entry(file)?;
        let mut ans = Vec::new();
        for i in slots {
            let x = &dir[i];
            let mut chunk = Vec::new();
            for b in x.blocks() {
                match b {
                    0 => chunk.append(&mut vec![0;BLOCK_SIZE]),
                    _ => chunk.append(&mut self.read_block(b as usize)?)
                }
            }
            trace!("extent {} holds {} bytes",x.index(),x.data_len());
            chunk.truncate(x.data_len());
            ans.append(&mut chunk);
        }
        Ok(ans)
    }
    fn write_file_data(&mut self,_file: &FileEntry,_dat: &[u8]) -> Result<FileEntry,DYNERR> {
        error!("writing CP/M files is not supported");
        Err(Box::new(Error::UnsupportedOperation))
    }
    fn create_file(&mut self,_dir: Option<&FileEntry>,_name: &str,_typ: &str) -> Result<FileEntry,DYNERR> {
        error!("creating CP/M files is not supported");
        Err(Box::new(Error::UnsupportedOperation))
    }
    fn delete_file(&mut self,file: &FileEntry) -> STDRESULT {
        let (mut dir,slots) = self.verify_entry(file)?;
        Self::check_locked(&dir,&slots,&file.name)?;
        for i in slots {
            dir[i].user = DELETED;
        }
        self.write_directory(&dir)
    }
    fn rename(&mut self,file: &FileEntry,name: &str) -> Result<FileEntry,DYNERR> {
        let (mut dir,slots) = self.verify_entry(file)?;
        Self::check_locked(&dir,&slots,&file.name)?;
        let (user,new_name) = pack::split_user_filename(name)?;
        let (fname,ftyp) = pack::string_to_file_name(&new_name)?;
        let user = match name.contains(':') { true => user, false => dir[slots[0]].user };
        let clash = dir.iter().enumerate().any(|(i,x)| x.user==user && x.plain_name()==(fname,ftyp) && !slots.contains(&i));
        if clash {
            return Err(Box::new(Error::DuplicateFilename));
        }
        for i in &slots {
            dir[*i].user = user;
            dir[*i].set_name(fname,ftyp);
        }
        self.write_directory(&dir)?;
        Ok(Self::to_file_entry(&dir,user,slots))
    }
    fn lock(&mut self,file: &FileEntry) -> STDRESULT {
        let (mut dir,slots) = self.verify_entry(file)?;
        for i in slots {
            dir[i].set_read_only(true);
        }
        self.write_directory(&dir)
    }
    fn unlock(&mut self,file: &FileEntry) -> STDRESULT {
        let (mut dir,slots) = self.verify_entry(file)?;
        for i in slots {
            dir[i].set_read_only(false);
        }
        self.write_directory(&dir)
    }
    /// CP/M volumes have no name, the data area is filled with 0xe5
    fn format(&mut self,_vol_name: &str) -> STDRESULT {
        if self.img.borrow().track_count() < RESERVED_TRACKS + TOTAL_BLOCKS*SECTORS_PER_BLOCK/16 {
            return Err(Box::new(crate::img::Error::ImageSizeMismatch));
        }
        info!("formatting CP/M volume");
        for b in 0..TOTAL_BLOCKS {
            self.write_block(b,&[DELETED;BLOCK_SIZE])?;
        }
        Ok(())
    }
}
