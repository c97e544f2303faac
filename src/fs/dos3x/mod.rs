//! # DOS 3.x file system module
//! This manipulates disk images containing a DOS 3.3 volume, or one of the two
//! volumes that UniDOS and OzDOS put on an 800K disk.  The same code handles all of them,
//! the `DosLayout` decides how a DOS track and sector is found on the image.
//!
//! * Standard volumes have 35 or 40 tracks of 16 sectors
//! * UniDOS and OzDOS volumes have 50 tracks of 32 sectors, packed two sectors per block
//! * Unlike DOS, nothing is written unless there is enough space for all the data

pub mod types;
pub mod pack;

use std::collections::HashSet;
use std::str::FromStr;
use num_traits::FromPrimitive;
use log::{trace,debug,info,error};
use a2kit_macro::DiskStruct;
use crate::img::{DiskImage,SharedImage,SECTOR_SIZE};
use super::{Error,FileEntry,EntryLocation,FsKind,UsageMap,DiskFS};
use crate::{STDRESULT,DYNERR};
use types::*;

/// Sectors in one UniDOS volume
const UNIDOS_VOL_SECTORS: usize = 1600;

/// How a DOS volume is placed on the image
#[derive(Clone,Copy,Debug,PartialEq,Eq)]
pub enum DosLayout {
    /// DOS ordered 16 sector tracks
    Standard,
    /// the volume fills half of an 800K disk, value is the volume index
    UniDos(u8),
    /// the volume takes one half of every block, value is the volume index
    OzDos(u8)
}

/// The primary interface for disk operations.
pub struct Disk {
    img: SharedImage,
    layout: DosLayout
}

impl Disk {
    /// Create a disk file system using the given image as storage.
    pub fn from_img(img: SharedImage,layout: DosLayout) -> Self {
        Self {
            img,
            layout
        }
    }
    /// Test an image to see if it already contains a DOS volume with the given layout.
    pub fn test_img(img: &SharedImage,layout: DosLayout) -> bool {
        let disk = Self::from_img(img.clone(),layout);
        let (tlen,slen) = disk.geometry();
        let vtoc = match disk.read_sector([VTOC_TRACK,0]) {
            Ok(buf) => match VTOC::from_bytes(&buf) {
                Ok(v) => v,
                Err(_) => return false
            },
            Err(_) => {
                debug!("VTOC sector was not readable");
                return false;
            }
        };
        if vtoc.track1 != VTOC_TRACK || vtoc.sector1 as usize >= slen {
            debug!("VTOC wrong track1 {}, sector1 {}",vtoc.track1,vtoc.sector1);
            return false;
        }
        if vtoc.max_pairs != MAX_PAIRS {
            debug!("VTOC wrong pair count {}",vtoc.max_pairs);
            return false;
        }
        if vtoc.bytes != [0,1] || vtoc.sectors as usize != slen || vtoc.tracks as usize != tlen {
            debug!("VTOC wrong bytes {:?}, sectors {}, tracks {}",vtoc.bytes,vtoc.sectors,vtoc.tracks);
            return false;
        }
        true
    }
    /// (tracks,sectors) of the volume
    fn geometry(&self) -> (usize,usize) {
        match self.layout {
            DosLayout::Standard => (usize::min(self.img.borrow().track_count(),50),16),
            _ => (50,32)
        }
    }
    /// (block,half) holding a sector of a UniDOS or OzDOS volume
    fn block_half(&self,ts: [u8;2]) -> (usize,usize) {
        let (t,s) = (ts[0] as usize,ts[1] as usize);
        match self.layout {
            DosLayout::UniDos(v) => {
                let lsec = v as usize * UNIDOS_VOL_SECTORS + t*32 + s;
                (lsec/2,lsec%2)
            },
            DosLayout::OzDos(v) => (t*32 + s,v as usize),
            DosLayout::Standard => (0,0)
        }
    }
    fn check_ts(&self,ts: [u8;2]) -> STDRESULT {
        let (tlen,slen) = self.geometry();
        if ts[0] as usize >= tlen || ts[1] as usize >= slen {
            error!("track {} sector {} is outside the volume",ts[0],ts[1]);
            return Err(Box::new(Error::CorruptFilesystem));
        }
        Ok(())
    }
    fn read_sector(&self,ts: [u8;2]) -> Result<Vec<u8>,DYNERR> {
        self.check_ts(ts)?;
        let img = self.img.borrow();
        match self.layout {
            DosLayout::Standard => img.read_sector(ts[0] as usize,ts[1] as usize),
            _ => {
                let (block,half) = self.block_half(ts);
                let buf = img.read_block(block)?;
                Ok(buf[half*SECTOR_SIZE..(half+1)*SECTOR_SIZE].to_vec())
            }
        }
    }
    fn write_sector(&self,ts: [u8;2],dat: &[u8]) -> STDRESULT {
        self.check_ts(ts)?;
        let mut img = self.img.borrow_mut();
        match self.layout {
            DosLayout::Standard => img.write_sector(ts[0] as usize,ts[1] as usize,dat),
            _ => {
                let (block,half) = self.block_half(ts);
                let mut buf = img.read_block(block)?;
                let padded = crate::img::quantize_block(dat,SECTOR_SIZE);
                buf[half*SECTOR_SIZE..(half+1)*SECTOR_SIZE].copy_from_slice(&padded);
                img.write_block(block,&buf)
            }
        }
    }
    fn read_vtoc(&self) -> Result<VTOC,DYNERR> {
        let vtoc = VTOC::from_bytes(&self.read_sector([VTOC_TRACK,0])?)?;
        if !vtoc.is_sane() {
            error!("VTOC geometry is damaged: {} tracks, {} sectors, catalog on track {}",vtoc.tracks,vtoc.sectors,vtoc.track1);
            return Err(Box::new(Error::CorruptFilesystem));
        }
        Ok(vtoc)
    }
    fn write_vtoc(&self,vtoc: &VTOC) -> STDRESULT {
        self.write_sector([VTOC_TRACK,0],&vtoc.to_bytes())
    }
    /// Walk the catalog chain, returns each sector with its address
    fn catalog(&self) -> Result<Vec<([u8;2],CatalogSector)>,DYNERR> {
        let vtoc = self.read_vtoc()?;
        let mut ans = Vec::new();
        let mut visited: HashSet<[u8;2]> = HashSet::new();
        let mut ts = [vtoc.track1,vtoc.sector1];
        for _try in 0..MAX_DIRECTORY_REPS {
            if !visited.insert(ts) {
                error!("catalog chain loops back to {:?}",ts);
                return Err(Box::new(Error::CorruptFilesystem));
            }
            let cat = CatalogSector::from_bytes(&self.read_sector(ts)?)?;
            ans.push((ts,cat));
            ts = [cat.next_track,cat.next_sector];
            if ts[0]==0 {
                return Ok(ans);
            }
        }
        error!("the disk image directory seems to be damaged");
        Err(Box::new(Error::CorruptFilesystem))
    }
    /// Walk the track/sector lists of a file, returns (list sectors,data sectors).
    /// Holes in a sparse file are `None`, trailing holes are dropped.
    fn file_sectors(&self,tsl: [u8;2]) -> Result<(Vec<[u8;2]>,Vec<Option<[u8;2]>>),DYNERR> {
        let mut lists = Vec::new();
        let mut data: Vec<Option<[u8;2]>> = Vec::new();
        let mut ts = tsl;
        for _try in 0..MAX_TSLIST_REPS {
            if lists.contains(&ts) {
                error!("track/sector list loops back to {:?}",ts);
                return Err(Box::new(Error::CorruptFilesystem));
            }
            lists.push(ts);
            let list = TrackSectorList::from_bytes(&self.read_sector(ts)?)?;
            let base = u16::from_le_bytes(list.sector_base) as usize;
            for p in 0..MAX_PAIRS as usize {
                let pair = [list.pairs[p*2],list.pairs[p*2+1]];
                if pair[0]==0 {
                    continue;
                }
                self.check_ts(pair)?;
                if data.len() <= base+p {
                    data.resize(base+p+1,None);
                }
                data[base+p] = Some(pair);
            }
            ts = [list.next_track,list.next_sector];
            if ts[0]==0 {
                trace!("file has {} list sectors and {} data sectors",lists.len(),data.len());
                return Ok((lists,data));
            }
        }
        error!("the disk image track sector list seems to be damaged");
        Err(Box::new(Error::CorruptFilesystem))
    }
    /// Sequence of all sectors of the file, holes are zeros
    fn read_raw(&self,tsl: [u8;2]) -> Result<Vec<u8>,DYNERR> {
        let (_,data) = self.file_sectors(tsl)?;
        let mut ans = Vec::new();
        for maybe in data {
            match maybe {
                Some(ts) => ans.append(&mut self.read_sector(ts)?),
                None => ans.append(&mut vec![0;SECTOR_SIZE])
            }
        }
        Ok(ans)
    }
    /// Build an entry from a live catalog slot; the file header is peeked to find the load address and length
    fn live_entry(&self,cat_ts: [u8;2],idx: usize,ce: &CatalogEntry) -> FileEntry {
        let sectors = u16::from_le_bytes(ce.sectors) as usize;
        let tsl = [ce.tsl_track,ce.tsl_sector];
        let mut aux = 0;
        let mut eof = sectors.saturating_sub(1) * SECTOR_SIZE;
        if let Ok(dat) = self.first_data_sector(tsl) {
            match FileType::from_u8(ce.file_type & 0x7f) {
                Some(FileType::Binary) => {
                    aux = u16::from_le_bytes([dat[0],dat[1]]);
                    eof = u16::from_le_bytes([dat[2],dat[3]]) as usize;
                },
                Some(FileType::Applesoft) | Some(FileType::Integer) => {
                    eof = u16::from_le_bytes([dat[0],dat[1]]) as usize;
                },
                _ => {}
            }
        }
        FileEntry {
            fs: self.kind(),
            name: pack::file_name_to_string(&ce.name),
            file_type: FileType::mnemonic_from_code(ce.file_type),
            type_code: ce.file_type & 0x7f,
            aux,
            locked: ce.file_type & 0x80 > 0,
            deleted: false,
            directory: false,
            eof,
            blocks: sectors,
            created: None,
            modified: None,
            loc: EntryLocation::Dos { catalog: cat_ts, idx, tsl }
        }
    }
    fn first_data_sector(&self,tsl: [u8;2]) -> Result<Vec<u8>,DYNERR> {
        let list = TrackSectorList::from_bytes(&self.read_sector(tsl)?)?;
        let pair = [list.pairs[0],list.pairs[1]];
        if pair[0]==0 {
            return Err(Box::new(Error::FileNotFound));
        }
        self.read_sector(pair)
    }
    /// Go back to the catalog slot of the entry and make sure it still holds the same file.
    /// Returns (catalog sector address,sector,slot).
    fn verify_entry(&self,entry: &FileEntry) -> Result<([u8;2],CatalogSector,usize),DYNERR> {
        super::verify_kind(entry,self.kind())?;
        let (cat_ts,idx,tsl) = match &entry.loc {
            EntryLocation::Dos { catalog, idx, tsl } if *idx < ENTRIES_PER_SECTOR => (*catalog,*idx,*tsl),
            _ => return Err(Box::new(Error::FormatMismatch))
        };
        let cat = CatalogSector::from_bytes(&self.read_sector(cat_ts)?)?;
        let ce = &cat.entries[idx];
        if entry.deleted || ce.tsl_track==0 || ce.tsl_track==0xff || [ce.tsl_track,ce.tsl_sector]!=tsl
            || ce.name!=pack::string_to_file_name(&entry.name) {
            error!("{} is no longer in the catalog",entry.name);
            return Err(Box::new(Error::FileNotFound));
        }
        Ok((cat_ts,cat,idx))
    }
    fn name_in_use(&self,name: &str) -> Result<bool,DYNERR> {
        let fname = pack::string_to_file_name(name);
        for (_,cat) in self.catalog()? {
            for ce in &cat.entries {
                if ce.tsl_track!=0 && ce.tsl_track!=0xff && ce.name==fname {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
    fn free_file_sectors(&self,vtoc: &mut VTOC,tsl: [u8;2]) -> STDRESULT {
        let (lists,data) = self.file_sectors(tsl)?;
        for ts in lists.iter().chain(data.iter().flatten()) {
            vtoc.deallocate(ts[0],ts[1]);
        }
        Ok(())
    }
    /// Create any DOS 3.x volume with the geometry of the layout
    fn init(&mut self,vol: u8) -> STDRESULT {
        let (tracks,sectors) = self.geometry();
        info!("formatting {} with {} tracks, {} sectors",self.kind(),tracks,sectors);
        for track in 0..tracks {
            for sector in 0..sectors {
                self.write_sector([track as u8,sector as u8],&[0;SECTOR_SIZE])?;
            }
        }
        let mut vtoc = VTOC::new();
        vtoc.pad1 = 4;
        vtoc.track1 = VTOC_TRACK;
        vtoc.sector1 = sectors as u8 - 1;
        vtoc.version = 3;
        vtoc.vol = vol;
        vtoc.max_pairs = MAX_PAIRS;
        vtoc.last_track = VTOC_TRACK;
        vtoc.last_direction = 1;
        vtoc.tracks = tracks as u8;
        vtoc.sectors = sectors as u8;
        vtoc.bytes = [0,1];
        // track 0 is left used, the volume is not bootable
        for track in 1..tracks as u8 {
            vtoc.set_track(track,track!=VTOC_TRACK);
        }
        self.write_vtoc(&vtoc)?;
        let mut cat = CatalogSector::new();
        for sec in (1..sectors as u8).rev() {
            match sec {
                1 => { cat.next_track = 0; cat.next_sector = 0; },
                _ => { cat.next_track = VTOC_TRACK; cat.next_sector = sec - 1; }
            }
            self.write_sector([VTOC_TRACK,sec],&cat.to_bytes())?;
        }
        Ok(())
    }
}

impl DiskFS for Disk {
    fn kind(&self) -> FsKind {
        match self.layout {
            DosLayout::Standard => FsKind::Dos33,
            DosLayout::UniDos(v) => FsKind::UniDos(v),
            DosLayout::OzDos(v) => FsKind::OzDos(v)
        }
    }
    fn disk_name(&self) -> Result<String,DYNERR> {
        Ok(format!("DISK VOLUME {}",self.read_vtoc()?.vol))
    }
    fn supports_deleted_files(&self) -> bool {
        true
    }
    fn list_files(&self,dir: Option<&FileEntry>) -> Result<Vec<FileEntry>,DYNERR> {
        if dir.is_some() {
            return Err(Box::new(Error::UnsupportedOperation));
        }
        let mut ans = Vec::new();
        for (ts,cat) in self.catalog()? {
            for (idx,ce) in cat.entries.iter().enumerate() {
                if ce.tsl_track!=0 && ce.tsl_track!=0xff {
                    ans.push(self.live_entry(ts,idx,ce));
                }
            }
        }
        Ok(ans)
    }
    fn list_deleted(&self) -> Result<Vec<FileEntry>,DYNERR> {
        let mut ans = Vec::new();
        for (ts,cat) in self.catalog()? {
            for (idx,ce) in cat.entries.iter().enumerate() {
                if ce.tsl_track==0xff {
                    // the original track is saved in the last name byte
                    ans.push(FileEntry {
                        fs: self.kind(),
                        name: pack::file_name_to_string(&ce.name[0..29]),
                        file_type: FileType::mnemonic_from_code(ce.file_type),
                        type_code: ce.file_type & 0x7f,
                        aux: 0,
                        locked: ce.file_type & 0x80 > 0,
                        deleted: true,
                        directory: false,
                        eof: 0,
                        blocks: u16::from_le_bytes(ce.sectors) as usize,
                        created: None,
                        modified: None,
                        loc: EntryLocation::Dos { catalog: ts, idx, tsl: [ce.name[29],ce.tsl_sector] }
                    });
                }
            }
        }
        Ok(ans)
    }
    fn compute_usage_map(&self) -> Result<UsageMap,DYNERR> {
        let vtoc = self.read_vtoc()?;
        let (tracks,sectors) = self.geometry();
        let mut ans = UsageMap::new(tracks*sectors,SECTOR_SIZE);
        for track in 0..tracks {
            for sector in 0..sectors {
                if !vtoc.is_free(track as u8,sector as u8) {
                    ans.mark_used(track*sectors + sector);
                }
            }
        }
        Ok(ans)
    }
    fn total_capacity(&self) -> usize {
        let (tracks,sectors) = self.geometry();
        tracks*sectors*SECTOR_SIZE
    }
    fn read_file_data(&self,entry: &FileEntry) -> Result<Vec<u8>,DYNERR> {
        let (_,cat,idx) = self.verify_entry(entry)?;
        let ce = &cat.entries[idx];
        let raw = self.read_raw([ce.tsl_track,ce.tsl_sector])?;
        let (_,dat) = pack::unpack(ce.file_type,&raw)?;
        Ok(dat)
    }
    fn write_file_data(&mut self,entry: &FileEntry,dat: &[u8]) -> Result<FileEntry,DYNERR> {
        let (cat_ts,mut cat,idx) = self.verify_entry(entry)?;
        let mut ce = cat.entries[idx];
        if ce.file_type & 0x80 > 0 {
            error!("{} is locked",entry.name);
            return Err(Box::new(Error::Locked));
        }
        let payload = pack::pack(ce.file_type,entry.aux,dat)?;
        let data_sectors = (payload.len() + SECTOR_SIZE - 1) / SECTOR_SIZE;
        let list_sectors = usize::max(1,(data_sectors + MAX_PAIRS as usize - 1) / MAX_PAIRS as usize);
        // allocate on a copy of the VTOC, nothing is written unless all of it succeeds
        let mut vtoc = self.read_vtoc()?;
        self.free_file_sectors(&mut vtoc,[ce.tsl_track,ce.tsl_sector])?;
        let mut lists: Vec<[u8;2]> = Vec::new();
        let mut data: Vec<[u8;2]> = Vec::new();
        for i in 0..list_sectors+data_sectors {
            match vtoc.take_next() {
                Some(ts) if i < list_sectors => lists.push(ts),
                Some(ts) => data.push(ts),
                None => {
                    error!("need {} sectors for {}",list_sectors+data_sectors,entry.name);
                    return Err(Box::new(Error::DiskFull));
                }
            }
        }
        debug!("writing {} data sectors, {} list sectors",data_sectors,list_sectors);
        for (i,ts) in data.iter().enumerate() {
            let end = usize::min((i+1)*SECTOR_SIZE,payload.len());
            self.write_sector(*ts,&payload[i*SECTOR_SIZE..end])?;
        }
        for (k,ts) in lists.iter().enumerate() {
            let mut list = TrackSectorList::new();
            if k+1 < lists.len() {
                list.next_track = lists[k+1][0];
                list.next_sector = lists[k+1][1];
            }
            let base = k*MAX_PAIRS as usize;
            list.sector_base = u16::to_le_bytes(base as u16);
            for p in 0..MAX_PAIRS as usize {
                if base+p < data.len() {
                    list.pairs[p*2] = data[base+p][0];
                    list.pairs[p*2+1] = data[base+p][1];
                }
            }
            self.write_sector(*ts,&list.to_bytes())?;
        }
        ce.tsl_track = lists[0][0];
        ce.tsl_sector = lists[0][1];
        ce.sectors = u16::to_le_bytes((list_sectors+data_sectors) as u16);
        cat.entries[idx] = ce;
        self.write_sector(cat_ts,&cat.to_bytes())?;
        self.write_vtoc(&vtoc)?;
        Ok(self.live_entry(cat_ts,idx,&ce))
    }
    fn create_file(&mut self,dir: Option<&FileEntry>,name: &str,typ: &str) -> Result<FileEntry,DYNERR> {
        if dir.is_some() {
            error!("DOS 3.x does not have directories");
            return Err(Box::new(Error::UnsupportedOperation));
        }
        if !pack::is_name_valid(name) {
            return Err(Box::new(Error::BadName));
        }
        let file_type = FileType::from_str(typ)? as u8;
        if self.name_in_use(name)? {
            error!("{} already exists",name);
            return Err(Box::new(Error::DuplicateFilename));
        }
        let slot = self.catalog()?.into_iter().find_map(|(ts,cat)| {
            cat.entries.iter().position(|e| e.tsl_track==0 || e.tsl_track==0xff).map(|idx| (ts,cat,idx))
        });
        let (cat_ts,mut cat,idx) = match slot {
            Some(s) => s,
            None => {
                error!("no free catalog slots");
                return Err(Box::new(Error::DirectoryFull));
            }
        };
        let mut vtoc = self.read_vtoc()?;
        let tsl = match vtoc.take_next() {
            Some(ts) => ts,
            None => return Err(Box::new(Error::DiskFull))
        };
        self.write_sector(tsl,&TrackSectorList::new().to_bytes())?;
        let ce = CatalogEntry {
            tsl_track: tsl[0],
            tsl_sector: tsl[1],
            file_type,
            name: pack::string_to_file_name(name),
            sectors: [1,0]
        };
        cat.entries[idx] = ce;
        self.write_sector(cat_ts,&cat.to_bytes())?;
        self.write_vtoc(&vtoc)?;
        Ok(self.live_entry(cat_ts,idx,&ce))
    }
    fn delete_file(&mut self,entry: &FileEntry) -> STDRESULT {
        let (cat_ts,mut cat,idx) = self.verify_entry(entry)?;
        let ce = &mut cat.entries[idx];
        if ce.file_type & 0x80 > 0 {
            error!("{} is locked",entry.name);
            return Err(Box::new(Error::Locked));
        }
        let mut vtoc = self.read_vtoc()?;
        self.free_file_sectors(&mut vtoc,[ce.tsl_track,ce.tsl_sector])?;
        ce.name[29] = ce.tsl_track;
        ce.tsl_track = 0xff;
        self.write_sector(cat_ts,&cat.to_bytes())?;
        self.write_vtoc(&vtoc)
    }
    fn rename(&mut self,entry: &FileEntry,name: &str) -> Result<FileEntry,DYNERR> {
        let (cat_ts,mut cat,idx) = self.verify_entry(entry)?;
        if cat.entries[idx].file_type & 0x80 > 0 {
            return Err(Box::new(Error::Locked));
        }
        if !pack::is_name_valid(name) {
            return Err(Box::new(Error::BadName));
        }
        if !name.eq_ignore_ascii_case(&entry.name) && self.name_in_use(name)? {
            return Err(Box::new(Error::DuplicateFilename));
        }
        cat.entries[idx].name = pack::string_to_file_name(name);
        self.write_sector(cat_ts,&cat.to_bytes())?;
        Ok(self.live_entry(cat_ts,idx,&cat.entries[idx]))
    }
    fn lock(&mut self,entry: &FileEntry) -> STDRESULT {
        let (cat_ts,mut cat,idx) = self.verify_entry(entry)?;
        cat.entries[idx].file_type |= 0x80;
        self.write_sector(cat_ts,&cat.to_bytes())
    }
    fn unlock(&mut self,entry: &FileEntry) -> STDRESULT {
        let (cat_ts,mut cat,idx) = self.verify_entry(entry)?;
        cat.entries[idx].file_type &= 0x7f;
        self.write_sector(cat_ts,&cat.to_bytes())
    }
    /// The volume name is the volume number, anything that is not a number from 1 to 254 gives 254
    fn format(&mut self,vol_name: &str) -> STDRESULT {
        let vol = match vol_name.trim().parse::<u8>() {
            Ok(v) if v>0 && v<255 => v,
            _ => 254
        };
        self.init(vol)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::img::ImageOrder;
    use crate::img::dsk_do::DosOrder;
    use crate::img::dsk_po::ProdosOrder;

    fn new_disk() -> Disk {
        let img = ImageOrder::Dos(DosOrder::create(35)).share();
        let mut disk = Disk::from_img(img,DosLayout::Standard);
        disk.format("254").expect("format failed");
        disk
    }

    #[test]
    fn format_and_detect() {
        let disk = new_disk();
        assert!(Disk::test_img(&disk.img,DosLayout::Standard));
        assert_eq!(disk.free_space().unwrap(),35*16*256 - 2*16*256);
        assert_eq!(disk.list_files(None).unwrap().len(),0);
        assert_eq!(disk.disk_name().unwrap(),"DISK VOLUME 254");
        let map = disk.compute_usage_map().unwrap();
        assert!(map.is_used(0));
        assert!(map.is_used(17*16));
        assert!(map.is_free(16));
    }

    #[test]
    fn free_sector_search() {
        let mut disk = new_disk();
        let file = disk.create_file(None,"FIRST","T").expect("create failed");
        // the search starts at the catalog track and moves inward
        assert_eq!(file.loc,EntryLocation::Dos { catalog: [17,15], idx: 0, tsl: [18,15] });
    }

    #[test]
    fn sparse_text_file() {
        let mut disk = new_disk();
        let file = disk.create_file(None,"SPARSE","T").expect("create failed");
        let dat: Vec<u8> = vec![0xc1;512];
        disk.write_file_data(&file,&dat).expect("write failed");
        // punch a hole by zeroing the first pair
        let tsl = match file.loc { EntryLocation::Dos { tsl, .. } => tsl, _ => panic!("wrong location") };
        let mut list = TrackSectorList::from_bytes(&disk.read_sector(tsl).unwrap()).unwrap();
        list.pairs[0] = 0;
        list.pairs[1] = 0;
        disk.write_sector(tsl,&list.to_bytes()).unwrap();
        let file = disk.find("SPARSE").unwrap();
        let ans = disk.read_file_data(&file).unwrap();
        assert_eq!(ans.len(),512);
        assert_eq!(ans[0],0);
        assert_eq!(ans[256],0xc1);
    }

    #[test]
    fn damaged_vtoc() {
        let mut disk = new_disk();
        let mut buf = disk.read_sector([VTOC_TRACK,0]).unwrap();
        buf[0x30] = 55;
        buf[0x34] = 60;
        disk.write_sector([VTOC_TRACK,0],&buf).unwrap();
        match disk.create_file(None,"HELLO","T") {
            Err(e) => assert_eq!(e.downcast_ref::<Error>(),Some(&Error::CorruptFilesystem)),
            Ok(_) => panic!("allocated from a damaged VTOC")
        }
        assert!(disk.free_space().is_err());
        let mut vtoc = VTOC::from_bytes(&buf).unwrap();
        assert!(!vtoc.is_sane());
        assert!(!vtoc.is_free(55,0));
        vtoc.deallocate(55,0);
        assert_eq!(vtoc.next_free().map(|ts| ts[0] < 50),Some(true));
    }

    #[test]
    fn unidos_volumes() {
        let img = ImageOrder::Prodos(ProdosOrder::create(1600)).share();
        let mut v0 = Disk::from_img(img.clone(),DosLayout::UniDos(0));
        let mut v1 = Disk::from_img(img.clone(),DosLayout::UniDos(1));
        v0.format("1").expect("format failed");
        v1.format("2").expect("format failed");
        assert!(Disk::test_img(&img,DosLayout::UniDos(0)));
        assert!(Disk::test_img(&img,DosLayout::UniDos(1)));
        assert!(!Disk::test_img(&img,DosLayout::OzDos(0)));
        let mut file = v1.create_file(None,"HELLO","B").expect("create failed");
        file.aux = 0x2000;
        v1.write_file_data(&file,&[1,2,3]).expect("write failed");
        assert_eq!(v0.list_files(None).unwrap().len(),0);
        let found = v1.find("HELLO").unwrap();
        assert_eq!(found.aux,0x2000);
        assert_eq!(v1.read_file_data(&found).unwrap(),vec![1,2,3]);
        assert_eq!(v0.read_file_data(&found).unwrap_err().downcast_ref::<Error>(),Some(&Error::FormatMismatch));
        assert_eq!(v0.total_capacity(),409600);
    }

    #[test]
    fn ozdos_volumes() {
        let img = ImageOrder::Prodos(ProdosOrder::create(1600)).share();
        let mut v0 = Disk::from_img(img.clone(),DosLayout::OzDos(0));
        let mut v1 = Disk::from_img(img.clone(),DosLayout::OzDos(1));
        v0.format("1").expect("format failed");
        v1.format("2").expect("format failed");
        assert!(Disk::test_img(&img,DosLayout::OzDos(0)));
        assert!(Disk::test_img(&img,DosLayout::OzDos(1)));
        assert_eq!(v0.disk_name().unwrap(),"DISK VOLUME 1");
        assert_eq!(v1.disk_name().unwrap(),"DISK VOLUME 2");
    }
}
