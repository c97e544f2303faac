//! # ProDOS file system module
//! This manipulates disk images containing one ProDOS volume.
//!
//! * Files are seedlings, saplings, or trees, the tier is chosen from the length when written
//! * Subdirectories grow by one block when full, the volume directory cannot grow
//! * Block allocation is done on a copy of the bitmap, which is saved only if all of it succeeds

pub mod types;
pub mod directory;
pub mod pack;

use std::collections::HashSet;
use std::rc::Rc;
use num_traits::FromPrimitive;
use log::{trace,debug,info,warn,error};
use a2kit_macro::DiskStruct;
use crate::img::{DiskImage,SharedImage};
use crate::config::Config;
use super::{Error,FileEntry,EntryLocation,FsKind,UsageMap,DiskFS};
use crate::{STDRESULT,DYNERR};
use types::*;
use directory::*;

/// Free block bitmap, a set bit means the block is free
#[derive(Clone)]
struct Bitmap {
    ptr: u16,
    total: usize,
    buf: Vec<u8>
}

impl Bitmap {
    fn blocks_for(total: usize) -> usize {
        (total + 4095) / 4096
    }
    fn is_free(&self,block: usize) -> bool {
        block < self.total && self.buf[block/8] & (0x80 >> (block%8)) > 0
    }
    fn allocate(&mut self,block: usize) {
        if block < self.total {
            self.buf[block/8] &= !(0x80 >> (block%8));
        }
    }
    fn deallocate(&mut self,block: usize) {
        if block < self.total {
            self.buf[block/8] |= 0x80 >> (block%8);
        }
    }
    /// Lowest free block, marked used
    fn take_next(&mut self) -> Option<u16> {
        let block = (0..self.total).find(|b| self.is_free(*b))?;
        self.allocate(block);
        Some(block as u16)
    }
    fn take(&mut self,count: usize) -> Result<Vec<u16>,Error> {
        let mut ans = Vec::new();
        for _i in 0..count {
            match self.take_next() {
                Some(b) => ans.push(b),
                None => {
                    error!("need {} blocks, found {}",count,ans.len());
                    return Err(Error::DiskFull);
                }
            }
        }
        Ok(ans)
    }
}

/// Split a list of block pointers into an index block, low bytes first then high bytes
fn pack_index(ptrs: &[u16]) -> Vec<u8> {
    let mut ans = vec![0;BLOCK_SIZE];
    for (i,p) in ptrs.iter().enumerate() {
        let [lo,hi] = u16::to_le_bytes(*p);
        ans[i] = lo;
        ans[i+256] = hi;
    }
    ans
}

fn unpack_index(buf: &[u8]) -> Vec<u16> {
    (0..256).map(|i| u16::from_le_bytes([buf[i],buf[i+256]])).collect()
}

/// Blocks a file is made of
struct FileBlocks {
    /// index and master blocks
    index: Vec<u16>,
    /// data block for each logical block, 0 if sparse
    data: Vec<u16>
}

/// The primary interface for disk operations.
pub struct Disk {
    img: SharedImage,
    config: Rc<Config>
}

impl Disk {
    /// Create a disk file system using the given image as storage.
    pub fn from_img(img: SharedImage,config: Rc<Config>) -> Self {
        Self {
            img,
            config
        }
    }
    /// Test an image to see if it already contains ProDOS.
    pub fn test_img(img: &SharedImage) -> bool {
        let blocks = img.borrow().block_count();
        let buf = match img.borrow().read_block(VOL_KEY_BLOCK as usize) {
            Ok(buf) => buf,
            Err(_) => return false
        };
        let key = match DirBlock::from_bytes(&buf) {
            Ok(k) => k,
            Err(_) => return false
        };
        let header = key.vol_header();
        if key.prev!=0 || key.header_type()!=StorageType::VolDirHeader as u8 {
            debug!("no ProDOS volume header");
            return false;
        }
        if header.entry_len as usize!=ENTRY_LEN || header.entries_per_block as usize!=ENTRIES_PER_BLOCK {
            debug!("unexpected ProDOS entry geometry {} x {}",header.entry_len,header.entries_per_block);
            return false;
        }
        let total = header.total_blocks();
        if total > blocks || total < 7 {
            debug!("ProDOS total blocks {} does not fit image of {}",total,blocks);
            return false;
        }
        if header.bitmap_ptr() as usize >= total {
            debug!("ProDOS bitmap pointer out of range");
            return false;
        }
        true
    }
    fn read_block(&self,block: u16) -> Result<Vec<u8>,DYNERR> {
        self.img.borrow().read_block(block as usize)
    }
    fn write_block(&self,block: u16,dat: &[u8]) -> STDRESULT {
        self.img.borrow_mut().write_block(block as usize,dat)
    }
    fn read_dir_block(&self,block: u16) -> Result<DirBlock,DYNERR> {
        Ok(DirBlock::from_bytes(&self.read_block(block)?)?)
    }
    fn write_dir_block(&self,block: u16,dir: &DirBlock) -> STDRESULT {
        self.write_block(block,&dir.to_bytes())
    }
    fn vol_header(&self) -> Result<VolDirHeader,DYNERR> {
        Ok(self.read_dir_block(VOL_KEY_BLOCK)?.vol_header())
    }
    fn total_blocks(&self) -> Result<usize,DYNERR> {
        Ok(self.vol_header()?.total_blocks())
    }
    fn read_bitmap(&self) -> Result<Bitmap,DYNERR> {
        let header = self.vol_header()?;
        let total = header.total_blocks();
        let ptr = header.bitmap_ptr();
        let mut buf = Vec::new();
        for i in 0..Bitmap::blocks_for(total) {
            buf.append(&mut self.read_block(ptr + i as u16)?);
        }
        Ok(Bitmap { ptr, total, buf })
    }
    fn write_bitmap(&self,map: &Bitmap) -> STDRESULT {
        for i in 0..Bitmap::blocks_for(map.total) {
            self.write_block(map.ptr + i as u16,&map.buf[i*BLOCK_SIZE..(i+1)*BLOCK_SIZE])?;
        }
        Ok(())
    }
    /// Follow the chain of directory blocks starting from the key block
    fn dir_chain(&self,key: u16) -> Result<Vec<(u16,DirBlock)>,DYNERR> {
        let total = self.total_blocks()?;
        let mut ans = Vec::new();
        let mut visited = HashSet::new();
        let mut curr = key;
        while curr!=0 {
            if curr as usize >= total || !visited.insert(curr) || ans.len() >= MAX_DIRECTORY_REPS {
                error!("directory chain is broken at block {}",curr);
                return Err(Box::new(Error::CorruptFilesystem));
            }
            let blk = self.read_dir_block(curr)?;
            let next = blk.next;
            ans.push((curr,blk));
            curr = next;
        }
        Ok(ans)
    }
    /// Key block of the directory that `dir` refers to, or of the volume directory
    fn dir_key(&self,dir: Option<&FileEntry>) -> Result<u16,DYNERR> {
        match dir {
            None => Ok(VOL_KEY_BLOCK),
            Some(d) => {
                let (_,_,_,entry) = self.verify_entry(d)?;
                if entry.storage_type()!=StorageType::SubDirEntry as u8 {
                    error!("{} is not a directory",d.name);
                    return Err(Box::new(Error::BadFileType));
                }
                Ok(entry.get_ptr())
            }
        }
    }
    fn to_file_entry(&self,block: u16,idx: usize,entry: &Entry) -> FileEntry {
        let storage = entry.storage_type();
        FileEntry {
            fs: FsKind::Prodos,
            name: entry.name(),
            file_type: self.config.prodos_mnemonic(entry.file_type),
            type_code: entry.file_type,
            aux: entry.aux(),
            locked: entry.is_locked(),
            deleted: false,
            directory: storage==StorageType::SubDirEntry as u8,
            eof: entry.eof(),
            blocks: entry.blocks_used() as usize,
            created: entry.created(),
            modified: entry.modified(),
            loc: EntryLocation::Prodos { block, idx, key: entry.get_ptr(), storage }
        }
    }
    /// Go back to the directory slot of the entry and make sure it still holds the same file.
    /// Returns (directory block address,block,slot,entry).
    fn verify_entry(&self,file: &FileEntry) -> Result<(u16,DirBlock,usize,Entry),DYNERR> {
        super::verify_kind(file,FsKind::Prodos)?;
        let (block,idx,key) = match file.loc {
            EntryLocation::Prodos { block, idx, key, .. } if idx > 0 && idx < ENTRIES_PER_BLOCK => (block,idx,key),
            EntryLocation::Prodos { block, idx, key, .. } if idx==0 && block!=VOL_KEY_BLOCK => (block,idx,key),
            _ => return Err(Box::new(Error::FormatMismatch))
        };
        if block as usize >= self.total_blocks()? {
            return Err(Box::new(Error::FileNotFound));
        }
        let blk = self.read_dir_block(block)?;
        let entry = blk.entry(idx);
        if !entry.is_active() || entry.storage_type() > StorageType::SubDirEntry as u8 || entry.get_ptr()!=key || !entry.name().eq_ignore_ascii_case(&file.name) {
            error!("{} is no longer in the directory",file.name);
            return Err(Box::new(Error::FileNotFound));
        }
        Ok((block,blk,idx,entry))
    }
    fn find_in_dir(&self,key: u16,name: &str) -> Result<Option<(u16,usize,Entry)>,DYNERR> {
        for (addr,blk) in self.dir_chain(key)? {
            for idx in 0..ENTRIES_PER_BLOCK {
                if addr==key && idx==0 {
                    continue;
                }
                let entry = blk.entry(idx);
                if entry.is_active() && entry.name().eq_ignore_ascii_case(name) {
                    return Ok(Some((addr,idx,entry)));
                }
            }
        }
        Ok(None)
    }
    /// Gather the blocks of a file, `count` is the number of logical data blocks
    fn file_blocks(&self,entry: &Entry) -> Result<FileBlocks,DYNERR> {
        let total = self.total_blocks()?;
        let key = entry.get_ptr();
        let count = usize::max(1,(entry.eof() + BLOCK_SIZE - 1) / BLOCK_SIZE);
        let check = |b: u16| -> Result<u16,DYNERR> {
            match b as usize >= total {
                true => {
                    error!("file block {} is outside the volume",b);
                    Err(Box::new(Error::CorruptFilesystem))
                },
                false => Ok(b)
            }
        };
        let mut ans = FileBlocks { index: Vec::new(), data: Vec::new() };
        match StorageType::from_u8(entry.storage_type()) {
            Some(StorageType::Seedling) => {
                ans.data.push(check(key)?);
            },
            Some(StorageType::Sapling) => {
                ans.index.push(check(key)?);
                let ptrs = unpack_index(&self.read_block(key)?);
                ans.data = ptrs.into_iter().take(count).map(check).collect::<Result<Vec<u16>,DYNERR>>()?;
            },
            Some(StorageType::Tree) => {
                ans.index.push(check(key)?);
                let master = unpack_index(&self.read_block(key)?);
                let index_count = (count + 255) / 256;
                for iptr in master.into_iter().take(usize::min(index_count,128)) {
                    let want = usize::min(256,count - ans.data.len());
                    if iptr==0 {
                        ans.data.append(&mut vec![0;want]);
                        continue;
                    }
                    ans.index.push(check(iptr)?);
                    let ptrs = unpack_index(&self.read_block(iptr)?);
                    for p in ptrs.into_iter().take(want) {
                        ans.data.push(check(p)?);
                    }
                }
            },
            _ => {
                error!("storage type {} is not a file",entry.storage_type());
                return Err(Box::new(Error::BadFileType));
            }
        }
        trace!("file has {} index blocks, {} data blocks",ans.index.len(),ans.data.len());
        Ok(ans)
    }
    fn free_file_blocks(&self,map: &mut Bitmap,entry: &Entry) -> STDRESULT {
        let blocks = self.file_blocks(entry)?;
        for b in blocks.index.iter().chain(blocks.data.iter()) {
            if *b > 0 {
                map.deallocate(*b as usize);
            }
        }
        Ok(())
    }
    /// Update the header of the directory whose key block is `key`
    fn bump_file_count(&self,key: u16,delta: i32) -> STDRESULT {
        let mut blk = self.read_dir_block(key)?;
        let count = blk.file_count() as i32 + delta;
        blk.set_file_count(u16::try_from(count.max(0)).unwrap_or(0));
        self.write_dir_block(key,&blk)
    }
    /// Find a free slot in the directory, growing it if it is a subdirectory.
    /// Any new block is taken from `map`, the caller saves the map.
    fn open_slot(&self,key: u16,map: &mut Bitmap) -> Result<(u16,usize),DYNERR> {
        let chain = self.dir_chain(key)?;
        for (addr,blk) in &chain {
            for idx in 0..ENTRIES_PER_BLOCK {
                if *addr==key && idx==0 {
                    continue;
                }
                if !blk.entry(idx).is_active() {
                    return Ok((*addr,idx));
                }
            }
        }
        if key==VOL_KEY_BLOCK {
            error!("volume directory is full");
            return Err(Box::new(Error::DirectoryFull));
        }
        let new_block = map.take(1)?[0];
        let (last_addr,mut last) = match chain.last() {
            Some((a,b)) => (*a,b.clone()),
            None => return Err(Box::new(Error::CorruptFilesystem))
        };
        debug!("directory at {} grows into block {}",key,new_block);
        let mut fresh = DirBlock::new();
        fresh.prev = last_addr;
        last.next = new_block;
        // the parent's entry holds the directory size
        let header = chain[0].1.sub_header();
        let parent_ptr = u16::from_le_bytes(header.parent_ptr);
        let parent_idx = header.parent_entry_num as usize;
        if parent_idx < 1 || parent_idx > ENTRIES_PER_BLOCK {
            return Err(Box::new(Error::CorruptFilesystem));
        }
        let mut parent = self.read_dir_block(parent_ptr)?;
        let mut parent_entry = parent.entry(parent_idx-1);
        if parent_entry.get_ptr()!=key {
            error!("subdirectory parent link is broken");
            return Err(Box::new(Error::CorruptFilesystem));
        }
        parent_entry.set_blocks_used(parent_entry.blocks_used() + 1);
        parent_entry.set_eof(parent_entry.eof() + BLOCK_SIZE);
        parent.set_entry(parent_idx-1,&parent_entry);
        self.write_dir_block(new_block,&fresh)?;
        self.write_dir_block(last_addr,&last)?;
        self.write_dir_block(parent_ptr,&parent)?;
        Ok((new_block,0))
    }
    /// Put a new entry in a directory, the key block of the entry is allocated here
    fn add_entry(&mut self,dir: Option<&FileEntry>,name: &str,stype: StorageType,file_type: u8) -> Result<(u16,usize,Entry),DYNERR> {
        if !pack::is_name_valid(name) {
            error!("invalid ProDOS name {}",name);
            return Err(Box::new(Error::BadName));
        }
        let key = self.dir_key(dir)?;
        if self.find_in_dir(key,name)?.is_some() {
            error!("{} already exists",name);
            return Err(Box::new(Error::DuplicateFilename));
        }
        let mut map = self.read_bitmap()?;
        let file_key = map.take(1)?[0];
        let (addr,slot) = self.open_slot(key,&mut map)?;
        let entry = Entry::create(stype,name,file_type,file_key,key)?;
        let mut blk = self.read_dir_block(addr)?;
        blk.set_entry(slot,&entry);
        self.write_dir_block(addr,&blk)?;
        self.write_block(file_key,&[0;BLOCK_SIZE])?;
        self.write_bitmap(&map)?;
        self.bump_file_count(key,1)?;
        Ok((addr,slot,entry))
    }
    /// Write the volume directory and bitmap
    fn init(&mut self,vol_name: &str,total: usize) -> STDRESULT {
        let (nibs,name) = pack::string_to_file_name(StorageType::VolDirHeader,vol_name)?;
        info!("formatting ProDOS volume /{}/ with {} blocks",vol_name.to_uppercase(),total);
        for b in 0..BITMAP_START {
            self.write_block(b,&[0;BLOCK_SIZE])?;
        }
        for (i,b) in VOL_DIR_BLOCKS.iter().enumerate() {
            let mut blk = DirBlock::new();
            blk.prev = match i { 0 => 0, _ => VOL_DIR_BLOCKS[i-1] };
            blk.next = match VOL_DIR_BLOCKS.get(i+1) { Some(n) => *n, None => 0 };
            if i==0 {
                let mut header = VolDirHeader::new();
                header.stor_len_nibs = nibs;
                header.name = name;
                header.create_time = pack::pack_time(None);
                header.access = STD_ACCESS;
                header.entry_len = ENTRY_LEN as u8;
                header.entries_per_block = ENTRIES_PER_BLOCK as u8;
                header.bitmap_ptr = u16::to_le_bytes(BITMAP_START);
                header.total_blocks = u16::to_le_bytes(total as u16);
                blk.set_header(&header.to_bytes());
            }
            self.write_dir_block(*b,&blk)?;
        }
        let bitmap_blocks = Bitmap::blocks_for(total);
        let mut map = Bitmap {
            ptr: BITMAP_START,
            total,
            buf: vec![0;bitmap_blocks*BLOCK_SIZE]
        };
        for b in BITMAP_START as usize + bitmap_blocks..total {
            map.deallocate(b);
        }
        self.write_bitmap(&map)
    }
}

impl DiskFS for Disk {
    fn kind(&self) -> FsKind {
        FsKind::Prodos
    }
    fn disk_name(&self) -> Result<String,DYNERR> {
        Ok(format!("/{}/",self.vol_header()?.name()))
    }
    fn supports_deleted_files(&self) -> bool {
        false
    }
    fn supports_directories(&self) -> bool {
        true
    }
    fn list_files(&self,dir: Option<&FileEntry>) -> Result<Vec<FileEntry>,DYNERR> {
        let key = self.dir_key(dir)?;
        let mut ans = Vec::new();
        for (addr,blk) in self.dir_chain(key)? {
            for idx in 0..ENTRIES_PER_BLOCK {
                if addr==key && idx==0 {
                    continue;
                }
                let entry = blk.entry(idx);
                if entry.is_active() {
                    ans.push(self.to_file_entry(addr,idx,&entry));
                }
            }
        }
        Ok(ans)
    }
    fn compute_usage_map(&self) -> Result<UsageMap,DYNERR> {
        let map = self.read_bitmap()?;
        let mut ans = UsageMap::new(map.total,BLOCK_SIZE);
        for b in 0..map.total {
            if !map.is_free(b) {
                ans.mark_used(b);
            }
        }
        Ok(ans)
    }
    fn total_capacity(&self) -> usize {
        match self.total_blocks() {
            Ok(total) => total*BLOCK_SIZE,
            Err(_) => self.img.borrow().byte_capacity()
        }
    }
    fn read_file_data(&self,file: &FileEntry) -> Result<Vec<u8>,DYNERR> {
        let (_,_,_,entry) = self.verify_entry(file)?;
        if entry.storage_type()==StorageType::SubDirEntry as u8 {
            error!("{} is a directory",file.name);
            return Err(Box::new(Error::BadFileType));
        }
        let eof = entry.eof();
        let mut ans = Vec::new();
        for b in self.file_blocks(&entry)?.data {
            match b {
                0 => ans.append(&mut vec![0;BLOCK_SIZE]),
                _ => ans.append(&mut self.read_block(b)?)
            }
        }
        if eof > ans.len() {
            warn!("file {} is shorter than its EOF",file.name);
        }
        ans.truncate(eof);
        Ok(ans)
    }
    fn write_file_data(&mut self,file: &FileEntry,dat: &[u8]) -> Result<FileEntry,DYNERR> {
        let (addr,mut blk,idx,mut entry) = self.verify_entry(file)?;
        if entry.storage_type()==StorageType::SubDirEntry as u8 {
            error!("{} is a directory",file.name);
            return Err(Box::new(Error::BadFileType));
        }
        if entry.is_locked() {
            error!("{} is locked",file.name);
            return Err(Box::new(Error::Locked));
        }
        if dat.len() > MAX_EOF {
            error!("{} bytes will not fit in a ProDOS file",dat.len());
            return Err(Box::new(Error::UnsupportedOperation));
        }
        let stype = StorageType::for_eof(dat.len());
        let data_count = usize::max(1,(dat.len() + BLOCK_SIZE - 1) / BLOCK_SIZE);
        let index_count = match stype {
            StorageType::Seedling => 0,
            StorageType::Sapling => 1,
            _ => 1 + (data_count + 255) / 256
        };
        // allocate on a copy of the bitmap, nothing is written unless all of it succeeds
        let mut map = self.read_bitmap()?;
        self.free_file_blocks(&mut map,&entry)?;
        let index = map.take(index_count)?;
        let data = map.take(data_count)?;
        debug!("writing {} data blocks, {} index blocks",data_count,index_count);
        for (i,b) in data.iter().enumerate() {
            let end = usize::min((i+1)*BLOCK_SIZE,dat.len());
            let beg = usize::min(i*BLOCK_SIZE,end);
            self.write_block(*b,&crate::img::quantize_block(&dat[beg..end],BLOCK_SIZE))?;
        }
        let key = match stype {
            StorageType::Seedling => data[0],
            StorageType::Sapling => {
                self.write_block(index[0],&pack_index(&data))?;
                index[0]
            },
            _ => {
                let subs = &index[1..];
                for (i,chunk) in data.chunks(256).enumerate() {
                    self.write_block(subs[i],&pack_index(chunk))?;
                }
                self.write_block(index[0],&pack_index(subs))?;
                index[0]
            }
        };
        entry.change_storage_type(stype);
        entry.set_ptr(key);
        entry.set_eof(dat.len());
        entry.set_blocks_used((data_count + index_count) as u16);
        entry.aux_type = u16::to_le_bytes(file.aux);
        entry.last_mod = pack::pack_time(None);
        blk.set_entry(idx,&entry);
        self.write_dir_block(addr,&blk)?;
        self.write_bitmap(&map)?;
        Ok(self.to_file_entry(addr,idx,&entry))
    }
    fn create_file(&mut self,dir: Option<&FileEntry>,name: &str,typ: &str) -> Result<FileEntry,DYNERR> {
        let file_type = match self.config.prodos_code(typ) {
            Some(code) if code!=DIR_FILE_TYPE => code,
            _ => {
                error!("unknown ProDOS file type {}",typ);
                return Err(Box::new(Error::BadFileType));
            }
        };
        let (addr,idx,entry) = self.add_entry(dir,name,StorageType::Seedling,file_type)?;
        Ok(self.to_file_entry(addr,idx,&entry))
    }
    fn create_directory(&mut self,dir: Option<&FileEntry>,name: &str) -> Result<FileEntry,DYNERR> {
        let (addr,idx,mut entry) = self.add_entry(dir,name,StorageType::SubDirEntry,DIR_FILE_TYPE)?;
        entry.set_eof(BLOCK_SIZE);
        let mut blk = self.read_dir_block(addr)?;
        blk.set_entry(idx,&entry);
        self.write_dir_block(addr,&blk)?;
        let (nibs,fname) = pack::string_to_file_name(StorageType::SubDirHeader,name)?;
        let mut header = SubDirHeader::new();
        header.stor_len_nibs = nibs;
        header.name = fname;
        header.pad1[0] = 0x75;
        header.create_time = entry.create_time;
        header.access = STD_ACCESS;
        header.entry_len = ENTRY_LEN as u8;
        header.entries_per_block = ENTRIES_PER_BLOCK as u8;
        header.parent_ptr = u16::to_le_bytes(addr);
        header.parent_entry_num = idx as u8 + 1;
        header.parent_entry_len = ENTRY_LEN as u8;
        let mut key_block = DirBlock::new();
        key_block.set_header(&header.to_bytes());
        self.write_dir_block(entry.get_ptr(),&key_block)?;
        Ok(self.to_file_entry(addr,idx,&entry))
    }
    fn delete_file(&mut self,file: &FileEntry) -> STDRESULT {
        let (addr,mut blk,idx,mut entry) = self.verify_entry(file)?;
        if !entry.can(Access::Destroy) {
            error!("{} is locked",file.name);
            return Err(Box::new(Error::Locked));
        }
        let mut map = self.read_bitmap()?;
        if entry.storage_type()==StorageType::SubDirEntry as u8 {
            let chain = self.dir_chain(entry.get_ptr())?;
            if chain[0].1.file_count() > 0 {
                error!("{} is not empty",file.name);
                return Err(Box::new(Error::DirectoryNotEmpty));
            }
            for (b,_) in chain {
                map.deallocate(b as usize);
            }
        } else {
            self.free_file_blocks(&mut map,&entry)?;
        }
        let parent_key = u16::from_le_bytes(entry.header_ptr);
        entry.change_storage_type(StorageType::Inactive);
        blk.set_entry(idx,&entry);
        self.write_dir_block(addr,&blk)?;
        self.write_bitmap(&map)?;
        self.bump_file_count(parent_key,-1)
    }
    fn rename(&mut self,file: &FileEntry,name: &str) -> Result<FileEntry,DYNERR> {
        let (addr,mut blk,idx,mut entry) = self.verify_entry(file)?;
        if !entry.can(Access::Rename) {
            error!("{} is locked",file.name);
            return Err(Box::new(Error::Locked));
        }
        if !pack::is_name_valid(name) {
            return Err(Box::new(Error::BadName));
        }
        let parent_key = u16::from_le_bytes(entry.header_ptr);
        if !name.eq_ignore_ascii_case(&file.name) && self.find_in_dir(parent_key,name)?.is_some() {
            return Err(Box::new(Error::DuplicateFilename));
        }
        entry.rename(name)?;
        blk.set_entry(idx,&entry);
        self.write_dir_block(addr,&blk)?;
        if entry.storage_type()==StorageType::SubDirEntry as u8 {
            let mut key_block = self.read_dir_block(entry.get_ptr())?;
            let mut header = key_block.sub_header();
            let (nibs,fname) = pack::string_to_file_name(StorageType::SubDirHeader,name)?;
            header.stor_len_nibs = nibs;
            header.name = fname;
            key_block.set_header(&header.to_bytes());
            self.write_dir_block(entry.get_ptr(),&key_block)?;
        }
        Ok(self.to_file_entry(addr,idx,&entry))
    }
    fn lock(&mut self,file: &FileEntry) -> STDRESULT {
        let (addr,mut blk,idx,mut entry) = self.verify_entry(file)?;
        entry.access &= !LOCK_MASK;
        blk.set_entry(idx,&entry);
        self.write_dir_block(addr,&blk)
    }
    fn unlock(&mut self,file: &FileEntry) -> STDRESULT {
        let (addr,mut blk,idx,mut entry) = self.verify_entry(file)?;
        entry.access |= LOCK_MASK;
        blk.set_entry(idx,&entry);
        self.write_dir_block(addr,&blk)
    }
    fn format(&mut self,vol_name: &str) -> STDRESULT {
        let total = usize::min(self.img.borrow().block_count(),0xffff);
        if total < 16 {
            error!("{} blocks is too small for ProDOS",total);
            return Err(Box::new(crate::img::Error::ImageSizeMismatch));
        }
        self.init(vol_name,total)
    }
    /// Paths may start with the volume name, e.g. `/NEW.DISK/HELLO`
    fn find(&self,path: &str) -> Result<FileEntry,DYNERR> {
        let mut dir: Option<FileEntry> = None;
        let mut components: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if path.starts_with('/') && components.len() > 1 && components[0].eq_ignore_ascii_case(&self.vol_header()?.name()) {
            components.remove(0);
        }
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
