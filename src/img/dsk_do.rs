//! ## Support for DOS ordered disk images (DO,DSK)
//! 
//! These images are a simple sequential dump of 256 byte sectors in DOS 3.3 logical order,
//! i.e., sector (t,s) is at offset `t*4096 + s*256`.
//! Block requests are mapped through the ProDOS block to sector table.

use log::{debug,error};
use crate::bios::skew;
use super::{Error,DiskImage,DiskImageType,ImageLayout,SECTOR_SIZE};
use crate::{STDRESULT,DYNERR};

const SECTORS: usize = 16;
const TRACK_SIZE: usize = SECTORS*SECTOR_SIZE;

pub fn file_extensions() -> Vec<String> {
    vec!["do".to_string(),"dsk".to_string()]
}

/// Wrapper for DO data.
pub struct DosOrder {
    layout: ImageLayout
}

impl DosOrder {
    /// Create an empty image with the given number of 16 sector tracks
    pub fn create(tracks: usize) -> Self {
        Self {
            layout: ImageLayout::blank(tracks*TRACK_SIZE)
        }
    }
    /// Take ownership of the layout if its size is a whole number of tracks
    pub fn from_layout(layout: ImageLayout) -> Result<Self,(Error,ImageLayout)> {
        let len = layout.len();
        if len==0 || len%TRACK_SIZE > 0 || len/TRACK_SIZE > 80 {
            debug!("size {} is not a DOS ordered image",len);
            return Err((Error::ImageSizeMismatch,layout));
        }
        Ok(Self { layout })
    }
    pub fn into_layout(self) -> ImageLayout {
        self.layout
    }
    fn offset(&self,track: usize,sector: usize) -> Result<usize,Error> {
        if track >= self.track_count() || sector >= SECTORS {
            error!("track {} sector {} is out of range",track,sector);
            return Err(Error::OutOfRange);
        }
        Ok(track*TRACK_SIZE + sector*SECTOR_SIZE)
    }
}

impl DiskImage for DosOrder {
    fn what_am_i(&self) -> DiskImageType {
        DiskImageType::DO
    }
    fn file_extensions(&self) -> Vec<String> {
        file_extensions()
    }
    fn layout(&self) -> &ImageLayout {
        &self.layout
    }
    fn layout_mut(&mut self) -> &mut ImageLayout {
        &mut self.layout
    }
    fn track_count(&self) -> usize {
        self.layout.len()/TRACK_SIZE
    }
    fn block_count(&self) -> usize {
        self.track_count()*8
    }
    fn read_sector(&self,track: usize,sector: usize) -> Result<Vec<u8>,DYNERR> {
        let offset = self.offset(track,sector)?;
        Ok(self.layout.read(offset,SECTOR_SIZE)?)
    }
    fn write_sector(&mut self,track: usize,sector: usize,dat: &[u8]) -> STDRESULT {
        let offset = self.offset(track,sector)?;
        let padded = super::quantize_block(dat,SECTOR_SIZE);
        Ok(self.layout.write(offset,&padded)?)
    }
    fn read_block(&self,block: usize) -> Result<Vec<u8>,DYNERR> {
        if block >= self.block_count() {
            error!("block {} is out of range",block);
            return Err(Box::new(Error::OutOfRange));
        }
        let mut ans: Vec<u8> = Vec::new();
        for [track,sector] in skew::ts_from_prodos_block(block) {
            ans.append(&mut self.read_sector(track,sector)?);
        }
        Ok(ans)
    }
    fn write_block(&mut self,block: usize,dat: &[u8]) -> STDRESULT {
        if block >= self.block_count() {
            error!("block {} is out of range",block);
            return Err(Box::new(Error::OutOfRange));
        }
        let padded = super::quantize_block(dat,2*SECTOR_SIZE);
        let [first,second] = skew::ts_from_prodos_block(block);
        self.write_sector(first[0],first[1],&padded[0..SECTOR_SIZE])?;
        self.write_sector(second[0],second[1],&padded[SECTOR_SIZE..])
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn linear_sectors() {
        let mut img = DosOrder::create(35);
        img.write_sector(17,0,&[3;256]).expect("write failed");
        assert_eq!(img.layout().get_bytes()[17*4096],3);
        assert_eq!(img.layout().get_bytes()[17*4096+256],0);
        assert_eq!(img.read_sector(35,0).unwrap_err().downcast_ref::<Error>(),Some(&Error::OutOfRange));
        assert!(img.read_sector(0,16).is_err());
    }

    #[test]
    fn block_uses_skew() {
        let mut img = DosOrder::create(35);
        let dat: Vec<u8> = (0..512).map(|x| (x/256 + 1) as u8).collect();
        img.write_block(1,&dat).expect("write failed");
        // block 1 is track 0 sectors 13 and 12
        assert_eq!(img.read_sector(0,13).unwrap(),vec![1;256]);
        assert_eq!(img.read_sector(0,12).unwrap(),vec![2;256]);
        assert_eq!(img.read_block(1).unwrap(),dat);
    }
}
