//! ## Support for ProDOS ordered disk images (PO,HDV,DSK)
//! 
//! These images are a simple sequential dump of 512 byte blocks.
//! Sector requests are mapped to the block half that a DOS ordered disk would put them in.
//! N.b. the ordering cannot be verified until we get up to the file system layer.

use log::{debug,warn,error};
use crate::bios::skew;
use super::{Error,DiskImage,DiskImageType,ImageLayout,BLOCK_SIZE,SECTOR_SIZE};
use crate::{STDRESULT,DYNERR};

const MAX_BLOCKS: usize = 65535;
const MIN_BLOCKS: usize = 280;

pub fn file_extensions() -> Vec<String> {
    vec!["po".to_string(),"hdv".to_string(),"dsk".to_string()]
}

/// Some hard disk images are stored short.  If the ProDOS volume header in block 2 declares
/// more blocks than are present, pad the buffer out to the declared size.
/// This must happen before any volume is detected on the image.
pub fn repair_short_image(layout: &mut ImageLayout) -> STDRESULT {
    if layout.len() % BLOCK_SIZE > 0 {
        let rounded = BLOCK_SIZE * (1 + layout.len() / BLOCK_SIZE);
        layout.grow(rounded)?;
    }
    if layout.len() < 3*BLOCK_SIZE {
        return Ok(());
    }
    let key = layout.read(2*BLOCK_SIZE,BLOCK_SIZE)?;
    let declared = u16::from_le_bytes([key[0x29],key[0x2a]]) as usize;
    if key[0]==0 && key[1]==0 && key[4] & 0xf0 == 0xf0 && declared*BLOCK_SIZE > layout.len() {
        warn!("image has {} blocks, volume declares {}",layout.len()/BLOCK_SIZE,declared);
        layout.grow(declared*BLOCK_SIZE)?;
    }
    Ok(())
}

/// Wrapper for PO data.
pub struct ProdosOrder {
    layout: ImageLayout
}

impl ProdosOrder {
    /// Create an empty image with the given number of blocks
    pub fn create(blocks: u16) -> Self {
        Self {
            layout: ImageLayout::blank(blocks as usize * BLOCK_SIZE)
        }
    }
    /// Take ownership of the layout if its size is plausible for a block device
    pub fn from_layout(layout: ImageLayout) -> Result<Self,(Error,ImageLayout)> {
        let len = layout.len();
        if len==0 || len%BLOCK_SIZE > 0 || len/BLOCK_SIZE > MAX_BLOCKS {
            debug!("size {} is not a block device",len);
            return Err((Error::ImageSizeMismatch,layout));
        }
        if len/BLOCK_SIZE < MIN_BLOCKS {
            warn!("small block device with {} blocks",len/BLOCK_SIZE);
        }
        Ok(Self { layout })
    }
    pub fn into_layout(self) -> ImageLayout {
        self.layout
    }
}

impl DiskImage for ProdosOrder {
    fn what_am_i(&self) -> DiskImageType {
        DiskImageType::PO
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
        self.block_count()/8
    }
    fn block_count(&self) -> usize {
        self.layout.len()/BLOCK_SIZE
    }
    fn read_sector(&self,track: usize,sector: usize) -> Result<Vec<u8>,DYNERR> {
        if track >= self.track_count() {
            error!("track {} is out of range",track);
            return Err(Box::new(Error::OutOfRange));
        }
        let (block,offset) = skew::prodos_block_from_ts(track,sector)?;
        Ok(self.layout.read(block*BLOCK_SIZE+offset,SECTOR_SIZE)?)
    }
    fn write_sector(&mut self,track: usize,sector: usize,dat: &[u8]) -> STDRESULT {
        if track >= self.track_count() {
            error!("track {} is out of range",track);
            return Err(Box::new(Error::OutOfRange));
        }
        let (block,offset) = skew::prodos_block_from_ts(track,sector)?;
        let padded = super::quantize_block(dat,SECTOR_SIZE);
        Ok(self.layout.write(block*BLOCK_SIZE+offset,&padded)?)
    }
    fn read_block(&self,block: usize) -> Result<Vec<u8>,DYNERR> {
        if block >= self.block_count() {
            error!("block {} is out of range",block);
            return Err(Box::new(Error::OutOfRange));
        }
        Ok(self.layout.read(block*BLOCK_SIZE,BLOCK_SIZE)?)
    }
    fn write_block(&mut self,block: usize,dat: &[u8]) -> STDRESULT {
        if block >= self.block_count() {
            error!("block {} is out of range",block);
            return Err(Box::new(Error::OutOfRange));
        }
        let padded = super::quantize_block(dat,BLOCK_SIZE);
        Ok(self.layout.write(block*BLOCK_SIZE,&padded)?)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sector_lands_in_block_half() {
        let mut img = ProdosOrder::create(280);
        img.write_sector(1,14,&[0xaa;256]).expect("write failed");
        // track 1 sector 14 is the second half of block 8
        let block = img.read_block(8).expect("read failed");
        assert_eq!(block[256],0xaa);
        assert_eq!(block[255],0);
        assert!(img.read_block(280).is_err());
        assert!(img.read_sector(35,0).is_err());
    }

    #[test]
    fn grow_declared() {
        let mut dat = vec![0;4*BLOCK_SIZE];
        dat[2*BLOCK_SIZE+4] = 0xf5;
        dat[2*BLOCK_SIZE+0x29] = 0x40;
        dat[2*BLOCK_SIZE+0x2a] = 0x01;
        let mut layout = ImageLayout::new(dat);
        repair_short_image(&mut layout).expect("repair failed");
        assert_eq!(layout.len(),320*BLOCK_SIZE);
    }
}
