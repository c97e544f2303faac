//! ## Image Layout
//!
//! The layout owns the raw image bytes for the whole session.  Containers are removed
//! when the file is loaded and put back when it is saved:
//! * gzip, recognized by the magic bytes `1F 8B`
//! * 2IMG, recognized by the magic `2IMG`, see `dot2mg`
//!
//! Every mutation sets the dirty flag, which is cleared only by a save.

use std::io::{Read,Write};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{debug,info,error};
use super::dot2mg::TwoImg;
use super::{Error,DiskImageType};
use crate::{STDRESULT,DYNERR};

/// Wrapping found around the disk data
#[derive(Clone,Debug,PartialEq)]
pub enum Container {
    Raw,
    TwoImg(TwoImg)
}

pub struct ImageLayout {
    buf: Vec<u8>,
    dirty: bool,
    gzip: bool,
    container: Container
}

fn is_gzip(dat: &[u8]) -> bool {
    dat.len() > 2 && dat[0]==0x1f && dat[1]==0x8b
}

impl ImageLayout {
    /// Wrap a raw buffer that came from storage, the layout is clean
    pub fn new(buf: Vec<u8>) -> Self {
        Self {
            buf,
            dirty: false,
            gzip: false,
            container: Container::Raw
        }
    }
    /// Create a zeroed buffer, this is a new image so it starts dirty
    pub fn blank(len: usize) -> Self {
        Self {
            buf: vec![0;len],
            dirty: true,
            gzip: false,
            container: Container::Raw
        }
    }
    /// Decode the bytes of an image file, removing gzip and 2IMG wrappers
    pub fn from_file_bytes(file_bytes: &[u8]) -> Result<Self,DYNERR> {
        let mut gzip = false;
        let mut dat = file_bytes.to_vec();
        if is_gzip(&dat) {
            let mut decoder = GzDecoder::new(&file_bytes[..]);
            let mut inflated: Vec<u8> = Vec::new();
            decoder.read_to_end(&mut inflated)?;
            info!("inflated gzip container, {} bytes",inflated.len());
            dat = inflated;
            gzip = true;
        }
        if TwoImg::is_2img(&dat) {
            let (header,data) = TwoImg::unwrap(&dat)?;
            info!("identified 2IMG container ({})",header.image_type()?);
            return Ok(Self {
                buf: data,
                dirty: false,
                gzip,
                container: Container::TwoImg(header)
            });
        }
        Ok(Self {
            buf: dat,
            dirty: false,
            gzip,
            container: Container::Raw
        })
    }
    /// Encode the image file bytes, restoring the containers found at load time
    pub fn to_file_bytes(&self) -> Result<Vec<u8>,DYNERR> {
        let mut ans = match &self.container {
            Container::Raw => self.buf.clone(),
            Container::TwoImg(header) => header.wrap(&self.buf)
        };
        if self.gzip {
            let mut encoder = GzEncoder::new(Vec::new(),Compression::default());
            encoder.write_all(&ans)?;
            ans = encoder.finish()?;
            debug!("deflated image to {} bytes",ans.len());
        }
        Ok(ans)
    }
    pub fn len(&self) -> usize {
        self.buf.len()
    }
    pub fn get_bytes(&self) -> &[u8] {
        &self.buf
    }
    /// Replace the whole buffer, the length must not change
    pub fn set_bytes(&mut self,dat: &[u8]) -> STDRESULT {
        if dat.len()!=self.buf.len() {
            error!("cannot replace {} byte image with {} bytes",self.buf.len(),dat.len());
            return Err(Box::new(Error::ImageSizeMismatch));
        }
        self.check_write()?;
        self.buf.copy_from_slice(dat);
        self.dirty = true;
        Ok(())
    }
    pub fn read(&self,offset: usize,len: usize) -> Result<Vec<u8>,Error> {
        match offset.checked_add(len) {
            Some(end) if end <= self.buf.len() => Ok(self.buf[offset..end].to_vec()),
            _ => {
                debug!("read of {} bytes at {} is outside image",len,offset);
                Err(Error::OutOfRange)
            }
        }
    }
    pub fn write(&mut self,offset: usize,dat: &[u8]) -> Result<(),Error> {
        match offset.checked_add(dat.len()) {
            Some(end) if end <= self.buf.len() => {
                self.check_write()?;
                self.buf[offset..end].copy_from_slice(dat);
                self.dirty = true;
                Ok(())
            },
            _ => {
                debug!("write of {} bytes at {} is outside image",dat.len(),offset);
                Err(Error::OutOfRange)
            }
        }
    }
    fn check_write(&self) -> Result<(),Error> {
        if let Container::TwoImg(header) = &self.container {
            if header.write_protected() {
                error!("2IMG disk is write protected");
                return Err(Error::WriteProtected);
            }
        }
        Ok(())
    }
    /// Repair for images stored short; pads with zeros up to `new_len`, never shrinks
    pub fn grow(&mut self,new_len: usize) -> STDRESULT {
        if new_len < self.buf.len() {
            return Err(Box::new(Error::ImageSizeMismatch));
        }
        if new_len > self.buf.len() {
            info!("growing image from {} to {} bytes",self.buf.len(),new_len);
            self.buf.resize(new_len,0);
            self.dirty = true;
        }
        Ok(())
    }
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
    /// Call after the bytes from `to_file_bytes` are safely stored
    pub fn mark_saved(&mut self) {
        self.dirty = false;
    }
    pub fn is_gzip(&self) -> bool {
        self.gzip
    }
    pub fn set_gzip(&mut self,gzip: bool) {
        self.gzip = gzip;
    }
    pub fn container(&self) -> &Container {
        &self.container
    }
    /// Put a 2IMG header around the data when saving
    pub fn set_container(&mut self,container: Container) {
        self.container = container;
    }
    /// Ordering declared by the container, if any
    pub fn declared_order(&self) -> Option<DiskImageType> {
        match &self.container {
            Container::TwoImg(header) => header.image_type().ok(),
            Container::Raw => None
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn range_checks() {
        let mut layout = ImageLayout::new(vec![0;1024]);
        assert!(!layout.is_dirty());
        assert_eq!(layout.read(1000,24).unwrap().len(),24);
        assert_eq!(layout.read(1000,25),Err(Error::OutOfRange));
        assert_eq!(layout.read(usize::MAX,2),Err(Error::OutOfRange));
        assert_eq!(layout.write(1020,&[1,2,3,4,5]),Err(Error::OutOfRange));
        assert!(!layout.is_dirty());
        layout.write(1020,&[1,2,3,4]).expect("write failed");
        assert!(layout.is_dirty());
        layout.mark_saved();
        assert!(!layout.is_dirty());
    }

    #[test]
    fn gzip_round_trip() {
        let mut layout = ImageLayout::new((0..2048).map(|x| (x%251) as u8).collect());
        layout.set_gzip(true);
        let file_bytes = layout.to_file_bytes().expect("deflate failed");
        assert!(is_gzip(&file_bytes));
        let reloaded = ImageLayout::from_file_bytes(&file_bytes).expect("inflate failed");
        assert!(reloaded.is_gzip());
        assert_eq!(reloaded.get_bytes(),layout.get_bytes());
    }

    #[test]
    fn grow_short_image() {
        let mut layout = ImageLayout::new(vec![1;100]);
        layout.grow(512).expect("grow failed");
        assert_eq!(layout.len(),512);
        assert_eq!(layout.get_bytes()[511],0);
        assert!(layout.grow(10).is_err());
    }
}
