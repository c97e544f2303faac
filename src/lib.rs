//! # `a2disk` main library
//!
//! This library manipulates Apple II disk images: it works out how the sectors are ordered in the
//! image file, which file systems are on the disk, and then gives access to the files.
//!
//! ## Architecture
//!
//! Disk image operations are built around two traits:
//! * `img::DiskImage` translates track/sector or block addresses into the image buffer, does not try to interpret a file system
//! * `fs::DiskFS` imposes a file system on the already decoded sector data
//!
//! The `Image` session owns the image through a `SharedImage`.  Each `fs::FormattedVolume` found on the
//! image holds another reference, so changes made through any volume show up in the image at once.
//! Changes are not permanent until the image is saved to whatever file system is hosting a2disk.
//!
//! ## File Systems
//!
//! As of this writing `a2disk` supports
//! * DOS 3.3, including the UniDOS and OzDOS double volumes on 800K disks
//! * ProDOS
//! * Pascal File System
//! * RDOS 2.1
//! * CP/M on the 140K Apple II disk
//!
//! ## Disk Images
//!
//! In order to manipulate tracks and sectors, `a2disk` must understand the way the track data is packed
//! into a disk image.  As of this writing `a2disk` supports
//! * DSK, DO, PO, HDV
//! * NIB
//! * 2MG
//! * any of the above compressed with gzip, e.g. `disk.po.gz`

pub mod config;
pub mod bios;
pub mod img;
pub mod fs;

use std::path::{Path,PathBuf};
use std::rc::Rc;
use log::{debug,info,warn,error};
use config::{Config,OrderHint};
use img::{DiskImage,DiskImageType,ImageLayout,ImageOrder,SharedImage};
use img::dsk_do::DosOrder;
use img::dsk_po::ProdosOrder;
use img::nib::NibbleOrder;
use fs::{FormattedVolume,dos3x::DosLayout};

pub type DYNERR = Box<dyn std::error::Error>;
pub type STDRESULT = Result<(),Box<dyn std::error::Error>>;

/// Kinds of blank image that can be created
#[derive(Clone,Copy,Debug,PartialEq,Eq)]
pub enum ImageKind {
    /// 35 track DOS ordered image
    Dos140,
    /// ProDOS ordered image with the given number of blocks
    Prodos(u16),
    /// 35 track nibble image
    Nib140
}

/// An image file loaded into memory, along with the tables used to interpret it
pub struct Image {
    path: Option<PathBuf>,
    img: SharedImage,
    config: Rc<Config>
}

/// Split `disk.po.gz` into (`po`,true)
fn image_extension(name: &str) -> (String,bool) {
    let lower = name.to_lowercase();
    let (stem,gz) = match lower.strip_suffix(".gz") {
        Some(s) => (s.to_string(),true),
        None => (lower,false)
    };
    let ext = match Path::new(&stem).extension() {
        Some(x) => x.to_string_lossy().to_string(),
        None => String::new()
    };
    (ext,gz)
}

/// Take the layout back from an image that no volume refers to any more
fn reclaim_layout(img: SharedImage) -> Result<ImageLayout,DYNERR> {
    match Rc::try_unwrap(img) {
        Ok(cell) => Ok(cell.into_inner().into_layout()),
        Err(_) => {
            error!("image is still in use");
            Err(Box::new(img::Error::ImageTypeMismatch))
        }
    }
}

fn dos_volume(img: &SharedImage,layout: DosLayout) -> FormattedVolume {
    FormattedVolume::Dos(fs::dos3x::Disk::from_img(img.clone(),layout))
}

/// Look for file systems on the image.  Formats are tested in a fixed order and the first match
/// is taken, except that UniDOS and OzDOS produce two volumes.  This never fails, if something
/// goes wrong while probing, that format simply does not match.
pub fn detect_volumes(img: &SharedImage,config: &Rc<Config>) -> Vec<FormattedVolume> {
    let (size,nib) = {
        let order = img.borrow();
        (order.byte_capacity(),order.what_am_i()==DiskImageType::NIB)
    };
    let floppy = img::is_dos_size(size) || nib;
    debug!("probing {} byte image",size);
    if fs::prodos::Disk::test_img(img) {
        info!("identified ProDOS file system");
        return vec![FormattedVolume::Prodos(fs::prodos::Disk::from_img(img.clone(),config.clone()))];
    }
    if size==img::DSK_800K {
        if fs::dos3x::Disk::test_img(img,DosLayout::UniDos(0)) && fs::dos3x::Disk::test_img(img,DosLayout::UniDos(1)) {
            info!("identified UniDOS file system");
            return vec![dos_volume(img,DosLayout::UniDos(0)),dos_volume(img,DosLayout::UniDos(1))];
        }
        if fs::dos3x::Disk::test_img(img,DosLayout::OzDos(0)) && fs::dos3x::Disk::test_img(img,DosLayout::OzDos(1)) {
            info!("identified OzDOS file system");
            return vec![dos_volume(img,DosLayout::OzDos(0)),dos_volume(img,DosLayout::OzDos(1))];
        }
    }
    if floppy && fs::dos3x::Disk::test_img(img,DosLayout::Standard) {
        info!("identified DOS 3.3 file system");
        return vec![dos_volume(img,DosLayout::Standard)];
    }
    if (size==img::DSK_140K || size==img::DSK_800K) && fs::pascal::Disk::test_img(img) {
        info!("identified Pascal file system");
        return vec![FormattedVolume::Pascal(fs::pascal::Disk::from_img(img.clone()))];
    }
    if size==img::DSK_140K {
        if fs::cpm::Disk::test_img(img) {
            info!("identified CP/M file system");
            return vec![FormattedVolume::Cpm(fs::cpm::Disk::from_img(img.clone()))];
        }
        if fs::rdos::Disk::test_img(img) {
            info!("identified RDOS file system");
            return vec![FormattedVolume::Rdos(fs::rdos::Disk::from_img(img.clone()))];
        }
    }
    info!("no file system found");
    Vec::new()
}

/// Put the layout into the ordering suggested by the hint.
/// For the ambiguous hint, DOS order is kept if it reveals a file system, otherwise ProDOS order
/// is tried, and if neither reveals anything we fall back to DOS order.
fn order_layout(layout: ImageLayout,hint: OrderHint,config: &Rc<Config>) -> Result<SharedImage,DYNERR> {
    let hint = match hint {
        OrderHint::Container => match layout.declared_order() {
            Some(DiskImageType::DO) => OrderHint::Dos,
            Some(DiskImageType::PO) => OrderHint::Prodos,
            Some(DiskImageType::NIB) => OrderHint::Nibble,
            None => {
                error!("expected a 2IMG header");
                return Err(Box::new(img::Error::UnknownContainer));
            }
        },
        h => h
    };
    match hint {
        OrderHint::Dos => match DosOrder::from_layout(layout) {
            Ok(order) => Ok(ImageOrder::Dos(order).share()),
            Err((e,_)) => Err(Box::new(e))
        },
        OrderHint::Prodos => match ProdosOrder::from_layout(layout) {
            Ok(order) => Ok(ImageOrder::Prodos(order).share()),
            Err((e,_)) => Err(Box::new(e))
        },
        OrderHint::Nibble => match NibbleOrder::from_layout(layout) {
            Ok(order) => Ok(ImageOrder::Nibble(order).share()),
            Err((e,_)) => Err(Box::new(e))
        },
        _ => {
            let layout = match DosOrder::from_layout(layout) {
                Ok(order) => {
                    let img = ImageOrder::Dos(order).share();
                    let found = !detect_volumes(&img,config).is_empty();
                    if found {
                        debug!("keeping DOS order");
                        return Ok(img);
                    }
                    reclaim_layout(img)?
                },
                Err((_,layout)) => layout
            };
            let layout = match ProdosOrder::from_layout(layout) {
                Ok(order) => {
                    let img = ImageOrder::Prodos(order).share();
                    let found = !detect_volumes(&img,config).is_empty();
                    if found {
                        debug!("switching to ProDOS order");
                        return Ok(img);
                    }
                    reclaim_layout(img)?
                },
                Err((_,layout)) => layout
            };
            warn!("no file system in either order");
            match DosOrder::from_layout(layout) {
                Ok(order) => Ok(ImageOrder::Dos(order).share()),
                Err((e,_)) => Err(Box::new(e))
            }
        }
    }
}

impl Image {
    /// Interpret the bytes of an image file.  The `name` is only used for its extension,
    /// which selects the ordering unless a 2IMG header is found.
    pub fn from_bytes(file_bytes: &[u8],name: &str,config: Rc<Config>) -> Result<Self,DYNERR> {
        let (ext,gz) = image_extension(name);
        let mut layout = ImageLayout::from_file_bytes(file_bytes)?;
        if gz && !layout.is_gzip() {
            warn!("{} was not compressed",name);
        }
        let hint = match (layout.declared_order(),config.order_hint(&ext)) {
            (Some(_),_) => OrderHint::Container,
            (None,Some(h)) => h,
            (None,None) => {
                warn!("unknown extension `{}`, guessing the order",ext);
                match layout.len() {
                    img::nib::NIB_SIZE => OrderHint::Nibble,
                    _ => OrderHint::Either
                }
            }
        };
        if ext=="hdv" {
            img::dsk_po::repair_short_image(&mut layout)?;
        }
        let img = order_layout(layout,hint,&config)?;
        info!("loaded {}",img.borrow().what_am_i());
        Ok(Self {
            path: None,
            img,
            config
        })
    }
    /// Load an image file using the given tables
    pub fn open(path: &Path,config: Rc<Config>) -> Result<Self,DYNERR> {
        let file_bytes = std::fs::read(path)?;
        let mut ans = Self::from_bytes(&file_bytes,&path.to_string_lossy(),config)?;
        ans.path = Some(path.to_path_buf());
        Ok(ans)
    }
    /// Create a blank image, it has no path until `save_as` is called.
    /// The image is dirty from the start.
    pub fn create(kind: ImageKind) -> Self {
        let order = match kind {
            ImageKind::Dos140 => ImageOrder::Dos(DosOrder::create(35)),
            ImageKind::Prodos(blocks) => ImageOrder::Prodos(ProdosOrder::create(blocks)),
            ImageKind::Nib140 => ImageOrder::Nibble(NibbleOrder::create(254))
        };
        Self {
            path: None,
            img: order.share(),
            config: Rc::new(Config::default())
        }
    }
    /// Replace the tables, only affects volumes detected afterwards
    pub fn set_config(&mut self,config: Rc<Config>) {
        self.config = config;
    }
    pub fn config(&self) -> Rc<Config> {
        self.config.clone()
    }
    /// Handle to the image, e.g. for formatting a new volume
    pub fn shared(&self) -> SharedImage {
        self.img.clone()
    }
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
    pub fn order(&self) -> DiskImageType {
        self.img.borrow().what_am_i()
    }
    /// Every logical volume on the image, may be empty
    pub fn formatted_volumes(&self) -> Vec<FormattedVolume> {
        detect_volumes(&self.img,&self.config)
    }
    /// True if anything was written since the image was loaded or saved
    pub fn is_dirty(&self) -> bool {
        self.img.borrow().layout().is_dirty()
    }
    /// Bytes of the image file, with the containers put back
    pub fn to_file_bytes(&self) -> Result<Vec<u8>,DYNERR> {
        self.img.borrow().layout().to_file_bytes()
    }
    /// Write the image back to the file it came from
    pub fn save(&mut self) -> STDRESULT {
        let path = match &self.path {
            Some(p) => p.clone(),
            None => {
                error!("image has no path, use save_as");
                return Err(Box::new(std::io::Error::new(std::io::ErrorKind::NotFound,"image has no path")));
            }
        };
        self.write_to(&path)
    }
    /// Write the image to a new file, which becomes the image's path.
    /// The `.gz` and `.2mg` extensions add those containers, other extensions remove them.
    pub fn save_as(&mut self,path: &Path) -> STDRESULT {
        let (ext,gz) = image_extension(&path.to_string_lossy());
        {
            let mut order = self.img.borrow_mut();
            let typ = order.what_am_i();
            let layout = order.layout_mut();
            layout.set_gzip(gz);
            let is_2mg = img::dot2mg::file_extensions().contains(&ext);
            match (is_2mg,layout.container()) {
                (true,img::layout::Container::Raw) => {
                    let header = img::dot2mg::TwoImg::create(typ,layout.len());
                    layout.set_container(img::layout::Container::TwoImg(header));
                },
                (false,img::layout::Container::TwoImg(_)) => {
                    debug!("dropping 2IMG header");
                    layout.set_container(img::layout::Container::Raw);
                },
                _ => {}
            }
        }
        self.write_to(path)?;
        self.path = Some(path.to_path_buf());
        Ok(())
    }
    fn write_to(&mut self,path: &Path) -> STDRESULT {
        let file_bytes = self.to_file_bytes()?;
        std::fs::write(path,file_bytes)?;
        self.img.borrow_mut().layout_mut().mark_saved();
        info!("saved {}",path.display());
        Ok(())
    }
}

/// Load an image file using the built in tables
pub fn open_image(path: &str) -> Result<Image,DYNERR> {
    Image::open(Path::new(path),Rc::new(Config::default()))
}

#[cfg(test)]
mod test {
    use super::*;
    use fs::DiskFS;

    #[test]
    fn extensions() {
        assert_eq!(image_extension("games/Disk.PO.gz"),("po".to_string(),true));
        assert_eq!(image_extension("x.dsk"),("dsk".to_string(),false));
        assert_eq!(image_extension("noext"),("".to_string(),false));
    }

    #[test]
    fn blank_images() {
        let image = Image::create(ImageKind::Dos140);
        assert!(image.is_dirty());
        assert_eq!(image.order(),DiskImageType::DO);
        assert!(image.formatted_volumes().is_empty());
        assert!(image.path().is_none());
        let image = Image::create(ImageKind::Nib140);
        assert_eq!(image.order(),DiskImageType::NIB);
    }

    #[test]
    fn dsk_falls_back_to_prodos_order() {
        // format ProDOS on a ProDOS ordered image, then load the bytes as a .dsk
        let image = Image::create(ImageKind::Prodos(280));
        let mut vol = fs::prodos::Disk::from_img(image.shared(),image.config());
        vol.format("ORDER.TEST").expect("format failed");
        let file_bytes = image.to_file_bytes().expect("encode failed");
        let reloaded = Image::from_bytes(&file_bytes,"test.dsk",Rc::new(Config::default())).expect("load failed");
        let vols = reloaded.formatted_volumes();
        assert_eq!(vols.len(),1);
        assert_eq!(vols[0].disk_name().unwrap(),"/ORDER.TEST/");
        assert!(!reloaded.is_dirty());
    }

    #[test]
    fn save_without_path() {
        let mut image = Image::create(ImageKind::Dos140);
        assert!(image.save().is_err());
    }
}
