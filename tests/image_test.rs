// test of image containers, saving, and loading
use std::rc::Rc;
use a2disk::{Image,ImageKind,open_image};
use a2disk::config::Config;
use a2disk::img::{self,DiskImageType};
use a2disk::img::dot2mg::TwoImg;
use a2disk::fs::{DiskFS,FsKind};
use a2disk::fs::{prodos,dos3x};

fn prodos_image(blocks: u16) -> Image {
    let image = Image::create(ImageKind::Prodos(blocks));
    let mut disk = prodos::Disk::from_img(image.shared(),image.config());
    disk.format("SAVE.ME").expect("format failed");
    let file = disk.create_file(None,"HELLO","TXT").expect("create failed");
    disk.write_file_data(&file,b"HELLO WORLD\r").expect("write failed");
    image
}

fn dos_image() -> Image {
    let image = Image::create(ImageKind::Dos140);
    let mut disk = dos3x::Disk::from_img(image.shared(),dos3x::DosLayout::Standard);
    disk.format("100").expect("format failed");
    image
}

fn read_hello(image: &Image) -> Vec<u8> {
    let vols = image.formatted_volumes();
    assert_eq!(vols.len(),1);
    vols[0].read_file_data(&vols[0].find("HELLO").unwrap()).unwrap()
}

#[test]
fn save_and_reload() {
    let dir = tempfile::tempdir().expect("no temp dir");
    let path = dir.path().join("test.po");
    let mut image = prodos_image(280);
    assert!(image.is_dirty());
    image.save_as(&path).expect("save failed");
    assert!(!image.is_dirty());
    assert_eq!(std::fs::metadata(&path).unwrap().len(),280*512);
    let reloaded = open_image(&path.to_string_lossy()).expect("open failed");
    assert!(!reloaded.is_dirty());
    assert_eq!(reloaded.order(),DiskImageType::PO);
    assert_eq!(read_hello(&reloaded),b"HELLO WORLD\r".to_vec());
}

#[test]
fn modify_then_save() {
    let dir = tempfile::tempdir().expect("no temp dir");
    let path = dir.path().join("dos.do");
    let mut image = dos_image();
    image.save_as(&path).expect("save failed");
    let mut image = open_image(&path.to_string_lossy()).expect("open failed");
    {
        let mut vols = image.formatted_volumes();
        let file = vols[0].create_file(None,"ADDED","T").expect("create failed");
        vols[0].write_file_data(&file,b"TEXT").expect("write failed");
    }
    assert!(image.is_dirty());
    image.save().expect("save failed");
    let reloaded = open_image(&path.to_string_lossy()).expect("open failed");
    let vols = reloaded.formatted_volumes();
    assert_eq!(vols[0].kind(),FsKind::Dos33);
    assert_eq!(vols[0].list_files(None).unwrap().len(),1);
}

#[test]
fn gzip_container() {
    let dir = tempfile::tempdir().expect("no temp dir");
    let path = dir.path().join("test.po.gz");
    let mut image = prodos_image(280);
    image.save_as(&path).expect("save failed");
    let file_bytes = std::fs::read(&path).unwrap();
    assert_eq!(&file_bytes[0..2],&[0x1f,0x8b]);
    assert!(file_bytes.len() < 280*512);
    let reloaded = open_image(&path.to_string_lossy()).expect("open failed");
    assert_eq!(read_hello(&reloaded),b"HELLO WORLD\r".to_vec());
    // saving again keeps the compression
    assert_eq!(&reloaded.to_file_bytes().unwrap()[0..2],&[0x1f,0x8b]);
}

#[test]
fn two_img_container() {
    let image = prodos_image(280);
    let raw = image.to_file_bytes().unwrap();
    let mut wrapper = TwoImg::create(DiskImageType::PO,raw.len());
    wrapper.set_comment("disk of the month");
    let file_bytes = wrapper.wrap(&raw);
    // the name says dsk, the header says PO
    let reloaded = Image::from_bytes(&file_bytes,"monthly.dsk",Rc::new(Config::default())).expect("load failed");
    assert_eq!(reloaded.order(),DiskImageType::PO);
    assert_eq!(read_hello(&reloaded),b"HELLO WORLD\r".to_vec());
    let saved = reloaded.to_file_bytes().unwrap();
    assert_eq!(saved.len(),64 + 280*512 + 17);
    let (header,_) = TwoImg::unwrap(&saved).unwrap();
    assert_eq!(header.comment(),"disk of the month");
}

#[test]
fn write_protected_2mg() {
    let image = dos_image();
    let raw = image.to_file_bytes().unwrap();
    let mut wrapper = TwoImg::create(DiskImageType::DO,raw.len());
    wrapper.set_write_protected(true);
    let reloaded = Image::from_bytes(&wrapper.wrap(&raw),"locked.2mg",Rc::new(Config::default())).expect("load failed");
    let mut vols = reloaded.formatted_volumes();
    assert_eq!(vols.len(),1);
    match vols[0].create_file(None,"NOPE","T") {
        Err(e) => assert_eq!(e.downcast_ref::<img::Error>(),Some(&img::Error::WriteProtected)),
        Ok(_) => panic!("write protect was ignored")
    }
    assert!(!reloaded.is_dirty());
}

#[test]
fn short_hdv_is_repaired() {
    let image = prodos_image(400);
    let mut raw = image.to_file_bytes().unwrap();
    raw.truncate(100*512);
    let repaired = Image::from_bytes(&raw,"short.hdv",Rc::new(Config::default())).expect("load failed");
    assert!(repaired.is_dirty());
    let vols = repaired.formatted_volumes();
    assert_eq!(vols[0].total_capacity(),400*512);
    assert_eq!(repaired.to_file_bytes().unwrap().len(),400*512);
}

#[test]
fn save_as_changes_container() {
    let dir = tempfile::tempdir().expect("no temp dir");
    let mut image = prodos_image(280);
    let path = dir.path().join("wrapped.2mg");
    image.save_as(&path).expect("save failed");
    let file_bytes = std::fs::read(&path).unwrap();
    assert!(TwoImg::is_2img(&file_bytes));
    let path = dir.path().join("plain.po");
    image.save_as(&path).expect("save failed");
    assert_eq!(std::fs::read(&path).unwrap().len(),280*512);
    assert_eq!(image.path(),Some(path.as_path()));
}

#[test]
fn bad_sizes() {
    let cfg = Rc::new(Config::default());
    assert!(Image::from_bytes(&[0;1000],"odd.do",cfg.clone()).is_err());
    assert!(Image::from_bytes(&[0;1000],"odd.nib",cfg.clone()).is_err());
    assert!(Image::from_bytes(&[0;143360],"not2mg.2mg",cfg).is_err());
}
