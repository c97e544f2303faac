// test of file system detection
use std::rc::Rc;
use a2disk::{Image,ImageKind,detect_volumes};
use a2disk::config::Config;
use a2disk::img::DiskImageType;
use a2disk::fs::{DiskFS,FsKind};
use a2disk::fs::{dos3x,prodos,pascal,rdos,cpm};

/// Format a blank image with the given file system and return the file bytes
fn formatted_bytes(kind: ImageKind,fs: FsKind) -> Vec<u8> {
    let image = Image::create(kind);
    let img = image.shared();
    let res = match fs {
        FsKind::Dos33 => dos3x::Disk::from_img(img,dos3x::DosLayout::Standard).format("254"),
        FsKind::Prodos => prodos::Disk::from_img(img,image.config()).format("DETECT.ME"),
        FsKind::Pascal => pascal::Disk::from_img(img).format("DETECT"),
        FsKind::Rdos => rdos::Disk::from_img(img).format(""),
        FsKind::Cpm => cpm::Disk::from_img(img).format(""),
        _ => panic!("use the double volume test")
    };
    res.expect("format failed");
    image.to_file_bytes().expect("encode failed")
}

fn kinds(image: &Image) -> Vec<FsKind> {
    image.formatted_volumes().iter().map(|v| v.kind()).collect()
}

fn load(bytes: &[u8],name: &str) -> Image {
    let _ = env_logger::builder().is_test(true).try_init();
    Image::from_bytes(bytes,name,Rc::new(Config::default())).expect("load failed")
}

#[test]
fn blank_and_garbage() {
    assert!(kinds(&load(&vec![0;143360],"blank.do")).is_empty());
    assert!(kinds(&load(&vec![0xff;143360],"junk.dsk")).is_empty());
    assert!(kinds(&load(&vec![0;1600*512],"blank.po")).is_empty());
}

#[test]
fn every_floppy_format() {
    for fs in [FsKind::Dos33,FsKind::Prodos,FsKind::Pascal,FsKind::Rdos,FsKind::Cpm] {
        let bytes = formatted_bytes(ImageKind::Dos140,fs);
        assert_eq!(kinds(&load(&bytes,"floppy.do")),vec![fs]);
        let image = load(&bytes,"floppy.dsk");
        assert_eq!(image.order(),DiskImageType::DO);
        assert_eq!(kinds(&image),vec![fs]);
        // detecting again gives the same answer
        assert_eq!(kinds(&image),vec![fs]);
    }
}

#[test]
fn prodos_ordered_dsk() {
    for fs in [FsKind::Prodos,FsKind::Pascal] {
        let bytes = formatted_bytes(ImageKind::Prodos(280),fs);
        let image = load(&bytes,"ordered.dsk");
        assert_eq!(image.order(),DiskImageType::PO);
        assert_eq!(kinds(&image),vec![fs]);
    }
}

#[test]
fn unknown_extension() {
    let bytes = formatted_bytes(ImageKind::Dos140,FsKind::Dos33);
    assert_eq!(kinds(&load(&bytes,"mystery.bin")),vec![FsKind::Dos33]);
    let bytes = formatted_bytes(ImageKind::Nib140,FsKind::Dos33);
    let image = load(&bytes,"mystery");
    assert_eq!(image.order(),DiskImageType::NIB);
    assert_eq!(kinds(&image),vec![FsKind::Dos33]);
}

#[test]
fn nibble_formats() {
    let bytes = formatted_bytes(ImageKind::Nib140,FsKind::Dos33);
    assert_eq!(kinds(&load(&bytes,"disk.nib")),vec![FsKind::Dos33]);
    let bytes = formatted_bytes(ImageKind::Nib140,FsKind::Prodos);
    assert_eq!(kinds(&load(&bytes,"disk.nib")),vec![FsKind::Prodos]);
}

#[test]
fn double_volumes() {
    for (v0,v1) in [(dos3x::DosLayout::UniDos(0),dos3x::DosLayout::UniDos(1)),(dos3x::DosLayout::OzDos(0),dos3x::DosLayout::OzDos(1))] {
        let image = Image::create(ImageKind::Prodos(1600));
        dos3x::Disk::from_img(image.shared(),v0).format("1").expect("format failed");
        dos3x::Disk::from_img(image.shared(),v1).format("2").expect("format failed");
        let found = detect_volumes(&image.shared(),&image.config());
        assert_eq!(found.len(),2);
        let bytes = image.to_file_bytes().unwrap();
        let reloaded = load(&bytes,"double.po");
        let vols = reloaded.formatted_volumes();
        assert_eq!(vols.len(),2);
        assert_eq!(vols[0].kind(),found[0].kind());
        assert_eq!(vols[1].kind(),found[1].kind());
        assert_eq!(vols[0].disk_name().unwrap(),"DISK VOLUME 1");
        assert_eq!(vols[1].disk_name().unwrap(),"DISK VOLUME 2");
    }
}

#[test]
fn shared_image_sees_writes() {
    let image = load(&formatted_bytes(ImageKind::Prodos(280),FsKind::Prodos),"shared.po");
    let mut first = image.formatted_volumes().remove(0);
    let second = image.formatted_volumes().remove(0);
    let file = first.create_file(None,"SEEN","BIN").expect("create failed");
    first.write_file_data(&file,&[1,2,3]).expect("write failed");
    let seen = second.find("SEEN").expect("second volume does not see the file");
    assert_eq!(second.read_file_data(&seen).unwrap(),vec![1,2,3]);
    assert!(image.is_dirty());
}
