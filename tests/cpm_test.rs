// test of CP/M file system module
use a2disk::{Image,ImageKind};
use a2disk::img::DiskImage;
use a2disk::fs::{DiskFS,FsKind,Error};
use a2disk::fs::cpm::Disk;
use a2disk::bios::skew::CPM_LSEC_TO_DOS_LSEC;

fn new_volume() -> (Image,Disk) {
    let image = Image::create(ImageKind::Dos140);
    let mut disk = Disk::from_img(image.shared());
    disk.format("").expect("format failed");
    (image,disk)
}

/// Put a one extent file in directory slot 0, the data goes in block 2
fn plant_file(image: &Image,user: u8,name: &[u8;11],records: u8,fill: u8) {
    let img = image.shared();
    let mut dir = img.borrow().read_sector(3,0).unwrap();
    dir[0] = user;
    dir[1..12].copy_from_slice(name);
    dir[12..15].copy_from_slice(&[0,0,0]);
    dir[15] = records;
    dir[16..32].copy_from_slice(&[0;16]);
    dir[16] = 2;
    img.borrow_mut().write_sector(3,0,&dir).unwrap();
    // block 2 starts at CP/M sector 8
    for j in 0..4 {
        img.borrow_mut().write_sector(3,CPM_LSEC_TO_DOS_LSEC[8+j],&[fill;256]).unwrap();
    }
}

#[test]
fn format() {
    let (image,disk) = new_volume();
    assert_eq!(disk.list_files(None).unwrap().len(),0);
    assert_eq!(disk.used_space().unwrap(),2*1024);
    assert_eq!(disk.total_capacity(),128*1024);
    let vols = image.formatted_volumes();
    assert_eq!(vols.len(),1);
    assert_eq!(vols[0].kind(),FsKind::Cpm);
}

#[test]
fn read_planted_file() {
    let (image,disk) = new_volume();
    plant_file(&image,0,b"STAT    COM",5,0x3a);
    let files = disk.list_files(None).unwrap();
    assert_eq!(files.len(),1);
    assert_eq!(files[0].name,"STAT.COM");
    assert_eq!(files[0].file_type,"COM");
    assert_eq!(files[0].eof,5*128);
    assert_eq!(disk.read_file_data(&files[0]).unwrap(),vec![0x3a;5*128]);
    assert_eq!(disk.used_space().unwrap(),3*1024);
    assert_eq!(disk.free_space().unwrap() + disk.used_space().unwrap(),disk.total_capacity());
}

#[test]
fn user_numbers() {
    let (image,disk) = new_volume();
    plant_file(&image,3,b"NOTES   TXT",1,0x41);
    let file = disk.find("3:NOTES.TXT").expect("find failed");
    assert_eq!(disk.read_file_data(&file).unwrap(),vec![0x41;128]);
}

#[test]
fn delete_rename_lock() {
    let (image,mut disk) = new_volume();
    plant_file(&image,0,b"PIP     COM",8,0xc9);
    let file = disk.find("PIP.COM").unwrap();
    disk.lock(&file).expect("lock failed");
    let file = disk.find("PIP.COM").unwrap();
    assert!(file.locked);
    match disk.delete_file(&file) {
        Err(e) => assert_eq!(e.downcast_ref::<Error>(),Some(&Error::Locked)),
        Ok(_) => panic!("locked file was deleted")
    }
    disk.unlock(&file).expect("unlock failed");
    let file = disk.rename(&file,"copy.com").expect("rename failed");
    assert_eq!(file.name,"COPY.COM");
    disk.delete_file(&file).expect("delete failed");
    assert_eq!(disk.list_files(None).unwrap().len(),0);
    assert_eq!(disk.list_deleted().unwrap().len(),1);
    assert_eq!(disk.used_space().unwrap(),2*1024);
}

#[test]
fn writes_unsupported() {
    let (image,mut disk) = new_volume();
    match disk.create_file(None,"NEW.TXT","TXT") {
        Err(e) => assert_eq!(e.downcast_ref::<Error>(),Some(&Error::UnsupportedOperation)),
        Ok(_) => panic!("create should fail")
    }
    plant_file(&image,0,b"OLD     TXT",1,0x20);
    let file = disk.find("OLD.TXT").unwrap();
    match disk.write_file_data(&file,b"HELLO") {
        Err(e) => assert_eq!(e.downcast_ref::<Error>(),Some(&Error::UnsupportedOperation)),
        Ok(_) => panic!("write should fail")
    }
}
