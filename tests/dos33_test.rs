// test of DOS 3.3 file system module
use a2disk::{Image,ImageKind};
use a2disk::fs::{DiskFS,FsKind,Error};
use a2disk::fs::dos3x::{Disk,DosLayout};

fn new_volume(kind: ImageKind) -> (Image,Disk) {
    let image = Image::create(kind);
    let mut disk = Disk::from_img(image.shared(),DosLayout::Standard);
    disk.format("254").expect("format failed");
    (image,disk)
}

fn assert_fs_err<T: std::fmt::Debug>(res: Result<T,Box<dyn std::error::Error>>,expected: Error) {
    match res {
        Err(e) => assert_eq!(e.downcast_ref::<Error>(),Some(&expected)),
        Ok(x) => panic!("expected {}, got {:?}",expected,x)
    }
}

#[test]
fn format() {
    let (image,disk) = new_volume(ImageKind::Dos140);
    assert_eq!(disk.free_space().unwrap(),35*16*256 - 2*16*256);
    assert_eq!(disk.list_files(None).unwrap().len(),0);
    let vols = image.formatted_volumes();
    assert_eq!(vols.len(),1);
    assert_eq!(vols[0].kind(),FsKind::Dos33);
}

#[test]
fn round_trips() {
    let (_image,mut disk) = new_volume(ImageKind::Dos140);
    for len in [0,1,511,512,513] {
        let name = format!("FILE {}",len);
        let mut file = disk.create_file(None,&name,"B").expect("create failed");
        file.aux = 0x0800;
        let dat: Vec<u8> = (0..len).map(|x| (x%251) as u8).collect();
        let file = disk.write_file_data(&file,&dat).expect("write failed");
        assert_eq!(file.aux,0x0800);
        assert_eq!(disk.read_file_data(&file).unwrap(),dat);
        assert_eq!(disk.free_space().unwrap() + disk.used_space().unwrap(),disk.total_capacity());
    }
    assert_eq!(disk.list_files(None).unwrap().len(),5);
}

#[test]
fn chained_lists() {
    let (_image,mut disk) = new_volume(ImageKind::Dos140);
    let formatted = disk.free_space().unwrap();
    assert_eq!(formatted,135168);
    let mut file = disk.create_file(None,"BIG","B").expect("create failed");
    file.aux = 0x4000;
    // 60004 bytes with the header is 235 data sectors, more than one list holds
    let dat: Vec<u8> = (0..60000).map(|x| (x%253) as u8).collect();
    let file = disk.write_file_data(&file,&dat).expect("write failed");
    assert_eq!(file.blocks,237);
    assert_eq!(file.eof,60000);
    assert_eq!(disk.free_space().unwrap(),formatted - 237*256);
    assert_eq!(disk.read_file_data(&file).unwrap(),dat);
    let reread = disk.find("BIG").unwrap();
    assert_eq!(reread.aux,0x4000);
    assert_eq!(disk.read_file_data(&reread).unwrap(),dat);
    // shrinking gives back both lists and the data
    let file = disk.write_file_data(&reread,&dat[0..100]).expect("write failed");
    assert_eq!(file.blocks,2);
    assert_eq!(disk.free_space().unwrap(),formatted - 2*256);
    assert_eq!(disk.free_space().unwrap() + disk.used_space().unwrap(),disk.total_capacity());
    assert_eq!(disk.read_file_data(&file).unwrap(),dat[0..100].to_vec());
    disk.delete_file(&file).expect("delete failed");
    assert_eq!(disk.free_space().unwrap(),formatted);
}

#[test]
fn applesoft_header() {
    let (_image,mut disk) = new_volume(ImageKind::Dos140);
    let file = disk.create_file(None,"HELLO","A").expect("create failed");
    let prog = vec![0x0a,0x08,0x0a,0x00,0xba,0x22,0x48,0x49,0x22,0x00,0x00,0x00];
    let file = disk.write_file_data(&file,&prog).expect("write failed");
    assert_eq!(disk.read_file_data(&file).unwrap(),prog);
    assert_eq!(file.file_type,"A");
}

#[test]
fn disk_full_leaves_volume_alone() {
    let (_image,mut disk) = new_volume(ImageKind::Dos140);
    let file = disk.create_file(None,"HUGE","B").expect("create failed");
    let free_before = disk.free_space().unwrap();
    let too_big = vec![0x55;free_before + 1024];
    assert_fs_err(disk.write_file_data(&file,&too_big),Error::DiskFull);
    assert_eq!(disk.free_space().unwrap(),free_before);
    let file = disk.find("HUGE").unwrap();
    assert_eq!(disk.read_file_data(&file).unwrap().len(),0);
}

#[test]
fn lock_delete_rename() {
    let (_image,mut disk) = new_volume(ImageKind::Dos140);
    let free_before = disk.free_space().unwrap();
    let file = disk.create_file(None,"KEEP ME","T").expect("create failed");
    disk.lock(&file).expect("lock failed");
    let file = disk.find("KEEP ME").unwrap();
    assert!(file.locked);
    assert_fs_err(disk.delete_file(&file),Error::Locked);
    assert_fs_err(disk.rename(&file,"OTHER"),Error::Locked);
    assert_fs_err(disk.write_file_data(&file,b"HI"),Error::Locked);
    disk.unlock(&file).expect("unlock failed");
    let file = disk.rename(&file,"OTHER").expect("rename failed");
    assert_eq!(file.name,"OTHER");
    disk.create_file(None,"SECOND","T").expect("create failed");
    assert_fs_err(disk.create_file(None,"SECOND","T"),Error::DuplicateFilename);
    disk.delete_file(&disk.find("SECOND").unwrap()).expect("delete failed");
    disk.delete_file(&file).expect("delete failed");
    assert_eq!(disk.free_space().unwrap(),free_before);
    assert_eq!(disk.list_files(None).unwrap().len(),0);
    assert_eq!(disk.list_deleted().unwrap().len(),2);
    // the old entry is stale now
    assert_fs_err(disk.read_file_data(&file),Error::FileNotFound);
}

#[test]
fn nibble_volume() {
    let (image,mut disk) = new_volume(ImageKind::Nib140);
    let file = disk.create_file(None,"NIBBLES","B").expect("create failed");
    let dat: Vec<u8> = (0..700).map(|x| (x%7) as u8).collect();
    let file = disk.write_file_data(&file,&dat).expect("write failed");
    assert_eq!(disk.read_file_data(&file).unwrap(),dat);
    let vols = image.formatted_volumes();
    assert_eq!(vols.len(),1);
    assert_eq!(vols[0].read_file_data(&vols[0].find("NIBBLES").unwrap()).unwrap(),dat);
}
