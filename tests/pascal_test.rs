// test of Pascal file system module
use a2disk::{Image,ImageKind};
use a2disk::fs::{DiskFS,FsKind,EntryLocation,FileEntry,Error};
use a2disk::fs::pascal::Disk;
use a2disk::fs::pascal::types::{encode_text,decode_text};

fn new_volume(kind: ImageKind) -> (Image,Disk) {
    let image = Image::create(kind);
    let mut disk = Disk::from_img(image.shared());
    disk.format("blank").expect("format failed");
    (image,disk)
}

fn extent(entry: &FileEntry) -> (u16,u16) {
    match entry.loc {
        EntryLocation::Pascal { begin, end, .. } => (begin,end),
        _ => panic!("wrong location")
    }
}

fn assert_no_overlap(disk: &Disk) {
    let mut extents: Vec<(u16,u16)> = disk.list_files(None).unwrap().iter().map(extent).collect();
    extents.sort();
    let mut last_end = 6;
    for (begin,end) in extents {
        assert!(begin >= last_end);
        assert!(end > begin);
        last_end = end;
    }
}

#[test]
fn format() {
    let (image,disk) = new_volume(ImageKind::Dos140);
    assert_eq!(disk.disk_name().unwrap(),"BLANK:");
    assert_eq!(disk.used_space().unwrap(),6*512);
    assert_eq!(disk.list_files(None).unwrap().len(),0);
    let vols = image.formatted_volumes();
    assert_eq!(vols.len(),1);
    assert_eq!(vols[0].kind(),FsKind::Pascal);
}

#[test]
fn round_trips() {
    let (_image,mut disk) = new_volume(ImageKind::Dos140);
    for len in [0,1,511,512,513] {
        let name = format!("DATA{}",len);
        let file = disk.create_file(None,&name,"bin").expect("create failed");
        let dat: Vec<u8> = (0..len).map(|x| (x%239) as u8).collect();
        let file = disk.write_file_data(&file,&dat).expect("write failed");
        assert_eq!(file.eof,len);
        assert_eq!(disk.read_file_data(&file).unwrap(),dat);
        assert_eq!(disk.free_space().unwrap() + disk.used_space().unwrap(),disk.total_capacity());
    }
    assert_no_overlap(&disk);
}

#[test]
fn text_file() {
    let (_image,mut disk) = new_volume(ImageKind::Dos140);
    let file = disk.create_file(None,"HELLO.TEXT","txt").expect("create failed");
    let mut src = String::new();
    for i in 0..30 {
        src += &format!("LINE {:03}\n",i);
    }
    assert_eq!(src.len(),300);
    let file = disk.write_file_data(&file,src.as_bytes()).expect("write failed");
    assert_eq!(file.blocks,(300 + 511)/512 + 2);
    let stored = disk.read_file_data(&file).unwrap();
    assert_eq!(stored,encode_text(src.as_bytes()).unwrap());
    assert_eq!(decode_text(&stored),src.as_bytes().to_vec());
}

#[test]
fn short_text_files() {
    let (_image,mut disk) = new_volume(ImageKind::Dos140);
    for (name,src,lines) in [("A.TEXT",&b"A"[..],&b"A\n"[..]),("X.TEXT",&b"X\r\n"[..],&b"X\n"[..])] {
        let file = disk.create_file(None,name,"txt").expect("create failed");
        let file = disk.write_file_data(&file,src).expect("write failed");
        assert_eq!(file.blocks,3);
        let stored = disk.read_file_data(&file).unwrap();
        assert_eq!(stored.len(),1536);
        assert_eq!(stored,encode_text(src).unwrap());
        assert_eq!(decode_text(&stored),lines.to_vec());
    }
}

#[test]
fn extents_stay_apart() {
    let (_image,mut disk) = new_volume(ImageKind::Dos140);
    for name in ["A","B","C","D"] {
        let file = disk.create_file(None,name,"bin").expect("create failed");
        disk.write_file_data(&file,&[0x11;1100]).expect("write failed");
    }
    assert_no_overlap(&disk);
    disk.delete_file(&disk.find("B").unwrap()).expect("delete failed");
    let file = disk.find("A").unwrap();
    // too big for the hole, so A moves past D
    disk.write_file_data(&file,&[0x22;4000]).expect("write failed");
    assert_no_overlap(&disk);
    let e = disk.create_file(None,"E","bin").expect("create failed");
    // first fit puts the new file in the hole left by A and B
    assert_eq!(extent(&e).0,6);
    assert_no_overlap(&disk);
    assert_eq!(disk.free_space().unwrap() + disk.used_space().unwrap(),disk.total_capacity());
}

#[test]
fn unsupported_and_full() {
    let (_image,mut disk) = new_volume(ImageKind::Dos140);
    let file = disk.create_file(None,"BIG","bin").expect("create failed");
    match disk.lock(&file) {
        Err(e) => assert_eq!(e.downcast_ref::<Error>(),Some(&Error::UnsupportedOperation)),
        Ok(_) => panic!("lock should fail")
    }
    let free_before = disk.free_space().unwrap();
    match disk.write_file_data(&file,&vec![0;280*512]) {
        Err(e) => assert_eq!(e.downcast_ref::<Error>(),Some(&Error::DiskFull)),
        Ok(_) => panic!("write should fail")
    }
    assert_eq!(disk.free_space().unwrap(),free_before);
}

#[test]
fn large_volume() {
    let (image,disk) = new_volume(ImageKind::Prodos(1600));
    assert_eq!(disk.total_capacity(),1600*512);
    let vols = image.formatted_volumes();
    assert_eq!(vols.len(),1);
    assert_eq!(vols[0].kind(),FsKind::Pascal);
}
