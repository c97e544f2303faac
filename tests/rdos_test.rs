// test of RDOS file system module
use a2disk::{Image,ImageKind};
use a2disk::fs::{DiskFS,FsKind,EntryLocation,FileEntry,Error};
use a2disk::fs::rdos::Disk;
use a2disk::fs::rdos::types::{SYSTEM_NAME,RESERVED_BLOCKS};

fn new_volume() -> (Image,Disk) {
    let image = Image::create(ImageKind::Dos140);
    let mut disk = Disk::from_img(image.shared());
    disk.format("").expect("format failed");
    (image,disk)
}

fn extent(entry: &FileEntry) -> (u16,u16) {
    match entry.loc {
        EntryLocation::Rdos { start, count, .. } => (start,start + count as u16),
        _ => panic!("wrong location")
    }
}

#[test]
fn format() {
    let (image,disk) = new_volume();
    assert_eq!(disk.disk_name().unwrap(),SYSTEM_NAME);
    assert_eq!(disk.used_space().unwrap(),RESERVED_BLOCKS*256);
    let vols = image.formatted_volumes();
    assert_eq!(vols.len(),1);
    assert_eq!(vols[0].kind(),FsKind::Rdos);
}

#[test]
fn round_trips() {
    let (_image,mut disk) = new_volume();
    for len in [0,1,511,512,513] {
        let name = format!("TEST FILE {}",len);
        let mut file = disk.create_file(None,&name,"B").expect("create failed");
        file.aux = 0x6000;
        let dat: Vec<u8> = (0..len).map(|x| (x%233) as u8).collect();
        let file = disk.write_file_data(&file,&dat).expect("write failed");
        assert_eq!(disk.read_file_data(&file).unwrap(),dat);
        assert_eq!(file.aux,0x6000);
        assert_eq!(disk.free_space().unwrap() + disk.used_space().unwrap(),disk.total_capacity());
    }
    // the system entry plus five files
    let files = disk.list_files(None).unwrap();
    assert_eq!(files.len(),6);
    let mut extents: Vec<(u16,u16)> = files.iter().map(extent).collect();
    extents.sort();
    for pair in extents.windows(2) {
        assert!(pair[0].1 <= pair[1].0);
    }
    assert_eq!(extents[0],(0,RESERVED_BLOCKS as u16));
}

#[test]
fn delete_frees_space() {
    let (_image,mut disk) = new_volume();
    let used = disk.used_space().unwrap();
    let file = disk.create_file(None,"APPLESOFT PROG","A").expect("create failed");
    let file = disk.write_file_data(&file,&[0x80;1000]).expect("write failed");
    assert_eq!(disk.used_space().unwrap(),used + 4*256);
    disk.delete_file(&file).expect("delete failed");
    assert_eq!(disk.used_space().unwrap(),used);
    assert!(disk.supports_deleted_files());
    assert_eq!(disk.list_deleted().unwrap().len(),1);
    match disk.read_file_data(&file) {
        Err(e) => assert_eq!(e.downcast_ref::<Error>(),Some(&Error::FileNotFound)),
        Ok(_) => panic!("stale entry was accepted")
    }
}
