//! ## Support for NIB disk images
//! 
//! A NIB image is 35 tracks of 6656 nibbles each, i.e., the disk bytes as they come off the
//! read head, with sync bits discarded.  Sectors are found by scanning a track for the address
//! field and decoding the 6-and-2 data field that follows it.  Tracks are treated as circular
//! buffers, so a field may wrap around the end of the track.

use log::{trace,debug,error};
use crate::bios::skew;
use super::{Error,NibbleError,DiskImage,DiskImageType,ImageLayout,SECTOR_SIZE};
use crate::{STDRESULT,DYNERR};

pub const TRACK_BYTE_CAPACITY: usize = 6656;
const TRACKS: usize = 35;
/// Bytes in a 35 track NIB image
pub const NIB_SIZE: usize = TRACKS*TRACK_BYTE_CAPACITY;
const SECTORS: usize = 16;
const CHUNK62: usize = 0x56;
const INVALID_NIB_BYTE: u8 = 0xff;
/// prolog, 4 pairs of 4-and-4 bytes, epilog
const ADDR_FIELD_LEN: usize = 14;
/// 342 nibbles plus the checksum nibble
const DATA_NIBS: usize = 343;
/// the data prolog must appear this soon after the address field
const DATA_SEARCH_WINDOW: usize = 64;

const ADDR_PROLOG: [u8;3] = [0xd5,0xaa,0x96];
const DATA_PROLOG: [u8;3] = [0xd5,0xaa,0xad];
const EPILOG: [u8;3] = [0xde,0xaa,0xeb];

const DISK_BYTES_62: [u8;64] = [
    0x96, 0x97, 0x9a, 0x9b, 0x9d, 0x9e, 0x9f, 0xa6,
    0xa7, 0xab, 0xac, 0xad, 0xae, 0xaf, 0xb2, 0xb3,
    0xb4, 0xb5, 0xb6, 0xb7, 0xb9, 0xba, 0xbb, 0xbc,
    0xbd, 0xbe, 0xbf, 0xcb, 0xcd, 0xce, 0xcf, 0xd3,
    0xd6, 0xd7, 0xd9, 0xda, 0xdb, 0xdc, 0xdd, 0xde,
    0xdf, 0xe5, 0xe6, 0xe7, 0xe9, 0xea, 0xeb, 0xec,
    0xed, 0xee, 0xef, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6,
    0xf7, 0xf9, 0xfa, 0xfb, 0xfc, 0xfd, 0xfe, 0xff
];

pub fn file_extensions() -> Vec<String> {
    vec!["nib".to_string()]
}

fn invert_62() -> [u8;256] {
    let mut ans: [u8;256] = [INVALID_NIB_BYTE;256];
    for i in 0..64 {
        ans[DISK_BYTES_62[i] as usize] = i as u8;
    }
    ans
}

/// encode a byte as two disk bytes, odd bits first
fn encode_44(val: u8) -> [u8;2] {
    [(val >> 1) | 0xaa, val | 0xaa]
}

fn decode_44(nibs: [u8;2]) -> u8 {
    ((nibs[0] << 1) | 0x01) & nibs[1]
}

/// Encode 256 bytes into 343 disk bytes (6-and-2 with checksum)
fn encode_sector(dat: &[u8]) -> [u8;DATA_NIBS] {
    let mut ans: [u8;DATA_NIBS] = [0;DATA_NIBS];
    let mut top: [u8;256] = [0;256];
    let mut twos: [u8;CHUNK62] = [0;CHUNK62];
    for i in 0..256 {
        let val = dat[i];
        top[i] = val >> 2;
        twos[i % CHUNK62] |= ((val & 1) << 1 | (val & 2) >> 1) << (2 * (i / CHUNK62));
    }
    let mut chksum = 0;
    let mut idx = 0;
    for i in 0..CHUNK62 {
        ans[idx] = DISK_BYTES_62[((twos[i] ^ chksum) & 0x3f) as usize];
        chksum = twos[i];
        idx += 1;
    }
    for i in 0..256 {
        ans[idx] = DISK_BYTES_62[((top[i] ^ chksum) & 0x3f) as usize];
        chksum = top[i];
        idx += 1;
    }
    ans[idx] = DISK_BYTES_62[(chksum & 0x3f) as usize];
    ans
}

/// Decode 343 disk bytes into 256 bytes, verifying the checksum
fn decode_sector(nibs: &[u8]) -> Result<Vec<u8>,NibbleError> {
    let inv = invert_62();
    let mut twos: [u8;CHUNK62*3] = [0;CHUNK62*3];
    let mut ans: Vec<u8> = Vec::new();
    let mut chksum = 0;
    for i in 0..CHUNK62 {
        let val = inv[nibs[i] as usize];
        if val==INVALID_NIB_BYTE {
            return Err(NibbleError::InvalidByte);
        }
        chksum ^= val;
        twos[i] = ((chksum & 0x01) << 1) | ((chksum & 0x02) >> 1);
        twos[i + CHUNK62] = ((chksum & 0x04) >> 1) | ((chksum & 0x08) >> 3);
        twos[i + CHUNK62*2] = ((chksum & 0x10) >> 3) | ((chksum & 0x20) >> 5);
    }
    for i in 0..256 {
        let val = inv[nibs[CHUNK62+i] as usize];
        if val==INVALID_NIB_BYTE {
            return Err(NibbleError::InvalidByte);
        }
        chksum ^= val;
        ans.push((chksum << 2) | twos[i]);
    }
    let val = inv[nibs[DATA_NIBS-1] as usize];
    if val==INVALID_NIB_BYTE {
        return Err(NibbleError::InvalidByte);
    }
    if chksum ^ val != 0 {
        return Err(NibbleError::BadChecksum);
    }
    Ok(ans)
}

/// Build a formatted track with empty data fields
fn create_track(vol: u8,track: u8) -> Vec<u8> {
    let mut ans: Vec<u8> = vec![0xff;48];
    let empty = encode_sector(&[0;256]);
    for sector in 0..SECTORS as u8 {
        ans.extend_from_slice(&ADDR_PROLOG);
        ans.extend_from_slice(&encode_44(vol));
        ans.extend_from_slice(&encode_44(track));
        ans.extend_from_slice(&encode_44(sector));
        ans.extend_from_slice(&encode_44(vol ^ track ^ sector));
        ans.extend_from_slice(&EPILOG);
        ans.extend_from_slice(&[0xff;6]);
        ans.extend_from_slice(&DATA_PROLOG);
        ans.extend_from_slice(&empty);
        ans.extend_from_slice(&EPILOG);
        ans.extend_from_slice(&[0xff;27]);
    }
    ans.resize(TRACK_BYTE_CAPACITY,0xff);
    ans
}

/// Wrapper for NIB data.
pub struct NibbleOrder {
    layout: ImageLayout
}

impl NibbleOrder {
    /// Create a 35 track image, every sector formatted and zeroed.
    /// The volume is used to format the address fields on the tracks.
    pub fn create(vol: u8) -> Self {
        let mut buf: Vec<u8> = Vec::new();
        for track in 0..TRACKS {
            buf.append(&mut create_track(vol,track as u8));
        }
        let mut layout = ImageLayout::blank(buf.len());
        layout.set_bytes(&buf).expect("blank layout is sized to the track buffer");
        Self { layout }
    }
    pub fn from_layout(layout: ImageLayout) -> Result<Self,(Error,ImageLayout)> {
        if layout.len()!=TRACKS*TRACK_BYTE_CAPACITY {
            debug!("size {} is not a NIB image",layout.len());
            return Err((Error::ImageSizeMismatch,layout));
        }
        Ok(Self { layout })
    }
    pub fn into_layout(self) -> ImageLayout {
        self.layout
    }
    fn get_track(&self,track: usize) -> Result<&[u8],Error> {
        if track >= TRACKS {
            error!("track {} is out of range",track);
            return Err(Error::OutOfRange);
        }
        Ok(&self.layout.get_bytes()[track*TRACK_BYTE_CAPACITY..(track+1)*TRACK_BYTE_CAPACITY])
    }
    /// Find the offset within the track of the first data nibble for a logical sector.
    fn find_sector_data(&self,track: usize,sector: usize) -> Result<usize,DYNERR> {
        if sector >= SECTORS {
            error!("sector {} is out of range",sector);
            return Err(Box::new(Error::OutOfRange));
        }
        let psec = skew::DOS_LSEC_TO_DOS_PSEC[sector] as u8;
        let trk = self.get_track(track)?;
        let n = trk.len();
        let at = |i: usize| trk[i % n];
        for start in 0..n {
            if [at(start),at(start+1),at(start+2)]!=ADDR_PROLOG {
                continue;
            }
            let fields: Vec<u8> = (0..4).map(|k| decode_44([at(start+3+2*k),at(start+4+2*k)])).collect();
            let (vol,t,s,chk) = (fields[0],fields[1],fields[2],fields[3]);
            if vol ^ t ^ s ^ chk != 0 {
                debug!("address checksum mismatch at track {} offset {}",track,start);
                continue;
            }
            if t as usize!=track || s!=psec {
                continue;
            }
            trace!("found track {} sector {} (physical {}) at {}",track,sector,psec,start);
            let after = start + ADDR_FIELD_LEN;
            for j in after..after+DATA_SEARCH_WINDOW {
                if [at(j),at(j+1),at(j+2)]==DATA_PROLOG {
                    return Ok((j+3) % n);
                }
            }
            break;
        }
        error!("track {} sector {} not found",track,sector);
        Err(Box::new(NibbleError::SectorNotFound))
    }
}

impl DiskImage for NibbleOrder {
    fn what_am_i(&self) -> DiskImageType {
        DiskImageType::NIB
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
        TRACKS
    }
    fn block_count(&self) -> usize {
        TRACKS*8
    }
    fn read_sector(&self,track: usize,sector: usize) -> Result<Vec<u8>,DYNERR> {
        let offset = self.find_sector_data(track,sector)?;
        let trk = self.get_track(track)?;
        let nibs: Vec<u8> = (0..DATA_NIBS).map(|i| trk[(offset+i) % TRACK_BYTE_CAPACITY]).collect();
        match decode_sector(&nibs) {
            Ok(ans) => Ok(ans),
            Err(e) => {
                error!("could not decode track {} sector {}: {}",track,sector,e);
                Err(Box::new(e))
            }
        }
    }
    fn write_sector(&mut self,track: usize,sector: usize,dat: &[u8]) -> STDRESULT {
        let offset = self.find_sector_data(track,sector)?;
        let nibs = encode_sector(&super::quantize_block(dat,SECTOR_SIZE));
        let base = track*TRACK_BYTE_CAPACITY;
        if offset + DATA_NIBS <= TRACK_BYTE_CAPACITY {
            return Ok(self.layout.write(base+offset,&nibs)?);
        }
        let split = TRACK_BYTE_CAPACITY - offset;
        self.layout.write(base+offset,&nibs[0..split])?;
        Ok(self.layout.write(base,&nibs[split..])?)
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
    fn four_and_four() {
        for val in [0u8,0x11,0xfe,0xff] {
            let enc = encode_44(val);
            assert!(enc[0] >= 0xaa && enc[1] >= 0xaa);
            assert_eq!(decode_44(enc),val);
        }
    }

    #[test]
    fn six_and_two() {
        let dat: Vec<u8> = (0..256).map(|x| (x*7 % 256) as u8).collect();
        let nibs = encode_sector(&dat);
        assert!(nibs.iter().all(|b| *b >= 0x96));
        assert_eq!(decode_sector(&nibs).unwrap(),dat);
        let mut bad = nibs;
        bad[100] = 0x00;
        assert_eq!(decode_sector(&bad),Err(NibbleError::InvalidByte));
    }

    #[test]
    fn sector_io() {
        let mut img = NibbleOrder::create(254);
        assert_eq!(img.physical_size(),232960);
        assert_eq!(img.read_sector(17,3).unwrap(),vec![0;256]);
        let dat: Vec<u8> = (0..256).map(|x| x as u8).collect();
        img.write_sector(17,3,&dat).expect("write failed");
        assert_eq!(img.read_sector(17,3).unwrap(),dat);
        assert_eq!(img.read_sector(17,4).unwrap(),vec![0;256]);
        assert!(img.read_sector(35,0).is_err());
    }

    #[test]
    fn missing_sector() {
        let mut img = NibbleOrder::create(254);
        let mut buf = img.layout().get_bytes().to_vec();
        for b in buf[0..TRACK_BYTE_CAPACITY].iter_mut() {
            *b = 0xff;
        }
        img.layout_mut().set_bytes(&buf).expect("set failed");
        let err = img.read_sector(0,0).unwrap_err();
        assert_eq!(err.downcast_ref::<NibbleError>(),Some(&NibbleError::SectorNotFound));
    }
}
