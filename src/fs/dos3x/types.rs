use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use std::str::FromStr;
use a2kit_macro::{DiskStruct,DiskStructError};
use a2kit_macro_derive::DiskStruct;

pub const VTOC_TRACK: u8 = 17;
pub const MAX_DIRECTORY_REPS: usize = 100;
pub const MAX_TSLIST_REPS: usize = 1000;
pub const MAX_PAIRS: u8 = 0x7a;
pub const ENTRIES_PER_SECTOR: usize = 7;
pub const ENTRY_SIZE: usize = 35;
/// the bitmap has room for 50 tracks
pub const MAX_TRACKS: usize = 50;
pub const MAX_SECTORS: usize = 32;

/// Enumerates the DOS file types, available conversions are:
/// * FileType to u8: `as u8`
/// * u8 to FileType: `FileType::from_u8`, (use FromPrimitive trait), lock bit must be masked
/// * &str to FileType: `FileType::from_str`, str can be a number or the catalog letter
#[derive(FromPrimitive,Clone,Copy,Debug,PartialEq)]
pub enum FileType {
    Text = 0x00,
    Integer = 0x01,
    Applesoft = 0x02,
    Binary = 0x04,
    SType = 0x08,
    Relocatable = 0x10,
    AType = 0x20,
    BType = 0x40
}

impl FileType {
    /// Letter shown by `CATALOG`
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Self::Text => "T",
            Self::Integer => "I",
            Self::Applesoft => "A",
            Self::Binary => "B",
            Self::SType => "S",
            Self::Relocatable => "R",
            Self::AType => "a",
            Self::BType => "b"
        }
    }
    /// Get the mnemonic for a raw type byte, lock bit is ignored
    pub fn mnemonic_from_code(code: u8) -> String {
        match Self::from_u8(code & 0x7f) {
            Some(typ) => typ.mnemonic().to_string(),
            None => format!("${:02X}",code & 0x7f)
        }
    }
}

impl FromStr for FileType {
    type Err = crate::fs::Error;
    fn from_str(s: &str) -> Result<Self,Self::Err> {
        // string can be the number itself
        if let Ok(num) = u8::from_str(s) {
            return match FileType::from_u8(num) {
                Some(typ) => Ok(typ),
                _ => Err(crate::fs::Error::BadFileType)
            };
        }
        match s {
            "T" | "t" | "txt" => Ok(Self::Text),
            "I" | "i" | "itok" => Ok(Self::Integer),
            "A" | "atok" => Ok(Self::Applesoft),
            "B" | "bin" => Ok(Self::Binary),
            "S" | "s" => Ok(Self::SType),
            "R" | "r" | "rel" => Ok(Self::Relocatable),
            "a" => Ok(Self::AType),
            "b" => Ok(Self::BType),
            _ => Err(crate::fs::Error::BadFileType)
        }
    }
}

/// Volume table of contents, track 17 sector 0 of a standard disk.
/// The bitmap has 4 bytes per track, big endian, bit set = free.
#[derive(DiskStruct,Clone,Copy,Debug,PartialEq)]
pub struct VTOC {
    pub pad1: u8,
    pub track1: u8,
    pub sector1: u8,
    pub version: u8,
    pub pad2: [u8;2],
    pub vol: u8,
    pub pad3: [u8;32],
    pub max_pairs: u8,
    pub pad4: [u8;8],
    pub last_track: u8,
    pub last_direction: u8,
    pub pad5: [u8;2],
    pub tracks: u8,
    pub sectors: u8,
    pub bytes: [u8;2],
    pub bitmap: [u8;200]
}

impl VTOC {
    /// Bitmap of one track, tracks past the end of the bitmap read as fully used
    fn track_map(&self,track: u8) -> u32 {
        let i = track as usize * 4;
        match self.bitmap.get(i..i+4) {
            Some(bm) => u32::from_be_bytes([bm[0],bm[1],bm[2],bm[3]]),
            None => 0
        }
    }
    fn save_track_map(&mut self,track: u8,map: u32) {
        let i = track as usize * 4;
        if let Some(bm) = self.bitmap.get_mut(i..i+4) {
            bm.copy_from_slice(&u32::to_be_bytes(map));
        }
    }
    /// Geometry fits the bitmap and the catalog track is on the disk
    pub fn is_sane(&self) -> bool {
        self.tracks > 0 && self.tracks as usize <= MAX_TRACKS
            && self.sectors > 0 && self.sectors as usize <= MAX_SECTORS
            && self.track1 < self.tracks
    }
    fn eff_sec(&self,sector: u8) -> u32 {
        (sector as u32 + 32).saturating_sub(self.sectors as u32)
    }
    pub fn is_free(&self,track: u8,sector: u8) -> bool {
        if track >= self.tracks || sector >= self.sectors {
            return false;
        }
        self.track_map(track) & (1 << self.eff_sec(sector)) > 0
    }
    pub fn allocate(&mut self,track: u8,sector: u8) {
        if track < self.tracks && sector < self.sectors {
            let map = self.track_map(track) & !(1 << self.eff_sec(sector));
            self.save_track_map(track,map);
        }
    }
    pub fn deallocate(&mut self,track: u8,sector: u8) {
        if track < self.tracks && sector < self.sectors {
            let map = self.track_map(track) | (1 << self.eff_sec(sector));
            self.save_track_map(track,map);
        }
    }
    pub fn count_free(&self) -> usize {
        let mut ans = 0;
        for track in 0..self.tracks {
            for sector in 0..self.sectors {
                if self.is_free(track,sector) {
                    ans += 1;
                }
            }
        }
        ans
    }
    /// Mark a whole track free or used
    pub fn set_track(&mut self,track: u8,free: bool) {
        let map: u32 = match (free,self.sectors) {
            (false,_) => 0,
            (true,s) if s>=32 => u32::MAX,
            (true,s) => u32::MAX << (32 - s as u32)
        };
        self.save_track_map(track,map);
    }
    /// Free sector search, starting from the last track allocated and moving away from
    /// the catalog track, sectors are taken from the top down.  Track 0 is never used.
    pub fn next_free(&self) -> Option<[u8;2]> {
        let tvtoc = self.track1;
        let tstart = match self.last_track {
            x if x>=self.tracks || x==0 => tvtoc.saturating_sub(1),
            x => x
        };
        let tend = self.tracks;
        let search_tracks: Vec<u8> = match tstart < tvtoc {
            true => [
                (1..tstart+1).rev().collect::<Vec<u8>>(),
                (tvtoc+1..tend).collect(),
                (tstart+1..tvtoc).rev().collect()
            ].concat(),
            false => [
                (tstart..tend).collect::<Vec<u8>>(),
                (1..tvtoc).rev().collect(),
                (tvtoc+1..tstart).collect()
            ].concat()
        };
        for track in search_tracks {
            if track==tvtoc {
                continue;
            }
            for sector in (0..self.sectors).rev() {
                if self.is_free(track,sector) {
                    return Some([track,sector]);
                }
            }
        }
        None
    }
    /// Allocate the next free sector and remember the track for the next search
    pub fn take_next(&mut self) -> Option<[u8;2]> {
        let ts = self.next_free()?;
        self.allocate(ts[0],ts[1]);
        if ts[0] < self.track1 {
            self.last_direction = 255;
        } else {
            self.last_direction = 1;
        }
        self.last_track = ts[0];
        Some(ts)
    }
}

#[derive(DiskStruct,Clone,Copy,Debug,PartialEq)]
pub struct CatalogEntry {
    pub tsl_track: u8,
    pub tsl_sector: u8,
    pub file_type: u8,
    pub name: [u8;30], // negative ASCII, padded with 0xa0
    pub sectors: [u8;2]
}

/// One sector of the catalog chain.  Entries with `tsl_track==0` were never used,
/// entries with `tsl_track==0xff` are deleted.
#[derive(Clone,Copy,Debug,PartialEq)]
pub struct CatalogSector {
    pub pad1: u8,
    pub next_track: u8,
    pub next_sector: u8,
    pub pad2: [u8;8],
    pub entries: [CatalogEntry;ENTRIES_PER_SECTOR]
}

impl DiskStruct for CatalogSector {
    fn new() -> Self {
        Self {
            pad1: 0,
            next_track: 0,
            next_sector: 0,
            pad2: [0;8],
            entries: [CatalogEntry::new();ENTRIES_PER_SECTOR]
        }
    }
    fn from_bytes(dat: &[u8]) -> Result<Self,DiskStructError> {
        let mut ans = Self::new();
        ans.update_from_bytes(dat)?;
        Ok(ans)
    }
    fn to_bytes(&self) -> Vec<u8> {
        let mut ans = vec![self.pad1,self.next_track,self.next_sector];
        ans.extend_from_slice(&self.pad2);
        for entry in &self.entries {
            ans.append(&mut entry.to_bytes());
        }
        ans
    }
    fn update_from_bytes(&mut self,dat: &[u8]) -> Result<(),DiskStructError> {
        if dat.len() < self.len() {
            return Err(DiskStructError::UnexpectedSize);
        }
        self.pad1 = dat[0];
        self.next_track = dat[1];
        self.next_sector = dat[2];
        self.pad2.copy_from_slice(&dat[3..11]);
        for i in 0..ENTRIES_PER_SECTOR {
            self.entries[i] = CatalogEntry::from_bytes(&dat[11+i*ENTRY_SIZE..11+(i+1)*ENTRY_SIZE])?;
        }
        Ok(())
    }
    fn len(&self) -> usize {
        11 + ENTRIES_PER_SECTOR*ENTRY_SIZE
    }
}

/// Track/sector list sector, `pairs` holds 122 [track,sector] pairs
#[derive(DiskStruct,Clone,Copy,Debug,PartialEq)]
pub struct TrackSectorList {
    pub pad1: u8,
    pub next_track: u8,
    pub next_sector: u8,
    pub pad2: [u8;2],
    pub sector_base: [u8;2], // file sector offset of the first pair
    pub pad3: [u8;5],
    pub pairs: [u8;244]
}
