//! ## Sector Skewing Module
//! 
//! This contains all the sector skew tables.  This includes any non-trivial transformations
//! between blocks and sectors.
//! 
//! The sector skews are kept separate from file systems and disk images because multiple
//! submodules of either can use the same tables.

use log::trace;
use crate::img::Error;

/// Translate DOS 3.3 logical sector to physical sector
pub const DOS_LSEC_TO_DOS_PSEC: [usize;16] = [0,13,11,9,7,5,3,1,14,12,10,8,6,4,2,15];
/// Translate DOS 3.3 physical sector to logical sector
pub const DOS_PSEC_TO_DOS_LSEC: [usize;16] = [0,7,14,6,13,5,12,4,11,3,10,2,9,1,8,15];

/// RDOS works with the 13 sectors of a DOS 3.2 track.  Its sector numbers are the physical ones.
/// Once the disk is copied to a 16 sector image the physical sector lands on this DOS logical sector.
pub const RDOS_LSEC_TO_DOS_LSEC: [usize;13] = [0,7,14,6,13,5,12,4,11,3,10,2,9];

/// Take a 256 byte CP/M sector (pair of 128 byte records) to DOS logical sector.
/// The Apple CP/M BIOS places its records with this interleave.
pub const CPM_LSEC_TO_DOS_LSEC: [usize;16] = [0,6,12,3,9,15,14,5,11,2,8,7,13,4,10,1];

/// Block offset within a track, indexed by DOS logical sector
const BLOCK_OFFSET: [usize;16] = [0,7,6,6,5,5,4,4,3,3,2,2,1,1,0,7];
/// Byte offset within a block, indexed by DOS logical sector
const BYTE_OFFSET: [usize;16] = [0,0,256,0,256,0,256,0,256,0,256,0,256,0,256,256];

/// Get block number and byte offset into block corresponding to
/// track and logical sector.  Returned in tuple (block,offset)
pub fn prodos_block_from_ts(track: usize,sector: usize) -> Result<(usize,usize),Error> {
    if sector >= 16 {
        return Err(Error::OutOfRange);
    }
    Ok((8*track + BLOCK_OFFSET[sector], BYTE_OFFSET[sector]))
}

/// Get the two track and logical sector pairs holding a ProDOS block on a 16 sector disk.
/// The first pair holds bytes 0..256, the second bytes 256..512.
pub fn ts_from_prodos_block(block: usize) -> [[usize;2];2] {
    let sector1: [usize;8] = [0,13,11,9,7,5,3,1];
    let sector2: [usize;8] = [14,12,10,8,6,4,2,15];
    let [track,sec1,sec2] = [block/8,sector1[block%8],sector2[block%8]];
    trace!("locate block {}: track {}, sectors {},{}",block,track,sec1,sec2);
    [[track,sec1],[track,sec2]]
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn block_mapping_is_invertible() {
        for block in 0..280 {
            let pairs = ts_from_prodos_block(block);
            assert_eq!(prodos_block_from_ts(pairs[0][0],pairs[0][1]).unwrap(),(block,0));
            assert_eq!(prodos_block_from_ts(pairs[1][0],pairs[1][1]).unwrap(),(block,256));
        }
    }

    #[test]
    fn skews_are_permutations() {
        for psec in 0..16 {
            assert_eq!(DOS_LSEC_TO_DOS_PSEC[DOS_PSEC_TO_DOS_LSEC[psec]],psec);
        }
        let mut seen = [false;16];
        for lsec in CPM_LSEC_TO_DOS_LSEC {
            seen[lsec] = true;
        }
        assert!(seen.iter().all(|x| *x));
        assert_eq!(RDOS_LSEC_TO_DOS_LSEC[..],DOS_PSEC_TO_DOS_LSEC[0..13]);
    }

    #[test]
    fn bad_sector() {
        assert!(prodos_block_from_ts(0,16).is_err());
    }
}
