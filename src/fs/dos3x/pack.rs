//! Conversions between user data and the bytes DOS stores in the sectors of a file.

use log::{debug,info,error};
use num_traits::FromPrimitive;
use super::types::FileType;
use crate::fs::Error;
use crate::DYNERR;

/// This will accept lower case; case will be automatically converted as appropriate
pub fn is_name_valid(s: &str) -> bool {
    for char in s.chars() {
        if !char.is_ascii() || char.is_ascii_control() {
            debug!("bad file name character `{}` (codepoint {})",char,char as u32);
            return false;
        }
    }
    if s.len()<1 {
        info!("file name is empty");
        return false;
    }
    if s.len()>30 {
        info!("file name too long, max 30");
        return false;
    }
    if s.contains(',') {
        info!("file name cannot contain a comma");
        return false;
    }
    true
}

pub fn file_name_to_string(fname: &[u8]) -> String {
    // fname is negative ASCII padded to the end with spaces
    let ans: String = fname.iter().map(|b| match b & 0x7f {
        c if c < 0x20 => '.',
        c => c as char
    }).collect();
    ans.trim_end().to_string()
}

pub fn string_to_file_name(s: &str) -> [u8;30] {
    let mut ans: [u8;30] = [0xa0;30];
    for (i,b) in s.to_uppercase().bytes().take(30).enumerate() {
        ans[i] = b | 0x80;
    }
    ans
}

/// Put the header DOS expects in front of the data, `aux` is the load address for binary files
pub fn pack(file_type: u8,aux: u16,dat: &[u8]) -> Result<Vec<u8>,DYNERR> {
    let typ = FileType::from_u8(file_type & 0x7f);
    let header_needed = matches!(typ,Some(FileType::Binary) | Some(FileType::Applesoft) | Some(FileType::Integer));
    if header_needed && dat.len() > u16::MAX as usize {
        error!("{} bytes cannot be described by a 16 bit length",dat.len());
        return Err(Box::new(Error::UnsupportedOperation));
    }
    let len = u16::to_le_bytes(dat.len() as u16);
    Ok(match typ {
        Some(FileType::Binary) => [u16::to_le_bytes(aux).to_vec(),len.to_vec(),dat.to_vec()].concat(),
        Some(FileType::Applesoft) | Some(FileType::Integer) => [len.to_vec(),dat.to_vec()].concat(),
        _ => dat.to_vec()
    })
}

/// Strip the header, returns (aux,data).  Files without a header are returned whole.
pub fn unpack(file_type: u8,raw: &[u8]) -> Result<(u16,Vec<u8>),DYNERR> {
    let (aux,hdr) = match FileType::from_u8(file_type & 0x7f) {
        Some(FileType::Binary) => {
            if raw.len() < 4 {
                return Ok((0,Vec::new()));
            }
            (u16::from_le_bytes([raw[0],raw[1]]),4)
        },
        Some(FileType::Applesoft) | Some(FileType::Integer) => {
            if raw.len() < 2 {
                return Ok((0,Vec::new()));
            }
            (0,2)
        },
        _ => return Ok((0,raw.to_vec()))
    };
    let len = u16::from_le_bytes([raw[hdr-2],raw[hdr-1]]) as usize;
    if hdr + len > raw.len() {
        error!("file length {} runs past the last sector",len);
        return Err(Box::new(Error::CorruptFilesystem));
    }
    Ok((aux,raw[hdr..hdr+len].to_vec()))
}
