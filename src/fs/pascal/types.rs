use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use std::str::FromStr;
use log::{debug,error};
use crate::fs::Error;

pub const BLOCK_SIZE: usize = 512;
pub const TEXT_PAGE: usize = 1024;
pub const VOL_HEADER_BLOCK: usize = 2;
/// first block after the directory
pub const DIR_END_BLOCK: u16 = 6;
pub const ENTRY_SIZE: usize = 26;
pub const MAX_FILES: usize = 77;
pub const INVALID_CHARS: &str = " $=?,[#:";
const DLE: u8 = 0x10;
const CR: u8 = 0x0d;

/// Map file type codes to strings for display
pub const TYPE_MAP_DISP: [(u8,&str);9] = [
    (0x00, "NONE"),
    (0x01, "BAD"),
    (0x02, "CODE"),
    (0x03, "TEXT"),
    (0x04, "INFO"),
    (0x05, "DATA"),
    (0x06, "GRAF"),
    (0x07, "FOTO"),
    (0x08, "SECURE")
];

/// Enumerates the Pascal file types, available conversions are:
/// * FileType to u8: `as u8`
/// * u8 to FileType: `FileType::from_u8` (use FromPrimitive trait)
/// * &str to FileType: `FileType::from_str`, str can be a number or mnemonic
#[derive(FromPrimitive,Clone,Copy,Debug,PartialEq)]
pub enum FileType {
    Non = 0x00,
    Bad = 0x01,
    Code = 0x02,
    Text = 0x03,
    Info = 0x04,
    Data = 0x05,
    Graf = 0x06,
    Foto = 0x07,
    Secure = 0x08
}

impl FileType {
    pub fn mnemonic(code: u8) -> String {
        match TYPE_MAP_DISP.iter().find(|(c,_)| *c==code) {
            Some((_,m)) => m.to_string(),
            None => format!("${:02X}",code)
        }
    }
}

impl FromStr for FileType {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self,Self::Err> {
        // string can be the number itself
        if let Ok(num) = u8::from_str(s) {
            return match FileType::from_u8(num) {
                Some(typ) => Ok(typ),
                _ => Err(Error::BadFileType)
            };
        }
        let upper = s.to_uppercase();
        if let Some((code,_)) = TYPE_MAP_DISP.iter().find(|(_,m)| *m==upper) {
            if let Some(typ) = FileType::from_u8(*code) {
                return Ok(typ);
            }
        }
        match upper.as_str() {
            "BIN" => Ok(Self::Data),
            "TXT" => Ok(Self::Text),
            "PCODE" => Ok(Self::Code),
            _ => Err(Error::BadFileType)
        }
    }
}

/// Editor header put in front of every text file
fn create_header() -> [u8;TEXT_PAGE] {
    let mut ans: [u8;TEXT_PAGE] = [0;TEXT_PAGE];
    ans[0] = 1;
    ans
}

/// Encode ASCII text as Pascal text: CR line separators, DLE indentation codes, and lines packed
/// into 1024 byte pages that end after a CR.  The editor header comes first.
/// If the second half of the last page is empty it is dropped.
pub fn encode_text(txt: &[u8]) -> Result<Vec<u8>,Error> {
    let mut lines: Vec<&[u8]> = Vec::new();
    let mut beg = 0;
    let mut i = 0;
    while i < txt.len() {
        match txt[i] {
            b'\r' | b'\n' => {
                lines.push(&txt[beg..i]);
                if txt[i]==b'\r' && i+1 < txt.len() && txt[i+1]==b'\n' {
                    i += 1;
                }
                beg = i+1;
            },
            c if c > 127 => {
                error!("text has non-ASCII byte {:02X}",c);
                return Err(Error::BadFileType);
            },
            _ => {}
        }
        i += 1;
    }
    if beg < txt.len() {
        lines.push(&txt[beg..]);
    }
    let mut ans = create_header().to_vec();
    let mut page: Vec<u8> = Vec::new();
    for line in lines {
        let indent = line.iter().take_while(|c| **c==b' ').count();
        let mut enc: Vec<u8> = Vec::new();
        if indent > 0 {
            let mut n = indent;
            // one code holds at most 0xdf spaces
            while n > 0 {
                let chunk = usize::min(n,0xdf);
                enc.push(DLE);
                enc.push(0x20 + chunk as u8);
                n -= chunk;
            }
        }
        enc.extend_from_slice(&line[indent..]);
        enc.push(CR);
        if enc.len() > TEXT_PAGE {
            error!("line of {} bytes will not fit on a text page",enc.len());
            return Err(Error::UnsupportedOperation);
        }
        if page.len() + enc.len() > TEXT_PAGE {
            page.resize(TEXT_PAGE,0);
            ans.append(&mut page);
        }
        page.append(&mut enc);
    }
    if page.len() > 0 {
        page.resize(TEXT_PAGE,0);
        ans.append(&mut page);
    }
    if ans.len() > TEXT_PAGE && ans[ans.len()-BLOCK_SIZE..].iter().all(|b| *b==0) {
        ans.truncate(ans.len()-BLOCK_SIZE);
    }
    debug!("encoded text to {} bytes",ans.len());
    Ok(ans)
}

/// Inverse of `encode_text`, line separators become LF
pub fn decode_text(dat: &[u8]) -> Vec<u8> {
    let mut ans: Vec<u8> = Vec::new();
    let mut await_indent = false;
    for c in dat.iter().skip(TEXT_PAGE) {
        if await_indent {
            for _rep in 0..c.saturating_sub(32) {
                ans.push(b' ');
            }
            await_indent = false;
        } else if *c==CR {
            ans.push(b'\n');
        } else if *c==DLE {
            await_indent = true;
        } else if *c > 0 && *c < 128 {
            ans.push(*c);
        }
    }
    ans
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn type_names() {
        assert_eq!(FileType::from_str("text"),Ok(FileType::Text));
        assert_eq!(FileType::from_str("5"),Ok(FileType::Data));
        assert_eq!(FileType::from_str("bin"),Ok(FileType::Data));
        assert_eq!(FileType::from_str("9"),Err(Error::BadFileType));
        assert_eq!(FileType::mnemonic(2),"CODE");
    }

    #[test]
    fn text_pages() {
        let txt = b"PROGRAM X;\r\n  BEGIN\nEND.";
        let enc = encode_text(txt).expect("encode failed");
        assert_eq!(enc.len(),TEXT_PAGE + BLOCK_SIZE);
        assert_eq!(&enc[TEXT_PAGE..TEXT_PAGE+13],b"PROGRAM X;\r\x10\x22");
        assert_eq!(decode_text(&enc),b"PROGRAM X;\n  BEGIN\nEND.\n".to_vec());
        // lines never straddle a page
        let long: Vec<u8> = [vec![b'A';1000],vec![b'\n'],vec![b'B';100],vec![b'\n']].concat();
        let enc = encode_text(&long).expect("encode failed");
        assert_eq!(enc.len(),3*TEXT_PAGE - BLOCK_SIZE);
        assert_eq!(enc[TEXT_PAGE+1000],CR);
        assert_eq!(enc[TEXT_PAGE+1001],0);
        assert_eq!(enc[2*TEXT_PAGE],b'B');
        assert!(encode_text(&[0xc1]).is_err());
    }
}
