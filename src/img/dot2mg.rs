//! ## Support for 2MG disk images
//!
//! This format consists of a header followed by data in either DO, PO, or NIB order.
//! At the end of the data there can be a comment and creator information.
//! The header is removed when the image is loaded and rebuilt when it is saved.

use log::{warn,debug,error};
use a2kit_macro::{DiskStruct,DiskStructError};
use a2kit_macro_derive::DiskStruct;
use super::{Error,DiskImageType};
use crate::DYNERR;

const HEADER_LEN: usize = 64;
const MAGIC: [u8;4] = *b"2IMG";

pub fn file_extensions() -> Vec<String> {
    vec!["2mg".to_string(),"2img".to_string()]
}

/// all header entries are LE numbers
#[derive(DiskStruct,Clone,Copy,Debug,PartialEq)]
pub struct Header {
    magic: [u8;4],
    creator_id: [u8;4],
    header_len: [u8;2],
    version: [u8;2],
    img_fmt: [u8;4], // 0=DO, 1=PO, 2=nib
    flags: [u8;4], // bits 0-7=volume if bit 8, write protected if bit 31
    blocks: [u8;4],
    data_offset: [u8;4],
    data_len: [u8;4],
    comment_offset: [u8;4],
    comment_len: [u8;4],
    creator_offset: [u8;4],
    creator_len: [u8;4],
    pad: [u8;16]
}

/// The 2IMG wrapper with its trailing chunks
#[derive(Clone,Debug,PartialEq)]
pub struct TwoImg {
    header: Header,
    comment: Vec<u8>,
    creator_info: Vec<u8>
}

impl TwoImg {
    /// Create a wrapper for data of the given ordering
    pub fn create(typ: DiskImageType,data_len: usize) -> Self {
        let fmt: u8 = match typ {
            DiskImageType::DO => 0,
            DiskImageType::PO => 1,
            DiskImageType::NIB => 2
        };
        let blocks = match typ {
            DiskImageType::NIB => 280,
            _ => (data_len / super::BLOCK_SIZE) as u32
        };
        let mut header = Header::new();
        header.magic = MAGIC;
        header.creator_id = *b"A2DK";
        header.header_len = [HEADER_LEN as u8,0];
        header.version = [1,0];
        header.img_fmt = [fmt,0,0,0];
        header.blocks = u32::to_le_bytes(blocks);
        header.data_offset = u32::to_le_bytes(HEADER_LEN as u32);
        header.data_len = u32::to_le_bytes(data_len as u32);
        Self {
            header,
            comment: Vec::new(),
            creator_info: Vec::new()
        }
    }
    pub fn is_2img(dat: &[u8]) -> bool {
        dat.len() >= HEADER_LEN && dat[0..4]==MAGIC
    }
    /// Split the file into the wrapper and the disk data
    pub fn unwrap(dat: &[u8]) -> Result<(Self,Vec<u8>),DYNERR> {
        if !Self::is_2img(dat) {
            return Err(Box::new(Error::UnknownContainer));
        }
        let header = Header::from_bytes(&dat[0..HEADER_LEN])?;
        if u16::from_le_bytes(header.header_len) as usize!=HEADER_LEN {
            warn!("unexpected 2MG header length {}",u16::from_le_bytes(header.header_len));
        }
        if u16::from_le_bytes(header.version)!=1 {
            warn!("unexpected 2MG version {}",u16::from_le_bytes(header.version));
        }
        let fmt = u32::from_le_bytes(header.img_fmt);
        if fmt>2 {
            error!("illegal 2MG format {}",fmt);
            return Err(Box::new(Error::UnknownContainer));
        }
        let offset = u32::from_le_bytes(header.data_offset) as usize;
        let len = u32::from_le_bytes(header.data_len) as usize;
        if dat.len() < offset+len {
            error!("end of data {} runs past EOF",offset+len);
            return Err(Box::new(Error::ImageSizeMismatch));
        }
        if fmt==1 && u32::from_le_bytes(header.blocks) as usize * super::BLOCK_SIZE != len {
            warn!("2MG block count does not match data size");
        }
        let chunk = |off: [u8;4],len: [u8;4]| -> Vec<u8> {
            let beg = u32::from_le_bytes(off) as usize;
            let end = beg + u32::from_le_bytes(len) as usize;
            if beg==0 || end > dat.len() {
                if end > beg {
                    warn!("2MG chunk at {} runs past EOF, ignoring",beg);
                }
                return Vec::new();
            }
            dat[beg..end].to_vec()
        };
        let comment = chunk(header.comment_offset,header.comment_len);
        let creator_info = chunk(header.creator_offset,header.creator_len);
        debug!("2MG comment {} bytes, creator {} bytes",comment.len(),creator_info.len());
        Ok((Self { header, comment, creator_info }, dat[offset..offset+len].to_vec()))
    }
    /// Put the wrapper around the disk data, offsets are recomputed
    pub fn wrap(&self,data: &[u8]) -> Vec<u8> {
        let mut header = self.header;
        let buf_len = data.len() as u32;
        let rem_len = self.comment.len() as u32;
        let cre_len = self.creator_info.len() as u32;
        header.data_offset = u32::to_le_bytes(HEADER_LEN as u32);
        header.data_len = u32::to_le_bytes(buf_len);
        header.comment_offset = u32::to_le_bytes(match rem_len { 0 => 0, _ => HEADER_LEN as u32 + buf_len });
        header.comment_len = u32::to_le_bytes(rem_len);
        header.creator_offset = u32::to_le_bytes(match cre_len { 0 => 0, _ => HEADER_LEN as u32 + buf_len + rem_len });
        header.creator_len = u32::to_le_bytes(cre_len);
        [header.to_bytes(),data.to_vec(),self.comment.clone(),self.creator_info.clone()].concat()
    }
    pub fn image_type(&self) -> Result<DiskImageType,Error> {
        match u32::from_le_bytes(self.header.img_fmt) {
            0 => Ok(DiskImageType::DO),
            1 => Ok(DiskImageType::PO),
            2 => Ok(DiskImageType::NIB),
            _ => Err(Error::UnknownContainer)
        }
    }
    pub fn write_protected(&self) -> bool {
        self.header.flags[3] > 127
    }
    pub fn set_write_protected(&mut self,protect: bool) {
        match protect {
            true => self.header.flags[3] |= 0x80,
            false => self.header.flags[3] &= 0x7f
        }
    }
    /// DOS volume number if the header declares one
    pub fn volume(&self) -> Option<u8> {
        match self.header.flags[1] & 1 {
            1 => Some(self.header.flags[0]),
            _ => None
        }
    }
    pub fn comment(&self) -> String {
        String::from_utf8_lossy(&self.comment).to_string()
    }
    pub fn set_comment(&mut self,comment: &str) {
        if !comment.is_ascii() {
            warn!("2MG comment is not ASCII");
        }
        self.comment = comment.as_bytes().to_vec();
    }
    /// Header fields as JSON, raw fields are hex strings
    pub fn to_json(&self,indent: u16) -> String {
        let mut root = json::JsonValue::new_object();
        root["creator_id"] = json::JsonValue::String(hex::encode_upper(self.header.creator_id));
        root["version"] = json::JsonValue::String(hex::encode_upper(self.header.version));
        root["img_fmt"] = json::JsonValue::String(hex::encode_upper(self.header.img_fmt));
        root["flags"] = json::JsonValue::String(hex::encode_upper(self.header.flags));
        root["blocks"] = json::JsonValue::String(hex::encode_upper(self.header.blocks));
        root["comment"] = json::JsonValue::String(self.comment());
        root["creator_info"] = json::JsonValue::String(String::from_utf8_lossy(&self.creator_info).to_string());
        match indent {
            0 => json::stringify(root),
            _ => json::stringify_pretty(root,indent)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn wrap_and_unwrap() {
        let data: Vec<u8> = (0..1024).map(|x| (x%256) as u8).collect();
        let mut wrapper = TwoImg::create(DiskImageType::PO,data.len());
        wrapper.set_comment("HELLO");
        let file_bytes = wrapper.wrap(&data);
        assert_eq!(file_bytes.len(),64+1024+5);
        assert!(TwoImg::is_2img(&file_bytes));
        let (header,payload) = TwoImg::unwrap(&file_bytes).expect("unwrap failed");
        assert_eq!(payload,data);
        assert_eq!(header.comment(),"HELLO");
        assert_eq!(header.image_type(),Ok(DiskImageType::PO));
        assert!(!header.write_protected());
    }

    #[test]
    fn bad_format_code() {
        let mut file_bytes = TwoImg::create(DiskImageType::DO,512).wrap(&[0;512]);
        file_bytes[12] = 3;
        assert!(TwoImg::unwrap(&file_bytes).is_err());
    }
}
