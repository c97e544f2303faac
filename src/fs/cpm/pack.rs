//! ### CP/M Packing Module
//!
//! Functions to help pack or unpack filenames.  The user number can be put in front
//! of the name, e.g. `2:USER2.TXT`, user 0 is implied if there is no prefix.

use std::str::FromStr;
use super::types;
use crate::fs::Error;

/// Take string such as `2:USER2.TXT` and return (2,"USER2.TXT")
pub fn split_user_filename(xname: &str) -> Result<(u8,String),Error> {
    let parts: Vec<&str> = xname.split(':').collect();
    match parts.len() {
        1 => Ok((0,xname.to_string())),
        2 => match u8::from_str(parts[0]) {
            Ok(user) if user < types::USER_END => Ok((user,parts[1].to_string())),
            _ => {
                log::error!("prefix should be a user number");
                Err(Error::BadName)
            }
        },
        _ => Err(Error::BadName)
    }
}

/// Accepts lower case, case is raised by string_to_file_name.
/// Does not accept user number prefix.
pub fn is_name_valid(name: &str) -> bool {
    let it: Vec<&str> = name.split('.').collect();
    if it.len()>2 {
        return false;
    }
    let base = it[0];
    let ext = match it.len() {
        1 => "",
        _ => it[1]
    };
    for char in [base,ext].concat().chars() {
        if !char.is_ascii() || types::INVALID_CHARS.contains(char) || char.is_ascii_control() {
            log::debug!("bad file name character `{}` (codepoint {})",char,char as u32);
            return false;
        }
    }
    !base.is_empty() && base.len() <= 8 && ext.len() <= 3
}

/// Put the filename bytes as an ASCII string, the user number is prefixed if not 0
pub fn file_name_to_string(user: u8,name: [u8;8],typ: [u8;3]) -> String {
    // in CP/M high bits are explicitly not part of the name
    let base: String = name.iter().map(|x| (x & 0x7f) as char).collect();
    let ext: String = typ.iter().map(|x| (x & 0x7f) as char).collect();
    let fname = match ext.trim_end().len() {
        0 => base.trim_end().to_string(),
        _ => [base.trim_end(),".",ext.trim_end()].concat()
    };
    match user {
        0 => fname,
        u => format!("{}:{}",u,fname)
    }
}

/// Convert string to name and type bytes for directory, padded with spaces.
pub fn string_to_file_name(s: &str) -> Result<([u8;8],[u8;3]),Error> {
    if !is_name_valid(s) {
        return Err(Error::BadName);
    }
    let mut ans: ([u8;8],[u8;3]) = ([0x20;8],[0x20;3]);
    let upper = s.to_uppercase();
    let mut it = upper.split('.');
    if let Some(base) = it.next() {
        for (i,c) in base.bytes().enumerate() {
            ans.0[i] = c;
        }
    }
    if let Some(ext) = it.next() {
        for (i,c) in ext.bytes().enumerate() {
            ans.1[i] = c;
        }
    }
    Ok(ans)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn names() {
        assert_eq!(split_user_filename("2:user2.txt"),Ok((2,"user2.txt".to_string())));
        assert_eq!(split_user_filename("16:X"),Err(Error::BadName));
        let (name,typ) = string_to_file_name("stat.com").unwrap();
        assert_eq!(&name,b"STAT    ");
        assert_eq!(&typ,b"COM");
        assert_eq!(file_name_to_string(0,name,typ),"STAT.COM");
        assert_eq!(file_name_to_string(3,name,[0x20;3]),"3:STAT");
        assert!(!is_name_valid("TOOLONGNAME.COM"));
        assert!(!is_name_valid("A.B.C"));
    }
}
