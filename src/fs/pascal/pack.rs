use chrono::Datelike;
use log::debug;
use super::types::INVALID_CHARS;
use crate::fs::Error;

pub fn pack_date(time: Option<chrono::NaiveDateTime>) -> [u8;2] {
    let now = match time {
        Some(t) => t,
        _ => chrono::Local::now().naive_local()
    };
    let (_is_common_era,year) = now.year_ce();
    let packed_date = (now.month() + (now.day() << 4) + ((year%100) << 9)) as u16;
    u16::to_le_bytes(packed_date)
}

/// Years before 79 are put in the 21st century
pub fn unpack_date(pascal_date: [u8;2]) -> Option<chrono::NaiveDateTime> {
    let date = u16::from_le_bytes(pascal_date);
    let yearmod100 = date >> 9;
    let year = match yearmod100 < 79 {
        true => 2000 + yearmod100,
        false => 1900 + yearmod100
    };
    let month = date & 15;
    let day = (date >> 4) & 31;
    chrono::NaiveDate::from_ymd_opt(year as i32,month as u32,day as u32)?.and_hms_opt(0,0,0)
}

/// This will accept lower case; case will be automatically converted as appropriate
pub fn is_name_valid(s: &str,is_vol: bool) -> bool {
    for char in s.chars() {
        if !char.is_ascii() || INVALID_CHARS.contains(char) || char.is_ascii_control() {
            debug!("bad file name character `{}` (codepoint {})",char,char as u32);
            return false;
        }
    }
    match (s.len(),is_vol) {
        (0,_) => false,
        (n,true) => n <= 7,
        (n,false) => n <= 15
    }
}

pub fn file_name_to_string(fname: &[u8],len: u8) -> String {
    let end = usize::min(len as usize,fname.len());
    String::from_utf8_lossy(&fname[0..end]).trim_end().to_string()
}

/// Returns (length,padded name), `N` is 7 for volumes and 15 for files
pub fn string_to_name<const N: usize>(s: &str) -> Result<(u8,[u8;N]),Error> {
    if !is_name_valid(s,N==7) {
        return Err(Error::BadName);
    }
    let mut ans = [0;N];
    for (i,c) in s.to_uppercase().bytes().enumerate() {
        ans[i] = c;
    }
    Ok((s.len() as u8,ans))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn names() {
        assert!(is_name_valid("SYSTEM.PASCAL",false));
        assert!(!is_name_valid("SYSTEM.PASCAL",true));
        assert!(!is_name_valid("A:B",false));
        let (len,fname) = string_to_name::<15>("hello.text").unwrap();
        assert_eq!(file_name_to_string(&fname,len),"HELLO.TEXT");
        assert_eq!(string_to_name::<7>("TOOLONG8"),Err(Error::BadName));
    }

    #[test]
    fn dates() {
        let t = chrono::NaiveDate::from_ymd_opt(1983,2,28).unwrap().and_hms_opt(0,0,0).unwrap();
        assert_eq!(unpack_date(pack_date(Some(t))),Some(t));
        assert_eq!(unpack_date([0,0]),None);
    }
}
