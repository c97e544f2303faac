use chrono::{Datelike,Timelike};
use log::{warn,error};
use regex::Regex;
use super::types::StorageType;
use crate::fs::Error;

pub fn pack_time(time: Option<chrono::NaiveDateTime>) -> [u8;4] {
    let now = match time {
        Some(t) => t,
        _ => chrono::Local::now().naive_local()
    };
    let (_is_common_era,year) = now.year_ce();
    let packed_date = (now.day() + (now.month() << 5) + (year%100 << 9)) as u16;
    let packed_time = (now.minute() + (now.hour() << 8)) as u16;
    let bytes_date = u16::to_le_bytes(packed_date);
    let bytes_time = u16::to_le_bytes(packed_time);
    [bytes_date[0],bytes_date[1],bytes_time[0],bytes_time[1]]
}

pub fn unpack_time(prodos_date_time: [u8;4]) -> Option<chrono::NaiveDateTime> {
    let date = u16::from_le_bytes([prodos_date_time[0],prodos_date_time[1]]);
    let time = u16::from_le_bytes([prodos_date_time[2],prodos_date_time[3]]);
    let yearmod100 = date >> 9;
    // stamps before 1979 are taken to be in the 21st century
    let year = match yearmod100 < 79 {
        true => 2000 + yearmod100,
        false => 1900 + yearmod100
    };
    let month = (date >> 5) & 15;
    let day = date & 31;
    let hour = (time >> 8) & 255;
    let minute = time & 255;
    match chrono::NaiveDate::from_ymd_opt(year as i32,month as u32,day as u32) {
        Some(date) => date.and_hms_opt(hour as u32,minute as u32,0),
        None => None
    }
}

/// Test the string for validity as a ProDOS name.
pub fn is_name_valid(s: &str) -> bool {
    match Regex::new(r"^[A-Z][A-Z0-9.]{0,14}$") {
        Ok(fname_patt) => fname_patt.is_match(&s.to_uppercase()),
        Err(_) => false
    }
}

/// Convert filename bytes to a string.  Must pass the stor_len_nibs field into nibs.
pub fn file_name_to_string(nibs: u8,fname: [u8;15]) -> String {
    let name_len = (nibs & 0x0f) as usize;
    match String::from_utf8(fname[0..name_len].to_vec()) {
        Ok(result) => result,
        Err(_) => {
            warn!("continuing with invalid filename");
            fname[0..name_len].iter().map(|b| match *b {
                c if c.is_ascii_graphic() => c as char,
                _ => '?'
            }).collect()
        }
    }
}

/// Convert storage type and name to (stor_len_nibs,fname), the name is put in upper case.
pub fn string_to_file_name(stype: StorageType,s: &str) -> Result<(u8,[u8;15]),Error> {
    if !is_name_valid(s) {
        error!("bad ProDOS name {}",s);
        return Err(Error::BadName);
    }
    let new_nibs = ((stype as u8) << 4) + s.len() as u8;
    let mut ans: [u8;15] = [0;15];
    for (i,b) in s.to_uppercase().bytes().enumerate() {
        ans[i] = b;
    }
    Ok((new_nibs,ans))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn names() {
        assert!(is_name_valid("NEW.DISK"));
        assert!(is_name_valid("hello"));
        assert!(!is_name_valid("1ABC"));
        assert!(!is_name_valid("A_B"));
        assert!(!is_name_valid("ABCDEFGHIJKLMNOP"));
        let (nibs,fname) = string_to_file_name(StorageType::Seedling,"hello").unwrap();
        assert_eq!(nibs,0x15);
        assert_eq!(file_name_to_string(nibs,fname),"HELLO");
        assert_eq!(string_to_file_name(StorageType::Seedling,"A B"),Err(Error::BadName));
    }

    #[test]
    fn time_stamps() {
        let t = chrono::NaiveDate::from_ymd_opt(1986,9,15).unwrap().and_hms_opt(13,45,0).unwrap();
        let packed = pack_time(Some(t));
        assert_eq!(unpack_time(packed),Some(t));
        assert_eq!(unpack_time([0,0,0,0]),None);
    }
}
