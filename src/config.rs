//! ## Configuration
//!
//! Lookup tables that drive file naming and file type display are gathered into an immutable
//! `Config`.  A single instance is built at startup and shared by every volume on an image.
//! The built-in tables can be partly overridden from a JSON string, e.g.
//! ```json
//! {
//!     "prodos_types": { "06": "BIN", "E0": "LBR" },
//!     "extensions": { "dsk": "do", "img": "po" }
//! }
//! ```

use std::collections::HashMap;
use log::{debug,error};
use crate::DYNERR;

/// Map ProDOS file type codes to mnemonics
const PRODOS_TYPES: [(u8,&str);39] = [
    (0x00, "???"),
    (0x01, "BAD"),
    (0x02, "PCD"),
    (0x03, "PTX"),
    (0x04, "TXT"),
    (0x05, "PDA"),
    (0x06, "BIN"),
    (0x07, "FNT"),
    (0x08, "FOT"),
    (0x09, "BA3"),
    (0x0a, "DA3"),
    (0x0b, "WPF"),
    (0x0c, "SOS"),
    (0x0f, "DIR"),
    (0x10, "RPD"),
    (0x11, "RPI"),
    (0x12, "AFD"),
    (0x13, "AFM"),
    (0x14, "AFR"),
    (0x15, "SLB"),
    (0x19, "ADB"),
    (0x1a, "AWP"),
    (0x1b, "ASP"),
    (0xef, "PAS"),
    (0xf0, "CMD"),
    (0xf1, "UD1"),
    (0xf2, "UD2"),
    (0xf3, "UD3"),
    (0xf4, "UD4"),
    (0xf5, "UD5"),
    (0xf6, "UD6"),
    (0xf7, "UD7"),
    (0xf8, "UD8"),
    (0xfa, "INT"),
    (0xfb, "IVR"),
    (0xfc, "BAS"),
    (0xfd, "VAR"),
    (0xfe, "REL"),
    (0xff, "SYS")
];

/// Image orders that a file extension can select
#[derive(Clone,Copy,Debug,PartialEq,Eq)]
pub enum OrderHint {
    /// DOS ordered sectors
    Dos,
    /// ProDOS ordered blocks
    Prodos,
    /// nibble encoded tracks
    Nibble,
    /// DOS order is tried first, then ProDOS order
    Either,
    /// the container header decides
    Container
}

impl OrderHint {
    fn from_key(key: &str) -> Option<Self> {
        match key {
            "do" => Some(Self::Dos),
            "po" => Some(Self::Prodos),
            "nib" => Some(Self::Nibble),
            "either" => Some(Self::Either),
            "2mg" => Some(Self::Container),
            _ => None
        }
    }
}

/// Immutable tables shared by all volumes of a session
#[derive(Clone,Debug)]
pub struct Config {
    prodos_types: HashMap<u8,String>,
    extensions: HashMap<String,OrderHint>
}

impl Default for Config {
    fn default() -> Self {
        let mut prodos_types = HashMap::new();
        for (code,mnemonic) in PRODOS_TYPES {
            prodos_types.insert(code,mnemonic.to_string());
        }
        let mut extensions = HashMap::new();
        extensions.insert("do".to_string(),OrderHint::Dos);
        extensions.insert("dsk".to_string(),OrderHint::Either);
        extensions.insert("po".to_string(),OrderHint::Prodos);
        extensions.insert("hdv".to_string(),OrderHint::Prodos);
        extensions.insert("nib".to_string(),OrderHint::Nibble);
        extensions.insert("2mg".to_string(),OrderHint::Container);
        extensions.insert("2img".to_string(),OrderHint::Container);
        Self {
            prodos_types,
            extensions
        }
    }
}

impl Config {
    /// Start from the built-in tables and apply overrides from a JSON object.
    /// ProDOS type codes are hex strings, extension values are one of `do`, `po`, `nib`, `either`, `2mg`.
    pub fn from_json(json_str: &str) -> Result<Self,DYNERR> {
        let mut ans = Self::default();
        let parsed = json::parse(json_str)?;
        for (key,val) in parsed["prodos_types"].entries() {
            let code = match hex::decode(key) {
                Ok(v) if v.len()==1 => v[0],
                _ => {
                    error!("ProDOS type key `{}` is not a hex byte",key);
                    return Err(Box::new(crate::fs::Error::BadFileType));
                }
            };
            match val.as_str() {
                Some(s) => {
                    debug!("override ProDOS type {:02X} with {}",code,s);
                    ans.prodos_types.insert(code,s.to_uppercase());
                },
                None => return Err(Box::new(crate::fs::Error::BadFileType))
            }
        }
        for (key,val) in parsed["extensions"].entries() {
            match val.as_str().and_then(OrderHint::from_key) {
                Some(hint) => {
                    ans.extensions.insert(key.to_lowercase(),hint);
                },
                None => {
                    error!("extension `{}` maps to unknown order",key);
                    return Err(Box::new(crate::img::Error::UnknownContainer));
                }
            }
        }
        Ok(ans)
    }
    /// Mnemonic for a ProDOS type code, unknown codes are shown as `$XX`
    pub fn prodos_mnemonic(&self,code: u8) -> String {
        match self.prodos_types.get(&code) {
            Some(s) => s.clone(),
            None => format!("${:02X}",code)
        }
    }
    /// Parse a ProDOS type from a mnemonic, a `$XX` hex code, or a decimal number.
    /// When several codes share a mnemonic the lowest code wins.
    pub fn prodos_code(&self,s: &str) -> Option<u8> {
        let upper = s.to_uppercase();
        if let Some(hex_str) = upper.strip_prefix('$') {
            return u8::from_str_radix(hex_str,16).ok();
        }
        if let Ok(num) = upper.parse::<u8>() {
            return Some(num);
        }
        self.prodos_types.iter()
            .filter(|(_,m)| **m==upper)
            .map(|(c,_)| *c)
            .min()
    }
    /// Image order suggested by a file extension (without the dot, `.gz` already removed)
    pub fn order_hint(&self,ext: &str) -> Option<OrderHint> {
        self.extensions.get(&ext.to_lowercase()).copied()
    }
    /// All recognized image extensions, sorted
    pub fn known_extensions(&self) -> Vec<String> {
        let mut ans: Vec<String> = self.extensions.keys().cloned().collect();
        ans.sort();
        ans
    }
}
