//! COM-style 128-bit interface identifiers.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A 128-bit interface identifier in Windows GUID layout.
///
/// The field split mirrors the native `GUID` struct so backends can render
/// the aggregate-initializer form (`0x..., 0x..., 0x..., [8 bytes]`) without
/// re-slicing a hex string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Guid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

/// Error parsing a GUID from its textual form.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GuidParseError {
    #[error("GUID has wrong shape: {0}")]
    Malformed(String),
    #[error("GUID contains non-hex digits: {0}")]
    BadDigit(String),
}

impl Guid {
    /// The 32 hex digits without hyphens, lowercase.
    pub fn simple_hex(&self) -> String {
        let mut s = format!("{:08x}{:04x}{:04x}", self.data1, self.data2, self.data3);
        for b in &self.data4 {
            s.push_str(&format!("{:02x}", b));
        }
        s
    }
}

impl FromStr for Guid {
    type Err = GuidParseError;

    /// Parses the hyphenated form `db6f6ddb-ac77-4e88-8253-819df9bbf140`,
    /// with or without surrounding braces.
    fn from_str(src: &str) -> Result<Self, Self::Err> {
        let src = src.trim().trim_start_matches('{').trim_end_matches('}');
        let hex: String = src.chars().filter(|c| *c != '-').collect();
        if hex.len() != 32 {
            return Err(GuidParseError::Malformed(src.to_string()));
        }
        let digit = |range: &str| {
            u64::from_str_radix(range, 16).map_err(|_| GuidParseError::BadDigit(src.to_string()))
        };
        let mut data4 = [0u8; 8];
        for (i, byte) in data4.iter_mut().enumerate() {
            *byte = digit(&hex[16 + i * 2..18 + i * 2])? as u8;
        }
        Ok(Guid {
            data1: digit(&hex[0..8])? as u32,
            data2: digit(&hex[8..12])? as u16,
            data3: digit(&hex[12..16])? as u16,
            data4,
        })
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            self.data1,
            self.data2,
            self.data3,
            self.data4[0],
            self.data4[1],
            self.data4[2],
            self.data4[3],
            self.data4[4],
            self.data4[5],
            self.data4[6],
            self.data4[7],
        )
    }
}
