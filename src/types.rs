// src/types.rs
use std::fmt;
use std::num::NonZeroUsize;

use lazy_static::lazy_static;
use serde::{Serialize, Serializer};

use crate::error::SegmentError;

// NFC Forum URI Record identifier codes (URI RTD, Table 3)
pub const URI_PREFIXES: [(u8, &str); 36] = [
    (0x00, ""),
    (0x01, "http://www."),
    (0x02, "https://www."),
    (0x03, "http://"),
    (0x04, "https://"),
    (0x05, "tel:"),
    (0x06, "mailto:"),
    (0x07, "ftp://anonymous:anonymous@"),
    (0x08, "ftp://ftp."),
    (0x09, "ftps://"),
    (0x0A, "sftp://"),
    (0x0B, "smb://"),
    (0x0C, "nfs://"),
    (0x0D, "ftp://"),
    (0x0E, "dav://"),
    (0x0F, "news:"),
    (0x10, "telnet://"),
    (0x11, "imap:"),
    (0x12, "rtsp://"),
    (0x13, "urn:"),
    (0x14, "pop:"),
    (0x15, "sip:"),
    (0x16, "sips:"),
    (0x17, "tftp:"),
    (0x18, "btspp://"),
    (0x19, "btl2cap://"),
    (0x1A, "btgoep://"),
    (0x1B, "tcpobex://"),
    (0x1C, "irdaobex://"),
    (0x1D, "file://"),
    (0x1E, "urn:epc:id:"),
    (0x1F, "urn:epc:tag:"),
    (0x20, "urn:epc:pat:"),
    (0x21, "urn:epc:raw:"),
    (0x22, "urn:epc:"),
    (0x23, "urn:nfc:"),
];

lazy_static! {
    // Scan order for prefix stripping: longest scheme first so that
    // "https://www." wins over "https://".
    static ref PREFIX_SCAN_ORDER: Vec<UriPrefix> = {
        let mut order: Vec<UriPrefix> = URI_PREFIXES
            .iter()
            .filter(|(_, scheme)| !scheme.is_empty())
            .map(|&(code, _)| UriPrefix(code))
            .collect();
        order.sort_by(|a, b| b.scheme().len().cmp(&a.scheme().len()));
        order
    };
}

/// One-byte URI identifier code, restricted to the NFC Forum table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UriPrefix(u8);

impl UriPrefix {
    pub const NONE: UriPrefix = UriPrefix(0x00);

    pub fn from_code(code: u8) -> Option<UriPrefix> {
        if (code as usize) < URI_PREFIXES.len() {
            Some(UriPrefix(code))
        } else {
            None
        }
    }

    pub fn code(self) -> u8 {
        self.0
    }

    pub fn scheme(self) -> &'static str {
        URI_PREFIXES[self.0 as usize].1
    }

    /// Finds the longest known scheme at the start of `url` and returns it
    /// together with what is left of the URL. No match gives
    /// (`UriPrefix::NONE`, url).
    pub fn strip(url: &str) -> (UriPrefix, &str) {
        PREFIX_SCAN_ORDER
            .iter()
            .find_map(|&prefix| url.strip_prefix(prefix.scheme()).map(|rest| (prefix, rest)))
            .unwrap_or((UriPrefix::NONE, url))
    }
}

impl fmt::Display for UriPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0x00 {
            write!(f, "0x00 (no abbreviation)")
        } else {
            write!(f, "0x{:02X} ({})", self.0, self.scheme())
        }
    }
}

/// Decoded URI record: the abbreviation code plus the encoded remainder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriRecord {
    pub prefix: UriPrefix,
    pub remainder: String,
}

impl UriRecord {
    pub fn to_url(&self) -> String {
        format!("{}{}", self.prefix.scheme(), self.remainder)
    }
}

pub const BLOCK_SIZE: usize = 16;

/// A numbered card block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Block {
    pub index: usize,
    #[serde(serialize_with = "serialize_hex")]
    pub data: Vec<u8>,
}

impl Block {
    pub fn zeroed(index: usize) -> Self {
        Block {
            index,
            data: vec![0u8; BLOCK_SIZE],
        }
    }
}

/// Uppercase hex bytes separated by single spaces, as dump files show them.
pub fn spaced_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| hex::encode_upper([*b]))
        .collect::<Vec<_>>()
        .join(" ")
}

// Flipper dump line: "Block 4: 03 0E D1 ..."
impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Block {}: {}", self.index, spaced_hex(&self.data))
    }
}

fn serialize_hex<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode_upper(data))
}

/// What happens to indices that fall on a sector trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum TrailerPolicy {
    /// Never place payload on a trailer index; numbering jumps over it.
    #[default]
    #[value(name = "skip")]
    SkipAndContinue,
    /// Contiguous indices, then zero filler until the block count is a
    /// multiple of the trailer modulus. Trailer positions are not protected.
    #[value(name = "pad-count")]
    PadToBoundary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentConfig {
    pub block_size: NonZeroUsize,
    pub start_index: usize,
    pub trailer_modulus: NonZeroUsize,
    pub trailer_remainder: usize,
    pub policy: TrailerPolicy,
}

impl SegmentConfig {
    pub fn is_trailer(&self, index: usize) -> bool {
        index % self.trailer_modulus.get() == self.trailer_remainder
    }

    /// Rejects trailer rules that cannot be laid out: a remainder the
    /// modulus never produces, or skip-and-continue with every index a trailer.
    pub fn validate(&self) -> Result<(), SegmentError> {
        let modulus = self.trailer_modulus.get();
        if self.trailer_remainder >= modulus {
            return Err(SegmentError::InvalidTrailerRemainder {
                remainder: self.trailer_remainder,
                modulus,
            });
        }
        if modulus == 1 && self.policy == TrailerPolicy::SkipAndContinue {
            return Err(SegmentError::NoDataBlocks);
        }
        Ok(())
    }
}

impl Default for SegmentConfig {
    fn default() -> Self {
        SegmentConfig {
            block_size: NonZeroUsize::new(BLOCK_SIZE).unwrap_or(NonZeroUsize::MIN),
            start_index: 4,
            trailer_modulus: NonZeroUsize::new(4).unwrap_or(NonZeroUsize::MIN),
            trailer_remainder: 3,
            policy: TrailerPolicy::SkipAndContinue,
        }
    }
}

/// Anticollision data written into manufacturer block 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardIdentity {
    pub uid: [u8; 4],
    pub atqa: [u8; 2],
    pub sak: u8,
}

impl CardIdentity {
    // Block Check Character: XOR of the four UID bytes
    pub fn bcc(&self) -> u8 {
        self.uid.iter().fold(0, |acc, b| acc ^ b)
    }
}

impl Default for CardIdentity {
    fn default() -> Self {
        CardIdentity {
            uid: [0x1E, 0x0A, 0x23, 0x3F],
            atqa: [0x00, 0x04],
            sak: 0x08,
        }
    }
}
