// src/dump.rs
use std::collections::BTreeMap;

use log::debug;

use crate::cards;
use crate::error::DumpError;
use crate::types::{BLOCK_SIZE, Block, CardIdentity, SegmentConfig, spaced_hex};

/// Mifare Classic 1K: 16 sectors of 4 blocks.
pub const MIFARE_1K_BLOCKS: usize = 64;

const MANUFACTURER_DATA: [u8; 8] = [0x62, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68, 0x69];

// MAD v1 pointing every sector at the NDEF application (AID 03E1)
const MAD_BLOCK_1: [u8; 16] = [
    0x14, 0x01, 0x03, 0xE1, 0x03, 0xE1, 0x03, 0xE1, 0x03, 0xE1, 0x03, 0xE1, 0x03, 0xE1, 0x03, 0xE1,
];
const MAD_BLOCK_2: [u8; 16] = [
    0x03, 0xE1, 0x03, 0xE1, 0x03, 0xE1, 0x03, 0xE1, 0x03, 0xE1, 0x03, 0xE1, 0x03, 0xE1, 0x03, 0xE1,
];

// Key A = MAD key, access bits 78 77 88, GPB C1
const MAD_TRAILER: [u8; 16] = [
    0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5, 0x78, 0x77, 0x88, 0xC1, 0x89, 0xEC, 0xA9, 0x7F, 0x8C, 0x2A,
];

// Key A = NFC Forum public key, access bits 7F 07 88, GPB 40, Key B = FF..FF
const NDEF_TRAILER: [u8; 16] = [
    0xD3, 0xF7, 0xD3, 0xF7, 0xD3, 0xF7, 0x7F, 0x07, 0x88, 0x40, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
];

const BLOCK_LINE_PREFIX: &str = "Block ";

/// Block 0: UID, BCC, SAK, ATQA (LSB first), manufacturer bytes.
pub fn manufacturer_block(identity: &CardIdentity) -> Block {
    let mut data = Vec::with_capacity(BLOCK_SIZE);
    data.extend_from_slice(&identity.uid);
    data.push(identity.bcc());
    data.push(identity.sak);
    data.push(identity.atqa[1]);
    data.push(identity.atqa[0]);
    data.extend_from_slice(&MANUFACTURER_DATA);
    Block { index: 0, data }
}

/// Lays the payload blocks onto a full 64-block Mifare Classic 1K image.
///
/// Sector 0 carries the manufacturer block and the MAD, every other sector
/// trailer gets the NDEF keys, and data blocks without payload stay zero.
pub fn build_card_image(
    identity: &CardIdentity,
    payload_blocks: &[Block],
) -> Result<Vec<Block>, DumpError> {
    let config = SegmentConfig::default();
    let mut payload: BTreeMap<usize, &Block> = BTreeMap::new();

    for block in payload_blocks {
        let index = block.index;
        if block.data.len() != BLOCK_SIZE {
            return Err(DumpError::BadBlockSize {
                index,
                len: block.data.len(),
                expected: BLOCK_SIZE,
            });
        }
        if index < config.start_index {
            return Err(DumpError::ReservedBlock { index });
        }
        if index >= MIFARE_1K_BLOCKS {
            return Err(DumpError::OutOfRange {
                index,
                blocks: MIFARE_1K_BLOCKS,
            });
        }
        if config.is_trailer(index) {
            return Err(DumpError::TrailerCollision { index });
        }
        if payload.insert(index, block).is_some() {
            return Err(DumpError::DuplicateBlock { index });
        }
    }

    let mut image = vec![
        manufacturer_block(identity),
        Block {
            index: 1,
            data: MAD_BLOCK_1.to_vec(),
        },
        Block {
            index: 2,
            data: MAD_BLOCK_2.to_vec(),
        },
        Block {
            index: 3,
            data: MAD_TRAILER.to_vec(),
        },
    ];

    for index in config.start_index..MIFARE_1K_BLOCKS {
        let block = if config.is_trailer(index) {
            Block {
                index,
                data: NDEF_TRAILER.to_vec(),
            }
        } else {
            payload
                .get(&index)
                .map(|&block| block.clone())
                .unwrap_or_else(|| Block::zeroed(index))
        };
        image.push(block);
    }

    debug!(
        "Card image: {} payload blocks of {} usable",
        payload.len(),
        cards::data_block_indices(&config, MIFARE_1K_BLOCKS).len()
    );
    Ok(image)
}

/// One `Block N: XX XX ...` line per block.
pub fn render_blocks(blocks: &[Block]) -> String {
    blocks
        .iter()
        .map(|block| block.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Full Flipper NFC device file for a Mifare Classic 1K card.
pub fn render_card_image(
    identity: &CardIdentity,
    payload_blocks: &[Block],
) -> Result<String, DumpError> {
    let image = build_card_image(identity, payload_blocks)?;

    let mut out = String::new();
    out.push_str("Filetype: Flipper NFC device\n");
    out.push_str("Version: 4\n");
    out.push_str("# Device type can be ISO14443-3A, ISO14443-3B, ISO14443-4A, ISO14443-4B, ISO15693-3, FeliCa, NTAG/Ultralight, Mifare Classic, Mifare Plus, Mifare DESFire, SLIX, ST25TB, EMV\n");
    out.push_str("Device type: Mifare Classic\n");
    out.push_str("# UID is common for all formats\n");
    out.push_str(&format!("UID: {}\n", spaced_hex(&identity.uid)));
    out.push_str("# ISO14443-3A specific data\n");
    out.push_str(&format!("ATQA: {}\n", spaced_hex(&identity.atqa)));
    out.push_str(&format!("SAK: {:02X}\n", identity.sak));
    out.push_str("# Mifare Classic specific data\n");
    out.push_str("Mifare Classic type: 1K\n");
    out.push_str("Data format version: 2\n");
    out.push_str("# Mifare Classic blocks, '??' means unknown data\n");
    out.push_str(&render_blocks(&image));
    out.push('\n');
    Ok(out)
}

/// Reads every `Block N: ...` line of a dump; all other lines are ignored.
pub fn parse_dump(text: &str) -> Result<Vec<Block>, DumpError> {
    let mut blocks = Vec::new();

    for (i, line) in text.lines().enumerate() {
        let line_no = i + 1;
        let Some(rest) = line.trim().strip_prefix(BLOCK_LINE_PREFIX) else {
            continue;
        };

        let malformed = |reason: String| DumpError::Malformed {
            line: line_no,
            reason,
        };

        let (index, bytes) = rest
            .split_once(':')
            .ok_or_else(|| malformed("missing ':' after block number".into()))?;
        let index: usize = index
            .trim()
            .parse()
            .map_err(|_| malformed(format!("invalid block number {:?}", index.trim())))?;

        let tokens: Vec<&str> = bytes.split_whitespace().collect();
        if tokens.iter().any(|t| t.contains('?')) {
            return Err(malformed(format!("block {} contains unknown bytes", index)));
        }
        if let Some(bad) = tokens.iter().find(|t| t.len() != 2) {
            return Err(malformed(format!("invalid byte {:?}", bad)));
        }
        let data = hex::decode(tokens.concat())
            .map_err(|e| malformed(format!("invalid hex in block {}: {}", index, e)))?;

        blocks.push(Block { index, data });
    }

    Ok(blocks)
}
