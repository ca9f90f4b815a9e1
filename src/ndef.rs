// src/ndef.rs
use log::{debug, warn};

use crate::error::{DecodeError, EncodeError};
use crate::types::{UriPrefix, UriRecord};

// NDEF Header: MB=1, ME=1, CF=0, SR=1, IL=0, TNF=001 (NFC Forum Well Known Type)
// 0xD1 = 1101 0001
const RECORD_HEADER: u8 = 0xD1;
const URI_RECORD_TYPE: &[u8] = b"U";

const TNF_WELL_KNOWN: u8 = 0x01;
const FLAG_CF: u8 = 0x20;
const FLAG_SR: u8 = 0x10;
const FLAG_IL: u8 = 0x08;

const TLV_NULL: u8 = 0x00;
const TLV_NDEF: u8 = 0x03;
const TLV_TERMINATOR: u8 = 0xFE;
const TLV_LONG_LENGTH: u8 = 0xFF;

/// Largest payload (prefix byte + remainder) a short record can describe.
pub const MAX_PAYLOAD_LEN: usize = 254;

/// Encodes `url` as a TLV-wrapped NDEF URI record, ready to be laid out
/// on the card.
///
/// The longest known scheme is always stripped from `url`; `prefix_code`
/// is written as the abbreviation byte regardless of which scheme that was.
pub fn encode(url: &str, prefix_code: u8) -> Result<Vec<u8>, EncodeError> {
    let prefix =
        UriPrefix::from_code(prefix_code).ok_or(EncodeError::UnsupportedPrefix(prefix_code))?;

    let (stripped, remainder) = UriPrefix::strip(url);
    if stripped != UriPrefix::NONE && stripped != prefix {
        warn!(
            "URL starts with {:?} but prefix {} was requested; the stripped scheme is not encoded",
            stripped.scheme(),
            prefix
        );
    }

    let record = encode_uri_record(prefix, remainder)?;
    let tlv = wrap_in_tlv(&record);
    debug!(
        "Encoded {:?} with prefix {}: record {} bytes, TLV {} bytes",
        remainder,
        prefix,
        record.len(),
        tlv.len()
    );
    Ok(tlv)
}

/// Builds the bare NDEF record: `D1 01 <len> 55 <prefix> <remainder...>`.
pub fn encode_uri_record(prefix: UriPrefix, remainder: &str) -> Result<Vec<u8>, EncodeError> {
    let remainder_bytes = ascii_bytes(remainder)?;

    let payload_len = remainder_bytes.len() + 1;
    if payload_len > MAX_PAYLOAD_LEN {
        return Err(EncodeError::EncodingTooLarge {
            payload_len,
            max: MAX_PAYLOAD_LEN,
        });
    }

    let mut record = Vec::with_capacity(3 + URI_RECORD_TYPE.len() + payload_len);
    record.push(RECORD_HEADER);
    record.push(URI_RECORD_TYPE.len() as u8); // Type Length
    record.push(payload_len as u8); // Payload Length (SR=1)
    record.extend_from_slice(URI_RECORD_TYPE);
    record.push(prefix.code());
    record.extend_from_slice(remainder_bytes);
    Ok(record)
}

fn ascii_bytes(text: &str) -> Result<&[u8], EncodeError> {
    if let Some((position, character)) = text.chars().enumerate().find(|(_, c)| !c.is_ascii()) {
        return Err(EncodeError::NonAsciiCharacter {
            character,
            position,
        });
    }
    Ok(text.as_bytes())
}

/// Wraps an NDEF message in `03 <len> ... FE`. Messages of 255 bytes or
/// more use the three-byte length form `FF hi lo`.
pub fn wrap_in_tlv(ndef_bytes: &[u8]) -> Vec<u8> {
    debug_assert!(ndef_bytes.len() <= u16::MAX as usize);

    let mut tlv = Vec::with_capacity(ndef_bytes.len() + 5);
    tlv.push(TLV_NDEF);

    if ndef_bytes.len() < TLV_LONG_LENGTH as usize {
        tlv.push(ndef_bytes.len() as u8);
    } else {
        tlv.push(TLV_LONG_LENGTH);
        tlv.extend_from_slice(&(ndef_bytes.len() as u16).to_be_bytes());
    }

    tlv.extend_from_slice(ndef_bytes);
    tlv.push(TLV_TERMINATOR);
    tlv
}

/// Recovers the URI record from a TLV byte stream. Trailing zero padding
/// is ignored.
pub fn decode(buffer: &[u8]) -> Result<UriRecord, DecodeError> {
    let message = find_ndef_message(buffer)?;
    parse_uri_record(message)
}

fn find_ndef_message(buffer: &[u8]) -> Result<&[u8], DecodeError> {
    let mut cursor = 0;

    while cursor < buffer.len() {
        let tag = buffer[cursor];
        cursor += 1;

        match tag {
            TLV_NULL => continue,
            TLV_TERMINATOR => break,
            _ => {
                let len = read_tlv_length(buffer, &mut cursor)?;
                let value = take(buffer, &mut cursor, len, "TLV value")?;
                if tag == TLV_NDEF {
                    return Ok(value);
                }
                debug!("Skipping TLV 0x{:02X} ({} bytes)", tag, len);
            }
        }
    }

    Err(DecodeError::NoNdefTlv)
}

fn read_tlv_length(buffer: &[u8], cursor: &mut usize) -> Result<usize, DecodeError> {
    let first = take(buffer, cursor, 1, "TLV length")?[0];
    if first != TLV_LONG_LENGTH {
        return Ok(first as usize);
    }
    let long = take(buffer, cursor, 2, "TLV length")?;
    Ok(u16::from_be_bytes([long[0], long[1]]) as usize)
}

fn parse_uri_record(message: &[u8]) -> Result<UriRecord, DecodeError> {
    let mut cursor = 0;

    let header = take(message, &mut cursor, 1, "record header")?[0];
    let tnf = header & 0x07;
    if tnf != TNF_WELL_KNOWN {
        return Err(DecodeError::UnsupportedRecord(format!("TNF 0x{:02X}", tnf)));
    }
    if header & FLAG_CF != 0 {
        return Err(DecodeError::UnsupportedRecord("chunked record".into()));
    }

    let type_len = take(message, &mut cursor, 1, "type length")?[0] as usize;

    // 1 byte for Short Record, 4 bytes otherwise
    let payload_len = if header & FLAG_SR != 0 {
        take(message, &mut cursor, 1, "payload length")?[0] as usize
    } else {
        let len = take(message, &mut cursor, 4, "payload length")?;
        u32::from_be_bytes([len[0], len[1], len[2], len[3]]) as usize
    };

    let id_len = if header & FLAG_IL != 0 {
        take(message, &mut cursor, 1, "ID length")?[0] as usize
    } else {
        0
    };

    let record_type = take(message, &mut cursor, type_len, "record type")?;
    if record_type != URI_RECORD_TYPE {
        return Err(DecodeError::UnsupportedRecord(format!(
            "type {:?}",
            String::from_utf8_lossy(record_type)
        )));
    }

    take(message, &mut cursor, id_len, "record ID")?;
    let payload = take(message, &mut cursor, payload_len, "payload")?;

    let (&code, remainder) = payload
        .split_first()
        .ok_or(DecodeError::Truncated("URI prefix"))?;
    let prefix = UriPrefix::from_code(code).ok_or(DecodeError::UnsupportedPrefix(code))?;

    if !remainder.is_ascii() {
        return Err(DecodeError::NonAsciiRemainder);
    }
    let remainder =
        String::from_utf8(remainder.to_vec()).map_err(|_| DecodeError::NonAsciiRemainder)?;

    Ok(UriRecord { prefix, remainder })
}

fn take<'a>(
    data: &'a [u8],
    cursor: &mut usize,
    len: usize,
    what: &'static str,
) -> Result<&'a [u8], DecodeError> {
    let end = cursor
        .checked_add(len)
        .filter(|&end| end <= data.len())
        .ok_or(DecodeError::Truncated(what))?;
    let slice = &data[*cursor..end];
    *cursor = end;
    Ok(slice)
}
