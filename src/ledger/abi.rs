//! Contract ABI encoding for the `ModelStorage` contract.
//!
//! Only the two calls the anchor protocol needs are covered:
//! `storeModelHash(uint256,string,string)` and
//! `getModelData(uint256) returns (string,string)`.

use sha3::{Digest, Keccak256};
use crate::error::LedgerError;

pub const STORE_SIGNATURE: &str = "storeModelHash(uint256,string,string)";
pub const FETCH_SIGNATURE: &str = "getModelData(uint256)";

const WORD: usize = 32;

pub fn selector(signature: &str) -> [u8; 4] {
    let hash = Keccak256::digest(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&hash[..4]);
    out
}

pub fn encode_store(id: u64, parameters_hash: &str, metadata_hash: &str) -> String {
    let mut data = selector(STORE_SIGNATURE).to_vec();
    data.extend_from_slice(&uint_word(id));

    // Head: id, offset(a), offset(b). Offsets count from the start of the arguments.
    let first_offset = 3 * WORD;
    let second_offset = first_offset + WORD + padded_len(parameters_hash.len());
    data.extend_from_slice(&uint_word(first_offset as u64));
    data.extend_from_slice(&uint_word(second_offset as u64));
    append_string(&mut data, parameters_hash);
    append_string(&mut data, metadata_hash);

    format!("0x{}", hex::encode(data))
}

pub fn encode_fetch(id: u64) -> String {
    let mut data = selector(FETCH_SIGNATURE).to_vec();
    data.extend_from_slice(&uint_word(id));
    format!("0x{}", hex::encode(data))
}

/// Decode the `(string, string)` return data of `getModelData`.
pub fn decode_string_pair(data: &str) -> Result<(String, String), LedgerError> {
    let bytes = decode_hex(data)?;
    if bytes.len() < 2 * WORD {
        return Err(invalid(format!("return data too short ({} bytes)", bytes.len())));
    }
    let first = read_string(&bytes, read_usize(&bytes, 0)?)?;
    let second = read_string(&bytes, read_usize(&bytes, WORD)?)?;
    Ok((first, second))
}

/// Parse a JSON-RPC hex quantity such as `"0x1b4"`.
pub fn parse_quantity(s: &str) -> Result<u64, LedgerError> {
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| invalid(format!("quantity without 0x prefix: {s}")))?;
    if digits.is_empty() {
        return Err(invalid("empty quantity".to_string()));
    }
    u64::from_str_radix(digits, 16).map_err(|e| invalid(format!("bad quantity {s}: {e}")))
}

fn decode_hex(data: &str) -> Result<Vec<u8>, LedgerError> {
    let digits = data.strip_prefix("0x").unwrap_or(data);
    hex::decode(digits).map_err(|e| invalid(format!("return data is not hex: {e}")))
}

fn uint_word(value: u64) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[WORD - 8..].copy_from_slice(&value.to_be_bytes());
    word
}

fn padded_len(len: usize) -> usize {
    len.div_ceil(WORD) * WORD
}

fn append_string(data: &mut Vec<u8>, s: &str) {
    data.extend_from_slice(&uint_word(s.len() as u64));
    data.extend_from_slice(s.as_bytes());
    data.resize(data.len() + padded_len(s.len()) - s.len(), 0);
}

fn read_usize(bytes: &[u8], at: usize) -> Result<usize, LedgerError> {
    let word = at
        .checked_add(WORD)
        .and_then(|end| bytes.get(at..end))
        .ok_or_else(|| invalid(format!("no word at offset {at}")))?;
    if word[..WORD - 8].iter().any(|b| *b != 0) {
        return Err(invalid(format!("value at offset {at} does not fit in 64 bits")));
    }
    let mut be = [0u8; 8];
    be.copy_from_slice(&word[WORD - 8..]);
    usize::try_from(u64::from_be_bytes(be)).map_err(|e| invalid(e.to_string()))
}

fn read_string(bytes: &[u8], offset: usize) -> Result<String, LedgerError> {
    let len = read_usize(bytes, offset)?;
    let start = offset + WORD;
    let raw = start
        .checked_add(len)
        .and_then(|end| bytes.get(start..end))
        .ok_or_else(|| invalid(format!("string at offset {offset} overruns return data")))?;
    String::from_utf8(raw.to_vec()).map_err(|e| invalid(format!("string is not UTF-8: {e}")))
}

fn invalid(message: String) -> LedgerError {
    LedgerError::invalid_response("abi_decode", message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_pair(a: &str, b: &str) -> String {
        let mut data = Vec::new();
        data.extend_from_slice(&uint_word(2 * WORD as u64));
        data.extend_from_slice(&uint_word((3 * WORD + padded_len(a.len())) as u64));
        append_string(&mut data, a);
        append_string(&mut data, b);
        format!("0x{}", hex::encode(data))
    }

    #[test]
    fn test_selector_known_vector() {
        assert_eq!(hex::encode(selector("transfer(address,uint256)")), "a9059cbb");
    }

    #[test]
    fn test_encode_fetch_layout() {
        let data = encode_fetch(1);
        assert_eq!(data.len(), 2 + 2 * (4 + WORD));
        assert!(data.ends_with("0000000000000001"));
        assert!(data.starts_with(&format!("0x{}", hex::encode(selector(FETCH_SIGNATURE)))));
    }

    #[test]
    fn test_encode_store_layout() {
        let a = "a".repeat(64);
        let b = "b".repeat(64);
        let data = encode_store(1, &a, &b);
        let bytes = hex::decode(&data[2..]).unwrap();
        // selector + 3 head words + 2 * (length word + 64 bytes)
        assert_eq!(bytes.len(), 4 + 3 * WORD + 2 * (WORD + 64));

        let args = &bytes[4..];
        assert_eq!(read_usize(args, WORD).unwrap(), 3 * WORD);
        assert_eq!(read_usize(args, 2 * WORD).unwrap(), 3 * WORD + WORD + 64);
        assert_eq!(read_string(args, 3 * WORD).unwrap(), a);
        assert_eq!(read_string(args, 3 * WORD + WORD + 64).unwrap(), b);
    }

    #[test]
    fn test_decode_string_pair() {
        let encoded = encode_pair("abc", "def0");
        let (a, b) = decode_string_pair(&encoded).unwrap();
        assert_eq!(a, "abc");
        assert_eq!(b, "def0");
    }

    #[test]
    fn test_decode_empty_pair() {
        let (a, b) = decode_string_pair(&encode_pair("", "")).unwrap();
        assert!(a.is_empty() && b.is_empty());
    }

    #[test]
    fn test_decode_rejects_empty_return() {
        let err = decode_string_pair("0x").unwrap_err();
        assert_eq!(err.error_code(), "INVALID_RESPONSE");
    }

    #[test]
    fn test_decode_rejects_overrun() {
        let mut data = Vec::new();
        data.extend_from_slice(&uint_word(64));
        data.extend_from_slice(&uint_word(64));
        data.extend_from_slice(&uint_word(1000));
        assert!(decode_string_pair(&hex::encode(data)).is_err());
    }

    #[test]
    fn test_decode_rejects_huge_offset() {
        let data = format!("0x{:064x}{:064x}", u64::MAX - 15, 2 * WORD);
        let err = decode_string_pair(&data).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_RESPONSE");

        let data = format!("0x{:064x}{:064x}", 2 * WORD, u64::MAX);
        assert!(decode_string_pair(&data).is_err());
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_quantity("0x1b4").unwrap(), 436);
        assert!(parse_quantity("12").is_err());
        assert!(parse_quantity("0x").is_err());
    }
}
