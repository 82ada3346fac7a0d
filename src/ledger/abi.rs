//! Minimal Solidity ABI helpers for the two ledger calls the monitor issues:
//! a zero-argument `uint256` getter and a `(uint256, uint256) -> string[]`
//! range query. Only static `uint256` arguments are encoded.

use anyhow::{bail, Context, Result};

const WORD: usize = 32;

/// Parses a 4-byte function selector written as hex (with or without `0x`).
pub fn selector_from_hex(value: &str) -> Result<[u8; 4]> {
    let bytes = hex::decode(strip_prefix(value.trim())).context("invalid selector hex")?;
    let selector: [u8; 4] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| anyhow::anyhow!("selector must be exactly 4 bytes, got {}", bytes.len()))?;
    Ok(selector)
}

/// Encodes `selector ++ uint256(arg)...` as a `0x`-prefixed hex string.
pub fn encode_call(selector: [u8; 4], args: &[u64]) -> String {
    let mut data = Vec::with_capacity(4 + args.len() * WORD);
    data.extend_from_slice(&selector);
    for arg in args {
        data.extend_from_slice(&uint_word(*arg));
    }
    format!("0x{}", hex::encode(data))
}

/// Decodes a single `uint256` return value that must fit into a `u64`.
pub fn decode_u64(raw: &str) -> Result<u64> {
    let data = decode_hex(raw)?;
    let word = read_word(&data, 0).context("uint256 result is shorter than one word")?;
    word_to_u64(word)
}

/// Decodes a dynamic `string[]` return value.
pub fn decode_string_array(raw: &str) -> Result<Vec<String>> {
    let data = decode_hex(raw)?;
    let array_offset = read_usize(&data, 0).context("missing string[] head offset")?;
    let len = read_usize(&data, array_offset).context("missing string[] length")?;
    let base = array_offset
        .checked_add(WORD)
        .context("string[] offset overflow")?;

    // Each element needs at least its offset word, which bounds bogus lengths.
    if len > data.len() / WORD {
        bail!("string[] length {len} exceeds payload size {}", data.len());
    }

    let mut values = Vec::with_capacity(len);
    for index in 0..len {
        let slot = index
            .checked_mul(WORD)
            .and_then(|rel| base.checked_add(rel))
            .context("string[] slot overflow")?;
        let relative = read_usize(&data, slot)
            .with_context(|| format!("missing offset for string[{index}]"))?;
        let position = base
            .checked_add(relative)
            .context("string offset overflow")?;
        let str_len = read_usize(&data, position)
            .with_context(|| format!("missing length for string[{index}]"))?;
        let start = position.checked_add(WORD).context("string start overflow")?;
        let end = start.checked_add(str_len).context("string end overflow")?;
        let bytes = data
            .get(start..end)
            .with_context(|| format!("string[{index}] runs past the end of the payload"))?;
        let value = String::from_utf8(bytes.to_vec())
            .with_context(|| format!("string[{index}] is not valid UTF-8"))?;
        values.push(value);
    }

    Ok(values)
}

fn strip_prefix(value: &str) -> &str {
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value)
}

fn decode_hex(raw: &str) -> Result<Vec<u8>> {
    hex::decode(strip_prefix(raw.trim())).context("ABI result is not valid hex")
}

fn uint_word(value: u64) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[WORD - 8..].copy_from_slice(&value.to_be_bytes());
    word
}

fn read_word(data: &[u8], offset: usize) -> Result<&[u8]> {
    let end = offset.checked_add(WORD).context("word offset overflow")?;
    data.get(offset..end)
        .with_context(|| format!("no ABI word at offset {offset} (payload is {} bytes)", data.len()))
}

fn word_to_u64(word: &[u8]) -> Result<u64> {
    let (high, low) = word.split_at(WORD - 8);
    if high.iter().any(|byte| *byte != 0) {
        bail!("uint256 value does not fit into 64 bits");
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(low);
    Ok(u64::from_be_bytes(buf))
}

fn read_usize(data: &[u8], offset: usize) -> Result<usize> {
    let value = word_to_u64(read_word(data, offset)?)?;
    usize::try_from(value).context("ABI offset does not fit into usize")
}
