use std::io::Read;

use flate2::read::ZlibDecoder;
use serde_json::Value;

/// JSON form of a raw barcode payload, or `None` when it is plain text
///
/// Strict JSON is tried first, then hex-encoded zlib-compressed JSON.
pub fn parse_payload(raw: &str) -> Option<Value> {
    serde_json::from_str(raw)
        .ok()
        .or_else(|| decode_compressed_json(raw))
}

/// Hex → zlib inflate → UTF-8 → JSON; any failing stage yields `None`
pub fn decode_compressed_json(raw: &str) -> Option<Value> {
    let compressed = hex::decode(raw.trim()).ok()?;
    let mut json = String::new();
    ZlibDecoder::new(compressed.as_slice())
        .read_to_string(&mut json)
        .ok()?;
    serde_json::from_str(&json).ok()
}
