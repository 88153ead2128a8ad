//! Hex rendering for binary fields and diagnostics.

/// Uppercase hex, no separators.
pub fn encode_upper(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for b in data {
        out.push_str(&format!("{:02X}", b));
    }
    out
}

/// Uppercase hex capped at `max_bytes` input bytes, with an ellipsis marker
/// when the input was longer.
pub fn encode_upper_truncated(data: &[u8], max_bytes: usize) -> String {
    if data.len() <= max_bytes {
        return encode_upper(data);
    }
    let mut out = encode_upper(&data[..max_bytes]);
    out.push_str("...");
    out
}
