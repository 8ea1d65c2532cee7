//! Canonical barcode keys.
//!
//! Decoders report UPC-A symbols as 13-digit EAN-13 with a leading zero, while
//! the product service keys them by the 12-digit UPC-A form. Collapsing the two
//! here means a product is cached once no matter which symbology the scanner
//! reported.

/// Turn raw decoded text into the lookup key.
///
/// Exactly 13 ASCII digits starting with `0` lose the leading zero. Everything
/// else, including the empty string, passes through untouched. The result of
/// a collapse is 12 characters long, so applying this twice changes nothing.
pub fn normalize(raw: &str) -> String {
    if is_zero_prefixed_ean13(raw) {
        raw[1..].to_string()
    } else {
        raw.to_string()
    }
}

fn is_zero_prefixed_ean13(raw: &str) -> bool {
    raw.len() == 13 && raw.starts_with('0') && raw.bytes().all(|b| b.is_ascii_digit())
}
