use rust_decimal::Decimal;

use crate::error::ScanError;

fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

// Parses a JSON-RPC quantity such as "0x1b4".
pub fn parse_hex_u64(s: &str) -> Result<u64, ScanError> {
    let digits = strip_hex_prefix(s.trim());
    if digits.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(digits, 16).map_err(|e| ScanError::Decode(format!("bad quantity {}: {}", s, e)))
}

pub fn parse_hex_u128(s: &str) -> Result<u128, ScanError> {
    let digits = strip_hex_prefix(s.trim()).trim_start_matches('0');
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16).map_err(|e| ScanError::Decode(format!("bad quantity {}: {}", s, e)))
}

pub fn to_hex_quantity(n: u64) -> String {
    format!("0x{:x}", n)
}

// True when the leading hex digits of `s` encode zero. Call data is read the
// same way: "0x", "" and "0x0000" all mean a plain value transfer.
pub fn hex_is_zero(s: &str) -> bool {
    strip_hex_prefix(s.trim())
        .chars()
        .take_while(|c| c.is_ascii_hexdigit())
        .all(|c| c == '0')
}

// Converts an integer amount in base units into a decimal with `decimals` places.
// Trailing zeros are folded into the scale first, so round amounts well past
// the 96-bit mantissa (1e11 of an 18-decimal token) still convert exactly.
pub fn base_units_to_decimal(value: u128, decimals: u32) -> Result<Decimal, ScanError> {
    let (mut mantissa, mut scale) = (value, decimals);
    while scale > 0 && mantissa != 0 && mantissa % 10 == 0 {
        mantissa /= 10;
        scale -= 1;
    }
    let mantissa = i128::try_from(mantissa).map_err(|_| ScanError::Amount(value.to_string()))?;
    Decimal::try_from_i128_with_scale(mantissa, scale)
        .map(|d| d.normalize())
        .map_err(|e| ScanError::Amount(format!("{} (scale {}): {}", value, decimals, e)))
}

// Extracts the 20-byte address packed into the low bytes of a 32-byte log topic.
pub fn topic_to_address(topic: &str) -> Option<String> {
    let digits = strip_hex_prefix(topic);
    // Node input is untrusted; a multi-byte char must not split the slice
    let tail = digits.get(digits.len().checked_sub(40)?..)?;
    hex::decode(tail).ok()?;
    Some(format!("0x{}", tail.to_lowercase()))
}
