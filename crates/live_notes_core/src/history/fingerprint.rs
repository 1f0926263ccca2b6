//! Content fingerprint of a snapshot.
//!
//! A 32-bit rolling hash (`h = h * 31 + byte`, wrapping) rendered in signed
//! base 36. It is only used to skip recording a version whose bytes equal the
//! previous one, so speed and stability across runs matter more than
//! collision resistance.

const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Fingerprint a snapshot's bytes.
pub fn fingerprint(bytes: &[u8]) -> String {
    let hash = bytes
        .iter()
        .fold(0i32, |h, &b| h.wrapping_mul(31).wrapping_add(i32::from(b)));
    to_base36(hash)
}

fn to_base36(value: i32) -> String {
    if value == 0 {
        return "0".to_string();
    }

    let mut magnitude = i64::from(value).unsigned_abs();
    let mut digits = Vec::new();
    while magnitude > 0 {
        digits.push(DIGITS[(magnitude % 36) as usize]);
        magnitude /= 36;
    }
    if value < 0 {
        digits.push(b'-');
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}
