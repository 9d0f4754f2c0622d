//! Device token conversion between the 64-character hex form exchanged
//! with application servers and the 32-byte binary form APNS frames carry.

use crate::error::ApnsError;

/// Binary size of a device token on the wire.
pub const DEVICE_TOKEN_LEN: usize = 32;

/// Parses a hex device token into its 32-byte binary form.
///
/// Interior spaces are tolerated (tokens are often copied out of logs
/// with group separators). Anything else that is not a hex digit, or a
/// decoded length other than 32 bytes, is rejected.
pub fn hex_to_binary(token: &str) -> Result<[u8; DEVICE_TOKEN_LEN], ApnsError> {
    let mut out = [0u8; DEVICE_TOKEN_LEN];
    let mut nibbles = token.chars().filter(|c| *c != ' ');
    let mut len = 0;

    loop {
        let hi = match nibbles.next() {
            Some(c) => c,
            None => break,
        };
        let lo = nibbles.next().ok_or_else(|| {
            ApnsError::InvalidToken(format!("odd number of hex digits in '{token}'"))
        })?;

        if len == DEVICE_TOKEN_LEN {
            return Err(ApnsError::InvalidToken(format!(
                "token '{token}' is longer than {DEVICE_TOKEN_LEN} bytes"
            )));
        }

        let hi = hi.to_digit(16).ok_or_else(|| {
            ApnsError::InvalidToken(format!("non-hex character '{hi}' in '{token}'"))
        })?;
        let lo = lo.to_digit(16).ok_or_else(|| {
            ApnsError::InvalidToken(format!("non-hex character '{lo}' in '{token}'"))
        })?;

        out[len] = ((hi << 4) | lo) as u8;
        len += 1;
    }

    if len != DEVICE_TOKEN_LEN {
        return Err(ApnsError::InvalidToken(format!(
            "token '{token}' decodes to {len} bytes, expected {DEVICE_TOKEN_LEN}"
        )));
    }

    Ok(out)
}

/// Lowercase hex form of a binary device token, no separators.
pub fn binary_to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Renders raw wire bytes for diagnostics: printable ASCII passes
/// through, everything else becomes a `\xNN` escape.
pub fn safe_print(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        if (0x20..=0x7e).contains(&b) {
            out.push(b as char);
        } else {
            out.push_str(&format!("\\x{b:02x}"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "0102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f20";

    #[test]
    fn test_hex_to_binary_round_trip() {
        let binary = hex_to_binary(TOKEN).unwrap();
        assert_eq!(binary[0], 0x01);
        assert_eq!(binary[31], 0x20);
        assert_eq!(binary_to_hex(&binary), TOKEN);
    }

    #[test]
    fn test_hex_to_binary_strips_spaces() {
        let spaced = "0102030405060708 090a0b0c0d0e0f10 1112131415161718 191a1b1c1d1e1f20";
        let binary = hex_to_binary(spaced).unwrap();
        assert_eq!(binary_to_hex(&binary), TOKEN);
    }

    #[test]
    fn test_hex_to_binary_is_case_insensitive() {
        let upper = TOKEN.to_uppercase();
        let binary = hex_to_binary(&upper).unwrap();
        assert_eq!(binary_to_hex(&binary), TOKEN);
    }

    #[test]
    fn test_hex_to_binary_rejects_short_token() {
        assert!(hex_to_binary("0102").is_err());
    }

    #[test]
    fn test_hex_to_binary_rejects_long_token() {
        let long = format!("{TOKEN}ff");
        assert!(hex_to_binary(&long).is_err());
    }

    #[test]
    fn test_hex_to_binary_rejects_odd_length() {
        let odd = &TOKEN[..63];
        assert!(hex_to_binary(odd).is_err());
    }

    #[test]
    fn test_hex_to_binary_rejects_non_hex() {
        let bad = format!("zz{}", &TOKEN[2..]);
        assert!(hex_to_binary(&bad).is_err());
    }

    #[test]
    fn test_safe_print_escapes_non_printable() {
        assert_eq!(safe_print(b"abc"), "abc");
        assert_eq!(safe_print(&[0x01, b'A', 0xff]), "\\x01A\\xff");
    }
}
