//! Characteristic payload encoding and decoding
//! This module turns raw GATT values into display text, and outbound UART
//! text into MTU-sized chunks.

use uuid::Uuid;

use crate::core::bluetooth::names::{value_format, ValueFormat};

/// Rendered in place of a payload that is not valid UTF-8
pub const NOT_DECODABLE: &str = "<not decodable>";

/// Lowercase hex, two digits per byte, no separators
pub fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;

    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{:02x}", b);
        out
    })
}

/// Parses hex text, ignoring any non-hex characters such as spaces or `<>`.
/// Returns `None` for an odd number of hex digits.
pub fn hex_decode(text: &str) -> Option<Vec<u8>> {
    let digits: Vec<u8> = text
        .chars()
        .filter_map(|c| c.to_digit(16))
        .map(|d| d as u8)
        .collect();
    if digits.len() % 2 == 1 {
        return None;
    }
    Some(digits.chunks(2).map(|pair| (pair[0] << 4) | pair[1]).collect())
}

/// Decodes a BTLE text field: bytes up to the first NUL as UTF-8.
/// Devices pad fixed-length fields with NULs; anything after one is ignored.
pub fn decode_btle_text(bytes: &[u8]) -> Option<String> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    std::str::from_utf8(&bytes[..end]).ok().map(str::to_string)
}

/// Like [`decode_btle_text`] but never fails; invalid UTF-8 renders as [`NOT_DECODABLE`]
pub fn render_btle_text(bytes: &[u8]) -> String {
    decode_btle_text(bytes).unwrap_or_else(|| NOT_DECODABLE.to_string())
}

/// Splits `text` into chunks of at most `chunk_size` bytes, in order.
/// Chunk boundaries may fall inside a multi-byte character; the receiver
/// reassembles by concatenation.
pub fn chunk_text(text: &str, chunk_size: usize) -> Vec<Vec<u8>> {
    let chunk_size = chunk_size.max(1);
    text.as_bytes()
        .chunks(chunk_size)
        .map(<[u8]>::to_vec)
        .collect()
}

/// Renders a characteristic value for the device list
pub fn render_value(uuid: &Uuid, bytes: &[u8]) -> String {
    match value_format(uuid) {
        ValueFormat::BatteryLevel => match bytes {
            [level] if *level <= 100 => format!("{}%", level),
            _ => hex_encode(bytes),
        },
        ValueFormat::CurrentTime => match bytes {
            [value] if *value <= 0x0f => value.to_string(),
            _ => hex_encode(bytes),
        },
        ValueFormat::LocalTimeInformation => {
            render_local_time_information(bytes).unwrap_or_else(|| hex_encode(bytes))
        }
        ValueFormat::RawHex => hex_encode(bytes),
        ValueFormat::Text => render_btle_text(bytes),
    }
}

fn render_local_time_information(bytes: &[u8]) -> Option<String> {
    let [zone, dst] = bytes else {
        return None;
    };
    Some(format!("{}, {}", time_zone(*zone as i8)?, dst_offset(*dst)?))
}

/// Time zone in 15 minute steps from UTC, -48..=56, -128 meaning unknown
fn time_zone(quarters: i8) -> Option<String> {
    match quarters {
        -128 => Some("Time zone unknown".to_string()),
        -48..=56 => {
            let minutes = i32::from(quarters) * 15;
            let sign = if minutes < 0 { '-' } else { '+' };
            let minutes = minutes.abs();
            Some(format!("UTC{}{}:{:02}", sign, minutes / 60, minutes % 60))
        }
        _ => None,
    }
}

fn dst_offset(code: u8) -> Option<&'static str> {
    match code {
        0 => Some("Standard Time"),
        2 => Some("Half An Hour Daylight Time (+0.5h)"),
        4 => Some("Daylight Time (+1h)"),
        8 => Some("Double Daylight Time (+2h)"),
        255 => Some("DST offset unknown"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bluetooth::constants::*;

    #[test]
    fn hex_encode_is_lowercase_without_separators() {
        assert_eq!(hex_encode(&[0x00, 0xab, 0x7f, 0x10]), "00ab7f10");
        assert_eq!(hex_encode(&[]), "");
    }

    #[test]
    fn hex_decode_reverses_encode() {
        let samples: [&[u8]; 4] = [&[], &[0], &[0xde, 0xad, 0xbe, 0xef], &[1, 2, 3, 255, 128]];
        for bytes in samples {
            assert_eq!(hex_decode(&hex_encode(bytes)).as_deref(), Some(bytes));
        }
    }

    #[test]
    fn hex_decode_skips_punctuation_and_rejects_odd_lengths() {
        assert_eq!(hex_decode("<41646166 72756974>"), Some(b"Adafruit".to_vec()));
        assert_eq!(hex_decode("abc"), None);
    }

    #[test]
    fn btle_text_stops_at_first_nul() {
        assert_eq!(decode_btle_text(b"Adafruit\0\0\0").as_deref(), Some("Adafruit"));
        assert_eq!(decode_btle_text(b"ab\0cd").as_deref(), Some("ab"));
        assert_eq!(decode_btle_text(b"").as_deref(), Some(""));
    }

    #[test]
    fn invalid_utf8_renders_marker() {
        assert_eq!(decode_btle_text(&[0xff, 0xfe, 0x41]), None);
        assert_eq!(render_btle_text(&[0xff, 0xfe, 0x41]), NOT_DECODABLE);
        // garbage after the terminator is never looked at
        assert_eq!(render_btle_text(&[0x41, 0x00, 0xff]), "A");
    }

    #[test]
    fn chunks_respect_size_and_reassemble() {
        let text = "The quick brown fox jumps over the lazy dog, twice over!";
        let chunks = chunk_text(text, UART_CHUNK_SIZE);
        assert_eq!(chunks.len(), text.len().div_ceil(UART_CHUNK_SIZE));
        assert!(chunks.iter().all(|c| c.len() <= UART_CHUNK_SIZE));
        assert_eq!(chunks.concat(), text.as_bytes());
    }

    #[test]
    fn multibyte_text_is_chunked_by_bytes() {
        let text = "ééééééééééé"; // 22 bytes
        let chunks = chunk_text(text, 20);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 20);
        assert_eq!(chunks.concat(), text.as_bytes());
        assert!(chunk_text("", 20).is_empty());
    }

    #[test]
    fn battery_level_renders_percent_or_hex() {
        assert_eq!(render_value(&UUID_BATTERY_LEVEL, &[0x32]), "50%");
        assert_eq!(render_value(&UUID_BATTERY_LEVEL, &[0x65]), "65");
        assert_eq!(render_value(&UUID_BATTERY_LEVEL, &[0x32, 0x00]), "3200");
    }

    #[test]
    fn current_time_accepts_single_small_byte_only() {
        assert_eq!(render_value(&UUID_CURRENT_TIME, &[0x07]), "7");
        assert_eq!(render_value(&UUID_CURRENT_TIME, &[0x10]), "10");
        assert_eq!(
            render_value(&UUID_CURRENT_TIME, &[0xe0, 0x07, 0x08, 0x17]),
            "e0070817"
        );
    }

    #[test]
    fn local_time_information_uses_lookup_tables() {
        assert_eq!(
            render_value(&UUID_LOCAL_TIME_INFORMATION, &[(-32i8) as u8, 4]),
            "UTC-8:00, Daylight Time (+1h)"
        );
        assert_eq!(
            render_value(&UUID_LOCAL_TIME_INFORMATION, &[22, 0]),
            "UTC+5:30, Standard Time"
        );
        // DST code 3 is reserved
        assert_eq!(render_value(&UUID_LOCAL_TIME_INFORMATION, &[4, 3]), "0403");
    }

    #[test]
    fn dfu_version_is_always_hex() {
        assert_eq!(render_value(&UUID_DFU_VERSION, b"AB"), "4142");
    }

    #[test]
    fn other_values_decode_as_text() {
        assert_eq!(render_value(&UUID_MANUFACTURER_NAME, b"Adafruit\0"), "Adafruit");
    }
}
