use encoding_rs::{GBK, UTF_16LE, UTF_8};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TextEncoding {
    Auto,
    Utf8,
    Utf16,
    Ascii,
    Gbk,
}

impl std::str::FromStr for TextEncoding {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "UTF-8" => Self::Utf8,
            "UTF-16" => Self::Utf16,
            "ASCII" => Self::Ascii,
            "GBK" => Self::Gbk,
            _ => Self::Auto,
        })
    }
}

impl TextEncoding {
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            Self::Auto => detect_and_decode(bytes),
            Self::Utf8 => UTF_8.decode(bytes).0.into_owned(),
            Self::Utf16 => UTF_16LE.decode(bytes).0.into_owned(),
            Self::Ascii => bytes.iter().map(|&b| printable(b)).collect(),
            Self::Gbk => GBK.decode(bytes).0.into_owned(),
        }
    }
}

fn printable(b: u8) -> char {
    if b.is_ascii_graphic() || b == b' ' {
        b as char
    } else {
        '.'
    }
}

/// Formats a received byte as `hex - decimal - char`, e.g. `41 - 65 - A`.
pub fn describe_byte(b: u8) -> String {
    format!("{b:02X} - {b:02} - {}", printable(b))
}

fn detect_and_decode(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return String::new();
    }

    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }

    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(bytes, true);
    let encoding = detector.guess(None, true);

    encoding.decode(bytes).0.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describes_printable_and_control_bytes() {
        assert_eq!(describe_byte(0x41), "41 - 65 - A");
        assert_eq!(describe_byte(0x0D), "0D - 13 - .");
        assert_eq!(describe_byte(0x07), "07 - 07 - .");
        assert_eq!(describe_byte(0xFF), "FF - 255 - .");
    }

    #[test]
    fn ascii_masks_non_printables() {
        assert_eq!(TextEncoding::Ascii.decode(b"ok\x07\xff"), "ok..");
    }

    #[test]
    fn auto_passes_utf8_through() {
        assert_eq!(TextEncoding::Auto.decode("héllo".as_bytes()), "héllo");
        assert_eq!("GBK".parse::<TextEncoding>(), Ok(TextEncoding::Gbk));
    }
}
