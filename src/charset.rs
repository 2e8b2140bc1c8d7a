use std::borrow::Cow;

/// Text encoding used to decode record bytes for key comparison and to encode sorted lines.
///
/// Raw record bytes on the merge path are never re-encoded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Charset {
    /// UTF-8, invalid sequences decode to U+FFFD
    #[default]
    Utf8,
    /// ISO-8859-1, every byte is the code point of the same value
    Latin1,
}

impl Charset {
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str> {
        match self {
            Charset::Utf8 => String::from_utf8_lossy(bytes),
            Charset::Latin1 => {
                if bytes.is_ascii() {
                    // ASCII is valid UTF-8
                    String::from_utf8_lossy(bytes)
                } else {
                    Cow::Owned(bytes.iter().map(|b| *b as char).collect())
                }
            }
        }
    }

    pub fn encode_into(&self, text: &str, out: &mut Vec<u8>) {
        match self {
            Charset::Utf8 => out.extend_from_slice(text.as_bytes()),
            Charset::Latin1 => {
                out.extend(
                    text.chars().map(|c| if (c as u32) <= 0xFF { c as u32 as u8 } else { b'?' })
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::charset::Charset;

    #[test]
    fn test_latin1_round_trip() {
        let bytes = [b'a', 0xE9, b'z'];
        let text = Charset::Latin1.decode(&bytes);
        assert_eq!(text, "a\u{e9}z");
        let mut out = Vec::new();
        Charset::Latin1.encode_into(&text, &mut out);
        assert_eq!(out, bytes);
    }

    #[test]
    fn test_latin1_unmappable() {
        let mut out = Vec::new();
        Charset::Latin1.encode_into("a\u{20ac}", &mut out);
        assert_eq!(out, b"a?");
    }

    #[test]
    fn test_utf8_lossy() {
        assert_eq!(Charset::Utf8.decode("héllo".as_bytes()), "héllo");
        assert_eq!(Charset::Utf8.decode(&[b'a', 0xFF]), "a\u{fffd}");
    }
}
