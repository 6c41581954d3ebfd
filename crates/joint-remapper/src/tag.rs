use core::fmt;
use serde::{Deserialize, Serialize};

/// Four-character command tag packed little-endian into a `u32`.
///
/// Tags are the opcodes, interface selectors and action selectors of the
/// request/response protocol, and also carry opaque mode values such as
/// control modes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Tag(u32);

impl Tag {
    /// Pack up to four ASCII bytes. Longer input is truncated.
    pub const fn new(text: &str) -> Self {
        let bytes = text.as_bytes();
        let mut raw = 0u32;
        let mut i = 0;
        while i < bytes.len() && i < 4 {
            raw |= (bytes[i] as u32) << (8 * i);
            i += 1;
        }
        Tag(raw)
    }

    pub const fn from_raw(raw: u32) -> Self {
        Tag(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub fn text(self) -> String {
        self.0
            .to_le_bytes()
            .iter()
            .take_while(|b| **b != 0)
            .map(|b| *b as char)
            .collect()
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.text())
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({})", self.text())
    }
}

impl TryFrom<String> for Tag {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() || value.len() > 4 || !value.is_ascii() {
            return Err(format!("invalid tag {value:?}: expected 1-4 ASCII characters"));
        }
        Ok(Tag::new(&value))
    }
}

impl From<Tag> for String {
    fn from(tag: Tag) -> Self {
        tag.text()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_and_text() {
        let tag = Tag::new("set");
        assert_eq!(tag.raw(), u32::from_le_bytes([b's', b'e', b't', 0]));
        assert_eq!(tag.text(), "set");
        assert_eq!(Tag::new("posd").text(), "posd");
        assert_eq!(Tag::new("toolong").text(), "tool");
    }

    #[test]
    fn test_string_conversion_rejects_bad_input() {
        assert!(Tag::try_from(String::new()).is_err());
        assert!(Tag::try_from("abcde".to_string()).is_err());
        assert_eq!(Tag::try_from("icmd".to_string()).unwrap(), Tag::new("icmd"));
    }

    #[test]
    fn test_json_form() {
        let json = serde_json::to_string(&Tag::new("get")).unwrap();
        assert_eq!(json, "\"get\"");
        let back: Tag = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Tag::new("get"));
    }
}
