use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// 像素颜色，格式为 `#RRGGBB`
///
/// 输入大小写不敏感，按原样保存（不做大小写归一化）。
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color([u8; 7]);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ColorError {
    #[error("color must be 7 characters long, got {0}")]
    Length(usize),
    #[error("color must start with '#'")]
    MissingHash,
    #[error("color contains a non-hex digit")]
    NotHex,
}

impl Color {
    pub const WHITE: Color = Color(*b"#FFFFFF");

    pub fn parse(s: &str) -> Result<Self, ColorError> {
        let bytes = s.as_bytes();
        if bytes.len() != 7 {
            return Err(ColorError::Length(s.chars().count()));
        }
        if bytes[0] != b'#' {
            return Err(ColorError::MissingHash);
        }
        if !bytes[1..].iter().all(u8::is_ascii_hexdigit) {
            return Err(ColorError::NotHex);
        }

        let mut raw = [0u8; 7];
        raw.copy_from_slice(bytes);
        Ok(Color(raw))
    }

    pub fn as_str(&self) -> &str {
        // 构造时已校验为 ASCII
        std::str::from_utf8(&self.0).unwrap_or("#FFFFFF")
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::WHITE
    }
}

impl FromStr for Color {
    type Err = ColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Color::parse(s)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Color({})", self.as_str())
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Color::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_both_cases_and_keeps_them() {
        assert_eq!(Color::parse("#ff00aa").unwrap().as_str(), "#ff00aa");
        assert_eq!(Color::parse("#FF00AA").unwrap().as_str(), "#FF00AA");
        assert_eq!(Color::parse("#aBc123").unwrap().as_str(), "#aBc123");
    }

    #[test]
    fn rejects_malformed_colors() {
        assert_eq!(Color::parse("FF00AA"), Err(ColorError::Length(6)));
        assert_eq!(Color::parse("#FF00A"), Err(ColorError::Length(6)));
        assert_eq!(Color::parse("#FF00AA0"), Err(ColorError::Length(8)));
        assert_eq!(Color::parse("xFF00AA"), Err(ColorError::MissingHash));
        assert_eq!(Color::parse("#GG0000"), Err(ColorError::NotHex));
        assert_eq!(Color::parse("#ÿÿÿ"), Err(ColorError::NotHex));
        assert!(Color::parse("").is_err());
    }

    #[test]
    fn default_is_white() {
        assert_eq!(Color::default().as_str(), "#FFFFFF");
    }

    #[test]
    fn serde_uses_plain_strings() {
        let color = Color::parse("#00ff00").unwrap();
        assert_eq!(serde_json::to_string(&color).unwrap(), "\"#00ff00\"");
        let back: Color = serde_json::from_str("\"#00ff00\"").unwrap();
        assert_eq!(back, color);
        assert!(serde_json::from_str::<Color>("\"green\"").is_err());
    }
}
