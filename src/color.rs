//! RGBA colour parsed from the CSS-style strings used in [`crate::StyleOptions`].

use std::fmt;
use std::str::FromStr;

use image::Rgba;

use crate::error::QrError;

/// RGBA color with 8-bit components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const TRANSPARENT: Color = Color::new(0, 0, 0, 0);

    /// Parses `#rgb`, `#rgba`, `#rrggbb`, `#rrggbbaa` or `transparent`.
    pub fn parse(input: &str) -> Result<Self, QrError> {
        let s = input.trim();
        if s.eq_ignore_ascii_case("transparent") {
            return Ok(Self::TRANSPARENT);
        }
        let invalid = || QrError::InvalidOptions(format!("unsupported colour {input:?}"));
        let hex = s.strip_prefix('#').ok_or_else(invalid)?;
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }

        let nibble = |i: usize| u8::from_str_radix(&hex[i..=i], 16).map(|v| v * 17);
        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16);
        let color = match hex.len() {
            3 => Self::rgb(nibble(0)?, nibble(1)?, nibble(2)?),
            4 => Self::new(nibble(0)?, nibble(1)?, nibble(2)?, nibble(3)?),
            6 => Self::rgb(byte(0)?, byte(2)?, byte(4)?),
            8 => Self::new(byte(0)?, byte(2)?, byte(4)?, byte(6)?),
            _ => return Err(invalid()),
        };
        Ok(color)
    }

    pub fn is_opaque(self) -> bool {
        self.a == 255
    }

    /// `#rrggbb`, without alpha, for SVG `fill` attributes.
    pub fn to_css_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Alpha as an SVG `fill-opacity` value.
    pub fn opacity(self) -> f32 {
        f32::from(self.a) / 255.0
    }

    pub fn to_rgba(self) -> Rgba<u8> {
        Rgba([self.r, self.g, self.b, self.a])
    }
}

impl From<std::num::ParseIntError> for QrError {
    fn from(err: std::num::ParseIntError) -> Self {
        QrError::InvalidOptions(format!("invalid colour component: {err}"))
    }
}

impl FromStr for Color {
    type Err = QrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Color::parse(s)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_opaque() {
            f.write_str(&self.to_css_hex())
        } else {
            write!(f, "{}{:02x}", self.to_css_hex(), self.a)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_forms() {
        assert_eq!(Color::parse("#fff").unwrap(), Color::WHITE);
        assert_eq!(Color::parse("#000000").unwrap(), Color::BLACK);
        assert_eq!(Color::parse("#0008").unwrap(), Color::new(0, 0, 0, 0x88));
        assert_eq!(Color::parse("#1A2b3C").unwrap(), Color::rgb(0x1a, 0x2b, 0x3c));
        assert_eq!(Color::parse("#11223344").unwrap(), Color::new(0x11, 0x22, 0x33, 0x44));
        assert_eq!(Color::parse(" Transparent ").unwrap(), Color::TRANSPARENT);
    }

    #[test]
    fn rejects_garbage() {
        for input in ["", "red", "#12", "#12345", "#gggggg", "000000", "#ééé"] {
            assert!(Color::parse(input).is_err(), "{input} should not parse");
        }
    }

    #[test]
    fn display_round_trips() {
        for input in ["#ff8800", "#ff880080"] {
            assert_eq!(Color::parse(input).unwrap().to_string(), input);
        }
        assert_eq!(Color::new(0, 0, 0, 0).opacity(), 0.0);
    }
}
