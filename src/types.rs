//! Data model shared by the encoders, validators, and renderers.
//!
//! Field data mirrors what a form layer collects for each QR type. All values
//! are kept as strings, exactly as typed, so that validation can report on
//! malformed input instead of losing it during parsing.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::error::{QrError, QrResult};

/// The kind of content a QR code carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QrType {
    Url,
    Text,
    Copy,
    Tel,
    Sms,
    Wifi,
    Vcard,
    Event,
    Geo,
    Crypto,
    Twqr,
}

impl QrType {
    pub const ALL: [QrType; 11] = [
        QrType::Url,
        QrType::Text,
        QrType::Copy,
        QrType::Tel,
        QrType::Sms,
        QrType::Wifi,
        QrType::Vcard,
        QrType::Event,
        QrType::Geo,
        QrType::Crypto,
        QrType::Twqr,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            QrType::Url => "url",
            QrType::Text => "text",
            QrType::Copy => "copy",
            QrType::Tel => "tel",
            QrType::Sms => "sms",
            QrType::Wifi => "wifi",
            QrType::Vcard => "vcard",
            QrType::Event => "event",
            QrType::Geo => "geo",
            QrType::Crypto => "crypto",
            QrType::Twqr => "twqr",
        }
    }
}

impl fmt::Display for QrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WifiEncryption {
    #[default]
    #[serde(rename = "WPA")]
    Wpa,
    #[serde(rename = "WEP")]
    Wep,
    #[serde(rename = "nopass")]
    NoPass,
}

impl WifiEncryption {
    /// Token used in the `T:` field of a `WIFI:` payload.
    pub fn as_str(self) -> &'static str {
        match self {
            WifiEncryption::Wpa => "WPA",
            WifiEncryption::Wep => "WEP",
            WifiEncryption::NoPass => "nopass",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WifiData {
    pub ssid: String,
    pub password: String,
    pub encryption: WifiEncryption,
    pub hidden: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VCardData {
    pub first_name: String,
    pub last_name: String,
    pub org: String,
    pub title: String,
    pub email: String,
    pub phone: String,
    pub website: String,
    pub address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EventData {
    pub title: String,
    pub location: String,
    pub start_date: String,
    pub end_date: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GeoData {
    pub latitude: String,
    pub longitude: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CryptoCurrency {
    #[default]
    Bitcoin,
    Ethereum,
    Litecoin,
}

impl CryptoCurrency {
    /// URI scheme of the currency (`bitcoin:`, `ethereum:`, `litecoin:`).
    pub fn scheme(self) -> &'static str {
        match self {
            CryptoCurrency::Bitcoin => "bitcoin",
            CryptoCurrency::Ethereum => "ethereum",
            CryptoCurrency::Litecoin => "litecoin",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CryptoData {
    pub currency: CryptoCurrency,
    pub address: String,
    pub amount: String,
    pub label: String,
    pub message: String,
}

/// Taiwan interbank transfer details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TwqrData {
    pub bank_code: String,
    pub account: String,
    pub amount: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SmsData {
    pub phone: String,
    pub message: String,
}

/// Form input for one QR code, tagged by its type.
///
/// In JSON the tag lives in a `type` field; the bare-string variants carry
/// their text in `value`:
///
/// ```json
/// { "type": "wifi", "ssid": "home", "password": "hunter22", "encryption": "WPA" }
/// { "type": "url", "value": "https://example.com" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldData {
    Url { value: String },
    Text { value: String },
    Copy { value: String },
    Tel { value: String },
    Sms(SmsData),
    Wifi(WifiData),
    Vcard(VCardData),
    Event(EventData),
    Geo(GeoData),
    Crypto(CryptoData),
    Twqr(TwqrData),
}

impl FieldData {
    pub fn qr_type(&self) -> QrType {
        match self {
            FieldData::Url { .. } => QrType::Url,
            FieldData::Text { .. } => QrType::Text,
            FieldData::Copy { .. } => QrType::Copy,
            FieldData::Tel { .. } => QrType::Tel,
            FieldData::Sms(_) => QrType::Sms,
            FieldData::Wifi(_) => QrType::Wifi,
            FieldData::Vcard(_) => QrType::Vcard,
            FieldData::Event(_) => QrType::Event,
            FieldData::Geo(_) => QrType::Geo,
            FieldData::Crypto(_) => QrType::Crypto,
            FieldData::Twqr(_) => QrType::Twqr,
        }
    }
}

/// The exact string that ends up in the QR matrix, tagged with its producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalPayload {
    qr_type: QrType,
    data: String,
}

impl CanonicalPayload {
    pub(crate) fn new(qr_type: QrType, data: String) -> Self {
        Self { qr_type, data }
    }

    pub fn qr_type(&self) -> QrType {
        self.qr_type
    }

    pub fn as_str(&self) -> &str {
        &self.data
    }
}

impl fmt::Display for CanonicalPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.data)
    }
}

/// QR error-correction tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EcLevel {
    L,
    #[default]
    M,
    Q,
    H,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DotStyle {
    #[default]
    Square,
    Rounded,
    Dots,
    Classy,
    ClassyRounded,
    ExtraRounded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CornerSquareStyle {
    #[default]
    Square,
    Dot,
    ExtraRounded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CornerDotStyle {
    #[default]
    Square,
    Dot,
}

/// Visual options of a QR code. Colours are CSS-style strings, see [`crate::color`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StyleOptions {
    /// Requested display size. Previews ignore it; exports use their own size.
    pub size: u32,
    pub foreground: String,
    pub background: String,
    pub transparent_background: bool,
    /// QR version, `0` picks the smallest version that fits.
    pub version: u8,
    pub error_correction: EcLevel,
    /// Quiet zone in pixels around the matrix.
    pub margin: u32,
    pub dot_style: DotStyle,
    pub corner_square_style: CornerSquareStyle,
    pub corner_square_color: String,
    pub corner_dot_style: CornerDotStyle,
    pub corner_dot_color: String,
}

impl Default for StyleOptions {
    fn default() -> Self {
        Self {
            size: 300,
            foreground: "#000000".into(),
            background: "#ffffff".into(),
            transparent_background: false,
            version: 0,
            error_correction: EcLevel::M,
            margin: 10,
            dot_style: DotStyle::Square,
            corner_square_style: CornerSquareStyle::Square,
            corner_square_color: "#000000".into(),
            corner_dot_style: CornerDotStyle::Square,
            corner_dot_color: "#000000".into(),
        }
    }
}

impl StyleOptions {
    /// The colour behind the matrix, `transparent` when requested.
    pub fn effective_background(&self) -> &str {
        if self.transparent_background {
            "transparent"
        } else {
            &self.background
        }
    }

    /// Rejects versions above 40 and colours [`Color::parse`] cannot read.
    pub fn validate(&self) -> QrResult<()> {
        if self.version > 40 {
            return Err(QrError::InvalidOptions(format!(
                "QR version {} is out of range, expected 1-40 or 0 for auto",
                self.version
            )));
        }
        for color in [
            &self.foreground,
            &self.background,
            &self.corner_square_color,
            &self.corner_dot_color,
        ] {
            Color::parse(color)?;
        }
        Ok(())
    }
}

/// Where a logo image comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ImageRef {
    /// A `data:<mime>;base64,<payload>` URL.
    DataUrl(String),
    Path(PathBuf),
}

impl ImageRef {
    /// The first `max_chars` characters of the textual source, used as cache key.
    ///
    /// Data URLs of PNGs with the same dimensions and header chunks share a
    /// long prefix, so the prefix alone does not identify an image; the
    /// cache pairs it with [`ImageRef::source_len`].
    pub fn cache_prefix(&self, max_chars: usize) -> String {
        match self {
            ImageRef::DataUrl(url) => url.chars().take(max_chars).collect(),
            ImageRef::Path(path) => path.to_string_lossy().chars().take(max_chars).collect(),
        }
    }
}

impl ImageRef {
    /// Length in bytes of the textual source.
    pub fn source_len(&self) -> usize {
        match self {
            ImageRef::DataUrl(url) => url.len(),
            ImageRef::Path(path) => path.as_os_str().len(),
        }
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageRef::DataUrl(_) => f.write_str("<data url>"),
            ImageRef::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

pub const LOGO_SIZE_PERCENT_RANGE: std::ops::RangeInclusive<u32> = 35..=70;
pub const LOGO_MARGIN_RANGE: std::ops::RangeInclusive<u32> = 0..=8;

/// A logo placed in the middle of the code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoSpec {
    pub image: ImageRef,
    /// Logo edge as a percentage of the rendered code size.
    pub size_percent: u32,
    /// Border thickness in user units; `0` disables the border.
    pub margin_px: u32,
    /// Border colour. `None` follows the code background.
    #[serde(default)]
    pub border_color: Option<String>,
}

impl LogoSpec {
    pub fn new(image: ImageRef) -> Self {
        Self {
            image,
            size_percent: 40,
            margin_px: 0,
            border_color: None,
        }
    }

    pub fn with_size_percent(mut self, size_percent: u32) -> Self {
        self.size_percent = size_percent;
        self
    }

    pub fn with_margin(mut self, margin_px: u32) -> Self {
        self.margin_px = margin_px;
        self
    }

    pub fn with_border_color(mut self, color: impl Into<String>) -> Self {
        self.border_color = Some(color.into());
        self
    }

    pub fn validate(&self) -> QrResult<()> {
        if !LOGO_SIZE_PERCENT_RANGE.contains(&self.size_percent) {
            return Err(QrError::InvalidOptions(format!(
                "logo size {}% is out of range 35-70",
                self.size_percent
            )));
        }
        if !LOGO_MARGIN_RANGE.contains(&self.margin_px) {
            return Err(QrError::InvalidOptions(format!(
                "logo margin {} is out of range 0-8",
                self.margin_px
            )));
        }
        if let Some(color) = &self.border_color {
            Color::parse(color)?;
        }
        Ok(())
    }

    /// Border colour to composite with, falling back to the code background.
    pub fn resolve_border_color(&self, style: &StyleOptions) -> String {
        self.border_color
            .clone()
            .unwrap_or_else(|| style.effective_background().to_string())
    }
}

/// Everything needed to draw one QR code.
#[derive(Debug, Clone)]
pub struct QrRequest {
    pub payload: CanonicalPayload,
    pub style: StyleOptions,
    pub logo: Option<LogoSpec>,
}

impl QrRequest {
    pub fn new(payload: CanonicalPayload) -> Self {
        Self {
            payload,
            style: StyleOptions::default(),
            logo: None,
        }
    }

    pub fn with_style(mut self, style: StyleOptions) -> Self {
        self.style = style;
        self
    }

    pub fn with_logo(mut self, logo: LogoSpec) -> Self {
        self.logo = Some(logo);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Png,
    Jpeg,
    Webp,
    Svg,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 4] = [
        ExportFormat::Png,
        ExportFormat::Jpeg,
        ExportFormat::Webp,
        ExportFormat::Svg,
    ];

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Jpeg => "jpeg",
            ExportFormat::Webp => "webp",
            ExportFormat::Svg => "svg",
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            ExportFormat::Png => "image/png",
            ExportFormat::Jpeg => "image/jpeg",
            ExportFormat::Webp => "image/webp",
            ExportFormat::Svg => "image/svg+xml",
        }
    }
}

/// Pixel edge of an exported image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum ExportSize {
    Px256,
    Px512,
    Px1024,
    Px2048,
}

impl ExportSize {
    pub const ALL: [ExportSize; 4] = [
        ExportSize::Px256,
        ExportSize::Px512,
        ExportSize::Px1024,
        ExportSize::Px2048,
    ];

    pub fn pixels(self) -> u32 {
        match self {
            ExportSize::Px256 => 256,
            ExportSize::Px512 => 512,
            ExportSize::Px1024 => 1024,
            ExportSize::Px2048 => 2048,
        }
    }
}

impl TryFrom<u32> for ExportSize {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        ExportSize::ALL
            .into_iter()
            .find(|size| size.pixels() == value)
            .ok_or_else(|| format!("unsupported export size {value}, expected 256, 512, 1024 or 2048"))
    }
}

impl From<ExportSize> for u32 {
    fn from(size: ExportSize) -> Self {
        size.pixels()
    }
}

/// One download request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportJob {
    pub format: ExportFormat,
    pub size: ExportSize,
    /// Base name without extension; a dated default is generated when absent.
    pub filename: Option<String>,
}

/// Bytes produced by an export, ready to be written or served.
#[derive(Debug, Clone)]
pub struct ExportArtifact {
    /// File name including the format extension.
    pub filename: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}
