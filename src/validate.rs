//! Per-type validation of form input.
//!
//! Validators never fail: they return a [`ValidationResult`] holding blocking
//! errors and advisory warnings, each tagged with the offending field and a
//! stable code a UI layer can translate.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::ser::{Serialize, SerializeStruct, Serializer};

use crate::banks::bank_by_code;
use crate::format::{parse_datetime, parse_number};
use crate::types::{
    CryptoCurrency, CryptoData, EventData, FieldData, GeoData, SmsData, TwqrData, VCardData,
    WifiData, WifiEncryption,
};

/// Byte-mode capacity of a version 40 code at the lowest error correction.
pub const MAX_TEXT_CHARS: usize = 2953;
pub const LONG_TEXT_CHARS: usize = 1000;
pub const MAX_SSID_CHARS: usize = 32;
pub const MAX_SMS_CHARS: usize = 160;
pub const LONG_DESCRIPTION_CHARS: usize = 500;
pub const MAX_TWQR_ACCOUNT_DIGITS: usize = 16;
pub const MAX_TWQR_AMOUNT: f64 = 999_999_999.99;

const WEP_KEY_LENGTHS: [usize; 4] = [5, 10, 13, 26];

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles"));
static PHONE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9\s+\-().]+$").expect("phone pattern compiles"));
static BITCOIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(1|3|bc1)[a-zA-HJ-NP-Z0-9]{25,62}$").expect("bitcoin pattern compiles")
});
static ETHEREUM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^0x[a-fA-F0-9]{40}$").expect("ethereum pattern compiles"));
static LITECOIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(L|M|ltc1)[a-zA-HJ-NP-Z0-9]{25,62}$").expect("litecoin pattern compiles")
});
static URL_SCHEME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z][A-Za-z0-9+.\-]*):").expect("scheme pattern compiles"));

/// One problem with one field.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FieldIssue {
    pub field: String,
    pub code: String,
    pub message: String,
}

impl FieldIssue {
    pub fn new(field: &str, code: &str, message: &str) -> Self {
        Self {
            field: field.to_string(),
            code: code.to_string(),
            message: message.to_string(),
        }
    }
}

/// Outcome of validating one set of field data.
///
/// Validity is derived from the error list, so a result can never claim to
/// be valid while holding errors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    pub errors: Vec<FieldIssue>,
    pub warnings: Vec<FieldIssue>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn push_error(&mut self, issue: FieldIssue) {
        self.errors.push(issue);
    }

    pub fn push_warning(&mut self, issue: FieldIssue) {
        self.warnings.push(issue);
    }

    fn error(&mut self, field: &str, code: &str, message: &str) {
        self.push_error(FieldIssue::new(field, code, message));
    }

    fn warning(&mut self, field: &str, code: &str, message: &str) {
        self.push_warning(FieldIssue::new(field, code, message));
    }

    pub fn has_error(&self, code: &str) -> bool {
        self.errors.iter().any(|issue| issue.code == code)
    }

    pub fn has_warning(&self, code: &str) -> bool {
        self.warnings.iter().any(|issue| issue.code == code)
    }

    pub fn first_error_for(&self, field: &str) -> Option<&FieldIssue> {
        self.errors.iter().find(|issue| issue.field == field)
    }

    /// Errors first, then warnings, for one field.
    pub fn issues_for<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a FieldIssue> + 'a {
        self.errors
            .iter()
            .chain(self.warnings.iter())
            .filter(move |issue| issue.field == field)
    }

    /// Error messages joined for display.
    pub fn summary(&self) -> String {
        self.errors
            .iter()
            .map(|issue| format!("{} ({})", issue.message, issue.code))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl Serialize for ValidationResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ValidationResult", 3)?;
        state.serialize_field("isValid", &self.is_valid())?;
        state.serialize_field("errors", &self.errors)?;
        state.serialize_field("warnings", &self.warnings)?;
        state.end()
    }
}

/// Runs the validator for the type of `data`.
///
/// # Example
///
/// ```rust
/// use qrsmith::{validate, FieldData, GeoData};
///
/// let result = validate(&FieldData::Geo(GeoData {
///     latitude: "91".into(),
///     longitude: "121.5".into(),
/// }));
/// assert!(!result.is_valid());
/// assert!(result.has_error("GEO_LATITUDE_RANGE"));
/// ```
pub fn validate(data: &FieldData) -> ValidationResult {
    match data {
        FieldData::Url { value } => validate_url(value),
        FieldData::Text { value } | FieldData::Copy { value } => validate_text(value),
        FieldData::Tel { value } => validate_tel(value),
        FieldData::Sms(sms) => validate_sms(sms),
        FieldData::Wifi(wifi) => validate_wifi(wifi),
        FieldData::Vcard(card) => validate_vcard(card),
        FieldData::Event(event) => validate_event(event),
        FieldData::Geo(geo) => validate_geo(geo),
        FieldData::Crypto(crypto) => validate_crypto(crypto),
        FieldData::Twqr(twqr) => validate_twqr(twqr),
    }
}

/// SSID is required. WPA passwords must be 8 to 63 characters.
///
/// An SSID over 32 characters and a WEP key of unusual length are warnings only.
pub fn validate_wifi(data: &WifiData) -> ValidationResult {
    let mut result = ValidationResult::default();

    if is_blank(&data.ssid) {
        result.error("ssid", "WIFI_SSID_REQUIRED", "SSID is required");
    } else if char_len(&data.ssid) > MAX_SSID_CHARS {
        result.warning(
            "ssid",
            "WIFI_SSID_TOO_LONG",
            "SSID exceeds 32 characters, may cause issues on some devices",
        );
    }

    let password_len = char_len(&data.password);
    match data.encryption {
        WifiEncryption::Wpa if password_len < 8 => result.error(
            "password",
            "WIFI_WPA_PASSWORD_TOO_SHORT",
            "WPA password must be at least 8 characters",
        ),
        WifiEncryption::Wpa if password_len > 63 => result.error(
            "password",
            "WIFI_WPA_PASSWORD_TOO_LONG",
            "WPA password must not exceed 63 characters",
        ),
        WifiEncryption::Wep if !WEP_KEY_LENGTHS.contains(&password_len) => result.warning(
            "password",
            "WIFI_WEP_PASSWORD_LENGTH",
            "WEP key should be 5, 10, 13, or 26 characters",
        ),
        _ => {}
    }

    result
}

/// Needs a first or last name. A malformed email or website is an error;
/// an odd-looking phone number only warns.
pub fn validate_vcard(data: &VCardData) -> ValidationResult {
    let mut result = ValidationResult::default();

    if is_blank(&data.first_name) && is_blank(&data.last_name) {
        result.error(
            "firstName",
            "VCARD_NAME_REQUIRED",
            "At least first name or last name is required",
        );
    }
    if !data.email.is_empty() && !EMAIL.is_match(&data.email) {
        result.error("email", "VCARD_EMAIL_INVALID", "Invalid email format");
    }
    if !data.phone.is_empty() && !PHONE.is_match(&data.phone) {
        result.warning("phone", "VCARD_PHONE_UNUSUAL", "Phone number contains unusual characters");
    }
    if !data.website.is_empty() && !is_valid_url(&data.website) {
        result.error("website", "VCARD_WEBSITE_INVALID", "Invalid website URL");
    }

    result
}

/// Title and start date are required. Each non-empty date must parse, and
/// the end may not precede the start. A long description only warns.
pub fn validate_event(data: &EventData) -> ValidationResult {
    let mut result = ValidationResult::default();

    if is_blank(&data.title) {
        result.error("title", "EVENT_TITLE_REQUIRED", "Event title is required");
    }
    if data.start_date.is_empty() {
        result.error("startDate", "EVENT_START_REQUIRED", "Start date is required");
    }

    let start = parse_present_date(&data.start_date);
    let end = parse_present_date(&data.end_date);
    if start == Some(None) {
        result.error("startDate", "EVENT_START_INVALID", "Invalid start date format");
    }
    if end == Some(None) {
        result.error("endDate", "EVENT_END_INVALID", "Invalid end date format");
    }
    if let (Some(Some(start)), Some(Some(end))) = (start, end) {
        if end < start {
            result.error("endDate", "EVENT_END_BEFORE_START", "End date must be after start date");
        }
    }

    if char_len(&data.description) > LONG_DESCRIPTION_CHARS {
        result.warning(
            "description",
            "EVENT_DESCRIPTION_LONG",
            "Long description may result in a dense QR code",
        );
    }

    result
}

/// `None` for an empty field, `Some(None)` for one that does not parse.
fn parse_present_date(raw: &str) -> Option<Option<DateTime<Utc>>> {
    (!raw.is_empty()).then(|| parse_datetime(raw))
}

/// Both coordinates are required numbers, latitude within ±90 and longitude within ±180.
pub fn validate_geo(data: &GeoData) -> ValidationResult {
    let mut result = ValidationResult::default();
    check_coordinate(&mut result, &data.latitude, "latitude", "LATITUDE", 90.0);
    check_coordinate(&mut result, &data.longitude, "longitude", "LONGITUDE", 180.0);
    result
}

fn check_coordinate(result: &mut ValidationResult, raw: &str, field: &str, code: &str, limit: f64) {
    let label = capitalize(field);
    if is_blank(raw) {
        result.error(field, &format!("GEO_{code}_REQUIRED"), &format!("{label} is required"));
        return;
    }
    match parse_number(raw) {
        None => result.error(field, &format!("GEO_{code}_INVALID"), &format!("{label} must be a number")),
        Some(value) if !(-limit..=limit).contains(&value) => result.error(
            field,
            &format!("GEO_{code}_RANGE"),
            &format!("{label} must be between -{limit} and {limit}"),
        ),
        Some(_) => {}
    }
}

/// An address that does not match its currency's pattern only warns.
pub fn validate_crypto(data: &CryptoData) -> ValidationResult {
    let mut result = ValidationResult::default();

    if is_blank(&data.address) {
        result.error("address", "CRYPTO_ADDRESS_REQUIRED", "Wallet address is required");
    } else {
        let (pattern, code, message) = match data.currency {
            CryptoCurrency::Bitcoin => (
                &*BITCOIN,
                "CRYPTO_BTC_ADDRESS_FORMAT",
                "Bitcoin address format may be invalid",
            ),
            CryptoCurrency::Ethereum => (
                &*ETHEREUM,
                "CRYPTO_ETH_ADDRESS_FORMAT",
                "Ethereum address format may be invalid",
            ),
            CryptoCurrency::Litecoin => (
                &*LITECOIN,
                "CRYPTO_LTC_ADDRESS_FORMAT",
                "Litecoin address format may be invalid",
            ),
        };
        if !pattern.is_match(&data.address) {
            result.warning("address", code, message);
        }
    }

    if !data.amount.is_empty() && !parse_number(&data.amount).is_some_and(|amount| amount >= 0.0) {
        result.error("amount", "CRYPTO_AMOUNT_INVALID", "Amount must be a positive number");
    }

    result
}

/// Checks bank code, account and amount for a TWQR transfer.
///
/// A well-formed bank code missing from [`crate::banks::TAIWAN_BANKS`]
/// warns with `TWQR_BANK_CODE_UNKNOWN`.
pub fn validate_twqr(data: &TwqrData) -> ValidationResult {
    let mut result = ValidationResult::default();

    if is_blank(&data.bank_code) {
        result.error("bankCode", "TWQR_BANK_CODE_REQUIRED", "Bank code is required");
    } else if data.bank_code.len() != 3 || !is_ascii_digits(&data.bank_code) {
        result.error("bankCode", "TWQR_BANK_CODE_FORMAT", "Bank code must be 3 digits");
    } else if bank_by_code(&data.bank_code).is_none() {
        result.warning("bankCode", "TWQR_BANK_CODE_UNKNOWN", "Bank code is not in the bank directory");
    }

    if is_blank(&data.account) {
        result.error("account", "TWQR_ACCOUNT_REQUIRED", "Account number is required");
    } else if !is_ascii_digits(&data.account) {
        result.error(
            "account",
            "TWQR_ACCOUNT_DIGITS_ONLY",
            "Account number must contain only digits",
        );
    } else if data.account.len() > MAX_TWQR_ACCOUNT_DIGITS {
        result.error(
            "account",
            "TWQR_ACCOUNT_TOO_LONG",
            "Account number must not exceed 16 digits",
        );
    }

    if !data.amount.is_empty() {
        match parse_number(&data.amount) {
            Some(amount) if amount < 0.0 => {
                result.error("amount", "TWQR_AMOUNT_INVALID", "Amount must be a positive number")
            }
            None => result.error("amount", "TWQR_AMOUNT_INVALID", "Amount must be a positive number"),
            Some(amount) if amount > MAX_TWQR_AMOUNT => result.error(
                "amount",
                "TWQR_AMOUNT_TOO_LARGE",
                "Amount exceeds maximum allowed value",
            ),
            Some(_) => {}
        }
    }

    result
}

pub fn validate_sms(data: &SmsData) -> ValidationResult {
    let mut result = ValidationResult::default();

    if is_blank(&data.phone) {
        result.error("phone", "SMS_PHONE_REQUIRED", "Phone number is required");
    } else if !PHONE.is_match(&data.phone) {
        result.warning("phone", "SMS_PHONE_UNUSUAL", "Phone number contains unusual characters");
    }
    if char_len(&data.message) > MAX_SMS_CHARS {
        result.warning(
            "message",
            "SMS_MESSAGE_LONG",
            "Message exceeds SMS limit (160 chars), may be split",
        );
    }

    result
}

pub fn validate_tel(phone: &str) -> ValidationResult {
    let mut result = ValidationResult::default();

    if is_blank(phone) {
        result.error("phone", "TEL_PHONE_REQUIRED", "Phone number is required");
    } else if !PHONE.is_match(phone) {
        result.warning("phone", "TEL_PHONE_UNUSUAL", "Phone number contains unusual characters");
    }

    result
}

/// See [`is_valid_url`] for what counts as a URL.
pub fn validate_url(url: &str) -> ValidationResult {
    let mut result = ValidationResult::default();

    if is_blank(url) {
        result.error("url", "URL_REQUIRED", "URL is required");
    } else if !is_valid_url(url) {
        result.error("url", "URL_INVALID", "Invalid URL format");
    }

    result
}

/// Validates free text. Also used for the copy type.
pub fn validate_text(text: &str) -> ValidationResult {
    let mut result = ValidationResult::default();

    if is_blank(text) {
        result.error("text", "TEXT_REQUIRED", "Text content is required");
    } else {
        let len = char_len(text);
        if len > MAX_TEXT_CHARS {
            result.error("text", "TEXT_TOO_LONG", "Text exceeds QR code capacity");
        } else if len > LONG_TEXT_CHARS {
            result.warning("text", "TEXT_LONG", "Long text may result in a dense QR code");
        }
    }

    result
}

/// Accepts http(s) URLs, and scheme-less input that becomes one once
/// `https://` is prefixed (`example.com/page`, `//cdn.example.com`).
/// Input with any other scheme is rejected.
pub fn is_valid_url(input: &str) -> bool {
    let s = input.trim();
    match URL_SCHEME.captures(s) {
        Some(caps) => {
            let scheme = caps[1].to_ascii_lowercase();
            (scheme == "http" || scheme == "https") && has_valid_authority(&s[caps[0].len()..])
        }
        None => has_valid_authority(s),
    }
}

fn has_valid_authority(rest: &str) -> bool {
    let rest = rest.trim_start_matches(['/', '\\']);
    let authority = rest.split(['/', '?', '#', '\\']).next().unwrap_or_default();
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, host)| host);

    let (host, port) = if host_port.starts_with('[') {
        match host_port.find(']') {
            Some(end) => (&host_port[..=end], host_port[end + 1..].strip_prefix(':')),
            None => return false,
        }
    } else {
        match host_port.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (host_port, None),
        }
    };

    if let Some(port) = port {
        if !port.is_empty() && !port.parse::<u16>().is_ok_and(|_| is_ascii_digits(port)) {
            return false;
        }
    }
    is_valid_host(host)
}

fn is_valid_host(host: &str) -> bool {
    if let Some(inner) = host.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
        return !inner.is_empty() && inner.chars().all(|c| c.is_ascii_hexdigit() || c == ':' || c == '.');
    }
    !host.is_empty()
        && !host.chars().any(|c| {
            c.is_control()
                || matches!(
                    c,
                    ' ' | '#' | '%' | '/' | ':' | '<' | '>' | '?' | '@' | '[' | '\\' | ']' | '^' | '|'
                )
        })
}

fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn is_ascii_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
