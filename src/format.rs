//! Canonical payload encoders, one per QR type.
//!
//! Encoders are pure: they never validate, never log and never touch I/O.
//! Use [`build_payload`] to run validation first.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rand::Rng;

use crate::config::CalendarConfig;
use crate::error::{QrError, QrResult};
use crate::rfc::{encode_component, escape_text, escape_wifi, join_content_lines};
use crate::types::{
    CanonicalPayload, CryptoData, EventData, FieldData, GeoData, QrType, SmsData, TwqrData,
    VCardData, WifiData,
};
use crate::validate::validate;

/// Length of the random part of an event UID.
const UID_SUFFIX_LEN: usize = 13;

/// Encodes Wi-Fi credentials as a `WIFI:` payload.
///
/// `\`, `;`, `:` and `,` in the SSID and password are backslash-escaped.
/// `H:` carries `true` for hidden networks and is left empty otherwise.
///
/// # Example
///
/// ```rust
/// use qrsmith::format::encode_wifi;
/// use qrsmith::{WifiData, WifiEncryption};
///
/// let data = WifiData {
///     ssid: "cafe;2".into(),
///     password: "hunter22".into(),
///     encryption: WifiEncryption::Wpa,
///     hidden: false,
/// };
/// assert_eq!(encode_wifi(&data), r"WIFI:T:WPA;S:cafe\;2;P:hunter22;H:;;");
/// ```
pub fn encode_wifi(data: &WifiData) -> String {
    format!(
        "WIFI:T:{};S:{};P:{};H:{};;",
        data.encryption.as_str(),
        escape_wifi(&data.ssid),
        escape_wifi(&data.password),
        if data.hidden { "true" } else { "" }
    )
}

/// Encodes a vCard 3.0 contact card.
pub fn encode_vcard(data: &VCardData) -> String {
    let first = escape_text(&data.first_name);
    let last = escape_text(&data.last_name);
    let full_name = [first.as_str(), last.as_str()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    let mut lines = vec![
        "BEGIN:VCARD".to_string(),
        "VERSION:3.0".to_string(),
        format!("N:{last};{first};;;"),
        format!("FN:{full_name}"),
    ];
    push_text_property(&mut lines, "ORG", &data.org);
    push_text_property(&mut lines, "TITLE", &data.title);
    push_text_property(&mut lines, "EMAIL", &data.email);
    push_text_property(&mut lines, "TEL", &data.phone);
    push_text_property(&mut lines, "URL", &data.website);
    if !data.address.is_empty() {
        lines.push(format!("ADR:;;{};;;;", escape_text(&data.address)));
    }
    lines.push("END:VCARD".to_string());

    join_content_lines(lines)
}

/// Encodes an iCalendar 2.0 event with a fresh UID and DTSTAMP.
pub fn encode_event(data: &EventData) -> QrResult<String> {
    encode_event_with(data, &CalendarConfig::default())
}

/// [`encode_event`] with an explicit PRODID and UID namespace.
pub fn encode_event_with(data: &EventData, calendar: &CalendarConfig) -> QrResult<String> {
    encode_event_at(data, calendar, Utc::now(), &random_uid_suffix())
}

/// Deterministic form of [`encode_event`]: the caller supplies the clock and
/// the random UID suffix.
pub fn encode_event_at(
    data: &EventData,
    calendar: &CalendarConfig,
    now: DateTime<Utc>,
    uid_suffix: &str,
) -> QrResult<String> {
    let mut lines = vec![
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        format!("PRODID:{}", calendar.prodid),
        "CALSCALE:GREGORIAN".to_string(),
        "METHOD:PUBLISH".to_string(),
        "BEGIN:VEVENT".to_string(),
        format!("UID:{}-{}@{}", now.timestamp_millis(), uid_suffix, calendar.uid_namespace),
        format!("DTSTAMP:{}", format_ical_utc(now)),
        format!("SUMMARY:{}", escape_text(&data.title)),
    ];
    push_text_property(&mut lines, "LOCATION", &data.location);
    if !data.start_date.is_empty() {
        lines.push(format!("DTSTART:{}", event_timestamp(&data.start_date, "start")?));
    }
    if !data.end_date.is_empty() {
        lines.push(format!("DTEND:{}", event_timestamp(&data.end_date, "end")?));
    }
    push_text_property(&mut lines, "DESCRIPTION", &data.description);
    lines.push("END:VEVENT".to_string());
    lines.push("END:VCALENDAR".to_string());

    Ok(join_content_lines(lines))
}

/// `tel:<phone>`, with the number passed through as typed.
pub fn encode_tel(phone: &str) -> String {
    format!("tel:{phone}")
}

/// `sms:<phone>`, plus `?body=` with the percent-encoded message when one is set.
pub fn encode_sms(data: &SmsData) -> String {
    if data.message.is_empty() {
        format!("sms:{}", data.phone)
    } else {
        format!("sms:{}?body={}", data.phone, encode_component(&data.message))
    }
}

/// `geo:<lat>,<lng>`, using the coordinates exactly as entered.
pub fn encode_geo(data: &GeoData) -> String {
    format!("geo:{},{}", data.latitude, data.longitude)
}

/// Encodes a BIP 21 style payment URI.
pub fn encode_crypto(data: &CryptoData) -> String {
    let mut uri = format!("{}:{}", data.currency.scheme(), data.address);

    let mut params = Vec::new();
    if !data.amount.is_empty() {
        params.push(format!("amount={}", data.amount));
    }
    if !data.label.is_empty() {
        params.push(format!("label={}", encode_component(&data.label)));
    }
    if !data.message.is_empty() {
        params.push(format!("message={}", encode_component(&data.message)));
    }

    if !params.is_empty() {
        uri.push('?');
        uri.push_str(&params.join("&"));
    }
    uri
}

/// Encodes a FISC interbank transfer (`TWQRP://NTTransfer`) payload.
///
/// D5 is the bank code, D6 the account left-padded to 16 digits, D10 the
/// currency (901 = TWD) and the optional D1 the amount in cents.
pub fn encode_twqr(data: &TwqrData) -> String {
    let account = format!("{:0>16}", data.account);
    let mut params = format!("D5={}&D6={}&D10=901", data.bank_code, account);

    if let Some(amount) = parse_number(&data.amount).filter(|amount| *amount > 0.0) {
        let cents = (amount * 100.0).round() as u64;
        params = format!("D1={cents}&{params}");
    }

    format!("TWQRP://NTTransfer/158/02/V1?{params}")
}

/// Text, URL and copy payloads are carried verbatim.
pub fn encode_text(text: &str) -> String {
    text.to_string()
}

pub fn encode_url(url: &str) -> String {
    url.to_string()
}

pub fn encode_copy(text: &str) -> String {
    text.to_string()
}

/// Encodes any field data without validating it.
pub fn encode(data: &FieldData) -> QrResult<CanonicalPayload> {
    encode_with(data, &CalendarConfig::default())
}

/// Like [`encode`], with the calendar settings used by event payloads.
///
/// # Errors
///
/// [`QrError::Encoding`] when an event date does not parse.
pub fn encode_with(data: &FieldData, calendar: &CalendarConfig) -> QrResult<CanonicalPayload> {
    let text = match data {
        FieldData::Url { value } => encode_url(value),
        FieldData::Text { value } => encode_text(value),
        FieldData::Copy { value } => encode_copy(value),
        FieldData::Tel { value } => encode_tel(value),
        FieldData::Sms(sms) => encode_sms(sms),
        FieldData::Wifi(wifi) => encode_wifi(wifi),
        FieldData::Vcard(card) => encode_vcard(card),
        FieldData::Event(event) => encode_event_with(event, calendar)?,
        FieldData::Geo(geo) => encode_geo(geo),
        FieldData::Crypto(crypto) => encode_crypto(crypto),
        FieldData::Twqr(twqr) => encode_twqr(twqr),
    };
    Ok(CanonicalPayload::new(data.qr_type(), text))
}

/// Validates, then encodes. Warnings are logged and never block.
///
/// # Errors
///
/// [`QrError::Validation`] when the data has blocking errors, or
/// [`QrError::Encoding`] if the encoder still rejects it.
pub fn build_payload(data: &FieldData, calendar: &CalendarConfig) -> QrResult<CanonicalPayload> {
    let result = validate(data);
    if !result.is_valid() {
        return Err(QrError::Validation(result));
    }
    for warning in &result.warnings {
        tracing::debug!(field = %warning.field, code = %warning.code, "validation warning");
    }
    encode_with(data, calendar)
}

fn push_text_property(lines: &mut Vec<String>, name: &str, value: &str) {
    if !value.is_empty() {
        lines.push(format!("{name}:{}", escape_text(value)));
    }
}

fn event_timestamp(input: &str, which: &str) -> QrResult<String> {
    parse_datetime(input)
        .map(format_ical_utc)
        .ok_or_else(|| QrError::Encoding {
            qr_type: QrType::Event,
            message: format!("invalid {which} date {input:?}"),
        })
}

/// UTC basic format, `YYYYMMDDTHHMMSSZ`.
pub fn format_ical_utc(dt: DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}

fn random_uid_suffix() -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    (0..UID_SUFFIX_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Parses the date formats a form may hand over.
///
/// Offsets and a trailing `Z` are honoured, a bare date is UTC midnight and
/// a date-time without offset is local time.
pub(crate) fn parse_datetime(input: &str) -> Option<DateTime<Utc>> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Some(naive) = s.strip_suffix(['Z', 'z']).and_then(parse_naive) {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| Utc.from_utc_datetime(&naive));
    }
    let naive = parse_naive(s)?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_naive(s: &str) -> Option<NaiveDateTime> {
    const FORMATS: [&str; 6] = [
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
    ];
    FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
}

/// Parses a decimal number, rejecting NaN and infinities.
pub(crate) fn parse_number(input: &str) -> Option<f64> {
    input
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}
