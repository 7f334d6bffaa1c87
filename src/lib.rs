//! # qrsmith
//!
//! A Rust library for building QR code payloads and rendering them as styled images.
//!
//! `qrsmith` turns structured field data (Wi-Fi credentials, contact cards, calendar events,
//! payment requests and more) into the canonical text a QR code should carry, checks that data
//! for errors and warnings first, and renders the result with custom dot shapes, colours and an
//! optional centre logo.
//!
//! ## Features
//!
//! - Encode `WIFI:`, vCard 3.0, iCalendar, `tel:`, `sms:`, `geo:`, crypto payment URIs and TWQR.
//! - Field-scoped validation with blocking errors and non-blocking warnings.
//! - Styled rendering: rounded, dotted and classy modules, custom corner markers, colours.
//! - Logo embedding with a border that follows the logo's own silhouette, cached per image.
//! - Superseding preview renders and independent PNG, JPEG, WebP or SVG exports.
//!
//! ## Example
//!
//! Encode contact data and export it as a PNG:
//!
//! ```rust,no_run
//! use qrsmith::{
//!     build_payload, ExportFormat, ExportJob, ExportPipeline, ExportSize, FieldData, QrConfig,
//!     QrContext, QrRequest, WifiData, WifiEncryption,
//! };
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = QrConfig::default();
//! let data = FieldData::Wifi(WifiData {
//!     ssid: "office".into(),
//!     password: "correct horse".into(),
//!     encryption: WifiEncryption::Wpa,
//!     hidden: false,
//! });
//! let payload = build_payload(&data, &config.calendar)?;
//!
//! let pipeline = ExportPipeline::new(QrContext::new(config));
//! let job = ExportJob { format: ExportFormat::Png, size: ExportSize::Px1024, filename: None };
//! let artifact = pipeline.download(&QrRequest::new(payload), &job).await?;
//! std::fs::write(&artifact.filename, &artifact.bytes)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`format`]: Payload encoders for every QR type.
//! - [`validate`]: Field validation.
//! - [`logo`]: Logo loading, border compositing and the compositing cache.
//! - [`layout`]: Module grid and shape layout.
//! - [`render`]: Raster and SVG output.
//! - [`renderer`]: Preview rendering with supersession.
//! - [`export`]: Export-resolution downloads.

pub mod banks;
pub mod color;
pub mod config;
pub mod context;
pub mod error;
pub mod export;
pub mod format;
pub mod layout;
pub mod logo;
pub mod render;
pub mod renderer;
pub mod rfc;
pub mod types;
pub mod validate;

pub use color::Color;
pub use config::{CalendarConfig, LogoConfig, QrConfig};
pub use context::QrContext;
pub use error::{ErrorCategory, QrError, QrResult};
pub use export::ExportPipeline;
pub use format::build_payload;
pub use renderer::{PreviewState, QrRenderer, RenderOutcome, RenderedPreview};
pub use types::*;
pub use validate::{validate, FieldIssue, ValidationResult};
