//! Runtime configuration.
//!
//! [`QrConfig`] is loaded once and handed to [`crate::QrContext`]. Every field
//! has a built-in default, so an empty configuration is valid.
//!
//! # Resolution order (highest priority first)
//!
//! 1. Environment variables, `QRSMITH__<SECTION>__<KEY>` (e.g. `QRSMITH__LOGO__CACHE_CAPACITY=50`)
//! 2. Config file (TOML, JSON or YAML, picked by extension)
//! 3. Built-in defaults

use std::path::Path;

use config::{Config as RawConfig, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::{QrError, QrResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QrConfig {
    /// Edge of the on-screen preview in pixels.
    pub preview_size: u32,
    /// Rendered when the payload is empty, so a preview is always drawable.
    pub placeholder_data: String,
    pub logo: LogoConfig,
    pub calendar: CalendarConfig,
}

/// Logo compositing knobs.
///
/// `border_multiplier` and `processing_floor` are empirical: they reproduce
/// the border thickness users expect at typical logo sizes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogoConfig {
    /// Pixels of border per border unit, before processing scale.
    pub border_multiplier: f64,
    /// Minimum edge, in pixels, the larger logo side is upscaled to before compositing.
    pub processing_floor: u32,
    pub cache_capacity: usize,
    /// Characters of the image source that take part in the cache key.
    pub cache_key_prefix: usize,
    /// Ceiling of the fraction of the code a logo may cover.
    pub max_image_fraction: f64,
    pub default_size_percent: u32,
    /// Longest side, in pixels, a bordered logo surface may have.
    pub max_surface_side: u32,
    /// Largest pixel area a bordered logo surface may have.
    pub max_surface_pixels: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    /// Domain part of generated event UIDs.
    pub uid_namespace: String,
    pub prodid: String,
}

impl Default for QrConfig {
    fn default() -> Self {
        Self {
            preview_size: 300,
            placeholder_data: "https://example.com".into(),
            logo: LogoConfig::default(),
            calendar: CalendarConfig::default(),
        }
    }
}

impl Default for LogoConfig {
    fn default() -> Self {
        Self {
            border_multiplier: 6.0,
            processing_floor: 1024,
            cache_capacity: 20,
            cache_key_prefix: 100,
            max_image_fraction: 0.85,
            default_size_percent: 40,
            max_surface_side: 16_384,
            max_surface_pixels: 268_435_456,
        }
    }
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            uid_namespace: "devtools-qr".into(),
            prodid: "-//DevTools//QR Generator//EN".into(),
        }
    }
}

impl QrConfig {
    /// Loads configuration from an optional file and the environment.
    ///
    /// # Errors
    ///
    /// Returns [`QrError::Config`] if a source cannot be read or parsed, or if
    /// the merged values are out of range.
    pub fn load(config_file: Option<&Path>) -> QrResult<Self> {
        let mut builder = RawConfig::builder();
        if let Some(path) = config_file {
            builder = builder.add_source(File::from(path));
        }
        builder = builder.add_source(
            Environment::with_prefix("QRSMITH")
                .separator("__")
                .try_parsing(true),
        );

        let config: QrConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        tracing::debug!(?config, "configuration loaded");
        Ok(config)
    }

    pub fn validate(&self) -> QrResult<()> {
        if self.preview_size == 0 {
            return Err(QrError::Config("preview_size must be positive".into()));
        }
        if self.logo.cache_capacity == 0 {
            return Err(QrError::Config("logo.cache_capacity must be positive".into()));
        }
        if !(self.logo.border_multiplier.is_finite() && self.logo.border_multiplier >= 0.0) {
            return Err(QrError::Config("logo.border_multiplier must be a non-negative number".into()));
        }
        if self.logo.processing_floor == 0 {
            return Err(QrError::Config("logo.processing_floor must be positive".into()));
        }
        if self.logo.max_surface_side == 0 || self.logo.max_surface_pixels == 0 {
            return Err(QrError::Config("logo surface limits must be positive".into()));
        }
        if !(self.logo.max_image_fraction > 0.0 && self.logo.max_image_fraction <= 1.0) {
            return Err(QrError::Config("logo.max_image_fraction must be in (0, 1]".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_constants() {
        let cfg = QrConfig::default();
        assert_eq!(cfg.preview_size, 300);
        assert_eq!(cfg.logo.border_multiplier, 6.0);
        assert_eq!(cfg.logo.processing_floor, 1024);
        assert_eq!(cfg.logo.cache_capacity, 20);
        assert_eq!(cfg.logo.max_surface_side, 16_384);
        assert_eq!(cfg.calendar.uid_namespace, "devtools-qr");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "preview_size = 512\n[logo]\nborder_multiplier = 4.5").unwrap();

        let cfg = QrConfig::load(Some(file.path())).unwrap();
        assert_eq!(cfg.preview_size, 512);
        assert_eq!(cfg.logo.border_multiplier, 4.5);
        // untouched keys keep their defaults
        assert_eq!(cfg.logo.cache_capacity, 20);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[logo]\ncache_capacity = 0").unwrap();

        let err = QrConfig::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, QrError::Config(_)));
    }
}
