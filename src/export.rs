//! Downloads at export resolution, independent of any preview.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tokio_util::sync::CancellationToken;

use crate::context::QrContext;
use crate::error::{QrError, QrResult};
use crate::render::encode_image;
use crate::types::{ExportArtifact, ExportFormat, ExportJob, QrRequest, QrType};

/// Share of the code a logo may cover, so that a logo of `size_percent`
/// plus its margin on both sides keeps its intended size.
///
/// ```rust
/// use qrsmith::export::image_area_fraction;
///
/// let fraction = image_area_fraction(2048, 40, 4, 0.85);
/// assert!((fraction - 0.40390625).abs() < 1e-12);
/// ```
pub fn image_area_fraction(size_px: u32, size_percent: u32, margin_px: u32, max_fraction: f64) -> f64 {
    let size = f64::from(size_px);
    let desired = size * f64::from(size_percent) / 100.0;
    ((desired + 2.0 * f64::from(margin_px)) / size).min(max_fraction)
}

/// `qr-<type>-<YYYY-MM-DD>`, without extension.
pub fn default_filename(qr_type: QrType, date: NaiveDate) -> String {
    format!("qr-{}-{}", qr_type, date.format("%Y-%m-%d"))
}

/// Renders export artifacts through a shared [`QrContext`].
#[derive(Clone)]
pub struct ExportPipeline {
    ctx: Arc<QrContext>,
}

impl ExportPipeline {
    pub fn new(ctx: Arc<QrContext>) -> Self {
        Self { ctx }
    }

    pub async fn download(&self, request: &QrRequest, job: &ExportJob) -> QrResult<ExportArtifact> {
        self.download_with_cancel(request, job, &CancellationToken::new()).await
    }

    /// Like [`download`](Self::download) but abortable through `cancel`.
    pub async fn download_with_cancel(
        &self,
        request: &QrRequest,
        job: &ExportJob,
        cancel: &CancellationToken,
    ) -> QrResult<ExportArtifact> {
        let size = job.size.pixels();
        let backend = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(QrError::Cancelled),
            backend = self.ctx.backend() => backend,
        };
        let render = self.ctx.prepare(request, size, cancel).await?;

        let format = job.format;
        let task = tokio::task::spawn_blocking(move || match format {
            ExportFormat::Svg => backend.svg(&render).map(String::into_bytes),
            raster => encode_image(&backend.rasterize(&render)?, raster),
        });
        let bytes = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(QrError::Cancelled),
            joined = task => joined.map_err(|err| QrError::Render(format!("export task failed: {err}")))??,
        };

        let base = job
            .filename
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| default_filename(request.payload.qr_type(), Utc::now().date_naive()));
        let filename = format!("{base}.{}", format.extension());

        tracing::debug!(%filename, size, bytes = bytes.len(), "export rendered");
        Ok(ExportArtifact {
            filename,
            mime: format.mime(),
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QrConfig;
    use crate::types::{CanonicalPayload, ExportSize, ImageRef, LogoSpec};
    use base64::Engine;
    use image::{Rgba, RgbaImage};

    fn request() -> QrRequest {
        QrRequest::new(CanonicalPayload::new(QrType::Wifi, "WIFI:T:WPA;S:home;P:hunter22;;".into()))
    }

    fn logo_data_url() -> String {
        let img = RgbaImage::from_pixel(8, 8, Rgba([0, 128, 255, 255]));
        let png = crate::render::encode_png(&img).unwrap();
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(png)
        )
    }

    #[test]
    fn fraction_for_large_export() {
        let fraction = image_area_fraction(2048, 40, 4, 0.85);
        assert!((fraction - 0.40390625).abs() < 1e-12);
    }

    #[test]
    fn fraction_is_capped() {
        assert!((image_area_fraction(256, 70, 8, 0.85) - 0.7625).abs() < 1e-12);
        assert_eq!(image_area_fraction(256, 70, 8, 0.5), 0.5);
        assert!((image_area_fraction(300, 40, 0, 0.85) - 0.4).abs() < 1e-12);
    }

    #[test]
    fn filename_includes_type_and_date() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(default_filename(QrType::Vcard, date), "qr-vcard-2024-03-09");
    }

    #[tokio::test]
    async fn png_export_at_requested_size() {
        let pipeline = ExportPipeline::new(QrContext::new(QrConfig::default()));
        let job = ExportJob {
            format: ExportFormat::Png,
            size: ExportSize::Px512,
            filename: Some("office-wifi".into()),
        };
        let artifact = pipeline.download(&request(), &job).await.unwrap();
        assert_eq!(artifact.filename, "office-wifi.png");
        assert_eq!(artifact.mime, "image/png");

        let decoded = image::load_from_memory(&artifact.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (512, 512));
    }

    #[tokio::test]
    async fn every_format_gets_its_extension_and_mime() {
        let pipeline = ExportPipeline::new(QrContext::new(QrConfig::default()));
        for format in ExportFormat::ALL {
            let job = ExportJob {
                format,
                size: ExportSize::Px256,
                filename: Some("  lobby  ".into()),
            };
            let artifact = pipeline.download(&request(), &job).await.unwrap();
            assert_eq!(artifact.filename, format!("lobby.{}", format.extension()));
            assert_eq!(artifact.mime, format.mime());
            if format != ExportFormat::Svg {
                let decoded = image::load_from_memory(&artifact.bytes).unwrap();
                assert_eq!(decoded.width(), 256);
            }
        }
    }

    #[tokio::test]
    async fn svg_export_with_bordered_logo_fills_cache() {
        let mut config = QrConfig::default();
        config.logo.processing_floor = 64;
        let ctx = QrContext::new(config);
        let pipeline = ExportPipeline::new(Arc::clone(&ctx));
        let logo = LogoSpec::new(ImageRef::DataUrl(logo_data_url())).with_margin(2);
        let mut req = request().with_logo(logo);
        req.style.error_correction = crate::types::EcLevel::H;
        let job = ExportJob {
            format: ExportFormat::Svg,
            size: ExportSize::Px1024,
            filename: None,
        };

        let artifact = pipeline.download(&req, &job).await.unwrap();
        assert!(artifact.filename.starts_with("qr-wifi-"));
        assert!(artifact.filename.ends_with(".svg"));
        let svg = String::from_utf8(artifact.bytes).unwrap();
        assert!(svg.contains("<image"));
        assert_eq!(ctx.logo_cache().lock().unwrap().len(), 1);

        // a second export reuses the composited logo
        pipeline.download(&req, &job).await.unwrap();
        assert_eq!(ctx.compositor().decode_count(), 1);
    }

    struct BrokenBackend;

    impl crate::render::RenderBackend for BrokenBackend {
        fn rasterize(&self, _request: &crate::render::RenderRequest) -> QrResult<RgbaImage> {
            Err(QrError::Render("data too long".into()))
        }

        fn svg(&self, _request: &crate::render::RenderRequest) -> QrResult<String> {
            Err(QrError::Render("data too long".into()))
        }
    }

    #[tokio::test]
    async fn backend_failures_surface_as_render_errors() {
        let ctx = QrContext::with_parts(QrConfig::default(), Arc::new(crate::logo::FsLogoLoader), || {
            Arc::new(BrokenBackend)
        });
        let job = ExportJob {
            format: ExportFormat::Webp,
            size: ExportSize::Px256,
            filename: None,
        };
        let err = ExportPipeline::new(ctx).download(&request(), &job).await.unwrap_err();
        assert!(matches!(err, QrError::Render(_)));
    }

    #[tokio::test]
    async fn cancelled_export_returns_cancelled() {
        let pipeline = ExportPipeline::new(QrContext::new(QrConfig::default()));
        let token = CancellationToken::new();
        token.cancel();
        let job = ExportJob {
            format: ExportFormat::Jpeg,
            size: ExportSize::Px256,
            filename: None,
        };
        let err = pipeline.download_with_cancel(&request(), &job, &token).await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
