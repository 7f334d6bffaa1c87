//! Session-wide state shared by previews and exports.

use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use crate::config::QrConfig;
use crate::error::{QrError, QrResult};
use crate::export::image_area_fraction;
use crate::logo::{FsLogoLoader, LogoCache, LogoCompositor, LogoLoader, SharedLogoCache};
use crate::render::{EmbeddedLogo, RenderBackend, RenderRequest, StyledBackend};
use crate::types::{LogoSpec, QrRequest, StyleOptions};

type BackendFactory = Box<dyn Fn() -> Arc<dyn RenderBackend> + Send + Sync>;

/// Owns the rendering backend and the logo cache for one session.
///
/// Build it once, wrap it in an [`Arc`], and hand it to every
/// [`crate::QrRenderer`] and [`crate::ExportPipeline`]. The backend is
/// created on first use.
pub struct QrContext {
    config: QrConfig,
    compositor: LogoCompositor,
    backend: OnceCell<Arc<dyn RenderBackend>>,
    backend_factory: BackendFactory,
}

impl QrContext {
    /// A context with the file-system logo loader and the styled backend.
    pub fn new(config: QrConfig) -> Arc<Self> {
        Self::with_parts(config, Arc::new(FsLogoLoader), || Arc::new(StyledBackend))
    }

    pub fn with_parts<F>(config: QrConfig, loader: Arc<dyn LogoLoader>, backend: F) -> Arc<Self>
    where
        F: Fn() -> Arc<dyn RenderBackend> + Send + Sync + 'static,
    {
        let cache: SharedLogoCache = Arc::new(Mutex::new(LogoCache::new(config.logo.cache_capacity)));
        let compositor = LogoCompositor::new(loader, cache, config.logo.clone());
        Arc::new(Self {
            config,
            compositor,
            backend: OnceCell::new(),
            backend_factory: Box::new(backend),
        })
    }

    pub fn config(&self) -> &QrConfig {
        &self.config
    }

    pub fn compositor(&self) -> &LogoCompositor {
        &self.compositor
    }

    pub fn logo_cache(&self) -> &SharedLogoCache {
        self.compositor.cache()
    }

    /// The rendering backend, initialised exactly once even under concurrent callers.
    pub async fn backend(&self) -> Arc<dyn RenderBackend> {
        let backend = self
            .backend
            .get_or_init(|| async {
                tracing::debug!("initialising render backend");
                (self.backend_factory)()
            })
            .await;
        Arc::clone(backend)
    }

    pub fn backend_ready(&self) -> bool {
        self.backend.initialized()
    }

    /// Resolves a [`QrRequest`] into a render request at `size` pixels.
    ///
    /// An empty payload renders the configured placeholder. The logo, if any,
    /// is bordered through the shared cache; when that fails for any reason
    /// other than cancellation the raw logo is used with its margin instead.
    pub async fn prepare(
        &self,
        request: &QrRequest,
        size: u32,
        cancel: &CancellationToken,
    ) -> QrResult<RenderRequest> {
        request.style.validate()?;
        let data = if request.payload.as_str().is_empty() {
            self.config.placeholder_data.clone()
        } else {
            request.payload.as_str().to_string()
        };

        let mut render = RenderRequest::new(data, size, request.style.clone());
        if let Some(spec) = &request.logo {
            spec.validate()?;
            render.logo = self.embed_logo(spec, &request.style, size, cancel).await?;
        }
        Ok(render)
    }

    async fn embed_logo(
        &self,
        spec: &LogoSpec,
        style: &StyleOptions,
        size: u32,
        cancel: &CancellationToken,
    ) -> QrResult<Option<EmbeddedLogo>> {
        let image_fraction = image_area_fraction(
            size,
            spec.size_percent,
            spec.margin_px,
            self.config.logo.max_image_fraction,
        );

        if spec.margin_px > 0 {
            let border_color = spec.resolve_border_color(style);
            match self
                .compositor
                .composite(&spec.image, spec.margin_px, &border_color, cancel)
                .await
            {
                Ok(logo) => {
                    return Ok(Some(EmbeddedLogo {
                        logo,
                        image_fraction,
                        margin: 0,
                    }))
                }
                Err(QrError::Cancelled) => return Err(QrError::Cancelled),
                Err(err) => {
                    tracing::warn!(logo = %spec.image, error = %err, "logo border failed, using the raw logo");
                }
            }
        }

        match self.compositor.load_plain(&spec.image, cancel).await {
            Ok(logo) => Ok(Some(EmbeddedLogo {
                logo,
                image_fraction,
                margin: spec.margin_px,
            })),
            Err(QrError::Cancelled) => Err(QrError::Cancelled),
            Err(err) => {
                tracing::warn!(logo = %spec.image, error = %err, "logo could not be loaded, rendering without it");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CanonicalPayload, ImageRef, QrType};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn backend_is_created_once() {
        let created = Arc::new(AtomicUsize::new(0));
        let ctx = {
            let created = Arc::clone(&created);
            QrContext::with_parts(QrConfig::default(), Arc::new(FsLogoLoader), move || {
                created.fetch_add(1, Ordering::SeqCst);
                Arc::new(StyledBackend)
            })
        };
        assert!(!ctx.backend_ready());
        let (a, b) = tokio::join!(ctx.backend(), ctx.backend());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert!(ctx.backend_ready());
    }

    #[tokio::test]
    async fn empty_payload_uses_placeholder() {
        let ctx = QrContext::new(QrConfig::default());
        let request = QrRequest::new(CanonicalPayload::new(QrType::Text, String::new()));
        let render = ctx.prepare(&request, 300, &CancellationToken::new()).await.unwrap();
        assert_eq!(render.data, "https://example.com");
        assert!(render.logo.is_none());
    }

    #[tokio::test]
    async fn unreadable_logo_is_dropped() {
        let ctx = QrContext::new(QrConfig::default());
        let logo = LogoSpec::new(ImageRef::Path("/nonexistent/logo.png".into())).with_margin(2);
        let request = QrRequest::new(CanonicalPayload::new(QrType::Url, "https://a.b".into())).with_logo(logo);
        let render = ctx.prepare(&request, 300, &CancellationToken::new()).await.unwrap();
        assert!(render.logo.is_none());
    }

    #[tokio::test]
    async fn oversized_border_falls_back_to_raw_logo() {
        use base64::Engine;

        let dot = image::RgbaImage::from_pixel(1, 1, image::Rgba([0, 0, 0, 255]));
        let png = crate::render::encode_png(&dot).unwrap();
        let url = format!("data:image/png;base64,{}", base64::engine::general_purpose::STANDARD.encode(png));

        let ctx = QrContext::new(QrConfig::default());
        let logo = LogoSpec::new(ImageRef::DataUrl(url)).with_margin(8);
        let request = QrRequest::new(CanonicalPayload::new(QrType::Url, "https://a.b".into())).with_logo(logo);
        let render = ctx.prepare(&request, 300, &CancellationToken::new()).await.unwrap();

        let embedded = render.logo.expect("raw logo is kept");
        assert_eq!(embedded.margin, 8);
        assert_eq!(embedded.logo.image.dimensions(), (1, 1));
        assert!(ctx.logo_cache().lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn out_of_range_logo_is_rejected() {
        let ctx = QrContext::new(QrConfig::default());
        let logo = LogoSpec::new(ImageRef::Path("logo.png".into())).with_size_percent(90);
        let request = QrRequest::new(CanonicalPayload::new(QrType::Url, "https://a.b".into())).with_logo(logo);
        let err = ctx.prepare(&request, 300, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, QrError::InvalidOptions(_)));
    }
}
