//! Preview rendering with supersession.
//!
//! Every call to [`QrRenderer::render`] starts a new generation and cancels
//! the one before it. A generation that finishes after it has been replaced
//! is reported as [`RenderOutcome::Superseded`] and never reaches the
//! renderer's [`PreviewState`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use image::RgbaImage;
use tokio_util::sync::CancellationToken;

use crate::context::QrContext;
use crate::error::{QrError, QrResult};
use crate::types::QrRequest;

/// A finished preview.
#[derive(Debug, Clone)]
pub struct RenderedPreview {
    pub generation: u64,
    pub data: String,
    pub image: RgbaImage,
}

#[derive(Debug, Clone)]
pub enum RenderOutcome {
    Rendered(Arc<RenderedPreview>),
    /// A newer render started before this one finished.
    Superseded,
}

impl RenderOutcome {
    pub fn is_superseded(&self) -> bool {
        matches!(self, RenderOutcome::Superseded)
    }
}

/// What a UI shows for the preview.
#[derive(Debug, Clone, Default)]
pub struct PreviewState {
    pub loading: bool,
    pub error: Option<String>,
    pub preview: Option<Arc<RenderedPreview>>,
}

/// The generation currently allowed to publish its result.
#[derive(Debug, Clone)]
pub struct RenderHandle {
    pub generation: u64,
    token: CancellationToken,
}

impl RenderHandle {
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

pub struct QrRenderer {
    ctx: Arc<QrContext>,
    generations: AtomicU64,
    current: Mutex<Option<RenderHandle>>,
    state: Mutex<PreviewState>,
}

impl QrRenderer {
    pub fn new(ctx: Arc<QrContext>) -> Self {
        Self {
            ctx,
            generations: AtomicU64::new(0),
            current: Mutex::new(None),
            state: Mutex::new(PreviewState::default()),
        }
    }

    /// Renders `request` at the preview size.
    ///
    /// Returns [`RenderOutcome::Superseded`] when a newer call replaced this
    /// one. Cancellation is never reported as an error.
    pub async fn render(&self, request: &QrRequest) -> QrResult<RenderOutcome> {
        let handle = self.begin();
        let result = self.run(request, &handle.token).await;
        self.finish(&handle, result)
    }

    /// Cancels the render in flight, if any.
    pub fn cancel(&self) {
        if let Some(handle) = lock(&self.current).take() {
            handle.token.cancel();
            lock(&self.state).loading = false;
            tracing::debug!(generation = handle.generation, "preview render cancelled");
        }
    }

    pub fn state(&self) -> PreviewState {
        lock(&self.state).clone()
    }

    /// Handle of the newest generation, finished or not.
    pub fn current(&self) -> Option<RenderHandle> {
        lock(&self.current).clone()
    }

    fn begin(&self) -> RenderHandle {
        let mut current = lock(&self.current);
        if let Some(previous) = current.take() {
            previous.token.cancel();
        }
        let handle = RenderHandle {
            generation: self.generations.fetch_add(1, Ordering::Relaxed) + 1,
            token: CancellationToken::new(),
        };
        *current = Some(handle.clone());

        let mut state = lock(&self.state);
        state.loading = true;
        state.error = None;
        tracing::debug!(generation = handle.generation, "preview render started");
        handle
    }

    async fn run(&self, request: &QrRequest, token: &CancellationToken) -> QrResult<(String, RgbaImage)> {
        let backend = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(QrError::Cancelled),
            backend = self.ctx.backend() => backend,
        };
        let render = self
            .ctx
            .prepare(request, self.ctx.config().preview_size, token)
            .await?;

        let task = tokio::task::spawn_blocking(move || {
            let image = backend.rasterize(&render)?;
            Ok((render.data, image))
        });
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(QrError::Cancelled),
            joined = task => joined.map_err(|err| QrError::Render(format!("render task failed: {err}")))?,
        }
    }

    fn finish(
        &self,
        handle: &RenderHandle,
        result: QrResult<(String, RgbaImage)>,
    ) -> QrResult<RenderOutcome> {
        let current = lock(&self.current);
        let is_current = current
            .as_ref()
            .is_some_and(|active| active.generation == handle.generation);
        if !is_current || handle.token.is_cancelled() {
            tracing::debug!(generation = handle.generation, "discarding superseded render");
            return Ok(RenderOutcome::Superseded);
        }

        let mut state = lock(&self.state);
        state.loading = false;
        match result {
            Ok((data, image)) => {
                let preview = Arc::new(RenderedPreview {
                    generation: handle.generation,
                    data,
                    image,
                });
                state.preview = Some(Arc::clone(&preview));
                Ok(RenderOutcome::Rendered(preview))
            }
            Err(QrError::Cancelled) => Ok(RenderOutcome::Superseded),
            Err(err) => {
                tracing::debug!(generation = handle.generation, error = %err, "preview render failed");
                state.error = Some(err.to_string());
                Err(err)
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QrConfig;
    use crate::logo::LogoLoader;
    use crate::render::StyledBackend;
    use crate::types::{CanonicalPayload, ImageRef, LogoSpec, QrType, StyleOptions};
    use async_trait::async_trait;
    use image::Rgba;
    use tokio::sync::Notify;

    /// Signals when a load starts, then waits for the gate.
    struct GatedLoader {
        entered: Arc<Notify>,
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl LogoLoader for GatedLoader {
        async fn load(&self, _image: &ImageRef) -> QrResult<RgbaImage> {
            self.entered.notify_one();
            self.gate.notified().await;
            Ok(RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 255])))
        }
    }

    fn payload(text: &str) -> QrRequest {
        QrRequest::new(CanonicalPayload::new(QrType::Text, text.into()))
    }

    #[tokio::test]
    async fn renders_at_preview_size() {
        let renderer = QrRenderer::new(QrContext::new(QrConfig::default()));
        let mut request = payload("hello");
        request.style.size = 1024;

        let outcome = renderer.render(&request).await.unwrap();
        let RenderOutcome::Rendered(preview) = outcome else {
            panic!("expected a preview");
        };
        assert_eq!(preview.image.dimensions(), (300, 300));
        assert_eq!(preview.generation, 1);
        assert_eq!(preview.data, "hello");

        let state = renderer.state();
        assert!(!state.loading);
        assert_eq!(state.preview.unwrap().generation, 1);
    }

    #[tokio::test]
    async fn newer_render_supersedes_older() {
        let entered = Arc::new(Notify::new());
        let gate = Arc::new(Notify::new());
        let ctx = QrContext::with_parts(
            QrConfig::default(),
            Arc::new(GatedLoader {
                entered: Arc::clone(&entered),
                gate: Arc::clone(&gate),
            }),
            || Arc::new(StyledBackend),
        );
        let renderer = Arc::new(QrRenderer::new(Arc::clone(&ctx)));

        let slow = {
            let renderer = Arc::clone(&renderer);
            tokio::spawn(async move {
                let logo = LogoSpec::new(ImageRef::Path("logo.png".into())).with_margin(3);
                renderer.render(&payload("first").with_logo(logo)).await
            })
        };
        entered.notified().await;

        let fast = renderer.render(&payload("second")).await.unwrap();
        assert!(!fast.is_superseded());
        gate.notify_waiters();

        let slow = slow.await.unwrap().unwrap();
        assert!(slow.is_superseded());
        assert_eq!(renderer.state().preview.unwrap().generation, 2);
        // the cancelled composite never reached the cache
        assert!(ctx.logo_cache().lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn render_errors_are_reported_and_kept() {
        let renderer = QrRenderer::new(QrContext::new(QrConfig::default()));
        let mut request = payload(&"x".repeat(500));
        request.style = StyleOptions {
            version: 1,
            ..StyleOptions::default()
        };

        let err = renderer.render(&request).await.unwrap_err();
        assert!(matches!(err, QrError::Render(_)));
        let state = renderer.state();
        assert!(state.error.is_some());
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn explicit_cancel_discards_result() {
        let renderer = Arc::new(QrRenderer::new(QrContext::new(QrConfig::default())));
        renderer.render(&payload("one")).await.unwrap();
        renderer.cancel();
        assert!(renderer.current().is_none());
        assert!(!renderer.state().loading);
        // the last finished preview stays visible
        assert!(renderer.state().preview.is_some());
    }
}
