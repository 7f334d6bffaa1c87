//! Logo loading, shape-preserving borders, and the processed-logo cache.
//!
//! A bordered logo is built the way a 2D canvas would do it: the source is
//! stretched over the whole bordered surface to form an enlarged silhouette,
//! that silhouette is filled with the border colour (`source-in`), and the
//! untouched logo is drawn on top at its own size. Circular logos get
//! circular borders, irregular logos get irregular ones.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use base64::Engine;
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use tokio_util::sync::CancellationToken;

use crate::color::Color;
use crate::config::LogoConfig;
use crate::error::{QrError, QrResult};
use crate::render::encode_png;
use crate::types::ImageRef;

/// A logo ready to be embedded, as pixels and as PNG bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedLogo {
    pub image: RgbaImage,
    pub png: Vec<u8>,
}

impl ProcessedLogo {
    pub fn from_image(image: RgbaImage) -> QrResult<Self> {
        let png = encode_png(&image)?;
        Ok(Self { image, png })
    }
}

/// Image-decode primitive.
#[async_trait]
pub trait LogoLoader: Send + Sync {
    async fn load(&self, image: &ImageRef) -> QrResult<RgbaImage>;
}

/// Reads data URLs in memory and paths from disk, decoding on the blocking pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsLogoLoader;

#[async_trait]
impl LogoLoader for FsLogoLoader {
    async fn load(&self, image: &ImageRef) -> QrResult<RgbaImage> {
        let bytes = match image {
            ImageRef::DataUrl(url) => decode_data_url(url)?,
            ImageRef::Path(path) => tokio::fs::read(path).await?,
        };
        tokio::task::spawn_blocking(move || {
            image::load_from_memory(&bytes)
                .map(|decoded| decoded.to_rgba8())
                .map_err(|err| QrError::Compositing(format!("cannot decode logo: {err}")))
        })
        .await
        .map_err(|err| QrError::Compositing(format!("logo decode task failed: {err}")))?
    }
}

/// Extracts the payload of a `data:` URL. Base64 and percent-encoded bodies are supported.
pub fn decode_data_url(url: &str) -> QrResult<Vec<u8>> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| QrError::Compositing("logo source is not a data URL".into()))?;
    let (header, body) = rest
        .split_once(',')
        .ok_or_else(|| QrError::Compositing("data URL has no payload".into()))?;

    if header.ends_with(";base64") {
        let compact: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        base64::engine::general_purpose::STANDARD
            .decode(compact)
            .map_err(|err| QrError::Compositing(format!("invalid base64 in data URL: {err}")))
    } else {
        Ok(urlencoding::decode_binary(body.as_bytes()).into_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogoCacheKey {
    pub image_prefix: String,
    /// Separates sources that share a prefix but differ in length.
    pub source_len: usize,
    pub border_width: u32,
    pub border_color: String,
}

/// Bounded cache of composited logos, evicting in insertion order.
#[derive(Debug)]
pub struct LogoCache {
    capacity: usize,
    entries: HashMap<LogoCacheKey, Arc<ProcessedLogo>>,
    order: VecDeque<LogoCacheKey>,
    hits: u64,
}

impl LogoCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            hits: 0,
        }
    }

    pub fn get(&mut self, key: &LogoCacheKey) -> Option<Arc<ProcessedLogo>> {
        let found = self.entries.get(key).cloned();
        if found.is_some() {
            self.hits += 1;
        }
        found
    }

    /// Inserts or replaces an entry. A new key evicts the oldest entry when full;
    /// replacing keeps the key's original position.
    pub fn insert(&mut self, key: LogoCacheKey, logo: Arc<ProcessedLogo>) {
        if let Some(slot) = self.entries.get_mut(&key) {
            *slot = logo;
            return;
        }
        while self.order.len() >= self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                    tracing::debug!(image = %truncate(&oldest.image_prefix), "evicted logo from cache");
                }
                None => break,
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, logo);
    }

    pub fn contains(&self, key: &LogoCacheKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }
}

pub type SharedLogoCache = Arc<Mutex<LogoCache>>;

/// Produces bordered logos, memoised in a shared [`LogoCache`].
pub struct LogoCompositor {
    loader: Arc<dyn LogoLoader>,
    cache: SharedLogoCache,
    settings: LogoConfig,
    decodes: AtomicUsize,
}

impl LogoCompositor {
    pub fn new(loader: Arc<dyn LogoLoader>, cache: SharedLogoCache, settings: LogoConfig) -> Self {
        Self {
            loader,
            cache,
            settings,
            decodes: AtomicUsize::new(0),
        }
    }

    /// Number of decode calls issued to the loader so far.
    pub fn decode_count(&self) -> usize {
        self.decodes.load(Ordering::Relaxed)
    }

    pub fn cache(&self) -> &SharedLogoCache {
        &self.cache
    }

    /// Loads a logo without any border. Nothing is cached.
    pub async fn load_plain(
        &self,
        image: &ImageRef,
        cancel: &CancellationToken,
    ) -> QrResult<Arc<ProcessedLogo>> {
        let source = self.decode(image, cancel).await?;
        let processed = run_blocking(cancel, move || ProcessedLogo::from_image(source)).await?;
        Ok(Arc::new(processed))
    }

    /// Returns `image` wrapped in a `border_units` thick border of `border_color`.
    ///
    /// Zero border units return the decoded source as is. A cancelled call
    /// never writes to the cache.
    pub async fn composite(
        &self,
        image: &ImageRef,
        border_units: u32,
        border_color: &str,
        cancel: &CancellationToken,
    ) -> QrResult<Arc<ProcessedLogo>> {
        if cancel.is_cancelled() {
            return Err(QrError::Cancelled);
        }
        if border_units == 0 {
            return self.load_plain(image, cancel).await;
        }
        let color = Color::parse(border_color)?;

        let key = LogoCacheKey {
            image_prefix: image.cache_prefix(self.settings.cache_key_prefix),
            source_len: image.source_len(),
            border_width: border_units,
            border_color: border_color.to_string(),
        };
        let cached = self.lock_cache().get(&key);
        if let Some(hit) = cached {
            tracing::debug!(logo = %image, border_units, "logo cache hit");
            return Ok(hit);
        }
        tracing::debug!(logo = %image, border_units, "logo cache miss");

        let source = self.decode(image, cancel).await?;
        let settings = self.settings.clone();
        let processed = run_blocking(cancel, move || {
            let bordered = add_border(&source, border_units, color, &settings)?;
            ProcessedLogo::from_image(bordered)
        })
        .await?;

        if cancel.is_cancelled() {
            return Err(QrError::Cancelled);
        }
        let processed = Arc::new(processed);
        self.lock_cache().insert(key, Arc::clone(&processed));
        Ok(processed)
    }

    async fn decode(&self, image: &ImageRef, cancel: &CancellationToken) -> QrResult<RgbaImage> {
        self.decodes.fetch_add(1, Ordering::Relaxed);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(QrError::Cancelled),
            loaded = self.loader.load(image) => loaded,
        }
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, LogoCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn run_blocking<T, F>(cancel: &CancellationToken, work: F) -> QrResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> QrResult<T> + Send + 'static,
{
    let task = tokio::task::spawn_blocking(work);
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(QrError::Cancelled),
        joined = task => joined.map_err(|err| QrError::Compositing(format!("logo task failed: {err}")))?,
    }
}

/// Draws `source` inside a border that follows its alpha silhouette.
///
/// The larger side is first brought up to `settings.processing_floor`
/// pixels; the border is `border_units * settings.border_multiplier` pixels
/// at that scale. A surface beyond `max_surface_side` or
/// `max_surface_pixels` is refused with [`QrError::Compositing`].
pub fn add_border(
    source: &RgbaImage,
    border_units: u32,
    color: Color,
    settings: &LogoConfig,
) -> QrResult<RgbaImage> {
    let (width, height) = source.dimensions();
    if width == 0 || height == 0 {
        return Err(QrError::Compositing("logo image is empty".into()));
    }

    let scale = (f64::from(settings.processing_floor) / f64::from(width.max(height))).max(1.0);
    let scaled_w = ((f64::from(width) * scale) as u32).max(1);
    let scaled_h = ((f64::from(height) * scale) as u32).max(1);
    let border = (f64::from(border_units) * settings.border_multiplier * scale) as u32;
    let (surface_w, surface_h) = surface_size(scaled_w, scaled_h, border, settings)?;

    let mut surface = imageops::resize(source, surface_w, surface_h, FilterType::Triangle);
    for pixel in surface.pixels_mut() {
        let alpha = (u16::from(color.a) * u16::from(pixel[3]) + 127) / 255;
        *pixel = Rgba([color.r, color.g, color.b, alpha as u8]);
    }

    let logo = if (scaled_w, scaled_h) == (width, height) {
        source.clone()
    } else {
        imageops::resize(source, scaled_w, scaled_h, FilterType::Lanczos3)
    };
    imageops::overlay(&mut surface, &logo, i64::from(border), i64::from(border));
    Ok(surface)
}

fn surface_size(scaled_w: u32, scaled_h: u32, border: u32, settings: &LogoConfig) -> QrResult<(u32, u32)> {
    let too_large = || {
        QrError::Compositing(format!(
            "bordered logo of {scaled_w}x{scaled_h} px plus {border} px border exceeds the surface limit"
        ))
    };
    let padding = border.checked_mul(2).ok_or_else(too_large)?;
    let w = scaled_w.checked_add(padding).ok_or_else(too_large)?;
    let h = scaled_h.checked_add(padding).ok_or_else(too_large)?;
    if w.max(h) > settings.max_surface_side || u64::from(w) * u64::from(h) > settings.max_surface_pixels {
        return Err(too_large());
    }
    Ok((w, h))
}

fn truncate(s: &str) -> &str {
    match s.char_indices().nth(32) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Notify;

    /// Opaque red disc on a transparent square.
    fn disc(size: u32) -> RgbaImage {
        let r = size as f64 / 2.0;
        RgbaImage::from_fn(size, size, |x, y| {
            let (dx, dy) = (x as f64 + 0.5 - r, y as f64 + 0.5 - r);
            if dx * dx + dy * dy <= r * r {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 0, 0])
            }
        })
    }

    struct CountingLoader {
        loads: AtomicUsize,
    }

    #[async_trait]
    impl LogoLoader for CountingLoader {
        async fn load(&self, _image: &ImageRef) -> QrResult<RgbaImage> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(disc(16))
        }
    }

    struct GatedLoader {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl LogoLoader for GatedLoader {
        async fn load(&self, _image: &ImageRef) -> QrResult<RgbaImage> {
            self.gate.notified().await;
            Ok(disc(16))
        }
    }

    fn small_settings() -> LogoConfig {
        LogoConfig {
            processing_floor: 32,
            ..LogoConfig::default()
        }
    }

    fn border_settings(border_multiplier: f64, processing_floor: u32) -> LogoConfig {
        LogoConfig {
            border_multiplier,
            processing_floor,
            ..LogoConfig::default()
        }
    }

    fn shared_cache() -> SharedLogoCache {
        Arc::new(Mutex::new(LogoCache::new(20)))
    }

    fn processed(tag: u8) -> Arc<ProcessedLogo> {
        Arc::new(ProcessedLogo {
            image: RgbaImage::new(1, 1),
            png: vec![tag],
        })
    }

    fn key(i: usize) -> LogoCacheKey {
        LogoCacheKey {
            image_prefix: format!("data:image/png;base64,{i}"),
            source_len: 24,
            border_width: 2,
            border_color: "#ffffff".into(),
        }
    }

    #[test]
    fn border_follows_silhouette() {
        let out = add_border(&disc(16), 1, Color::rgb(0, 0, 255), &border_settings(2.0, 16)).unwrap();
        assert_eq!(out.dimensions(), (20, 20));
        // corners stay transparent for a round logo
        assert_eq!(out.get_pixel(0, 0)[3], 0);
        // the ring just outside the disc takes the border colour
        let edge = out.get_pixel(10, 0);
        assert_eq!((edge[0], edge[1], edge[2]), (0, 0, 255));
        assert!(edge[3] > 0);
        assert_eq!(*out.get_pixel(10, 10), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn small_logos_are_upscaled_to_floor() {
        let out = add_border(&disc(8), 1, Color::WHITE, &border_settings(6.0, 64)).unwrap();
        // scale 8: 64 px logo plus 48 px border on each side
        assert_eq!(out.dimensions(), (64 + 96, 64 + 96));
    }

    #[test]
    fn transparent_border_keeps_only_logo() {
        let out = add_border(&disc(16), 2, Color::TRANSPARENT, &border_settings(2.0, 16)).unwrap();
        assert_eq!(out.get_pixel(12, 1)[3], 0);
    }

    #[test]
    fn oversized_surface_is_refused() {
        let tiny = RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 255]));
        // 1024 px logo plus 49152 px of border on each side
        let err = add_border(&tiny, 8, Color::WHITE, &LogoConfig::default()).unwrap_err();
        assert!(matches!(err, QrError::Compositing(_)));

        let limited = LogoConfig {
            max_surface_side: 159,
            ..border_settings(6.0, 64)
        };
        assert!(add_border(&disc(8), 1, Color::WHITE, &limited).is_err());
        let limited = LogoConfig {
            max_surface_pixels: 160 * 160 - 1,
            ..border_settings(6.0, 64)
        };
        assert!(add_border(&disc(8), 1, Color::WHITE, &limited).is_err());
    }

    #[tokio::test]
    async fn refused_surface_is_not_cached() {
        struct TinyLoader;

        #[async_trait]
        impl LogoLoader for TinyLoader {
            async fn load(&self, _image: &ImageRef) -> QrResult<RgbaImage> {
                Ok(RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 255])))
            }
        }

        let compositor = LogoCompositor::new(Arc::new(TinyLoader), shared_cache(), LogoConfig::default());
        let image = ImageRef::Path("dot.png".into());
        let err = compositor
            .composite(&image, 8, "#ffffff", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, QrError::Compositing(_)));
        assert!(compositor.cache().lock().unwrap().is_empty());
    }

    #[test]
    fn cache_evicts_oldest_insertion() {
        let mut cache = LogoCache::new(20);
        for i in 0..21 {
            cache.insert(key(i), processed(i as u8));
        }
        assert_eq!(cache.len(), 20);
        assert!(!cache.contains(&key(0)));
        assert!(cache.contains(&key(1)));
        assert!(cache.contains(&key(20)));
    }

    #[test]
    fn cache_replacement_keeps_position() {
        let mut cache = LogoCache::new(2);
        cache.insert(key(0), processed(0));
        cache.insert(key(1), processed(1));
        cache.insert(key(0), processed(9));
        cache.insert(key(2), processed(2));
        assert!(!cache.contains(&key(0)));
        assert_eq!(cache.get(&key(1)).unwrap().png, vec![1]);
        assert_eq!(cache.hits(), 1);
    }

    #[test]
    fn data_url_decoding() {
        assert_eq!(decode_data_url("data:text/plain;base64,aGk=").unwrap(), b"hi");
        assert_eq!(decode_data_url("data:text/plain,a%20b").unwrap(), b"a b");
        assert!(decode_data_url("logo.png").is_err());
        assert!(decode_data_url("data:image/png;base64,***").is_err());
    }

    #[tokio::test]
    async fn second_composite_hits_cache() {
        let loader = Arc::new(CountingLoader {
            loads: AtomicUsize::new(0),
        });
        let compositor = LogoCompositor::new(loader.clone(), shared_cache(), small_settings());
        let image = ImageRef::DataUrl("data:image/png;base64,AAAA".into());
        let token = CancellationToken::new();

        let first = compositor.composite(&image, 2, "#ffffff", &token).await.unwrap();
        let second = compositor.composite(&image, 2, "#ffffff", &token).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(compositor.decode_count(), 1);
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
        assert_eq!(compositor.cache().lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn shared_prefix_with_different_length_is_a_miss() {
        let loader = Arc::new(CountingLoader {
            loads: AtomicUsize::new(0),
        });
        let compositor = LogoCompositor::new(loader.clone(), shared_cache(), small_settings());
        let header = format!("data:image/png;base64,{}", "A".repeat(120));
        let first = ImageRef::DataUrl(format!("{header}BBBB"));
        let second = ImageRef::DataUrl(format!("{header}CCCCCCCC"));
        let token = CancellationToken::new();

        compositor.composite(&first, 2, "#ffffff", &token).await.unwrap();
        compositor.composite(&second, 2, "#ffffff", &token).await.unwrap();

        assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
        assert_eq!(compositor.cache().lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn zero_border_is_not_cached() {
        let loader = Arc::new(CountingLoader {
            loads: AtomicUsize::new(0),
        });
        let compositor = LogoCompositor::new(loader, shared_cache(), small_settings());
        let image = ImageRef::Path("logo.png".into());

        let plain = compositor
            .composite(&image, 0, "#ffffff", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(plain.image, disc(16));
        assert!(compositor.cache().lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancelled_composite_leaves_cache_untouched() {
        let gate = Arc::new(Notify::new());
        let compositor = Arc::new(LogoCompositor::new(
            Arc::new(GatedLoader { gate: gate.clone() }),
            shared_cache(),
            small_settings(),
        ));
        let token = CancellationToken::new();

        let task = {
            let compositor = Arc::clone(&compositor);
            let token = token.clone();
            tokio::spawn(async move {
                let image = ImageRef::DataUrl("data:image/png;base64,AAAA".into());
                compositor.composite(&image, 3, "#000000", &token).await
            })
        };
        tokio::task::yield_now().await;
        token.cancel();
        gate.notify_waiters();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(QrError::Cancelled)));
        assert!(compositor.cache().lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn bad_border_colour_is_rejected() {
        let compositor = LogoCompositor::new(
            Arc::new(CountingLoader {
                loads: AtomicUsize::new(0),
            }),
            shared_cache(),
            small_settings(),
        );
        let image = ImageRef::Path("logo.png".into());
        let err = compositor
            .composite(&image, 1, "white", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, QrError::InvalidOptions(_)));
        assert_eq!(compositor.decode_count(), 0);
    }
}
