//! Raster and SVG output of a styled QR code, plus image encoding.
//!
//! A [`RenderBackend`] is the rendering primitive the preview and export
//! paths draw through. [`StyledBackend`] is the default one: it lays the
//! symbol out with [`crate::layout`] and paints every shape either into an
//! [`RgbaImage`] or into SVG paths.
//!
//! # Example
//!
//! ```rust
//! use qrsmith::render::{RenderBackend, RenderRequest, StyledBackend};
//! use qrsmith::StyleOptions;
//!
//! let request = RenderRequest::new("https://example.com", 256, StyleOptions::default());
//! let img = StyledBackend.rasterize(&request).unwrap();
//! assert_eq!(img.dimensions(), (256, 256));
//! ```

use std::io::Cursor;
use std::sync::Arc;

use base64::Engine;
use image::imageops::{self, FilterType};
use image::{ImageFormat, Pixel, Rgb, RgbImage, Rgba, RgbaImage};

use crate::color::Color;
use crate::error::{QrError, QrResult};
use crate::layout::{self, LogoPlacement, LogoRequest, ModuleGrid, Plan, Shape};
use crate::logo::ProcessedLogo;
use crate::types::{ExportFormat, StyleOptions};

/// Sub-pixel sample points used for edge coverage.
const SAMPLES: [(f64, f64); 4] = [(0.25, 0.25), (0.75, 0.25), (0.25, 0.75), (0.75, 0.75)];

/// A logo to draw over the centre of the code.
#[derive(Debug, Clone)]
pub struct EmbeddedLogo {
    pub logo: Arc<ProcessedLogo>,
    /// Ceiling of the share of the code the logo may cover.
    pub image_fraction: f64,
    /// Pixels kept clear around the logo inside its box.
    pub margin: u32,
}

/// Fully resolved input of one render.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub data: String,
    /// Canvas edge in pixels.
    pub size: u32,
    pub style: StyleOptions,
    pub logo: Option<EmbeddedLogo>,
}

impl RenderRequest {
    pub fn new(data: impl Into<String>, size: u32, style: StyleOptions) -> Self {
        Self {
            data: data.into(),
            size,
            style,
            logo: None,
        }
    }

    pub fn with_logo(mut self, logo: EmbeddedLogo) -> Self {
        self.logo = Some(logo);
        self
    }
}

/// Rendering primitive.
pub trait RenderBackend: Send + Sync {
    fn rasterize(&self, request: &RenderRequest) -> QrResult<RgbaImage>;
    fn svg(&self, request: &RenderRequest) -> QrResult<String>;
}

/// Draws dot and corner styles, colours, quiet zone, background and logo.
#[derive(Debug, Default, Clone, Copy)]
pub struct StyledBackend;

impl StyledBackend {
    fn plan(&self, request: &RenderRequest) -> QrResult<Plan> {
        request.style.validate()?;
        let grid = ModuleGrid::encode(
            &request.data,
            request.style.version,
            request.style.error_correction,
        )?;
        let logo = request.logo.as_ref().map(|embedded| LogoRequest {
            width: embedded.logo.image.width(),
            height: embedded.logo.image.height(),
            image_fraction: embedded.image_fraction,
            margin: embedded.margin,
        });
        layout::plan(&grid, request.size, &request.style, logo)
    }
}

impl RenderBackend for StyledBackend {
    fn rasterize(&self, request: &RenderRequest) -> QrResult<RgbaImage> {
        let plan = self.plan(request)?;
        let mut img = RgbaImage::from_pixel(plan.size, plan.size, plan.background.to_rgba());

        for mark in &plan.marks {
            fill_shape(&mut img, &mark.shape, mark.color);
        }
        if let (Some(placement), Some(embedded)) = (plan.logo, &request.logo) {
            draw_logo(&mut img, &embedded.logo.image, placement);
        }
        Ok(img)
    }

    // Marks of one colour share a single path; they never overlap, so the
    // even-odd rule only carves the holes of the finder rings.
    fn svg(&self, request: &RenderRequest) -> QrResult<String> {
        let plan = self.plan(request)?;
        let mut result = String::new();
        result += "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";
        result += &format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" xmlns:xlink=\"http://www.w3.org/1999/xlink\" version=\"1.1\" width=\"{0}\" height=\"{0}\" viewBox=\"0 0 {0} {0}\">\n",
            plan.size
        );
        if plan.background.a > 0 {
            result += &format!("\t<rect width=\"100%\" height=\"100%\"{}/>\n", fill_attrs(plan.background));
        }

        let mut groups: Vec<(Color, String)> = Vec::new();
        for mark in &plan.marks {
            let index = match groups.iter().position(|(color, _)| *color == mark.color) {
                Some(index) => index,
                None => {
                    groups.push((mark.color, String::new()));
                    groups.len() - 1
                }
            };
            mark.shape.write_path(&mut groups[index].1);
        }
        for (color, path) in &groups {
            result += &format!("\t<path d=\"{path}\"{} fill-rule=\"evenodd\"/>\n", fill_attrs(*color));
        }

        if let (Some(placement), Some(embedded)) = (plan.logo, &request.logo) {
            let href = format!(
                "data:image/png;base64,{}",
                base64::engine::general_purpose::STANDARD.encode(&embedded.logo.png)
            );
            result += &format!(
                "\t<image x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" href=\"{href}\" xlink:href=\"{href}\"/>\n",
                placement.x, placement.y, placement.width, placement.height
            );
        }
        result += "</svg>\n";
        Ok(result)
    }
}

fn fill_attrs(color: Color) -> String {
    if color.is_opaque() {
        format!(" fill=\"{}\"", color.to_css_hex())
    } else {
        format!(" fill=\"{}\" fill-opacity=\"{:.3}\"", color.to_css_hex(), color.opacity())
    }
}

fn fill_shape(img: &mut RgbaImage, shape: &Shape, color: Color) {
    let (x0, y0, x1, y1) = shape.bounds();
    let (width, height) = img.dimensions();
    let xs = x0.floor().max(0.0) as u32;
    let ys = y0.floor().max(0.0) as u32;
    let xe = (x1.ceil().max(0.0) as u32).min(width);
    let ye = (y1.ceil().max(0.0) as u32).min(height);

    for py in ys..ye {
        for px in xs..xe {
            let hits = SAMPLES
                .iter()
                .filter(|(dx, dy)| shape.contains(f64::from(px) + dx, f64::from(py) + dy))
                .count() as u32;
            if hits == 0 {
                continue;
            }
            let alpha = u32::from(color.a) * hits / SAMPLES.len() as u32;
            img.get_pixel_mut(px, py)
                .blend(&Rgba([color.r, color.g, color.b, alpha as u8]));
        }
    }
}

fn draw_logo(img: &mut RgbaImage, logo: &RgbaImage, placement: LogoPlacement) {
    let width = placement.width.round().max(1.0) as u32;
    let height = placement.height.round().max(1.0) as u32;
    let scaled = if logo.dimensions() == (width, height) {
        logo.clone()
    } else {
        imageops::resize(logo, width, height, FilterType::Lanczos3)
    };
    imageops::overlay(
        img,
        &scaled,
        placement.x.round() as i64,
        placement.y.round() as i64,
    );
}

/// Encodes `image` as PNG.
pub fn encode_png(image: &RgbaImage) -> QrResult<Vec<u8>> {
    write_image(image, ImageFormat::Png)
}

/// Encodes `image` in a raster export format. JPEG has no alpha, so the image
/// is flattened onto white first.
pub fn encode_image(image: &RgbaImage, format: ExportFormat) -> QrResult<Vec<u8>> {
    match format {
        ExportFormat::Png => write_image(image, ImageFormat::Png),
        ExportFormat::Webp => write_image(image, ImageFormat::WebP),
        ExportFormat::Jpeg => write_image(&flatten(image, Color::WHITE), ImageFormat::Jpeg),
        ExportFormat::Svg => Err(QrError::InvalidOptions("svg is not a raster format".into())),
    }
}

fn write_image<P>(image: &image::ImageBuffer<P, Vec<P::Subpixel>>, format: ImageFormat) -> QrResult<Vec<u8>>
where
    P: image::PixelWithColorType,
    [P::Subpixel]: image::EncodableLayout,
{
    let mut cursor = Cursor::new(Vec::new());
    image
        .write_to(&mut cursor, format)
        .map_err(|err| QrError::Render(format!("cannot encode {format:?}: {err}")))?;
    Ok(cursor.into_inner())
}

fn flatten(image: &RgbaImage, matte: Color) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let pixel = image.get_pixel(x, y);
        let alpha = u32::from(pixel[3]);
        let mix = |c: u8, m: u8| ((u32::from(c) * alpha + u32::from(m) * (255 - alpha) + 127) / 255) as u8;
        Rgb([
            mix(pixel[0], matte.r),
            mix(pixel[1], matte.g),
            mix(pixel[2], matte.b),
        ])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CornerSquareStyle, DotStyle, EcLevel};

    fn request(size: u32) -> RenderRequest {
        RenderRequest::new("https://example.com", size, StyleOptions::default())
    }

    fn red_logo() -> EmbeddedLogo {
        let image = RgbaImage::from_pixel(40, 40, Rgba([255, 0, 0, 255]));
        EmbeddedLogo {
            logo: Arc::new(ProcessedLogo::from_image(image).unwrap()),
            image_fraction: 0.85,
            margin: 0,
        }
    }

    #[test]
    fn rasterize_paints_background_and_finders() {
        let img = StyledBackend.rasterize(&request(300)).unwrap();
        assert_eq!(img.dimensions(), (300, 300));
        assert_eq!(*img.get_pixel(0, 0), Rgba([255, 255, 255, 255]));
        // 11 px modules starting at 12: outer ring, light gap, centre dot
        assert_eq!(*img.get_pixel(13, 13), Rgba([0, 0, 0, 255]));
        assert_eq!(*img.get_pixel(12 + 11 + 5, 12 + 11 + 5), Rgba([255, 255, 255, 255]));
        assert_eq!(*img.get_pixel(12 + 33 + 5, 12 + 33 + 5), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn transparent_background_leaves_alpha() {
        let mut req = request(256);
        req.style.transparent_background = true;
        req.style.dot_style = DotStyle::Dots;
        req.style.corner_square_style = CornerSquareStyle::ExtraRounded;
        let img = StyledBackend.rasterize(&req).unwrap();
        assert_eq!(img.get_pixel(0, 0)[3], 0);
    }

    #[test]
    fn logo_is_drawn_in_the_centre() {
        let mut req = request(300).with_logo(red_logo());
        req.style.error_correction = EcLevel::H;
        let img = StyledBackend.rasterize(&req).unwrap();
        assert_eq!(*img.get_pixel(150, 150), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn svg_output() {
        let svg = StyledBackend.svg(&request(512).with_logo(red_logo())).unwrap();
        assert!(svg.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(svg.contains("viewBox=\"0 0 512 512\""));
        assert!(svg.contains("fill=\"#000000\""));
        assert!(svg.contains("href=\"data:image/png;base64,"));
        assert!(svg.trim_end().ends_with("</svg>"));
    }

    #[test]
    fn primitive_failures_become_render_errors() {
        let mut req = RenderRequest::new("x".repeat(400), 300, StyleOptions::default());
        req.style.version = 2;
        assert!(matches!(StyledBackend.rasterize(&req), Err(QrError::Render(_))));

        req.style.version = 41;
        assert!(matches!(StyledBackend.svg(&req), Err(QrError::InvalidOptions(_))));
    }

    #[test]
    fn raster_encodings_have_magic_numbers() {
        let img = StyledBackend.rasterize(&request(256)).unwrap();
        assert!(encode_image(&img, ExportFormat::Png).unwrap().starts_with(b"\x89PNG"));
        assert!(encode_image(&img, ExportFormat::Jpeg).unwrap().starts_with(&[0xFF, 0xD8]));
        assert!(encode_image(&img, ExportFormat::Webp).unwrap().starts_with(b"RIFF"));
        assert!(encode_image(&img, ExportFormat::Svg).is_err());
    }

    #[test]
    fn flatten_uses_matte_for_transparent_pixels() {
        let img = RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 0]));
        assert_eq!(*flatten(&img, Color::WHITE).get_pixel(0, 0), Rgb([255, 255, 255]));
    }
}
