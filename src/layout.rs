//! Module matrix and the geometry of a styled QR code.
//!
//! [`ModuleGrid`] wraps the `qrcode` crate's matrix. [`plan`] turns a grid
//! plus [`StyleOptions`] into a list of filled shapes in pixel space that both
//! the raster and the SVG writers consume.

use qrcode::{EcLevel as MatrixEcLevel, QrCode, Version};

use crate::color::Color;
use crate::error::{QrError, QrResult};
use crate::types::{CornerDotStyle, CornerSquareStyle, DotStyle, EcLevel, StyleOptions};

/// Edge of a finder pattern, in modules.
const FINDER: usize = 7;

/// A square grid of dark/light modules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleGrid {
    width: usize,
    dark: Vec<bool>,
}

impl ModuleGrid {
    /// Encodes `data` in byte mode. `version == 0` picks the smallest version that fits.
    pub fn encode(data: &str, version: u8, level: EcLevel) -> QrResult<Self> {
        let ec = match level {
            EcLevel::L => MatrixEcLevel::L,
            EcLevel::M => MatrixEcLevel::M,
            EcLevel::Q => MatrixEcLevel::Q,
            EcLevel::H => MatrixEcLevel::H,
        };
        let code = if version == 0 {
            QrCode::with_error_correction_level(data.as_bytes(), ec)
        } else {
            QrCode::with_version(data.as_bytes(), Version::Normal(i16::from(version)), ec)
        }
        .map_err(|err| {
            QrError::Render(format!(
                "{err}: {} bytes at error correction {level:?}, version {}",
                data.len(),
                if version == 0 { "auto".to_string() } else { version.to_string() }
            ))
        })?;

        let dark = code
            .to_colors()
            .into_iter()
            .map(|color| color == qrcode::Color::Dark)
            .collect();
        Ok(Self {
            width: code.width(),
            dark,
        })
    }

    pub fn from_modules(width: usize, dark: Vec<bool>) -> Self {
        debug_assert_eq!(dark.len(), width * width);
        Self { width, dark }
    }

    /// Modules per side.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Out-of-range coordinates read as light.
    pub fn is_dark(&self, x: isize, y: isize) -> bool {
        if x < 0 || y < 0 {
            return false;
        }
        let (x, y) = (x as usize, y as usize);
        x < self.width && y < self.width && self.dark[y * self.width + x]
    }

    /// Top-left module of each finder pattern.
    pub fn finder_origins(&self) -> [(usize, usize); 3] {
        let far = self.width.saturating_sub(FINDER);
        [(0, 0), (far, 0), (0, far)]
    }

    pub fn in_finder(&self, x: usize, y: usize) -> bool {
        self.finder_origins()
            .iter()
            .any(|&(fx, fy)| (fx..fx + FINDER).contains(&x) && (fy..fy + FINDER).contains(&y))
    }
}

/// Rectangle with an independent radius per corner: top-left, top-right,
/// bottom-right, bottom-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundedRect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    pub radii: [f64; 4],
}

impl RoundedRect {
    pub fn square(x: f64, y: f64, size: f64) -> Self {
        Self {
            x,
            y,
            w: size,
            h: size,
            radii: [0.0; 4],
        }
    }

    pub fn circle(x: f64, y: f64, size: f64) -> Self {
        Self {
            radii: [size / 2.0; 4],
            ..Self::square(x, y, size)
        }
    }

    pub fn contains(&self, px: f64, py: f64) -> bool {
        if px < self.x || py < self.y || px > self.x + self.w || py > self.y + self.h {
            return false;
        }
        let [tl, tr, br, bl] = self.radii;
        let corners = [
            (tl, self.x + tl, self.y + tl, px < self.x + tl && py < self.y + tl),
            (tr, self.x + self.w - tr, self.y + tr, px > self.x + self.w - tr && py < self.y + tr),
            (br, self.x + self.w - br, self.y + self.h - br, px > self.x + self.w - br && py > self.y + self.h - br),
            (bl, self.x + bl, self.y + self.h - bl, px < self.x + bl && py > self.y + self.h - bl),
        ];
        corners.iter().all(|&(r, cx, cy, in_corner)| {
            r <= 0.0 || !in_corner || (px - cx).powi(2) + (py - cy).powi(2) <= r * r
        })
    }

    /// Appends a closed, clockwise SVG subpath.
    pub fn write_path(&self, out: &mut String) {
        let (x, y, w, h) = (self.x, self.y, self.w, self.h);
        let [tl, tr, br, bl] = self.radii;
        out.push_str(&format!("M{},{}", fmt(x + tl), fmt(y)));
        out.push_str(&format!("H{}", fmt(x + w - tr)));
        arc(out, tr, x + w, y + tr);
        out.push_str(&format!("V{}", fmt(y + h - br)));
        arc(out, br, x + w - br, y + h);
        out.push_str(&format!("H{}", fmt(x + bl)));
        arc(out, bl, x, y + h - bl);
        out.push_str(&format!("V{}", fmt(y + tl)));
        arc(out, tl, x + tl, y);
        out.push('z');
    }
}

fn arc(out: &mut String, r: f64, to_x: f64, to_y: f64) {
    if r > 0.0 {
        out.push_str(&format!("A{0},{0} 0 0 1 {1},{2}", fmt(r), fmt(to_x), fmt(to_y)));
    }
}

/// Compact number formatting for SVG coordinates.
fn fmt(v: f64) -> String {
    let rounded = (v * 100.0).round() / 100.0;
    if rounded.fract() == 0.0 {
        format!("{}", rounded as i64)
    } else {
        format!("{rounded}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    Fill(RoundedRect),
    /// Area inside `outer` and outside `inner`.
    Ring { outer: RoundedRect, inner: RoundedRect },
}

impl Shape {
    pub fn contains(&self, px: f64, py: f64) -> bool {
        match self {
            Shape::Fill(rect) => rect.contains(px, py),
            Shape::Ring { outer, inner } => outer.contains(px, py) && !inner.contains(px, py),
        }
    }

    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        let rect = match self {
            Shape::Fill(rect) => rect,
            Shape::Ring { outer, .. } => outer,
        };
        (rect.x, rect.y, rect.x + rect.w, rect.y + rect.h)
    }

    pub fn write_path(&self, out: &mut String) {
        match self {
            Shape::Fill(rect) => rect.write_path(out),
            Shape::Ring { outer, inner } => {
                outer.write_path(out);
                inner.write_path(out);
            }
        }
    }
}

/// One filled shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mark {
    pub shape: Shape,
    pub color: Color,
}

/// Logo box in pixel space, margin already removed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogoPlacement {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// What a logo needs from the layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogoRequest {
    pub width: u32,
    pub height: u32,
    pub image_fraction: f64,
    pub margin: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub size: u32,
    pub background: Color,
    pub marks: Vec<Mark>,
    pub logo: Option<LogoPlacement>,
}

/// Lays out `grid` on a `size` x `size` canvas.
///
/// Modules are whole pixels: the quiet zone takes `style.margin` pixels on
/// each side and the matrix is centred in what is left.
pub fn plan(grid: &ModuleGrid, size: u32, style: &StyleOptions, logo: Option<LogoRequest>) -> QrResult<Plan> {
    let count = grid.width();
    let drawable = size.saturating_sub(style.margin.saturating_mul(2)) as usize;
    let dot = drawable / count.max(1);
    if dot == 0 {
        return Err(QrError::Render(format!(
            "{size}px with a {}px margin is too small for {count} modules",
            style.margin
        )));
    }
    let origin = ((size as usize - count * dot) / 2) as f64;
    let dot = dot as f64;

    let foreground = Color::parse(&style.foreground)?;
    let background = Color::parse(style.effective_background())?;
    let corner_square = Color::parse(&style.corner_square_color)?;
    let corner_dot = Color::parse(&style.corner_dot_color)?;

    let mut marks = Vec::new();
    for y in 0..count {
        for x in 0..count {
            if !grid.is_dark(x as isize, y as isize) || grid.in_finder(x, y) {
                continue;
            }
            let px = origin + x as f64 * dot;
            let py = origin + y as f64 * dot;
            marks.push(Mark {
                shape: Shape::Fill(dot_shape(grid, x, y, px, py, dot, style.dot_style)),
                color: foreground,
            });
        }
    }

    for (fx, fy) in grid.finder_origins() {
        let px = origin + fx as f64 * dot;
        let py = origin + fy as f64 * dot;
        marks.push(Mark {
            shape: corner_square_shape(px, py, dot, style.corner_square_style),
            color: corner_square,
        });
        marks.push(Mark {
            shape: Shape::Fill(corner_dot_shape(px + 2.0 * dot, py + 2.0 * dot, dot, style.corner_dot_style)),
            color: corner_dot,
        });
    }

    let logo = logo.and_then(|request| logo_placement(count, dot, origin, style.error_correction, request));

    Ok(Plan {
        size,
        background,
        marks,
        logo,
    })
}

fn dot_shape(grid: &ModuleGrid, x: usize, y: usize, px: f64, py: f64, size: f64, style: DotStyle) -> RoundedRect {
    let (xi, yi) = (x as isize, y as isize);
    let left = grid.is_dark(xi - 1, yi);
    let right = grid.is_dark(xi + 1, yi);
    let top = grid.is_dark(xi, yi - 1);
    let bottom = grid.is_dark(xi, yi + 1);
    let half = size / 2.0;

    let mut rect = RoundedRect::square(px, py, size);
    match style {
        DotStyle::Square => {}
        DotStyle::Dots => rect = RoundedRect::circle(px, py, size),
        DotStyle::Rounded | DotStyle::ExtraRounded => {
            // a corner is rounded when neither side touching it has a neighbour
            let rounded = [!left && !top, !top && !right, !right && !bottom, !bottom && !left];
            let count = rounded.iter().filter(|&&r| r).count();
            let radius = if style == DotStyle::ExtraRounded && count == 1 { size } else { half };
            rect.radii = rounded.map(|r| if r { radius } else { 0.0 });
        }
        DotStyle::Classy | DotStyle::ClassyRounded => {
            let isolated = !(left || right || top || bottom);
            let tl = isolated || (!left && !top);
            let br = isolated || (!right && !bottom);
            let radius = if style == DotStyle::ClassyRounded && !isolated { size } else { half };
            rect.radii = [
                if tl { radius } else { 0.0 },
                0.0,
                if br { radius } else { 0.0 },
                0.0,
            ];
        }
    }
    rect
}

fn corner_square_shape(px: f64, py: f64, dot: f64, style: CornerSquareStyle) -> Shape {
    let outer_size = FINDER as f64 * dot;
    let inner_size = outer_size - 2.0 * dot;
    let mut outer = RoundedRect::square(px, py, outer_size);
    let mut inner = RoundedRect::square(px + dot, py + dot, inner_size);
    match style {
        CornerSquareStyle::Square => {}
        CornerSquareStyle::Dot => {
            outer = RoundedRect::circle(px, py, outer_size);
            inner = RoundedRect::circle(px + dot, py + dot, inner_size);
        }
        CornerSquareStyle::ExtraRounded => {
            outer.radii = [2.5 * dot; 4];
            inner.radii = [1.5 * dot; 4];
        }
    }
    Shape::Ring { outer, inner }
}

fn corner_dot_shape(px: f64, py: f64, dot: f64, style: CornerDotStyle) -> RoundedRect {
    match style {
        CornerDotStyle::Square => RoundedRect::square(px, py, 3.0 * dot),
        CornerDotStyle::Dot => RoundedRect::circle(px, py, 3.0 * dot),
    }
}

/// Share of the symbol each error-correction level can lose and still decode.
fn ecc_capacity(level: EcLevel) -> f64 {
    match level {
        EcLevel::L => 0.07,
        EcLevel::M => 0.15,
        EcLevel::Q => 0.25,
        EcLevel::H => 0.30,
    }
}

/// Sizes the logo so it covers at most `image_fraction` of what the error
/// correction can recover, snapped to an odd number of modules per axis so
/// it stays centred on the module grid.
fn logo_placement(count: usize, dot: f64, origin: f64, level: EcLevel, request: LogoRequest) -> Option<LogoPlacement> {
    if request.width == 0 || request.height == 0 {
        return None;
    }
    let cover = request.image_fraction * ecc_capacity(level);
    let max_hidden = (cover * (count * count) as f64).floor() as i64;
    let max_axis = count as i64 - 14;
    if max_hidden <= 0 || max_axis <= 0 {
        return None;
    }

    let k = f64::from(request.height) / f64::from(request.width);
    let mut hide_x = ((max_hidden as f64 / k).sqrt().floor() as i64).max(1).min(max_axis);
    if hide_x % 2 == 0 {
        hide_x -= 1;
    }
    let mut width = hide_x as f64 * dot;
    let mut hide_y = 1 + 2 * (((hide_x as f64 * k - 1.0) / 2.0).ceil() as i64);
    let mut height = (width * k).round();

    if hide_y * hide_x > max_hidden || hide_y > max_axis {
        hide_y = if hide_y > max_axis { max_axis } else { hide_y - 2 };
        if hide_y <= 0 {
            return None;
        }
        height = hide_y as f64 * dot;
        width = (height / k).round();
    }

    let margin = f64::from(request.margin);
    let matrix = count as f64 * dot;
    let placement = LogoPlacement {
        x: origin + margin + (matrix - width) / 2.0,
        y: origin + margin + (matrix - height) / 2.0,
        width: width - 2.0 * margin,
        height: height - 2.0 * margin,
    };
    (placement.width >= 1.0 && placement.height >= 1.0).then_some(placement)
}
