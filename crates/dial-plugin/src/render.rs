//! Indicator renderer: the dial's 144×144 readout for the selected app.
//!
//! Each render walks a fixed, forward-only sequence of stages:
//!
//! ```text
//!   TryIcon ──ok──────────────┐
//!      │ missing / bad data   │
//!      ▼                      ▼
//!   DrawGauge ────────────▶ TryOverlay ──▶ Done
//! ```
//!
//! A failing stage falls through to the next one; nothing is retried and
//! something is always produced.  The renderer only reads the snapshot and
//! icon cache.

use std::f64::consts::TAU;
use std::io::Cursor;
use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use dial_proto::config::Config;
use dial_proto::protocol::{AppEntry, FeedbackPayload, IndicatorValue};
use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::imageops::{self, FilterType};
use image::{ImageFormat, Rgba, RgbaImage};
use thiserror::Error;
use tracing::{debug, warn};

use crate::icons::IconCache;

pub const INDICATOR_SIZE: u32 = 144;
pub const PLACEHOLDER_TITLE: &str = "(No Audio Apps)";

const GAUGE_CX: f64 = INDICATOR_SIZE as f64 / 2.0;
const GAUGE_CY: f64 = 58.0;
const GAUGE_RADIUS: f64 = 44.0;

const RING_COLOR: Rgba<u8> = Rgba([0x11, 0x11, 0x11, 0xff]);
const DISC_COLOR: Rgba<u8> = Rgba([0x22, 0x22, 0x22, 0xff]);
const ARC_COLOR: Rgba<u8> = Rgba([0x00, 0xcc, 0x88, 0xff]);
const TEXT_COLOR: Rgba<u8> = Rgba([0xff, 0xff, 0xff, 0xff]);
const OVERLAY_SHADE: Rgba<u8> = Rgba([0x00, 0x00, 0x00, 0x96]);
const OVERLAY_SLASH: Rgba<u8> = Rgba([0xe6, 0x28, 0x28, 0xe6]);

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("not a base64 data URL")]
    NotDataUrl,
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

/// What ended up on the canvas, bottom to top.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Icon,
    Gauge,
    MuteOverlay,
}

#[derive(Debug, Clone)]
pub struct Indicator {
    pub title: String,
    pub value: String,
    pub percent: u8,
    /// Fully transparent for the placeholder, so the host clears whatever
    /// image the previous frame left behind.
    pub image: RgbaImage,
    pub layers: Vec<Layer>,
}

impl Indicator {
    pub fn placeholder() -> Self {
        Self {
            title: PLACEHOLDER_TITLE.to_string(),
            value: String::new(),
            percent: 0,
            image: RgbaImage::new(INDICATOR_SIZE, INDICATOR_SIZE),
            layers: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn is_placeholder(&self) -> bool {
        self.layers.is_empty()
    }

    /// PNG-encode the image as a `data:` URL for the host.
    pub fn image_data_url(&self) -> Result<String, RenderError> {
        let mut png = Vec::new();
        self.image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
        Ok(format!("data:image/png;base64,{}", STANDARD.encode(png)))
    }

    pub fn feedback(&self) -> Result<FeedbackPayload, RenderError> {
        Ok(FeedbackPayload {
            title: self.title.clone(),
            value: self.value.clone(),
            indicator: IndicatorValue {
                value: self.percent,
            },
            icon: Some(self.image_data_url()?),
        })
    }
}

/// Where the mute overlay comes from.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum OverlaySource {
    #[default]
    Builtin,
    File(PathBuf),
}

impl OverlaySource {
    fn load(&self) -> Result<RgbaImage, RenderError> {
        match self {
            OverlaySource::Builtin => Ok(builtin_mute_overlay()),
            OverlaySource::File(path) => Ok(fit_square(image::open(path)?.to_rgba8())),
        }
    }
}

enum Stage {
    TryIcon,
    DrawGauge,
    TryOverlay,
    Done,
}

#[derive(Debug, Clone)]
pub struct Renderer {
    /// Loaded once up front.  `None` when the source failed to load; muted
    /// apps then render without an overlay.
    overlay: Option<RgbaImage>,
    mute_enabled: bool,
}

impl Renderer {
    pub fn new(source: OverlaySource, mute_enabled: bool) -> Self {
        let overlay = match source.load() {
            Ok(overlay) => Some(overlay),
            Err(e) => {
                warn!("render: mute overlay {:?} unavailable: {}", source, e);
                None
            }
        };
        Self {
            overlay,
            mute_enabled,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let overlay = match &config.render.mute_overlay {
            Some(path) => OverlaySource::File(path.clone()),
            None => OverlaySource::Builtin,
        };
        Self::new(overlay, config.capabilities.mute)
    }

    pub fn render(&self, app: Option<&AppEntry>, icons: &IconCache) -> Indicator {
        let Some(app) = app else {
            return Indicator::placeholder();
        };

        let mut canvas = RgbaImage::new(INDICATOR_SIZE, INDICATOR_SIZE);
        let mut layers = Vec::with_capacity(2);
        let mut stage = Stage::TryIcon;

        loop {
            stage = match stage {
                Stage::TryIcon => match icons.get(&app.name).map(decode_data_url) {
                    Some(Ok(icon)) => {
                        imageops::overlay(&mut canvas, &icon, 0, 0);
                        layers.push(Layer::Icon);
                        Stage::TryOverlay
                    }
                    Some(Err(e)) => {
                        debug!("render: icon for {} unusable: {}", app.name, e);
                        Stage::DrawGauge
                    }
                    None => Stage::DrawGauge,
                },
                Stage::DrawGauge => {
                    draw_gauge(&mut canvas, app);
                    layers.push(Layer::Gauge);
                    Stage::TryOverlay
                }
                Stage::TryOverlay => {
                    if app.mute && self.mute_enabled {
                        if let Some(overlay) = &self.overlay {
                            imageops::overlay(&mut canvas, overlay, 0, 0);
                            layers.push(Layer::MuteOverlay);
                        }
                    }
                    Stage::Done
                }
                Stage::Done => break,
            };
        }

        let percent = app.volume_percent();
        Indicator {
            title: app.name.clone(),
            value: format!("{}%", percent),
            percent,
            image: canvas,
            layers,
        }
    }
}

/// Names longer than 16 characters are cut to 13 plus an ellipsis.
pub fn display_name(name: &str) -> String {
    if name.chars().count() > 16 {
        let head: String = name.chars().take(13).collect();
        format!("{}...", head)
    } else {
        name.to_string()
    }
}

fn decode_data_url(url: &str) -> Result<RgbaImage, RenderError> {
    let (meta, data) = url.split_once(',').ok_or(RenderError::NotDataUrl)?;
    if !meta.starts_with("data:") || !meta.ends_with(";base64") {
        return Err(RenderError::NotDataUrl);
    }
    let bytes = STANDARD.decode(data.trim())?;
    let icon = image::load_from_memory(&bytes)?;
    Ok(fit_square(icon.to_rgba8()))
}

fn fit_square(img: RgbaImage) -> RgbaImage {
    if img.dimensions() == (INDICATOR_SIZE, INDICATOR_SIZE) {
        return img;
    }
    imageops::resize(&img, INDICATOR_SIZE, INDICATOR_SIZE, FilterType::Triangle)
}

fn draw_gauge(canvas: &mut RgbaImage, app: &AppEntry) {
    draw_disc(canvas, GAUGE_CX, GAUGE_CY, GAUGE_RADIUS + 8.0, RING_COLOR);
    draw_disc(canvas, GAUGE_CX, GAUGE_CY, GAUGE_RADIUS, DISC_COLOR);
    draw_sector(
        canvas,
        GAUGE_CX,
        GAUGE_CY,
        GAUGE_RADIUS - 4.0,
        app.volume,
        ARC_COLOR,
    );

    let percent = format!("{}%", app.volume_percent());
    let percent_top = (GAUGE_CY + GAUGE_RADIUS + 10.0) as i32;
    draw_text_centered(canvas, &percent, percent_top, 2, TEXT_COLOR);

    let name_top = INDICATOR_SIZE as i32 - 12;
    draw_text_centered(canvas, &display_name(&app.name), name_top, 1, TEXT_COLOR);
}

/// Shaded square with a red slash.
pub fn builtin_mute_overlay() -> RgbaImage {
    let mut img = RgbaImage::from_pixel(INDICATOR_SIZE, INDICATOR_SIZE, OVERLAY_SHADE);
    let inset = INDICATOR_SIZE as f64 * 0.2;
    let far = INDICATOR_SIZE as f64 - inset;
    draw_thick_line(&mut img, far, inset, inset, far, OVERLAY_SLASH, 10.0);
    img
}

// ── Raster helpers ────────────────────────────────────────────────────────────

fn blend_pixel(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let sa = f64::from(src[3]) / 255.0;
    if sa <= 0.0 {
        return dst;
    }
    let da = f64::from(dst[3]) / 255.0;
    let out_a = sa + da * (1.0 - sa);
    let channel = |i: usize| {
        ((f64::from(src[i]) * sa + f64::from(dst[i]) * da * (1.0 - sa)) / out_a)
            .round()
            .clamp(0.0, 255.0) as u8
    };
    Rgba([
        channel(0),
        channel(1),
        channel(2),
        (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}

fn blend_at(img: &mut RgbaImage, x: i32, y: i32, color: Rgba<u8>) {
    if x < 0 || y < 0 || x >= img.width() as i32 || y >= img.height() as i32 {
        return;
    }
    let dst = *img.get_pixel(x as u32, y as u32);
    img.put_pixel(x as u32, y as u32, blend_pixel(dst, color));
}

/// Pixel-centre bounding box of a circle, clipped to the image.
fn circle_bounds(img: &RgbaImage, cx: f64, cy: f64, radius: f64) -> (i32, i32, i32, i32) {
    let max_x = img.width() as i32 - 1;
    let max_y = img.height() as i32 - 1;
    (
        ((cx - radius).floor() as i32).clamp(0, max_x),
        ((cx + radius).ceil() as i32).clamp(0, max_x),
        ((cy - radius).floor() as i32).clamp(0, max_y),
        ((cy + radius).ceil() as i32).clamp(0, max_y),
    )
}

fn draw_disc(img: &mut RgbaImage, cx: f64, cy: f64, radius: f64, color: Rgba<u8>) {
    let (x0, x1, y0, y1) = circle_bounds(img, cx, cy, radius);
    let r2 = radius * radius;
    for y in y0..=y1 {
        for x in x0..=x1 {
            let dx = f64::from(x) + 0.5 - cx;
            let dy = f64::from(y) + 0.5 - cy;
            if dx * dx + dy * dy <= r2 {
                blend_at(img, x, y, color);
            }
        }
    }
}

/// Pie slice starting at 12 o'clock and sweeping clockwise by
/// `fraction × 360°`.
fn draw_sector(img: &mut RgbaImage, cx: f64, cy: f64, radius: f64, fraction: f64, color: Rgba<u8>) {
    let sweep = fraction.clamp(0.0, 1.0) * TAU;
    if sweep <= 0.0 {
        return;
    }
    let (x0, x1, y0, y1) = circle_bounds(img, cx, cy, radius);
    let r2 = radius * radius;
    for y in y0..=y1 {
        for x in x0..=x1 {
            let dx = f64::from(x) + 0.5 - cx;
            let dy = f64::from(y) + 0.5 - cy;
            if dx * dx + dy * dy > r2 {
                continue;
            }
            // Image y grows downwards, so atan2(dx, -dy) is 0 at the top and
            // increases clockwise.
            let mut angle = dx.atan2(-dy);
            if angle < 0.0 {
                angle += TAU;
            }
            if angle <= sweep {
                blend_at(img, x, y, color);
            }
        }
    }
}

fn draw_thick_line(
    img: &mut RgbaImage,
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    color: Rgba<u8>,
    width: f64,
) {
    // Stamping discs would double-blend translucent colours, so collect the
    // covered pixels first and blend each once.
    let dx = x2 - x1;
    let dy = y2 - y1;
    let len2 = dx * dx + dy * dy;
    let half = width / 2.0;
    let (x0, x1b, y0, y1b) = (
        (x1.min(x2) - half).floor().max(0.0) as i32,
        (x1.max(x2) + half).ceil().min(img.width() as f64 - 1.0) as i32,
        (y1.min(y2) - half).floor().max(0.0) as i32,
        (y1.max(y2) + half).ceil().min(img.height() as f64 - 1.0) as i32,
    );
    for y in y0..=y1b {
        for x in x0..=x1b {
            let px = f64::from(x) + 0.5;
            let py = f64::from(y) + 0.5;
            let t = if len2 > 0.0 {
                (((px - x1) * dx + (py - y1) * dy) / len2).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let ex = px - (x1 + dx * t);
            let ey = py - (y1 + dy * t);
            if ex * ex + ey * ey <= half * half {
                blend_at(img, x, y, color);
            }
        }
    }
}

fn draw_text_centered(img: &mut RgbaImage, text: &str, top: i32, scale: u32, color: Rgba<u8>) {
    let scale = scale.max(1) as i32;
    let width = text.chars().count() as i32 * 8 * scale;
    let left = (img.width() as i32 - width) / 2;
    draw_bitmap_text(img, left, top, text, scale, color);
}

fn draw_bitmap_text(img: &mut RgbaImage, x: i32, y: i32, text: &str, scale: i32, color: Rgba<u8>) {
    let mut cursor_x = x;
    for ch in text.chars() {
        let Some(glyph) = BASIC_FONTS.get(ch).or_else(|| BASIC_FONTS.get('?')) else {
            cursor_x += 8 * scale;
            continue;
        };
        for (row_idx, row) in glyph.iter().enumerate() {
            for col in 0..8 {
                if (row >> col) & 1 == 0 {
                    continue;
                }
                let px = cursor_x + col * scale;
                let py = y + row_idx as i32 * scale;
                for sy in 0..scale {
                    for sx in 0..scale {
                        blend_at(img, px + sx, py + sy, color);
                    }
                }
            }
        }
        cursor_x += 8 * scale;
    }
}
