//! Watermark band rendering and per-frame compositing.
//!
//! A [`WatermarkConfig`] describes one horizontal band - background fill
//! plus a line of text - attached to every output frame. The band raster is
//! rendered exactly once per run by [`Compositor::new`] and then stamped
//! onto each frame, because it is invariant across the frames of a run.
//!
//! With no watermark selected the compositor is the identity transform at
//! the source's own size: a straight copy into the target buffer.

use std::path::PathBuf;

use ab_glyph::{FontArc, PxScale};
use image::{Rgba, RgbaImage, imageops};
use imageproc::drawing::{draw_text_mut, text_size};
use serde::{Deserialize, Serialize};

/// Where the band sits relative to the source frame.
///
/// `Top` and `Bottom` overlay the band inside the existing bounds; `Above`
/// and `Below` extend the canvas by the band height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatermarkLocation {
    /// Overlay at the top edge of the frame.
    Top,
    /// Overlay at the bottom edge of the frame.
    #[default]
    Bottom,
    /// Extend the canvas upward; the source shifts down.
    Above,
    /// Extend the canvas downward.
    Below,
}

/// Horizontal alignment of the band text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    /// Anchor text at the left edge.
    Left,
    /// Center text in the band.
    #[default]
    Center,
    /// Anchor text at the right edge.
    Right,
}

/// One user-defined watermark preset.
///
/// Owned and edited by the caller in an ordered collection; a run selects
/// one by index and treats it as read-only. Unparsable colors fall back to
/// defaults and a missing or unloadable font renders the band without text;
/// a malformed preset never aborts a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatermarkConfig {
    /// Display name of the preset.
    pub name: String,
    /// Band placement.
    pub location: WatermarkLocation,
    /// Band fill color as `#rrggbb` or `#rrggbbaa`.
    pub background_color: String,
    /// Band height in pixels.
    pub height: u32,
    /// Path to a TTF/OTF font file; `None` renders the band without text.
    pub font_file: Option<PathBuf>,
    /// Text size in pixels.
    pub font_size: f32,
    /// The text to render.
    pub text: String,
    /// Text color as `#rrggbb` or `#rrggbbaa`.
    pub text_color: String,
    /// Horizontal text alignment.
    pub text_align: TextAlign,
}

/// Parse `#rrggbb` / `#rrggbbaa`; `None` when malformed.
fn parse_color(value: &str) -> Option<Rgba<u8>> {
    let hex = value.strip_prefix('#')?;
    let channel = |offset: usize| u8::from_str_radix(hex.get(offset..offset + 2)?, 16).ok();
    match hex.len() {
        6 => Some(Rgba([channel(0)?, channel(2)?, channel(4)?, 0xFF])),
        8 => Some(Rgba([channel(0)?, channel(2)?, channel(4)?, channel(6)?])),
        _ => None,
    }
}

/// Render the band raster for a config at the given width.
fn render_band(config: &WatermarkConfig, width: u32) -> RgbaImage {
    let background = parse_color(&config.background_color).unwrap_or_else(|| {
        log::warn!(
            "watermark '{}': unparsable background color {:?}, using black",
            config.name,
            config.background_color
        );
        Rgba([0, 0, 0, 0xFF])
    });
    let mut band = RgbaImage::from_pixel(width, config.height, background);

    if config.text.is_empty() {
        return band;
    }

    let font = match &config.font_file {
        Some(path) => match std::fs::read(path).map_err(|e| e.to_string()).and_then(|bytes| {
            FontArc::try_from_vec(bytes).map_err(|e| e.to_string())
        }) {
            Ok(font) => font,
            Err(reason) => {
                log::warn!(
                    "watermark '{}': cannot load font {}: {reason}; rendering band without text",
                    config.name,
                    path.display()
                );
                return band;
            }
        },
        None => return band,
    };

    let text_color = parse_color(&config.text_color).unwrap_or_else(|| {
        log::warn!(
            "watermark '{}': unparsable text color {:?}, using white",
            config.name,
            config.text_color
        );
        Rgba([0xFF, 0xFF, 0xFF, 0xFF])
    });

    let scale = PxScale::from(config.font_size.max(1.0));
    let (text_width, text_height) = text_size(scale, &font, &config.text);

    let x = match config.text_align {
        TextAlign::Left => 0,
        TextAlign::Center => (width as i32 - text_width as i32) / 2,
        TextAlign::Right => width as i32 - text_width as i32,
    };
    // Text anchored vertically at the band's mid-line.
    let y = (config.height as i32 - text_height as i32) / 2;

    draw_text_mut(&mut band, text_color, x, y, scale, &font, &config.text);
    band
}

/// Composites source frames (and optionally a cached watermark band) into
/// raw RGBA output slices.
///
/// Built once per run via [`Compositor::new`]; compositing itself never
/// fails on a valid raster input.
pub struct Compositor {
    output_width: u32,
    output_height: u32,
    source_width: u32,
    source_height: u32,
    /// Vertical offset of the source frame in the output canvas.
    source_top: u32,
    /// Cached band raster, its vertical offset, and whether it alpha-blends
    /// over the frame (`top`/`bottom`) or occupies its own rows
    /// (`above`/`below`).
    band: Option<(RgbaImage, u32, bool)>,
    scratch: RgbaImage,
}

impl Compositor {
    /// Build a compositor for the given watermark (or `None`) and source
    /// raster size.
    pub fn new(watermark: Option<&WatermarkConfig>, source_width: u32, source_height: u32) -> Self {
        let watermark = watermark.filter(|config| config.height > 0);

        let Some(config) = watermark else {
            return Self {
                output_width: source_width,
                output_height: source_height,
                source_width,
                source_height,
                source_top: 0,
                band: None,
                scratch: RgbaImage::new(source_width, source_height),
            };
        };

        let band = render_band(config, source_width);
        let band_height = config.height;

        let (output_height, source_top, band_top, blended) = match config.location {
            WatermarkLocation::Above => (source_height + band_height, band_height, 0, false),
            WatermarkLocation::Below => (source_height + band_height, 0, source_height, false),
            WatermarkLocation::Top => (source_height, 0, 0, true),
            WatermarkLocation::Bottom => (
                source_height,
                0,
                source_height.saturating_sub(band_height),
                true,
            ),
        };

        log::debug!(
            "watermark '{}' at {:?}: output {}x{}, band offset {}",
            config.name,
            config.location,
            source_width,
            output_height,
            band_top
        );

        Self {
            output_width: source_width,
            output_height,
            source_width,
            source_height,
            source_top,
            band: Some((band, band_top, blended)),
            scratch: RgbaImage::new(source_width, output_height),
        }
    }

    /// Output canvas width in pixels.
    pub fn output_width(&self) -> u32 {
        self.output_width
    }

    /// Output canvas height in pixels (source height plus the band height
    /// for `above`/`below` placements).
    pub fn output_height(&self) -> u32 {
        self.output_height
    }

    /// Bytes per composited RGBA frame.
    pub fn frame_bytes(&self) -> usize {
        self.output_width as usize * self.output_height as usize * 4
    }

    /// Offset at which the source frame is drawn.
    pub fn source_offset(&self) -> (u32, u32) {
        (0, self.source_top)
    }

    /// Offset at which the band is drawn, if a watermark is active.
    pub fn band_offset(&self) -> Option<(u32, u32)> {
        self.band.as_ref().map(|(_, top, _)| (0, *top))
    }

    /// Composite one source frame into `out`, which must hold exactly
    /// [`frame_bytes`](Compositor::frame_bytes) bytes.
    pub fn composite_into(&mut self, frame: &RgbaImage, out: &mut [u8]) {
        debug_assert_eq!(
            (frame.width(), frame.height()),
            (self.source_width, self.source_height)
        );
        debug_assert_eq!(out.len(), self.frame_bytes());

        imageops::replace(&mut self.scratch, frame, 0, self.source_top as i64);

        if let Some((band, band_top, blended)) = &self.band {
            if *blended {
                imageops::overlay(&mut self.scratch, band, 0, *band_top as i64);
            } else {
                imageops::replace(&mut self.scratch, band, 0, *band_top as i64);
            }
        }

        out.copy_from_slice(self.scratch.as_raw());
    }
}
