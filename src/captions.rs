// generate caption plates for videos

use std::fs;
use std::path::{Path, PathBuf};

use ab_glyph::{point, Font, FontArc, GlyphId, OutlinedGlyph, PxScale, Rect, ScaleFont};
use image::{ImageFormat, Pixel, Rgba, RgbaImage};

use crate::config::{CaptionStyle, Rgb};
use crate::error::{PipelineError, PipelineWarning};

// covers latin and cyrillic, used whenever the configured font won't load
static BUILTIN_FONT: &[u8] = include_bytes!("../fonts/DejaVuSans.ttf");

pub const MIN_FONT_SIZE: u32 = 20;
pub const MIN_PADDING_X: u32 = 15;
pub const PADDING_Y: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FontOrigin {
    File(PathBuf),
    BuiltIn,
}

/// The font captions are drawn with.
#[derive(Clone)]
pub struct CaptionFont {
    font: FontArc,
    origin: FontOrigin,
}

impl std::fmt::Debug for CaptionFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptionFont").field("origin", &self.origin).finish()
    }
}

impl CaptionFont {
    pub fn builtin() -> Result<CaptionFont, PipelineError> {
        let font = FontArc::try_from_slice(BUILTIN_FONT)
            .map_err(|e| PipelineError::LayoutFailure(format!("built-in font is unreadable: {e}")))?;
        Ok(CaptionFont {
            font,
            origin: FontOrigin::BuiltIn,
        })
    }

    /// Load the font at `path`, or the built-in one if that doesn't work out.
    ///
    /// Falling back changes the character metrics, so it comes with a warning.
    /// Only an unusable built-in font is an error.
    pub fn load(path: Option<&Path>) -> Result<(CaptionFont, Option<PipelineWarning>), PipelineError> {
        let Some(path) = path else {
            tracing::warn!("No caption font configured, using the built-in font.");
            let warning = PipelineWarning::FontFallback {
                path: None,
                reason: "no font configured".to_string(),
            };
            return Ok((CaptionFont::builtin()?, Some(warning)));
        };

        let loaded = fs::read(path)
            .map_err(|e| e.to_string())
            .and_then(|data| FontArc::try_from_vec(data).map_err(|e| e.to_string()));

        match loaded {
            Ok(font) => {
                tracing::info!("Loaded caption font {}", path.display());
                Ok((
                    CaptionFont {
                        font,
                        origin: FontOrigin::File(path.to_path_buf()),
                    },
                    None,
                ))
            }
            Err(reason) => {
                tracing::warn!(
                    "Could not load font {} ({reason}), using the built-in font.",
                    path.display()
                );
                let warning = PipelineWarning::FontFallback {
                    path: Some(path.to_path_buf()),
                    reason,
                };
                Ok((CaptionFont::builtin()?, Some(warning)))
            }
        }
    }

    pub fn origin(&self) -> &FontOrigin {
        &self.origin
    }

    // font_size is an em size in pixels, ab_glyph scales by ascent-descent height
    fn scale(&self, font_size: u32) -> PxScale {
        let units_per_em = self.font.units_per_em().unwrap_or(1000.0);
        PxScale::from(font_size as f32 * self.font.height_unscaled() / units_per_em)
    }

    /// Lay out one line of text on a baseline at the font's ascent.
    fn shape(&self, text: &str, font_size: u32) -> Shaped {
        let scale = self.scale(font_size);
        let scaled = self.font.as_scaled(scale);

        let mut caret = 0.0;
        let mut previous: Option<GlyphId> = None;
        let mut glyphs = Vec::new();
        for c in text.chars().filter(|c| !c.is_control()) {
            let id = scaled.glyph_id(c);
            if let Some(previous) = previous {
                caret += scaled.kern(previous, id);
            }
            let glyph = id.with_scale_and_position(scale, point(caret, scaled.ascent()));
            caret += scaled.h_advance(id);
            previous = Some(id);
            if let Some(outlined) = self.font.outline_glyph(glyph) {
                glyphs.push(outlined);
            }
        }

        let bounds = glyphs.iter().map(OutlinedGlyph::px_bounds).reduce(|a, b| Rect {
            min: point(a.min.x.min(b.min.x), a.min.y.min(b.min.y)),
            max: point(a.max.x.max(b.max.x), a.max.y.max(b.max.y)),
        });

        Shaped { glyphs, bounds }
    }

    fn measure(&self, text: &str, font_size: u32) -> Ink {
        Ink::of(self.shape(text, font_size).bounds)
    }

    fn advance(&self, c: char, font_size: u32) -> f32 {
        let scaled = self.font.as_scaled(self.scale(font_size));
        scaled.h_advance(scaled.glyph_id(c))
    }
}

struct Shaped {
    glyphs: Vec<OutlinedGlyph>,
    bounds: Option<Rect>,
}

// tight pixel box of a line's ink. empty lines have none.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Ink {
    left: i32,
    top: i32,
    width: u32,
    height: u32,
}

impl Ink {
    fn of(bounds: Option<Rect>) -> Ink {
        match bounds {
            // px_bounds are whole pixels already
            Some(rect) => Ink {
                left: rect.min.x as i32,
                top: rect.min.y as i32,
                width: (rect.max.x - rect.min.x).max(0.0) as u32,
                height: (rect.max.y - rect.min.y).max(0.0) as u32,
            },
            None => Ink::default(),
        }
    }
}

/// Sizes derived from the video the caption goes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutMetrics {
    /// Widest a line of text may be, 90% of the video width.
    pub max_width: u32,
    /// 4% of the video height, never below 20px.
    pub font_size: u32,
    pub padding_x: u32,
    pub padding_y: u32,
    pub corner_radius: u32,
}

impl LayoutMetrics {
    pub fn for_canvas(canvas_width: u32, canvas_height: u32) -> LayoutMetrics {
        let font_size = ((canvas_height as f64 * 0.04) as u32).max(MIN_FONT_SIZE);
        LayoutMetrics {
            max_width: (canvas_width as f64 * 0.9) as u32,
            font_size,
            padding_x: ((canvas_width as f64 * 0.02) as u32).max(MIN_PADDING_X),
            padding_y: PADDING_Y,
            corner_radius: font_size / 2,
        }
    }
}

/// One wrapped line and the plate behind it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineLayout {
    pub text: String,
    pub text_width: u32,
    pub text_height: u32,
    pub box_width: u32,
    pub box_height: u32,
    /// Left edge of the plate inside the caption image (plates are centered).
    pub x: u32,
    /// Top edge of the plate inside the caption image.
    pub y: u32,
    /// Where the ink box starts relative to the pen origin.
    pub ink_left: i32,
    pub ink_top: i32,
}

/// A full caption, ready to rasterize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionLayout {
    pub metrics: LayoutMetrics,
    pub chars_per_line: usize,
    pub lines: Vec<LineLayout>,
    pub width: u32,
    pub height: u32,
}

/// A filled rounded rectangle. Stacked lines of equal width share one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plate {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Wrap and measure `text` for a video of the given size.
pub fn layout_caption(font: &CaptionFont, text: &str, canvas_width: u32, canvas_height: u32) -> CaptionLayout {
    let metrics = LayoutMetrics::for_canvas(canvas_width, canvas_height);

    // how many characters fit, going by the width of an 'x'
    let mut avg_char_width = font.advance('x', metrics.font_size);
    if avg_char_width <= 0.0 {
        avg_char_width = 1.0;
    }
    let chars_per_line = ((metrics.max_width as f32 / avg_char_width) as usize).max(1);

    let lines = wrap_text(font, text, chars_per_line, &metrics);

    let measured: Vec<(String, Ink)> = lines
        .into_iter()
        .map(|line| {
            let ink = font.measure(&line, metrics.font_size);
            (line, ink)
        })
        .collect();

    let width = measured
        .iter()
        .map(|(_, ink)| ink.width + metrics.padding_x * 2)
        .max()
        .unwrap_or(metrics.padding_x * 2);

    let mut y = 0;
    let mut laid = Vec::with_capacity(measured.len());
    for (text, ink) in measured {
        let box_width = ink.width + metrics.padding_x * 2;
        let box_height = ink.height + metrics.padding_y * 2;
        laid.push(LineLayout {
            text,
            text_width: ink.width,
            text_height: ink.height,
            box_width,
            box_height,
            x: (width - box_width) / 2,
            y,
            ink_left: ink.left,
            ink_top: ink.top,
        });
        y += box_height;
    }

    CaptionLayout {
        metrics,
        chars_per_line,
        lines: laid,
        width,
        height: y,
    }
}

/// Greedy word wrap by character count, then by measured width.
///
/// Newlines are just whitespace here. A single word wider than the limit gets
/// a line to itself and overflows.
fn wrap_text(font: &CaptionFont, text: &str, chars_per_line: usize, metrics: &LayoutMetrics) -> Vec<String> {
    let mut lines = Vec::new();
    for line in wrap_by_chars(text, chars_per_line) {
        // the 'x' estimate is only an estimate, wide glyphs can still overflow
        if font.measure(&line, metrics.font_size).width <= metrics.max_width {
            lines.push(line);
        } else {
            lines.extend(fit_to_width(font, &line, metrics));
        }
    }

    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

// plain first-fit packing, no rebalancing of earlier lines
fn wrap_by_chars(text: &str, chars_per_line: usize) -> Vec<String> {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let options = textwrap::Options::new(chars_per_line)
        .break_words(false)
        .wrap_algorithm(textwrap::WrapAlgorithm::FirstFit);
    textwrap::wrap(&flat, options)
        .into_iter()
        .map(|line| line.into_owned())
        .collect()
}

fn fit_to_width(font: &CaptionFont, line: &str, metrics: &LayoutMetrics) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in line.split_whitespace() {
        if current.is_empty() {
            current.push_str(word);
            continue;
        }
        let candidate = format!("{current} {word}");
        if font.measure(&candidate, metrics.font_size).width <= metrics.max_width {
            current = candidate;
        } else {
            lines.push(std::mem::replace(&mut current, word.to_string()));
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

impl CaptionLayout {
    /// Background plates, one per run of stacked lines sharing x and width.
    pub fn plates(&self) -> Vec<Plate> {
        let mut plates: Vec<Plate> = Vec::new();
        for line in &self.lines {
            match plates.last_mut() {
                Some(plate)
                    if plate.x == line.x
                        && plate.width == line.box_width
                        && plate.y + plate.height == line.y =>
                {
                    plate.height += line.box_height;
                }
                _ => plates.push(Plate {
                    x: line.x,
                    y: line.y,
                    width: line.box_width,
                    height: line.box_height,
                }),
            }
        }
        plates
    }
}

/// Draw the caption onto a transparent canvas of exactly the layout's size.
pub fn rasterize(font: &CaptionFont, layout: &CaptionLayout, style: &CaptionStyle) -> RgbaImage {
    let mut image = RgbaImage::new(layout.width, layout.height);

    for plate in layout.plates() {
        fill_rounded_rect(&mut image, &plate, layout.metrics.corner_radius, style.background);
    }

    let metrics = &layout.metrics;
    for line in &layout.lines {
        // put the ink box exactly inside the padding, which centers it both ways
        let dx = (line.x + metrics.padding_x) as i64 - line.ink_left as i64;
        let dy = (line.y + metrics.padding_y) as i64 - line.ink_top as i64;

        for glyph in font.shape(&line.text, metrics.font_size).glyphs {
            let bounds = glyph.px_bounds();
            let (left, top) = (bounds.min.x as i64 + dx, bounds.min.y as i64 + dy);
            glyph.draw(|x, y, coverage| {
                blend(&mut image, left + x as i64, top + y as i64, style.text, coverage);
            });
        }
    }

    image
}

fn fill_rounded_rect(image: &mut RgbaImage, plate: &Plate, radius: u32, color: Rgb) {
    let radius = radius.min(plate.width / 2).min(plate.height / 2) as f32;
    let (left, top) = (plate.x as f32, plate.y as f32);
    let (right, bottom) = (left + plate.width as f32, top + plate.height as f32);

    for py in plate.y..plate.y + plate.height {
        for px in plate.x..plate.x + plate.width {
            let coverage = if radius < 0.5 {
                1.0
            } else {
                // distance from the pixel center to the nearest point of the inner rectangle
                let cx = px as f32 + 0.5;
                let cy = py as f32 + 0.5;
                let nx = cx.clamp(left + radius, right - radius);
                let ny = cy.clamp(top + radius, bottom - radius);
                let distance = ((cx - nx).powi(2) + (cy - ny).powi(2)).sqrt();
                (radius - distance + 0.5).clamp(0.0, 1.0)
            };
            blend(image, px as i64, py as i64, color, coverage);
        }
    }
}

fn blend(image: &mut RgbaImage, x: i64, y: i64, (r, g, b): Rgb, coverage: f32) {
    if coverage <= 0.0 || x < 0 || y < 0 || x >= image.width() as i64 || y >= image.height() as i64 {
        return;
    }
    let alpha = (coverage.min(1.0) * 255.0).round() as u8;
    image.get_pixel_mut(x as u32, y as u32).blend(&Rgba([r, g, b, alpha]));
}

/// Lay out, draw and save a caption as a PNG with alpha at `output`.
pub fn render_caption(
    font: &CaptionFont,
    text: &str,
    canvas_width: u32,
    canvas_height: u32,
    style: &CaptionStyle,
    output: &Path,
) -> Result<CaptionLayout, PipelineError> {
    let layout = layout_caption(font, text, canvas_width, canvas_height);
    tracing::info!(
        "Caption laid out in {} line(s), {}x{} at {}px.",
        layout.lines.len(),
        layout.width,
        layout.height,
        layout.metrics.font_size
    );
    for line in &layout.lines {
        tracing::debug!("Line ({}px): {}", line.text_width, line.text);
    }

    let image = rasterize(font, &layout, style);
    image
        .save_with_format(output, ImageFormat::Png)
        .map_err(|e| PipelineError::LayoutFailure(format!("could not write {}: {e}", output.display())))?;
    Ok(layout)
}
