use crate::config::toml_config::RenderConfig;
use crate::domain::model::{DensityGrid, Extent, Facet};
use crate::spatial::density::band_level;
use crate::utils::error::Result;
use geo::{Contains, MultiPolygon, Point};
use image::{ImageBuffer, ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use std::io::Cursor;

const GUTTER: u32 = 8;
const STRIP_HEIGHT: u32 = 22;
const PLOT_MARGIN: u32 = 6;
const GLYPH_SCALE: u32 = 3;

const BACKGROUND: Rgb<u8> = Rgb([235, 235, 235]);
const PANEL: Rgb<u8> = Rgb([255, 255, 255]);
const STRIP: Rgb<u8> = Rgb([217, 217, 217]);
const STRIP_TEXT: Rgb<u8> = Rgb([26, 26, 26]);
const OUTLINE: Rgb<u8> = Rgb([64, 64, 64]);
const POINT: Rgb<u8> = Rgb([33, 33, 33]);

/// Yellow-orange-red ramp, low to high.
const RAMP: [[f64; 3]; 5] = [
    [255.0, 255.0, 178.0],
    [254.0, 204.0, 92.0],
    [253.0, 141.0, 60.0],
    [240.0, 59.0, 32.0],
    [189.0, 0.0, 38.0],
];

/// 3x5 digit glyphs, one row per byte, high bit on the left.
const DIGITS: [[u8; 5]; 10] = [
    [0b111, 0b101, 0b101, 0b101, 0b111],
    [0b010, 0b110, 0b010, 0b010, 0b111],
    [0b111, 0b001, 0b111, 0b100, 0b111],
    [0b111, 0b001, 0b111, 0b001, 0b111],
    [0b101, 0b101, 0b111, 0b001, 0b001],
    [0b111, 0b100, 0b111, 0b001, 0b111],
    [0b111, 0b100, 0b111, 0b101, 0b111],
    [0b111, 0b001, 0b001, 0b001, 0b001],
    [0b111, 0b101, 0b111, 0b101, 0b111],
    [0b111, 0b101, 0b111, 0b001, 0b111],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub columns: u32,
    pub rows: u32,
    pub width: u32,
    pub height: u32,
    pub panel_size: u32,
}

impl Layout {
    /// `columns` defaults to `ceil(sqrt(panels))`, like a wrapped facet grid.
    pub fn new(panels: usize, columns: Option<usize>, panel_size: u32) -> Self {
        let panels = panels.max(1);
        let columns = columns
            .unwrap_or_else(|| (panels as f64).sqrt().ceil() as usize)
            .clamp(1, panels) as u32;
        let rows = (panels as u32).div_ceil(columns);

        Self {
            columns,
            rows,
            width: columns * panel_size + (columns + 1) * GUTTER,
            height: rows * (panel_size + STRIP_HEIGHT) + (rows + 1) * GUTTER,
            panel_size,
        }
    }

    /// Top-left corner of panel `index` (strip included).
    pub fn panel_origin(&self, index: usize) -> (u32, u32) {
        let col = index as u32 % self.columns;
        let row = index as u32 / self.columns;
        (
            GUTTER + col * (self.panel_size + GUTTER),
            GUTTER + row * (self.panel_size + STRIP_HEIGHT + GUTTER),
        )
    }
}

/// Equal-aspect mapping between planar metres and pixels inside a plot area.
#[derive(Debug, Clone, Copy)]
pub struct PlotTransform {
    extent: Extent,
    scale: f64,
    offset_x: f64,
    offset_y: f64,
    size: u32,
}

impl PlotTransform {
    pub fn new(extent: Extent, size: u32) -> Self {
        let size_f = size as f64;
        let scale = size_f / extent.width().max(extent.height());
        Self {
            extent,
            scale,
            offset_x: (size_f - extent.width() * scale) / 2.0,
            offset_y: (size_f - extent.height() * scale) / 2.0,
            size,
        }
    }

    /// Pixel position relative to the plot area's top-left corner.
    pub fn to_pixel(&self, x: f64, y: f64) -> (f32, f32) {
        (
            (self.offset_x + (x - self.extent.min_x) * self.scale) as f32,
            (self.offset_y + (self.extent.max_y - y) * self.scale) as f32,
        )
    }

    /// World position of the centre of pixel `(px, py)`.
    pub fn to_world(&self, px: u32, py: u32) -> (f64, f64) {
        (
            self.extent.min_x + (px as f64 + 0.5 - self.offset_x) / self.scale,
            self.extent.max_y - (py as f64 + 0.5 - self.offset_y) / self.scale,
        )
    }
}

pub fn ramp_color(t: f64) -> [f64; 3] {
    let t = t.clamp(0.0, 1.0) * (RAMP.len() - 1) as f64;
    let lo = t.floor() as usize;
    let hi = (lo + 1).min(RAMP.len() - 1);
    let f = t - lo as f64;
    [0, 1, 2].map(|c| RAMP[lo][c] + (RAMP[hi][c] - RAMP[lo][c]) * f)
}

fn blend(base: Rgb<u8>, color: [f64; 3], alpha: f64) -> Rgb<u8> {
    Rgb([0, 1, 2].map(|c| (base[c] as f64 * (1.0 - alpha) + color[c] * alpha).round() as u8))
}

pub struct FacetRenderer<'a> {
    settings: &'a RenderConfig,
    outline: &'a MultiPolygon<f64>,
    breaks: &'a [f64],
    transform: PlotTransform,
    mask: Option<Vec<bool>>,
}

impl<'a> FacetRenderer<'a> {
    pub fn new(
        settings: &'a RenderConfig,
        outline: &'a MultiPolygon<f64>,
        breaks: &'a [f64],
        extent: Extent,
    ) -> Self {
        let plot_size = settings.panel_size.saturating_sub(2 * PLOT_MARGIN).max(1);
        let transform = PlotTransform::new(extent, plot_size);

        // 所有分面共用同一個範圍，遮罩只算一次
        let mask = settings.clip_to_outline.then(|| {
            (0..plot_size * plot_size)
                .map(|idx| {
                    let (x, y) = transform.to_world(idx % plot_size, idx / plot_size);
                    outline.contains(&Point::new(x, y))
                })
                .collect()
        });

        Self {
            settings,
            outline,
            breaks,
            transform,
            mask,
        }
    }

    /// Draw every facet in order; with no facets, one outline-only panel.
    pub fn render(&self, facets: &[Facet]) -> RgbImage {
        let layout = Layout::new(facets.len(), self.settings.columns, self.settings.panel_size);
        let mut image: RgbImage = ImageBuffer::from_pixel(layout.width, layout.height, BACKGROUND);

        if facets.is_empty() {
            self.draw_panel(&mut image, layout.panel_origin(0), None);
        }
        for (index, facet) in facets.iter().enumerate() {
            self.draw_panel(&mut image, layout.panel_origin(index), Some(facet));
        }

        image
    }

    fn draw_panel(&self, image: &mut RgbImage, origin: (u32, u32), facet: Option<&Facet>) {
        let (left, top) = origin;
        let size = self.settings.panel_size;

        draw_filled_rect_mut(
            image,
            Rect::at(left as i32, top as i32).of_size(size, STRIP_HEIGHT),
            STRIP,
        );
        draw_filled_rect_mut(
            image,
            Rect::at(left as i32, (top + STRIP_HEIGHT) as i32).of_size(size, size),
            PANEL,
        );

        let plot_left = left + PLOT_MARGIN;
        let plot_top = top + STRIP_HEIGHT + PLOT_MARGIN;

        if let Some(facet) = facet {
            draw_year(image, facet.year, left + size / 2, top + STRIP_HEIGHT / 2);
            self.fill_density(image, (plot_left, plot_top), &facet.density);
        }

        self.stroke_outline(image, (plot_left, plot_top));

        if let Some(facet) = facet.filter(|_| self.settings.show_points) {
            for &(x, y) in &facet.points {
                let (px, py) = self.transform.to_pixel(x, y);
                let center = (plot_left as i32 + px.round() as i32, plot_top as i32 + py.round() as i32);
                if self.settings.point_radius > 0 {
                    draw_filled_circle_mut(image, center, self.settings.point_radius, POINT);
                } else if center.0 >= 0
                    && center.1 >= 0
                    && (center.0 as u32) < image.width()
                    && (center.1 as u32) < image.height()
                {
                    image.put_pixel(center.0 as u32, center.1 as u32, POINT);
                }
            }
        }
    }

    fn fill_density(&self, image: &mut RgbImage, plot_origin: (u32, u32), density: &DensityGrid) {
        let size = self.transform.size;
        let top_level = self.breaks.len().saturating_sub(2).max(1) as f64;

        for py in 0..size {
            for px in 0..size {
                if let Some(mask) = &self.mask {
                    if !mask[(py * size + px) as usize] {
                        continue;
                    }
                }

                let (x, y) = self.transform.to_world(px, py);
                let Some(level) = band_level(density.sample(x, y), self.breaks) else {
                    continue;
                };

                let t = (level - 1) as f64 / (top_level - 1.0).max(1.0);
                let alpha = 0.35 + 0.6 * (level as f64 / top_level);
                let (ix, iy) = (plot_origin.0 + px, plot_origin.1 + py);
                let base = *image.get_pixel(ix, iy);
                image.put_pixel(ix, iy, blend(base, ramp_color(t), alpha.min(0.95)));
            }
        }
    }

    fn stroke_outline(&self, image: &mut RgbImage, plot_origin: (u32, u32)) {
        let (ox, oy) = (plot_origin.0 as f32, plot_origin.1 as f32);
        for polygon in &self.outline.0 {
            let rings = std::iter::once(polygon.exterior()).chain(polygon.interiors());
            for ring in rings {
                for line in ring.lines() {
                    let (x0, y0) = self.transform.to_pixel(line.start.x, line.start.y);
                    let (x1, y1) = self.transform.to_pixel(line.end.x, line.end.y);
                    draw_line_segment_mut(image, (ox + x0, oy + y0), (ox + x1, oy + y1), OUTLINE);
                }
            }
        }
    }
}

/// Year label centred on `(cx, cy)`.
fn draw_year(image: &mut RgbImage, year: i32, cx: u32, cy: u32) {
    let text = year.to_string();
    let glyph_w = 3 * GLYPH_SCALE;
    let glyph_h = 5 * GLYPH_SCALE;
    let advance = glyph_w + GLYPH_SCALE;
    let width = text.len() as u32 * advance - GLYPH_SCALE;
    let left = cx.saturating_sub(width / 2);
    let top = cy.saturating_sub(glyph_h / 2);

    for (n, ch) in text.chars().enumerate() {
        let Some(digit) = ch.to_digit(10) else {
            continue;
        };
        let glyph = DIGITS[digit as usize];
        let gx = left + n as u32 * advance;
        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..3u32 {
                if bits & (0b100 >> col) != 0 {
                    draw_filled_rect_mut(
                        image,
                        Rect::at(
                            (gx + col * GLYPH_SCALE) as i32,
                            (top + row as u32 * GLYPH_SCALE) as i32,
                        )
                        .of_size(GLYPH_SCALE, GLYPH_SCALE),
                        STRIP_TEXT,
                    );
                }
            }
        }
    }
}

pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    image.write_to(&mut cursor, ImageFormat::Png)?;
    Ok(cursor.into_inner())
}
