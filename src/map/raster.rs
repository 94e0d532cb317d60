//! Off-screen RGBA rendering of the classified map for snapshot export.
//!
//! The raster mirrors the interactive view's content at print resolution:
//! filled counties at 0.8 alpha over white, black outlines, the West
//! region's inset frames, a north arrow, and a scale bar. Text (legend,
//! labels) lives in the surrounding HTML document instead of the raster.

use image::{Rgba, RgbaImage};

use crate::classify::{Classification, Palette, NO_DATA_COLOR};
use crate::data::{CountyRecord, Region};
use crate::map::geometry::{line_points, scanline_spans};
use crate::map::projection::Viewport;
use crate::map::renderer::{primary_bounds, FrameKind};

const WHITE: Rgba<u8> = Rgba([0xff, 0xff, 0xff, 0xff]);
const BLACK: Rgba<u8> = Rgba([0x00, 0x00, 0x00, 0xff]);

/// County fill opacity over the white page, as the original map used
const FILL_ALPHA: f64 = 0.8;

struct RasterFrame {
    kind: FrameKind,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    viewport: Viewport,
}

fn blend_over_white(color: (u8, u8, u8)) -> Rgba<u8> {
    let mix = |c: u8| (FILL_ALPHA * c as f64 + (1.0 - FILL_ALPHA) * 255.0).round() as u8;
    Rgba([mix(color.0), mix(color.1), mix(color.2), 0xff])
}

fn put(img: &mut RgbaImage, x: i64, y: i64, color: Rgba<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, color);
    }
}

fn frames_for(region: Region, counties: &[CountyRecord], width: u32, height: u32) -> Vec<RasterFrame> {
    let fit = |kind: FrameKind, w: u32, h: u32| match kind.fixed_bounds() {
        Some(bounds) => Viewport::fit(&bounds, w as usize, h as usize),
        None => Viewport::fit(&primary_bounds(counties), w as usize, h as usize),
    };

    if region != Region::West {
        return vec![RasterFrame {
            kind: FrameKind::Primary,
            x: 0,
            y: 0,
            width,
            height,
            viewport: fit(FrameKind::Primary, width, height),
        }];
    }

    // Contiguous states on top, Alaska and Hawaii inset along the bottom
    let main_height = (height as f64 * 0.68) as u32;
    let inset_height = height - main_height - height / 50;
    let inset_y = main_height + height / 100;

    let alaska_x = (width as f64 * 0.30) as u32;
    let alaska_w = (width as f64 * 0.35) as u32;
    let hawaii_x = (width as f64 * 0.70) as u32;
    let hawaii_w = (width as f64 * 0.25) as u32;

    vec![
        RasterFrame {
            kind: FrameKind::Primary,
            x: 0,
            y: 0,
            width,
            height: main_height,
            viewport: fit(FrameKind::Primary, width, main_height),
        },
        RasterFrame {
            kind: FrameKind::Alaska,
            x: alaska_x,
            y: inset_y,
            width: alaska_w,
            height: inset_height,
            viewport: fit(FrameKind::Alaska, alaska_w, inset_height),
        },
        RasterFrame {
            kind: FrameKind::Hawaii,
            x: hawaii_x,
            y: inset_y,
            width: hawaii_w,
            height: inset_height,
            viewport: fit(FrameKind::Hawaii, hawaii_w, inset_height),
        },
    ]
}

/// Render the classified region into an RGBA raster
pub fn render_raster(
    region: Region,
    counties: &[CountyRecord],
    classification: &Classification,
    palette: Palette,
    width: u32,
    height: u32,
) -> RgbaImage {
    let mut img = RgbaImage::from_pixel(width.max(1), height.max(1), WHITE);
    let colors = palette.colors();

    for frame in frames_for(region, counties, width, height) {
        let fw = frame.width as i64;
        let fh = frame.height as i64;
        let (ox, oy) = (frame.x as i64, frame.y as i64);

        for county in counties.iter().filter(|c| frame.kind.admits(&c.state_fips)) {
            let fill = if county.population == 0 {
                blend_over_white(NO_DATA_COLOR)
            } else {
                match classification.class_of(&county.fips) {
                    Some(idx) => blend_over_white(colors[idx as usize]),
                    None => blend_over_white(NO_DATA_COLOR),
                }
            };

            for polygon in &county.polygons {
                let rings: Vec<Vec<(i32, i32)>> = polygon
                    .rings
                    .iter()
                    .map(|ring| {
                        ring.iter()
                            .map(|p| frame.viewport.project(p.x, p.y))
                            .collect()
                    })
                    .collect();

                scanline_spans(&rings, |y, x0, x1| {
                    if y < 0 || y as i64 >= fh {
                        return;
                    }
                    for x in x0.max(0)..=x1.min(fw as i32 - 1) {
                        put(&mut img, ox + x as i64, oy + y as i64, fill);
                    }
                });

                for ring in &rings {
                    for pair in ring.windows(2) {
                        let (x0, y0) = pair[0];
                        let (x1, y1) = pair[1];
                        line_points(x0, y0, x1, y1, |x, y| {
                            if x >= 0 && y >= 0 && (x as i64) < fw && (y as i64) < fh {
                                put(&mut img, ox + x as i64, oy + y as i64, BLACK);
                            }
                        });
                    }
                }
            }
        }

        // Inset frames carry a visible border like the original's spines
        if frame.kind != FrameKind::Primary {
            stroke_rect(&mut img, ox, oy, fw, fh);
        }
    }

    draw_north_arrow(&mut img);
    draw_scale_bar(&mut img);
    img
}

fn stroke_rect(img: &mut RgbaImage, x: i64, y: i64, w: i64, h: i64) {
    for t in 0..2i64 {
        for dx in 0..w {
            put(img, x + dx, y + t, BLACK);
            put(img, x + dx, y + h - 1 - t, BLACK);
        }
        for dy in 0..h {
            put(img, x + t, y + dy, BLACK);
            put(img, x + w - 1 - t, y + dy, BLACK);
        }
    }
}

fn stroke(img: &mut RgbaImage, x0: i64, y0: i64, x1: i64, y1: i64) {
    line_points(x0 as i32, y0 as i32, x1 as i32, y1 as i32, |x, y| {
        put(img, x as i64, y as i64, BLACK);
    });
}

/// Shaft with arrowhead plus an "N" drawn as three strokes, top-right corner
fn draw_north_arrow(img: &mut RgbaImage) {
    let x = img.width() as i64 - 60;
    let top = 34i64;
    let bottom = 74i64;

    stroke(img, x, bottom, x, top);
    stroke(img, x - 6, top + 10, x, top);
    stroke(img, x + 6, top + 10, x, top);

    let (nx, ny) = (x - 34, top);
    stroke(img, nx, ny + 20, nx, ny);
    stroke(img, nx + 14, ny + 20, nx + 14, ny);
    stroke(img, nx, ny, nx + 14, ny + 20);
}

/// Horizontal bar with end ticks, bottom-right corner. The distance label
/// belongs to the exporter's HTML caption.
fn draw_scale_bar(img: &mut RgbaImage) {
    let length = (img.width() / 4) as i64;
    let x1 = img.width() as i64 - 60;
    let x0 = x1 - length;
    let y = img.height() as i64 - 40;

    stroke(img, x0, y, x1, y);
    stroke(img, x0, y - 8, x0, y);
    stroke(img, x1, y - 8, x1, y);
}
