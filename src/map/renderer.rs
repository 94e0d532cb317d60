use glam::DVec2;
use rayon::prelude::*;

use crate::braille::BrailleCanvas;
use crate::classify::{Classification, CLASS_COUNT};
use crate::data::{Bounds, CountyRecord, Polygon, Region, StateRecord, ALASKA_FIPS, HAWAII_FIPS};
use crate::map::geometry::{draw_line, fill_polygon};
use crate::map::projection::Viewport;

/// Which sub-area of the map panel a frame draws. Alaska and Hawaii render
/// in fixed inset windows for the West region; the data model itself does
/// not distinguish them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameKind {
    Primary,
    Alaska,
    Hawaii,
}

impl FrameKind {
    pub fn title(self) -> &'static str {
        match self {
            FrameKind::Primary => "",
            FrameKind::Alaska => "Alaska",
            FrameKind::Hawaii => "Hawaii",
        }
    }

    /// Fixed lon/lat windows for the inset frames
    pub fn fixed_bounds(self) -> Option<Bounds> {
        match self {
            FrameKind::Primary => None,
            FrameKind::Alaska => Some(Bounds::new(
                DVec2::new(-190.0, 50.0),
                DVec2::new(-125.0, 73.0),
            )),
            FrameKind::Hawaii => Some(Bounds::new(
                DVec2::new(-162.0, 18.0),
                DVec2::new(-154.0, 23.0),
            )),
        }
    }

    /// Whether a county of the given state renders in this frame
    pub fn admits(self, state_fips: &str) -> bool {
        match self {
            FrameKind::Primary => state_fips != ALASKA_FIPS && state_fips != HAWAII_FIPS,
            FrameKind::Alaska => state_fips == ALASKA_FIPS,
            FrameKind::Hawaii => state_fips == HAWAII_FIPS,
        }
    }
}

/// One drawable sub-area of the map panel, positioned in character cells
/// relative to the panel's inner origin
#[derive(Clone)]
pub struct Frame {
    pub kind: FrameKind,
    pub col: u16,
    pub row: u16,
    pub width: u16,
    pub height: u16,
    pub viewport: Viewport,
}

impl Frame {
    pub fn contains(&self, col: u16, row: u16) -> bool {
        col >= self.col
            && col < self.col + self.width
            && row >= self.row
            && row < self.row + self.height
    }

    /// Panel-relative character cell -> data coordinates (lon/lat).
    /// Cells are 2x4 Braille dots; the cell center is sampled.
    pub fn cursor_to_data(&self, col: u16, row: u16) -> DVec2 {
        let px = (col.saturating_sub(self.col)) as i32 * 2 + 1;
        let py = (row.saturating_sub(self.row)) as i32 * 4 + 2;
        let (lon, lat) = self.viewport.unproject(px, py);
        DVec2::new(lon, lat)
    }
}

/// Union of bounds over the counties the primary frame admits
pub fn primary_bounds(counties: &[CountyRecord]) -> Bounds {
    let mut bounds = Bounds::empty();
    for county in counties {
        if FrameKind::Primary.admits(&county.state_fips) {
            bounds.union(&county.bounds());
        }
    }
    bounds
}

/// Compute the frame layout for a panel of inner size (width, height) in
/// character cells. The primary viewport keeps its center/zoom and is
/// resized; inset viewports are refit to their fixed windows. West gets the
/// Alaska and Hawaii insets along the bottom, everyone else a single frame.
pub fn layout_frames(
    region: Region,
    primary_viewport: &Viewport,
    width: u16,
    height: u16,
) -> Vec<Frame> {
    let mut primary = primary_viewport.clone();

    if region != Region::West || height < 8 {
        primary.width = width as usize * 2;
        primary.height = height as usize * 4;
        return vec![Frame {
            kind: FrameKind::Primary,
            col: 0,
            row: 0,
            width,
            height,
            viewport: primary,
        }];
    }

    // Bottom strip for the insets, roughly a quarter of the panel
    let inset_height = (height as f32 * 0.28).round().max(5.0) as u16;
    let main_height = height - inset_height;
    primary.width = width as usize * 2;
    primary.height = main_height as usize * 4;

    let mut frames = vec![Frame {
        kind: FrameKind::Primary,
        col: 0,
        row: 0,
        width,
        height: main_height,
        viewport: primary,
    }];

    for (kind, frac_x, frac_w) in [
        (FrameKind::Alaska, 0.30, 0.35),
        (FrameKind::Hawaii, 0.70, 0.25),
    ] {
        let col = (width as f32 * frac_x) as u16;
        let frame_width = ((width as f32 * frac_w) as u16).max(4);
        let bounds = kind.fixed_bounds().unwrap();
        frames.push(Frame {
            kind,
            col,
            row: main_height,
            width: frame_width,
            height: inset_height,
            viewport: Viewport::fit(&bounds, frame_width as usize * 2, inset_height as usize * 4),
        });
    }

    frames
}

/// Layered Braille output for one frame. Each class gets its own canvas so
/// the widget can color layers independently.
pub struct MapLayers {
    pub classes: Vec<BrailleCanvas>,
    pub no_data: BrailleCanvas,
    pub outlines: BrailleCanvas,
}

/// Project a polygon's rings into frame pixel space
fn project_rings(polygon: &Polygon, viewport: &Viewport) -> Vec<Vec<(i32, i32)>> {
    polygon
        .rings
        .iter()
        .map(|ring| ring.iter().map(|p| viewport.project(p.x, p.y)).collect())
        .collect()
}

/// Whether any part of the polygon's bbox can land on the canvas
fn bbox_on_canvas(polygon: &Polygon, viewport: &Viewport) -> bool {
    let (x0, y0) = viewport.project(polygon.bbox.min.x, polygon.bbox.max.y);
    let (x1, y1) = viewport.project(polygon.bbox.max.x, polygon.bbox.min.y);
    x1 >= 0 && x0 < viewport.width as i32 && y1 >= 0 && y0 < viewport.height as i32
}

/// Render the counties of one frame. With a classification the fills go to
/// the class layers (zero-population counties to the gray no-data layer);
/// without one only the outlines are drawn, matching the initial view.
pub fn render_frame(
    counties: &[CountyRecord],
    classification: Option<&Classification>,
    frame: &Frame,
) -> MapLayers {
    let width = frame.width as usize;
    let height = frame.height as usize;
    let viewport = &frame.viewport;

    let admitted: Vec<&CountyRecord> = counties
        .iter()
        .filter(|c| frame.kind.admits(&c.state_fips))
        .collect();

    // Fill layers render independently, one canvas per class
    let classes: Vec<BrailleCanvas> = match classification {
        Some(classification) if !classification.is_empty() => (0..CLASS_COUNT)
            .into_par_iter()
            .map(|class_idx| {
                let mut canvas = BrailleCanvas::new(width, height);
                for county in &admitted {
                    if county.population == 0
                        || classification.class_of(&county.fips) != Some(class_idx as u8)
                    {
                        continue;
                    }
                    for polygon in &county.polygons {
                        if bbox_on_canvas(polygon, viewport) {
                            fill_polygon(&mut canvas, &project_rings(polygon, viewport));
                        }
                    }
                }
                canvas
            })
            .collect(),
        _ => (0..CLASS_COUNT)
            .map(|_| BrailleCanvas::new(width, height))
            .collect(),
    };

    let mut no_data = BrailleCanvas::new(width, height);
    if classification.is_some_and(|c| !c.is_empty()) {
        for county in &admitted {
            if county.population > 0 {
                continue;
            }
            for polygon in &county.polygons {
                if bbox_on_canvas(polygon, viewport) {
                    fill_polygon(&mut no_data, &project_rings(polygon, viewport));
                }
            }
        }
    }

    let mut outlines = BrailleCanvas::new(width, height);
    for county in &admitted {
        for polygon in &county.polygons {
            if bbox_on_canvas(polygon, viewport) {
                for ring in &polygon.rings {
                    draw_ring(&mut outlines, ring, viewport);
                }
            }
        }
    }

    MapLayers {
        classes,
        no_data,
        outlines,
    }
}

/// Draw a closed ring with viewport culling
fn draw_ring(canvas: &mut BrailleCanvas, ring: &[DVec2], viewport: &Viewport) {
    if ring.len() < 2 {
        return;
    }
    let mut prev: Option<(i32, i32)> = None;
    for &p in ring {
        let (px, py) = viewport.project(p.x, p.y);
        if let Some((prev_x, prev_y)) = prev {
            let dist = ((px - prev_x).abs() + (py - prev_y).abs()) as usize;
            if dist < viewport.width && segment_might_be_visible(viewport, (prev_x, prev_y), (px, py))
            {
                draw_line(canvas, prev_x, prev_y, px, py);
            }
        }
        prev = Some((px, py));
    }
}

/// Rough bounding-box visibility check for a segment
fn segment_might_be_visible(viewport: &Viewport, p1: (i32, i32), p2: (i32, i32)) -> bool {
    let min_x = p1.0.min(p2.0);
    let max_x = p1.0.max(p2.0);
    let min_y = p1.1.min(p2.1);
    let max_y = p1.1.max(p2.1);

    max_x >= 0 && min_x < viewport.width as i32 && max_y >= 0 && min_y < viewport.height as i32
}

/// Layered output for the region-picker overview: one fill canvas per
/// region plus shared state outlines
pub struct OverviewLayers {
    pub regions: Vec<(Region, BrailleCanvas)>,
    pub outlines: BrailleCanvas,
}

/// Render every state, filled by region, for the picker screen
pub fn render_overview(states: &[StateRecord], viewport: &Viewport) -> OverviewLayers {
    let width = viewport.width / 2;
    let height = viewport.height / 4;

    let regions: Vec<(Region, BrailleCanvas)> = Region::ALL
        .into_par_iter()
        .map(|region| {
            let mut canvas = BrailleCanvas::new(width, height);
            for state in states.iter().filter(|s| s.region == region) {
                for polygon in &state.polygons {
                    if bbox_on_canvas(polygon, viewport) {
                        fill_polygon(&mut canvas, &project_rings(polygon, viewport));
                    }
                }
            }
            (region, canvas)
        })
        .collect();

    let mut outlines = BrailleCanvas::new(width, height);
    for state in states {
        for polygon in &state.polygons {
            if bbox_on_canvas(polygon, viewport) {
                for ring in &polygon.rings {
                    draw_ring(&mut outlines, ring, viewport);
                }
            }
        }
    }

    OverviewLayers { regions, outlines }
}
