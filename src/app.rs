use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::{RegionCache, RegionEntry};
use crate::classify::{classify, Classification, Method, Palette};
use crate::data::{CountyRecord, Region, StateRecord};
use crate::error::Result;
use crate::export::{export_html, SnapshotMeta};
use crate::map::hittest::{hit_test, polygon_contains};
use crate::map::projection::Viewport;
use crate::map::raster::render_raster;
use crate::map::renderer::{layout_frames, primary_bounds, Frame};

/// Callers must not resolve the cursor more often than this
pub const HIT_TEST_INTERVAL: Duration = Duration::from_millis(100);

/// Dwell before the county tooltip appears
pub const TOOLTIP_DELAY: Duration = Duration::from_secs(1);

/// Export raster resolution
const SNAPSHOT_WIDTH: u32 = 1600;
const SNAPSHOT_HEIGHT: u32 = 1200;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Screen {
    Picker,
    Map,
}

/// Hover feedback state machine. Cursor movement drives Idle <-> Hovering;
/// the time-elapsed check in `tick` promotes Hovering to Showing after the
/// dwell delay; leaving the county cancels immediately.
#[derive(Clone, Debug, PartialEq)]
pub enum HoverState {
    Idle,
    Hovering { fips: String, since: Instant },
    Showing { fips: String },
}

/// Where the background county fetch stands
#[derive(Clone, Debug, PartialEq)]
pub enum FetchState {
    Idle,
    Pending {
        region: Region,
        done: usize,
        total: usize,
    },
    Failed {
        region: Region,
        message: String,
    },
}

/// Application state
pub struct App {
    pub screen: Screen,
    pub cache: Arc<RegionCache>,

    /// State outlines for the picker overview (empty until delivered)
    pub states: Vec<StateRecord>,
    pub states_loading: bool,
    pub picker_index: usize,

    pub region: Option<Region>,
    pub entry: Option<Arc<RegionEntry>>,
    pub method: Method,
    pub palette: Palette,
    pub classification: Option<Classification>,

    /// Primary-frame view transform; insets have fixed windows
    pub viewport: Viewport,
    pub frames: Vec<Frame>,

    pub hover: HoverState,
    pub fetch: FetchState,
    /// Transient one-line message for the status bar
    pub status: Option<String>,
    /// Generation tag for stale-fetch suppression, bumped per selection
    pub generation: u64,

    /// Cursor position in map-panel character cells
    pub mouse_pos: Option<(u16, u16)>,
    pub should_quit: bool,

    last_drag: Option<(u16, u16)>,
    last_hit_test: Option<Instant>,
    pending_cursor: Option<(u16, u16)>,
    panel_width: u16,
    panel_height: u16,
}

impl App {
    pub fn new() -> Self {
        Self {
            screen: Screen::Picker,
            cache: Arc::new(RegionCache::new()),
            states: Vec::new(),
            states_loading: true,
            picker_index: 0,
            region: None,
            entry: None,
            method: Method::Quantile,
            palette: Palette::Reds,
            classification: None,
            viewport: Viewport::new(-98.35, 39.5, 4.0, 2, 2),
            frames: Vec::new(),
            hover: HoverState::Idle,
            fetch: FetchState::Idle,
            status: None,
            generation: 0,
            mouse_pos: None,
            should_quit: false,
            last_drag: None,
            last_hit_test: None,
            pending_cursor: None,
            panel_width: 2,
            panel_height: 2,
        }
    }

    /// Update the map panel's inner size (character cells)
    pub fn set_panel_size(&mut self, width: u16, height: u16) {
        let width = width.max(1);
        let height = height.max(1);
        if (width, height) != (self.panel_width, self.panel_height) {
            self.panel_width = width;
            self.panel_height = height;
            self.sync_frames();
        }
    }

    pub fn panel_size(&self) -> (u16, u16) {
        (self.panel_width, self.panel_height)
    }

    pub fn quit(&mut self) {
        self.should_quit = true;
    }

    // --- region selection and fetch delivery -----------------------------

    pub fn picker_move(&mut self, delta: i32) {
        let len = Region::ALL.len() as i32;
        self.picker_index = ((self.picker_index as i32 + delta).rem_euclid(len)) as usize;
    }

    pub fn picker_region(&self) -> Region {
        Region::ALL[self.picker_index]
    }

    /// Begin loading a region. Returns the generation tag the worker must
    /// echo back; any delivery with an older tag is discarded.
    pub fn select_region(&mut self, region: Region) -> u64 {
        self.generation += 1;
        self.region = Some(region);
        self.entry = None;
        self.classification = None;
        self.hover = HoverState::Idle;
        self.screen = Screen::Map;
        self.fetch = FetchState::Pending {
            region,
            done: 0,
            total: region.state_fips().len(),
        };
        self.status = None;
        self.generation
    }

    pub fn fetch_progress(&mut self, generation: u64, done: usize) {
        if generation != self.generation {
            return;
        }
        if let FetchState::Pending { region, total, .. } = &self.fetch {
            let (region, total) = (*region, *total);
            self.fetch = FetchState::Pending {
                region,
                done,
                total,
            };
        }
    }

    /// Deliver a finished county fetch back onto the interactive thread
    pub fn deliver_counties(
        &mut self,
        generation: u64,
        region: Region,
        result: Result<Arc<RegionEntry>>,
    ) {
        if generation != self.generation {
            tracing::debug!(region = region.name(), generation, "stale fetch discarded");
            return;
        }
        match result {
            Ok(entry) => {
                self.fetch = FetchState::Idle;
                self.viewport = Viewport::fit(
                    &primary_bounds(&entry.counties),
                    self.panel_width as usize * 2,
                    self.panel_height as usize * 4,
                );
                self.entry = Some(entry);
                self.sync_frames();
                self.status = Some("press 'a' to apply the choropleth".to_string());
            }
            Err(e) => {
                self.fetch = FetchState::Failed {
                    region,
                    message: e.to_string(),
                };
                self.screen = Screen::Picker;
            }
        }
    }

    pub fn deliver_states(&mut self, result: Result<Vec<StateRecord>>) {
        self.states_loading = false;
        match result {
            Ok(states) => self.states = states,
            Err(e) => self.status = Some(format!("state outlines unavailable: {e}")),
        }
    }

    /// Leave the map screen; an in-flight fetch for it becomes stale
    pub fn back_to_picker(&mut self) {
        self.generation += 1;
        self.screen = Screen::Picker;
        self.hover = HoverState::Idle;
        self.fetch = FetchState::Idle;
    }

    // --- classification ---------------------------------------------------

    /// Apply (or re-apply) the selected method over the loaded counties
    pub fn apply(&mut self) {
        if let Some(entry) = &self.entry {
            self.classification = Some(classify(
                &entry.counties,
                |c| c.population as f64,
                self.method,
            ));
        }
    }

    pub fn cycle_method(&mut self) {
        self.method = self.method.cycle();
        if self.classification.is_some() {
            self.apply();
        }
    }

    pub fn cycle_palette(&mut self) {
        self.palette = self.palette.cycle();
    }

    // --- view transform ---------------------------------------------------

    fn sync_frames(&mut self) {
        self.frames = match self.region {
            Some(region) if self.entry.is_some() => {
                let frames =
                    layout_frames(region, &self.viewport, self.panel_width, self.panel_height);
                // layout owns the resize of the primary viewport
                if let Some(primary) = frames.first() {
                    self.viewport = primary.viewport.clone();
                }
                frames
            }
            _ => Vec::new(),
        };
    }

    /// Overview viewport for the picker screen (all 50 states + DC)
    pub fn overview_viewport(&self, width: u16, height: u16) -> Viewport {
        let mut bounds = crate::data::Bounds::empty();
        for state in &self.states {
            for polygon in &state.polygons {
                bounds.union(&polygon.bbox);
            }
        }
        if bounds.is_empty() {
            Viewport::new(-98.35, 39.5, 4.0, width as usize * 2, height as usize * 4)
        } else {
            Viewport::fit(&bounds, width as usize * 2, height as usize * 4)
        }
    }

    pub fn pan(&mut self, dx: i32, dy: i32) {
        self.viewport.pan(dx, dy);
        self.sync_frames();
    }

    pub fn zoom_in(&mut self) {
        self.viewport.zoom_in();
        self.sync_frames();
    }

    pub fn zoom_out(&mut self) {
        self.viewport.zoom_out();
        self.sync_frames();
    }

    /// Zoom towards a panel character cell (primary frame only)
    pub fn zoom_at(&mut self, col: u16, row: u16, zoom_in: bool) {
        let Some(primary) = self.frames.first() else {
            return;
        };
        if !primary.contains(col, row) {
            return;
        }
        let px = (col - primary.col) as i32 * 2;
        let py = (row - primary.row) as i32 * 4;
        if zoom_in {
            self.viewport.zoom_in_at(px, py);
        } else {
            self.viewport.zoom_out_at(px, py);
        }
        self.sync_frames();
    }

    /// Mouse drag pans the primary frame
    pub fn handle_drag(&mut self, col: u16, row: u16) {
        if let Some((last_col, last_row)) = self.last_drag {
            let dx = (last_col as i32 - col as i32) * 2;
            let dy = (last_row as i32 - row as i32) * 4;
            self.pan(dx, dy);
        }
        self.last_drag = Some((col, row));
    }

    pub fn begin_drag(&mut self, col: u16, row: u16) {
        self.last_drag = Some((col, row));
    }

    pub fn end_drag(&mut self) {
        self.last_drag = None;
    }

    // --- hover ------------------------------------------------------------

    /// Record cursor movement; resolution happens in `tick` under the
    /// hit-test throttle
    pub fn on_cursor_move(&mut self, col: u16, row: u16) {
        self.mouse_pos = Some((col, row));
        self.pending_cursor = Some((col, row));
    }

    pub fn on_cursor_leave(&mut self) {
        self.mouse_pos = None;
        self.pending_cursor = None;
        self.hover = HoverState::Idle;
    }

    /// Advance time-driven state: throttled hit testing and tooltip dwell
    pub fn tick(&mut self, now: Instant) {
        if let Some((col, row)) = self.pending_cursor {
            let due = match self.last_hit_test {
                Some(last) => now.duration_since(last) >= HIT_TEST_INTERVAL,
                None => true,
            };
            if due {
                self.last_hit_test = Some(now);
                self.pending_cursor = None;
                self.resolve_hover(col, row, now);
            }
        }

        let promoted = match &self.hover {
            HoverState::Hovering { fips, since }
                if now.duration_since(*since) >= TOOLTIP_DELAY =>
            {
                Some(fips.clone())
            }
            _ => None,
        };
        if let Some(fips) = promoted {
            self.hover = HoverState::Showing { fips };
        }
    }

    fn resolve_hover(&mut self, col: u16, row: u16, now: Instant) {
        let hit_fips = self.entry.as_ref().and_then(|entry| {
            let frame = self.frames.iter().find(|f| f.contains(col, row))?;
            let point = frame.cursor_to_data(col, row);
            // Candidates are limited to the frame's own states, so an inset
            // cursor never resolves against the contiguous counties
            hit_test(
                point,
                entry
                    .counties
                    .iter()
                    .filter(|county| frame.kind.admits(&county.state_fips)),
            )
            .map(|county| county.fips.clone())
        });

        let next = match (&self.hover, hit_fips) {
            (_, None) => HoverState::Idle,
            (HoverState::Hovering { fips, since }, Some(hit)) if *fips == hit => {
                HoverState::Hovering {
                    fips: hit,
                    since: *since,
                }
            }
            (HoverState::Showing { fips }, Some(hit)) if *fips == hit => {
                HoverState::Showing { fips: hit }
            }
            (_, Some(hit)) => HoverState::Hovering {
                fips: hit,
                since: now,
            },
        };
        self.hover = next;
    }

    /// Region under a picker-screen cursor cell, resolved against the state
    /// outlines (clicking a state selects its region, like the overview map)
    pub fn pick_region_at(&self, col: u16, row: u16) -> Option<Region> {
        let viewport = self.overview_viewport(self.panel_width, self.panel_height);
        let (lon, lat) = viewport.unproject(col as i32 * 2 + 1, row as i32 * 4 + 2);
        let point = glam::DVec2::new(lon, lat);
        self.states
            .iter()
            .find(|state| state.polygons.iter().any(|p| polygon_contains(p, point)))
            .map(|state| state.region)
    }

    /// County for the visible tooltip (Showing state only)
    pub fn tooltip_county(&self) -> Option<&CountyRecord> {
        let HoverState::Showing { fips } = &self.hover else {
            return None;
        };
        self.entry
            .as_ref()?
            .counties
            .iter()
            .find(|c| &c.fips == fips)
    }

    // --- export -----------------------------------------------------------

    /// Build the snapshot artifact for the current view.
    /// Returns (suggested filename, bytes).
    pub fn build_snapshot(&self) -> Option<Result<(String, Vec<u8>)>> {
        let (region, entry, classification) =
            match (self.region, &self.entry, &self.classification) {
                (Some(r), Some(e), Some(c)) => (r, e, c),
                _ => return None,
            };

        let raster = render_raster(
            region,
            &entry.counties,
            classification,
            self.palette,
            SNAPSHOT_WIDTH,
            SNAPSHOT_HEIGHT,
        );
        let meta = SnapshotMeta {
            region,
            method: classification.method,
            palette: self.palette,
            classes: classification.classes,
            has_no_data: entry.counties.iter().any(|c| c.population == 0),
            scale_label: format!("Scale bar: ~{:.0} miles", self.viewport.scale_miles()),
        };
        let filename = format!(
            "{}_population_choropleth.html",
            region.name().to_lowercase()
        );
        Some(export_html(&raster, &meta).map(|bytes| (filename, bytes)))
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}
