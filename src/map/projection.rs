use std::f64::consts::PI;

use glam::DVec2;

use crate::data::Bounds;
use crate::error::{MapError, Result};

/// Spherical Web Mercator earth radius in meters (EPSG:3857)
pub const EARTH_RADIUS_M: f64 = 6378137.0;

/// Latitude where the Mercator y coordinate reaches +/- PI*R
pub const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_59;

const DEG: f64 = 180.0 / PI;
const RAD: f64 = PI / 180.0;

/// Projected meters -> geographic degrees (lon, lat).
/// Pure and stateless; out-of-domain input is a contract violation and
/// returns an error instead of clamping.
pub fn to_display(x: f64, y: f64) -> Result<(f64, f64)> {
    let limit = PI * EARTH_RADIUS_M;
    if !x.is_finite() || x.abs() > limit {
        return Err(MapError::Domain { axis: "x", value: x });
    }
    if !y.is_finite() || y.abs() > limit {
        return Err(MapError::Domain { axis: "y", value: y });
    }
    let lon = (x / EARTH_RADIUS_M) * DEG;
    let lat = (2.0 * (y / EARTH_RADIUS_M).exp().atan() - PI / 2.0) * DEG;
    Ok((lon, lat))
}

/// Geographic degrees -> projected meters, inverse of [`to_display`]
pub fn from_display(lon: f64, lat: f64) -> Result<(f64, f64)> {
    if !lon.is_finite() || lon.abs() > 180.0 {
        return Err(MapError::Domain { axis: "lon", value: lon });
    }
    if !lat.is_finite() || lat.abs() > MAX_MERCATOR_LAT {
        return Err(MapError::Domain { axis: "lat", value: lat });
    }
    let x = lon * RAD * EARTH_RADIUS_M;
    let y = EARTH_RADIUS_M * (PI / 4.0 + lat * RAD / 2.0).tan().ln();
    Ok((x, y))
}

/// Haversine distance in miles, used for the scale bar
pub fn haversine_miles(a: DVec2, b: DVec2) -> f64 {
    const EARTH_RADIUS_MILES: f64 = 3958.8;
    let dlat = (b.y - a.y).to_radians();
    let dlon = (b.x - a.x).to_radians();
    let lat1 = a.y.to_radians();
    let lat2 = b.y.to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_MILES * h.sqrt().asin()
}

/// Normalized Mercator x in [0, 1] across the world
#[inline(always)]
fn merc_x(lon: f64) -> f64 {
    (lon + 180.0) / 360.0
}

/// Normalized Mercator y, 0 at the north limit, 1 at the south limit
#[inline(always)]
fn merc_y(lat: f64) -> f64 {
    let lat_rad = lat * RAD;
    (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0
}

#[inline(always)]
fn inv_merc_y(y: f64) -> f64 {
    (PI * (1.0 - 2.0 * y)).sinh().atan() * DEG
}

/// Viewport representing the visible map area and zoom level
#[derive(Clone)]
pub struct Viewport {
    /// Center longitude (-180 to 180)
    pub center_lon: f64,
    /// Center latitude (-90 to 90)
    pub center_lat: f64,
    /// Zoom level (higher = more zoomed in; 1.0 shows the whole world width)
    pub zoom: f64,
    /// Canvas pixel width
    pub width: usize,
    /// Canvas pixel height
    pub height: usize,
}

impl Viewport {
    pub fn new(center_lon: f64, center_lat: f64, zoom: f64, width: usize, height: usize) -> Self {
        Self {
            center_lon,
            center_lat,
            zoom,
            width,
            height,
        }
    }

    /// Frame the given lon/lat bounds with a small margin. An empty box
    /// (a region with zero counties is valid) falls back to a world view.
    pub fn fit(bounds: &Bounds, width: usize, height: usize) -> Self {
        if bounds.is_empty() {
            return Self::new(0.0, 20.0, 1.0, width, height);
        }

        let dx = (merc_x(bounds.max.x) - merc_x(bounds.min.x)).abs();
        let dy = (merc_y(bounds.min.y) - merc_y(bounds.max.y)).abs();

        let zoom = if dx <= 0.0 || dy <= 0.0 || width == 0 {
            1.0
        } else {
            let zoom_x = 1.0 / dx;
            let zoom_y = height as f64 / (width as f64 * dy);
            (zoom_x.min(zoom_y) * 0.92).clamp(0.5, 5000.0)
        };

        let center_y = (merc_y(bounds.min.y) + merc_y(bounds.max.y)) / 2.0;
        Self {
            center_lon: bounds.center().x,
            center_lat: inv_merc_y(center_y),
            zoom,
            width,
            height,
        }
    }

    /// Pan the viewport by pixel delta
    pub fn pan(&mut self, dx: i32, dy: i32) {
        let scale = 360.0 / (self.zoom * self.width as f64);
        self.center_lon += dx as f64 * scale;
        self.center_lat -= dy as f64 * scale * 0.5; // Mercator distortion

        // Alaska framing reaches past the antimeridian, hence -190
        self.center_lon = self.center_lon.clamp(-190.0, 180.0);
        self.center_lat = self.center_lat.clamp(-85.0, 85.0);
    }

    /// Zoom in by a factor
    pub fn zoom_in(&mut self) {
        self.zoom = (self.zoom * 1.5).min(5000.0);
    }

    /// Zoom out by a factor
    pub fn zoom_out(&mut self) {
        self.zoom = (self.zoom / 1.5).max(0.5);
    }

    /// Zoom in towards a specific pixel location
    pub fn zoom_in_at(&mut self, px: i32, py: i32) {
        self.zoom_at(px, py, 1.5);
    }

    /// Zoom out from a specific pixel location
    pub fn zoom_out_at(&mut self, px: i32, py: i32) {
        self.zoom_at(px, py, 1.0 / 1.5);
    }

    /// Zoom by factor towards a specific pixel location
    fn zoom_at(&mut self, px: i32, py: i32, factor: f64) {
        // Geographic coordinates under the cursor before zooming
        let (lon, lat) = self.unproject(px, py);

        self.zoom = (self.zoom * factor).clamp(0.5, 5000.0);

        // Pan so the same point lands back under the cursor
        let (new_px, new_py) = self.project(lon, lat);
        self.pan(new_px - px, new_py - py);
    }

    /// Unproject pixel coordinates back to geographic coordinates (lon, lat)
    pub fn unproject(&self, px: i32, py: i32) -> (f64, f64) {
        let scale = self.zoom * self.width as f64;

        let center_x = merc_x(self.center_lon);
        let center_y = merc_y(self.center_lat);

        let x = (px as f64 - self.width as f64 / 2.0) / scale + center_x;
        let y = (py as f64 - self.height as f64 / 2.0) / scale + center_y;

        (x * 360.0 - 180.0, inv_merc_y(y))
    }

    /// Project a geographic coordinate (lon, lat) to pixel coordinates
    pub fn project(&self, lon: f64, lat: f64) -> (i32, i32) {
        let x = merc_x(lon);
        let y = merc_y(lat);

        let center_x = merc_x(self.center_lon);
        let center_y = merc_y(self.center_lat);

        let scale = self.zoom * self.width as f64;

        let px = ((x - center_x) * scale + self.width as f64 / 2.0).round() as i32;
        let py = ((y - center_y) * scale + self.height as f64 / 2.0).round() as i32;

        (px, py)
    }

    /// Check if a projected point is visible in the viewport
    pub fn is_visible(&self, px: i32, py: i32) -> bool {
        px >= -10 && px < self.width as i32 + 10 && py >= -10 && py < self.height as i32 + 10
    }

    /// Distance in miles spanned by the central quarter of the frame width,
    /// measured along the horizontal midline
    pub fn scale_miles(&self) -> f64 {
        let mid = self.height as i32 / 2;
        let quarter = self.width as i32 / 4;
        let (lon_a, lat_a) = self.unproject(self.width as i32 / 2 - quarter / 2, mid);
        let (lon_b, lat_b) = self.unproject(self.width as i32 / 2 + quarter / 2, mid);
        haversine_miles(DVec2::new(lon_a, lat_a), DVec2::new(lon_b, lat_b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_center() {
        let vp = Viewport::new(0.0, 0.0, 1.0, 100, 100);
        let (x, y) = vp.project(0.0, 0.0);
        assert_eq!(x, 50);
        assert_eq!(y, 50);
    }

    #[test]
    fn test_pan() {
        let mut vp = Viewport::new(0.0, 0.0, 1.0, 100, 100);
        vp.pan(10, 0);
        assert!(vp.center_lon > 0.0);
    }

    #[test]
    fn test_viewport_roundtrip() {
        let vp = Viewport::new(-98.0, 39.0, 8.0, 400, 300);
        let (px, py) = vp.project(-95.3, 38.1);
        let (lon, lat) = vp.unproject(px, py);
        // project() rounds to whole pixels, so tolerance is one pixel's worth
        assert!((lon + 95.3).abs() < 0.5, "{lon}");
        assert!((lat - 38.1).abs() < 0.5, "{lat}");
    }

    #[test]
    fn test_fit_contains_bounds() {
        let bounds = Bounds::new(DVec2::new(-109.0, 37.0), DVec2::new(-102.0, 41.0)); // Colorado
        let vp = Viewport::fit(&bounds, 400, 300);

        for (lon, lat) in [
            (bounds.min.x, bounds.min.y),
            (bounds.max.x, bounds.max.y),
            (bounds.min.x, bounds.max.y),
            (bounds.max.x, bounds.min.y),
        ] {
            let (px, py) = vp.project(lon, lat);
            assert!(px >= 0 && px <= 400, "px = {px}");
            assert!(py >= 0 && py <= 300, "py = {py}");
        }
    }

    #[test]
    fn test_mercator_roundtrip_continental_us() {
        // Corners and interior samples of the continental-US domain
        let samples = [
            (-124.7, 48.4),
            (-66.9, 44.8),
            (-80.5, 25.1),
            (-117.1, 32.5),
            (-98.35, 39.5),
            (-155.5, 19.5), // Hawaii
            (-165.0, 64.5), // Alaska
        ];
        for (lon, lat) in samples {
            let (x, y) = from_display(lon, lat).unwrap();
            let (lon2, lat2) = to_display(x, y).unwrap();
            assert!((lon - lon2).abs() < 1e-6, "lon {lon} -> {lon2}");
            assert!((lat - lat2).abs() < 1e-6, "lat {lat} -> {lat2}");
        }
    }

    #[test]
    fn test_mercator_roundtrip_from_meters() {
        // Starting from projected meters, as the source data arrives
        let samples = [
            (-10308029.89, 3594670.49), // Louisiana
            (-13135699.0, 4035522.0),   // southern California
            (-7910240.0, 5465442.0),    // New England
        ];
        for (x, y) in samples {
            let (lon, lat) = to_display(x, y).unwrap();
            let (x2, y2) = from_display(lon, lat).unwrap();
            assert!((x - x2).abs() < 1e-6, "x {x} -> {x2}");
            assert!((y - y2).abs() < 1e-6, "y {y} -> {y2}");
        }
    }

    #[test]
    fn test_projection_domain_errors() {
        assert!(matches!(
            from_display(181.0, 40.0),
            Err(MapError::Domain { axis: "lon", .. })
        ));
        assert!(matches!(
            from_display(-98.0, 86.0),
            Err(MapError::Domain { axis: "lat", .. })
        ));
        assert!(matches!(
            to_display(2.1e7, 0.0),
            Err(MapError::Domain { axis: "x", .. })
        ));
        assert!(matches!(
            to_display(0.0, f64::NAN),
            Err(MapError::Domain { axis: "y", .. })
        ));
    }

    #[test]
    fn test_haversine_known_distance() {
        // Denver to Kansas City is roughly 560 miles
        let miles = haversine_miles(DVec2::new(-104.99, 39.74), DVec2::new(-94.58, 39.10));
        assert!((500.0..620.0).contains(&miles), "{miles}");
    }
}
