//! Data model and source-payload decoding.
//!
//! Geometry arrives from the Census TIGERweb services as ArcGIS JSON with
//! Web Mercator rings; everything downstream works in lon/lat degrees, so
//! rings are converted once at parse time. A GeoJSON directory source is
//! kept for offline use and tests.

pub mod tiger;

use std::fs;
use std::path::PathBuf;

use glam::DVec2;
use rayon::prelude::*;
use serde::Deserialize;

use crate::error::{MapError, Result};
use crate::map::projection;

/// Axis-aligned bounding box in lon/lat degrees
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min: DVec2,
    pub max: DVec2,
}

impl Bounds {
    /// An empty box that any point expands
    pub fn empty() -> Self {
        Self {
            min: DVec2::splat(f64::INFINITY),
            max: DVec2::splat(f64::NEG_INFINITY),
        }
    }

    pub fn new(min: DVec2, max: DVec2) -> Self {
        Self { min, max }
    }

    pub fn expand(&mut self, p: DVec2) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    pub fn union(&mut self, other: &Bounds) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Inclusive containment test (the hit tester's cheap pre-filter)
    #[inline(always)]
    pub fn contains(&self, p: DVec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y
    }

    pub fn width(&self) -> f64 {
        (self.max.x - self.min.x).max(0.0)
    }

    pub fn height(&self) -> f64 {
        (self.max.y - self.min.y).max(0.0)
    }

    pub fn center(&self) -> DVec2 {
        (self.min + self.max) * 0.5
    }
}

/// A single polygon: first ring is the outer boundary, the rest are holes.
/// The bbox covers the outer ring and is precomputed for hit-test pre-filtering.
#[derive(Clone, Debug)]
pub struct Polygon {
    pub rings: Vec<Vec<DVec2>>,
    pub bbox: Bounds,
}

impl Polygon {
    pub fn new(rings: Vec<Vec<DVec2>>) -> Self {
        let mut bbox = Bounds::empty();
        if let Some(outer) = rings.first() {
            for &p in outer {
                bbox.expand(p);
            }
        }
        Self { rings, bbox }
    }

    pub fn outer(&self) -> &[DVec2] {
        self.rings.first().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn holes(&self) -> &[Vec<DVec2>] {
        if self.rings.is_empty() {
            &[]
        } else {
            &self.rings[1..]
        }
    }

    /// Group a flat ArcGIS ring list into polygons. Esri encodes outer rings
    /// clockwise and holes counter-clockwise; a hole attaches to the most
    /// recent outer ring.
    pub fn from_esri_rings(rings: Vec<Vec<DVec2>>) -> Vec<Polygon> {
        let mut polygons: Vec<Vec<Vec<DVec2>>> = Vec::new();
        for ring in rings {
            if ring.len() < 4 {
                continue; // degenerate sliver, not a closed ring
            }
            let clockwise = ring_signed_area(&ring) < 0.0;
            match polygons.last_mut() {
                Some(current) if !clockwise => current.push(ring),
                _ => polygons.push(vec![ring]),
            }
        }
        polygons.into_iter().map(Polygon::new).collect()
    }
}

/// Shoelace signed area; positive for counter-clockwise rings (y up)
pub fn ring_signed_area(ring: &[DVec2]) -> f64 {
    let mut sum = 0.0;
    for i in 0..ring.len() {
        let a = ring[i];
        let b = ring[(i + 1) % ring.len()];
        sum += a.x * b.y - b.x * a.y;
    }
    sum * 0.5
}

/// One county with its population attribute and geometry.
/// `fips` is unique within a loaded region's county set.
#[derive(Clone, Debug)]
pub struct CountyRecord {
    /// Stable key: 5-digit state+county GEOID where the source provides one,
    /// otherwise "{state_fips}-{name}"
    pub fips: String,
    pub name: String,
    pub state_fips: String,
    pub population: u64,
    pub polygons: Vec<Polygon>,
}

impl CountyRecord {
    /// Union of the per-polygon boxes
    pub fn bounds(&self) -> Bounds {
        let mut b = Bounds::empty();
        for poly in &self.polygons {
            b.union(&poly.bbox);
        }
        b
    }
}

/// One state outline for the region-picker overview map
#[derive(Clone, Debug)]
pub struct StateRecord {
    pub fips: String,
    pub name: String,
    pub abbr: &'static str,
    pub region: Region,
    pub polygons: Vec<Polygon>,
}

/// State FIPS codes rendered in auxiliary inset frames for the West region
pub const ALASKA_FIPS: &str = "02";
pub const HAWAII_FIPS: &str = "15";

/// The five fixed US regions
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Region {
    West,
    Midwest,
    Northeast,
    Southeast,
    Southwest,
}

impl Region {
    pub const ALL: [Region; 5] = [
        Region::West,
        Region::Midwest,
        Region::Northeast,
        Region::Southeast,
        Region::Southwest,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Region::West => "West",
            Region::Midwest => "Midwest",
            Region::Northeast => "Northeast",
            Region::Southeast => "Southeast",
            Region::Southwest => "Southwest",
        }
    }

    /// Member-state FIPS codes; static configuration, not derived
    pub fn state_fips(self) -> &'static [&'static str] {
        match self {
            // Washington, Montana, Idaho, Oregon, Wyoming, California,
            // Nevada, Utah, Colorado, Alaska, Hawaii
            Region::West => &[
                "53", "30", "16", "41", "56", "06", "32", "49", "08", "02", "15",
            ],
            // North Dakota, South Dakota, Nebraska, Kansas, Minnesota, Iowa,
            // Missouri, Wisconsin, Illinois, Indiana, Michigan, Ohio
            Region::Midwest => &[
                "38", "46", "31", "20", "27", "19", "29", "55", "17", "18", "26", "39",
            ],
            // Pennsylvania, Maryland, Delaware, New Jersey, Connecticut,
            // Rhode Island, Massachusetts, New York, Vermont, New Hampshire, Maine
            Region::Northeast => &[
                "42", "24", "10", "34", "09", "44", "25", "36", "50", "33", "23",
            ],
            // District of Columbia, Virginia, West Virginia, Kentucky, Arkansas,
            // Louisiana, Mississippi, Alabama, Georgia, Florida, South Carolina,
            // North Carolina, Tennessee
            Region::Southeast => &[
                "11", "51", "54", "21", "05", "22", "28", "01", "13", "12", "45", "37", "47",
            ],
            // Oklahoma, Texas, New Mexico, Arizona
            Region::Southwest => &["40", "48", "35", "04"],
        }
    }

    /// Accent color used on the region-picker overview map
    pub fn accent_color(self) -> (u8, u8, u8) {
        match self {
            Region::West => (0xff, 0x6b, 0x6b),
            Region::Midwest => (0x4e, 0xcd, 0xc4),
            Region::Northeast => (0x45, 0xb7, 0xd1),
            Region::Southeast => (0x96, 0xce, 0xb4),
            Region::Southwest => (0xfe, 0xca, 0x57),
        }
    }

    pub fn contains_state(self, fips: &str) -> bool {
        self.state_fips().contains(&fips)
    }

    /// Which region a state belongs to; None for territories (PR, VI, ...)
    pub fn of_state(fips: &str) -> Option<Region> {
        Region::ALL.iter().copied().find(|r| r.contains_state(fips))
    }
}

/// Postal abbreviation for a state-level FIPS code
#[rustfmt::skip]
pub fn state_abbr(fips: &str) -> Option<&'static str> {
    let abbr = match fips {
        "01" => "AL", "02" => "AK", "04" => "AZ", "05" => "AR", "06" => "CA",
        "08" => "CO", "09" => "CT", "10" => "DE", "11" => "DC", "12" => "FL",
        "13" => "GA", "15" => "HI", "16" => "ID", "17" => "IL", "18" => "IN",
        "19" => "IA", "20" => "KS", "21" => "KY", "22" => "LA", "23" => "ME",
        "24" => "MD", "25" => "MA", "26" => "MI", "27" => "MN", "28" => "MS",
        "29" => "MO", "30" => "MT", "31" => "NE", "32" => "NV", "33" => "NH",
        "34" => "NJ", "35" => "NM", "36" => "NY", "37" => "NC", "38" => "ND",
        "39" => "OH", "40" => "OK", "41" => "OR", "42" => "PA", "44" => "RI",
        "45" => "SC", "46" => "SD", "47" => "TN", "48" => "TX", "49" => "UT",
        "50" => "VT", "51" => "VA", "53" => "WA", "54" => "WV", "55" => "WI",
        "56" => "WY",
        _ => return None,
    };
    Some(abbr)
}

/// Abstraction over the geometry/attribute services. Two collections exist:
/// state-level (region picker) and county-level (choropleth), both filtered
/// server-side where the implementation allows it.
pub trait GeometrySource: Send + Sync {
    /// Counties for the given member-state FIPS codes
    fn fetch_counties(&self, state_fips: &[&str]) -> Result<Vec<CountyRecord>>;

    /// All state outlines (the picker needs every region at once)
    fn fetch_states(&self) -> Result<Vec<StateRecord>>;
}

// ---------------------------------------------------------------------------
// ArcGIS JSON payload decoding
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct EsriResponse {
    #[serde(default)]
    features: Vec<EsriFeature>,
    #[serde(default)]
    error: Option<EsriError>,
}

#[derive(Deserialize)]
struct EsriError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct EsriFeature {
    #[serde(default)]
    attributes: EsriAttributes,
    #[serde(default)]
    geometry: Option<EsriGeometry>,
}

#[derive(Deserialize, Default)]
struct EsriAttributes {
    #[serde(rename = "NAME", default)]
    name: String,
    #[serde(rename = "STATE", default)]
    state: String,
    #[serde(rename = "GEOID", default)]
    geoid: Option<String>,
    // POP100 is typed as a double by the service
    #[serde(rename = "POP100", default)]
    pop100: f64,
}

#[derive(Deserialize, Default)]
struct EsriGeometry {
    #[serde(default)]
    rings: Vec<Vec<[f64; 2]>>,
}

fn decode_esri(payload: &mut [u8]) -> Result<EsriResponse> {
    let response: EsriResponse =
        simd_json::serde::from_slice(payload).map_err(|e| MapError::Parse(e.to_string()))?;
    if let Some(err) = response.error {
        return Err(MapError::Fetch(format!(
            "service error {}: {}",
            err.code, err.message
        )));
    }
    Ok(response)
}

/// Web Mercator rings -> lon/lat polygons with holes grouped by winding
fn esri_polygons(geometry: Option<EsriGeometry>) -> Result<Vec<Polygon>> {
    let Some(geometry) = geometry else {
        return Ok(Vec::new());
    };
    let mut rings = Vec::with_capacity(geometry.rings.len());
    for ring in geometry.rings {
        let mut converted = Vec::with_capacity(ring.len());
        for [x, y] in ring {
            let (lon, lat) =
                projection::to_display(x, y).map_err(|e| MapError::Parse(e.to_string()))?;
            converted.push(DVec2::new(lon, lat));
        }
        rings.push(converted);
    }
    Ok(Polygon::from_esri_rings(rings))
}

/// Decode a county query response. Features with no geometry are dropped;
/// an explicit service error maps to a fetch failure.
pub fn parse_counties(payload: &mut [u8]) -> Result<Vec<CountyRecord>> {
    let response = decode_esri(payload)?;
    response
        .features
        .into_par_iter()
        .filter(|f| f.geometry.is_some())
        .map(|feature| {
            let attrs = feature.attributes;
            let polygons = esri_polygons(feature.geometry)?;
            let fips = match attrs.geoid {
                Some(geoid) if !geoid.is_empty() => geoid,
                _ => format!("{}-{}", attrs.state, attrs.name),
            };
            Ok(CountyRecord {
                fips,
                name: attrs.name,
                state_fips: attrs.state,
                population: attrs.pop100.max(0.0) as u64,
                polygons,
            })
        })
        .collect()
}

/// Decode a state query response, skipping territories outside the five regions
pub fn parse_states(payload: &mut [u8]) -> Result<Vec<StateRecord>> {
    let response = decode_esri(payload)?;
    response
        .features
        .into_par_iter()
        .filter(|f| f.geometry.is_some())
        .filter_map(|feature| {
            let attrs = feature.attributes;
            let region = Region::of_state(&attrs.state)?;
            let abbr = state_abbr(&attrs.state)?;
            match esri_polygons(feature.geometry) {
                Ok(polygons) => Some(Ok(StateRecord {
                    fips: attrs.state,
                    name: attrs.name,
                    abbr,
                    region,
                    polygons,
                })),
                Err(e) => Some(Err(e)),
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// GeoJSON directory source (offline fallback and test fixture)
// ---------------------------------------------------------------------------

/// Reads `states.geojson` / `counties.geojson` from a directory. Coordinates
/// are standard GeoJSON lon/lat; county properties carry NAME, STATE, POP100
/// and optionally GEOID, matching what the API source produces.
pub struct FileSource {
    dir: PathBuf,
}

impl FileSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn load(&self, filename: &str) -> Result<geojson::FeatureCollection> {
        let path = self.dir.join(filename);
        let content = fs::read_to_string(&path)?;
        let geojson: geojson::GeoJson = content
            .parse()
            .map_err(|e: geojson::Error| MapError::Parse(e.to_string()))?;
        match geojson {
            geojson::GeoJson::FeatureCollection(fc) => Ok(fc),
            _ => Err(MapError::Parse(format!(
                "{filename}: expected a FeatureCollection"
            ))),
        }
    }
}

/// GeoJSON Polygon/MultiPolygon coordinates -> polygons (rings already grouped)
fn geojson_polygons(geometry: Option<&geojson::Geometry>) -> Vec<Polygon> {
    use geojson::Value;

    fn rings_to_polygon(rings: &[Vec<Vec<f64>>]) -> Polygon {
        Polygon::new(
            rings
                .iter()
                .map(|ring| ring.iter().map(|c| DVec2::new(c[0], c[1])).collect())
                .collect(),
        )
    }

    match geometry.map(|g| &g.value) {
        Some(Value::Polygon(rings)) => vec![rings_to_polygon(rings)],
        Some(Value::MultiPolygon(polygons)) => {
            polygons.iter().map(|rings| rings_to_polygon(rings)).collect()
        }
        _ => Vec::new(),
    }
}

fn prop_str(feature: &geojson::Feature, key: &str) -> String {
    feature
        .properties
        .as_ref()
        .and_then(|p| p.get(key))
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

fn prop_f64(feature: &geojson::Feature, key: &str) -> f64 {
    feature
        .properties
        .as_ref()
        .and_then(|p| p.get(key))
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0)
}

impl GeometrySource for FileSource {
    fn fetch_counties(&self, state_fips: &[&str]) -> Result<Vec<CountyRecord>> {
        let fc = self.load("counties.geojson")?;
        let mut counties = Vec::new();
        for feature in &fc.features {
            let state = prop_str(feature, "STATE");
            if !state_fips.contains(&state.as_str()) {
                continue;
            }
            let name = prop_str(feature, "NAME");
            let geoid = prop_str(feature, "GEOID");
            let fips = if geoid.is_empty() {
                format!("{state}-{name}")
            } else {
                geoid
            };
            counties.push(CountyRecord {
                fips,
                name,
                state_fips: state,
                population: prop_f64(feature, "POP100").max(0.0) as u64,
                polygons: geojson_polygons(feature.geometry.as_ref()),
            });
        }
        Ok(counties)
    }

    fn fetch_states(&self) -> Result<Vec<StateRecord>> {
        let fc = self.load("states.geojson")?;
        let mut states = Vec::new();
        for feature in &fc.features {
            let fips = prop_str(feature, "STATE");
            let (Some(region), Some(abbr)) = (Region::of_state(&fips), state_abbr(&fips)) else {
                continue;
            };
            states.push(StateRecord {
                fips,
                name: prop_str(feature, "NAME"),
                abbr,
                region,
                polygons: geojson_polygons(feature.geometry.as_ref()),
            });
        }
        Ok(states)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_rosters_cover_51_states_once() {
        let mut seen = std::collections::HashSet::new();
        let mut total = 0;
        for region in Region::ALL {
            for fips in region.state_fips() {
                assert!(seen.insert(*fips), "state {fips} appears in two regions");
                assert!(state_abbr(fips).is_some(), "no abbreviation for {fips}");
                total += 1;
            }
        }
        assert_eq!(total, 51); // 50 states + DC
    }

    #[test]
    fn test_region_of_state() {
        assert_eq!(Region::of_state("06"), Some(Region::West));
        assert_eq!(Region::of_state("48"), Some(Region::Southwest));
        assert_eq!(Region::of_state("36"), Some(Region::Northeast));
        // Puerto Rico belongs to no region
        assert_eq!(Region::of_state("72"), None);
    }

    #[test]
    fn test_esri_sample_feature_parses() {
        // Shape of a real TIGERweb county response, coordinates in Web Mercator
        let mut payload = br#"{
            "geometryType": "esriGeometryPolygon",
            "spatialReference": {"wkid": 102100, "latestWkid": 3857},
            "features": [{
                "attributes": {"NAME": "Allen Parish", "STATE": "22", "POP100": 22750},
                "geometry": {"rings": [[
                    [-10308029.89, 3594670.49],
                    [-10308034.67, 3592380.21],
                    [-10268384.33, 3592434.05],
                    [-10268312.12, 3594714.14],
                    [-10308029.89, 3594670.49]
                ]]}
            }]
        }"#
        .to_vec();

        let counties = parse_counties(&mut payload).unwrap();
        assert_eq!(counties.len(), 1);
        let county = &counties[0];
        assert_eq!(county.name, "Allen Parish");
        assert_eq!(county.state_fips, "22");
        assert_eq!(county.population, 22750);
        assert_eq!(county.fips, "22-Allen Parish"); // no GEOID in payload
        assert_eq!(county.polygons.len(), 1);

        // Converted to lon/lat: Louisiana sits near (-92.6, 30.6)
        let bbox = county.polygons[0].bbox;
        assert!(bbox.min.x > -93.0 && bbox.max.x < -92.0, "{bbox:?}");
        assert!(bbox.min.y > 30.0 && bbox.max.y < 31.0, "{bbox:?}");
    }

    #[test]
    fn test_esri_service_error_is_fetch_failure() {
        let mut payload = br#"{"error": {"code": 400, "message": "Invalid query"}}"#.to_vec();
        match parse_counties(&mut payload) {
            Err(MapError::Fetch(msg)) => assert!(msg.contains("400")),
            other => panic!("expected fetch failure, got {other:?}"),
        }
    }

    #[test]
    fn test_esri_hole_ring_grouping() {
        // Outer ring clockwise (negative shoelace area, y up), hole counter-clockwise
        let outer = vec![
            DVec2::new(0.0, 0.0),
            DVec2::new(0.0, 10.0),
            DVec2::new(10.0, 10.0),
            DVec2::new(10.0, 0.0),
            DVec2::new(0.0, 0.0),
        ];
        let hole = vec![
            DVec2::new(4.0, 4.0),
            DVec2::new(6.0, 4.0),
            DVec2::new(6.0, 6.0),
            DVec2::new(4.0, 6.0),
            DVec2::new(4.0, 4.0),
        ];
        assert!(ring_signed_area(&outer) < 0.0);
        assert!(ring_signed_area(&hole) > 0.0);

        let polygons = Polygon::from_esri_rings(vec![outer, hole]);
        assert_eq!(polygons.len(), 1);
        assert_eq!(polygons[0].rings.len(), 2);
        assert_eq!(polygons[0].holes().len(), 1);
    }

    #[test]
    fn test_file_source_filters_by_state() {
        let dir = std::env::temp_dir().join(format!(
            "choropleth-fixture-{}-{:?}",
            std::process::id(),
            std::thread::current().id()
        ));
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("counties.geojson"),
            r#"{
                "type": "FeatureCollection",
                "features": [
                    {
                        "type": "Feature",
                        "properties": {"NAME": "Travis", "STATE": "48", "GEOID": "48453", "POP100": 1290188},
                        "geometry": {"type": "Polygon", "coordinates": [[
                            [-98.2, 30.0], [-97.4, 30.0], [-97.4, 30.6], [-98.2, 30.6], [-98.2, 30.0]
                        ]]}
                    },
                    {
                        "type": "Feature",
                        "properties": {"NAME": "Denver", "STATE": "08", "POP100": 715522},
                        "geometry": {"type": "Polygon", "coordinates": [[
                            [-105.1, 39.6], [-104.6, 39.6], [-104.6, 39.9], [-105.1, 39.9], [-105.1, 39.6]
                        ]]}
                    }
                ]
            }"#,
        )
        .unwrap();

        let source = FileSource::new(&dir);
        let counties = source.fetch_counties(&["48"]).unwrap();
        assert_eq!(counties.len(), 1);
        assert_eq!(counties[0].fips, "48453");
        assert_eq!(counties[0].population, 1_290_188);
        assert_eq!(counties[0].polygons.len(), 1);

        // A state outside the filter yields nothing
        assert!(source.fetch_counties(&["56"]).unwrap().is_empty());

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_two_outer_rings_become_two_polygons() {
        let a = vec![
            DVec2::new(0.0, 0.0),
            DVec2::new(0.0, 1.0),
            DVec2::new(1.0, 1.0),
            DVec2::new(1.0, 0.0),
            DVec2::new(0.0, 0.0),
        ];
        let mut b = a.clone();
        for p in &mut b {
            p.x += 5.0;
        }
        let polygons = Polygon::from_esri_rings(vec![a, b]);
        assert_eq!(polygons.len(), 2);
    }
}
