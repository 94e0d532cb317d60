//! Cursor-to-county resolution.
//!
//! Every candidate gets a bounding-box test before the exact ring test;
//! without that ordering hover latency scales with the total vertex count
//! of every county in the region.

use glam::DVec2;

use crate::data::{CountyRecord, Polygon};

/// Resolve the county under `point` (data coordinates, lon/lat).
/// County polygons do not overlap in the source data; if that is ever
/// violated the first match in record order wins.
pub fn hit_test<'a, I>(point: DVec2, counties: I) -> Option<&'a CountyRecord>
where
    I: IntoIterator<Item = &'a CountyRecord>,
{
    counties
        .into_iter()
        .find(|county| county_contains(county, point))
}

/// Point-in-county over all of its polygons
pub fn county_contains(county: &CountyRecord, point: DVec2) -> bool {
    county
        .polygons
        .iter()
        .any(|polygon| polygon_contains(polygon, point))
}

/// Point-in-polygon honoring holes: inside the outer ring and not inside
/// any hole ring. The bbox check is the O(1) pre-filter.
pub fn polygon_contains(polygon: &Polygon, point: DVec2) -> bool {
    if !polygon.bbox.contains(point) {
        return false;
    }
    if !ring_contains(polygon.outer(), point) {
        return false;
    }
    !polygon.holes().iter().any(|hole| ring_contains(hole, point))
}

/// Even-odd ray cast toward +x
fn ring_contains(ring: &[DVec2], p: DVec2) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let a = ring[i];
        let b = ring[j];
        if (a.y > p.y) != (b.y > p.y) {
            let x_cross = a.x + (p.y - a.y) / (b.y - a.y) * (b.x - a.x);
            if p.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(points: &[(f64, f64)]) -> Vec<DVec2> {
        points.iter().map(|&(x, y)| DVec2::new(x, y)).collect()
    }

    fn county(fips: &str, polygons: Vec<Polygon>) -> CountyRecord {
        CountyRecord {
            fips: fips.to_string(),
            name: fips.to_string(),
            state_fips: "00".to_string(),
            population: 1000,
            polygons,
        }
    }

    #[test]
    fn test_simple_containment() {
        let square = Polygon::new(vec![ring(&[
            (0.0, 0.0),
            (10.0, 0.0),
            (10.0, 10.0),
            (0.0, 10.0),
            (0.0, 0.0),
        ])]);
        assert!(polygon_contains(&square, DVec2::new(5.0, 5.0)));
        assert!(!polygon_contains(&square, DVec2::new(15.0, 5.0)));
    }

    #[test]
    fn test_inside_bbox_outside_ring() {
        // C shape: the notch is inside the bbox but outside the ring
        let c_shape = Polygon::new(vec![ring(&[
            (0.0, 0.0),
            (10.0, 0.0),
            (10.0, 3.0),
            (3.0, 3.0),
            (3.0, 7.0),
            (10.0, 7.0),
            (10.0, 10.0),
            (0.0, 10.0),
            (0.0, 0.0),
        ])]);
        let in_notch = DVec2::new(7.0, 5.0);
        assert!(c_shape.bbox.contains(in_notch));
        assert!(!polygon_contains(&c_shape, in_notch));
        // A point in the solid part still hits
        assert!(polygon_contains(&c_shape, DVec2::new(1.5, 5.0)));
    }

    #[test]
    fn test_point_in_hole_is_not_a_match() {
        let donut = Polygon::new(vec![
            ring(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0), (0.0, 0.0)]),
            ring(&[(4.0, 4.0), (6.0, 4.0), (6.0, 6.0), (4.0, 6.0), (4.0, 4.0)]),
        ]);
        // Inside the outer ring AND inside the hole: no match
        assert!(!polygon_contains(&donut, DVec2::new(5.0, 5.0)));
        // Between the hole and the outer ring: match
        assert!(polygon_contains(&donut, DVec2::new(2.0, 5.0)));
    }

    #[test]
    fn test_hit_test_resolves_and_misses() {
        let left = county(
            "A",
            vec![Polygon::new(vec![ring(&[
                (0.0, 0.0),
                (5.0, 0.0),
                (5.0, 5.0),
                (0.0, 5.0),
                (0.0, 0.0),
            ])])],
        );
        let right = county(
            "B",
            vec![Polygon::new(vec![ring(&[
                (6.0, 0.0),
                (11.0, 0.0),
                (11.0, 5.0),
                (6.0, 5.0),
                (6.0, 0.0),
            ])])],
        );
        let counties = vec![left, right];

        assert_eq!(hit_test(DVec2::new(2.0, 2.0), &counties).map(|c| c.fips.as_str()), Some("A"));
        assert_eq!(hit_test(DVec2::new(8.0, 2.0), &counties).map(|c| c.fips.as_str()), Some("B"));
        // The gap between them resolves to nothing
        assert!(hit_test(DVec2::new(5.5, 2.0), &counties).is_none());
    }

    #[test]
    fn test_overlap_first_match_wins() {
        let shape = || {
            vec![Polygon::new(vec![ring(&[
                (0.0, 0.0),
                (4.0, 0.0),
                (4.0, 4.0),
                (0.0, 4.0),
                (0.0, 0.0),
            ])])]
        };
        let counties = vec![county("FIRST", shape()), county("SECOND", shape())];
        let hit = hit_test(DVec2::new(2.0, 2.0), &counties).unwrap();
        assert_eq!(hit.fips, "FIRST");
    }

    #[test]
    fn test_multipolygon_county() {
        // Two islands belonging to one county
        let islands = county(
            "ISLES",
            vec![
                Polygon::new(vec![ring(&[
                    (0.0, 0.0),
                    (2.0, 0.0),
                    (2.0, 2.0),
                    (0.0, 2.0),
                    (0.0, 0.0),
                ])]),
                Polygon::new(vec![ring(&[
                    (8.0, 8.0),
                    (9.0, 8.0),
                    (9.0, 9.0),
                    (8.0, 9.0),
                    (8.0, 8.0),
                ])]),
            ],
        );
        let counties = vec![islands];
        assert!(hit_test(DVec2::new(1.0, 1.0), &counties).is_some());
        assert!(hit_test(DVec2::new(8.5, 8.5), &counties).is_some());
        assert!(hit_test(DVec2::new(5.0, 5.0), &counties).is_none());
    }
}
