//! Five-class statistical classification of county attributes.
//!
//! Boundary rule: a value belongs to the first class whose upper edge is >=
//! the value, scanning from class 0; class 0's lower edge is closed at the
//! global minimum. Quantile ties at a boundary therefore land in the lower
//! class.

use std::collections::HashMap;

use crate::data::CountyRecord;

/// Every classification produces exactly this many classes
pub const CLASS_COUNT: usize = 5;

/// Classification method selector; a closed set, dispatched by match
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Quantile,
    NaturalBreaks,
    EqualInterval,
}

impl Method {
    pub fn label(self) -> &'static str {
        match self {
            Method::Quantile => "Quantile",
            Method::NaturalBreaks => "Natural Breaks (Jenks)",
            Method::EqualInterval => "Equal Interval",
        }
    }

    /// Next method in the UI cycle
    pub fn cycle(self) -> Method {
        match self {
            Method::Quantile => Method::NaturalBreaks,
            Method::NaturalBreaks => Method::EqualInterval,
            Method::EqualInterval => Method::Quantile,
        }
    }
}

/// One class interval [low, high]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClassBreak {
    pub low: f64,
    pub high: f64,
}

/// Result of one classification pass. Recomputed wholesale on every apply;
/// superseded, never mutated.
#[derive(Clone, Debug, PartialEq)]
pub struct Classification {
    pub method: Method,
    pub classes: [ClassBreak; CLASS_COUNT],
    assignments: HashMap<String, u8>,
    /// Set when classify() was handed zero records
    pub empty: bool,
}

impl Classification {
    fn empty_result(method: Method) -> Self {
        Self {
            method,
            classes: [ClassBreak { low: 0.0, high: 0.0 }; CLASS_COUNT],
            assignments: HashMap::new(),
            empty: true,
        }
    }

    /// Class index (0-4) for a county identifier
    pub fn class_of(&self, fips: &str) -> Option<u8> {
        self.assignments.get(fips).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }
}

/// Classify `records` into five classes over the extracted attribute.
/// Zero records yield an explicitly empty result; all-equal values collapse
/// to coincident boundaries. Deterministic for identical input.
pub fn classify<F>(records: &[CountyRecord], extract: F, method: Method) -> Classification
where
    F: Fn(&CountyRecord) -> f64,
{
    let values: Vec<f64> = records.iter().map(&extract).collect();
    if values.is_empty() {
        return Classification::empty_result(method);
    }

    let mut sorted = values.clone();
    sorted.sort_by(f64::total_cmp);

    let points = match method {
        Method::EqualInterval => equal_interval_points(&sorted),
        Method::Quantile => quantile_points(&sorted),
        Method::NaturalBreaks => jenks_points(&sorted),
    };

    let mut classes = [ClassBreak { low: 0.0, high: 0.0 }; CLASS_COUNT];
    for (i, class) in classes.iter_mut().enumerate() {
        *class = ClassBreak {
            low: points[i],
            high: points[i + 1],
        };
    }

    let assignments = records
        .iter()
        .zip(&values)
        .map(|(record, &value)| (record.fips.clone(), class_index(value, &points)))
        .collect();

    tracing::debug!(method = method.label(), count = records.len(), "classified");

    Classification {
        method,
        classes,
        assignments,
        empty: false,
    }
}

/// First class whose upper edge contains the value
fn class_index(value: f64, points: &[f64; CLASS_COUNT + 1]) -> u8 {
    for i in 0..CLASS_COUNT {
        if value <= points[i + 1] {
            return i as u8;
        }
    }
    (CLASS_COUNT - 1) as u8
}

/// Break points at min + k*(max-min)/5
fn equal_interval_points(sorted: &[f64]) -> [f64; CLASS_COUNT + 1] {
    let min = sorted[0];
    let max = sorted[sorted.len() - 1];
    let step = (max - min) / CLASS_COUNT as f64;
    let mut points = [0.0; CLASS_COUNT + 1];
    for (k, point) in points.iter_mut().enumerate() {
        *point = min + step * k as f64;
    }
    points[CLASS_COUNT] = max; // avoid drift on the top edge
    points
}

/// Break points at the 0/20/40/60/80/100th percentile ranks,
/// linear interpolation between order statistics
fn quantile_points(sorted: &[f64]) -> [f64; CLASS_COUNT + 1] {
    let mut points = [0.0; CLASS_COUNT + 1];
    for (k, point) in points.iter_mut().enumerate() {
        *point = percentile(sorted, k as f64 / CLASS_COUNT as f64);
    }
    points
}

fn percentile(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let pos = q * (n - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Jenks natural breaks: the 5-way partition of the sorted values minimizing
/// the sum of within-class variance, via the classical matrix DP over
/// (value index, class index). O(n^2 * k), fine for regional county counts.
fn jenks_points(sorted: &[f64]) -> [f64; CLASS_COUNT + 1] {
    let n = sorted.len();
    let min = sorted[0];
    let max = sorted[n - 1];

    // Too few values to partition meaningfully; quantile placement gives the
    // same degenerate (possibly coincident) boundaries Jenks would
    if n <= CLASS_COUNT || min == max {
        return quantile_points(sorted);
    }

    let k = CLASS_COUNT;
    // lower_limits[l][j]: first value index (1-based) of class j in the
    // optimal j-way partition of the first l values
    let mut lower_limits = vec![[0usize; CLASS_COUNT + 1]; n + 1];
    let mut variance = vec![[0.0f64; CLASS_COUNT + 1]; n + 1];

    for j in 1..=k {
        lower_limits[1][j] = 1;
        for row in variance.iter_mut().skip(2) {
            row[j] = f64::INFINITY;
        }
    }

    for l in 2..=n {
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        let mut count = 0.0;
        let mut within = 0.0;

        // Grow the candidate last class downward from value l
        for m in 1..=l {
            let low = l - m + 1; // 1-based lower bound of the candidate class
            let value = sorted[low - 1];
            count += 1.0;
            sum += value;
            sum_sq += value * value;
            within = sum_sq - (sum * sum) / count;

            if low > 1 {
                for j in 2..=k {
                    let candidate = within + variance[low - 1][j - 1];
                    if variance[l][j] >= candidate {
                        lower_limits[l][j] = low;
                        variance[l][j] = candidate;
                    }
                }
            }
        }
        lower_limits[l][1] = 1;
        variance[l][1] = within;
    }

    // Walk the limits matrix back from the full partition
    let mut points = [0.0; CLASS_COUNT + 1];
    points[0] = min;
    points[k] = max;
    let mut row = n;
    for j in (2..=k).rev() {
        let limit = lower_limits[row][j].max(2);
        points[j - 1] = sorted[limit - 2];
        row = limit - 1;
    }
    points
}

/// Fixed five-step color schemes (ColorBrewer ramps, matching the picker UI)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Palette {
    Reds,
    Blues,
    Greens,
    Oranges,
    Purples,
    YlOrRd,
    RdYlBu,
}

/// Fill for counties reporting zero population (light gray)
pub const NO_DATA_COLOR: (u8, u8, u8) = (0xe0, 0xe0, 0xe0);

impl Palette {
    pub const ALL: [Palette; 7] = [
        Palette::Reds,
        Palette::Blues,
        Palette::Greens,
        Palette::Oranges,
        Palette::Purples,
        Palette::YlOrRd,
        Palette::RdYlBu,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Palette::Reds => "Reds",
            Palette::Blues => "Blues",
            Palette::Greens => "Greens",
            Palette::Oranges => "Oranges",
            Palette::Purples => "Purples",
            Palette::YlOrRd => "YlOrRd",
            Palette::RdYlBu => "RdYlBu",
        }
    }

    /// Class index -> RGB, light to dark (RdYlBu diverges)
    pub fn colors(self) -> [(u8, u8, u8); CLASS_COUNT] {
        match self {
            Palette::Reds => [
                (0xfe, 0xe5, 0xd9),
                (0xfc, 0xae, 0x91),
                (0xfb, 0x6a, 0x4a),
                (0xde, 0x2d, 0x26),
                (0xa5, 0x0f, 0x15),
            ],
            Palette::Blues => [
                (0xef, 0xf3, 0xff),
                (0xbd, 0xd7, 0xe7),
                (0x6b, 0xae, 0xd6),
                (0x31, 0x82, 0xbd),
                (0x08, 0x51, 0x9c),
            ],
            Palette::Greens => [
                (0xed, 0xf8, 0xe9),
                (0xba, 0xe4, 0xb3),
                (0x74, 0xc4, 0x76),
                (0x31, 0xa3, 0x54),
                (0x00, 0x6d, 0x2c),
            ],
            Palette::Oranges => [
                (0xfe, 0xed, 0xde),
                (0xfd, 0xbe, 0x85),
                (0xfd, 0x8d, 0x3c),
                (0xe6, 0x55, 0x0d),
                (0xa6, 0x36, 0x03),
            ],
            Palette::Purples => [
                (0xf2, 0xf0, 0xf7),
                (0xcb, 0xc9, 0xe2),
                (0x9e, 0x9a, 0xc8),
                (0x75, 0x6b, 0xb1),
                (0x54, 0x27, 0x8f),
            ],
            Palette::YlOrRd => [
                (0xff, 0xff, 0xb2),
                (0xfe, 0xcc, 0x5c),
                (0xfd, 0x8d, 0x3c),
                (0xf0, 0x3b, 0x20),
                (0xbd, 0x00, 0x26),
            ],
            Palette::RdYlBu => [
                (0xd7, 0x19, 0x1c),
                (0xfd, 0xae, 0x61),
                (0xff, 0xff, 0xbf),
                (0xab, 0xd9, 0xe9),
                (0x2c, 0x7b, 0xb6),
            ],
        }
    }

    /// Next palette in the UI cycle
    pub fn cycle(self) -> Palette {
        let i = Palette::ALL.iter().position(|p| *p == self).unwrap_or(0);
        Palette::ALL[(i + 1) % Palette::ALL.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn county(fips: &str, population: u64) -> CountyRecord {
        CountyRecord {
            fips: fips.to_string(),
            name: format!("County {fips}"),
            state_fips: "00".to_string(),
            population,
            polygons: Vec::new(),
        }
    }

    fn counties(populations: &[u64]) -> Vec<CountyRecord> {
        populations
            .iter()
            .enumerate()
            .map(|(i, &p)| county(&format!("{i:05}"), p))
            .collect()
    }

    fn pop(record: &CountyRecord) -> f64 {
        record.population as f64
    }

    #[test]
    fn test_equal_interval_exact_boundaries() {
        let records = counties(&[10, 20, 30, 40, 50, 60, 70, 80, 90, 100]);
        let c = classify(&records, pop, Method::EqualInterval);

        let expected = [
            (10.0, 28.0),
            (28.0, 46.0),
            (46.0, 64.0),
            (64.0, 82.0),
            (82.0, 100.0),
        ];
        for (class, (low, high)) in c.classes.iter().zip(expected) {
            assert!((class.low - low).abs() < 1e-9, "{class:?}");
            assert!((class.high - high).abs() < 1e-9, "{class:?}");
        }

        // Classes partition the range with no gaps
        for w in c.classes.windows(2) {
            assert_eq!(w[0].high, w[1].low);
        }

        // Every record lands in exactly one class
        let mut counts = [0usize; CLASS_COUNT];
        for record in &records {
            counts[c.class_of(&record.fips).unwrap() as usize] += 1;
        }
        assert_eq!(counts, [2, 2, 2, 2, 2]);
    }

    #[test]
    fn test_quantile_two_per_class() {
        let records = counties(&[10, 20, 30, 40, 50, 60, 70, 80, 90, 100]);
        let c = classify(&records, pop, Method::Quantile);

        let mut counts = [0usize; CLASS_COUNT];
        for record in &records {
            counts[c.class_of(&record.fips).unwrap() as usize] += 1;
        }
        for count in counts {
            assert!((1..=3).contains(&count), "{counts:?}");
        }
        assert_eq!(counts.iter().sum::<usize>(), 10);
    }

    #[test]
    fn test_quantile_boundary_tie_stays_low() {
        // With 11 values the 20th percentile rank is exactly index 2, so the
        // tied 28s sit right on the class 0/1 boundary
        let records = counties(&[10, 20, 28, 28, 50, 60, 70, 80, 90, 100, 110]);
        let c = classify(&records, pop, Method::Quantile);
        assert_eq!(c.classes[0].high, 28.0);
        for record in records.iter().filter(|r| r.population == 28) {
            assert_eq!(c.class_of(&record.fips), Some(0));
        }
    }

    #[test]
    fn test_jenks_isolates_outlier() {
        // Bimodal: nine values near 10, one far outlier. Variance minimization
        // must give the outlier its own top class.
        let records = counties(&[8, 9, 9, 10, 10, 10, 11, 11, 12, 10_000]);
        let c = classify(&records, pop, Method::NaturalBreaks);

        assert_eq!(c.class_of("00009"), Some(4)); // the 10,000 record
        for record in records.iter().filter(|r| r.population < 100) {
            assert_ne!(c.class_of(&record.fips), Some(4), "{}", record.fips);
        }
    }

    #[test]
    fn test_always_five_classes() {
        for method in [Method::Quantile, Method::NaturalBreaks, Method::EqualInterval] {
            for populations in [
                &[7u64][..],
                &[3, 3, 3][..],
                &[1, 2][..],
                &[5, 9, 14, 2, 81, 3, 3][..],
            ] {
                let records = counties(populations);
                let c = classify(&records, pop, method);
                assert_eq!(c.classes.len(), CLASS_COUNT);
                assert!(!c.is_empty());
                for record in &records {
                    let idx = c.class_of(&record.fips).unwrap();
                    assert!(idx < CLASS_COUNT as u8);
                }
            }
        }
    }

    #[test]
    fn test_classify_is_deterministic() {
        let records = counties(&[44, 1, 907, 23, 23, 510, 8, 62, 99, 107, 4000]);
        for method in [Method::Quantile, Method::NaturalBreaks, Method::EqualInterval] {
            let a = classify(&records, pop, method);
            let b = classify(&records, pop, method);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_empty_input_marked_not_thrown() {
        let c = classify(&[], pop, Method::Quantile);
        assert!(c.is_empty());
        assert_eq!(c.classes.len(), CLASS_COUNT);
        assert_eq!(c.class_of("anything"), None);
    }

    #[test]
    fn test_all_equal_values_collapse() {
        let records = counties(&[42, 42, 42, 42, 42, 42]);
        for method in [Method::Quantile, Method::NaturalBreaks, Method::EqualInterval] {
            let c = classify(&records, pop, method);
            assert!(!c.is_empty());
            for class in &c.classes {
                assert_eq!(class.low, 42.0);
                assert_eq!(class.high, 42.0);
            }
            for record in &records {
                assert_eq!(c.class_of(&record.fips), Some(0));
            }
        }
    }

    #[test]
    fn test_palette_has_five_colors() {
        for palette in Palette::ALL {
            assert_eq!(palette.colors().len(), CLASS_COUNT);
        }
        // Cycling visits every palette and wraps
        let mut p = Palette::Reds;
        for _ in 0..Palette::ALL.len() {
            p = p.cycle();
        }
        assert_eq!(p, Palette::Reds);
    }
}
