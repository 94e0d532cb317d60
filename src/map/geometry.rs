use crate::braille::BrailleCanvas;

/// Walk a line with Bresenham's algorithm, emitting each point
pub fn line_points<F: FnMut(i32, i32)>(x0: i32, y0: i32, x1: i32, y1: i32, mut plot: F) {
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    let mut x = x0;
    let mut y = y0;

    loop {
        plot(x, y);

        if x == x1 && y == y1 {
            break;
        }

        let e2 = 2 * err;

        if e2 >= dy {
            if x == x1 {
                break;
            }
            err += dy;
            x += sx;
        }

        if e2 <= dx {
            if y == y1 {
                break;
            }
            err += dx;
            y += sy;
        }
    }
}

/// Draw a line onto the Braille canvas
pub fn draw_line(canvas: &mut BrailleCanvas, x0: i32, y0: i32, x1: i32, y1: i32) {
    line_points(x0, y0, x1, y1, |x, y| canvas.set_pixel_signed(x, y));
}

/// Scanline-fill a ring list (outer ring + holes), emitting horizontal spans.
/// Crossings are counted even-odd across every ring, so hole interiors are
/// left unfilled without special casing.
pub fn scanline_spans<F: FnMut(i32, i32, i32)>(rings: &[Vec<(i32, i32)>], mut span: F) {
    let mut min_y = i32::MAX;
    let mut max_y = i32::MIN;
    for ring in rings {
        for &(_, y) in ring {
            min_y = min_y.min(y);
            max_y = max_y.max(y);
        }
    }
    if min_y > max_y {
        return;
    }

    let mut crossings: Vec<f64> = Vec::new();
    for y in min_y..=max_y {
        // Sample at the pixel row center to dodge vertex-exactly-on-line ties
        let sample = y as f64 + 0.5;
        crossings.clear();

        for ring in rings {
            let n = ring.len();
            if n < 3 {
                continue;
            }
            let mut j = n - 1;
            for i in 0..n {
                let (ax, ay) = (ring[j].0 as f64, ring[j].1 as f64);
                let (bx, by) = (ring[i].0 as f64, ring[i].1 as f64);
                if (ay > sample) != (by > sample) {
                    crossings.push(ax + (sample - ay) / (by - ay) * (bx - ax));
                }
                j = i;
            }
        }

        crossings.sort_by(f64::total_cmp);
        for pair in crossings.chunks_exact(2) {
            let x0 = pair[0].round() as i32;
            let x1 = pair[1].round() as i32;
            if x1 >= x0 {
                span(y, x0, x1);
            }
        }
    }
}

/// Fill a ring list onto the Braille canvas
pub fn fill_polygon(canvas: &mut BrailleCanvas, rings: &[Vec<(i32, i32)>]) {
    scanline_spans(rings, |y, x0, x1| {
        for x in x0..=x1 {
            canvas.set_pixel_signed(x, y);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_horizontal_line() {
        let mut canvas = BrailleCanvas::new(5, 1);
        draw_line(&mut canvas, 0, 0, 9, 0);
        let s = canvas.to_string();
        assert!(s.contains('⠉'));
    }

    #[test]
    fn test_vertical_line() {
        let mut canvas = BrailleCanvas::new(1, 2);
        draw_line(&mut canvas, 0, 0, 0, 7);
        let s = canvas.to_string();
        assert!(!s.trim().is_empty());
    }

    #[test]
    fn test_fill_square() {
        let mut canvas = BrailleCanvas::new(4, 2);
        let square = vec![vec![(1, 1), (6, 1), (6, 6), (1, 6)]];
        fill_polygon(&mut canvas, &square);

        assert!(canvas.pixel_set(3, 3));
        assert!(canvas.pixel_set(2, 5));
        // Outside stays clear
        assert!(!canvas.pixel_set(7, 7));
        assert!(!canvas.pixel_set(0, 0));
    }

    #[test]
    fn test_fill_leaves_hole_empty() {
        let mut canvas = BrailleCanvas::new(8, 4);
        let rings = vec![
            vec![(0, 0), (15, 0), (15, 15), (0, 15)],
            vec![(5, 5), (10, 5), (10, 10), (5, 10)],
        ];
        fill_polygon(&mut canvas, &rings);

        // Solid part filled, hole interior clear
        assert!(canvas.pixel_set(2, 2));
        assert!(canvas.pixel_set(13, 13));
        assert!(!canvas.pixel_set(7, 7));
    }

    #[test]
    fn test_degenerate_rings_ignored() {
        let mut canvas = BrailleCanvas::new(2, 1);
        fill_polygon(&mut canvas, &[]);
        fill_polygon(&mut canvas, &[vec![(0, 0), (1, 1)]]);
        assert!(!canvas.pixel_set(0, 0));
    }
}
