// ============================================================================
// cinestage-core/src/analysis/metrics.rs
// ============================================================================
//
// METRIC KERNELS: Per-Frame Signal Measurements on Luma Buffers
//
// Pure functions over `image::GrayImage`. None of them allocate more than a
// frame-sized scratch buffer and none of them fail: degenerate inputs (frames
// smaller than the 3x3 kernels, mismatched frame sizes) measure as zero.
//
// KEY COMPONENTS:
// - laplacian_variance: Variance of the 4-neighbour Laplacian response
// - edge_density: Canny edge detector (Sobel, non-maximum suppression,
//   hysteresis) returning the share of edge pixels
// - flow_magnitude: Block Lucas-Kanade optical flow between two frames

// ---- External crate imports ----
use image::GrayImage;

/// tan(22.5°), used to quantize gradient direction during non-maximum suppression.
const TAN_22_5: f64 = 0.414_213_562_373_095_1;

/// Smallest eigenvalue of the structure tensor accepted as trackable texture.
const MIN_EIGENVALUE: f64 = 1.0;

// ============================================================================
// LAPLACIAN VARIANCE
// ============================================================================

/// Variance of the Laplacian (kernel `[0,1,0; 1,-4,1; 0,1,0]`) over the frame.
///
/// Borders are handled by reflecting without repeating the edge pixel.
pub fn laplacian_variance(frame: &GrayImage) -> f64 {
    let (w, h) = (frame.width() as usize, frame.height() as usize);
    if w < 3 || h < 3 {
        return 0.0;
    }
    let px = frame.as_raw();
    let at = |x: isize, y: isize| -> f64 {
        let x = reflect(x, w);
        let y = reflect(y, h);
        f64::from(px[y * w + x])
    };

    let n = (w * h) as f64;
    let mut sum = 0.0;
    let mut responses = Vec::with_capacity(w * h);
    for y in 0..h as isize {
        for x in 0..w as isize {
            let r = at(x, y - 1) + at(x - 1, y) + at(x + 1, y) + at(x, y + 1) - 4.0 * at(x, y);
            sum += r;
            responses.push(r);
        }
    }
    let mean = sum / n;
    responses.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n
}

// ============================================================================
// CANNY EDGE DENSITY
// ============================================================================

/// Result of edge detection on one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeStats {
    pub edge_pixels: u64,
    pub density: f64,
}

/// Runs the Canny detector and reports the fraction of pixels marked as edges.
///
/// Gradients come from 3x3 Sobel operators with L1 magnitude. A pixel above
/// `high` seeds an edge; pixels above `low` join it through 8-connectivity.
pub fn edge_density(frame: &GrayImage, low: f64, high: f64) -> EdgeStats {
    let (w, h) = (frame.width() as usize, frame.height() as usize);
    if w < 3 || h < 3 {
        return EdgeStats {
            edge_pixels: 0,
            density: 0.0,
        };
    }
    let px = frame.as_raw();
    let at = |x: isize, y: isize| -> i32 {
        let x = x.clamp(0, w as isize - 1) as usize;
        let y = y.clamp(0, h as isize - 1) as usize;
        i32::from(px[y * w + x])
    };

    let mut dx = vec![0i32; w * h];
    let mut dy = vec![0i32; w * h];
    let mut mag = vec![0i32; w * h];
    for y in 0..h as isize {
        for x in 0..w as isize {
            let gx = (at(x + 1, y - 1) + 2 * at(x + 1, y) + at(x + 1, y + 1))
                - (at(x - 1, y - 1) + 2 * at(x - 1, y) + at(x - 1, y + 1));
            let gy = (at(x - 1, y + 1) + 2 * at(x, y + 1) + at(x + 1, y + 1))
                - (at(x - 1, y - 1) + 2 * at(x, y - 1) + at(x + 1, y - 1));
            let i = y as usize * w + x as usize;
            dx[i] = gx;
            dy[i] = gy;
            mag[i] = gx.abs() + gy.abs();
        }
    }

    let mag_at = |x: isize, y: isize| -> i32 {
        if x < 0 || y < 0 || x >= w as isize || y >= h as isize {
            0
        } else {
            mag[y as usize * w + x as usize]
        }
    };

    // 0 = suppressed, 1 = weak candidate, 2 = strong edge
    let mut state = vec![0u8; w * h];
    let mut stack = Vec::new();
    for y in 0..h as isize {
        for x in 0..w as isize {
            let i = y as usize * w + x as usize;
            let m = mag[i];
            if f64::from(m) <= low {
                continue;
            }
            let (xs, ys) = (dx[i], dy[i]);
            let ax = f64::from(xs.abs());
            let ay = f64::from(ys.abs());
            let tg22 = ax * TAN_22_5;
            let is_max = if ay < tg22 {
                m > mag_at(x - 1, y) && m >= mag_at(x + 1, y)
            } else if ay > tg22 + 2.0 * ax {
                m > mag_at(x, y - 1) && m >= mag_at(x, y + 1)
            } else {
                let s: isize = if (xs ^ ys) < 0 { -1 } else { 1 };
                m > mag_at(x - s, y - 1) && m > mag_at(x + s, y + 1)
            };
            if !is_max {
                continue;
            }
            if f64::from(m) > high {
                state[i] = 2;
                stack.push(i);
            } else {
                state[i] = 1;
            }
        }
    }

    while let Some(i) = stack.pop() {
        let (x, y) = ((i % w) as isize, (i / w) as isize);
        for ny in y - 1..=y + 1 {
            for nx in x - 1..=x + 1 {
                if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                    continue;
                }
                let j = ny as usize * w + nx as usize;
                if state[j] == 1 {
                    state[j] = 2;
                    stack.push(j);
                }
            }
        }
    }

    let edge_pixels = state.iter().filter(|s| **s == 2).count() as u64;
    EdgeStats {
        edge_pixels,
        density: edge_pixels as f64 / (w * h) as f64,
    }
}

// ============================================================================
// OPTICAL FLOW
// ============================================================================

/// Average and peak motion between two consecutive frames, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FlowStats {
    pub average: f64,
    pub peak: f64,
}

/// Estimates dense motion with one Lucas-Kanade solve per `window`-sized block.
///
/// Blocks without enough texture to constrain both axes report zero motion.
pub fn flow_magnitude(prev: &GrayImage, next: &GrayImage, window: usize) -> FlowStats {
    let (w, h) = (prev.width() as usize, prev.height() as usize);
    if prev.dimensions() != next.dimensions() || w < 3 || h < 3 || window < 2 {
        return FlowStats::default();
    }
    let p = prev.as_raw();
    let q = next.as_raw();
    let val = |buf: &[u8], x: usize, y: usize| f64::from(buf[y * w + x]);

    let mut total = 0.0;
    let mut peak: f64 = 0.0;
    let mut blocks = 0usize;

    let mut by = 1;
    while by < h - 1 {
        let y_end = (by + window).min(h - 1);
        let mut bx = 1;
        while bx < w - 1 {
            let x_end = (bx + window).min(w - 1);
            let (mut sxx, mut syy, mut sxy, mut sxt, mut syt) = (0.0, 0.0, 0.0, 0.0, 0.0);
            for y in by..y_end {
                for x in bx..x_end {
                    let ix = (val(p, x + 1, y) - val(p, x - 1, y)) / 2.0;
                    let iy = (val(p, x, y + 1) - val(p, x, y - 1)) / 2.0;
                    let it = val(q, x, y) - val(p, x, y);
                    sxx += ix * ix;
                    syy += iy * iy;
                    sxy += ix * iy;
                    sxt += ix * it;
                    syt += iy * it;
                }
            }

            let det = sxx * syy - sxy * sxy;
            let trace = sxx + syy;
            let min_eigen = (trace - (trace * trace - 4.0 * det).max(0.0).sqrt()) / 2.0;
            let magnitude = if min_eigen < MIN_EIGENVALUE || det.abs() < f64::EPSILON {
                0.0
            } else {
                let u = (-syy * sxt + sxy * syt) / det;
                let v = (sxy * sxt - sxx * syt) / det;
                (u * u + v * v).sqrt()
            };

            total += magnitude;
            peak = peak.max(magnitude);
            blocks += 1;
            bx += window;
        }
        by += window;
    }

    if blocks == 0 {
        return FlowStats::default();
    }
    FlowStats {
        average: total / blocks as f64,
        peak,
    }
}

fn reflect(i: isize, n: usize) -> usize {
    let n = n as isize;
    let r = if i < 0 {
        -i
    } else if i >= n {
        2 * n - 2 - i
    } else {
        i
    };
    r.clamp(0, n - 1) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn uniform(w: u32, h: u32, v: u8) -> GrayImage {
        GrayImage::from_pixel(w, h, Luma([v]))
    }

    fn textured(w: u32, h: u32, shift: f64) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            let xf = x as f64 - shift;
            let yf = y as f64;
            let v = 128.0 + 50.0 * (xf / 4.0).sin() + 50.0 * (yf / 5.0).sin();
            Luma([v.round().clamp(0.0, 255.0) as u8])
        })
    }

    #[test]
    fn flat_frame_has_no_laplacian_response() {
        assert_eq!(laplacian_variance(&uniform(32, 32, 90)), 0.0);
    }

    #[test]
    fn checkerboard_is_sharper_than_gradient() {
        let checker = GrayImage::from_fn(32, 32, |x, y| {
            Luma([if (x + y) % 2 == 0 { 0 } else { 255 }])
        });
        let ramp = GrayImage::from_fn(32, 32, |x, _| Luma([(x * 8) as u8]));
        assert!(laplacian_variance(&checker) > laplacian_variance(&ramp));
        assert!(laplacian_variance(&checker) > 1000.0);
    }

    #[test]
    fn tiny_frames_measure_zero() {
        assert_eq!(laplacian_variance(&uniform(2, 2, 10)), 0.0);
        assert_eq!(edge_density(&uniform(1, 8, 10), 50.0, 150.0).edge_pixels, 0);
    }

    #[test]
    fn flat_frame_has_no_edges() {
        let stats = edge_density(&uniform(40, 30, 200), 50.0, 150.0);
        assert_eq!(stats.edge_pixels, 0);
        assert_eq!(stats.density, 0.0);
    }

    #[test]
    fn vertical_step_produces_a_thin_edge_line() {
        let step = GrayImage::from_fn(40, 30, |x, _| Luma([if x < 20 { 0 } else { 255 }]));
        let stats = edge_density(&step, 50.0, 150.0);
        // Non-maximum suppression keeps the edge one or two pixels wide.
        assert!(stats.edge_pixels >= 30, "edge pixels: {}", stats.edge_pixels);
        assert!(stats.edge_pixels <= 60, "edge pixels: {}", stats.edge_pixels);
        assert!(stats.density > 0.0 && stats.density < 0.06);
    }

    #[test]
    fn weak_edges_need_a_strong_seed() {
        // Step of 10 levels: Sobel magnitude 40 never exceeds the low threshold.
        let faint = GrayImage::from_fn(40, 30, |x, _| Luma([if x < 20 { 100 } else { 110 }]));
        assert_eq!(edge_density(&faint, 50.0, 150.0).edge_pixels, 0);
    }

    #[test]
    fn identical_frames_have_no_motion() {
        let a = textured(64, 48, 0.0);
        let stats = flow_magnitude(&a, &a, 8);
        assert_eq!(stats.average, 0.0);
        assert_eq!(stats.peak, 0.0);
    }

    #[test]
    fn one_pixel_shift_is_detected() {
        let a = textured(96, 96, 0.0);
        let b = textured(96, 96, 1.0);
        let stats = flow_magnitude(&a, &b, 8);
        assert!(
            stats.average > 0.6 && stats.average < 1.4,
            "average flow {}",
            stats.average
        );
        assert!(stats.peak >= stats.average);
    }

    #[test]
    fn mismatched_dimensions_measure_zero() {
        let a = textured(64, 48, 0.0);
        let b = textured(32, 48, 0.0);
        assert_eq!(flow_magnitude(&a, &b, 8), FlowStats::default());
    }

    #[test]
    fn textureless_blocks_report_zero_motion() {
        let a = uniform(32, 32, 50);
        let b = uniform(32, 32, 80);
        assert_eq!(flow_magnitude(&a, &b, 8).average, 0.0);
    }
}
