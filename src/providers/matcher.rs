//! Sliding-window template matching over RGB buffers.
//!
//! Two methods are implemented, mirroring the classic normalized family:
//! - `CcoeffNormed`: zero-mean normalized cross-correlation, higher is better.
//! - `SqdiffNormed`: normalized squared difference, lower is better.
//!
//! Scores are computed over all three channels. Windows (or templates) with
//! no variance yield a score of 0 under `CcoeffNormed` rather than dividing
//! by zero.

use anyhow::{Result, bail};
use image::RgbImage;

use super::{MatchMethod, PatternMatcher, RawMatch};

const EPS: f64 = 1e-12;

/// Exhaustive-search matcher. No pyramid or FFT tricks; the search visits
/// every window once and keeps the best score for the requested polarity.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateMatcher;

impl TemplateMatcher {
    pub fn new() -> Self {
        Self
    }
}

impl PatternMatcher for TemplateMatcher {
    fn best_match(
        &self,
        source: &RgbImage,
        template: &RgbImage,
        method: MatchMethod,
    ) -> Result<RawMatch> {
        let (sw, sh) = source.dimensions();
        let (tw, th) = template.dimensions();
        if tw == 0 || th == 0 {
            bail!("Template is empty");
        }
        if tw > sw || th > sh {
            bail!("Template {tw}x{th} is larger than source {sw}x{sh}");
        }

        match method {
            MatchMethod::CcoeffNormed => ccoeff_normed(source, template),
            MatchMethod::SqdiffNormed => sqdiff_normed(source, template),
        }
    }
}

/// Zero-mean normalized cross-correlation; returns the maximum.
fn ccoeff_normed(source: &RgbImage, template: &RgbImage) -> Result<RawMatch> {
    let (sw, sh) = source.dimensions();
    let (tw, th) = template.dimensions();
    let stride = (sw * 3) as usize;
    let trow = (tw * 3) as usize;
    let n = (trow * th as usize) as f64;
    let src = source.as_raw();

    // Zero-mean template, precomputed once.
    let tmean = template.as_raw().iter().map(|&b| b as f64).sum::<f64>() / n;
    let tprime: Vec<f64> = template.as_raw().iter().map(|&b| b as f64 - tmean).collect();
    let tvar: f64 = tprime.iter().map(|t| t * t).sum();

    let mut best = RawMatch {
        score: f64::NEG_INFINITY,
        x: 0,
        y: 0,
    };
    for oy in 0..=(sh - th) {
        for ox in 0..=(sw - tw) {
            let mut sum_s = 0.0;
            let mut sum_s2 = 0.0;
            let mut sum_st = 0.0;
            for dy in 0..th as usize {
                let base = (oy as usize + dy) * stride + ox as usize * 3;
                let srow = &src[base..base + trow];
                let trow_vals = &tprime[dy * trow..(dy + 1) * trow];
                for (s, t) in srow.iter().zip(trow_vals) {
                    let s = *s as f64;
                    sum_s += s;
                    sum_s2 += s * s;
                    sum_st += s * t;
                }
            }
            let svar = sum_s2 - sum_s * sum_s / n;
            let denom = (svar * tvar).sqrt();
            let score = if denom < EPS { 0.0 } else { sum_st / denom };
            if score > best.score {
                best = RawMatch { score, x: ox, y: oy };
            }
        }
    }
    Ok(best)
}

/// Normalized squared difference; returns the minimum (distance).
fn sqdiff_normed(source: &RgbImage, template: &RgbImage) -> Result<RawMatch> {
    let (sw, sh) = source.dimensions();
    let (tw, th) = template.dimensions();
    let stride = (sw * 3) as usize;
    let trow = (tw * 3) as usize;
    let src = source.as_raw();
    let tmpl = template.as_raw();

    let sum_t2: f64 = tmpl.iter().map(|&b| (b as f64) * (b as f64)).sum();

    let mut best = RawMatch {
        score: f64::INFINITY,
        x: 0,
        y: 0,
    };
    for oy in 0..=(sh - th) {
        for ox in 0..=(sw - tw) {
            let mut sum_s2 = 0.0;
            let mut sum_diff2 = 0.0;
            for dy in 0..th as usize {
                let base = (oy as usize + dy) * stride + ox as usize * 3;
                let srow = &src[base..base + trow];
                let trow_vals = &tmpl[dy * trow..(dy + 1) * trow];
                for (s, t) in srow.iter().zip(trow_vals) {
                    let s = *s as f64;
                    let t = *t as f64;
                    sum_s2 += s * s;
                    let d = s - t;
                    sum_diff2 += d * d;
                }
            }
            let denom = (sum_s2 * sum_t2).sqrt();
            let dist = if denom < EPS {
                // Both window and template all-black: a perfect match.
                if sum_diff2 < EPS { 0.0 } else { 1.0 }
            } else {
                sum_diff2 / denom
            };
            if dist < best.score {
                best = RawMatch {
                    score: dist,
                    x: ox,
                    y: oy,
                };
            }
        }
    }
    Ok(best)
}
