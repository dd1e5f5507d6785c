//! Pixel-exact template matching by normalised squared difference.
//!
//! For every placement of a template over the screenshot the score is
//!
//! ```text
//!   R(x, y) = Σ (T − I)² / sqrt(Σ T² · Σ I²)
//! ```
//!
//! summed over the template window and all three colour channels. `1 − R` is
//! the similarity reported to callers. Templates are real screenshots of the
//! element, so only near-perfect placements are interesting; a placement is
//! abandoned as soon as its running sum proves it cannot clear the threshold.

use image::RgbImage;
use ndarray::Array2;

use crate::config::TemplateConfig;
use crate::geometry::BBox;
use crate::perception::types::TemplateMatch;

pub struct TemplateMatcher {
    threshold: f64,
    best_score_tolerance: f64,
}

impl TemplateMatcher {
    pub fn new(cfg: &TemplateConfig) -> Self {
        Self {
            threshold: cfg.match_threshold,
            best_score_tolerance: cfg.best_score_tolerance,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// All placements of any template whose similarity clears the threshold.
    /// Never fails; unusable templates simply contribute nothing.
    pub fn match_templates(&self, screenshot: &RgbImage, templates: &[RgbImage]) -> Vec<TemplateMatch> {
        let energy = SquaredIntegral::new(screenshot);
        let mut out = Vec::new();
        for (idx, template) in templates.iter().enumerate() {
            let found = self.match_one(screenshot, &energy, template);
            tracing::debug!(template = idx, matches = found.len(), "template match pass");
            out.extend(found);
        }
        out
    }

    fn match_one(
        &self,
        screenshot: &RgbImage,
        energy: &SquaredIntegral,
        template: &RgbImage,
    ) -> Vec<TemplateMatch> {
        let cutoff = (1.0 - self.threshold).max(0.0);
        let Some(surface) = sqdiff_surface(screenshot, energy, template, cutoff) else {
            return Vec::new();
        };

        let best = surface.iter().copied().fold(f64::INFINITY, f64::min);
        if !best.is_finite() {
            return Vec::new();
        }
        let band = best * (1.0 + self.best_score_tolerance);
        let (tw, th) = (template.width() as f64, template.height() as f64);
        let (sw, sh) = (screenshot.width() as f64, screenshot.height() as f64);

        surface
            .indexed_iter()
            .filter(|(_, r)| **r <= band)
            .map(|((y, x), &r)| TemplateMatch {
                bbox: BBox::new(x as f64, y as f64, tw, th),
                score: 1.0 - r,
            })
            .filter(|m| m.score > self.threshold)
            .filter(|m| m.bbox.fits_within(sw, sh))
            .collect()
    }
}

/// Summed-area table of squared intensities (all channels), so the energy of
/// any screenshot window is four lookups.
pub struct SquaredIntegral {
    table: Array2<f64>,
}

impl SquaredIntegral {
    pub fn new(img: &RgbImage) -> Self {
        let (w, h) = (img.width() as usize, img.height() as usize);
        let raw = img.as_raw();
        let mut table = Array2::<f64>::zeros((h + 1, w + 1));
        for y in 0..h {
            let mut row_sum = 0.0;
            for x in 0..w {
                let base = (y * w + x) * 3;
                row_sum += raw[base..base + 3]
                    .iter()
                    .map(|&v| (v as f64) * (v as f64))
                    .sum::<f64>();
                table[[y + 1, x + 1]] = table[[y, x + 1]] + row_sum;
            }
        }
        Self { table }
    }

    pub fn window(&self, x: usize, y: usize, w: usize, h: usize) -> f64 {
        let t = &self.table;
        (t[[y + h, x + w]] - t[[y, x + w]] - t[[y + h, x]] + t[[y, x]]).max(0.0)
    }
}

/// Normalised squared-difference surface, shape `(H − h + 1, W − w + 1)`.
/// Placements proven worse than `cutoff` are left at `+∞`. Returns `None`
/// when the template is empty or larger than the screenshot.
pub fn sqdiff_surface(
    screenshot: &RgbImage,
    energy: &SquaredIntegral,
    template: &RgbImage,
    cutoff: f64,
) -> Option<Array2<f64>> {
    let (sw, sh) = (screenshot.width() as usize, screenshot.height() as usize);
    let (tw, th) = (template.width() as usize, template.height() as usize);
    if tw == 0 || th == 0 || tw > sw || th > sh {
        return None;
    }

    let s = screenshot.as_raw();
    let t = template.as_raw();
    let t_energy: f64 = t.iter().map(|&v| (v as f64) * (v as f64)).sum();
    let row_len = tw * 3;

    let (out_h, out_w) = (sh - th + 1, sw - tw + 1);
    let mut surface = Array2::from_elem((out_h, out_w), f64::INFINITY);

    for y in 0..out_h {
        'placement: for x in 0..out_w {
            let denom = (t_energy * energy.window(x, y, tw, th)).sqrt();
            let budget = cutoff * denom;
            let mut ssd = 0.0;
            for ty in 0..th {
                let s_row = ((y + ty) * sw + x) * 3;
                let t_row = ty * row_len;
                for i in 0..row_len {
                    let d = s[s_row + i] as f64 - t[t_row + i] as f64;
                    ssd += d * d;
                }
                if ssd > budget {
                    continue 'placement;
                }
            }
            surface[[y, x]] = if denom > 0.0 {
                ssd / denom
            } else if ssd == 0.0 {
                0.0
            } else {
                1.0
            };
        }
    }
    Some(surface)
}
