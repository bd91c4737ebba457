/*!
 * Anchor template matching.
 *
 * Detects on-screen UI state by sliding a small grayscale reference image
 * over a screen capture and scoring each position with zero-mean normalized
 * cross-correlation. Scores are in [-1, 1]; a configurable threshold
 * decides what counts as a match. Brightness shifts between the reference
 * and the live screen cancel out, which matters for themed UIs.
 */

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use image::GrayImage;

use crate::app_config::ProviderKind;

/// Rectangular screen region in absolute pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(left: u32, top: u32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Region of the given size centered on a point, clamped to the screen
    pub fn around(center: (i32, i32), radius: u32, screen: (u32, u32)) -> Self {
        let (cx, cy) = center;
        let left = (cx - radius as i32).max(0) as u32;
        let top = (cy - radius as i32).max(0) as u32;
        let right = ((cx + radius as i32).max(0) as u32).min(screen.0);
        let bottom = ((cy + radius as i32).max(0) as u32).min(screen.1);
        Self {
            left,
            top,
            width: right.saturating_sub(left),
            height: bottom.saturating_sub(top),
        }
    }

    pub fn center(&self) -> (i32, i32) {
        (
            (self.left + self.width / 2) as i32,
            (self.top + self.height / 2) as i32,
        )
    }
}

/// A matched anchor position with its correlation score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchRegion {
    pub region: Region,
    pub score: f64,
}

impl MatchRegion {
    /// Point to aim a click at
    pub fn center(&self) -> (i32, i32) {
        self.region.center()
    }
}

/// A named grayscale reference image for one UI element
#[derive(Debug, Clone)]
pub struct Anchor {
    pub name: String,
    template: GrayImage,
}

impl Anchor {
    /// Load a reference image from disk
    pub fn load(name: impl Into<String>, path: &Path) -> Result<Self> {
        let name = name.into();
        let template = image::open(path)
            .with_context(|| format!("cannot load anchor '{}' from {:?}", name, path))?
            .to_luma8();
        Ok(Self { name, template })
    }

    /// Build an anchor from an in-memory image (tests, generated anchors)
    pub fn from_image(name: impl Into<String>, template: GrayImage) -> Self {
        Self {
            name: name.into(),
            template,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.template.dimensions()
    }

    /// Best match anywhere on the screen, if it clears the threshold
    pub fn find(&self, screen: &GrayImage, threshold: f64) -> Option<MatchRegion> {
        self.find_in(screen, threshold, None)
    }

    /// Best match within an optional sub-region of the screen
    pub fn find_in(
        &self,
        screen: &GrayImage,
        threshold: f64,
        search: Option<Region>,
    ) -> Option<MatchRegion> {
        let (sw, sh) = screen.dimensions();
        let (tw, th) = self.template.dimensions();
        if tw == 0 || th == 0 || tw > sw || th > sh {
            return None;
        }

        let bounds = search.unwrap_or(Region::new(0, 0, sw, sh));
        let x0 = bounds.left.min(sw);
        let y0 = bounds.top.min(sh);
        let x1 = (bounds.left + bounds.width).min(sw);
        let y1 = (bounds.top + bounds.height).min(sh);
        if x1.saturating_sub(x0) < tw || y1.saturating_sub(y0) < th {
            return None;
        }

        let stats = TemplateStats::of(&self.template);
        // A flat template correlates with everything; refuse to match it
        if stats.denom <= f64::EPSILON {
            return None;
        }

        let mut best: Option<MatchRegion> = None;
        for y in y0..=(y1 - th) {
            for x in x0..=(x1 - tw) {
                let score = correlate_at(screen, &self.template, &stats, x, y);
                if score >= threshold && best.map(|b| score > b.score).unwrap_or(true) {
                    best = Some(MatchRegion {
                        region: Region::new(x, y, tw, th),
                        score,
                    });
                }
            }
        }
        best
    }
}

struct TemplateStats {
    mean: f64,
    denom: f64,
}

impl TemplateStats {
    fn of(template: &GrayImage) -> Self {
        let n = (template.width() * template.height()) as f64;
        let sum: f64 = template.pixels().map(|p| p.0[0] as f64).sum();
        let mean = sum / n;
        let denom: f64 = template
            .pixels()
            .map(|p| {
                let d = p.0[0] as f64 - mean;
                d * d
            })
            .sum();
        Self { mean, denom }
    }
}

/// Zero-mean normalized cross-correlation of the template against the
/// screen window at (x, y)
fn correlate_at(
    screen: &GrayImage,
    template: &GrayImage,
    stats: &TemplateStats,
    x: u32,
    y: u32,
) -> f64 {
    let (tw, th) = template.dimensions();
    let n = (tw * th) as f64;

    let mut window_sum = 0.0;
    for ty in 0..th {
        for tx in 0..tw {
            window_sum += screen.get_pixel(x + tx, y + ty).0[0] as f64;
        }
    }
    let window_mean = window_sum / n;

    let mut cross = 0.0;
    let mut window_var = 0.0;
    for ty in 0..th {
        for tx in 0..tw {
            let s = screen.get_pixel(x + tx, y + ty).0[0] as f64 - window_mean;
            let t = template.get_pixel(tx, ty).0[0] as f64 - stats.mean;
            cross += s * t;
            window_var += s * s;
        }
    }

    let denom = (window_var * stats.denom).sqrt();
    if denom <= f64::EPSILON {
        0.0
    } else {
        cross / denom
    }
}

/// The set of anchors that describes one provider's chat surface.
/// `input_box`, `send_button`, `busy` and the response extraction anchors
/// are required; the rest are optional refinements.
#[derive(Debug, Clone)]
pub struct AnchorSet {
    pub input_box: Anchor,
    pub send_button: Option<Anchor>,
    pub busy: Anchor,
    pub response_ready: Option<Anchor>,
    pub error_banner: Option<Anchor>,
    pub action_icons: Anchor,
    pub copy_button: Anchor,
    pub menu_button: Option<Anchor>,
    pub delete_button: Option<Anchor>,
    pub confirm_button: Option<Anchor>,
}

impl AnchorSet {
    /// Load `<dir>/<provider>/<element>.png` for every element; optional
    /// elements are simply absent when the file is not there.
    pub fn load(dir: &Path, kind: ProviderKind) -> Result<Self> {
        let base: PathBuf = dir.join(kind.to_lowercase_string());
        if !base.is_dir() {
            return Err(anyhow!(
                "anchor directory {:?} for provider {} does not exist",
                base,
                kind.display_name()
            ));
        }

        let required = |element: &str| Anchor::load(element, &base.join(format!("{}.png", element)));
        let optional = |element: &str| {
            let path = base.join(format!("{}.png", element));
            path.exists()
                .then(|| Anchor::load(element, &path))
                .transpose()
        };

        Ok(Self {
            input_box: required("input_box")?,
            send_button: optional("send_btn")?,
            busy: required("is_processing")?,
            response_ready: optional("response_ready")?,
            error_banner: optional("error_banner")?,
            action_icons: required("action_icons")?,
            copy_button: required("copy_btn")?,
            menu_button: optional("more_btn")?,
            delete_button: optional("delete_btn")?,
            confirm_button: optional("confirm_btn")?,
        })
    }
}
