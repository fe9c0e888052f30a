//! Distribution projector: accumulation in, donut geometry out.
//!
//! Pure and total.  Angles are in radians, screen convention (y grows
//! downwards, so increasing angle runs clockwise), starting at twelve
//! o'clock (`-π/2`).
//!
//! ```text
//!            -π/2
//!             │   WorkOFF
//!        ┌────┼────┐
//!        │  ┌─┴─┐  │
//!  Working  │ ○ │  WorkON      hole = 0.55 × r, labels at 0.92 × r
//!        │  └───┘  │
//!        └─────────┘
//! ```

use core::f64::consts::{FRAC_PI_2, TAU};
use core::fmt;

use serde::{Serialize, Serializer};

use crate::accumulator::ModeAccumulation;
use crate::telemetry::Mode;

/// Inner radius as a fraction of the outer one.
pub const HOLE_RATIO: f64 = 0.55;
/// Label distance from the centre as a fraction of the outer radius.
pub const LABEL_RADIUS_RATIO: f64 = 0.92;
/// Relative luminance above which labels switch to the dark colour.
pub const LUMINANCE_THRESHOLD: f64 = 0.6;

// ---------------------------------------------------------------------------
// Colour
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    /// Opacity in `[0, 1]`.
    pub a: f64,
}

impl Rgba {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    /// `0.299 R + 0.587 G + 0.114 B`, normalised to `[0, 1]`.
    pub fn luminance(&self) -> f64 {
        (0.299 * f64::from(self.r) + 0.587 * f64::from(self.g) + 0.114 * f64::from(self.b))
            / 255.0
    }

    /// Dark text on light fills, light text on dark ones.
    pub fn contrasting_label(&self) -> Rgba {
        if self.luminance() > LUMINANCE_THRESHOLD {
            LABEL_DARK
        } else {
            LABEL_LIGHT
        }
    }
}

/// CSS notation: `#rrggbb` when opaque, `rgba(r,g,b,a)` otherwise.
impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.a >= 1.0 {
            write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            write!(f, "rgba({},{},{},{})", self.r, self.g, self.b, self.a)
        }
    }
}

impl Serialize for Rgba {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

pub const LABEL_DARK: Rgba = Rgba::rgb(0x00, 0x00, 0x00);
pub const LABEL_LIGHT: Rgba = Rgba::rgb(0xff, 0xff, 0xff);
pub const PLACEHOLDER_FILL: Rgba = Rgba {
    r: 149,
    g: 149,
    b: 149,
    a: 0.3,
};

/// Slice fill per mode.
pub const fn mode_color(mode: Mode) -> Rgba {
    match mode {
        Mode::WorkOff => Rgba::rgb(0xef, 0x44, 0x44),
        Mode::WorkOn => Rgba::rgb(0x22, 0xc5, 0x5e),
        Mode::Working => Rgba::rgb(0xa8, 0x55, 0xf7),
    }
}

// ---------------------------------------------------------------------------
// Slices
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SliceLabel {
    pub x: f64,
    pub y: f64,
    pub text: String,
    pub color: Rgba,
}

/// One annular sector.  `mode` is `None` for the empty-data placeholder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionSlice {
    pub mode: Option<Mode>,
    /// Share of the total, in `[0, 1]`.
    pub fraction: f64,
    pub start_angle: f64,
    pub end_angle: f64,
    pub fill: Rgba,
    /// Absent for zero-width slices and the placeholder.
    pub label: Option<SliceLabel>,
}

impl DistributionSlice {
    pub fn sweep(&self) -> f64 {
        self.end_angle - self.start_angle
    }
}

/// Circle the donut is drawn into.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Projector {
    pub center_x: f64,
    pub center_y: f64,
    pub radius: f64,
}

impl Default for Projector {
    /// Unit circle at the origin.
    fn default() -> Self {
        Self {
            center_x: 0.0,
            center_y: 0.0,
            radius: 1.0,
        }
    }
}

impl Projector {
    pub fn new(center_x: f64, center_y: f64, radius: f64) -> Self {
        Self {
            center_x,
            center_y,
            radius,
        }
    }

    /// Inner radius for the renderer.
    pub fn hole_radius(&self) -> f64 {
        self.radius * HOLE_RATIO
    }

    pub fn project(&self, accumulation: &ModeAccumulation) -> Vec<DistributionSlice> {
        let Some(shares) = accumulation.shares() else {
            return vec![DistributionSlice {
                mode: None,
                fraction: 1.0,
                start_angle: -FRAC_PI_2,
                end_angle: -FRAC_PI_2 + TAU,
                fill: PLACEHOLDER_FILL,
                label: None,
            }];
        };

        let mut slices = Vec::with_capacity(Mode::COUNT);
        let mut start = -FRAC_PI_2;

        for (mode, fraction) in Mode::ALL.into_iter().zip(shares) {
            let end = start + fraction * TAU;
            let fill = mode_color(mode);

            let label = (fraction > 0.0).then(|| {
                let mid = (start + end) / 2.0;
                let r = self.radius * LABEL_RADIUS_RATIO;
                SliceLabel {
                    x: self.center_x + mid.cos() * r,
                    y: self.center_y + mid.sin() * r,
                    text: percent_label(fraction),
                    color: fill.contrasting_label(),
                }
            });

            slices.push(DistributionSlice {
                mode: Some(mode),
                fraction,
                start_angle: start,
                end_angle: end,
                fill,
                label,
            });
            start = end;
        }

        // Close the circle exactly regardless of rounding.
        if let Some(last) = slices.iter_mut().rev().find(|s| s.fraction > 0.0) {
            last.end_angle = -FRAC_PI_2 + TAU;
        }
        slices
    }
}

/// [`Projector::project`] on the unit circle.
pub fn project(accumulation: &ModeAccumulation) -> Vec<DistributionSlice> {
    Projector::default().project(accumulation)
}

/// `0.4%` below one percent, `67%` otherwise.
pub fn percent_label(fraction: f64) -> String {
    let pct = fraction * 100.0;
    if pct < 1.0 {
        format!("{pct:.1}%")
    } else {
        format!("{}%", pct.round() as u32)
    }
}
