use std::fmt;

use crate::detection::domain::face_detection::FaceDetection;

/// Which frame edge a rejected face intruded on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => write!(f, "left"),
            Side::Right => write!(f, "right"),
        }
    }
}

/// Why a face failed the dead-zone check.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Intrusion {
    pub side: Side,
    pub left_bound: f64,
    pub right_bound: f64,
}

/// Margins on the left and right of the frame, each `ratio * width` wide,
/// where a detected face is not accepted.
///
/// The ratio is always in `[0, 0.5)`, so the allowed band is non-empty.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DeadZone {
    ratio: f64,
}

impl DeadZone {
    pub const NONE: DeadZone = DeadZone { ratio: 0.0 };

    /// Returns `None` unless `0 <= ratio < 0.5`.
    pub fn new(ratio: f64) -> Option<Self> {
        (0.0..0.5).contains(&ratio).then_some(Self { ratio })
    }

    /// `(left_bound, right_bound)` in pixels for a frame of `image_width`.
    pub fn bounds(&self, image_width: u32) -> (f64, f64) {
        let w = image_width as f64;
        (w * self.ratio, w * (1.0 - self.ratio))
    }

    /// Accepts the face when its box lies inside the bounds, edges inclusive.
    /// The left edge is checked first.
    pub fn check(&self, face: &FaceDetection) -> Result<(), Intrusion> {
        let (left_bound, right_bound) = self.bounds(face.image_width);
        let b = &face.bounding_box;
        let side = if b.left < left_bound {
            Side::Left
        } else if b.right > right_bound {
            Side::Right
        } else {
            return Ok(());
        };
        Err(Intrusion {
            side,
            left_bound,
            right_bound,
        })
    }
}

impl Default for DeadZone {
    fn default() -> Self {
        Self::NONE
    }
}
