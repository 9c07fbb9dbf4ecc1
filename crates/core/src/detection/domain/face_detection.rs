/// Axis-aligned box in frame pixel coordinates.
///
/// `right` and `bottom` are exclusive edges: `width = right - left`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl BoundingBox {
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn from_xywh(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    pub fn area(&self) -> f64 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let inter = BoundingBox::new(
            self.left.max(other.left),
            self.top.max(other.top),
            self.right.min(other.right),
            self.bottom.min(other.bottom),
        )
        .area();
        if inter == 0.0 {
            return 0.0;
        }
        inter / (self.area() + other.area() - inter)
    }
}

/// One face found in a frame, with the frame's dimensions for context.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceDetection {
    pub bounding_box: BoundingBox,
    pub image_width: u32,
    pub image_height: u32,
    pub score: f64,
}

impl FaceDetection {
    pub fn new(bounding_box: BoundingBox, image_width: u32, image_height: u32, score: f64) -> Self {
        Self {
            bounding_box,
            image_width,
            image_height,
            score,
        }
    }
}
