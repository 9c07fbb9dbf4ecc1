use image::{DynamicImage, RgbImage};

/// A single image or video frame: contiguous 8-bit pixels in row-major order.
///
/// Accepts 1 (gray), 3 (RGB) or 4 (RGBA) channels. Detectors only read the
/// colour channels; alpha is ignored and gray is replicated.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            index,
        }
    }

    /// Tags the frame with a sequence number (e.g. position in a video).
    pub fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// RGB value at `(x, y)`.
    pub fn rgb(&self, x: usize, y: usize) -> [u8; 3] {
        let c = self.channels as usize;
        let base = (y * self.width as usize + x) * c;
        if c >= 3 {
            [self.data[base], self.data[base + 1], self.data[base + 2]]
        } else {
            let v = self.data[base];
            [v, v, v]
        }
    }
}

impl From<RgbImage> for Frame {
    fn from(img: RgbImage) -> Self {
        let (width, height) = img.dimensions();
        Frame::new(img.into_raw(), width, height, 3, 0)
    }
}

impl From<DynamicImage> for Frame {
    fn from(img: DynamicImage) -> Self {
        match img {
            DynamicImage::ImageLuma8(gray) => {
                let (width, height) = gray.dimensions();
                Frame::new(gray.into_raw(), width, height, 1, 0)
            }
            DynamicImage::ImageRgba8(rgba) => {
                let (width, height) = rgba.dimensions();
                Frame::new(rgba.into_raw(), width, height, 4, 0)
            }
            other => Frame::from(other.into_rgb8()),
        }
    }
}
