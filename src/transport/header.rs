//! One-time plaintext stream header.
//!
//! ```text
//! Brand: flir
//! Model: boson
//! ResX: 640
//! ResY: 512
//! FPS: 60
//! FrameSize: 655360
//! PixelBits: 16
//!
//! ```

use std::fmt;

use crate::capture::DeviceFormat;

/// Stream description sent once per connection, before any frame bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderRecord {
    pub brand: String,
    pub model: String,
    pub res_x: u32,
    pub res_y: u32,
    pub fps: u32,
    pub frame_size: usize,
    pub pixel_bits: u32,
}

impl HeaderRecord {
    pub fn new(
        brand: impl Into<String>,
        model: impl Into<String>,
        fps: u32,
        format: &DeviceFormat,
    ) -> Self {
        Self {
            brand: brand.into(),
            model: model.into(),
            res_x: format.width,
            res_y: format.height,
            fps,
            frame_size: format.frame_size(),
            pixel_bits: format.pixel.bits_per_pixel(),
        }
    }

    /// Field name/value pairs in wire order.
    pub fn fields(&self) -> [(&'static str, String); 7] {
        [
            ("Brand", self.brand.clone()),
            ("Model", self.model.clone()),
            ("ResX", self.res_x.to_string()),
            ("ResY", self.res_y.to_string()),
            ("FPS", self.fps.to_string()),
            ("FrameSize", self.frame_size.to_string()),
            ("PixelBits", self.pixel_bits.to_string()),
        ]
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl fmt::Display for HeaderRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in self.fields() {
            writeln!(f, "{}: {}", key, value)?;
        }
        writeln!(f)
    }
}
