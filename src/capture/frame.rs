use serde::{Deserialize, Serialize};
use v4l::FourCC;

/// Pixel formats we support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Raw 16-bit single channel, little endian (V4L2 `Y16 `)
    Y16,
}

impl PixelFormat {
    pub fn fourcc(self) -> FourCC {
        match self {
            PixelFormat::Y16 => FourCC::new(b"Y16 "),
        }
    }

    pub fn bits_per_pixel(self) -> u32 {
        match self {
            PixelFormat::Y16 => 16,
        }
    }

    pub fn bytes_per_pixel(self) -> usize {
        (self.bits_per_pixel() / 8) as usize
    }
}

/// Negotiated device format. Fixed for the life of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFormat {
    pub width: u32,
    pub height: u32,
    pub pixel: PixelFormat,
}

impl DeviceFormat {
    pub fn new(width: u32, height: u32, pixel: PixelFormat) -> Self {
        Self {
            width,
            height,
            pixel,
        }
    }

    /// Bytes in one frame: width × height × bytes per pixel.
    pub fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize * self.pixel.bytes_per_pixel()
    }
}

/// Raw value range of a Y16 frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    pub min: u16,
    pub max: u16,
}

impl FrameStats {
    /// Scan a little-endian Y16 frame. Returns `None` for an empty frame.
    pub fn from_y16(data: &[u8]) -> Option<Self> {
        let mut pixels = data
            .chunks_exact(2)
            .map(|px| u16::from_le_bytes([px[0], px[1]]));

        let first = pixels.next()?;
        let (min, max) = pixels.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
        Some(Self { min, max })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_size_is_two_bytes_per_pixel() {
        for (w, h) in [(640, 512), (320, 256), (1, 1), (0, 512)] {
            let format = DeviceFormat::new(w, h, PixelFormat::Y16);
            assert_eq!(format.frame_size(), w as usize * h as usize * 2);
        }
    }

    #[test]
    fn y16_fourcc_is_padded() {
        assert_eq!(PixelFormat::Y16.fourcc().repr, *b"Y16 ");
        assert_eq!(PixelFormat::Y16.bits_per_pixel(), 16);
    }

    #[test]
    fn stats_read_little_endian_pixels() {
        let data: Vec<u8> = [0x1234u16, 0x0010, 0xff00, 0x0200]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let stats = FrameStats::from_y16(&data).unwrap();
        assert_eq!(stats, FrameStats { min: 0x0010, max: 0xff00 });
    }

    #[test]
    fn stats_of_empty_frame() {
        assert_eq!(FrameStats::from_y16(&[]), None);
    }
}
