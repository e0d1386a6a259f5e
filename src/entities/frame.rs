//! Decoded frame buffers.
//!
//! Frames are immutable once decoded and cheap to clone (shared buffer),
//! so the same frame can be handed to the timeline, to preview listeners
//! and to the sampler's LRU cache without copying pixels.

use std::fmt;
use std::sync::Arc;

use super::error::DecodeError;
use super::time::TimeMs;

/// Pixel layout of a frame buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 8-bit RGBA, 4 bytes per pixel, tightly packed rows
    Rgba8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgba8 => 4,
        }
    }
}

struct FrameData {
    buffer: Vec<u8>,
    pixel_format: PixelFormat,
    width: usize,
    height: usize,
}

/// Single decoded image
#[derive(Clone)]
pub struct Frame {
    data: Arc<FrameData>,
}

impl Frame {
    /// Wrap a tightly packed RGBA8 buffer.
    pub fn from_rgba(width: usize, height: usize, buffer: Vec<u8>) -> Result<Self, DecodeError> {
        let expected = width * height * PixelFormat::Rgba8.bytes_per_pixel();
        if buffer.len() != expected {
            return Err(DecodeError::InvalidFrame(format!(
                "{}x{} RGBA needs {} bytes, got {}",
                width,
                height,
                expected,
                buffer.len()
            )));
        }
        Ok(Self {
            data: Arc::new(FrameData {
                buffer,
                pixel_format: PixelFormat::Rgba8,
                width,
                height,
            }),
        })
    }

    /// Dark green placeholder, shown when nothing has been decoded yet
    pub fn placeholder(width: usize, height: usize) -> Self {
        let mut buffer = vec![0u8; width * height * 4];
        for px in buffer.chunks_mut(4) {
            px.copy_from_slice(&[0, 100, 0, 255]);
        }
        Self {
            data: Arc::new(FrameData {
                buffer,
                pixel_format: PixelFormat::Rgba8,
                width,
                height,
            }),
        }
    }

    /// Convert any decoded `image` crate buffer to RGBA8
    pub fn from_image(img: image::DynamicImage) -> Self {
        let rgba = img.to_rgba8();
        let (width, height) = (rgba.width() as usize, rgba.height() as usize);
        Self {
            data: Arc::new(FrameData {
                buffer: rgba.into_raw(),
                pixel_format: PixelFormat::Rgba8,
                width,
                height,
            }),
        }
    }

    pub fn width(&self) -> usize {
        self.data.width
    }

    pub fn height(&self) -> usize {
        self.data.height
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.data.pixel_format
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data.buffer
    }

    /// Memory held by the pixel buffer
    pub fn byte_size(&self) -> usize {
        self.data.buffer.len()
    }

    /// True if both handles share the same buffer
    pub fn same_buffer(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.data.width)
            .field("height", &self.data.height)
            .field("format", &self.data.pixel_format)
            .finish()
    }
}

/// Frame tagged with its presentation timestamp
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub pts_ms: TimeMs,
    pub frame: Frame,
}

impl DecodedFrame {
    pub fn new(pts_ms: TimeMs, frame: Frame) -> Self {
        Self { pts_ms, frame }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rgba_checks_size() {
        assert!(Frame::from_rgba(2, 2, vec![0; 16]).is_ok());
        assert!(Frame::from_rgba(2, 2, vec![0; 12]).is_err());
    }

    #[test]
    fn test_clone_shares_buffer() {
        let a = Frame::placeholder(4, 4);
        let b = a.clone();
        assert!(a.same_buffer(&b));
        assert_eq!(b.byte_size(), 64);
        assert_eq!(&b.pixels()[..4], &[0, 100, 0, 255]);
    }
}
