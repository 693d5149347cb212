//! Frame type and pixel conversions: YUYV, GREY and Y16 to 8-bit luma.

/// A captured grayscale camera frame.
#[derive(Clone)]
pub struct Frame {
    /// Grayscale pixel data (width * height bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: std::time::Instant,
    pub sequence: u32,
}

impl Frame {
    /// Number of pixels the frame claims to hold.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// True when the frame has a non-zero size and enough bytes to cover it.
    pub fn is_decodable(&self) -> bool {
        let pixels = self.pixel_count();
        pixels > 0 && self.data.len() >= pixels
    }
}

/// Convert packed YUYV (4:2:2) to grayscale by extracting the Y channel.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V].
/// Grayscale = every even-indexed byte.
pub fn yuyv_to_grayscale(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = width as usize * height as usize * 2;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }
    Ok(yuyv[..expected].iter().step_by(2).copied().collect())
}

/// Downscale 16-bit little-endian luma to 8 bits by keeping the high byte.
pub fn y16_to_grayscale(y16: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let pixels = width as usize * height as usize;
    let expected = pixels * 2;
    if y16.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: y16.len(),
        });
    }
    Ok(y16[..expected].chunks_exact(2).map(|px| px[1]).collect())
}

/// Copy the leading `width * height` bytes of a GREY buffer.
pub fn grey_to_grayscale(grey: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = width as usize * height as usize;
    if grey.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: grey.len(),
        });
    }
    Ok(grey[..expected].to_vec())
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(data: Vec<u8>, width: u32, height: u32) -> Frame {
        Frame {
            data,
            width,
            height,
            timestamp: std::time::Instant::now(),
            sequence: 0,
        }
    }

    #[test]
    fn test_yuyv_to_grayscale() {
        // 2x1 image: [Y0=100, U=128, Y1=200, V=128]
        let yuyv = vec![100, 128, 200, 128];
        let gray = yuyv_to_grayscale(&yuyv, 2, 1).unwrap();
        assert_eq!(gray, vec![100, 200]);
    }

    #[test]
    fn test_yuyv_invalid_length() {
        let yuyv = vec![100, 128]; // too short for 2x1
        assert!(yuyv_to_grayscale(&yuyv, 2, 1).is_err());
    }

    #[test]
    fn test_y16_keeps_high_byte() {
        // two pixels: 0x12ff and 0x8001 (little-endian)
        let y16 = vec![0xff, 0x12, 0x01, 0x80];
        let gray = y16_to_grayscale(&y16, 2, 1).unwrap();
        assert_eq!(gray, vec![0x12, 0x80]);
    }

    #[test]
    fn test_grey_truncates_padding() {
        let grey = vec![1, 2, 3, 4, 99, 99];
        assert_eq!(grey_to_grayscale(&grey, 2, 2).unwrap(), vec![1, 2, 3, 4]);
        assert!(grey_to_grayscale(&grey[..3], 2, 2).is_err());
    }

    #[test]
    fn test_zero_sized_frame_is_not_decodable() {
        assert!(!frame(Vec::new(), 0, 0).is_decodable());
        assert!(!frame(vec![0; 16], 0, 4).is_decodable());
    }

    #[test]
    fn test_short_buffer_is_not_decodable() {
        assert!(!frame(vec![0; 15], 4, 4).is_decodable());
        assert!(frame(vec![0; 16], 4, 4).is_decodable());
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_large_dimensions_do_not_overflow() {
        let err = yuyv_to_grayscale(&[0; 4], 70_000, 70_000).unwrap_err();
        assert!(matches!(
            err,
            FrameError::InvalidLength {
                expected: 9_800_000_000,
                actual: 4
            }
        ));

        let err = y16_to_grayscale(&[0; 4], 70_000, 70_000).unwrap_err();
        assert!(matches!(err, FrameError::InvalidLength { expected: 9_800_000_000, .. }));

        let err = grey_to_grayscale(&[0; 4], 70_000, 70_000).unwrap_err();
        assert!(matches!(err, FrameError::InvalidLength { expected: 4_900_000_000, .. }));
    }
}
