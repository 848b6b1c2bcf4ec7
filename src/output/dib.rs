//! Packed device-independent bitmaps as returned by a native transfer.
//!
//! A packed DIB is an info header, optional color masks, a palette and the
//! pixel rows, with no file header. [`DibHeader::to_bmp`] prepends the
//! 14-byte file header so the result can be decoded as a `.bmp` file.

use crate::error::{TwainError, TwainResult};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

/// Size of `BITMAPINFOHEADER`, the smallest header accepted.
pub const INFO_HEADER_LEN: u32 = 40;
const FILE_HEADER_LEN: u32 = 14;
const BI_BITFIELDS: u32 = 3;
const BI_ALPHABITFIELDS: u32 = 6;

/// Fields of the info header needed to locate the pixel data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DibHeader {
    /// Size of the info header.
    pub header_len: u32,
    /// Width in pixels.
    pub width: i32,
    /// Negative for top-down bitmaps.
    pub height: i32,
    /// Bits per pixel.
    pub bit_count: u16,
    /// Compression code.
    pub compression: u32,
    /// Pixel data size; may be 0 for uncompressed bitmaps.
    pub image_size: u32,
    /// Palette entries; 0 means the maximum for the depth.
    pub colors_used: u32,
}

impl DibHeader {
    /// Read and validate the info header of a packed DIB.
    pub fn parse(dib: &[u8]) -> TwainResult<Self> {
        if dib.len() < INFO_HEADER_LEN as usize {
            return Err(TwainError::InvalidBitmap(format!(
                "{} bytes is shorter than a bitmap header",
                dib.len()
            )));
        }

        let mut cursor = Cursor::new(dib);
        let header_len = cursor.read_u32::<LittleEndian>()?;
        let width = cursor.read_i32::<LittleEndian>()?;
        let height = cursor.read_i32::<LittleEndian>()?;
        let _planes = cursor.read_u16::<LittleEndian>()?;
        let bit_count = cursor.read_u16::<LittleEndian>()?;
        let compression = cursor.read_u32::<LittleEndian>()?;
        let image_size = cursor.read_u32::<LittleEndian>()?;
        let _x_ppm = cursor.read_i32::<LittleEndian>()?;
        let _y_ppm = cursor.read_i32::<LittleEndian>()?;
        let colors_used = cursor.read_u32::<LittleEndian>()?;

        if header_len < INFO_HEADER_LEN {
            return Err(TwainError::InvalidBitmap(format!(
                "header size {} is too small",
                header_len
            )));
        }
        if width <= 0 || height == 0 || bit_count == 0 {
            return Err(TwainError::InvalidBitmap(format!(
                "bad geometry {}x{} at {} bpp",
                width, height, bit_count
            )));
        }

        Ok(Self {
            header_len,
            width,
            height,
            bit_count,
            compression,
            image_size,
            colors_used,
        })
    }

    /// Whether rows are stored top row first.
    pub fn is_top_down(&self) -> bool {
        self.height < 0
    }

    /// Bytes per pixel row, padded to four bytes.
    pub fn stride(&self) -> u64 {
        (u64::from(self.width.unsigned_abs()) * u64::from(self.bit_count)).div_ceil(32) * 4
    }

    /// Palette entries that follow the header.
    pub fn palette_entries(&self) -> u32 {
        if self.colors_used != 0 {
            self.colors_used
        } else if self.bit_count <= 8 {
            1 << self.bit_count
        } else {
            0
        }
    }

    /// Offset of the pixel rows from the start of the packed DIB.
    pub fn pixel_offset(&self) -> u64 {
        let masks = match self.compression {
            BI_BITFIELDS if self.header_len == INFO_HEADER_LEN => 12,
            BI_ALPHABITFIELDS if self.header_len == INFO_HEADER_LEN => 16,
            _ => 0,
        };
        u64::from(self.header_len) + masks + u64::from(self.palette_entries()) * 4
    }

    /// Size of the pixel data; computed from the geometry when the header
    /// leaves it zero.
    pub fn pixel_len(&self) -> u64 {
        if self.image_size != 0 {
            u64::from(self.image_size)
        } else {
            self.stride() * u64::from(self.height.unsigned_abs())
        }
    }

    /// Wrap `dib` in a BMP file.
    pub fn to_bmp(&self, dib: &[u8]) -> TwainResult<Vec<u8>> {
        let needed = self.pixel_offset() + self.pixel_len();
        if (dib.len() as u64) < needed {
            return Err(TwainError::Truncated {
                expected: usize::try_from(needed).unwrap_or(usize::MAX),
                got: dib.len(),
            });
        }
        let body = &dib[..needed as usize];
        let file_len = u32::try_from(u64::from(FILE_HEADER_LEN) + needed)
            .map_err(|_| TwainError::InvalidBitmap("bitmap larger than 4 GiB".to_string()))?;
        let offset = FILE_HEADER_LEN + self.pixel_offset() as u32;

        let mut out = Vec::with_capacity(file_len as usize);
        out.extend_from_slice(b"BM");
        out.write_u32::<LittleEndian>(file_len)?;
        out.write_u32::<LittleEndian>(0)?;
        out.write_u32::<LittleEndian>(offset)?;
        out.extend_from_slice(body);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(width: i32, height: i32, bits: u16, compression: u32, colors: u32) -> Vec<u8> {
        let mut out = Vec::new();
        out.write_u32::<LittleEndian>(40).unwrap();
        out.write_i32::<LittleEndian>(width).unwrap();
        out.write_i32::<LittleEndian>(height).unwrap();
        out.write_u16::<LittleEndian>(1).unwrap();
        out.write_u16::<LittleEndian>(bits).unwrap();
        out.write_u32::<LittleEndian>(compression).unwrap();
        out.write_u32::<LittleEndian>(0).unwrap();
        out.write_i32::<LittleEndian>(0).unwrap();
        out.write_i32::<LittleEndian>(0).unwrap();
        out.write_u32::<LittleEndian>(colors).unwrap();
        out.write_u32::<LittleEndian>(0).unwrap();
        out
    }

    #[test]
    fn test_rgb_offsets() {
        let dib = header(3, 2, 24, 0, 0);
        let parsed = DibHeader::parse(&dib).unwrap();
        assert_eq!(parsed.stride(), 12);
        assert_eq!(parsed.pixel_offset(), 40);
        assert_eq!(parsed.pixel_len(), 24);
        assert!(!parsed.is_top_down());
    }

    #[test]
    fn test_palette_and_masks() {
        let mono = DibHeader::parse(&header(10, 1, 1, 0, 0)).unwrap();
        assert_eq!(mono.palette_entries(), 2);
        assert_eq!(mono.pixel_offset(), 48);

        let masked = DibHeader::parse(&header(4, -4, 32, BI_BITFIELDS, 0)).unwrap();
        assert_eq!(masked.pixel_offset(), 52);
        assert_eq!(masked.pixel_len(), 64);
        assert!(masked.is_top_down());
    }

    #[test]
    fn test_file_header() {
        let mut dib = header(1, 1, 24, 0, 0);
        dib.extend_from_slice(&[1, 2, 3, 0]);
        let parsed = DibHeader::parse(&dib).unwrap();
        let bmp = parsed.to_bmp(&dib).unwrap();
        assert_eq!(&bmp[..2], b"BM");
        assert_eq!(bmp.len(), 58);
        assert_eq!(u32::from_le_bytes([bmp[2], bmp[3], bmp[4], bmp[5]]), 58);
        assert_eq!(u32::from_le_bytes([bmp[10], bmp[11], bmp[12], bmp[13]]), 54);
    }

    #[test]
    fn test_short_pixel_data() {
        let dib = header(8, 8, 24, 0, 0);
        let parsed = DibHeader::parse(&dib).unwrap();
        assert!(matches!(parsed.to_bmp(&dib), Err(TwainError::Truncated { .. })));
        assert!(DibHeader::parse(&dib[..20]).is_err());
    }
}
