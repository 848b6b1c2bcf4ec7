//! Primitive wire types and their fixed-layout encodings.
//!
//! All multi-byte fields are little-endian. Strings occupy their full
//! fixed-size buffer; the bytes past the content are zero.

use crate::error::{TwainError, TwainResult};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::{Read, Write};

/// Item type tag of a wire value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireType {
    /// Signed 8-bit integer.
    Int8,
    /// Signed 16-bit integer.
    Int16,
    /// Signed 32-bit integer.
    Int32,
    /// Unsigned 8-bit integer.
    UInt8,
    /// Unsigned 16-bit integer.
    UInt16,
    /// Unsigned 32-bit integer.
    UInt32,
    /// Boolean stored as a 16-bit word.
    Bool,
    /// 16.16 fixed-point real.
    Fix32,
    /// Rectangle of four fixed-point edges.
    Frame,
    /// 32-byte string.
    Str32,
    /// 64-byte string.
    Str64,
    /// 128-byte string.
    Str128,
    /// 255-byte string.
    Str255,
    /// 1024-byte string.
    Str1024,
    /// 512-byte wide string, only by explicit type.
    Uni512,
    /// Opaque native handle.
    Handle,
}

/// Byte-string buckets in ascending capacity, for smallest-fit selection.
pub const STRING_BUCKETS: [WireType; 5] = [
    WireType::Str32,
    WireType::Str64,
    WireType::Str128,
    WireType::Str255,
    WireType::Str1024,
];

impl WireType {
    /// Protocol type code.
    pub fn code(self) -> u16 {
        match self {
            WireType::Int8 => 0x0000,
            WireType::Int16 => 0x0001,
            WireType::Int32 => 0x0002,
            WireType::UInt8 => 0x0003,
            WireType::UInt16 => 0x0004,
            WireType::UInt32 => 0x0005,
            WireType::Bool => 0x0006,
            WireType::Fix32 => 0x0007,
            WireType::Frame => 0x0008,
            WireType::Str32 => 0x0009,
            WireType::Str64 => 0x000a,
            WireType::Str128 => 0x000b,
            WireType::Str255 => 0x000c,
            WireType::Str1024 => 0x000d,
            WireType::Uni512 => 0x000e,
            WireType::Handle => 0x000f,
        }
    }

    /// Wire type for a protocol type code.
    pub fn from_code(code: u16) -> TwainResult<Self> {
        Ok(match code {
            0x0000 => WireType::Int8,
            0x0001 => WireType::Int16,
            0x0002 => WireType::Int32,
            0x0003 => WireType::UInt8,
            0x0004 => WireType::UInt16,
            0x0005 => WireType::UInt32,
            0x0006 => WireType::Bool,
            0x0007 => WireType::Fix32,
            0x0008 => WireType::Frame,
            0x0009 => WireType::Str32,
            0x000a => WireType::Str64,
            0x000b => WireType::Str128,
            0x000c => WireType::Str255,
            0x000d => WireType::Str1024,
            0x000e => WireType::Uni512,
            0x000f => WireType::Handle,
            other => return Err(TwainError::UnknownType(format!("type code {:#06x}", other))),
        })
    }

    /// Exact byte footprint of one encoded value.
    pub fn size(self) -> usize {
        match self {
            WireType::Int8 | WireType::UInt8 => 1,
            WireType::Int16 | WireType::UInt16 | WireType::Bool => 2,
            WireType::Int32 | WireType::UInt32 | WireType::Fix32 => 4,
            WireType::Frame => 16,
            WireType::Str32 => 34,
            WireType::Str64 => 66,
            WireType::Str128 => 130,
            WireType::Str255 => 256,
            WireType::Str1024 => 1026,
            WireType::Uni512 => 512,
            WireType::Handle => std::mem::size_of::<usize>(),
        }
    }

    /// Content capacity of a string type, `None` for non-strings.
    pub fn string_capacity(self) -> Option<usize> {
        match self {
            WireType::Str32 => Some(32),
            WireType::Str64 => Some(64),
            WireType::Str128 => Some(128),
            WireType::Str255 => Some(255),
            WireType::Uni512 => Some(512),
            WireType::Str1024 => Some(1024),
            _ => None,
        }
    }

    /// Whether this is one of the string types.
    pub fn is_string(self) -> bool {
        self.string_capacity().is_some()
    }

    /// Smallest byte-string type able to hold `len` bytes.
    pub fn smallest_string_for(len: usize) -> Option<Self> {
        STRING_BUCKETS
            .iter()
            .copied()
            .find(|ty| ty.string_capacity().is_some_and(|cap| cap >= len))
    }
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// 16.16 fixed-point number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Fix32 {
    /// Integer part, rounded toward negative infinity.
    pub whole: i16,
    /// Fraction in 1/65536 units.
    pub frac: u16,
}

impl Fix32 {
    /// Nearest fixed-point value. NaN and values outside `[-32768, 32768)`
    /// have no representation.
    pub fn from_f32(value: f32) -> TwainResult<Self> {
        let scaled = (f64::from(value) * 65536.0).round();
        if !(f64::from(i32::MIN)..=f64::from(i32::MAX)).contains(&scaled) {
            return Err(TwainError::ValueOutOfRange(WireType::Fix32.to_string()));
        }
        let scaled = scaled as i32;
        Ok(Self {
            whole: (scaled >> 16) as i16,
            frac: (scaled & 0xffff) as u16,
        })
    }

    /// Exact value as a float.
    pub fn to_f32(self) -> f32 {
        let scaled = i64::from(self.whole) * 65536 + i64::from(self.frac);
        (scaled as f64 / 65536.0) as f32
    }

    fn write<W: Write>(self, w: &mut W) -> std::io::Result<()> {
        w.write_i16::<LittleEndian>(self.whole)?;
        w.write_u16::<LittleEndian>(self.frac)
    }

    fn read<R: Read>(r: &mut R) -> std::io::Result<Self> {
        Ok(Self {
            whole: r.read_i16::<LittleEndian>()?,
            frac: r.read_u16::<LittleEndian>()?,
        })
    }
}

/// Rectangle as position and extent.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rect {
    /// Left edge.
    pub x: f32,
    /// Top edge.
    pub y: f32,
    /// Horizontal extent.
    pub width: f32,
    /// Vertical extent.
    pub height: f32,
}

/// Rectangle as four fixed-point edges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Frame {
    /// Left edge.
    pub left: Fix32,
    /// Top edge.
    pub top: Fix32,
    /// Right edge.
    pub right: Fix32,
    /// Bottom edge.
    pub bottom: Fix32,
}

impl TryFrom<Rect> for Frame {
    type Error = TwainError;

    fn try_from(rect: Rect) -> TwainResult<Self> {
        Ok(Self {
            left: Fix32::from_f32(rect.x)?,
            top: Fix32::from_f32(rect.y)?,
            right: Fix32::from_f32(rect.x + rect.width)?,
            bottom: Fix32::from_f32(rect.y + rect.height)?,
        })
    }
}

impl From<Frame> for Rect {
    fn from(frame: Frame) -> Self {
        let left = frame.left.to_f32();
        let top = frame.top.to_f32();
        Self {
            x: left,
            y: top,
            width: frame.right.to_f32() - left,
            height: frame.bottom.to_f32() - top,
        }
    }
}

/// Opaque native handle carried as a value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Handle(pub usize);

/// Fixed-capacity string of at most `N` bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixedStr<const N: usize>(pub String);

/// String of the 32-byte wire type.
pub type Str32 = FixedStr<32>;
/// String of the 64-byte wire type.
pub type Str64 = FixedStr<64>;
/// String of the 128-byte wire type.
pub type Str128 = FixedStr<128>;
/// String of the 255-byte wire type.
pub type Str255 = FixedStr<255>;
/// String of the 1024-byte wire type.
pub type Str1024 = FixedStr<1024>;

/// Generic value exchanged with the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Signed 8-bit integer.
    Int8(i8),
    /// Signed 16-bit integer.
    Int16(i16),
    /// Signed 32-bit integer.
    Int32(i32),
    /// Unsigned 8-bit integer.
    UInt8(u8),
    /// Unsigned 16-bit integer.
    UInt16(u16),
    /// Unsigned 32-bit integer.
    UInt32(u32),
    /// Boolean.
    Bool(bool),
    /// Real number, carried as fixed point.
    Real(f32),
    /// Rectangle, carried as a frame.
    Rect(Rect),
    /// Text, carried in a fixed-size string.
    Str(String),
    /// Opaque native handle.
    Handle(usize),
}

impl Value {
    /// The value as a signed integer, for any integer variant.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Int8(v) => Some(i64::from(v)),
            Value::Int16(v) => Some(i64::from(v)),
            Value::Int32(v) => Some(i64::from(v)),
            Value::UInt8(v) => Some(i64::from(v)),
            Value::UInt16(v) => Some(i64::from(v)),
            Value::UInt32(v) => Some(i64::from(v)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int8(v) => write!(f, "{}", v),
            Value::Int16(v) => write!(f, "{}", v),
            Value::Int32(v) => write!(f, "{}", v),
            Value::UInt8(v) => write!(f, "{}", v),
            Value::UInt16(v) => write!(f, "{}", v),
            Value::UInt32(v) => write!(f, "{}", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Real(v) => write!(f, "{}", v),
            Value::Rect(r) => write!(f, "[{}, {}, {}x{}]", r.x, r.y, r.width, r.height),
            Value::Str(s) => write!(f, "\"{}\"", s),
            Value::Handle(h) => write!(f, "{:#x}", h),
        }
    }
}

/// A value in its wire representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireValue {
    /// Signed 8-bit integer.
    Int8(i8),
    /// Signed 16-bit integer.
    Int16(i16),
    /// Signed 32-bit integer.
    Int32(i32),
    /// Unsigned 8-bit integer.
    UInt8(u8),
    /// Unsigned 16-bit integer.
    UInt16(u16),
    /// Unsigned 32-bit integer.
    UInt32(u32),
    /// 16-bit word, 0 or 1.
    Bool(u16),
    /// Fixed-point real.
    Fix32(Fix32),
    /// Fixed-point rectangle.
    Frame(Frame),
    /// Full fixed-size buffer of the given string type.
    Str(WireType, Vec<u8>),
    /// Opaque native handle.
    Handle(usize),
}

impl WireValue {
    /// Wire type of this value.
    pub fn wire_type(&self) -> WireType {
        match self {
            WireValue::Int8(_) => WireType::Int8,
            WireValue::Int16(_) => WireType::Int16,
            WireValue::Int32(_) => WireType::Int32,
            WireValue::UInt8(_) => WireType::UInt8,
            WireValue::UInt16(_) => WireType::UInt16,
            WireValue::UInt32(_) => WireType::UInt32,
            WireValue::Bool(_) => WireType::Bool,
            WireValue::Fix32(_) => WireType::Fix32,
            WireValue::Frame(_) => WireType::Frame,
            WireValue::Str(ty, _) => *ty,
            WireValue::Handle(_) => WireType::Handle,
        }
    }

    /// Write exactly `wire_type().size()` bytes.
    pub fn write<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        match self {
            WireValue::Int8(v) => w.write_i8(*v),
            WireValue::Int16(v) => w.write_i16::<LittleEndian>(*v),
            WireValue::Int32(v) => w.write_i32::<LittleEndian>(*v),
            WireValue::UInt8(v) => w.write_u8(*v),
            WireValue::UInt16(v) => w.write_u16::<LittleEndian>(*v),
            WireValue::UInt32(v) => w.write_u32::<LittleEndian>(*v),
            WireValue::Bool(v) => w.write_u16::<LittleEndian>(*v),
            WireValue::Fix32(v) => v.write(w),
            WireValue::Frame(frame) => {
                frame.left.write(w)?;
                frame.top.write(w)?;
                frame.right.write(w)?;
                frame.bottom.write(w)
            }
            WireValue::Str(ty, bytes) => {
                let mut buffer = vec![0u8; ty.size()];
                let n = bytes.len().min(buffer.len());
                buffer[..n].copy_from_slice(&bytes[..n]);
                w.write_all(&buffer)
            }
            WireValue::Handle(h) => {
                w.write_uint::<LittleEndian>(*h as u64, std::mem::size_of::<usize>())
            }
        }
    }

    /// Read one value of type `ty`.
    pub fn read<R: Read>(ty: WireType, r: &mut R) -> std::io::Result<Self> {
        Ok(match ty {
            WireType::Int8 => WireValue::Int8(r.read_i8()?),
            WireType::Int16 => WireValue::Int16(r.read_i16::<LittleEndian>()?),
            WireType::Int32 => WireValue::Int32(r.read_i32::<LittleEndian>()?),
            WireType::UInt8 => WireValue::UInt8(r.read_u8()?),
            WireType::UInt16 => WireValue::UInt16(r.read_u16::<LittleEndian>()?),
            WireType::UInt32 => WireValue::UInt32(r.read_u32::<LittleEndian>()?),
            WireType::Bool => WireValue::Bool(r.read_u16::<LittleEndian>()?),
            WireType::Fix32 => WireValue::Fix32(Fix32::read(r)?),
            WireType::Frame => WireValue::Frame(Frame {
                left: Fix32::read(r)?,
                top: Fix32::read(r)?,
                right: Fix32::read(r)?,
                bottom: Fix32::read(r)?,
            }),
            WireType::Handle => WireValue::Handle(
                r.read_uint::<LittleEndian>(std::mem::size_of::<usize>())? as usize,
            ),
            string_type => {
                let mut buffer = vec![0u8; string_type.size()];
                r.read_exact(&mut buffer)?;
                WireValue::Str(string_type, buffer)
            }
        })
    }

    /// Encoded bytes of this value.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.wire_type().size());
        // Writing into a Vec cannot fail.
        let _ = self.write(&mut out);
        out
    }
}

fn mismatch(expected: WireType, value: &Value) -> TwainError {
    TwainError::TypeMismatch {
        expected: expected.to_string(),
        value: value.to_string(),
    }
}

fn narrow<T: TryFrom<i64>>(ty: WireType, value: &Value) -> TwainResult<T> {
    let wide = value.as_i64().ok_or_else(|| mismatch(ty, value))?;
    T::try_from(wide).map_err(|_| TwainError::ValueOutOfRange(ty.to_string()))
}

/// Encode a generic value as wire type `ty`.
///
/// Integer values convert between integer wire types when they fit.
/// Strings longer than the capacity of `ty` are cut at the capacity.
pub fn to_wire(ty: WireType, value: &Value) -> TwainResult<WireValue> {
    Ok(match ty {
        WireType::Int8 => WireValue::Int8(narrow(ty, value)?),
        WireType::Int16 => WireValue::Int16(narrow(ty, value)?),
        WireType::Int32 => WireValue::Int32(narrow(ty, value)?),
        WireType::UInt8 => WireValue::UInt8(narrow(ty, value)?),
        WireType::UInt16 => WireValue::UInt16(narrow(ty, value)?),
        WireType::UInt32 => WireValue::UInt32(narrow(ty, value)?),
        WireType::Bool => match value {
            Value::Bool(b) => WireValue::Bool(u16::from(*b)),
            other => return Err(mismatch(ty, other)),
        },
        WireType::Fix32 => match value {
            Value::Real(r) => WireValue::Fix32(Fix32::from_f32(*r)?),
            other => return Err(mismatch(ty, other)),
        },
        WireType::Frame => match value {
            Value::Rect(rect) => WireValue::Frame(Frame::try_from(*rect)?),
            other => return Err(mismatch(ty, other)),
        },
        WireType::Handle => match value {
            Value::Handle(h) => WireValue::Handle(*h),
            other => return Err(mismatch(ty, other)),
        },
        string_type => match value {
            Value::Str(s) => {
                let capacity = string_type.string_capacity().unwrap_or(0);
                let bytes = s.as_bytes();
                let mut buffer = vec![0u8; string_type.size()];
                let n = bytes.len().min(capacity);
                buffer[..n].copy_from_slice(&bytes[..n]);
                WireValue::Str(string_type, buffer)
            }
            other => return Err(mismatch(string_type, other)),
        },
    })
}

/// Decode a wire value that is expected to be of type `ty`.
pub fn from_wire(ty: WireType, wire: &WireValue) -> TwainResult<Value> {
    if wire.wire_type() != ty {
        return Err(TwainError::TypeMismatch {
            expected: ty.to_string(),
            value: wire.wire_type().to_string(),
        });
    }
    Ok(match wire {
        WireValue::Int8(v) => Value::Int8(*v),
        WireValue::Int16(v) => Value::Int16(*v),
        WireValue::Int32(v) => Value::Int32(*v),
        WireValue::UInt8(v) => Value::UInt8(*v),
        WireValue::UInt16(v) => Value::UInt16(*v),
        WireValue::UInt32(v) => Value::UInt32(*v),
        WireValue::Bool(v) => Value::Bool(*v != 0),
        WireValue::Fix32(f) => Value::Real(f.to_f32()),
        WireValue::Frame(frame) => Value::Rect(Rect::from(*frame)),
        WireValue::Handle(h) => Value::Handle(*h),
        WireValue::Str(ty, bytes) => {
            let capacity = ty.string_capacity().unwrap_or(0).min(bytes.len());
            let content = &bytes[..capacity];
            let end = content.iter().position(|&b| b == 0).unwrap_or(content.len());
            Value::Str(String::from_utf8_lossy(&content[..end]).into_owned())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_fix32_boundaries() {
        assert_eq!(Fix32::from_f32(0.5).unwrap(), Fix32 { whole: 0, frac: 32768 });
        assert_eq!(Fix32::from_f32(-1.0).unwrap(), Fix32 { whole: -1, frac: 0 });
        assert_eq!(Fix32::from_f32(-0.5).unwrap(), Fix32 { whole: -1, frac: 32768 });
        assert_eq!(Fix32::from_f32(300.0).unwrap(), Fix32 { whole: 300, frac: 0 });
        assert_eq!(Fix32::from_f32(-32768.0).unwrap(), Fix32 { whole: -32768, frac: 0 });
        assert_eq!(Fix32 { whole: -1, frac: 32768 }.to_f32(), -0.5);
        assert_eq!(Fix32 { whole: 0, frac: 32768 }.to_f32(), 0.5);
    }

    #[test]
    fn test_fix32_out_of_range_is_rejected() {
        for value in [40000.0, 32768.0, -32769.0, f32::NAN, f32::INFINITY] {
            assert!(
                matches!(
                    to_wire(WireType::Fix32, &Value::Real(value)),
                    Err(TwainError::ValueOutOfRange(ref ty)) if ty == "Fix32"
                ),
                "{value}"
            );
        }
        let wide = Rect {
            x: 32000.0,
            y: 0.0,
            width: 1000.0,
            height: 1.0,
        };
        assert!(to_wire(WireType::Frame, &Value::Rect(wide)).is_err());

        let edge = to_wire(WireType::Fix32, &Value::Real(32767.5)).unwrap();
        assert_eq!(from_wire(WireType::Fix32, &edge).unwrap(), Value::Real(32767.5));
    }

    #[test]
    fn test_frame_edges() {
        let rect = Rect {
            x: 1.0,
            y: 2.0,
            width: 8.5,
            height: 11.0,
        };
        let frame = Frame::try_from(rect).unwrap();
        assert_eq!(frame.right.to_f32(), 9.5);
        assert_eq!(frame.bottom.to_f32(), 13.0);
        assert_eq!(Rect::from(frame), rect);
    }

    #[test]
    fn test_bool_is_a_word() {
        let wire = to_wire(WireType::Bool, &Value::Bool(true)).unwrap();
        assert_eq!(wire.to_bytes(), vec![1, 0]);
        assert_eq!(from_wire(WireType::Bool, &wire).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_string_sizes() {
        assert_eq!(WireType::Str32.size(), 34);
        assert_eq!(WireType::Str64.size(), 66);
        assert_eq!(WireType::Str128.size(), 130);
        assert_eq!(WireType::Str255.size(), 256);
        assert_eq!(WireType::Uni512.size(), 512);
        assert_eq!(WireType::Str1024.size(), 1026);
    }

    #[test]
    fn test_smallest_string_bucket() {
        assert_eq!(WireType::smallest_string_for(0), Some(WireType::Str32));
        assert_eq!(WireType::smallest_string_for(32), Some(WireType::Str32));
        assert_eq!(WireType::smallest_string_for(40), Some(WireType::Str64));
        assert_eq!(WireType::smallest_string_for(255), Some(WireType::Str255));
        assert_eq!(WireType::smallest_string_for(256), Some(WireType::Str1024));
        assert_eq!(WireType::smallest_string_for(1025), None);
    }

    #[test]
    fn test_string_is_cut_at_capacity() {
        let long = "x".repeat(40);
        let wire = to_wire(WireType::Str32, &Value::Str(long)).unwrap();
        assert_eq!(wire.to_bytes().len(), 34);
        assert_eq!(
            from_wire(WireType::Str32, &wire).unwrap(),
            Value::Str("x".repeat(32))
        );
    }

    #[test]
    fn test_integer_narrowing() {
        assert_eq!(
            to_wire(WireType::Int16, &Value::Int32(1)).unwrap(),
            WireValue::Int16(1)
        );
        assert!(matches!(
            to_wire(WireType::UInt8, &Value::Int32(-1)),
            Err(TwainError::ValueOutOfRange(_))
        ));
        assert!(matches!(
            to_wire(WireType::Int16, &Value::Str("1".into())),
            Err(TwainError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_from_wire_rejects_other_type() {
        let wire = WireValue::UInt16(3);
        assert!(from_wire(WireType::Int16, &wire).is_err());
    }

    #[test]
    fn test_read_matches_write() {
        let frame = Frame::try_from(Rect {
            x: 0.0,
            y: 0.0,
            width: 8.5,
            height: 11.0,
        })
        .unwrap();
        let wire = WireValue::Frame(frame);
        let bytes = wire.to_bytes();
        assert_eq!(bytes.len(), 16);
        let back = WireValue::read(WireType::Frame, &mut Cursor::new(bytes)).unwrap();
        assert_eq!(back, wire);
    }

    #[test]
    fn test_unknown_type_code() {
        assert!(matches!(
            WireType::from_code(0x0042),
            Err(TwainError::UnknownType(_))
        ));
    }
}
