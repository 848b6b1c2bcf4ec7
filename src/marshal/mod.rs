//! Conversion between generic values and their fixed-layout wire form.
//!
//! # Example
//!
//! ```
//! use twain_scan::marshal::{self, Container, Value, WireType};
//!
//! let ty = marshal::type_of_value(&Value::Str("A".repeat(40))).unwrap();
//! assert_eq!(ty, WireType::Str64);
//!
//! let count = Container::one(WireType::Int16, Value::Int16(1));
//! assert_eq!(count.encode().unwrap().len(), 6);
//! ```

pub mod container;
pub mod wire;

pub use container::{Container, ContainerKind, ContainerShape};
pub use wire::{
    from_wire, to_wire, Fix32, FixedStr, Frame, Handle, Rect, Str1024, Str128, Str255, Str32,
    Str64, Value, WireType, WireValue,
};

use crate::error::{TwainError, TwainResult};
use std::any::{type_name, TypeId};

/// Wire type for a Rust type.
///
/// Plain `String` has no single wire type; use a [`FixedStr`] width or
/// [`type_of_value`].
pub fn type_of<T: 'static>() -> TwainResult<WireType> {
    let id = TypeId::of::<T>();
    let table = [
        (TypeId::of::<i8>(), WireType::Int8),
        (TypeId::of::<i16>(), WireType::Int16),
        (TypeId::of::<i32>(), WireType::Int32),
        (TypeId::of::<u8>(), WireType::UInt8),
        (TypeId::of::<u16>(), WireType::UInt16),
        (TypeId::of::<u32>(), WireType::UInt32),
        (TypeId::of::<bool>(), WireType::Bool),
        (TypeId::of::<f32>(), WireType::Fix32),
        (TypeId::of::<Fix32>(), WireType::Fix32),
        (TypeId::of::<Rect>(), WireType::Frame),
        (TypeId::of::<Frame>(), WireType::Frame),
        (TypeId::of::<Str32>(), WireType::Str32),
        (TypeId::of::<Str64>(), WireType::Str64),
        (TypeId::of::<Str128>(), WireType::Str128),
        (TypeId::of::<Str255>(), WireType::Str255),
        (TypeId::of::<Str1024>(), WireType::Str1024),
        (TypeId::of::<Handle>(), WireType::Handle),
    ];
    table
        .iter()
        .find(|(candidate, _)| *candidate == id)
        .map(|(_, ty)| *ty)
        .ok_or_else(|| TwainError::UnknownType(type_name::<T>().to_string()))
}

/// Wire type for a value. Strings get the smallest byte-string type whose
/// capacity holds them.
pub fn type_of_value(value: &Value) -> TwainResult<WireType> {
    Ok(match value {
        Value::Int8(_) => WireType::Int8,
        Value::Int16(_) => WireType::Int16,
        Value::Int32(_) => WireType::Int32,
        Value::UInt8(_) => WireType::UInt8,
        Value::UInt16(_) => WireType::UInt16,
        Value::UInt32(_) => WireType::UInt32,
        Value::Bool(_) => WireType::Bool,
        Value::Real(_) => WireType::Fix32,
        Value::Rect(_) => WireType::Frame,
        Value::Handle(_) => WireType::Handle,
        Value::Str(s) => WireType::smallest_string_for(s.len()).ok_or_else(|| {
            TwainError::UnknownType(format!("string of {} bytes", s.len()))
        })?,
    })
}

/// Byte footprint of a wire type.
pub fn size_of(ty: WireType) -> usize {
    ty.size()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_of_known_types() {
        assert_eq!(type_of::<i16>().unwrap(), WireType::Int16);
        assert_eq!(type_of::<bool>().unwrap(), WireType::Bool);
        assert_eq!(type_of::<f32>().unwrap(), WireType::Fix32);
        assert_eq!(type_of::<Rect>().unwrap(), WireType::Frame);
        assert_eq!(type_of::<Str255>().unwrap(), WireType::Str255);
        assert_eq!(type_of::<Handle>().unwrap(), WireType::Handle);
    }

    #[test]
    fn test_type_of_unknown_types() {
        assert!(matches!(type_of::<u64>(), Err(TwainError::UnknownType(_))));
        assert!(matches!(type_of::<String>(), Err(TwainError::UnknownType(_))));
    }

    #[test]
    fn test_string_value_buckets() {
        let forty = Value::Str("a".repeat(40));
        assert_eq!(type_of_value(&forty).unwrap(), WireType::Str64);

        let too_long = Value::Str("a".repeat(1025));
        assert!(matches!(
            type_of_value(&too_long),
            Err(TwainError::UnknownType(_))
        ));
    }

    #[test]
    fn test_values_survive_their_own_wire_type() {
        let values = [
            Value::Int8(-128),
            Value::Int16(-2),
            Value::Int32(i32::MAX),
            Value::UInt8(255),
            Value::UInt16(0x1005),
            Value::UInt32(7),
            Value::Bool(false),
            Value::Real(0.5),
            Value::Real(-1.0),
            Value::Real(1200.25),
            Value::Rect(Rect {
                x: 0.0,
                y: 0.0,
                width: 8.5,
                height: 11.0,
            }),
            Value::Str("Flatbed".into()),
            Value::Str("b".repeat(200)),
            Value::Handle(0xdead),
        ];
        for value in values {
            let ty = type_of_value(&value).unwrap();
            let wire = to_wire(ty, &value).unwrap();
            assert_eq!(wire.to_bytes().len(), size_of(ty));
            assert_eq!(from_wire(ty, &wire).unwrap(), value);
        }
    }
}
