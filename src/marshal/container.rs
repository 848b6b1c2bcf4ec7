//! Capability containers.
//!
//! A capability value travels inside one of four container kinds. On the wire
//! each starts with the item type tag; the single-value kind has two layouts,
//! giving five shapes in total:
//!
//! | Shape            | Layout                                                      |
//! |------------------|-------------------------------------------------------------|
//! | one value        | `u16 type`, `u32 item` (value in the low bytes)             |
//! | custom one value | `u16 type`, full encoded value (strings, frames)            |
//! | range            | `u16 type`, `u32` min, max, step, default, current          |
//! | array            | `u16 type`, `u32 count`, items                              |
//! | enumeration      | `u16 type`, `u32` count, current index, default index, items|

use super::wire::{from_wire, to_wire, Value, WireType, WireValue};
use crate::error::{TwainError, TwainResult};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};

const ITEM_SLOT: usize = 4;
const RANGE_SIZE: usize = 2 + 5 * ITEM_SLOT;
const ARRAY_HEADER: usize = 2 + 4;
const ENUMERATION_HEADER: usize = 2 + 4 * 3;

/// Container kind tag carried next to the container handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// List of values.
    Array,
    /// List of values with current and default indices.
    Enumeration,
    /// Single value.
    One,
    /// Min, max and step with current and default.
    Range,
}

impl ContainerKind {
    /// Protocol container code.
    pub fn code(self) -> u16 {
        match self {
            ContainerKind::Array => 3,
            ContainerKind::Enumeration => 4,
            ContainerKind::One => 5,
            ContainerKind::Range => 6,
        }
    }

    /// Container kind for a protocol code.
    pub fn from_code(code: u16) -> TwainResult<Self> {
        match code {
            3 => Ok(ContainerKind::Array),
            4 => Ok(ContainerKind::Enumeration),
            5 => Ok(ContainerKind::One),
            6 => Ok(ContainerKind::Range),
            other => Err(TwainError::UnknownContainer(other)),
        }
    }
}

/// Wire layout of an encoded container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerShape {
    /// Single value in a 4-byte slot.
    OneValue,
    /// Single value wider than the slot, stored in full.
    CustomOneValue,
    /// Five slot-sized values.
    Range,
    /// Count then items.
    Array,
    /// Count, indices, then items.
    Enumeration,
}

/// Decoded capability container.
#[derive(Debug, Clone, PartialEq)]
pub enum Container {
    /// Single value.
    One {
        /// Wire type of the value.
        item_type: WireType,
        /// The value.
        value: Value,
    },
    /// Range of values.
    Range {
        /// Wire type of the bounds and values.
        item_type: WireType,
        /// Lowest accepted value.
        min: Value,
        /// Highest accepted value.
        max: Value,
        /// Increment between accepted values.
        step: Value,
        /// Value after a reset.
        default: Value,
        /// Value in effect.
        current: Value,
    },
    /// List of values.
    Array {
        /// Wire type of the items.
        item_type: WireType,
        /// Items in order.
        items: Vec<Value>,
    },
    /// List with current and default indices.
    Enumeration {
        /// Wire type of the items.
        item_type: WireType,
        /// Index of the item in effect.
        current_index: u32,
        /// Index of the item used after a reset.
        default_index: u32,
        /// Items in order.
        items: Vec<Value>,
    },
}

impl Container {
    /// Single value of an explicit wire type.
    pub fn one(item_type: WireType, value: Value) -> Self {
        Container::One { item_type, value }
    }

    /// Container kind tag.
    pub fn kind(&self) -> ContainerKind {
        match self {
            Container::One { .. } => ContainerKind::One,
            Container::Range { .. } => ContainerKind::Range,
            Container::Array { .. } => ContainerKind::Array,
            Container::Enumeration { .. } => ContainerKind::Enumeration,
        }
    }

    /// Wire type of the items.
    pub fn item_type(&self) -> WireType {
        match self {
            Container::One { item_type, .. }
            | Container::Range { item_type, .. }
            | Container::Array { item_type, .. }
            | Container::Enumeration { item_type, .. } => *item_type,
        }
    }

    /// Wire layout this container encodes to.
    pub fn shape(&self) -> ContainerShape {
        match self {
            Container::One { item_type, .. } if item_type.size() > ITEM_SLOT => {
                ContainerShape::CustomOneValue
            }
            Container::One { .. } => ContainerShape::OneValue,
            Container::Range { .. } => ContainerShape::Range,
            Container::Array { .. } => ContainerShape::Array,
            Container::Enumeration { .. } => ContainerShape::Enumeration,
        }
    }

    /// The value a caller usually wants: the single value, the current value
    /// of a range or the current item of an enumeration.
    pub fn current(&self) -> Option<&Value> {
        match self {
            Container::One { value, .. } => Some(value),
            Container::Range { current, .. } => Some(current),
            Container::Enumeration {
                current_index,
                items,
                ..
            } => items.get(*current_index as usize),
            Container::Array { items, .. } => items.first(),
        }
    }

    /// Size of the encoded container in bytes.
    pub fn encoded_len(&self) -> usize {
        let item = self.item_type().size();
        match self {
            Container::One { .. } => 2 + item.max(ITEM_SLOT),
            Container::Range { .. } => RANGE_SIZE,
            Container::Array { items, .. } => ARRAY_HEADER + items.len() * item,
            Container::Enumeration { items, .. } => ENUMERATION_HEADER + items.len() * item,
        }
    }

    /// Encode into one contiguous buffer of `encoded_len()` bytes.
    pub fn encode(&self) -> TwainResult<Vec<u8>> {
        let item_type = self.item_type();
        let mut cursor = Cursor::new(vec![0u8; self.encoded_len()]);
        cursor.write_u16::<LittleEndian>(item_type.code())?;

        match self {
            Container::One { value, .. } => {
                write_slot(&mut cursor, item_type, value)?;
            }
            Container::Range {
                min,
                max,
                step,
                default,
                current,
                ..
            } => {
                if item_type.size() > ITEM_SLOT {
                    return Err(TwainError::UnsupportedContainerItem(item_type.to_string()));
                }
                for value in [min, max, step, default, current] {
                    write_slot(&mut cursor, item_type, value)?;
                }
            }
            Container::Array { items, .. } => {
                cursor.write_u32::<LittleEndian>(items.len() as u32)?;
                write_items(&mut cursor, ARRAY_HEADER, item_type, items)?;
            }
            Container::Enumeration {
                current_index,
                default_index,
                items,
                ..
            } => {
                cursor.write_u32::<LittleEndian>(items.len() as u32)?;
                cursor.write_u32::<LittleEndian>(*current_index)?;
                cursor.write_u32::<LittleEndian>(*default_index)?;
                write_items(&mut cursor, ENUMERATION_HEADER, item_type, items)?;
            }
        }
        Ok(cursor.into_inner())
    }

    /// Decode a container of the given kind.
    pub fn decode(kind: ContainerKind, bytes: &[u8]) -> TwainResult<Self> {
        let mut cursor = Cursor::new(bytes);
        require(bytes, 2)?;
        let item_type = WireType::from_code(cursor.read_u16::<LittleEndian>()?)?;
        let item = item_type.size();

        match kind {
            ContainerKind::One => {
                require(bytes, 2 + item.max(ITEM_SLOT))?;
                let value = read_slot(&mut cursor, item_type)?;
                Ok(Container::One { item_type, value })
            }
            ContainerKind::Range => {
                if item > ITEM_SLOT {
                    return Err(TwainError::UnsupportedContainerItem(item_type.to_string()));
                }
                require(bytes, RANGE_SIZE)?;
                Ok(Container::Range {
                    item_type,
                    min: read_slot(&mut cursor, item_type)?,
                    max: read_slot(&mut cursor, item_type)?,
                    step: read_slot(&mut cursor, item_type)?,
                    default: read_slot(&mut cursor, item_type)?,
                    current: read_slot(&mut cursor, item_type)?,
                })
            }
            ContainerKind::Array => {
                require(bytes, ARRAY_HEADER)?;
                let count = cursor.read_u32::<LittleEndian>()? as usize;
                require(bytes, ARRAY_HEADER + count * item)?;
                let items = read_items(&mut cursor, ARRAY_HEADER, item_type, count)?;
                Ok(Container::Array { item_type, items })
            }
            ContainerKind::Enumeration => {
                require(bytes, ENUMERATION_HEADER)?;
                let count = cursor.read_u32::<LittleEndian>()? as usize;
                let current_index = cursor.read_u32::<LittleEndian>()?;
                let default_index = cursor.read_u32::<LittleEndian>()?;
                require(bytes, ENUMERATION_HEADER + count * item)?;
                let items = read_items(&mut cursor, ENUMERATION_HEADER, item_type, count)?;
                Ok(Container::Enumeration {
                    item_type,
                    current_index,
                    default_index,
                    items,
                })
            }
        }
    }
}

fn require(bytes: &[u8], expected: usize) -> TwainResult<()> {
    if bytes.len() < expected {
        return Err(TwainError::Truncated {
            expected,
            got: bytes.len(),
        });
    }
    Ok(())
}

/// Write a value into a single-value slot: at least four bytes, value in the
/// low bytes.
fn write_slot<W: Write>(w: &mut W, item_type: WireType, value: &Value) -> TwainResult<()> {
    let encoded = to_wire(item_type, value)?.to_bytes();
    w.write_all(&encoded)?;
    if encoded.len() < ITEM_SLOT {
        w.write_all(&[0u8; ITEM_SLOT][..ITEM_SLOT - encoded.len()])?;
    }
    Ok(())
}

fn read_slot<R: Read>(r: &mut R, item_type: WireType) -> TwainResult<Value> {
    let wire = WireValue::read(item_type, r)?;
    let size = item_type.size();
    if size < ITEM_SLOT {
        let mut pad = [0u8; ITEM_SLOT];
        r.read_exact(&mut pad[..ITEM_SLOT - size])?;
    }
    from_wire(item_type, &wire)
}

fn write_items<W: Write + Seek>(
    w: &mut W,
    header: usize,
    item_type: WireType,
    items: &[Value],
) -> TwainResult<()> {
    let size = item_type.size();
    for (i, value) in items.iter().enumerate() {
        w.seek(SeekFrom::Start((header + i * size) as u64))?;
        to_wire(item_type, value)?.write(w)?;
    }
    Ok(())
}

fn read_items<R: Read + Seek>(
    r: &mut R,
    header: usize,
    item_type: WireType,
    count: usize,
) -> TwainResult<Vec<Value>> {
    let size = item_type.size();
    (0..count)
        .map(|i| {
            r.seek(SeekFrom::Start((header + i * size) as u64))?;
            let wire = WireValue::read(item_type, r)?;
            from_wire(item_type, &wire)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_value_layout() {
        let container = Container::one(WireType::Int16, Value::Int16(1));
        assert_eq!(container.shape(), ContainerShape::OneValue);
        let bytes = container.encode().unwrap();
        assert_eq!(bytes, vec![0x01, 0x00, 0x01, 0x00, 0x00, 0x00]);
        assert_eq!(Container::decode(ContainerKind::One, &bytes).unwrap(), container);
    }

    #[test]
    fn test_custom_one_value_for_strings() {
        let container = Container::one(WireType::Str64, Value::Str("Jane Doe".into()));
        assert_eq!(container.shape(), ContainerShape::CustomOneValue);
        let bytes = container.encode().unwrap();
        assert_eq!(bytes.len(), 2 + 66);
        assert_eq!(&bytes[..2], &[0x0a, 0x00]);
        assert_eq!(&bytes[2..10], b"Jane Doe");
        assert_eq!(Container::decode(ContainerKind::One, &bytes).unwrap(), container);
    }

    #[test]
    fn test_range_of_fix32() {
        let container = Container::Range {
            item_type: WireType::Fix32,
            min: Value::Real(75.0),
            max: Value::Real(1200.0),
            step: Value::Real(1.0),
            default: Value::Real(300.0),
            current: Value::Real(150.0),
        };
        let bytes = container.encode().unwrap();
        assert_eq!(bytes.len(), 22);
        let back = Container::decode(ContainerKind::Range, &bytes).unwrap();
        assert_eq!(back, container);
        assert_eq!(back.current(), Some(&Value::Real(150.0)));
    }

    #[test]
    fn test_range_rejects_wide_items() {
        let container = Container::Range {
            item_type: WireType::Str32,
            min: Value::Str(String::new()),
            max: Value::Str(String::new()),
            step: Value::Str(String::new()),
            default: Value::Str(String::new()),
            current: Value::Str(String::new()),
        };
        assert!(matches!(
            container.encode(),
            Err(TwainError::UnsupportedContainerItem(_))
        ));
    }

    #[test]
    fn test_array_items_at_element_offsets() {
        let container = Container::Array {
            item_type: WireType::UInt16,
            items: vec![Value::UInt16(0x0001), Value::UInt16(0x1005), Value::UInt16(0x0101)],
        };
        let bytes = container.encode().unwrap();
        assert_eq!(bytes.len(), 6 + 3 * 2);
        assert_eq!(&bytes[2..6], &[3, 0, 0, 0]);
        assert_eq!(&bytes[8..10], &[0x05, 0x10]);
        assert_eq!(Container::decode(ContainerKind::Array, &bytes).unwrap(), container);
    }

    #[test]
    fn test_enumeration_header() {
        let container = Container::Enumeration {
            item_type: WireType::UInt16,
            current_index: 2,
            default_index: 0,
            items: vec![Value::UInt16(0), Value::UInt16(1), Value::UInt16(2)],
        };
        let bytes = container.encode().unwrap();
        assert_eq!(bytes.len(), 14 + 6);
        assert_eq!(&bytes[6..10], &[2, 0, 0, 0]);
        let back = Container::decode(ContainerKind::Enumeration, &bytes).unwrap();
        assert_eq!(back.current(), Some(&Value::UInt16(2)));
    }

    #[test]
    fn test_truncated_array() {
        let mut bytes = Container::Array {
            item_type: WireType::UInt32,
            items: vec![Value::UInt32(1), Value::UInt32(2)],
        }
        .encode()
        .unwrap();
        bytes.truncate(10);
        assert!(matches!(
            Container::decode(ContainerKind::Array, &bytes),
            Err(TwainError::Truncated { expected: 14, got: 10 })
        ));
    }

    #[test]
    fn test_unknown_container_kind() {
        assert!(matches!(
            ContainerKind::from_code(9),
            Err(TwainError::UnknownContainer(9))
        ));
        assert!(matches!(
            Container::decode(ContainerKind::One, &[]),
            Err(TwainError::Truncated { .. })
        ));
    }
}
