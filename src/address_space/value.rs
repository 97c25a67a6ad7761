//! Typed values held by variables.
//!
//! A [`Variant`] carries one value of a built-in [`DataType`] or an array of
//! them. Variants have two renderings: a text form used by the `READ`/`WRITE`
//! request layer, and a binary form built on the [`BinaryReader`] and
//! [`BinaryWriter`] primitives.
//!
//! ## Binary Layout
//! ```text
//! [TypeId(1)] [Value]                 scalar
//! [TypeId|0x80(1)] [Count(4)] [Value]* array
//! ```

use std::fmt;

use crate::core::binary::{BinaryReader, BinaryWriter};
use crate::error::{ProtocolError, Result};

const ARRAY_FLAG: u8 = 0x80;

/// Built-in data types with their numeric type ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Null,
    Boolean,
    Byte,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Float,
    Double,
    String,
}

impl DataType {
    pub fn type_id(self) -> u8 {
        match self {
            DataType::Null => 0,
            DataType::Boolean => 1,
            DataType::Byte => 3,
            DataType::Int16 => 4,
            DataType::UInt16 => 5,
            DataType::Int32 => 6,
            DataType::UInt32 => 7,
            DataType::Float => 10,
            DataType::Double => 11,
            DataType::String => 12,
        }
    }

    pub fn from_type_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(DataType::Null),
            1 => Some(DataType::Boolean),
            3 => Some(DataType::Byte),
            4 => Some(DataType::Int16),
            5 => Some(DataType::UInt16),
            6 => Some(DataType::Int32),
            7 => Some(DataType::UInt32),
            10 => Some(DataType::Float),
            11 => Some(DataType::Double),
            12 => Some(DataType::String),
            _ => None,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        [
            DataType::Null,
            DataType::Boolean,
            DataType::Byte,
            DataType::Int16,
            DataType::UInt16,
            DataType::Int32,
            DataType::UInt32,
            DataType::Float,
            DataType::Double,
            DataType::String,
        ]
        .into_iter()
        .find(|data_type| data_type.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            DataType::Null => "Null",
            DataType::Boolean => "Boolean",
            DataType::Byte => "Byte",
            DataType::Int16 => "Int16",
            DataType::UInt16 => "UInt16",
            DataType::Int32 => "Int32",
            DataType::UInt32 => "UInt32",
            DataType::Float => "Float",
            DataType::Double => "Double",
            DataType::String => "String",
        }
    }
}

/// A dynamically typed value
#[derive(Debug, Clone, PartialEq)]
pub enum Variant {
    Null,
    Boolean(bool),
    Byte(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Float(f32),
    Double(f64),
    String(String),
    Array(DataType, Vec<Variant>),
}

impl Variant {
    /// Data type of the value; arrays report their element type
    pub fn data_type(&self) -> DataType {
        match self {
            Variant::Null => DataType::Null,
            Variant::Boolean(_) => DataType::Boolean,
            Variant::Byte(_) => DataType::Byte,
            Variant::Int16(_) => DataType::Int16,
            Variant::UInt16(_) => DataType::UInt16,
            Variant::Int32(_) => DataType::Int32,
            Variant::UInt32(_) => DataType::UInt32,
            Variant::Float(_) => DataType::Float,
            Variant::Double(_) => DataType::Double,
            Variant::String(_) => DataType::String,
            Variant::Array(element, _) => *element,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Variant::Array(..))
    }

    /// Value rank implied by the shape: `-1` scalar, `1` one-dimensional array
    pub fn value_rank(&self) -> i32 {
        if self.is_array() {
            1
        } else {
            -1
        }
    }

    /// Parse request text as a scalar of `data_type`.
    ///
    /// Writes are permissive: text that does not parse as the declared type is
    /// kept as a string rather than rejected.
    pub fn parse_as(data_type: DataType, text: &str) -> Variant {
        let parsed = match data_type {
            DataType::Null => None,
            DataType::Boolean => match text {
                "true" | "True" | "1" => Some(Variant::Boolean(true)),
                "false" | "False" | "0" => Some(Variant::Boolean(false)),
                _ => None,
            },
            DataType::Byte => text.parse().ok().map(Variant::Byte),
            DataType::Int16 => text.parse().ok().map(Variant::Int16),
            DataType::UInt16 => text.parse().ok().map(Variant::UInt16),
            DataType::Int32 => text.parse().ok().map(Variant::Int32),
            DataType::UInt32 => text.parse().ok().map(Variant::UInt32),
            DataType::Float => text.parse().ok().map(Variant::Float),
            DataType::Double => text.parse().ok().map(Variant::Double),
            DataType::String => None,
        };
        parsed.unwrap_or_else(|| Variant::String(text.to_string()))
    }

    pub fn encode(&self, writer: &mut BinaryWriter) -> Result<()> {
        match self {
            Variant::Array(DataType::Null, _) => Err(null_array_error()),
            Variant::Array(element, items) => {
                writer.write_u8(element.type_id() | ARRAY_FLAG);
                writer.write_array(Some(items.as_slice()), |w, item| {
                    if item.data_type() != *element || item.is_array() {
                        return Err(ProtocolError::Custom(format!(
                            "array of {} contains {}",
                            element.name(),
                            item.data_type().name()
                        )));
                    }
                    item.encode_scalar(w)
                })
            }
            scalar => {
                writer.write_u8(scalar.data_type().type_id());
                scalar.encode_scalar(writer)
            }
        }
    }

    fn encode_scalar(&self, writer: &mut BinaryWriter) -> Result<()> {
        match self {
            Variant::Null | Variant::Array(..) => {}
            Variant::Boolean(v) => writer.write_boolean(*v),
            Variant::Byte(v) => writer.write_u8(*v),
            Variant::Int16(v) => writer.write_i16(*v),
            Variant::UInt16(v) => writer.write_u16(*v),
            Variant::Int32(v) => writer.write_i32(*v),
            Variant::UInt32(v) => writer.write_u32(*v),
            Variant::Float(v) => writer.write_f32(*v),
            Variant::Double(v) => writer.write_f64(*v),
            Variant::String(v) => writer.write_string(Some(v.as_bytes()))?,
        }
        Ok(())
    }

    pub fn decode(reader: &mut BinaryReader<'_>) -> Result<Variant> {
        let mask = reader.read_u8()?;
        let type_id = mask & !ARRAY_FLAG;
        let data_type = DataType::from_type_id(type_id)
            .ok_or_else(|| ProtocolError::Custom(format!("unknown type id {type_id}")))?;

        if mask & ARRAY_FLAG != 0 {
            // Null elements occupy no bytes, so their count is not bounded by the input
            if data_type == DataType::Null {
                return Err(null_array_error());
            }
            let items = reader.read_array(|r| Self::decode_scalar(data_type, r))?;
            return Ok(Variant::Array(data_type, items));
        }
        Self::decode_scalar(data_type, reader)
    }

    fn decode_scalar(data_type: DataType, reader: &mut BinaryReader<'_>) -> Result<Variant> {
        Ok(match data_type {
            DataType::Null => Variant::Null,
            DataType::Boolean => Variant::Boolean(reader.read_boolean()?),
            DataType::Byte => Variant::Byte(reader.read_u8()?),
            DataType::Int16 => Variant::Int16(reader.read_i16()?),
            DataType::UInt16 => Variant::UInt16(reader.read_u16()?),
            DataType::Int32 => Variant::Int32(reader.read_i32()?),
            DataType::UInt32 => Variant::UInt32(reader.read_u32()?),
            DataType::Float => Variant::Float(reader.read_f32()?),
            DataType::Double => Variant::Double(reader.read_f64()?),
            // A null string has no Variant::String form; it decodes as Null
            DataType::String => match reader.read_string()? {
                Some(bytes) => Variant::String(String::from_utf8_lossy(&bytes).into_owned()),
                None => Variant::Null,
            },
        })
    }
}

fn null_array_error() -> ProtocolError {
    ProtocolError::Custom("arrays of Null elements are not encodable".to_string())
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Null => f.write_str("null"),
            Variant::Boolean(v) => write!(f, "{v}"),
            Variant::Byte(v) => write!(f, "{v}"),
            Variant::Int16(v) => write!(f, "{v}"),
            Variant::UInt16(v) => write!(f, "{v}"),
            Variant::Int32(v) => write!(f, "{v}"),
            Variant::UInt32(v) => write!(f, "{v}"),
            Variant::Float(v) => write!(f, "{v}"),
            Variant::Double(v) => write!(f, "{v}"),
            Variant::String(v) => f.write_str(v),
            Variant::Array(_, items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<bool> for Variant {
    fn from(value: bool) -> Self {
        Variant::Boolean(value)
    }
}

impl From<u8> for Variant {
    fn from(value: u8) -> Self {
        Variant::Byte(value)
    }
}

impl From<i16> for Variant {
    fn from(value: i16) -> Self {
        Variant::Int16(value)
    }
}

impl From<u16> for Variant {
    fn from(value: u16) -> Self {
        Variant::UInt16(value)
    }
}

impl From<i32> for Variant {
    fn from(value: i32) -> Self {
        Variant::Int32(value)
    }
}

impl From<u32> for Variant {
    fn from(value: u32) -> Self {
        Variant::UInt32(value)
    }
}

impl From<f32> for Variant {
    fn from(value: f32) -> Self {
        Variant::Float(value)
    }
}

impl From<f64> for Variant {
    fn from(value: f64) -> Self {
        Variant::Double(value)
    }
}

impl From<&str> for Variant {
    fn from(value: &str) -> Self {
        Variant::String(value.to_string())
    }
}

impl From<String> for Variant {
    fn from(value: String) -> Self {
        Variant::String(value)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::binary::ByteOrder;

    #[test]
    fn test_data_type_inferred_from_value() {
        assert_eq!(Variant::from(25.3f64).data_type(), DataType::Double);
        assert_eq!(Variant::from("x").data_type(), DataType::String);
        assert_eq!(Variant::Array(DataType::Int16, vec![]).value_rank(), 1);
        assert_eq!(Variant::from(1u8).value_rank(), -1);
    }

    #[test]
    fn test_parse_as_declared_type() {
        assert_eq!(Variant::parse_as(DataType::Double, "30.5"), Variant::Double(30.5));
        assert_eq!(Variant::parse_as(DataType::Boolean, "true"), Variant::Boolean(true));
        assert_eq!(Variant::parse_as(DataType::Int16, "-7"), Variant::Int16(-7));
    }

    #[test]
    fn test_parse_falls_back_to_string() {
        assert_eq!(
            Variant::parse_as(DataType::Double, "25.0 C"),
            Variant::String("25.0 C".to_string())
        );
        assert_eq!(
            Variant::parse_as(DataType::Byte, "300"),
            Variant::String("300".to_string())
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Variant::Double(30.5).to_string(), "30.5");
        assert_eq!(
            Variant::Array(DataType::Int16, vec![1i16.into(), 2i16.into()]).to_string(),
            "[1,2]"
        );
    }

    #[test]
    fn test_binary_encoding_both_orders() {
        let values = [
            Variant::Boolean(true),
            Variant::Int32(-42),
            Variant::Float(1.25),
            Variant::String("Pump 3".to_string()),
            Variant::Array(DataType::UInt16, vec![1u16.into(), 2u16.into(), 3u16.into()]),
        ];

        for order in [ByteOrder::LittleEndian, ByteOrder::BigEndian] {
            let mut writer = BinaryWriter::with_byte_order(order);
            for value in &values {
                value.encode(&mut writer).unwrap();
            }
            let bytes = writer.into_bytes();
            let mut reader = BinaryReader::with_byte_order(&bytes, order);
            for value in &values {
                assert_eq!(&Variant::decode(&mut reader).unwrap(), value);
            }
            assert_eq!(reader.remaining(), 0);
        }
    }

    #[test]
    fn test_mixed_array_rejected() {
        let mixed = Variant::Array(DataType::Int16, vec![Variant::Int16(1), Variant::Double(2.0)]);
        assert!(mixed.encode(&mut BinaryWriter::new()).is_err());
    }

    #[test]
    fn test_null_element_array_rejected() {
        // Count of 0xFFFFFFFE with no element bytes behind it
        let mut reader = BinaryReader::new(&[0x80, 0xFE, 0xFF, 0xFF, 0xFF]);
        assert!(Variant::decode(&mut reader).is_err());
        assert_eq!(reader.position(), 1);

        let nulls = Variant::Array(DataType::Null, vec![Variant::Null; 3]);
        assert!(nulls.encode(&mut BinaryWriter::new()).is_err());
    }

    #[test]
    fn test_unknown_type_id() {
        let mut reader = BinaryReader::new(&[0x7F]);
        assert!(Variant::decode(&mut reader).is_err());
    }
}
