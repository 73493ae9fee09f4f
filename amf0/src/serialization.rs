use crate::errors::Amf0SerializationError;
use crate::markers;
use crate::Amf0Value;
use byteorder::{BigEndian, WriteBytesExt};
use std::collections::HashMap;

/// Serializes a batch of values into AMF0 encoded bytes
pub fn serialize(values: &[Amf0Value]) -> Result<Vec<u8>, Amf0SerializationError> {
    let mut bytes = Vec::new();
    for value in values {
        serialize_value(value, &mut bytes)?;
    }

    Ok(bytes)
}

fn serialize_value(value: &Amf0Value, bytes: &mut Vec<u8>) -> Result<(), Amf0SerializationError> {
    match value {
        Amf0Value::Boolean(val) => {
            serialize_bool(*val, bytes);
            Ok(())
        }
        Amf0Value::Null => {
            bytes.push(markers::NULL_MARKER);
            Ok(())
        }
        Amf0Value::Undefined => {
            bytes.push(markers::UNDEFINED_MARKER);
            Ok(())
        }
        Amf0Value::Number(val) => serialize_number(*val, bytes),
        Amf0Value::Utf8String(val) => serialize_string(val, bytes),
        Amf0Value::Object(val) => serialize_object(val, bytes),
        Amf0Value::EcmaArray(val) => serialize_ecma_array(val, bytes),
        Amf0Value::StrictArray(val) => serialize_strict_array(val, bytes),
    }
}

fn serialize_number(value: f64, bytes: &mut Vec<u8>) -> Result<(), Amf0SerializationError> {
    bytes.push(markers::NUMBER_MARKER);
    bytes.write_f64::<BigEndian>(value)?;
    Ok(())
}

fn serialize_bool(value: bool, bytes: &mut Vec<u8>) {
    bytes.push(markers::BOOLEAN_MARKER);
    bytes.push(value as u8);
}

fn serialize_string(value: &str, bytes: &mut Vec<u8>) -> Result<(), Amf0SerializationError> {
    if value.len() > u16::MAX as usize {
        return Err(Amf0SerializationError::NormalStringTooLong);
    }

    bytes.push(markers::STRING_MARKER);
    bytes.write_u16::<BigEndian>(value.len() as u16)?;
    bytes.extend(value.as_bytes());
    Ok(())
}

fn serialize_properties(
    properties: &HashMap<String, Amf0Value>,
    bytes: &mut Vec<u8>,
) -> Result<(), Amf0SerializationError> {
    for (name, value) in properties {
        if name.len() > u16::MAX as usize {
            return Err(Amf0SerializationError::NormalStringTooLong);
        }

        bytes.write_u16::<BigEndian>(name.len() as u16)?;
        bytes.extend(name.as_bytes());
        serialize_value(value, bytes)?;
    }

    bytes.write_u16::<BigEndian>(markers::UTF_8_EMPTY_MARKER)?;
    bytes.push(markers::OBJECT_END_MARKER);
    Ok(())
}

fn serialize_object(
    properties: &HashMap<String, Amf0Value>,
    bytes: &mut Vec<u8>,
) -> Result<(), Amf0SerializationError> {
    bytes.push(markers::OBJECT_MARKER);
    serialize_properties(properties, bytes)
}

fn serialize_ecma_array(
    properties: &HashMap<String, Amf0Value>,
    bytes: &mut Vec<u8>,
) -> Result<(), Amf0SerializationError> {
    bytes.push(markers::ECMA_ARRAY_MARKER);
    bytes.write_u32::<BigEndian>(properties.len() as u32)?;
    serialize_properties(properties, bytes)
}

fn serialize_strict_array(
    array: &[Amf0Value],
    bytes: &mut Vec<u8>,
) -> Result<(), Amf0SerializationError> {
    bytes.push(markers::STRICT_ARRAY_MARKER);
    bytes.write_u32::<BigEndian>(array.len() as u32)?;

    for value in array {
        serialize_value(value, bytes)?;
    }

    Ok(())
}
