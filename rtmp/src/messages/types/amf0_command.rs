use crate::messages::{MessageDecodeError, MessageEncodeError, RtmpMessage};
use rivulet_amf0::Amf0Value;
use std::io::Cursor;

pub fn serialize(
    command_name: String,
    transaction_id: f64,
    command_object: Amf0Value,
    additional_arguments: Vec<Amf0Value>,
) -> Result<Vec<u8>, MessageEncodeError> {
    let mut values = Vec::with_capacity(additional_arguments.len() + 3);
    values.push(Amf0Value::Utf8String(command_name));
    values.push(Amf0Value::Number(transaction_id));
    values.push(command_object);
    values.extend(additional_arguments);

    Ok(rivulet_amf0::serialize(&values)?)
}

pub fn deserialize(data: &[u8]) -> Result<RtmpMessage, MessageDecodeError> {
    let mut cursor = Cursor::new(data);
    let mut values = rivulet_amf0::deserialize(&mut cursor)?;

    if values.len() < 2 {
        return Err(MessageDecodeError::InvalidMessageFormat);
    }

    let command_name = match values.remove(0) {
        Amf0Value::Utf8String(name) => name,
        _ => return Err(MessageDecodeError::InvalidMessageFormat),
    };

    let transaction_id = match values.remove(0) {
        Amf0Value::Number(id) => id,
        _ => return Err(MessageDecodeError::InvalidMessageFormat),
    };

    let command_object = if values.is_empty() {
        Amf0Value::Null
    } else {
        values.remove(0)
    };

    Ok(RtmpMessage::Amf0Command {
        command_name,
        transaction_id,
        command_object,
        additional_arguments: values,
    })
}
