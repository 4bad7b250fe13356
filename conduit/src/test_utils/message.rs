use serde_json::Value;

use crate::message::Message;

/// Creates a data message from a JSON value.
pub fn json_message(value: Value) -> Message {
    Message::from_data(value.to_string())
}

/// Splits transform output into control and data messages, preserving order.
pub fn partition_control(messages: Vec<Message>) -> (Vec<Message>, Vec<Message>) {
    messages.into_iter().partition(Message::is_control)
}
