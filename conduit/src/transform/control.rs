use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::error::ConduitResult;
use crate::message::Message;
use crate::transform::Transform;

/// Emits a control message after every `count` data messages.
///
/// Placed in front of buffering transforms, this bounds how much data they
/// hold when the producer never sends control messages of its own.
pub struct UtilityControl {
    id: String,
    count: usize,
    seen: AtomicUsize,
}

impl UtilityControl {
    pub fn new(id: impl Into<String>, count: usize) -> Self {
        Self {
            id: id.into(),
            count: count.max(1),
            seen: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Transform for UtilityControl {
    fn id(&self) -> &str {
        &self.id
    }

    async fn transform(&self, message: Message) -> ConduitResult<Vec<Message>> {
        if message.is_control() {
            return Ok(vec![message]);
        }

        let seen = self.seen.fetch_add(1, Ordering::AcqRel) + 1;
        if seen % self.count == 0 {
            return Ok(vec![message, Message::control()]);
        }

        Ok(vec![message])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::message::partition_control;

    #[tokio::test]
    async fn test_control_every_n_messages() {
        let transform = UtilityControl::new("control", 3);

        let mut output = Vec::new();
        for i in 0..7 {
            output.extend(
                transform
                    .transform(Message::from_data(i.to_string()))
                    .await
                    .unwrap(),
            );
        }

        assert_eq!(output.len(), 9);
        assert!(output[3].is_control());
        assert!(output[7].is_control());

        let (control, data) = partition_control(output);
        assert_eq!(control.len(), 2);
        assert_eq!(data.len(), 7);
    }

    #[tokio::test]
    async fn test_control_input_passes_through_without_counting() {
        let transform = UtilityControl::new("control", 2);

        let output = transform.transform(Message::control()).await.unwrap();
        assert_eq!(output, vec![Message::control()]);

        let output = transform.transform(Message::from_data("a")).await.unwrap();
        assert_eq!(output.len(), 1);

        let output = transform.transform(Message::from_data("b")).await.unwrap();
        assert_eq!(output.len(), 2);
        assert!(output[1].is_control());
    }
}
