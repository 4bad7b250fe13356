use chrono::Utc;
use serde_json::Value;

use crate::message::Message;

/// Number of digits of a Unix timestamp in seconds.
const SECONDS_DIGITS: u32 = 10;

/// Normalizes an epoch timestamp to seconds.
///
/// Values wider than ten digits are taken to be milliseconds, microseconds or
/// nanoseconds and are divided by `10^(digits - 10)`. Strings holding integers
/// are accepted, fractional numbers are truncated. Returns `None` for values
/// that are not numbers.
pub fn truncate_ttl(value: &Value) -> Option<i64> {
    let timestamp = match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|float| float.trunc() as i64))?,
        Value::String(text) => text.trim().parse::<i64>().ok()?,
        _ => return None,
    };

    let digits = timestamp.unsigned_abs().checked_ilog10().map_or(1, |log| log + 1);
    if digits <= SECONDS_DIGITS {
        return Some(timestamp);
    }

    Some(timestamp / 10_i64.pow(digits - SECONDS_DIGITS))
}

/// How a key/value transform computes the expiration of the items it writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TtlPolicy {
    /// Items never expire.
    None,
    /// The expiration is read from the message.
    FromKey { key: String },
    /// The expiration is read from the message and moved by `offset` seconds.
    FromKeyWithOffset { key: String, offset: i64 },
    /// Items expire `offset` seconds after they are written.
    Offset { offset: i64 },
}

impl TtlPolicy {
    pub fn new(ttl_key: Option<&str>, offset_secs: u64) -> Self {
        let offset = i64::try_from(offset_secs).unwrap_or(i64::MAX);

        match (ttl_key.filter(|key| !key.is_empty()), offset) {
            (Some(key), 0) => TtlPolicy::FromKey {
                key: key.to_owned(),
            },
            (Some(key), offset) => TtlPolicy::FromKeyWithOffset {
                key: key.to_owned(),
                offset,
            },
            (None, 0) => TtlPolicy::None,
            (None, offset) => TtlPolicy::Offset { offset },
        }
    }

    /// Returns the expiration in Unix seconds for an item written from `message`.
    ///
    /// When the message has no usable timestamp at the configured key, the
    /// offset alone applies, counted from now.
    pub fn resolve(&self, message: &Message) -> Option<i64> {
        let now = || Utc::now().timestamp();

        match self {
            TtlPolicy::None => None,
            TtlPolicy::FromKey { key } => message.get_value(key).as_ref().and_then(truncate_ttl),
            TtlPolicy::FromKeyWithOffset { key, offset } => {
                match message.get_value(key).as_ref().and_then(truncate_ttl) {
                    Some(ttl) => Some(ttl.saturating_add(*offset)),
                    None => Some(now().saturating_add(*offset)),
                }
            }
            TtlPolicy::Offset { offset } => Some(now().saturating_add(*offset)),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_truncate_ttl_normalizes_to_seconds() {
        assert_eq!(truncate_ttl(&json!(1696482368)), Some(1696482368));
        assert_eq!(truncate_ttl(&json!(1696482368492_i64)), Some(1696482368));
        assert_eq!(truncate_ttl(&json!(1696482368492123_i64)), Some(1696482368));
        assert_eq!(
            truncate_ttl(&json!(1696482368492123456_i64)),
            Some(1696482368)
        );
        assert_eq!(truncate_ttl(&json!("1696482368492")), Some(1696482368));
        assert_eq!(truncate_ttl(&json!(1696482368.75)), Some(1696482368));
        assert_eq!(truncate_ttl(&json!(0)), Some(0));
        assert_eq!(truncate_ttl(&json!("soon")), None);
        assert_eq!(truncate_ttl(&json!(true)), None);
    }

    #[test]
    fn test_policy_selection() {
        assert_eq!(TtlPolicy::new(None, 0), TtlPolicy::None);
        assert_eq!(TtlPolicy::new(Some(""), 0), TtlPolicy::None);
        assert_eq!(TtlPolicy::new(None, 60), TtlPolicy::Offset { offset: 60 });
        assert_eq!(
            TtlPolicy::new(Some("ts"), 0),
            TtlPolicy::FromKey {
                key: "ts".to_owned()
            }
        );
        assert_eq!(
            TtlPolicy::new(Some("ts"), 60),
            TtlPolicy::FromKeyWithOffset {
                key: "ts".to_owned(),
                offset: 60
            }
        );
    }

    #[test]
    fn test_resolve_from_key() {
        let message = Message::from_data(r#"{"ts":1696482368492}"#);

        assert_eq!(
            TtlPolicy::new(Some("ts"), 0).resolve(&message),
            Some(1696482368)
        );
        assert_eq!(
            TtlPolicy::new(Some("ts"), 60).resolve(&message),
            Some(1696482428)
        );
        assert_eq!(TtlPolicy::new(Some("missing"), 0).resolve(&message), None);
        assert_eq!(TtlPolicy::None.resolve(&message), None);
    }

    #[test]
    fn test_resolve_offset_counts_from_now() {
        let message = Message::new();
        let before = Utc::now().timestamp();
        let ttl = TtlPolicy::new(None, 60).resolve(&message).unwrap();
        let after = Utc::now().timestamp();

        assert!(ttl >= before + 60 && ttl <= after + 60);

        let ttl = TtlPolicy::new(Some("missing"), 60).resolve(&message).unwrap();
        assert!(ttl >= before + 60);
    }
}
