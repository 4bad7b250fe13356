//! The unit of data flowing through a transform chain.

use bytes::Bytes;
use serde_json::{Map, Value};

use crate::bail;
use crate::error::{ConduitResult, ErrorKind};

/// Prefix selecting the metadata map instead of the payload in a value path.
const META_PREFIX: &str = "meta ";

/// Separator between the segments of a value path.
const PATH_SEPARATOR: char = '.';

/// A payload with attached metadata, or a control sentinel.
///
/// Control messages signal that no more data is coming for the current batch.
/// They carry neither data nor metadata: reads return empty values and writes
/// are ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    data: Bytes,
    metadata: Map<String, Value>,
    control: bool,
}

impl Message {
    /// Creates an empty data message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a data message carrying `data`.
    pub fn from_data(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }

    /// Creates a control message.
    pub fn control() -> Self {
        Self {
            control: true,
            ..Self::default()
        }
    }

    pub fn is_control(&self) -> bool {
        self.control
    }

    /// Returns the payload. Control messages always return an empty payload.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn set_data(&mut self, data: impl Into<Bytes>) {
        if self.control {
            return;
        }

        self.data = data.into();
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn set_metadata(&mut self, metadata: Map<String, Value>) {
        if self.control {
            return;
        }

        self.metadata = metadata;
    }

    /// Reads the value at a dotted `path` such as `user.emails.0`.
    ///
    /// A path starting with `meta ` is resolved against the metadata map. Missing
    /// values, non-JSON payloads and control messages yield `None`. An empty path
    /// returns the whole document.
    pub fn get_value(&self, path: &str) -> Option<Value> {
        if self.control {
            return None;
        }

        match path.strip_prefix(META_PREFIX) {
            Some(path) => {
                let path = path.trim();
                if path.is_empty() {
                    return Some(Value::Object(self.metadata.clone()));
                }

                let mut segments = path.split(PATH_SEPARATOR);
                let first = segments.next()?;
                let root = self.metadata.get(first)?;

                lookup(root, segments).cloned()
            }
            None => {
                let document: Value = serde_json::from_slice(&self.data).ok()?;

                value_at(&document, path).cloned()
            }
        }
    }

    /// Writes `value` at a dotted `path`, creating intermediate objects.
    ///
    /// Fails with [`ErrorKind::InvalidData`] when the payload is not a JSON
    /// document or a path segment crosses a non-container value. Writes to
    /// control messages are ignored.
    pub fn set_value(&mut self, path: &str, value: Value) -> ConduitResult<()> {
        if self.control {
            return Ok(());
        }

        if let Some(path) = path.strip_prefix(META_PREFIX) {
            let mut metadata = Value::Object(std::mem::take(&mut self.metadata));
            let result = insert(&mut metadata, split_path(path.trim()), value);
            if let Value::Object(map) = metadata {
                self.metadata = map;
            }

            return result;
        }

        let mut document = if self.data.is_empty() {
            Value::Object(Map::new())
        } else {
            match serde_json::from_slice::<Value>(&self.data) {
                Ok(document) => document,
                Err(err) => bail!(
                    ErrorKind::InvalidData,
                    "Message payload is not a JSON document",
                    err
                ),
            }
        };

        insert(&mut document, split_path(path.trim()), value)?;
        self.data = Bytes::from(serde_json::to_vec(&document)?);

        Ok(())
    }
}

/// Renders a value the way it is used as a key: strings without quotes, any
/// other value as compact JSON.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(value) => value.clone(),
        value => value.to_string(),
    }
}

/// Reads the value at a dotted `path` inside a JSON document.
pub fn value_at<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    lookup(document, split_path(path.trim()))
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split(PATH_SEPARATOR).filter(|segment| !segment.is_empty())
}

fn lookup<'a, 'p>(root: &'a Value, segments: impl Iterator<Item = &'p str>) -> Option<&'a Value> {
    let mut current = root;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    match current {
        Value::Null => None,
        value => Some(value),
    }
}

fn insert<'p>(
    root: &mut Value,
    segments: impl Iterator<Item = &'p str>,
    value: Value,
) -> ConduitResult<()> {
    let segments: Vec<&str> = segments.collect();
    let Some((last, parents)) = segments.split_last() else {
        *root = value;
        return Ok(());
    };

    let mut current = root;
    for segment in parents {
        if current.is_null() {
            *current = Value::Object(Map::new());
        }

        current = match current {
            Value::Object(map) => map
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new())),
            Value::Array(items) => match segment.parse::<usize>().ok() {
                Some(index) if index < items.len() => &mut items[index],
                _ => bail!(
                    ErrorKind::InvalidData,
                    "Array index in value path is out of bounds",
                    segment
                ),
            },
            _ => bail!(
                ErrorKind::InvalidData,
                "Value path crosses a scalar value",
                segment
            ),
        };
    }

    if current.is_null() {
        *current = Value::Object(Map::new());
    }

    match current {
        Value::Object(map) => {
            map.insert(last.to_string(), value);
        }
        Value::Array(items) => match last.parse::<usize>().ok() {
            Some(index) if index < items.len() => items[index] = value,
            Some(index) if index == items.len() => items.push(value),
            _ => bail!(
                ErrorKind::InvalidData,
                "Array index in value path is out of bounds",
                last
            ),
        },
        _ => bail!(
            ErrorKind::InvalidData,
            "Value path crosses a scalar value",
            last
        ),
    }

    Ok(())
}
