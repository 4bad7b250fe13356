use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::aggregate::AddOutcome;
use crate::bail;
use crate::error::{ConduitResult, ErrorKind};

/// Maximum encoded size of an aggregated record.
pub const MAX_AGGREGATE_SIZE: usize = 1_048_576;

/// Maximum length in bytes of a partition key.
pub const MAX_PARTITION_KEY_LENGTH: usize = 256;

/// Size of the big-endian record count at the start of an aggregate.
const COUNT_HEADER_SIZE: usize = 4;

/// Size of the big-endian length prefix before every packed payload.
const LENGTH_PREFIX_SIZE: usize = 4;

/// Truncates `key` to at most [`MAX_PARTITION_KEY_LENGTH`] bytes on a character boundary.
pub fn truncate_partition_key(key: &str) -> &str {
    if key.len() <= MAX_PARTITION_KEY_LENGTH {
        return key;
    }

    let mut end = MAX_PARTITION_KEY_LENGTH;
    while !key.is_char_boundary(end) {
        end -= 1;
    }

    &key[..end]
}

/// Several payloads packed into a single streaming record.
///
/// The encoding is a 4-byte big-endian payload count followed, for every
/// payload, by its 4-byte big-endian length and its bytes. The encoded size
/// never exceeds [`MAX_AGGREGATE_SIZE`].
///
/// The aggregate is sent under one partition key: the key supplied with the
/// first payload after a reset.
#[derive(Debug, Clone, Default)]
pub struct RecordAggregate {
    payloads: Vec<Bytes>,
    encoded_size: usize,
    partition_key: Option<String>,
}

impl RecordAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Packs `payload` into the aggregate.
    ///
    /// Returns [`AddOutcome::Full`] without changing the aggregate when the
    /// encoded size would exceed [`MAX_AGGREGATE_SIZE`].
    pub fn add(&mut self, payload: Bytes, partition_key: &str) -> AddOutcome {
        let framed_size = LENGTH_PREFIX_SIZE + payload.len();
        if self.encoded_size() + framed_size > MAX_AGGREGATE_SIZE {
            return AddOutcome::Full;
        }

        if self.partition_key.is_none() {
            self.partition_key = Some(truncate_partition_key(partition_key).to_owned());
        }

        self.encoded_size += framed_size;
        self.payloads.push(payload);

        AddOutcome::Added
    }

    /// Returns the encoded record and its partition key without clearing the aggregate.
    ///
    /// The partition key is empty while the aggregate holds no payloads.
    pub fn get(&self) -> (Bytes, &str) {
        let mut encoded = BytesMut::with_capacity(self.encoded_size());
        encoded.put_u32(self.payloads.len() as u32);
        for payload in &self.payloads {
            encoded.put_u32(payload.len() as u32);
            encoded.put_slice(payload);
        }

        (encoded.freeze(), self.partition_key.as_deref().unwrap_or_default())
    }

    pub fn count(&self) -> usize {
        self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    /// Returns the size of the record [`RecordAggregate::get`] would encode.
    pub fn encoded_size(&self) -> usize {
        COUNT_HEADER_SIZE + self.encoded_size
    }

    /// Empties the aggregate and unbinds its partition key.
    pub fn reset(&mut self) {
        self.payloads.clear();
        self.encoded_size = 0;
        self.partition_key = None;
    }

    /// Unpacks the payloads of an encoded aggregate.
    pub fn decode(mut record: Bytes) -> ConduitResult<Vec<Bytes>> {
        if record.len() < COUNT_HEADER_SIZE {
            bail!(
                ErrorKind::InvalidData,
                "Aggregated record is missing its count header",
                format!("{} bytes", record.len())
            );
        }

        let count = record.get_u32() as usize;
        let mut payloads = Vec::with_capacity(count.min(record.len() / LENGTH_PREFIX_SIZE));
        for index in 0..count {
            if record.remaining() < LENGTH_PREFIX_SIZE {
                bail!(
                    ErrorKind::InvalidData,
                    "Aggregated record is truncated",
                    format!("missing length of payload {index}")
                );
            }

            let length = record.get_u32() as usize;
            if record.remaining() < length {
                bail!(
                    ErrorKind::InvalidData,
                    "Aggregated record is truncated",
                    format!("payload {index} declares {length} bytes, {} remain", record.remaining())
                );
            }

            payloads.push(record.split_to(length));
        }

        if record.has_remaining() {
            bail!(
                ErrorKind::InvalidData,
                "Aggregated record has trailing bytes",
                format!("{} bytes", record.remaining())
            );
        }

        Ok(payloads)
    }
}
