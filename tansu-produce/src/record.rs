// Copyright ⓒ 2024-2025 Peter Morgan <peter.james.morgan@gmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
//! Kafka Records
//!
//! Each partition of a [`ProduceRequest`](crate::ProduceRequest) carries one
//! [`Records`] container: either a legacy [`MessageSet`] (magic 0 or 1) or a single
//! [`RecordBatch`] (magic 2).
//!
//! Constructing a [`Record`] using a builder:
//!
//! ```
//! use bytes::Bytes;
//! use tansu_produce::record::{Header, Record};
//!
//! let record = Record::builder()
//!     .key(Some(Bytes::from_static(b"message")))
//!     .value(Some(Bytes::from_static(b"hello world!")))
//!     .header(
//!         Header::builder()
//!             .key(Bytes::from_static(b"format"))
//!             .value(Bytes::from_static(b"text")),
//!     )
//!     .build();
//!
//! assert_eq!(1, record.headers.len());
//! ```
//!
//! A [`RecordBatch`] is compressed as it is built:
//!
//! ```
//! # use tansu_produce::Error;
//! # fn main() -> Result<(), Error> {
//! use bytes::Bytes;
//! use tansu_produce::{
//!     Compression,
//!     record::{Record, batch::RecordBatch},
//! };
//!
//! let batch = RecordBatch::builder()
//!     .compression(Compression::Gzip)
//!     .record(Record::builder().value(Some(Bytes::from_static(b"hello world!"))))
//!     .build()?;
//!
//! assert!(batch.compressed_records().is_some());
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod compression;
pub mod header;
pub mod message;

pub use compression::Compression;
pub use header::Header;

use batch::RecordBatch;
use bytes::Bytes;
use message::{MessageBlock, MessageSet};
use tracing::{debug, instrument};

use crate::{
    Decode, Decoder, Encode, Encoder, Error, Result,
    primitive::{
        ByteSize,
        varint::{LongVarInt, VarInt},
    },
};

/// A Kafka API Record, as carried within a [`RecordBatch`].
///
/// Note that this structure uses the same variant encoding as protobuf.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Record {
    pub attributes: i8,
    pub timestamp_delta: i64,
    pub offset_delta: i32,
    pub key: Option<Bytes>,
    pub value: Option<Bytes>,
    pub headers: Vec<Header>,
}

impl ByteSize for Record {
    /// The size of this record, excluding its own length prefix.
    fn size_in_bytes(&self) -> Result<usize> {
        let headers = self.headers.iter().try_fold(
            VarInt::try_from(self.headers.len()).and_then(|length| length.size_in_bytes())?,
            |acc, header| header.size_in_bytes().map(|size| acc + size),
        )?;

        Ok(size_of::<i8>()
            + LongVarInt::from(self.timestamp_delta).size_in_bytes()?
            + VarInt::from(self.offset_delta).size_in_bytes()?
            + self.key.as_deref().size_in_bytes()?
            + self.value.as_deref().size_in_bytes()?
            + headers)
    }
}

impl Encode for Record {
    fn encode(&self, encoder: &mut Encoder) -> Result<()> {
        let length = self.size_in_bytes().and_then(VarInt::try_from)?;

        encoder.put_varint(*length);
        encoder.put_i8(self.attributes);
        encoder.put_varlong(self.timestamp_delta);
        encoder.put_varint(self.offset_delta);
        encoder.put_varint_bytes(self.key.as_deref())?;
        encoder.put_varint_bytes(self.value.as_deref())?;

        encoder.put_varint(*VarInt::try_from(self.headers.len())?);
        for header in &self.headers {
            header.encode(encoder)?;
        }

        Ok(())
    }
}

impl Decode for Record {
    #[instrument(skip_all)]
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        let length = decoder.get_varint()?;
        let length = usize::try_from(length).map_err(|_| Error::InvalidBytesLength(length))?;
        let mut decoder = decoder.subset(length)?;

        let attributes = decoder.get_i8()?;
        let timestamp_delta = decoder.get_varlong()?;
        let offset_delta = decoder.get_varint()?;
        let key = decoder.get_varint_bytes()?;
        let value = decoder.get_varint_bytes()?;

        let count = decoder.get_varint()?;
        let count = usize::try_from(count).map_err(|_| Error::InvalidArrayLength(count))?;

        let mut headers = Vec::with_capacity(count.min(decoder.remaining()));
        for _ in 0..count {
            headers.push(Header::decode(&mut decoder)?);
        }

        if !decoder.is_empty() {
            return Err(Error::TrailingBytes(decoder.remaining()));
        }

        debug!(offset_delta, ?key);

        Ok(Self {
            attributes,
            timestamp_delta,
            offset_delta,
            key,
            value,
            headers,
        })
    }
}

impl Record {
    #[must_use]
    pub fn builder() -> Builder {
        Builder::default()
    }

    pub fn key(&self) -> Option<Bytes> {
        self.key.clone()
    }

    pub fn value(&self) -> Option<Bytes> {
        self.value.clone()
    }

    pub fn is_tombstone(&self) -> bool {
        self.key.is_some() && self.value.is_none()
    }
}

impl From<Builder> for Record {
    fn from(builder: Builder) -> Self {
        builder.build()
    }
}

#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Builder {
    attributes: i8,
    timestamp_delta: i64,
    offset_delta: i32,
    key: Option<Bytes>,
    value: Option<Bytes>,
    headers: Vec<header::Builder>,
}

impl Builder {
    #[must_use]
    pub fn attributes(self, attributes: i8) -> Self {
        Self { attributes, ..self }
    }

    #[must_use]
    pub fn timestamp_delta(self, timestamp_delta: i64) -> Self {
        Self {
            timestamp_delta,
            ..self
        }
    }

    #[must_use]
    pub fn offset_delta(self, offset_delta: i32) -> Self {
        Self {
            offset_delta,
            ..self
        }
    }

    #[must_use]
    pub fn key(self, key: Option<Bytes>) -> Self {
        Self { key, ..self }
    }

    #[must_use]
    pub fn value(self, value: Option<Bytes>) -> Self {
        Self { value, ..self }
    }

    #[must_use]
    pub fn header(mut self, header: header::Builder) -> Self {
        self.headers.push(header);
        self
    }

    #[must_use]
    pub fn build(self) -> Record {
        Record {
            attributes: self.attributes,
            timestamp_delta: self.timestamp_delta,
            offset_delta: self.offset_delta,
            key: self.key,
            value: self.value,
            headers: self.headers.into_iter().map(Into::into).collect(),
        }
    }
}

/// A single record taken from, or destined for, a [`Records`] container.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Entry {
    Message(MessageBlock),
    Record(Record),
}

impl Entry {
    pub fn key(&self) -> Option<&[u8]> {
        match self {
            Self::Message(block) => block.message.key.as_deref(),
            Self::Record(record) => record.key.as_deref(),
        }
    }

    pub fn value(&self) -> Option<&[u8]> {
        match self {
            Self::Message(block) => block.message.value().map(|value| &value[..]),
            Self::Record(record) => record.value.as_deref(),
        }
    }
}

/// The records of a single topic partition.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Records {
    Legacy(MessageSet),
    Default(RecordBatch),
}

impl Default for Records {
    fn default() -> Self {
        Self::Legacy(MessageSet::default())
    }
}

impl From<MessageSet> for Records {
    fn from(value: MessageSet) -> Self {
        Self::Legacy(value)
    }
}

impl From<RecordBatch> for Records {
    fn from(value: RecordBatch) -> Self {
        Self::Default(value)
    }
}

impl Records {
    /// Both formats place their magic byte 16 bytes into the container.
    const MAGIC_OFFSET: usize = 16;

    pub fn is_legacy(&self) -> bool {
        matches!(self, Self::Legacy(_))
    }

    /// The number of top level entries: message blocks or batch records.
    pub fn len(&self) -> usize {
        match self {
            Self::Legacy(set) => set.messages.len(),
            Self::Default(batch) => batch.records().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The key and value of each top level entry, in order.
    pub fn key_values(&self) -> Vec<(Option<&[u8]>, Option<&[u8]>)> {
        match self {
            Self::Legacy(set) => set
                .messages
                .iter()
                .map(|block| {
                    (
                        block.message.key.as_deref(),
                        block.message.value().map(|value| &value[..]),
                    )
                })
                .collect(),

            Self::Default(batch) => batch
                .records()
                .iter()
                .map(|record| (record.key.as_deref(), record.value.as_deref()))
                .collect(),
        }
    }

    /// Remove the entry at `index`, if there is one.
    pub fn remove(&mut self, index: usize) -> Result<Option<Entry>> {
        match self {
            Self::Legacy(set) => Ok((index < set.messages.len())
                .then(|| set.messages.remove(index))
                .map(Entry::Message)),

            Self::Default(batch) => batch
                .remove(index)
                .map(|record| record.map(Entry::Record)),
        }
    }

    /// Append `entry`, which must be of the same format as this container,
    /// otherwise the entry is returned.
    pub fn push(&mut self, entry: Entry) -> Result<Result<(), Entry>> {
        match (self, entry) {
            (Self::Legacy(set), Entry::Message(block)) => {
                set.messages.push(block);
                Ok(Ok(()))
            }

            (Self::Default(batch), Entry::Record(record)) => batch.push(record).map(Ok),

            (_, entry) => Ok(Err(entry)),
        }
    }

    /// An empty container of the same format. A batch keeps its producer and
    /// attribute metadata.
    pub fn empty_like(&self) -> Result<Self> {
        match self {
            Self::Legacy(_) => Ok(Self::Legacy(MessageSet::default())),
            Self::Default(batch) => batch.cleared().map(Self::Default),
        }
    }

    /// Encode this container, returning the number of bytes written.
    #[instrument(skip_all)]
    pub fn encode(&self, encoder: &mut Encoder) -> Result<usize> {
        let start = encoder.offset();

        match self {
            Self::Legacy(set) => set.encode(encoder),
            Self::Default(batch) => batch.encode(encoder),
        }?;

        Ok(encoder.offset() - start).inspect(|written| debug!(written))
    }

    /// Decode a container occupying all of `decoder`, choosing the format from its
    /// magic byte.
    #[instrument(skip_all, fields(remaining = decoder.remaining()))]
    pub fn decode(decoder: &mut Decoder) -> Result<Self> {
        if decoder.is_empty() {
            return Ok(Self::Legacy(MessageSet::default()));
        }

        match decoder.peek_i8(Self::MAGIC_OFFSET)? {
            0 | 1 => MessageSet::decode(decoder).map(Self::Legacy),

            RecordBatch::MAGIC => {
                let batch = RecordBatch::decode(decoder)?;

                if decoder.is_empty() {
                    Ok(Self::Default(batch))
                } else {
                    Err(Error::TrailingBytes(decoder.remaining()))
                }
            }

            magic => Err(Error::UnknownRecordsType(magic)),
        }
    }
}
