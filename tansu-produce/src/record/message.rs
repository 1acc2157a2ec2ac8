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

//! Legacy (magic 0 and 1) messages.
//!
//! A [`MessageSet`] is a concatenation of [`MessageBlock`]s with no element count,
//! bounded by its enclosing length. A compressed message wraps a nested set, its
//! value being the compressed encoding of that set.

use bytes::Bytes;
use tracing::{debug, instrument};

use crate::{
    Decode, Decoder, Encode, Encoder, Error, Result,
    record::Compression,
    ser::{Checksum, Reservation},
};

/// Messages without a timestamp carry this value.
pub const NO_TIMESTAMP: i64 = -1;

const LOG_APPEND_TIME: i8 = 0b1000;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Message {
    pub log_append_time: bool,
    pub magic: i8,
    pub timestamp: i64,
    pub key: Option<Bytes>,

    // codec, value, set and compressed only change together, through wrap or decode
    codec: Compression,
    value: Option<Bytes>,
    set: Option<MessageSet>,
    compressed: Option<Bytes>,
}

impl Default for Message {
    fn default() -> Self {
        Self {
            codec: Compression::None,
            log_append_time: false,
            magic: 1,
            timestamp: NO_TIMESTAMP,
            key: None,
            value: None,
            set: None,
            compressed: None,
        }
    }
}

impl Message {
    pub fn new(key: Option<Bytes>, value: Option<Bytes>) -> Self {
        Self {
            key,
            value,
            ..Default::default()
        }
    }

    /// A message wrapping `set`, compressed with `codec`.
    ///
    /// A nested set is only recoverable from a compressed value, so
    /// [`Compression::None`] is rejected.
    #[instrument(skip(set))]
    pub fn wrap(codec: Compression, set: MessageSet) -> Result<Self> {
        if codec == Compression::None {
            return Err(Error::UncompressedWrapper);
        }

        let mut encoder = Encoder::new();
        set.encode(&mut encoder)?;
        let value = encoder.finish()?;

        let compressed = codec.compress(&value[..])?;
        debug!(uncompressed = value.len(), compressed = compressed.len());

        Ok(Self {
            codec,
            value: Some(value),
            set: Some(set),
            compressed: Some(compressed),
            ..Default::default()
        })
    }

    #[must_use]
    pub fn magic(self, magic: i8) -> Self {
        Self { magic, ..self }
    }

    #[must_use]
    pub fn timestamp(self, timestamp: i64) -> Self {
        Self { timestamp, ..self }
    }

    #[must_use]
    pub fn log_append_time(self, log_append_time: bool) -> Self {
        Self {
            log_append_time,
            ..self
        }
    }

    pub fn codec(&self) -> Compression {
        self.codec
    }

    /// The uncompressed value.
    pub fn value(&self) -> Option<&Bytes> {
        self.value.as_ref()
    }

    /// The nested set of a compressed message.
    pub fn set(&self) -> Option<&MessageSet> {
        self.set.as_ref()
    }

    /// The size of the compressed value, zero when uncompressed.
    pub fn compressed_size(&self) -> usize {
        self.compressed.as_ref().map_or(0, Bytes::len)
    }

    fn attributes(&self) -> i8 {
        let codec = i16::from(self.codec) as i8;

        if self.log_append_time && self.magic >= 1 {
            codec | LOG_APPEND_TIME
        } else {
            codec
        }
    }

    fn payload(&self) -> Option<&Bytes> {
        if self.codec == Compression::None {
            self.value.as_ref()
        } else {
            self.compressed.as_ref()
        }
    }
}

impl Encode for Message {
    fn encode(&self, encoder: &mut Encoder) -> Result<()> {
        let payload = self.payload();

        encoder.section(Reservation::Crc(Checksum::Ieee), |encoder| {
            encoder.put_i8(self.magic);
            encoder.put_i8(self.attributes());

            if self.magic >= 1 {
                encoder.put_i64(self.timestamp);
            }

            encoder.put_bytes(self.key.as_deref())?;
            encoder.put_bytes(payload.map(|v| &v[..]))
        })
    }
}

impl Decode for Message {
    /// Decode a message occupying all of `decoder`, verifying its checksum.
    #[instrument(skip_all)]
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        let expected = decoder.get_u32()?;
        let computed = Checksum::Ieee.checksum(decoder.peek_remaining());

        if expected != computed {
            return Err(Error::CrcMismatch { expected, computed });
        }

        let magic = decoder.get_i8()?;
        if !(0..=1).contains(&magic) {
            return Err(Error::UnknownRecordsType(magic));
        }

        let attributes = decoder.get_i8()?;
        let codec = Compression::try_from(i16::from(attributes))?;

        let timestamp = if magic >= 1 {
            decoder.get_i64()?
        } else {
            NO_TIMESTAMP
        };

        let key = decoder.get_bytes()?;
        let value = decoder.get_bytes()?;

        if !decoder.is_empty() {
            return Err(Error::TrailingBytes(decoder.remaining()));
        }

        let (value, set, compressed) = match (codec, value) {
            (Compression::None, value) | (_, value @ None) => (value, None, None),

            (codec, Some(compressed)) => {
                let value = codec.decompress(&compressed[..])?;
                let set = MessageSet::decode(&mut Decoder::new(value.clone()))?;
                (Some(value), Some(set), Some(compressed))
            }
        };

        Ok(Self {
            codec,
            log_append_time: magic >= 1 && attributes & LOG_APPEND_TIME != 0,
            magic,
            timestamp,
            key,
            value,
            set,
            compressed,
        })
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MessageBlock {
    pub offset: i64,
    pub message: Message,
}

impl Encode for MessageBlock {
    fn encode(&self, encoder: &mut Encoder) -> Result<()> {
        encoder.put_i64(self.offset);
        encoder.section(Reservation::Length, |encoder| self.message.encode(encoder))
    }
}

impl Decode for MessageBlock {
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        let offset = decoder.get_i64()?;

        let size = decoder.get_i32()?;
        let size = usize::try_from(size).map_err(|_| Error::InvalidBytesLength(size))?;

        Message::decode(&mut decoder.subset(size)?).map(|message| Self { offset, message })
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MessageSet {
    pub messages: Vec<MessageBlock>,
}

impl MessageSet {
    pub fn add_message(&mut self, message: Message) {
        self.messages.push(MessageBlock { offset: 0, message });
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl From<Vec<Message>> for MessageSet {
    fn from(messages: Vec<Message>) -> Self {
        let mut set = Self::default();
        messages
            .into_iter()
            .for_each(|message| set.add_message(message));
        set
    }
}

impl Encode for MessageSet {
    fn encode(&self, encoder: &mut Encoder) -> Result<()> {
        self.messages
            .iter()
            .try_for_each(|block| block.encode(encoder))
    }
}

impl Decode for MessageSet {
    /// Decode blocks until `decoder` is exhausted.
    #[instrument(skip_all, fields(remaining = decoder.remaining()))]
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        let mut messages = Vec::new();

        while !decoder.is_empty() {
            messages.push(MessageBlock::decode(decoder)?);
        }

        Ok(Self { messages })
    }
}
