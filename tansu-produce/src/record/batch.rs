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

//! The default (magic 2) record batch.

use bytes::Bytes;
use tracing::{debug, instrument};

use crate::{
    Decode, Decoder, Encode, Encoder, Error, Result,
    record::{Compression, Record},
    ser::{Checksum, Reservation},
};

/// The timestamp type.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum TimestampType {
    #[default]
    CreateTime,
    LogAppendTime,
}

impl TimestampType {
    const TIMESTAMP_TYPE_BITMASK: i16 = 8;
}

impl From<i16> for TimestampType {
    fn from(value: i16) -> Self {
        if value & Self::TIMESTAMP_TYPE_BITMASK == Self::TIMESTAMP_TYPE_BITMASK {
            Self::LogAppendTime
        } else {
            Self::CreateTime
        }
    }
}

impl From<TimestampType> for i16 {
    fn from(value: TimestampType) -> Self {
        match value {
            TimestampType::CreateTime => 0,
            TimestampType::LogAppendTime => TimestampType::TIMESTAMP_TYPE_BITMASK,
        }
    }
}

/// The batch attributes.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct BatchAttribute {
    pub compression: Compression,
    pub timestamp: TimestampType,
    pub transaction: bool,
    pub control: bool,
}

impl BatchAttribute {
    const TRANSACTION_BITMASK: i16 = 16;
    const CONTROL_BITMASK: i16 = 32;

    #[must_use]
    pub fn compression(self, compression: Compression) -> Self {
        Self {
            compression,
            ..self
        }
    }

    #[must_use]
    pub fn timestamp(self, timestamp: TimestampType) -> Self {
        Self { timestamp, ..self }
    }

    #[must_use]
    pub fn transaction(self, transaction: bool) -> Self {
        Self {
            transaction,
            ..self
        }
    }

    #[must_use]
    pub fn control(self, control: bool) -> Self {
        Self { control, ..self }
    }
}

impl From<BatchAttribute> for i16 {
    fn from(value: BatchAttribute) -> Self {
        let mut attributes = i16::from(value.compression);
        attributes |= i16::from(value.timestamp);

        if value.transaction {
            attributes |= BatchAttribute::TRANSACTION_BITMASK;
        }

        if value.control {
            attributes |= BatchAttribute::CONTROL_BITMASK;
        }

        attributes
    }
}

impl TryFrom<i16> for BatchAttribute {
    type Error = Error;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        Compression::try_from(value).map(|compression| {
            Self::default()
                .compression(compression)
                .timestamp(TimestampType::from(value))
                .transaction(value & Self::TRANSACTION_BITMASK == Self::TRANSACTION_BITMASK)
                .control(value & Self::CONTROL_BITMASK == Self::CONTROL_BITMASK)
        })
    }
}

/// A batch of records sharing producer and timestamp metadata.
///
/// The record payload is kept sealed: `records_len` is the encoded length of the
/// records before compression, and `compressed_records` holds their compressed form
/// whenever a codec is in use. Both are recomputed when records are added or removed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RecordBatch {
    pub base_offset: i64,
    pub partition_leader_epoch: i32,
    pub producer_id: i64,
    pub producer_epoch: i16,
    pub base_sequence: i32,
    attributes: BatchAttribute,
    first_timestamp: i64,
    last_offset_delta: i32,
    max_timestamp: i64,
    records: Vec<Record>,
    records_len: usize,
    compressed_records: Option<Bytes>,
}

impl RecordBatch {
    pub const MAGIC: i8 = 2;

    #[must_use]
    pub fn builder() -> Builder {
        Builder::default()
    }

    pub fn attributes(&self) -> BatchAttribute {
        self.attributes
    }

    pub fn compression(&self) -> Compression {
        self.attributes.compression
    }

    pub fn first_timestamp(&self) -> i64 {
        self.first_timestamp
    }

    pub fn last_offset_delta(&self) -> i32 {
        self.last_offset_delta
    }

    pub fn max_timestamp(&self) -> i64 {
        self.max_timestamp
    }

    pub fn max_offset(&self) -> Result<i64> {
        let delta = i64::from(self.last_offset_delta);

        self.base_offset
            .checked_add(delta)
            .ok_or(Error::OffsetOverflow {
                base_offset: self.base_offset,
                delta,
            })
    }

    pub fn records(&self) -> &[Record] {
        &self.records[..]
    }

    pub fn records_len(&self) -> usize {
        self.records_len
    }

    pub fn compressed_records(&self) -> Option<&Bytes> {
        self.compressed_records.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn push(&mut self, record: Record) -> Result<()> {
        self.records.push(record);
        self.seal()
    }

    pub fn remove(&mut self, index: usize) -> Result<Option<Record>> {
        if index < self.records.len() {
            let record = self.records.remove(index);
            self.seal().and(Ok(Some(record)))
        } else {
            Ok(None)
        }
    }

    /// This batch without any records.
    pub fn cleared(&self) -> Result<Self> {
        let mut batch = Self {
            records: Vec::new(),
            ..self.clone()
        };

        batch.seal().and(Ok(batch))
    }

    #[instrument(skip_all, fields(records = self.records.len()))]
    fn seal(&mut self) -> Result<()> {
        for (index, record) in self.records.iter_mut().enumerate() {
            record.offset_delta = i32::try_from(index)?;
        }

        self.last_offset_delta = i32::try_from(self.records.len().saturating_sub(1))?;

        self.max_timestamp = self
            .records
            .iter()
            .map(|record| record.timestamp_delta)
            .max()
            .map_or(Ok(self.first_timestamp), |delta| {
                self.first_timestamp
                    .checked_add(delta)
                    .ok_or(Error::TimestampOverflow {
                        first_timestamp: self.first_timestamp,
                        delta,
                    })
            })?;

        let mut encoder = Encoder::new();
        for record in &self.records {
            record.encode(&mut encoder)?;
        }
        let raw = encoder.finish()?;

        self.records_len = raw.len();

        self.compressed_records = if self.attributes.compression == Compression::None {
            None
        } else {
            self.attributes.compression.compress(&raw[..]).map(Some)?
        };

        debug!(
            records_len = self.records_len,
            compressed = self.compressed_records.as_ref().map(Bytes::len)
        );

        Ok(())
    }
}

impl Encode for RecordBatch {
    #[instrument(skip_all, fields(base_offset = self.base_offset, records = self.records.len()))]
    fn encode(&self, encoder: &mut Encoder) -> Result<()> {
        encoder.put_i64(self.base_offset);

        encoder.section(Reservation::Length, |encoder| {
            encoder.put_i32(self.partition_leader_epoch);
            encoder.put_i8(Self::MAGIC);

            encoder.section(Reservation::Crc(Checksum::Castagnoli), |encoder| {
                encoder.put_i16(self.attributes.into());
                encoder.put_i32(self.last_offset_delta);
                encoder.put_i64(self.first_timestamp);
                encoder.put_i64(self.max_timestamp);
                encoder.put_i64(self.producer_id);
                encoder.put_i16(self.producer_epoch);
                encoder.put_i32(self.base_sequence);
                encoder.put_array_length(self.records.len())?;

                if let Some(compressed) = self.compressed_records.as_deref() {
                    encoder.put_raw(compressed);
                    Ok(())
                } else {
                    self.records
                        .iter()
                        .try_for_each(|record| record.encode(encoder))
                }
            })
        })
    }
}

impl Decode for RecordBatch {
    #[instrument(skip_all)]
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        let base_offset = decoder.get_i64()?;

        let length = decoder.get_i32()?;
        let length = usize::try_from(length).map_err(|_| Error::InvalidBytesLength(length))?;
        let mut decoder = decoder.subset(length)?;

        let partition_leader_epoch = decoder.get_i32()?;

        let magic = decoder.get_i8()?;
        if magic != Self::MAGIC {
            return Err(Error::UnknownRecordsType(magic));
        }

        let expected = decoder.get_u32()?;
        let computed = Checksum::Castagnoli.checksum(decoder.peek_remaining());
        if expected != computed {
            return Err(Error::CrcMismatch { expected, computed });
        }

        let attributes = BatchAttribute::try_from(decoder.get_i16()?)?;
        let last_offset_delta = decoder.get_i32()?;
        let first_timestamp = decoder.get_i64()?;
        let max_timestamp = decoder.get_i64()?;
        let producer_id = decoder.get_i64()?;
        let producer_epoch = decoder.get_i16()?;
        let base_sequence = decoder.get_i32()?;

        let count = decoder.get_i32()?;
        let count = usize::try_from(count).map_err(|_| Error::InvalidArrayLength(count))?;

        let payload = decoder.get_raw(decoder.remaining())?;

        let (raw, compressed_records) = if attributes.compression == Compression::None {
            (payload, None)
        } else {
            (
                attributes.compression.decompress(&payload[..])?,
                Some(payload),
            )
        };

        debug!(base_offset, count, records_len = raw.len(), ?attributes);

        let records_len = raw.len();
        let mut decoder = Decoder::new(raw);

        let mut records = Vec::with_capacity(count.min(records_len));
        for _ in 0..count {
            records.push(Record::decode(&mut decoder)?);
        }

        if !decoder.is_empty() {
            return Err(Error::TrailingBytes(decoder.remaining()));
        }

        Ok(Self {
            base_offset,
            partition_leader_epoch,
            producer_id,
            producer_epoch,
            base_sequence,
            attributes,
            first_timestamp,
            last_offset_delta,
            max_timestamp,
            records,
            records_len,
            compressed_records,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Builder {
    base_offset: i64,
    partition_leader_epoch: i32,
    attributes: BatchAttribute,
    first_timestamp: i64,
    producer_id: i64,
    producer_epoch: i16,
    base_sequence: i32,
    records: Vec<Record>,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            base_offset: 0,
            partition_leader_epoch: -1,
            attributes: BatchAttribute::default(),
            first_timestamp: 0,
            producer_id: -1,
            producer_epoch: -1,
            base_sequence: -1,
            records: Vec::new(),
        }
    }
}

impl Builder {
    #[must_use]
    pub fn base_offset(self, base_offset: i64) -> Self {
        Self {
            base_offset,
            ..self
        }
    }

    #[must_use]
    pub fn partition_leader_epoch(self, partition_leader_epoch: i32) -> Self {
        Self {
            partition_leader_epoch,
            ..self
        }
    }

    #[must_use]
    pub fn attributes(self, attributes: BatchAttribute) -> Self {
        Self { attributes, ..self }
    }

    #[must_use]
    pub fn compression(self, compression: Compression) -> Self {
        Self {
            attributes: self.attributes.compression(compression),
            ..self
        }
    }

    #[must_use]
    pub fn first_timestamp(self, first_timestamp: i64) -> Self {
        Self {
            first_timestamp,
            ..self
        }
    }

    #[must_use]
    pub fn producer_id(self, producer_id: i64) -> Self {
        Self {
            producer_id,
            ..self
        }
    }

    #[must_use]
    pub fn producer_epoch(self, producer_epoch: i16) -> Self {
        Self {
            producer_epoch,
            ..self
        }
    }

    #[must_use]
    pub fn base_sequence(self, base_sequence: i32) -> Self {
        Self {
            base_sequence,
            ..self
        }
    }

    #[must_use]
    pub fn record(mut self, record: impl Into<Record>) -> Self {
        self.records.push(record.into());
        self
    }

    pub fn build(self) -> Result<RecordBatch> {
        let mut batch = RecordBatch {
            base_offset: self.base_offset,
            partition_leader_epoch: self.partition_leader_epoch,
            producer_id: self.producer_id,
            producer_epoch: self.producer_epoch,
            base_sequence: self.base_sequence,
            attributes: self.attributes,
            first_timestamp: self.first_timestamp,
            last_offset_delta: 0,
            max_timestamp: self.first_timestamp,
            records: self.records,
            records_len: 0,
            compressed_records: None,
        };

        batch.seal().and(Ok(batch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn encode(batch: &RecordBatch) -> Result<Bytes> {
        let mut encoder = Encoder::new();
        batch.encode(&mut encoder)?;
        encoder.finish()
    }

    fn values(batch: &RecordBatch) -> Vec<Option<Bytes>> {
        batch.records().iter().map(Record::value).collect()
    }

    #[test]
    fn batch_attribute() -> Result<()> {
        let attributes = BatchAttribute::default()
            .compression(Compression::Zstd)
            .timestamp(TimestampType::LogAppendTime)
            .transaction(true);

        assert_eq!(28, i16::from(attributes));
        assert_eq!(attributes, BatchAttribute::try_from(28)?);
        Ok(())
    }

    #[test]
    fn sealed_offsets() -> Result<()> {
        let batch = RecordBatch::builder()
            .first_timestamp(1_000)
            .record(Record::builder().value(Some(Bytes::from_static(b"a"))).offset_delta(7))
            .record(
                Record::builder()
                    .value(Some(Bytes::from_static(b"b")))
                    .timestamp_delta(25),
            )
            .build()?;

        assert_eq!(
            vec![0, 1],
            batch
                .records()
                .iter()
                .map(|record| record.offset_delta)
                .collect::<Vec<_>>()
        );
        assert_eq!(1, batch.last_offset_delta());
        assert_eq!(1_025, batch.max_timestamp());
        assert!(batch.compressed_records().is_none());
        Ok(())
    }

    #[test]
    fn timestamp_overflow() {
        assert!(matches!(
            RecordBatch::builder()
                .first_timestamp(i64::MAX)
                .record(Record::builder().timestamp_delta(1))
                .build(),
            Err(Error::TimestampOverflow { .. })
        ));
    }

    #[test]
    fn timestamp_overflow_on_push() -> Result<()> {
        let mut batch = RecordBatch::builder()
            .first_timestamp(i64::MAX - 10)
            .record(Record::builder().timestamp_delta(10))
            .build()?;

        assert_eq!(i64::MAX, batch.max_timestamp());

        assert!(matches!(
            batch.push(Record::builder().timestamp_delta(11).build()),
            Err(Error::TimestampOverflow { .. })
        ));
        Ok(())
    }

    #[test]
    fn max_offset() -> Result<()> {
        let batch = RecordBatch::builder()
            .base_offset(40)
            .record(Record::builder())
            .record(Record::builder())
            .build()?;

        assert_eq!(41, batch.max_offset()?);

        let batch = RecordBatch::builder()
            .base_offset(i64::MAX)
            .record(Record::builder())
            .record(Record::builder())
            .build()?;

        assert!(matches!(batch.max_offset(), Err(Error::OffsetOverflow { .. })));
        Ok(())
    }

    #[test]
    fn header_layout() -> Result<()> {
        let batch = RecordBatch::builder()
            .base_offset(3)
            .record(Record::builder().value(Some(Bytes::from_static(b"abc"))))
            .build()?;

        let encoded = encode(&batch)?;

        assert_eq!(&[0, 0, 0, 0, 0, 0, 0, 3][..], &encoded[..8]);
        assert_eq!(
            i32::try_from(encoded.len() - 12)?,
            i32::from_be_bytes([encoded[8], encoded[9], encoded[10], encoded[11]])
        );
        assert_eq!(RecordBatch::MAGIC, encoded[16] as i8);
        assert_eq!(
            Checksum::Castagnoli.checksum(&encoded[21..]),
            u32::from_be_bytes([encoded[17], encoded[18], encoded[19], encoded[20]])
        );

        assert_eq!(batch, RecordBatch::decode(&mut Decoder::new(encoded))?);
        Ok(())
    }

    #[test]
    fn compressed_round_trip() -> Result<()> {
        for compression in [
            Compression::Gzip,
            Compression::Snappy,
            Compression::Lz4,
            Compression::Zstd,
        ] {
            let batch = RecordBatch::builder()
                .compression(compression)
                .record(Record::builder().value(Some(Bytes::from(vec![b'x'; 512]))))
                .record(Record::builder().value(Some(Bytes::from(vec![b'y'; 512]))))
                .build()?;

            assert!(batch.compressed_records().is_some_and(|c| c.len() < batch.records_len()));

            let decoded = RecordBatch::decode(&mut Decoder::new(encode(&batch)?))?;
            assert_eq!(batch.records_len(), decoded.records_len());
            assert_eq!(values(&batch), values(&decoded));
            assert_eq!(compression, decoded.compression());
        }

        Ok(())
    }

    #[test]
    fn remove_reseals() -> Result<()> {
        let mut batch = RecordBatch::builder()
            .compression(Compression::Gzip)
            .record(Record::builder().value(Some(Bytes::from_static(b"a"))))
            .record(Record::builder().value(Some(Bytes::from_static(b"b"))))
            .build()?;

        let before = batch.records_len();

        let removed = batch.remove(0)?;
        assert_eq!(Some(Bytes::from_static(b"a")), removed.and_then(|r| r.value));
        assert_eq!(0, batch.records()[0].offset_delta);
        assert!(batch.records_len() < before);
        assert_eq!(None, batch.remove(5)?);

        let decoded = RecordBatch::decode(&mut Decoder::new(encode(&batch)?))?;
        assert_eq!(vec![Some(Bytes::from_static(b"b"))], values(&decoded));
        Ok(())
    }

    #[test]
    fn corrupt_checksum() -> Result<()> {
        let batch = RecordBatch::builder()
            .record(Record::builder().value(Some(Bytes::from_static(b"abc"))))
            .build()?;

        let mut corrupt = encode(&batch)?.to_vec();
        let last = corrupt.len() - 1;
        corrupt[last] ^= 0xff;

        assert!(matches!(
            RecordBatch::decode(&mut Decoder::from(&corrupt[..])),
            Err(Error::CrcMismatch { .. })
        ));
        Ok(())
    }
}
