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

//! The produce request.

use std::{
    collections::{BTreeMap, btree_map},
    sync::Arc,
};

use bytes::Bytes;
use tracing::{debug, instrument, warn};

use crate::{
    Ack, Decoder, Encoder, Error, KafkaVersion, Result,
    metrics::{
        BATCH_SIZE, COMPRESSION_RATIO, Metrics, RECORD_SEND_RATE, RECORDS_PER_REQUEST, Tally,
    },
    record::{
        Record, Records,
        batch::RecordBatch,
        message::{Message, MessageSet},
    },
    ser::Reservation,
};

/// Records by partition.
pub type Partitions = BTreeMap<i32, Records>;

/// Partitions by topic.
pub type Topics = BTreeMap<String, Partitions>;

/// A request publishing records to topic partitions.
///
/// Topics with no partitions are never retained by the operations on this request,
/// but may be present after decoding a request that declared them.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ProduceRequest {
    pub transactional_id: Option<String>,
    pub acks: Ack,
    pub timeout_ms: i32,
    pub version: i16,
    pub(crate) records: Option<Topics>,
}

impl ProduceRequest {
    /// The version that introduced the transactional id.
    const TRANSACTIONAL_VERSION: i16 = 3;

    #[must_use]
    pub fn version(self, version: i16) -> Self {
        Self { version, ..self }
    }

    #[must_use]
    pub fn acks(self, acks: Ack) -> Self {
        Self { acks, ..self }
    }

    #[must_use]
    pub fn timeout_ms(self, timeout_ms: i32) -> Self {
        Self { timeout_ms, ..self }
    }

    #[must_use]
    pub fn transactional_id(self, transactional_id: Option<String>) -> Self {
        Self {
            transactional_id,
            ..self
        }
    }

    pub fn key(&self) -> i16 {
        0
    }

    pub fn header_version(&self) -> i16 {
        1
    }

    /// The oldest broker release that understands this request.
    pub fn required_version(&self) -> KafkaVersion {
        match self.version {
            1 => KafkaVersion::V0_9_0_0,
            2 => KafkaVersion::V0_10_0_0,
            3 => KafkaVersion::V0_11_0_0,
            7 => KafkaVersion::V2_1_0_0,
            _ => KafkaVersion::MIN,
        }
    }

    /// The records of this request, absent when none have been attached or
    /// none were decoded.
    pub fn records(&self) -> Option<&Topics> {
        self.records.as_ref()
    }

    pub fn partition(&self, topic: &str, partition: i32) -> Option<&Records> {
        self.records
            .as_ref()
            .and_then(|topics| topics.get(topic))
            .and_then(|partitions| partitions.get(&partition))
    }

    pub fn is_empty(&self) -> bool {
        self.records
            .as_ref()
            .is_none_or(|topics| topics.values().all(|partitions| partitions.is_empty()))
    }

    pub(crate) fn ensure_topic(&mut self, topic: &str) -> &mut Partitions {
        self.records
            .get_or_insert_default()
            .entry(topic.to_owned())
            .or_default()
    }

    /// Append `message` to the message set of this topic partition.
    pub fn add_message(&mut self, topic: &str, partition: i32, message: Message) -> Result<()> {
        match self
            .ensure_topic(topic)
            .entry(partition)
            .or_insert_with(|| Records::Legacy(MessageSet::default()))
        {
            Records::Legacy(set) => {
                set.add_message(message);
                Ok(())
            }

            Records::Default(_) => Err(Error::MixedRecords {
                topic: topic.to_owned(),
                partition,
            }),
        }
    }

    /// Replace the records of this topic partition with `set`.
    pub fn add_set(&mut self, topic: &str, partition: i32, set: MessageSet) {
        _ = self
            .ensure_topic(topic)
            .insert(partition, Records::Legacy(set));
    }

    /// Append `record` to the batch of this topic partition.
    pub fn add_record(&mut self, topic: &str, partition: i32, record: Record) -> Result<()> {
        let records = match self.ensure_topic(topic).entry(partition) {
            btree_map::Entry::Occupied(occupied) => occupied.into_mut(),
            btree_map::Entry::Vacant(vacant) => {
                vacant.insert(RecordBatch::builder().build().map(Records::Default)?)
            }
        };

        match records {
            Records::Default(batch) => batch.push(record),

            Records::Legacy(_) => Err(Error::MixedRecords {
                topic: topic.to_owned(),
                partition,
            }),
        }
    }

    /// Replace the records of this topic partition with `batch`.
    pub fn add_batch(&mut self, topic: &str, partition: i32, batch: RecordBatch) {
        _ = self
            .ensure_topic(topic)
            .insert(partition, Records::Default(batch));
    }

    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut encoder = Encoder::new();
        self.encode(&mut encoder)?;
        encoder.finish()
    }

    /// Encode this request, updating `metrics` as it goes.
    pub fn to_bytes_with(&self, metrics: Arc<dyn Metrics>) -> Result<Bytes> {
        let mut encoder = Encoder::new().with_metrics(metrics);
        self.encode(&mut encoder)?;
        encoder.finish()
    }

    /// Encode this request. On error, the encoder holds a partial request and
    /// should be discarded.
    #[instrument(skip_all, fields(version = self.version))]
    pub fn encode(&self, encoder: &mut Encoder) -> Result<()> {
        if self.version >= Self::TRANSACTIONAL_VERSION {
            encoder.put_nullable_string(self.transactional_id.as_deref())?;
        }

        encoder.put_i16(self.acks.into());
        encoder.put_i32(self.timeout_ms);

        let topics = self.records.as_ref();
        encoder.put_array_length(topics.map_or(0, BTreeMap::len))?;

        let mut total = 0;

        for (topic, partitions) in topics.into_iter().flatten() {
            encoder.put_string(topic)?;
            encoder.put_array_length(partitions.len())?;

            let mut per_topic = 0;

            for (partition, records) in partitions {
                let start = encoder.offset();

                encoder.put_i32(*partition);
                let written =
                    encoder.section(Reservation::Length, |encoder| records.encode(encoder))?;

                debug!(%topic, partition, written);

                if let Some(metrics) = encoder.metrics() {
                    let tally = Tally::from(records);

                    for ratio in tally.compression_ratios {
                        metrics.histogram_update(COMPRESSION_RATIO, None, ratio);
                        metrics.histogram_update(COMPRESSION_RATIO, Some(topic), ratio);
                    }

                    let batch_size = i64::try_from(encoder.offset() - start)?;
                    metrics.histogram_update(BATCH_SIZE, None, batch_size);
                    metrics.histogram_update(BATCH_SIZE, Some(topic), batch_size);

                    per_topic += tally.records;
                }
            }

            if let Some(metrics) = encoder.metrics().filter(|_| per_topic > 0) {
                metrics.meter_mark(RECORD_SEND_RATE, Some(topic), per_topic);
                metrics.histogram_update(RECORDS_PER_REQUEST, Some(topic), per_topic);
                total += per_topic;
            }
        }

        if let Some(metrics) = encoder.metrics().filter(|_| total > 0) {
            metrics.meter_mark(RECORD_SEND_RATE, None, total);
            metrics.histogram_update(RECORDS_PER_REQUEST, None, total);
        }

        Ok(())
    }

    #[instrument(skip(decoder), fields(remaining = decoder.remaining()))]
    pub fn decode(decoder: &mut Decoder, version: i16) -> Result<Self> {
        let transactional_id = if version >= Self::TRANSACTIONAL_VERSION {
            decoder.get_nullable_string()?
        } else {
            None
        };

        let acks = Ack::from(decoder.get_i16()?);
        let timeout_ms = decoder.get_i32()?;

        let topic_count = decoder.get_array_length()?;

        let records = if topic_count == 0 {
            None
        } else {
            let mut topics = Topics::new();

            for _ in 0..topic_count {
                let topic = decoder.get_string()?;
                let partition_count = decoder.get_array_length()?;

                if partition_count == 0 {
                    warn!(%topic, "topic without partitions");
                }

                let mut partitions = Partitions::new();

                for _ in 0..partition_count {
                    let partition = decoder.get_i32()?;

                    let length = decoder.get_i32()?;
                    let length =
                        usize::try_from(length).map_err(|_| Error::InvalidBytesLength(length))?;

                    let records = Records::decode(&mut decoder.subset(length)?)?;
                    debug!(%topic, partition, length, legacy = records.is_legacy());

                    _ = partitions.insert(partition, records);
                }

                _ = topics.insert(topic, partitions);
            }

            Some(topics)
        };

        Ok(Self {
            transactional_id,
            acks,
            timeout_ms,
            version,
            records,
        })
    }

    /// Decode a request occupying all of `encoded`.
    pub fn from_bytes(encoded: Bytes, version: i16) -> Result<Self> {
        let mut decoder = Decoder::new(encoded);
        let request = Self::decode(&mut decoder, version)?;

        if decoder.is_empty() {
            Ok(request)
        } else {
            Err(Error::TrailingBytes(decoder.remaining()))
        }
    }
}
