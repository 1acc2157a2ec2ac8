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

//! Metrics derived while encoding a produce request.
//!
//! Derivation only happens when the [`Encoder`](crate::Encoder) carries a
//! [`Metrics`] sink. Each update is made twice: once unscoped, and once scoped
//! to the topic being encoded.

use std::fmt::Debug;

use bytes::Bytes;

use crate::record::{
    Records,
    batch::RecordBatch,
    message::{MessageBlock, MessageSet},
};

/// Bytes written for each partition, including its id and length prefix.
pub const BATCH_SIZE: &str = "batch-size";

/// `100 × uncompressed / compressed`, for each compressed message or batch.
pub const COMPRESSION_RATIO: &str = "compression-ratio";

/// Records in each request (unscoped) or each topic of a request (scoped).
pub const RECORDS_PER_REQUEST: &str = "records-per-request";

/// Marked with the number of records sent.
pub const RECORD_SEND_RATE: &str = "record-send-rate";

/// A sink for request metrics. Implementations may be shared between concurrent
/// encoders.
pub trait Metrics: Debug + Send + Sync {
    fn histogram_update(&self, name: &str, topic: Option<&str>, value: i64);

    fn meter_mark(&self, name: &str, topic: Option<&str>, count: i64);
}

/// `round(100 × uncompressed / compressed)`, none when nothing was compressed.
pub fn compression_ratio(uncompressed: usize, compressed: usize) -> Option<i64> {
    if compressed == 0 {
        return None;
    }

    let uncompressed = u128::try_from(uncompressed).ok()?;
    let compressed = u128::try_from(compressed).ok()?;

    i64::try_from((200 * uncompressed + compressed) / (2 * compressed)).ok()
}

/// The record count and compression ratios of a container.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Tally {
    pub records: i64,
    pub compression_ratios: Vec<i64>,
}

impl From<&MessageBlock> for Tally {
    fn from(block: &MessageBlock) -> Self {
        let message = &block.message;

        Self {
            records: message
                .set()
                .map_or(1, |set| i64::try_from(set.len()).unwrap_or(i64::MAX)),

            compression_ratios: compression_ratio(
                message.value().map_or(0, Bytes::len),
                message.compressed_size(),
            )
            .into_iter()
            .collect(),
        }
    }
}

impl From<&MessageSet> for Tally {
    fn from(set: &MessageSet) -> Self {
        set.messages
            .iter()
            .map(Tally::from)
            .fold(Self::default(), |mut acc, tally| {
                acc.records += tally.records;
                acc.compression_ratios.extend(tally.compression_ratios);
                acc
            })
    }
}

impl From<&RecordBatch> for Tally {
    fn from(batch: &RecordBatch) -> Self {
        Self {
            records: i64::try_from(batch.len()).unwrap_or(i64::MAX),
            compression_ratios: batch
                .compressed_records()
                .and_then(|compressed| compression_ratio(batch.records_len(), compressed.len()))
                .into_iter()
                .collect(),
        }
    }
}

impl From<&Records> for Tally {
    fn from(records: &Records) -> Self {
        match records {
            Records::Legacy(set) => Self::from(set),
            Records::Default(batch) => Self::from(batch),
        }
    }
}
