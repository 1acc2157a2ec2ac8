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
//! A sans-io implementation of the Kafka produce request.
//!
//! ## Design
//!
//! A [`ProduceRequest`] maps each topic to its partitions, and each partition to a
//! single [`Records`] container. A container holds either a legacy
//! [`MessageSet`](record::message::MessageSet) or a single
//! [`RecordBatch`](record::batch::RecordBatch), never both.
//!
//! Encoding writes through an [`Encoder`], which supports reserved sections that are
//! backfilled when the section is closed: a length prefix, or a CRC over the section.
//! Decoding reads through a [`Decoder`], which can be narrowed to a bounded subset of
//! its remaining bytes.
//!
//! When the [`Encoder`] carries a [`Metrics`](metrics::Metrics) sink, encoding also
//! derives batch size, record count and compression ratio for each partition and topic.
//!
//! Before encoding, [`ProduceRequest::rewrite`] can relocate a record to another topic
//! using a [`TopicRule`](rewrite::TopicRule).
//!
//! ## Examples
//!
//! ```
//! # use tansu_produce::Error;
//! # fn main() -> Result<(), Error> {
//! use bytes::Bytes;
//! use tansu_produce::{
//!     Ack, ProduceRequest,
//!     record::{Record, batch::RecordBatch},
//! };
//!
//! let batch = RecordBatch::builder()
//!     .record(Record::builder().value(Some(Bytes::from_static(b"hello world!"))))
//!     .build()?;
//!
//! let mut request = ProduceRequest::default()
//!     .version(3)
//!     .acks(Ack::WaitForAll)
//!     .timeout_ms(1_500);
//!
//! request.add_batch("test", 0, batch);
//!
//! let encoded = request.to_bytes()?;
//! assert_eq!(request, ProduceRequest::from_bytes(encoded, 3)?);
//! # Ok(())
//! # }
//! ```

pub mod de;
pub mod metrics;
pub mod primitive;
pub mod produce;
pub mod record;
pub mod rewrite;
pub mod ser;

pub use de::Decoder;
pub use produce::ProduceRequest;
pub use record::{Compression, Records};
pub use ser::Encoder;

use std::{
    fmt::{self, Display, Formatter},
    io, num, str, string,
    sync::Arc,
};

#[derive(Clone, Debug, thiserror::Error)]
pub enum Error {
    CrcMismatch {
        expected: u32,
        computed: u32,
    },
    InsufficientData {
        requested: usize,
        available: usize,
    },
    InvalidArrayLength(i32),
    InvalidBytesLength(i32),
    InvalidStringLength(i16),
    Io(Arc<io::Error>),
    Json(Arc<serde_json::Error>),
    Message(String),
    MixedRecords {
        topic: String,
        partition: i32,
    },
    OffsetOverflow {
        base_offset: i64,
        delta: i64,
    },
    Regex(#[from] regex::Error),
    Snap(#[from] snap::Error),
    StringTooLong(usize),
    TimestampOverflow {
        first_timestamp: i64,
        delta: i64,
    },
    TrailingBytes(usize),
    TryFromInt(#[from] num::TryFromIntError),
    UnbalancedReservation,
    UncompressedWrapper,
    UnknownCompressionType(i16),
    UnknownRecordsType(i8),
    Utf8(#[from] str::Utf8Error),
    VarIntOverflow,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Error::Message(e) => f.write_str(e),
            e => write!(f, "{e:?}"),
        }
    }
}

impl Error {
    /// Whether this error was caused by malformed or truncated wire data.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::CrcMismatch { .. }
                | Self::InsufficientData { .. }
                | Self::InvalidArrayLength(_)
                | Self::InvalidBytesLength(_)
                | Self::InvalidStringLength(_)
                | Self::TrailingBytes(_)
                | Self::UnknownCompressionType(_)
                | Self::UnknownRecordsType(_)
                | Self::Utf8(_)
                | Self::VarIntOverflow
        )
    }
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(Arc::new(value))
    }
}

impl From<string::FromUtf8Error> for Error {
    fn from(value: string::FromUtf8Error) -> Self {
        Self::Utf8(value.utf8_error())
    }
}

/// Produce message acknowledgement.
///
/// Brokers prior to 0.8.2.0 also accepted any positive count of replicas, which is
/// carried as [`Ack::Replicas`] rather than rejected.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Ack {
    NoResponse,
    #[default]
    WaitForLocal,
    WaitForAll,
    Replicas(i16),
}

impl Ack {
    const WAIT_FOR_ALL: i16 = -1;
    const NO_RESPONSE: i16 = 0;
    const WAIT_FOR_LOCAL: i16 = 1;
}

impl From<Ack> for i16 {
    fn from(value: Ack) -> Self {
        match value {
            Ack::WaitForAll => Ack::WAIT_FOR_ALL,
            Ack::NoResponse => Ack::NO_RESPONSE,
            Ack::WaitForLocal => Ack::WAIT_FOR_LOCAL,
            Ack::Replicas(replicas) => replicas,
        }
    }
}

impl From<i16> for Ack {
    fn from(value: i16) -> Self {
        match value {
            Self::WAIT_FOR_ALL => Self::WaitForAll,
            Self::NO_RESPONSE => Self::NoResponse,
            Self::WAIT_FOR_LOCAL => Self::WaitForLocal,
            replicas => Self::Replicas(replicas),
        }
    }
}

/// A broker release, as `major.minor.patch.build`.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct KafkaVersion([u16; 4]);

impl KafkaVersion {
    pub const V0_8_2_0: Self = Self([0, 8, 2, 0]);
    pub const V0_9_0_0: Self = Self([0, 9, 0, 0]);
    pub const V0_10_0_0: Self = Self([0, 10, 0, 0]);
    pub const V0_11_0_0: Self = Self([0, 11, 0, 0]);
    pub const V2_1_0_0: Self = Self([2, 1, 0, 0]);

    /// The oldest release understood by this crate.
    pub const MIN: Self = Self::V0_8_2_0;

    pub const fn new(major: u16, minor: u16, patch: u16, build: u16) -> Self {
        Self([major, minor, patch, build])
    }

    pub fn is_at_least(&self, other: &Self) -> bool {
        self >= other
    }
}

impl Display for KafkaVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let [major, minor, patch, build] = self.0;
        write!(f, "{major}.{minor}.{patch}.{build}")
    }
}

/// Types that write themselves through an [`Encoder`].
pub trait Encode {
    fn encode(&self, encoder: &mut Encoder) -> Result<()>;
}

/// Types that read themselves from a [`Decoder`].
pub trait Decode: Sized {
    fn decode(decoder: &mut Decoder) -> Result<Self>;
}
