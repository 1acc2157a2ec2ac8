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

//! Encoding cursor
//!
//! The [`Encoder`] writes big-endian primitives into a growable buffer. A
//! [`Reservation`] is a placeholder written when a section is pushed and backfilled
//! when that section is popped, once the section body is known:
//!
//! ```
//! # use tansu_produce::Error;
//! # fn main() -> Result<(), Error> {
//! use tansu_produce::{Encoder, ser::Reservation};
//!
//! let mut encoder = Encoder::new();
//! encoder.push(Reservation::Length);
//! encoder.put_string("abc")?;
//! encoder.pop()?;
//!
//! assert_eq!(&[0, 0, 0, 5, 0, 3, 97, 98, 99][..], &encoder.finish()?[..]);
//! # Ok(())
//! # }
//! ```

use std::{fmt, sync::Arc};

use bytes::{BufMut as _, Bytes, BytesMut};
use crc::{CRC_32_ISCSI, CRC_32_ISO_HDLC, Crc};
use tracing::{debug, instrument};

use crate::{Error, Result, metrics::Metrics, primitive::varint};

const CASTAGNOLI: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);
const IEEE: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// The CRC-32 polynomial used by a [`Reservation::Crc`] section.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Checksum {
    /// Legacy messages (magic 0 and 1).
    Ieee,
    /// Record batches (magic 2).
    Castagnoli,
}

impl Checksum {
    pub fn checksum(&self, data: &[u8]) -> u32 {
        match self {
            Self::Ieee => IEEE.checksum(data),
            Self::Castagnoli => CASTAGNOLI.checksum(data),
        }
    }
}

/// A fixed width placeholder that is filled once its section is complete.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Reservation {
    /// An `i32` holding the number of bytes in the section.
    Length,
    /// A `u32` checksum over the bytes of the section.
    Crc(Checksum),
}

impl Reservation {
    fn width(&self) -> usize {
        match self {
            Self::Length => size_of::<i32>(),
            Self::Crc(_) => size_of::<u32>(),
        }
    }

    fn fill(&self, placeholder: &mut [u8], section: &[u8]) -> Result<()> {
        let value = match self {
            Self::Length => i32::try_from(section.len()).map(|length| length.to_be_bytes())?,
            Self::Crc(checksum) => checksum.checksum(section).to_be_bytes(),
        };

        placeholder.copy_from_slice(&value);
        Ok(())
    }
}

#[derive(Default)]
pub struct Encoder {
    buf: BytesMut,
    stack: Vec<(usize, Reservation)>,
    metrics: Option<Arc<dyn Metrics>>,
}

impl fmt::Debug for Encoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(stringify!(Encoder))
            .field("offset", &self.buf.len())
            .field("stack", &self.stack)
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Attach a metrics sink, updated as requests are encoded.
    #[must_use]
    pub fn with_metrics(self, metrics: Arc<dyn Metrics>) -> Self {
        Self {
            metrics: Some(metrics),
            ..self
        }
    }

    pub fn metrics(&self) -> Option<&dyn Metrics> {
        self.metrics.as_deref()
    }

    /// The number of bytes written so far.
    pub fn offset(&self) -> usize {
        self.buf.len()
    }

    /// Open a section, writing a placeholder for `reservation`.
    pub fn push(&mut self, reservation: Reservation) {
        let start = self.buf.len();
        self.buf.put_bytes(0, reservation.width());
        self.stack.push((start, reservation));
    }

    /// Close the most recently pushed section, backfilling its placeholder.
    pub fn pop(&mut self) -> Result<()> {
        let (start, reservation) = self.stack.pop().ok_or(Error::UnbalancedReservation)?;

        let (placeholder, section) = self.buf[start..].split_at_mut(reservation.width());
        reservation.fill(placeholder, section)
    }

    /// Write `body` within a section opened with `reservation`.
    pub fn section<F, T>(&mut self, reservation: Reservation, body: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        self.push(reservation);
        let outcome = body(self)?;
        self.pop().and(Ok(outcome))
    }

    #[instrument(skip_all)]
    pub fn finish(self) -> Result<Bytes> {
        if self.stack.is_empty() {
            debug!(len = self.buf.len());
            Ok(self.buf.freeze())
        } else {
            Err(Error::UnbalancedReservation)
        }
    }

    pub fn put_i8(&mut self, value: i8) {
        self.buf.put_i8(value)
    }

    pub fn put_i16(&mut self, value: i16) {
        self.buf.put_i16(value)
    }

    pub fn put_i32(&mut self, value: i32) {
        self.buf.put_i32(value)
    }

    pub fn put_i64(&mut self, value: i64) {
        self.buf.put_i64(value)
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.put_u32(value)
    }

    pub fn put_raw(&mut self, value: &[u8]) {
        self.buf.put_slice(value)
    }

    /// An `i32` element count.
    pub fn put_array_length(&mut self, length: usize) -> Result<()> {
        i32::try_from(length)
            .map(|length| self.put_i32(length))
            .map_err(Into::into)
    }

    /// An `i16` length followed by UTF-8 bytes.
    pub fn put_string(&mut self, value: &str) -> Result<()> {
        i16::try_from(value.len())
            .map_err(|_| Error::StringTooLong(value.len()))
            .map(|length| {
                self.put_i16(length);
                self.put_raw(value.as_bytes());
            })
    }

    /// As [`Encoder::put_string`], with a length of -1 for none.
    pub fn put_nullable_string(&mut self, value: Option<&str>) -> Result<()> {
        match value {
            None => {
                self.put_i16(-1);
                Ok(())
            }

            Some(value) => self.put_string(value),
        }
    }

    /// An `i32` length followed by the bytes, with a length of -1 for none.
    pub fn put_bytes(&mut self, value: Option<&[u8]>) -> Result<()> {
        match value {
            None => {
                self.put_i32(-1);
                Ok(())
            }

            Some(value) => i32::try_from(value.len())
                .map(|length| {
                    self.put_i32(length);
                    self.put_raw(value);
                })
                .map_err(Into::into),
        }
    }

    pub fn put_varint(&mut self, value: i32) {
        varint::put_varint(&mut self.buf, value)
    }

    pub fn put_varlong(&mut self, value: i64) {
        varint::put_varlong(&mut self.buf, value)
    }

    /// A zigzag varint length followed by the bytes, with a length of -1 for none.
    pub fn put_varint_bytes(&mut self, value: Option<&[u8]>) -> Result<()> {
        match value {
            None => {
                self.put_varint(-1);
                Ok(())
            }

            Some(value) => i32::try_from(value.len())
                .map(|length| {
                    self.put_varint(length);
                    self.put_raw(value);
                })
                .map_err(Into::into),
        }
    }
}
