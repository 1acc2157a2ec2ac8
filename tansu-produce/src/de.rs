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

//! Decoding cursor
//!
//! A [`Decoder`] reads big-endian primitives from the front of its bytes. Reads never
//! go beyond the bytes available: a short read is an
//! [`Error::InsufficientData`](crate::Error::InsufficientData), never a panic.

use bytes::{Buf as _, Bytes, TryGetError};
use tracing::{debug, instrument};

use crate::{Error, Result, primitive::varint};

impl From<TryGetError> for Error {
    fn from(value: TryGetError) -> Self {
        Self::InsufficientData {
            requested: value.requested,
            available: value.available,
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Decoder {
    buf: Bytes,
}

impl From<Bytes> for Decoder {
    fn from(buf: Bytes) -> Self {
        Self { buf }
    }
}

impl From<&[u8]> for Decoder {
    fn from(value: &[u8]) -> Self {
        Self::new(Bytes::copy_from_slice(value))
    }
}

impl Decoder {
    pub fn new(buf: Bytes) -> Self {
        Self { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn ensure(&self, requested: usize) -> Result<()> {
        if requested > self.buf.len() {
            Err(Error::InsufficientData {
                requested,
                available: self.buf.len(),
            })
        } else {
            Ok(())
        }
    }

    pub fn get_i8(&mut self) -> Result<i8> {
        self.buf.try_get_i8().map_err(Into::into)
    }

    pub fn get_i16(&mut self) -> Result<i16> {
        self.buf.try_get_i16().map_err(Into::into)
    }

    pub fn get_i32(&mut self) -> Result<i32> {
        self.buf.try_get_i32().map_err(Into::into)
    }

    pub fn get_i64(&mut self) -> Result<i64> {
        self.buf.try_get_i64().map_err(Into::into)
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        self.buf.try_get_u32().map_err(Into::into)
    }

    /// The `i8` at `offset` from the current position, without consuming anything.
    pub fn peek_i8(&self, offset: usize) -> Result<i8> {
        self.ensure(offset + 1).map(|()| self.buf[offset] as i8)
    }

    /// The remaining bytes, without consuming them.
    pub fn peek_remaining(&self) -> &[u8] {
        &self.buf[..]
    }

    pub fn get_raw(&mut self, length: usize) -> Result<Bytes> {
        self.ensure(length).map(|()| self.buf.split_to(length))
    }

    /// A decoder over the next `length` bytes, which are consumed from this decoder.
    #[instrument(skip(self), fields(remaining = self.buf.len()))]
    pub fn subset(&mut self, length: usize) -> Result<Decoder> {
        self.get_raw(length).map(Decoder::new)
    }

    /// An `i32` element count. Each element occupies at least one byte, so a count
    /// larger than the remaining bytes is rejected up front.
    pub fn get_array_length(&mut self) -> Result<usize> {
        let length = self.get_i32()?;

        let length = usize::try_from(length).map_err(|_| Error::InvalidArrayLength(length))?;
        self.ensure(length).and(Ok(length))
    }

    pub fn get_string(&mut self) -> Result<String> {
        self.get_nullable_string()
            .and_then(|string| string.ok_or(Error::InvalidStringLength(-1)))
    }

    pub fn get_nullable_string(&mut self) -> Result<Option<String>> {
        match self.get_i16()? {
            -1 => Ok(None),

            length if length < -1 => Err(Error::InvalidStringLength(length)),

            length => usize::try_from(length)
                .map_err(Into::into)
                .and_then(|length| self.get_raw(length))
                .and_then(|raw| String::from_utf8(raw.to_vec()).map_err(Into::into))
                .map(Some)
                .inspect(|string| debug!(?string)),
        }
    }

    pub fn get_bytes(&mut self) -> Result<Option<Bytes>> {
        match self.get_i32()? {
            -1 => Ok(None),

            length if length < -1 => Err(Error::InvalidBytesLength(length)),

            length => usize::try_from(length)
                .map_err(Into::into)
                .and_then(|length| self.get_raw(length))
                .map(Some),
        }
    }

    pub fn get_varint(&mut self) -> Result<i32> {
        varint::get_varint(&mut self.buf)
    }

    pub fn get_varlong(&mut self) -> Result<i64> {
        varint::get_varlong(&mut self.buf)
    }

    pub fn get_varint_bytes(&mut self) -> Result<Option<Bytes>> {
        match self.get_varint()? {
            -1 => Ok(None),

            length if length < -1 => Err(Error::InvalidBytesLength(length)),

            length => usize::try_from(length)
                .map_err(Into::into)
                .and_then(|length| self.get_raw(length))
                .map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncated_i32() {
        let mut decoder = Decoder::from(&[0, 0, 1][..]);

        assert!(matches!(
            decoder.get_i32(),
            Err(Error::InsufficientData {
                requested: 4,
                available: 3
            })
        ));
    }

    #[test]
    fn subset_exceeds_remaining() {
        let mut decoder = Decoder::from(&[1, 2, 3][..]);

        assert!(matches!(
            decoder.subset(4),
            Err(Error::InsufficientData {
                requested: 4,
                available: 3
            })
        ));
    }

    #[test]
    fn subset_is_bounded() -> Result<()> {
        let mut decoder = Decoder::from(&[0, 1, 0, 2, 9][..]);
        let mut subset = decoder.subset(2)?;

        assert_eq!(1, subset.get_i16()?);
        assert!(subset.get_i8().is_err());

        assert_eq!(2, decoder.get_i16()?);
        assert_eq!(9, decoder.get_i8()?);
        assert!(decoder.is_empty());
        Ok(())
    }

    #[test]
    fn string_longer_than_remaining() {
        let mut decoder = Decoder::from(&[0, 5, 97, 98][..]);
        assert!(matches!(
            decoder.get_string(),
            Err(Error::InsufficientData { .. })
        ));
    }

    #[test]
    fn nullable_string() -> Result<()> {
        let mut decoder = Decoder::from(&[255, 255, 0, 2, 112, 113][..]);
        assert_eq!(None, decoder.get_nullable_string()?);
        assert_eq!(Some(String::from("pq")), decoder.get_nullable_string()?);
        Ok(())
    }

    #[test]
    fn negative_array_length() {
        let mut decoder = Decoder::from(&[255, 255, 255, 254][..]);
        assert!(matches!(
            decoder.get_array_length(),
            Err(Error::InvalidArrayLength(-2))
        ));
    }

    #[test]
    fn array_length_beyond_remaining() {
        let mut decoder = Decoder::from(&[0, 0, 1, 0, 1][..]);
        assert!(matches!(
            decoder.get_array_length(),
            Err(Error::InsufficientData { .. })
        ));
    }

    #[test]
    fn peek() -> Result<()> {
        let decoder = Decoder::from(&[1, 2, 3][..]);
        assert_eq!(3, decoder.peek_i8(2)?);
        assert!(decoder.peek_i8(3).is_err());
        assert_eq!(3, decoder.remaining());
        Ok(())
    }

    #[test]
    fn invalid_utf8() {
        let mut decoder = Decoder::from(&[0, 1, 255][..]);
        assert!(matches!(decoder.get_string(), Err(Error::Utf8(_))));
    }
}
