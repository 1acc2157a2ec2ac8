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

//! Zigzag variable length integers, as used by protobuf.

use super::ByteSize;
use crate::{Error, Result};
use bytes::{Buf, BufMut};
use std::ops::Deref;
use tracing::instrument;

const CONTINUATION: u8 = 0b1000_0000;
const MASK: u8 = 0b0111_1111;

#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct VarInt(pub i32);

impl From<VarInt> for i32 {
    fn from(value: VarInt) -> Self {
        value.0
    }
}

impl From<i32> for VarInt {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl TryFrom<usize> for VarInt {
    type Error = Error;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        i32::try_from(value).map(Self).map_err(Into::into)
    }
}

impl Deref for VarInt {
    type Target = i32;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl VarInt {
    #[allow(clippy::cast_sign_loss)]
    fn en_zigzag(decoded: i32) -> u32 {
        ((decoded << 1) ^ (decoded >> 31)) as u32
    }

    #[allow(clippy::cast_possible_wrap)]
    fn de_zigzag(encoded: u32) -> i32 {
        ((encoded >> 1) as i32) ^ -((encoded & 1) as i32)
    }
}

impl ByteSize for VarInt {
    fn size_in_bytes(&self) -> Result<usize> {
        Ok(unsigned_size(u64::from(Self::en_zigzag(self.0))))
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct LongVarInt(pub i64);

impl From<LongVarInt> for i64 {
    fn from(value: LongVarInt) -> Self {
        value.0
    }
}

impl From<i64> for LongVarInt {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl Deref for LongVarInt {
    type Target = i64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl LongVarInt {
    #[allow(clippy::cast_sign_loss)]
    fn en_zigzag(decoded: i64) -> u64 {
        ((decoded << 1) ^ (decoded >> 63)) as u64
    }

    #[allow(clippy::cast_possible_wrap)]
    fn de_zigzag(encoded: u64) -> i64 {
        ((encoded >> 1) as i64) ^ -((encoded & 1) as i64)
    }
}

impl ByteSize for LongVarInt {
    fn size_in_bytes(&self) -> Result<usize> {
        Ok(unsigned_size(Self::en_zigzag(self.0)))
    }
}

fn unsigned_size(mut v: u64) -> usize {
    let mut bytes = 1;
    while v >= u64::from(CONTINUATION) {
        v >>= 7;
        bytes += 1;
    }
    bytes
}

fn put_unsigned(buf: &mut impl BufMut, mut v: u64) {
    while v >= u64::from(CONTINUATION) {
        #[allow(clippy::cast_possible_truncation)]
        buf.put_u8(v as u8 | CONTINUATION);
        v >>= 7;
    }

    #[allow(clippy::cast_possible_truncation)]
    buf.put_u8(v as u8);
}

fn get_unsigned(buf: &mut impl Buf, max_bits: u8) -> Result<u64> {
    let mut shift = 0u8;
    let mut accumulator = 0u64;

    loop {
        if !buf.has_remaining() {
            return Err(Error::InsufficientData {
                requested: 1,
                available: 0,
            });
        }

        if shift >= max_bits {
            return Err(Error::VarIntOverflow);
        }

        let byte = buf.get_u8();
        accumulator |= u64::from(byte & MASK) << shift;

        if byte & CONTINUATION == CONTINUATION {
            shift += 7;
        } else {
            return Ok(accumulator);
        }
    }
}

pub(crate) fn put_varint(buf: &mut impl BufMut, value: i32) {
    put_unsigned(buf, u64::from(VarInt::en_zigzag(value)))
}

pub(crate) fn put_varlong(buf: &mut impl BufMut, value: i64) {
    put_unsigned(buf, LongVarInt::en_zigzag(value))
}

#[instrument(skip_all, ret)]
pub(crate) fn get_varint(buf: &mut impl Buf) -> Result<i32> {
    get_unsigned(buf, 32)
        .and_then(|unsigned| u32::try_from(unsigned).map_err(|_| Error::VarIntOverflow))
        .map(VarInt::de_zigzag)
}

#[instrument(skip_all, ret)]
pub(crate) fn get_varlong(buf: &mut impl Buf) -> Result<i64> {
    get_unsigned(buf, 64).map(LongVarInt::de_zigzag)
}
