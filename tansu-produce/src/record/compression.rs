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

use std::io::{Read as _, Write as _};

use bytes::{BufMut as _, Bytes, BytesMut};
use flate2::{read::MultiGzDecoder, write::GzEncoder};
use tracing::{debug, instrument};

use crate::{Error, Result};

const XERIAL_MAGIC: &[u8] = b"\x82SNAPPY\0";
const XERIAL_HEADER_LENGTH: usize = 16;

/// Kafka message compression types.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Snappy,
    Lz4,
    Zstd,
}

impl Compression {
    pub(crate) const BITMASK: i16 = 0b111;
}

impl TryFrom<i16> for Compression {
    type Error = Error;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value & Self::BITMASK {
            0 => Ok(Self::None),
            1 => Ok(Self::Gzip),
            2 => Ok(Self::Snappy),
            3 => Ok(Self::Lz4),
            4 => Ok(Self::Zstd),
            otherwise => Err(Error::UnknownCompressionType(otherwise)),
        }
    }
}

impl From<Compression> for i16 {
    fn from(value: Compression) -> Self {
        match value {
            Compression::None => 0,
            Compression::Gzip => 1,
            Compression::Snappy => 2,
            Compression::Lz4 => 3,
            Compression::Zstd => 4,
        }
    }
}

impl Compression {
    #[instrument(skip(raw), fields(len = raw.len()))]
    pub fn compress(&self, raw: &[u8]) -> Result<Bytes> {
        let compressed: Result<Bytes> = match self {
            Compression::None => Ok(Bytes::copy_from_slice(raw)),

            Compression::Gzip => {
                let mut gz =
                    GzEncoder::new(BytesMut::new().writer(), flate2::Compression::default());
                gz.write_all(raw)?;

                gz.finish()
                    .map(|w| w.into_inner().freeze())
                    .map_err(Into::into)
            }

            Compression::Snappy => snap::raw::Encoder::new()
                .compress_vec(raw)
                .map(Bytes::from)
                .map_err(Into::into),

            Compression::Lz4 => {
                let mut lz4 = lz4::EncoderBuilder::new().build(BytesMut::new().writer())?;
                lz4.write_all(raw)?;

                let (w, outcome) = lz4.finish();
                outcome.map(|()| w.into_inner().freeze()).map_err(Into::into)
            }

            Compression::Zstd => zstd::stream::encode_all(raw, 0)
                .map(Bytes::from)
                .map_err(Into::into),
        };

        compressed.inspect(|compressed| debug!(compressed = compressed.len()))
    }

    #[instrument(skip(compressed), fields(len = compressed.len()))]
    pub fn decompress(&self, compressed: &[u8]) -> Result<Bytes> {
        let mut inflated = Vec::new();

        match self {
            Compression::None => inflated.extend_from_slice(compressed),

            Compression::Gzip => {
                _ = MultiGzDecoder::new(compressed).read_to_end(&mut inflated)?;
            }

            Compression::Snappy => inflated = unsnappy(compressed)?,

            Compression::Lz4 => {
                _ = lz4::Decoder::new(compressed)?.read_to_end(&mut inflated)?;
            }

            Compression::Zstd => inflated = zstd::stream::decode_all(compressed)?,
        }

        debug!(inflated = inflated.len());
        Ok(Bytes::from(inflated))
    }
}

// https://github.com/xerial/snappy-java/tree/master?tab=readme-ov-file#compatibility-notes
fn unsnappy(compressed: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = snap::raw::Decoder::new();

    if !compressed.starts_with(XERIAL_MAGIC) {
        return decoder.decompress_vec(compressed).map_err(Into::into);
    }

    let mut remaining = compressed.get(XERIAL_HEADER_LENGTH..).ok_or(Error::InsufficientData {
        requested: XERIAL_HEADER_LENGTH,
        available: compressed.len(),
    })?;

    let mut inflated = Vec::new();

    while !remaining.is_empty() {
        let (length, chunk) = remaining.split_at_checked(size_of::<i32>()).ok_or(
            Error::InsufficientData {
                requested: size_of::<i32>(),
                available: remaining.len(),
            },
        )?;

        let length = length
            .try_into()
            .map(i32::from_be_bytes)
            .map_err(|_| Error::InvalidBytesLength(-1))
            .and_then(|length| {
                usize::try_from(length).map_err(|_| Error::InvalidBytesLength(length))
            })?;

        let (block, rest) = chunk.split_at_checked(length).ok_or(Error::InsufficientData {
            requested: length,
            available: chunk.len(),
        })?;

        inflated.extend(decoder.decompress_vec(block)?);
        remaining = rest;
    }

    Ok(inflated)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOREM: &[u8] = b"Lorem ipsum dolor sit amet, consectetur adipiscing elit, sed do \
    eiusmod tempor incididunt ut labore et dolore magna aliqua. Ut enim ad \
    minim veniam, quis nostrud exercitation ullamco laboris nisi ut \
    aliquip ex ea commodo consequat.";

    #[test]
    fn attributes() -> Result<()> {
        assert_eq!(Compression::None, Compression::try_from(0)?);
        assert_eq!(Compression::Lz4, Compression::try_from(0b1011)?);
        assert_eq!(4, i16::from(Compression::Zstd));
        assert!(matches!(
            Compression::try_from(5),
            Err(Error::UnknownCompressionType(5))
        ));
        Ok(())
    }

    #[test]
    fn inflate_deflate() -> Result<()> {
        for compression in [
            Compression::None,
            Compression::Gzip,
            Compression::Snappy,
            Compression::Lz4,
            Compression::Zstd,
        ] {
            let compressed = compression.compress(LOREM)?;
            assert_eq!(LOREM, &compression.decompress(&compressed)?[..]);
        }

        Ok(())
    }

    #[test]
    fn xerial_snappy() -> Result<()> {
        let block = snap::raw::Encoder::new().compress_vec(LOREM)?;

        let mut framed = Vec::from(XERIAL_MAGIC);
        framed.extend(1i32.to_be_bytes());
        framed.extend(1i32.to_be_bytes());
        framed.extend(i32::try_from(block.len())?.to_be_bytes());
        framed.extend(block);

        assert_eq!(LOREM, &Compression::Snappy.decompress(&framed)?[..]);
        Ok(())
    }
}
