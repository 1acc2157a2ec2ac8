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

use bytes::Bytes;

use crate::{Decode, Decoder, Encode, Encoder, Result, primitive::ByteSize};

/// A record header, a key and value pair of optional bytes.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Header {
    pub key: Option<Bytes>,
    pub value: Option<Bytes>,
}

impl Header {
    pub fn builder() -> Builder {
        Builder::default()
    }
}

impl ByteSize for Header {
    fn size_in_bytes(&self) -> Result<usize> {
        self.key
            .as_deref()
            .size_in_bytes()
            .and_then(|ksz| self.value.as_deref().size_in_bytes().map(|vsz| ksz + vsz))
    }
}

impl Encode for Header {
    fn encode(&self, encoder: &mut Encoder) -> Result<()> {
        encoder
            .put_varint_bytes(self.key.as_deref())
            .and(encoder.put_varint_bytes(self.value.as_deref()))
    }
}

impl Decode for Header {
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        let key = decoder.get_varint_bytes()?;
        let value = decoder.get_varint_bytes()?;
        Ok(Self { key, value })
    }
}

impl From<Builder> for Header {
    fn from(value: Builder) -> Self {
        value.build()
    }
}

#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Builder {
    key: Option<Bytes>,
    value: Option<Bytes>,
}

impl Builder {
    #[must_use]
    pub fn key(mut self, key: Bytes) -> Self {
        self.key = Some(key);
        self
    }

    #[must_use]
    pub fn value(mut self, value: Bytes) -> Self {
        self.value = Some(value);
        self
    }

    #[must_use]
    pub fn build(self) -> Header {
        Header {
            key: self.key,
            value: self.value,
        }
    }
}
