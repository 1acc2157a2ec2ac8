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

use crate::Result;

pub mod varint;

pub trait ByteSize {
    fn size_in_bytes(&self) -> Result<usize>;
}

impl ByteSize for Option<&[u8]> {
    /// As a varint length prefixed sequence of bytes.
    fn size_in_bytes(&self) -> Result<usize> {
        self.map_or_else(
            || varint::VarInt(-1).size_in_bytes(),
            |bytes| {
                varint::VarInt::try_from(bytes.len())
                    .and_then(|length| length.size_in_bytes())
                    .map(|length| length + bytes.len())
            },
        )
    }
}
