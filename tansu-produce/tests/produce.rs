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

use bytes::{BufMut as _, Bytes, BytesMut};
use common::{batch, init_tracing, message, wrapped};
use pretty_assertions::assert_eq;
use tansu_produce::{
    Ack, Compression, Error, ProduceRequest, Records, Result,
    record::{Record, message::MessageSet},
};

mod common;

fn legacy(version: i16) -> Result<ProduceRequest> {
    let magic = if version < 2 { 0 } else { 1 };

    let mut request = ProduceRequest::default()
        .version(version)
        .acks(Ack::WaitForLocal)
        .timeout_ms(5_000);

    request.add_message("alpha", 0, message(magic, "one"))?;
    request.add_message("alpha", 0, message(magic, "two"))?;
    request.add_message("alpha", 2, message(magic, "three"))?;
    request.add_set(
        "beta",
        1,
        MessageSet::from(vec![wrapped(Compression::Gzip, &["four", "five", "six"])?]),
    );

    Ok(request)
}

fn batched(version: i16) -> Result<ProduceRequest> {
    let mut request = ProduceRequest::default()
        .version(version)
        .acks(Ack::WaitForAll)
        .timeout_ms(1_500)
        .transactional_id(Some("txn".into()));

    request.add_batch("alpha", 0, batch(Compression::None, &["one", "two"])?);
    request.add_batch("alpha", 3, batch(Compression::Snappy, &["three"])?);
    request.add_batch("beta", 1, batch(Compression::Zstd, &["four", "five", "six"])?);
    request.add_record(
        "gamma",
        0,
        Record::builder()
            .value(Some(Bytes::from_static(b"seven")))
            .build(),
    )?;

    Ok(request)
}

#[test]
fn round_trip() -> Result<()> {
    let _guard = init_tracing()?;

    for version in [0, 1, 2] {
        let request = legacy(version)?;
        let decoded = ProduceRequest::from_bytes(request.to_bytes()?, version)?;
        assert_eq!(request, decoded);
    }

    for version in [3, 7] {
        let request = batched(version)?;
        let decoded = ProduceRequest::from_bytes(request.to_bytes()?, version)?;
        assert_eq!(request, decoded);
        assert_eq!(Some("txn"), decoded.transactional_id.as_deref());
    }

    Ok(())
}

#[test]
fn transactional_id_only_from_version_3() -> Result<()> {
    let _guard = init_tracing()?;

    let request = ProduceRequest::default()
        .acks(Ack::WaitForAll)
        .timeout_ms(1)
        .transactional_id(Some("abc".into()));

    let v2 = request.clone().version(2).to_bytes()?;
    assert_eq!(&[255, 255, 0, 0, 0, 1, 0, 0, 0, 0][..], &v2[..]);
    assert_eq!(
        None,
        ProduceRequest::from_bytes(v2, 2)?.transactional_id
    );

    let v3 = request.clone().version(3).to_bytes()?;
    assert_eq!(&[0, 3, 97, 98, 99][..], &v3[..5]);
    assert_eq!(
        Some("abc"),
        ProduceRequest::from_bytes(v3, 3)?.transactional_id.as_deref()
    );

    let unset = request.transactional_id(None).version(3).to_bytes()?;
    assert_eq!(&[255, 255][..], &unset[..2]);
    Ok(())
}

/// The bytes of a request with a single topic and partition, split into the
/// declared `record_len` and the container that follows.
fn single_partition(request: &ProduceRequest, topic: &str) -> Result<(Bytes, i32, Bytes)> {
    let encoded = request.to_bytes()?;

    // acks, timeout, topic count, topic, partition count, partition
    let offset = 2 + 4 + 4 + 2 + topic.len() + 4 + 4;

    let record_len = i32::from_be_bytes([
        encoded[offset],
        encoded[offset + 1],
        encoded[offset + 2],
        encoded[offset + 3],
    ]);

    Ok((encoded.clone(), record_len, encoded.slice(offset + 4..)))
}

#[test]
fn record_len_is_container_length() -> Result<()> {
    let _guard = init_tracing()?;

    let mut request = ProduceRequest::default().version(2);
    request.add_message("t", 5, message(1, "abc"))?;
    request.add_message("t", 5, message(1, "def"))?;

    let (_, record_len, container) = single_partition(&request, "t")?;
    assert_eq!(usize::try_from(record_len)?, container.len());

    let mut request = ProduceRequest::default().version(1);
    request.add_batch("t", 5, batch(Compression::Lz4, &["abc", "def"])?);

    let (_, record_len, container) = single_partition(&request, "t")?;
    assert_eq!(usize::try_from(record_len)?, container.len());

    Ok(())
}

#[test]
fn record_len_beyond_remaining() -> Result<()> {
    let _guard = init_tracing()?;

    let mut request = ProduceRequest::default().version(0);
    request.add_message("t", 0, message(0, "abc"))?;

    let (encoded, record_len, container) = single_partition(&request, "t")?;
    let header = encoded.len() - container.len() - 4;

    let mut corrupt = BytesMut::new();
    corrupt.put(&encoded[..header]);
    corrupt.put_i32(record_len + 1);
    corrupt.put(&container[..]);

    let error = ProduceRequest::from_bytes(corrupt.freeze(), 0).unwrap_err();
    assert!(error.is_malformed());
    assert!(matches!(error, Error::InsufficientData { .. }));
    Ok(())
}

#[test]
fn truncated() -> Result<()> {
    let _guard = init_tracing()?;

    let encoded = batched(3)?.to_bytes()?;

    for length in [0, 1, 3, 7, 20, encoded.len() / 2, encoded.len() - 1] {
        assert!(
            ProduceRequest::from_bytes(encoded.slice(..length), 3)
                .is_err_and(|error| error.is_malformed())
        );
    }

    Ok(())
}

#[test]
fn unknown_container() -> Result<()> {
    let _guard = init_tracing()?;

    let mut request = ProduceRequest::default().version(3);
    request.add_batch("t", 0, batch(Compression::None, &["abc"])?);

    let (encoded, _, container) = single_partition(&request, "t")?;
    let start = encoded.len() - container.len();

    let mut corrupt = BytesMut::from(&encoded[..]);
    corrupt[start + 16] = 9;

    assert!(matches!(
        ProduceRequest::from_bytes(corrupt.freeze(), 3),
        Err(Error::UnknownRecordsType(9))
    ));
    Ok(())
}

#[test]
fn empty_partition_decodes_as_legacy() -> Result<()> {
    let _guard = init_tracing()?;

    let mut request = ProduceRequest::default().version(0);
    request.add_set("t", 0, MessageSet::default());

    let decoded = ProduceRequest::from_bytes(request.to_bytes()?, 0)?;
    assert_eq!(Some(&Records::Legacy(MessageSet::default())), decoded.partition("t", 0));
    Ok(())
}
