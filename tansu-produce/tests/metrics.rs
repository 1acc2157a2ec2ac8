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

use common::{batch, init_tracing, message, recorder, wrapped};
use pretty_assertions::assert_eq;
use tansu_produce::{
    Compression, ProduceRequest, Result,
    metrics::{
        BATCH_SIZE, COMPRESSION_RATIO, RECORD_SEND_RATE, RECORDS_PER_REQUEST, compression_ratio,
    },
};

mod common;

#[test]
fn wrapped_message_counts_nested_records() -> Result<()> {
    let _guard = init_tracing()?;

    let mut request = ProduceRequest::default().version(2);
    request.add_message("wrapped", 0, wrapped(Compression::Gzip, &["a", "b", "c"])?)?;
    request.add_message("plain", 0, message(1, "d"))?;
    request.add_message("plain", 0, message(1, "e"))?;

    let (recorder, metrics) = recorder();
    _ = request.to_bytes_with(metrics)?;

    assert_eq!(vec![3], recorder.histogram(RECORDS_PER_REQUEST, Some("wrapped")));
    assert_eq!(vec![2], recorder.histogram(RECORDS_PER_REQUEST, Some("plain")));
    assert_eq!(vec![5], recorder.histogram(RECORDS_PER_REQUEST, None));

    assert_eq!(vec![3], recorder.meter(RECORD_SEND_RATE, Some("wrapped")));
    assert_eq!(vec![2], recorder.meter(RECORD_SEND_RATE, Some("plain")));
    assert_eq!(vec![5], recorder.meter(RECORD_SEND_RATE, None));

    assert_eq!(1, recorder.histogram(COMPRESSION_RATIO, Some("wrapped")).len());
    assert!(recorder.histogram(COMPRESSION_RATIO, Some("plain")).is_empty());
    Ok(())
}

#[test]
fn nested_records_counted_after_decode() -> Result<()> {
    let _guard = init_tracing()?;

    let mut request = ProduceRequest::default().version(2);
    request.add_message("wrapped", 0, wrapped(Compression::Snappy, &["a", "b", "c"])?)?;

    let encoded = request.to_bytes()?;
    let decoded = ProduceRequest::from_bytes(encoded, 2)?;
    assert_eq!(request, decoded);

    let (recorder, metrics) = recorder();
    _ = decoded.to_bytes_with(metrics)?;

    assert_eq!(vec![3], recorder.histogram(RECORDS_PER_REQUEST, Some("wrapped")));
    assert_eq!(1, recorder.histogram(COMPRESSION_RATIO, Some("wrapped")).len());
    Ok(())
}

#[test]
fn batch_size_is_bytes_per_partition() -> Result<()> {
    let _guard = init_tracing()?;

    let mut request = ProduceRequest::default().version(3);
    request.add_batch("t", 0, batch(Compression::None, &["abc"])?);

    let (recorder, metrics) = recorder();
    let encoded = request.to_bytes_with(metrics)?;

    // transactional id, acks, timeout, topic count, topic, partition count
    let header = 2 + 2 + 4 + 4 + 2 + 1 + 4;
    let expected = i64::try_from(encoded.len() - header)?;

    assert_eq!(vec![expected], recorder.histogram(BATCH_SIZE, None));
    assert_eq!(vec![expected], recorder.histogram(BATCH_SIZE, Some("t")));
    Ok(())
}

#[test]
fn batch_compression_ratio() -> Result<()> {
    let _guard = init_tracing()?;

    let compressed = batch(Compression::Zstd, &["aaaaaaaaaaaaaaaa"; 32])?;
    let expected = compression_ratio(
        compressed.records_len(),
        compressed.compressed_records().map_or(0, |records| records.len()),
    );

    let mut request = ProduceRequest::default().version(3);
    request.add_batch("t", 0, compressed);
    request.add_batch("t", 1, batch(Compression::None, &["abc"])?);

    let (recorder, metrics) = recorder();
    _ = request.to_bytes_with(metrics)?;

    assert_eq!(
        expected.into_iter().collect::<Vec<_>>(),
        recorder.histogram(COMPRESSION_RATIO, Some("t"))
    );
    assert_eq!(vec![33], recorder.histogram(RECORDS_PER_REQUEST, Some("t")));
    assert_eq!(2, recorder.histogram(BATCH_SIZE, Some("t")).len());
    Ok(())
}

#[test]
fn no_records_no_rate() -> Result<()> {
    let _guard = init_tracing()?;

    let mut request = ProduceRequest::default().version(3);
    request.add_batch("t", 0, batch(Compression::None, &[])?);

    let (recorder, metrics) = recorder();
    _ = request.to_bytes_with(metrics)?;

    assert!(recorder.meter(RECORD_SEND_RATE, None).is_empty());
    assert!(recorder.histogram(RECORDS_PER_REQUEST, None).is_empty());
    assert_eq!(1, recorder.histogram(BATCH_SIZE, None).len());
    Ok(())
}

#[test]
fn ratio_arithmetic() {
    assert_eq!(Some(300), compression_ratio(300, 100));
}

#[test]
fn without_a_sink() -> Result<()> {
    let _guard = init_tracing()?;

    let mut request = ProduceRequest::default().version(2);
    request.add_message("t", 0, message(1, "a"))?;

    let (recorder, metrics) = recorder();
    let with = request.to_bytes_with(metrics)?;

    assert_eq!(request.to_bytes()?, with);
    assert!(!recorder.updates().is_empty());
    Ok(())
}
