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

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tansu_produce::{
    Compression, Error, Result,
    metrics::Metrics,
    record::{
        Record,
        batch::RecordBatch,
        message::{Message, MessageSet},
    },
};
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::EnvFilter;

pub(crate) fn init_tracing() -> Result<DefaultGuard> {
    let directive = format!("{}=debug", env!("CARGO_PKG_NAME").replace("-", "_"))
        .parse()
        .map_err(|error: tracing_subscriber::filter::ParseError| {
            Error::Message(error.to_string())
        })?;

    Ok(tracing::subscriber::set_default(
        tracing_subscriber::fmt()
            .with_level(true)
            .with_line_number(true)
            .with_thread_names(false)
            .with_target(true)
            .with_env_filter(EnvFilter::from_default_env().add_directive(directive))
            .with_test_writer()
            .finish(),
    ))
}

/// A metric update captured by [`Recorder`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum Update {
    Histogram {
        name: String,
        topic: Option<String>,
        value: i64,
    },
    Meter {
        name: String,
        topic: Option<String>,
        count: i64,
    },
}

/// A metrics sink recording every update it is given.
#[derive(Debug, Default)]
pub(crate) struct Recorder(Mutex<Vec<Update>>);

impl Recorder {
    pub(crate) fn updates(&self) -> Vec<Update> {
        self.0.lock().map(|updates| updates.clone()).unwrap_or_default()
    }

    pub(crate) fn histogram(&self, name: &str, topic: Option<&str>) -> Vec<i64> {
        self.updates()
            .into_iter()
            .filter_map(|update| match update {
                Update::Histogram {
                    name: n,
                    topic: t,
                    value,
                } if n == name && t.as_deref() == topic => Some(value),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn meter(&self, name: &str, topic: Option<&str>) -> Vec<i64> {
        self.updates()
            .into_iter()
            .filter_map(|update| match update {
                Update::Meter {
                    name: n,
                    topic: t,
                    count,
                } if n == name && t.as_deref() == topic => Some(count),
                _ => None,
            })
            .collect()
    }
}

impl Metrics for Recorder {
    fn histogram_update(&self, name: &str, topic: Option<&str>, value: i64) {
        if let Ok(mut updates) = self.0.lock() {
            updates.push(Update::Histogram {
                name: name.to_owned(),
                topic: topic.map(ToOwned::to_owned),
                value,
            });
        }
    }

    fn meter_mark(&self, name: &str, topic: Option<&str>, count: i64) {
        if let Ok(mut updates) = self.0.lock() {
            updates.push(Update::Meter {
                name: name.to_owned(),
                topic: topic.map(ToOwned::to_owned),
                count,
            });
        }
    }
}

pub(crate) fn recorder() -> (Arc<Recorder>, Arc<dyn Metrics>) {
    let recorder = Arc::new(Recorder::default());
    let metrics = recorder.clone() as Arc<dyn Metrics>;
    (recorder, metrics)
}

pub(crate) fn message(magic: i8, value: &'static str) -> Message {
    Message::new(None, Some(Bytes::from_static(value.as_bytes())))
        .magic(magic)
        .timestamp(if magic == 0 { -1 } else { 1_707_058_170_165 })
}

pub(crate) fn wrapped(codec: Compression, values: &[&'static str]) -> Result<Message> {
    Message::wrap(
        codec,
        MessageSet::from(
            values
                .iter()
                .copied()
                .map(|value| message(1, value))
                .collect::<Vec<_>>(),
        ),
    )
}

pub(crate) fn batch(compression: Compression, values: &[&'static str]) -> Result<RecordBatch> {
    values
        .iter()
        .copied()
        .fold(
            RecordBatch::builder()
                .compression(compression)
                .first_timestamp(1_707_058_170_165),
            |builder, value| {
                builder.record(
                    Record::builder()
                        .key(Some(Bytes::from_static(b"key")))
                        .value(Some(Bytes::from_static(value.as_bytes()))),
                )
            },
        )
        .build()
}
