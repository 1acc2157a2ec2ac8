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

//! OpenTelemetry export of produce request metrics.
//!
//! [`meter_provider`] installs an OTLP/HTTP exporter as the global meter provider,
//! and [`OtelMetrics`] records the metrics derived while encoding a
//! [`ProduceRequest`](tansu_produce::ProduceRequest) through it.

use std::{
    fmt::{self, Debug, Display, Formatter},
    sync::LazyLock,
};

use opentelemetry::{
    InstrumentationScope, KeyValue, global,
    metrics::{Counter, Histogram, Meter},
};
use opentelemetry_otlp::{ExporterBuildError, Protocol, WithExportConfig as _};
use opentelemetry_sdk::{Resource, metrics::SdkMeterProvider};
use opentelemetry_semantic_conventions::{
    SCHEMA_URL,
    resource::{SERVICE_NAME, SERVICE_VERSION},
};
use tansu_produce::metrics::{
    BATCH_SIZE, COMPRESSION_RATIO, Metrics, RECORD_SEND_RATE, RECORDS_PER_REQUEST,
};
use tracing::{debug, warn};
use url::{ParseError, Url};

pub(crate) static METER: LazyLock<Meter> = LazyLock::new(|| {
    global::meter_with_scope(
        InstrumentationScope::builder(env!("CARGO_PKG_NAME"))
            .with_version(env!("CARGO_PKG_VERSION"))
            .with_schema_url(SCHEMA_URL)
            .build(),
    )
});

#[derive(Debug, thiserror::Error)]
pub enum Error {
    ExporterBuild(#[from] ExporterBuildError),
    Parse(#[from] ParseError),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Export metrics to the OTLP collector at `otlp_endpoint_url`, installing the
/// provider globally.
pub fn meter_provider(
    otlp_endpoint_url: Url,
    service_name: impl Into<String>,
    service_version: impl Into<String>,
) -> Result<SdkMeterProvider> {
    let endpoint = otlp_endpoint_url.join("v1/metrics")?;
    debug!(%endpoint);

    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpBinary)
        .with_endpoint(endpoint.to_string())
        .build()?;

    let meter_provider = SdkMeterProvider::builder()
        .with_periodic_exporter(exporter)
        .with_resource(
            Resource::builder_empty()
                .with_attributes([
                    KeyValue::new(SERVICE_NAME, service_name.into()),
                    KeyValue::new(SERVICE_VERSION, service_version.into()),
                ])
                .build(),
        )
        .build();

    global::set_meter_provider(meter_provider.clone());

    Ok(meter_provider)
}

/// A metrics sink recording to OpenTelemetry instruments, with topic scoped updates
/// carrying a `topic` attribute.
#[derive(Clone)]
pub struct OtelMetrics {
    batch_size: Histogram<u64>,
    compression_ratio: Histogram<u64>,
    records_per_request: Histogram<u64>,
    record_send_rate: Counter<u64>,
}

impl Debug for OtelMetrics {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct(stringify!(OtelMetrics)).finish()
    }
}

impl Default for OtelMetrics {
    /// Instruments from the global meter provider.
    fn default() -> Self {
        Self::new(&METER)
    }
}

impl OtelMetrics {
    const TOPIC: &'static str = "topic";

    pub fn new(meter: &Meter) -> Self {
        Self {
            batch_size: meter
                .u64_histogram(BATCH_SIZE)
                .with_unit("By")
                .with_description("The bytes written for each partition of a produce request")
                .build(),

            compression_ratio: meter
                .u64_histogram(COMPRESSION_RATIO)
                .with_description("100 times the ratio of uncompressed to compressed bytes")
                .build(),

            records_per_request: meter
                .u64_histogram(RECORDS_PER_REQUEST)
                .with_description("The number of records in each produce request")
                .build(),

            record_send_rate: meter
                .u64_counter(RECORD_SEND_RATE)
                .with_description("The number of records sent")
                .build(),
        }
    }

    fn attributes(topic: Option<&str>) -> Vec<KeyValue> {
        topic
            .map(|topic| KeyValue::new(Self::TOPIC, topic.to_owned()))
            .into_iter()
            .collect()
    }
}

impl Metrics for OtelMetrics {
    fn histogram_update(&self, name: &str, topic: Option<&str>, value: i64) {
        let Ok(value) = u64::try_from(value) else {
            warn!(name, ?topic, value);
            return;
        };

        let histogram = match name {
            BATCH_SIZE => &self.batch_size,
            COMPRESSION_RATIO => &self.compression_ratio,
            RECORDS_PER_REQUEST => &self.records_per_request,

            otherwise => {
                warn!(unknown = otherwise, ?topic, value);
                return;
            }
        };

        histogram.record(value, &Self::attributes(topic));
    }

    fn meter_mark(&self, name: &str, topic: Option<&str>, count: i64) {
        let Ok(count) = u64::try_from(count) else {
            warn!(name, ?topic, count);
            return;
        };

        if name == RECORD_SEND_RATE {
            self.record_send_rate.add(count, &Self::attributes(topic));
        } else {
            warn!(unknown = name, ?topic, count);
        }
    }
}
