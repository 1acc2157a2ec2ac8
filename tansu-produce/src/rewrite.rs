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

//! Relocating records between topics.
//!
//! A [`TopicRule`] decides which client topics have rewrite rules, and a
//! [`ClientTopicRule`] decides whether a record's key and value match, and the
//! topic a match is relocated to. [`rule::RuleSet`] is a serde configured
//! implementation of both.

pub mod rule;

use tracing::{debug, instrument};

use crate::{Error, ProduceRequest, Result};

/// The rules of a single client topic.
pub trait ClientTopicRule {
    /// The key of the rule matching this key and value, if any.
    fn matches(&self, key: Option<&[u8]>, value: Option<&[u8]>) -> Option<String>;

    /// The topic records matching `rule_key` are relocated to.
    fn destination_topic(&self, rule_key: &str) -> String;
}

pub trait TopicRule {
    type Rule: ClientTopicRule;

    fn has_active_rule(&self, topic: &str) -> bool;

    fn rule_for(&self, topic: &str) -> Option<&Self::Rule>;

    /// The client topic whose rules relocate records to `broker_topic`.
    fn client_topic_for(&self, broker_topic: &str) -> Option<&str> {
        _ = broker_topic;
        None
    }
}

/// A record moved by [`ProduceRequest::rewrite`].
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Relocation {
    pub source: String,
    pub partition: i32,

    /// The position of the record in the source partition before it was removed.
    pub index: usize,

    pub rule_key: String,
    pub destination: String,
}

impl ProduceRequest {
    /// Relocate the first record matching `rules` into its destination topic,
    /// keeping the partition.
    ///
    /// A source partition left empty is removed, as is a source topic left without
    /// partitions. A missing destination partition is created empty, in the same
    /// format as the source. Only the first match is relocated.
    #[instrument(skip_all)]
    pub fn rewrite<R>(&mut self, rules: &R) -> Result<Option<Relocation>>
    where
        R: TopicRule,
    {
        let Some(relocation) = self.first_match(rules) else {
            return Ok(None);
        };

        debug!(?relocation);

        self.relocate(&relocation).and(Ok(Some(relocation)))
    }

    fn first_match<R>(&self, rules: &R) -> Option<Relocation>
    where
        R: TopicRule,
    {
        self.records
            .iter()
            .flatten()
            .filter(|(topic, _)| rules.has_active_rule(topic))
            .find_map(|(topic, partitions)| {
                let rule = rules.rule_for(topic)?;

                partitions.iter().find_map(|(partition, records)| {
                    records
                        .key_values()
                        .into_iter()
                        .enumerate()
                        .find_map(|(index, (key, value))| {
                            rule.matches(key, value).map(|rule_key| Relocation {
                                source: topic.clone(),
                                partition: *partition,
                                index,
                                destination: rule.destination_topic(&rule_key),
                                rule_key,
                            })
                        })
                })
            })
    }

    fn relocate(&mut self, relocation: &Relocation) -> Result<()> {
        let Some(topics) = self.records.as_mut() else {
            return Ok(());
        };

        let mixed = || Error::MixedRecords {
            topic: relocation.destination.clone(),
            partition: relocation.partition,
        };

        let Some(source) = topics
            .get(&relocation.source)
            .and_then(|partitions| partitions.get(&relocation.partition))
        else {
            return Ok(());
        };

        let template = source.empty_like()?;

        if topics
            .get(&relocation.destination)
            .and_then(|partitions| partitions.get(&relocation.partition))
            .is_some_and(|existing| existing.is_legacy() != template.is_legacy())
        {
            return Err(mixed());
        }

        let Some(entry) = topics
            .get_mut(&relocation.source)
            .and_then(|partitions| partitions.get_mut(&relocation.partition))
            .map(|source| source.remove(relocation.index))
            .transpose()?
            .flatten()
        else {
            return Ok(());
        };

        if let Some(partitions) = topics.get_mut(&relocation.source) {
            if partitions
                .get(&relocation.partition)
                .is_some_and(|records| records.is_empty())
            {
                _ = partitions.remove(&relocation.partition);
            }

            if partitions.is_empty() {
                _ = topics.remove(&relocation.source);
            }
        }

        topics
            .entry(relocation.destination.clone())
            .or_default()
            .entry(relocation.partition)
            .or_insert(template)
            .push(entry)?
            .map_err(|_| mixed())
    }
}
