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

//! A rule set configured with JSON.
//!
//! ```
//! # use tansu_produce::Error;
//! # fn main() -> Result<(), Error> {
//! use tansu_produce::rewrite::{ClientTopicRule, TopicRule, rule::RuleSet};
//!
//! let rules = RuleSet::from_json(
//!     r#"{
//!         "topics": {
//!             "orders": {
//!                 "rules": [
//!                     {
//!                         "key": "k1",
//!                         "field": "value",
//!                         "pattern": "^test-",
//!                         "destination": "orders_v2"
//!                     }
//!                 ]
//!             }
//!         }
//!     }"#,
//! )?;
//!
//! assert!(rules.has_active_rule("orders"));
//!
//! let orders = rules.rule_for("orders").expect("orders");
//! assert_eq!(Some("k1".into()), orders.matches(None, Some(&b"test-123"[..])));
//! assert_eq!("orders_v2", orders.destination_topic("k1"));
//! assert_eq!(Some("orders"), rules.client_topic_for("orders_v2"));
//! # Ok(())
//! # }
//! ```

use std::{collections::BTreeMap, str::FromStr};

use regex::bytes::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    Result,
    rewrite::{ClientTopicRule, TopicRule},
};

/// The part of a record a rule inspects.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Key,
    #[default]
    Value,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Rule {
    pub key: String,

    #[serde(default)]
    pub field: Field,

    #[serde(with = "pattern")]
    pub pattern: Regex,

    pub destination: String,
}

impl Rule {
    pub fn new(key: &str, field: Field, pattern: &str, destination: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(|pattern| Self {
                key: key.to_owned(),
                field,
                pattern,
                destination: destination.to_owned(),
            })
            .map_err(Into::into)
    }

    fn is_match(&self, key: Option<&[u8]>, value: Option<&[u8]>) -> bool {
        match self.field {
            Field::Key => key,
            Field::Value => value,
        }
        .is_some_and(|haystack| self.pattern.is_match(haystack))
    }
}

/// The rules of one client topic, tried in order.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TopicRules {
    #[serde(default = "enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl Default for TopicRules {
    fn default() -> Self {
        Self {
            enabled: enabled(),
            rules: Vec::new(),
        }
    }
}

fn enabled() -> bool {
    true
}

impl TopicRules {
    #[must_use]
    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }
}

impl ClientTopicRule for TopicRules {
    fn matches(&self, key: Option<&[u8]>, value: Option<&[u8]>) -> Option<String> {
        self.rules
            .iter()
            .find(|rule| rule.is_match(key, value))
            .map(|rule| rule.key.clone())
    }

    /// Unknown rule keys are used as the topic name.
    fn destination_topic(&self, rule_key: &str) -> String {
        self.rules
            .iter()
            .find(|rule| rule.key == rule_key)
            .map_or(rule_key, |rule| rule.destination.as_str())
            .to_owned()
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct RuleSet {
    #[serde(default)]
    pub topics: BTreeMap<String, TopicRules>,
}

impl RuleSet {
    pub fn from_json(json: &str) -> Result<Self> {
        let rule_set: Self = serde_json::from_str(json)?;
        debug!(topics = ?rule_set.topics.keys().collect::<Vec<_>>());
        Ok(rule_set)
    }

    #[must_use]
    pub fn topic(mut self, topic: &str, rules: TopicRules) -> Self {
        _ = self.topics.insert(topic.to_owned(), rules);
        self
    }
}

impl FromStr for RuleSet {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_json(s)
    }
}

impl TopicRule for RuleSet {
    type Rule = TopicRules;

    fn has_active_rule(&self, topic: &str) -> bool {
        self.topics
            .get(topic)
            .is_some_and(|rules| rules.enabled && !rules.rules.is_empty())
    }

    fn rule_for(&self, topic: &str) -> Option<&Self::Rule> {
        self.topics.get(topic)
    }

    fn client_topic_for(&self, broker_topic: &str) -> Option<&str> {
        self.topics
            .iter()
            .find(|(_, rules)| {
                rules
                    .rules
                    .iter()
                    .any(|rule| rule.destination == broker_topic)
            })
            .map(|(topic, _)| topic.as_str())
    }
}

mod pattern {
    use regex::bytes::Regex;
    use serde::{Deserialize as _, Deserializer, Serializer, de};

    pub(super) fn serialize<S>(pattern: &Regex, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(pattern.as_str())
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Regex, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer)
            .and_then(|pattern| Regex::new(&pattern).map_err(de::Error::custom))
    }
}
