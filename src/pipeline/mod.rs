//! Azure Pipelines matrix generation
//!
//! Matrix keys become pipeline job names, so they are restricted to
//! identifier characters and made unique with a numeric suffix.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::config::Config;
use crate::config::pipeline::resolve_spn_for_subscription;
use crate::discovery::Subscription;

lazy_static! {
    static ref SUBSCRIPTION_KEY_CHARS: Regex = Regex::new(r"[-:]").expect("Invalid subscription key regex");
    static ref SPN_KEY_CHARS: Regex = Regex::new(r"[-./]").expect("Invalid SPN key regex");
}

/// One job per subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionJob {
    pub subscription_id: String,
    pub service_connection: String,
}

/// One job per service connection, covering every subscription it serves
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpnGroupJob {
    pub service_connection: String,
    pub subscriptions: Vec<String>,
}

/// Matrix entry produced by `discover`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredJob {
    pub subscription_id: String,
    pub subscription_name: String,
}

/// Insertion-ordered matrix with unique keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matrix<T> {
    entries: Vec<(String, T)>,
}

impl<T> Default for Matrix<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T: Serialize> Matrix<T> {
    /// Add an entry, suffixing `_1`, `_2`, ... when the key is taken
    pub fn insert(&mut self, key: String, value: T) {
        let mut unique = key.clone();
        let mut counter = 1;
        while self.entries.iter().any(|(k, _)| *k == unique) {
            unique = format!("{}_{}", key, counter);
            counter += 1;
        }
        self.entries.push((unique, value));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn to_value(&self) -> serde_json::Result<Value> {
        let mut map = Map::new();
        for (key, value) in &self.entries {
            map.insert(key.clone(), serde_json::to_value(value)?);
        }
        Ok(Value::Object(map))
    }

    /// Single-line JSON as the pipeline expects
    pub fn to_compact_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.to_value()?)
    }
}

/// Split a comma-separated id list, dropping blanks
pub fn parse_subscription_ids(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn subscription_key(subscription_id: &str) -> String {
    format!("Sub_{}", SUBSCRIPTION_KEY_CHARS.replace_all(subscription_id, "_"))
}

pub fn spn_key(service_connection: &str) -> String {
    let key = SPN_KEY_CHARS.replace_all(service_connection, "_").into_owned();
    match key.chars().next() {
        Some(c) if c.is_alphabetic() || c == '_' => key,
        _ => format!("SPN_{}", key),
    }
}

/// One matrix entry per subscription id with its resolved service connection
pub fn build_matrix(subscription_ids: &[String], config: &Config, default_spn: &str) -> Matrix<SubscriptionJob> {
    let mut matrix = Matrix::default();
    for id in subscription_ids.iter().map(|id| id.trim()).filter(|id| !id.is_empty()) {
        matrix.insert(
            subscription_key(id),
            SubscriptionJob {
                subscription_id: id.to_string(),
                service_connection: resolve_spn_for_subscription(id, config, default_spn),
            },
        );
    }
    matrix
}

/// Subscription reference read from a JSON file
///
/// Accepts the `{"id": ..}` list written by account listings and the
/// `{"subscription_id": ..}` entries of a `discover` matrix.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionRef {
    #[serde(default, alias = "subscription_id", alias = "subscriptionId")]
    pub id: String,
}

/// Read subscription ids from a JSON list or a `discover` matrix object
pub fn parse_subscription_refs(json: &str) -> serde_json::Result<Vec<String>> {
    let value: Value = serde_json::from_str(json)?;
    let refs: Vec<SubscriptionRef> = match value {
        Value::Object(map) => map
            .into_values()
            .map(serde_json::from_value)
            .collect::<Result<_, _>>()?,
        other => serde_json::from_value(other)?,
    };

    Ok(refs
        .into_iter()
        .map(|r| r.id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect())
}

/// Group subscriptions under the service connection each one resolves to
pub fn group_by_spn(subscription_ids: &[String], config: &Config, default_spn: &str) -> Matrix<SpnGroupJob> {
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();
    for id in subscription_ids {
        let spn = resolve_spn_for_subscription(id, config, default_spn);
        match groups.iter_mut().find(|(s, _)| *s == spn) {
            Some((_, ids)) => ids.push(id.clone()),
            None => groups.push((spn, vec![id.clone()])),
        }
    }

    let mut matrix = Matrix::default();
    for (spn, subscriptions) in groups {
        matrix.insert(
            spn_key(&spn),
            SpnGroupJob {
                service_connection: spn,
                subscriptions,
            },
        );
    }
    matrix
}

/// Matrix keyed by subscription id
pub fn discovered_matrix(subscriptions: &[Subscription]) -> BTreeMap<String, DiscoveredJob> {
    subscriptions
        .iter()
        .map(|s| {
            (
                s.id.clone(),
                DiscoveredJob {
                    subscription_id: s.id.clone(),
                    subscription_name: s.name.clone(),
                },
            )
        })
        .collect()
}
