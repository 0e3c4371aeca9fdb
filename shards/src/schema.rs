use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The storage type a CSV column is coerced to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    F32,
    U16,
    U8,
    Text,
    /// Resolved at parse time: `F64` if every present value is numeric, `Text` otherwise.
    Inferred,
}

/// A fixed column-to-type mapping used when parsing raw shards.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    types: HashMap<String, ColumnType>,
}

impl Schema {
    /// Creates a new `Schema`.
    ///
    /// # Arguments
    /// * `types` - Pairs of column name and the type it must be coerced to.
    ///
    /// # Returns
    /// A new `Schema` instance.
    pub fn new<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = (S, ColumnType)>,
        S: Into<String>,
    {
        Self {
            types: types.into_iter().map(|(n, t)| (n.into(), t)).collect(),
        }
    }

    /// The schema of the click log shards.
    pub fn click_log() -> Self {
        use ColumnType::*;

        Self::new([
            ("click_id", F32),
            ("ip", F32),
            ("app", F32),
            ("device", F32),
            ("os", F32),
            ("channel", F32),
            ("click_time", Text),
            ("attributed_time", Text),
            ("is_attributed", F32),
            ("timediff", F32),
            ("year", U16),
            ("month", U8),
            ("day", U8),
            ("dayofweek", U16),
            ("hour", U16),
            ("avg_ip", U16),
            ("sum_attr", U16),
            ("last_attr", F32),
            ("avg_app", F32),
            ("avg_device", F32),
            ("avg_os", F32),
            ("avg_channel", F32),
            ("avg_day", F32),
            ("avg_hour", F32),
        ])
    }

    /// Returns the type a column must be coerced to, `Inferred` for unlisted columns.
    pub fn column_type(&self, name: &str) -> ColumnType {
        self.types
            .get(name)
            .copied()
            .unwrap_or(ColumnType::Inferred)
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::click_log()
    }
}

/// Which table columns make up a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureSpec {
    pub label: String,
    pub dense: Vec<String>,
    pub categorical: Vec<String>,
}

impl Default for FeatureSpec {
    fn default() -> Self {
        let names = |cols: &[&str]| cols.iter().map(|c| c.to_string()).collect();

        Self {
            label: "is_attributed".into(),
            dense: names(&[
                "timediff",
                "avg_ip",
                "sum_attr",
                "last_attr",
                "avg_app",
                "avg_device",
                "avg_os",
                "avg_channel",
                "avg_day",
                "avg_hour",
            ]),
            categorical: names(&["app", "device", "os", "channel", "hour", "dayofweek"]),
        }
    }
}
