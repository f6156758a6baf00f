//! FILENAME: pivot-dataset/src/collect.rs
//! Value Collector - Per-field domains for axis scales.
//!
//! For each field named in `collect_values_by`, records are grouped by the
//! values of the directive's `by` fields. Each group holds exactly one of:
//! - the distinct values of the field (default)
//! - the numeric range of the field (`range`)
//! - a Sum per secondary group (`sum_by`), collapsed into a `SumRange` by `finish`

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::aggregator::Aggregator;
use crate::definition::{CollectFieldKind, CollectValueBy};
use crate::value::{flat_key, DataValue, Record};

// ============================================================================
// TYPES
// ============================================================================

/// Numeric `[min, max]` interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    pub fn new(min: f64, max: f64) -> Self {
        ValueRange { min, max }
    }

    /// Identity for `include`: min = +inf, max = -inf.
    pub fn empty() -> Self {
        ValueRange {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    pub fn include(&mut self, value: f64) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }
}

impl Default for ValueRange {
    fn default() -> Self {
        ValueRange::empty()
    }
}

/// Range of grouped sums.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SumRange {
    pub max: f64,
    pub min: f64,
    #[serde(default)]
    pub positive_max: Option<f64>,
    #[serde(default)]
    pub negative_min: Option<f64>,
}

impl SumRange {
    pub fn as_range(&self) -> ValueRange {
        ValueRange::new(self.min, self.max)
    }
}

/// Collected state of one group of one field.
#[derive(Debug, Clone)]
pub enum CollectedValue {
    Values(Vec<DataValue>),
    Range(ValueRange),
    GroupedSums(FxHashMap<String, Aggregator>),
    SumRange(SumRange),
}

impl CollectedValue {
    /// The numeric range, if this value is one.
    pub fn range(&self) -> Option<ValueRange> {
        match self {
            CollectedValue::Range(range) => Some(*range),
            CollectedValue::SumRange(sums) => Some(sums.as_range()),
            _ => None,
        }
    }

    pub fn values(&self) -> Option<&[DataValue]> {
        match self {
            CollectedValue::Values(values) => Some(values),
            _ => None,
        }
    }
}

/// Group key -> collected value, for one field.
pub type FieldCollection = FxHashMap<String, CollectedValue>;

/// Field -> its groups.
pub type CollectedValues = FxHashMap<String, FieldCollection>;

// ============================================================================
// COLLECTION
// ============================================================================

fn group_key(record: &Record, fields: &[String]) -> String {
    let parts: Vec<String> = fields
        .iter()
        .map(|f| record.get(f).map(DataValue::to_key_string).unwrap_or_default())
        .collect();
    flat_key(&parts)
}

/// Folds one record into every configured collection.
pub fn collect_record(
    collected: &mut CollectedValues,
    directives: &FxHashMap<String, CollectValueBy>,
    record: &Record,
    split_positive_negative: bool,
) {
    for (field, directive) in directives {
        let value = match record.get(field) {
            Some(value) if value.is_present() => value,
            _ => continue,
        };

        let key = group_key(record, &directive.by);
        let groups = collected.entry(field.clone()).or_default();
        let entry = groups.entry(key).or_insert_with(|| {
            if directive.sum_by.is_some() {
                CollectedValue::GroupedSums(FxHashMap::default())
            } else if directive.range {
                CollectedValue::Range(ValueRange::empty())
            } else {
                CollectedValue::Values(Vec::new())
            }
        });

        match entry {
            CollectedValue::GroupedSums(sums) => {
                let sum_key = group_key(record, directive.sum_by.as_deref().unwrap_or_default());
                sums.entry(sum_key)
                    .or_insert_with(|| Aggregator::sum(field.clone(), split_positive_negative))
                    .push(record);
            }
            CollectedValue::Range(range) => {
                if let Some(n) = value.as_number() {
                    range.include(n);
                }
            }
            CollectedValue::Values(values) => {
                if !values.contains(value) {
                    values.push(value.clone());
                }
            }
            CollectedValue::SumRange(_) => {}
        }
    }
}

/// Post-ingestion passes: collapse grouped sums, then apply explicit orders.
pub fn finish(collected: &mut CollectedValues, directives: &FxHashMap<String, CollectValueBy>) {
    for (field, groups) in collected.iter_mut() {
        let Some(directive) = directives.get(field) else {
            continue;
        };

        if directive.sum_by.is_some() {
            for value in groups.values_mut() {
                if let CollectedValue::GroupedSums(sums) = value {
                    let range = collapse_sums(sums);
                    *value = CollectedValue::SumRange(range);
                }
            }
        }

        if let Some(order) = &directive.sort_by {
            for value in groups.values_mut() {
                if let CollectedValue::Values(values) = value {
                    sort_by_order(values, order);
                }
            }
        }
    }
}

fn collapse_sums(sums: &FxHashMap<String, Aggregator>) -> SumRange {
    let mut range = ValueRange::empty();
    for value in sums.values().filter_map(Aggregator::value) {
        range.include(value);
    }
    if range.is_empty() {
        range = ValueRange::new(0.0, 0.0);
    }

    let positive_max = sums
        .values()
        .filter_map(Aggregator::positive_value)
        .reduce(f64::max);
    let negative_min = sums
        .values()
        .filter_map(Aggregator::negative_value)
        .reduce(f64::min);

    SumRange {
        max: range.max,
        min: range.min,
        positive_max,
        negative_min,
    }
}

/// Reorders values by their position in `order`. Unlisted values rank as -1,
/// so they come first and keep their relative order.
pub fn sort_by_order(values: &mut [DataValue], order: &[String]) {
    let rank = |value: &DataValue| -> i64 {
        let key = value.to_key_string();
        order
            .iter()
            .position(|o| *o == key)
            .map_or(-1, |i| i as i64)
    };
    values.sort_by(|a, b| rank(a).cmp(&rank(b)));
}

/// Copies the chart-axis fields into a separate cache, reordered by
/// `dimension_sort_array` when given.
pub fn cache_dimension_values(
    collected: &CollectedValues,
    directives: &FxHashMap<String, CollectValueBy>,
    dimension_sort_array: Option<&[String]>,
) -> CollectedValues {
    let mut cache = CollectedValues::default();
    for (field, directive) in directives {
        if !matches!(
            directive.kind,
            Some(CollectFieldKind::XField) | Some(CollectFieldKind::YField)
        ) {
            continue;
        }
        let Some(groups) = collected.get(field) else {
            continue;
        };
        let mut groups = groups.clone();
        if let Some(order) = dimension_sort_array {
            for value in groups.values_mut() {
                if let CollectedValue::Values(values) = value {
                    sort_by_order(values, order);
                }
            }
        }
        cache.insert(field.clone(), groups);
    }
    cache
}
