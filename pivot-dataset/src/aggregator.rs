//! FILENAME: pivot-dataset/src/aggregator.rs
//! Aggregators - Stateful accumulators stored in cube cells.
//!
//! Every aggregator shares one contract: `push` folds in a record, another
//! aggregator of the same kind, or a bare number; `value` reads the result
//! (`None` while empty); `reset` clears the state in place.
//!
//! Built-in kinds are a closed enum. Externally defined kinds implement
//! `CustomAggregate` and are constructed through an `AggregatorRegistry`.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, OnceLock};

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::definition::{AggregationType, IndicatorAggregation, ValueFormatter};
use crate::value::{format_number, Record};

// ============================================================================
// INPUT
// ============================================================================

/// What can be pushed into an aggregator.
#[derive(Debug, Clone, Copy)]
pub enum AggregateInput<'a> {
    Record(&'a Record),
    Aggregator(&'a Aggregator),
    Value(f64),
}

impl<'a> From<&'a Record> for AggregateInput<'a> {
    fn from(record: &'a Record) -> Self {
        AggregateInput::Record(record)
    }
}

impl<'a> From<&'a Aggregator> for AggregateInput<'a> {
    fn from(aggregator: &'a Aggregator) -> Self {
        AggregateInput::Aggregator(aggregator)
    }
}

impl From<f64> for AggregateInput<'_> {
    fn from(value: f64) -> Self {
        AggregateInput::Value(value)
    }
}

// ============================================================================
// CUSTOM AGGREGATES
// ============================================================================

/// An externally defined aggregation kind.
pub trait CustomAggregate: Send + Sync {
    fn push_value(&mut self, value: f64);

    /// Merges a partial result of the same kind.
    fn merge(&mut self, other: &dyn CustomAggregate);

    fn value(&self) -> Option<f64>;

    fn reset(&mut self);

    fn as_any(&self) -> &dyn Any;

    fn box_clone(&self) -> Box<dyn CustomAggregate>;

    /// Folds a record. Defaults to the first numeric field.
    fn push_record(&mut self, record: &Record, fields: &[String]) {
        if let Some(value) = first_number(record, fields) {
            self.push_value(value);
        }
    }
}

impl Clone for Box<dyn CustomAggregate> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

pub type AggregateFactory = Arc<dyn Fn() -> Box<dyn CustomAggregate> + Send + Sync>;

/// Factory table for custom aggregation kinds.
#[derive(Clone, Default)]
pub struct AggregatorRegistry {
    factories: FxHashMap<String, AggregateFactory>,
}

impl fmt::Debug for AggregatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}

impl AggregatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: impl Fn() -> Box<dyn CustomAggregate> + Send + Sync + 'static,
    ) -> &mut Self {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Constructs the aggregator for one indicator of one cell.
    pub fn create(&self, aggregation: &IndicatorAggregation) -> Aggregator {
        let fields = aggregation.fields.clone();
        let state = match &aggregation.aggregation_type {
            AggregationType::Sum => AggregatorState::sum(aggregation.split_positive_negative),
            AggregationType::Count => AggregatorState::Count(0),
            AggregationType::Avg => AggregatorState::Avg { sum: 0.0, count: 0 },
            AggregationType::Max => AggregatorState::Max(None),
            AggregationType::Min => AggregatorState::Min(None),
            AggregationType::Record => AggregatorState::Record(Vec::new()),
            AggregationType::Custom(name) => match self.factories.get(name) {
                Some(factory) => AggregatorState::Custom {
                    name: name.clone(),
                    inner: factory(),
                },
                None => {
                    log::warn!(
                        target: "PIVOT",
                        "unknown aggregator '{}', falling back to sum",
                        name
                    );
                    AggregatorState::sum(false)
                }
            },
        };
        Aggregator {
            fields,
            formatter: aggregation.formatter.clone(),
            state,
        }
    }
}

// ============================================================================
// AGGREGATOR
// ============================================================================

#[derive(Debug, Clone)]
enum AggregatorState {
    Sum {
        sum: f64,
        positive: f64,
        negative: f64,
        has_value: bool,
        split: bool,
    },
    Count(u64),
    Avg {
        sum: f64,
        count: u64,
    },
    Max(Option<f64>),
    Min(Option<f64>),
    Record(Vec<Record>),
    Custom {
        name: String,
        inner: Box<dyn CustomAggregate>,
    },
    Noop,
}

impl AggregatorState {
    fn sum(split: bool) -> Self {
        AggregatorState::Sum {
            sum: 0.0,
            positive: 0.0,
            negative: 0.0,
            has_value: false,
            split,
        }
    }
}

impl fmt::Debug for dyn CustomAggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CustomAggregate({:?})", self.value())
    }
}

/// One accumulator of a cube cell.
#[derive(Debug, Clone)]
pub struct Aggregator {
    fields: SmallVec<[String; 2]>,
    formatter: Option<ValueFormatter>,
    state: AggregatorState,
}

static NOOP: OnceLock<Aggregator> = OnceLock::new();

/// The shared inert aggregator returned for missing cells.
pub fn noop() -> &'static Aggregator {
    NOOP.get_or_init(|| Aggregator {
        fields: SmallVec::new(),
        formatter: None,
        state: AggregatorState::Noop,
    })
}

fn first_number(record: &Record, fields: &[String]) -> Option<f64> {
    fields
        .iter()
        .find_map(|field| record.get(field).and_then(|v| v.as_number()))
}

impl Aggregator {
    /// A Sum over `field`, optionally tracking positive and negative parts.
    pub fn sum(field: impl Into<String>, split_positive_negative: bool) -> Self {
        Aggregator {
            fields: SmallVec::from_elem(field.into(), 1),
            formatter: None,
            state: AggregatorState::sum(split_positive_negative),
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn is_noop(&self) -> bool {
        matches!(self.state, AggregatorState::Noop)
    }

    /// Name of the aggregation kind.
    pub fn kind(&self) -> &str {
        match &self.state {
            AggregatorState::Sum { .. } => "sum",
            AggregatorState::Count(_) => "count",
            AggregatorState::Avg { .. } => "avg",
            AggregatorState::Max(_) => "max",
            AggregatorState::Min(_) => "min",
            AggregatorState::Record(_) => "record",
            AggregatorState::Custom { name, .. } => name,
            AggregatorState::Noop => "noop",
        }
    }

    pub fn push<'a>(&mut self, input: impl Into<AggregateInput<'a>>) {
        match input.into() {
            AggregateInput::Record(record) => self.push_record(record),
            AggregateInput::Aggregator(other) => self.merge(other),
            AggregateInput::Value(value) => self.push_value(value),
        }
    }

    fn push_record(&mut self, record: &Record) {
        if let AggregatorState::Record(records) = &mut self.state {
            records.push(record.clone());
            return;
        }
        if let AggregatorState::Count(count) = &mut self.state {
            *count += 1;
            return;
        }
        if let AggregatorState::Custom { inner, .. } = &mut self.state {
            inner.push_record(record, &self.fields);
            return;
        }
        if let Some(value) = first_number(record, &self.fields) {
            self.push_value(value);
        }
    }

    fn push_value(&mut self, value: f64) {
        if value.is_nan() {
            return;
        }
        match &mut self.state {
            AggregatorState::Sum {
                sum,
                positive,
                negative,
                has_value,
                split,
            } => {
                *sum += value;
                *has_value = true;
                if *split {
                    if value >= 0.0 {
                        *positive += value;
                    } else {
                        *negative += value;
                    }
                }
            }
            AggregatorState::Count(count) => *count += 1,
            AggregatorState::Avg { sum, count } => {
                *sum += value;
                *count += 1;
            }
            AggregatorState::Max(max) => *max = Some(max.map_or(value, |m| m.max(value))),
            AggregatorState::Min(min) => *min = Some(min.map_or(value, |m| m.min(value))),
            AggregatorState::Custom { inner, .. } => inner.push_value(value),
            AggregatorState::Record(_) | AggregatorState::Noop => {}
        }
    }

    /// Folds a partial aggregate of the same kind. Mismatched kinds are ignored.
    fn merge(&mut self, other: &Aggregator) {
        match (&mut self.state, &other.state) {
            (
                AggregatorState::Sum {
                    sum,
                    positive,
                    negative,
                    has_value,
                    ..
                },
                AggregatorState::Sum {
                    sum: other_sum,
                    positive: other_positive,
                    negative: other_negative,
                    has_value: other_has_value,
                    ..
                },
            ) => {
                if *other_has_value {
                    *sum += other_sum;
                    *positive += other_positive;
                    *negative += other_negative;
                    *has_value = true;
                }
            }
            (AggregatorState::Count(count), AggregatorState::Count(other_count)) => {
                *count += other_count;
            }
            (
                AggregatorState::Avg { sum, count },
                AggregatorState::Avg {
                    sum: other_sum,
                    count: other_count,
                },
            ) => {
                *sum += other_sum;
                *count += other_count;
            }
            (AggregatorState::Max(max), AggregatorState::Max(Some(other_max))) => {
                *max = Some(max.map_or(*other_max, |m| m.max(*other_max)));
            }
            (AggregatorState::Min(min), AggregatorState::Min(Some(other_min))) => {
                *min = Some(min.map_or(*other_min, |m| m.min(*other_min)));
            }
            (AggregatorState::Record(records), AggregatorState::Record(other_records)) => {
                records.extend(other_records.iter().cloned());
            }
            (
                AggregatorState::Custom { name, inner },
                AggregatorState::Custom {
                    name: other_name,
                    inner: other_inner,
                },
            ) if name == other_name => inner.merge(other_inner.as_ref()),
            _ => {}
        }
    }

    /// The aggregate, or `None` when nothing numeric was folded in.
    pub fn value(&self) -> Option<f64> {
        match &self.state {
            AggregatorState::Sum { sum, has_value, .. } => has_value.then_some(*sum),
            AggregatorState::Count(count) => (*count > 0).then_some(*count as f64),
            AggregatorState::Avg { sum, count } => {
                (*count > 0).then(|| sum / (*count as f64))
            }
            AggregatorState::Max(value) | AggregatorState::Min(value) => *value,
            AggregatorState::Custom { inner, .. } => inner.value(),
            AggregatorState::Record(_) | AggregatorState::Noop => None,
        }
    }

    /// Sum of non-negative inputs (split sums only).
    pub fn positive_value(&self) -> Option<f64> {
        match &self.state {
            AggregatorState::Sum {
                positive,
                has_value: true,
                split: true,
                ..
            } => Some(*positive),
            _ => None,
        }
    }

    /// Sum of negative inputs (split sums only).
    pub fn negative_value(&self) -> Option<f64> {
        match &self.state {
            AggregatorState::Sum {
                negative,
                has_value: true,
                split: true,
                ..
            } => Some(*negative),
            _ => None,
        }
    }

    /// Records kept by a Record aggregator.
    pub fn records(&self) -> &[Record] {
        match &self.state {
            AggregatorState::Record(records) => records,
            _ => &[],
        }
    }

    /// Downcasts the inner state of a custom aggregator.
    pub fn custom<T: 'static>(&self) -> Option<&T> {
        match &self.state {
            AggregatorState::Custom { inner, .. } => inner.as_any().downcast_ref::<T>(),
            _ => None,
        }
    }

    pub fn format_value(&self) -> String {
        let value = self.value();
        match &self.formatter {
            Some(formatter) => formatter.format(value),
            None => value.map(format_number).unwrap_or_default(),
        }
    }

    /// Clears the accumulated state. Kind, fields and formatter are kept.
    pub fn reset(&mut self) {
        match &mut self.state {
            AggregatorState::Sum { split, .. } => {
                let split = *split;
                self.state = AggregatorState::sum(split);
            }
            AggregatorState::Count(count) => *count = 0,
            AggregatorState::Avg { sum, count } => {
                *sum = 0.0;
                *count = 0;
            }
            AggregatorState::Max(value) | AggregatorState::Min(value) => *value = None,
            AggregatorState::Record(records) => records.clear(),
            AggregatorState::Custom { inner, .. } => inner.reset(),
            AggregatorState::Noop => {}
        }
    }
}
