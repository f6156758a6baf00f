//! FILENAME: pivot-dataset/src/lib.rs
//! Pivot table / pivot chart data engine.
//!
//! Turns a flat list of records plus a declarative configuration into an
//! aggregation cube keyed by (row key, column key), with subtotals, grand
//! totals, sorted key arrays and header trees ready for rendering.
//!
//! PIPELINE: Records --> Derive/Filter --> Cube + Collected Values --> Totals
//!           --> Sorted Keys --> Header Trees --> (chart) Zero Alignment
//!
//! Layers:
//! - `definition`: Serializable configuration (what the pivot IS)
//! - `aggregator`: Per-cell accumulators and the custom kind registry
//! - `cube`, `totals`, `collect`: Aggregated state (HOW we compute)
//! - `sort`, `tree`, `zero_align`: Renderable structure (WHAT we display)
//! - `dataset`: The orchestrator tying the phases together

pub mod aggregator;
pub mod collect;
pub mod cube;
pub mod dataset;
pub mod definition;
pub mod error;
pub mod hooks;
pub mod sort;
pub mod totals;
pub mod tree;
pub mod value;
pub mod zero_align;


pub use aggregator::{noop, AggregateInput, Aggregator, AggregatorRegistry, CustomAggregate};
pub use collect::{CollectedValue, CollectedValues, FieldCollection, SumRange, ValueRange};
pub use cube::Cube;
pub use dataset::{Dataset, IndicatorStatistics, RecordSet};
pub use definition::*;
pub use error::PivotError;
pub use hooks::{BuildPhase, PhaseHooks, PhaseObserver};
pub use sort::{natural_cmp, SortContext};
pub use tree::{tree_to_paths, HeaderTreeNode};
pub use value::{flat_key, record_from, split_flat_key, DataValue, DimensionKey, Record, KEY_SEPARATOR};
pub use zero_align::align_zero;
