//! FILENAME: pivot-dataset/src/error.rs

use thiserror::Error;

use crate::definition::Axis;

#[derive(Error, Debug)]
pub enum PivotError {
    #[error("Invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Subtotal dimension '{field}' is not a {axis} dimension")]
    UnknownSubtotalDimension { axis: Axis, field: String },

    #[error("Sort rule references unknown dimension: {0}")]
    UnknownSortField(String),

    #[error("Unknown indicator: {0}")]
    UnknownIndicator(String),

    #[error("Unknown aggregator type: {0}")]
    UnknownAggregator(String),
}
