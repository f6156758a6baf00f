//! FILENAME: pivot-dataset/src/definition.rs
//! Dataset Definition - The configuration of a pivot dataset.
//!
//! This module contains all the types needed to DESCRIBE a pivot dataset:
//! dimensions, indicators, and the rule bundle (sort, filter, aggregation,
//! derived fields, totals, value collection).
//!
//! Two layers:
//! - `DataConfig` / `DatasetOptions`: user intent, serde-friendly, everything optional
//! - `ResolvedConfig`: produced once by `ResolvedConfig::resolve`, fully defaulted,
//!   consumed by every build phase
//!
//! Rules carrying closures (predicates, derive functions, custom comparators,
//! formatters) are skipped by serde and supplied in code.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::aggregator::AggregatorRegistry;
use crate::error::PivotError;
use crate::hooks::PhaseHooks;
use crate::tree::HeaderTreeNode;
use crate::value::{DataValue, Record};

pub const DEFAULT_GRAND_TOTAL_LABEL: &str = "Grand Total";
pub const DEFAULT_SUB_TOTAL_LABEL: &str = "Subtotal";

fn default_true() -> bool {
    true
}

// ============================================================================
// AXIS
// ============================================================================

/// One of the two header axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    Row,
    Column,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Row => write!(f, "row"),
            Axis::Column => write!(f, "column"),
        }
    }
}

/// How the row header hierarchy is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RowHierarchyType {
    /// One header column per dimension; subtotal rows carry a literal label.
    #[default]
    Grid,
    /// Indented tree; nesting encodes subtotals, no literal label.
    Tree,
}

// ============================================================================
// INDICATORS
// ============================================================================

/// A measure shown in every cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "IndicatorRepr")]
pub struct Indicator {
    pub key: String,
    pub title: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IndicatorRepr {
    Key(String),
    Full {
        key: String,
        #[serde(default)]
        title: Option<String>,
    },
}

impl From<IndicatorRepr> for Indicator {
    fn from(repr: IndicatorRepr) -> Self {
        match repr {
            IndicatorRepr::Key(key) => Indicator { key, title: None },
            IndicatorRepr::Full { key, title } => Indicator { key, title },
        }
    }
}

impl Indicator {
    pub fn new(key: impl Into<String>) -> Self {
        Indicator {
            key: key.into(),
            title: None,
        }
    }

    pub fn with_title(key: impl Into<String>, title: impl Into<String>) -> Self {
        Indicator {
            key: key.into(),
            title: Some(title.into()),
        }
    }

    /// Header text for this indicator.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.key)
    }
}

impl From<&str> for Indicator {
    fn from(key: &str) -> Self {
        Indicator::new(key)
    }
}

// ============================================================================
// AGGREGATION
// ============================================================================

/// Supported aggregation functions for indicators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AggregationType {
    #[default]
    Sum,
    Count,
    Avg,
    Max,
    Min,
    /// Keeps the matching records instead of a number.
    Record,
    /// A kind registered in an `AggregatorRegistry` under this name.
    Custom(String),
}

/// Source field(s) an aggregation reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AggregationField {
    Single(String),
    Multiple(Vec<String>),
}

impl AggregationField {
    pub fn fields(&self) -> SmallVec<[String; 2]> {
        match self {
            AggregationField::Single(f) => SmallVec::from_elem(f.clone(), 1),
            AggregationField::Multiple(fs) => fs.iter().cloned().collect(),
        }
    }

    /// The two fields of a dual-axis measure, if this is one.
    pub fn as_pair(&self) -> Option<(&str, &str)> {
        match self {
            AggregationField::Multiple(fs) if fs.len() == 2 => Some((&fs[0], &fs[1])),
            _ => None,
        }
    }
}

/// Renders an aggregate value for display.
#[derive(Clone)]
pub struct ValueFormatter(pub Arc<dyn Fn(Option<f64>) -> String + Send + Sync>);

impl ValueFormatter {
    pub fn new(f: impl Fn(Option<f64>) -> String + Send + Sync + 'static) -> Self {
        ValueFormatter(Arc::new(f))
    }

    pub fn format(&self, value: Option<f64>) -> String {
        (self.0)(value)
    }
}

impl fmt::Debug for ValueFormatter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ValueFormatter(..)")
    }
}

/// How one indicator is aggregated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationRule {
    pub indicator_key: String,

    #[serde(default)]
    pub aggregation_type: AggregationType,

    /// Source field(s); defaults to the indicator key.
    #[serde(default)]
    pub field: Option<AggregationField>,

    #[serde(skip)]
    pub formatter: Option<ValueFormatter>,
}

impl AggregationRule {
    pub fn new(indicator_key: impl Into<String>, aggregation_type: AggregationType) -> Self {
        AggregationRule {
            indicator_key: indicator_key.into(),
            aggregation_type,
            field: None,
            formatter: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(AggregationField::Single(field.into()));
        self
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.field = Some(AggregationField::Multiple(
            fields.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn with_formatter(mut self, formatter: ValueFormatter) -> Self {
        self.formatter = Some(formatter);
        self
    }
}

// ============================================================================
// SORTING
// ============================================================================

/// Direction of a sort rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SortType {
    #[default]
    Asc,
    Desc,
    Normal,
}

/// Compares two dimension values.
#[derive(Clone)]
pub struct KeyComparator(pub Arc<dyn Fn(&str, &str) -> Ordering + Send + Sync>);

impl KeyComparator {
    pub fn new(f: impl Fn(&str, &str) -> Ordering + Send + Sync + 'static) -> Self {
        KeyComparator(Arc::new(f))
    }

    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        (self.0)(a, b)
    }
}

impl fmt::Debug for KeyComparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyComparator(..)")
    }
}

/// How values of one dimension are ordered.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub enum SortMethod {
    /// Natural (alphanumeric) order of the value.
    #[default]
    Natural,
    /// Plain string order, empty values first.
    ByType,
    /// Explicit value order; unlisted values follow in natural order.
    ByValues(Vec<String>),
    /// Order by an indicator's aggregate at `query` on the opposite axis.
    ByIndicator {
        indicator_key: String,
        #[serde(default)]
        query: Vec<String>,
    },
    #[serde(skip)]
    Custom(KeyComparator),
}

/// Sort rule for one dimension field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortRule {
    pub sort_field: String,
    #[serde(default)]
    pub sort_type: SortType,
    #[serde(default)]
    pub method: SortMethod,
}

impl SortRule {
    pub fn natural(field: impl Into<String>) -> Self {
        SortRule {
            sort_field: field.into(),
            sort_type: SortType::Asc,
            method: SortMethod::Natural,
        }
    }

    pub fn by_type(field: impl Into<String>, sort_type: SortType) -> Self {
        SortRule {
            sort_field: field.into(),
            sort_type,
            method: SortMethod::ByType,
        }
    }

    pub fn by_values<I, S>(field: impl Into<String>, order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SortRule {
            sort_field: field.into(),
            sort_type: SortType::Asc,
            method: SortMethod::ByValues(order.into_iter().map(Into::into).collect()),
        }
    }

    pub fn by_indicator<I, S>(
        field: impl Into<String>,
        indicator_key: impl Into<String>,
        query: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SortRule {
            sort_field: field.into(),
            sort_type: SortType::Asc,
            method: SortMethod::ByIndicator {
                indicator_key: indicator_key.into(),
                query: query.into_iter().map(Into::into).collect(),
            },
        }
    }

    pub fn custom(
        field: impl Into<String>,
        f: impl Fn(&str, &str) -> Ordering + Send + Sync + 'static,
    ) -> Self {
        SortRule {
            sort_field: field.into(),
            sort_type: SortType::Asc,
            method: SortMethod::Custom(KeyComparator::new(f)),
        }
    }

    pub fn descending(mut self) -> Self {
        self.sort_type = SortType::Desc;
        self
    }
}

/// Ordering policy for a whole axis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AxisOrder {
    /// Dimension-by-dimension comparison driven by the sort rules.
    #[default]
    KeyAToZ,
    /// Ascending by an indicator's value at the opposite axis' grand total.
    ValueAToZ {
        #[serde(default)]
        indicator_key: Option<String>,
    },
    ValueZToA {
        #[serde(default)]
        indicator_key: Option<String>,
    },
}

// ============================================================================
// FILTERS & DERIVED FIELDS
// ============================================================================

/// Decides whether a record is kept.
#[derive(Clone)]
pub struct RecordPredicate(pub Arc<dyn Fn(&Record) -> bool + Send + Sync>);

impl fmt::Debug for RecordPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RecordPredicate(..)")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FilterRule {
    /// Keep records whose `field` value is one of `values`.
    AllowList { field: String, values: Vec<DataValue> },
    #[serde(skip)]
    Predicate(RecordPredicate),
}

impl FilterRule {
    pub fn allow_list<I, V>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<DataValue>,
    {
        FilterRule::AllowList {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn predicate(f: impl Fn(&Record) -> bool + Send + Sync + 'static) -> Self {
        FilterRule::Predicate(RecordPredicate(Arc::new(f)))
    }

    pub fn accepts(&self, record: &Record) -> bool {
        match self {
            FilterRule::AllowList { field, values } => record
                .get(field)
                .map_or(false, |value| values.contains(value)),
            FilterRule::Predicate(p) => (p.0)(record),
        }
    }
}

/// Computes a new field from a record.
#[derive(Clone)]
pub struct DerivedFieldRule {
    pub field_name: String,
    pub derive: Arc<dyn Fn(&Record) -> DataValue + Send + Sync>,
}

impl DerivedFieldRule {
    pub fn new(
        field_name: impl Into<String>,
        derive: impl Fn(&Record) -> DataValue + Send + Sync + 'static,
    ) -> Self {
        DerivedFieldRule {
            field_name: field_name.into(),
            derive: Arc::new(derive),
        }
    }
}

impl fmt::Debug for DerivedFieldRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedFieldRule")
            .field("field_name", &self.field_name)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// TOTALS
// ============================================================================

/// Subtotal / grand total options for one axis.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TotalsOptions {
    #[serde(default)]
    pub show_sub_totals: bool,

    /// Dimensions at which subtotals are materialized.
    #[serde(default)]
    pub sub_totals_dimensions: Vec<String>,

    #[serde(default)]
    pub show_grand_totals: bool,

    #[serde(default)]
    pub grand_total_label: Option<String>,

    #[serde(default)]
    pub sub_total_label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Totals {
    #[serde(default)]
    pub row: Option<TotalsOptions>,
    #[serde(default)]
    pub column: Option<TotalsOptions>,
}

// ============================================================================
// VALUE COLLECTION
// ============================================================================

/// Chart role of a collected field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollectFieldKind {
    XField,
    YField,
}

/// How values of one field are collected for axis domains.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CollectValueBy {
    /// Fields whose values form the group key.
    #[serde(default)]
    pub by: Vec<String>,

    /// Collect a numeric `{min, max}` range instead of distinct values.
    #[serde(default)]
    pub range: bool,

    /// Sum per secondary group, then keep the range of those sums.
    #[serde(default)]
    pub sum_by: Option<Vec<String>>,

    /// Explicit order of the collected distinct values.
    #[serde(default)]
    pub sort_by: Option<Vec<String>>,

    #[serde(default)]
    pub kind: Option<CollectFieldKind>,
}

// ============================================================================
// MAIN CONFIGURATION
// ============================================================================

/// The rule bundle of a dataset.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DataConfig {
    #[serde(default)]
    pub sort_rules: Vec<SortRule>,

    #[serde(default)]
    pub filter_rules: Vec<FilterRule>,

    #[serde(default)]
    pub aggregation_rules: Vec<AggregationRule>,

    #[serde(skip)]
    pub derived_field_rules: Vec<DerivedFieldRule>,

    /// Whether mapping rules exist; enables global per-indicator statistics.
    #[serde(default)]
    pub mapping_rules: bool,

    #[serde(default)]
    pub totals: Option<Totals>,

    #[serde(default)]
    pub collect_values_by: FxHashMap<String, CollectValueBy>,

    #[serde(default)]
    pub is_pivot_chart: bool,

    /// Order applied to cached chart dimension values.
    #[serde(default)]
    pub dimension_sort_array: Option<Vec<String>>,

    #[serde(default)]
    pub row_order: AxisOrder,

    #[serde(default)]
    pub column_order: AxisOrder,

    /// Track positive and negative partial sums separately in sums and grouped sums.
    #[serde(default)]
    pub split_positive_negative: bool,
}

impl DataConfig {
    /// Loads the serializable part of a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, PivotError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Everything needed to build a dataset besides the records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetOptions {
    /// Row dimensions (outer to inner).
    #[serde(default)]
    pub rows: Vec<String>,

    /// Column dimensions (outer to inner).
    #[serde(default)]
    pub columns: Vec<String>,

    #[serde(default)]
    pub indicators: Vec<Indicator>,

    /// Whether indicators are laid out on the column axis.
    #[serde(default = "default_true")]
    pub indicators_as_col: bool,

    #[serde(default)]
    pub row_hierarchy_type: RowHierarchyType,

    #[serde(default)]
    pub custom_row_tree: Option<Vec<HeaderTreeNode>>,

    #[serde(default)]
    pub custom_col_tree: Option<Vec<HeaderTreeNode>>,

    #[serde(default)]
    pub data_config: DataConfig,

    #[serde(skip)]
    pub hooks: Option<PhaseHooks>,
}

impl Default for DatasetOptions {
    fn default() -> Self {
        DatasetOptions {
            rows: Vec::new(),
            columns: Vec::new(),
            indicators: Vec::new(),
            indicators_as_col: true,
            row_hierarchy_type: RowHierarchyType::Grid,
            custom_row_tree: None,
            custom_col_tree: None,
            data_config: DataConfig::default(),
            hooks: None,
        }
    }
}

impl DatasetOptions {
    pub fn new<R, C, I>(rows: R, columns: C, indicators: I) -> Self
    where
        R: IntoIterator,
        R::Item: Into<String>,
        C: IntoIterator,
        C::Item: Into<String>,
        I: IntoIterator,
        I::Item: Into<Indicator>,
    {
        DatasetOptions {
            rows: rows.into_iter().map(Into::into).collect(),
            columns: columns.into_iter().map(Into::into).collect(),
            indicators: indicators.into_iter().map(Into::into).collect(),
            ..DatasetOptions::default()
        }
    }

    /// Strict validation of references between the configuration parts.
    /// Building never requires this; misconfiguration otherwise degrades to
    /// empty values.
    pub fn validate(&self, registry: &AggregatorRegistry) -> Result<(), PivotError> {
        let config = &self.data_config;
        let has_indicator = |key: &str| self.indicators.iter().any(|i| i.key == key);

        if let Some(totals) = &config.totals {
            for (axis, options, dims) in [
                (Axis::Row, &totals.row, &self.rows),
                (Axis::Column, &totals.column, &self.columns),
            ] {
                if let Some(options) = options {
                    for field in &options.sub_totals_dimensions {
                        if !dims.contains(field) {
                            return Err(PivotError::UnknownSubtotalDimension {
                                axis,
                                field: field.clone(),
                            });
                        }
                    }
                }
            }
        }

        for rule in &config.sort_rules {
            if !self.rows.contains(&rule.sort_field) && !self.columns.contains(&rule.sort_field) {
                return Err(PivotError::UnknownSortField(rule.sort_field.clone()));
            }
            if let SortMethod::ByIndicator { indicator_key, .. } = &rule.method {
                if !has_indicator(indicator_key) {
                    return Err(PivotError::UnknownIndicator(indicator_key.clone()));
                }
            }
        }

        for rule in &config.aggregation_rules {
            if !has_indicator(&rule.indicator_key) {
                return Err(PivotError::UnknownIndicator(rule.indicator_key.clone()));
            }
            if let AggregationType::Custom(name) = &rule.aggregation_type {
                if !registry.contains(name) {
                    return Err(PivotError::UnknownAggregator(name.clone()));
                }
            }
        }

        for order in [&config.row_order, &config.column_order] {
            if let AxisOrder::ValueAToZ { indicator_key: Some(key) }
            | AxisOrder::ValueZToA { indicator_key: Some(key) } = order
            {
                if !has_indicator(key) {
                    return Err(PivotError::UnknownIndicator(key.clone()));
                }
            }
        }

        Ok(())
    }
}

// ============================================================================
// RESOLVED CONFIGURATION
// ============================================================================

/// Totals configuration of one axis with every default applied.
#[derive(Debug, Clone)]
pub struct AxisTotals {
    pub show_sub_totals: bool,
    pub show_grand_totals: bool,
    /// Indices into the axis' dimension list, in configuration order.
    pub sub_total_dimensions: Vec<usize>,
    /// One flag per dimension: is it a subtotal boundary.
    pub subtotal_flags: Vec<bool>,
    pub grand_total_label: String,
    pub sub_total_label: String,
}

impl AxisTotals {
    fn resolve(options: Option<&TotalsOptions>, dimensions: &[String], axis: Axis) -> Self {
        let mut subtotal_flags = vec![false; dimensions.len()];
        let mut sub_total_dimensions = Vec::new();
        let show_sub_totals = options.map_or(false, |o| o.show_sub_totals);

        if let Some(options) = options.filter(|o| o.show_sub_totals) {
            for field in &options.sub_totals_dimensions {
                match dimensions.iter().position(|d| d == field) {
                    Some(index) => {
                        subtotal_flags[index] = true;
                        sub_total_dimensions.push(index);
                    }
                    None => log::warn!(
                        target: "PIVOT",
                        "subtotal dimension '{}' is not a {} dimension, ignored",
                        field,
                        axis
                    ),
                }
            }
        }

        AxisTotals {
            show_sub_totals,
            show_grand_totals: options.map_or(false, |o| o.show_grand_totals),
            sub_total_dimensions,
            subtotal_flags,
            grand_total_label: options
                .and_then(|o| o.grand_total_label.clone())
                .unwrap_or_else(|| DEFAULT_GRAND_TOTAL_LABEL.to_string()),
            sub_total_label: options
                .and_then(|o| o.sub_total_label.clone())
                .unwrap_or_else(|| DEFAULT_SUB_TOTAL_LABEL.to_string()),
        }
    }

    /// Whether subtotals are materialized at all on this axis.
    pub fn has_subtotals(&self) -> bool {
        self.show_sub_totals && !self.sub_total_dimensions.is_empty()
    }
}

/// The aggregation of one indicator, with the rule lookup already done.
#[derive(Debug, Clone)]
pub struct IndicatorAggregation {
    pub aggregation_type: AggregationType,
    pub fields: SmallVec<[String; 2]>,
    pub formatter: Option<ValueFormatter>,
    /// Sums also track positive and negative parts.
    pub split_positive_negative: bool,
}

/// Fully defaulted configuration consumed by every build phase.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub rows: Vec<String>,
    pub columns: Vec<String>,
    pub indicators: Vec<Indicator>,
    pub indicator_keys: Vec<String>,
    pub indicators_as_col: bool,
    pub row_hierarchy_type: RowHierarchyType,

    pub sort_rules: Vec<SortRule>,
    pub filter_rules: Vec<FilterRule>,
    pub derived_field_rules: Vec<DerivedFieldRule>,

    /// One entry per indicator, same order as `indicator_keys`.
    pub aggregations: Vec<IndicatorAggregation>,
    /// Two-field measures, in aggregation rule order.
    pub paired_fields: Vec<(String, String)>,

    pub mapping_rules: bool,
    pub row_totals: AxisTotals,
    pub column_totals: AxisTotals,

    pub collect_values_by: FxHashMap<String, CollectValueBy>,
    pub is_pivot_chart: bool,
    pub dimension_sort_array: Option<Vec<String>>,
    pub row_order: AxisOrder,
    pub column_order: AxisOrder,
    pub split_positive_negative: bool,
}

impl ResolvedConfig {
    /// Applies every default once.
    pub fn resolve(options: &DatasetOptions) -> Self {
        let config = &options.data_config;
        let indicator_keys: Vec<String> = options.indicators.iter().map(|i| i.key.clone()).collect();

        let aggregations = indicator_keys
            .iter()
            .map(|key| {
                match config.aggregation_rules.iter().find(|r| &r.indicator_key == key) {
                    Some(rule) => IndicatorAggregation {
                        aggregation_type: rule.aggregation_type.clone(),
                        fields: rule
                            .field
                            .as_ref()
                            .map(AggregationField::fields)
                            .unwrap_or_else(|| SmallVec::from_elem(key.clone(), 1)),
                        formatter: rule.formatter.clone(),
                        split_positive_negative: config.split_positive_negative,
                    },
                    None => IndicatorAggregation {
                        aggregation_type: AggregationType::Sum,
                        fields: SmallVec::from_elem(key.clone(), 1),
                        formatter: None,
                        split_positive_negative: config.split_positive_negative,
                    },
                }
            })
            .collect();

        let paired_fields = config
            .aggregation_rules
            .iter()
            .filter_map(|r| r.field.as_ref().and_then(AggregationField::as_pair))
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect();

        let totals = config.totals.as_ref();

        ResolvedConfig {
            rows: options.rows.clone(),
            columns: options.columns.clone(),
            indicators: options.indicators.clone(),
            indicator_keys,
            indicators_as_col: options.indicators_as_col,
            row_hierarchy_type: options.row_hierarchy_type,
            sort_rules: config.sort_rules.clone(),
            filter_rules: config.filter_rules.clone(),
            derived_field_rules: config.derived_field_rules.clone(),
            aggregations,
            paired_fields,
            mapping_rules: config.mapping_rules,
            row_totals: AxisTotals::resolve(
                totals.and_then(|t| t.row.as_ref()),
                &options.rows,
                Axis::Row,
            ),
            column_totals: AxisTotals::resolve(
                totals.and_then(|t| t.column.as_ref()),
                &options.columns,
                Axis::Column,
            ),
            collect_values_by: config.collect_values_by.clone(),
            is_pivot_chart: config.is_pivot_chart,
            dimension_sort_array: config.dimension_sort_array.clone(),
            row_order: config.row_order.clone(),
            column_order: config.column_order.clone(),
            split_positive_negative: config.split_positive_negative,
        }
    }

    pub fn dimensions(&self, axis: Axis) -> &[String] {
        match axis {
            Axis::Row => &self.rows,
            Axis::Column => &self.columns,
        }
    }

    pub fn totals(&self, axis: Axis) -> &AxisTotals {
        match axis {
            Axis::Row => &self.row_totals,
            Axis::Column => &self.column_totals,
        }
    }

    pub fn order(&self, axis: Axis) -> &AxisOrder {
        match axis {
            Axis::Row => &self.row_order,
            Axis::Column => &self.column_order,
        }
    }

    pub fn indicator_index(&self, key: &str) -> Option<usize> {
        self.indicator_keys.iter().position(|k| k == key)
    }

    /// Whether cells merge into the grand total of `axis`. Forced when the
    /// opposite axis has no dimensions.
    pub fn merges_grand_total(&self, axis: Axis) -> bool {
        match axis {
            Axis::Row => self.row_totals.show_grand_totals || self.columns.is_empty(),
            Axis::Column => self.column_totals.show_grand_totals || self.rows.is_empty(),
        }
    }

    /// Whether the totals pass has anything to do.
    pub fn needs_totals(&self) -> bool {
        self.row_totals.has_subtotals()
            || self.column_totals.has_subtotals()
            || self.row_totals.show_grand_totals
            || self.column_totals.show_grand_totals
    }

    /// Subtotal keys carry the literal label only in grid layout.
    pub fn labels_subtotal_keys(&self) -> bool {
        self.row_hierarchy_type == RowHierarchyType::Grid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_options() -> DatasetOptions {
        let mut options = DatasetOptions::new(["region", "city"], ["cat"], ["sales", "profit"]);
        options.data_config.aggregation_rules = vec![
            AggregationRule::new("profit", AggregationType::Avg).with_field("margin"),
        ];
        options.data_config.totals = Some(Totals {
            row: Some(TotalsOptions {
                show_sub_totals: true,
                sub_totals_dimensions: vec!["region".to_string(), "missing".to_string()],
                show_grand_totals: true,
                grand_total_label: Some("All".to_string()),
                sub_total_label: None,
            }),
            column: None,
        });
        options
    }

    #[test]
    fn test_resolve_applies_defaults() {
        let resolved = ResolvedConfig::resolve(&create_test_options());

        assert_eq!(resolved.indicator_keys, vec!["sales", "profit"]);
        assert_eq!(resolved.aggregations[0].aggregation_type, AggregationType::Sum);
        assert_eq!(resolved.aggregations[0].fields.as_slice(), &["sales".to_string()]);
        assert_eq!(resolved.aggregations[1].aggregation_type, AggregationType::Avg);
        assert_eq!(resolved.aggregations[1].fields.as_slice(), &["margin".to_string()]);

        assert_eq!(resolved.row_totals.sub_total_dimensions, vec![0]);
        assert_eq!(resolved.row_totals.subtotal_flags, vec![true, false]);
        assert_eq!(resolved.row_totals.grand_total_label, "All");
        assert_eq!(resolved.row_totals.sub_total_label, DEFAULT_SUB_TOTAL_LABEL);
        assert_eq!(resolved.column_totals.grand_total_label, DEFAULT_GRAND_TOTAL_LABEL);
        assert!(resolved.needs_totals());
    }

    #[test]
    fn test_subtotal_dimensions_ignored_when_disabled() {
        let mut options = create_test_options();
        if let Some(row) = options
            .data_config
            .totals
            .as_mut()
            .and_then(|t| t.row.as_mut())
        {
            row.show_sub_totals = false;
        }
        let resolved = ResolvedConfig::resolve(&options);
        assert!(resolved.row_totals.sub_total_dimensions.is_empty());
        assert!(!resolved.row_totals.has_subtotals());
    }

    #[test]
    fn test_validate_reports_unknown_references() {
        let registry = AggregatorRegistry::default();
        let options = create_test_options();
        assert!(matches!(
            options.validate(&registry),
            Err(PivotError::UnknownSubtotalDimension { axis: Axis::Row, .. })
        ));

        let mut options = DatasetOptions::new(["region"], ["cat"], ["sales"]);
        options.data_config.sort_rules = vec![SortRule::by_indicator("region", "profit", ["Chairs"])];
        assert!(matches!(
            options.validate(&registry),
            Err(PivotError::UnknownIndicator(key)) if key == "profit"
        ));

        options.data_config.sort_rules.clear();
        options.data_config.aggregation_rules =
            vec![AggregationRule::new("sales", AggregationType::Custom("median".into()))];
        assert!(matches!(
            options.validate(&registry),
            Err(PivotError::UnknownAggregator(name)) if name == "median"
        ));
    }

    #[test]
    fn test_config_from_json() {
        let config = DataConfig::from_json(
            r#"{
                "sort_rules": [
                    {"sort_field": "region", "sort_type": "Desc", "method": {"ByValues": ["West", "East"]}}
                ],
                "filter_rules": [
                    {"AllowList": {"field": "region", "values": ["East", 3]}}
                ],
                "aggregation_rules": [
                    {"indicator_key": "sales", "aggregation_type": "Max", "field": ["a", "b"]}
                ],
                "totals": {"row": {"show_grand_totals": true}},
                "collect_values_by": {"sales": {"by": ["region"], "range": true}},
                "row_order": {"ValueZToA": {"indicator_key": "sales"}}
            }"#,
        )
        .unwrap();

        assert_eq!(config.sort_rules[0].sort_type, SortType::Desc);
        assert!(matches!(&config.sort_rules[0].method, SortMethod::ByValues(v) if v.len() == 2));
        assert!(matches!(&config.filter_rules[0], FilterRule::AllowList { values, .. } if values[1] == DataValue::Number(3.0)));
        assert_eq!(
            config.aggregation_rules[0].field.as_ref().and_then(AggregationField::as_pair),
            Some(("a", "b"))
        );
        assert!(config.collect_values_by["sales"].range);
        assert!(matches!(config.row_order, AxisOrder::ValueZToA { .. }));
    }

    #[test]
    fn test_config_from_invalid_json() {
        assert!(matches!(DataConfig::from_json("{"), Err(PivotError::Json(_))));
    }

    #[test]
    fn test_indicator_deserializes_from_key_or_object() {
        let indicators: Vec<Indicator> =
            serde_json::from_str(r#"["sales", {"key": "profit", "title": "Profit"}]"#).unwrap();
        assert_eq!(indicators[0], Indicator::new("sales"));
        assert_eq!(indicators[1].display_title(), "Profit");
    }

    #[test]
    fn test_allow_list_filter() {
        let rule = FilterRule::allow_list("region", ["East"]);
        let east = crate::value::record_from([("region", "East")]);
        let west = crate::value::record_from([("region", "West")]);
        let missing = crate::value::record_from([("city", "Boston")]);
        assert!(rule.accepts(&east));
        assert!(!rule.accepts(&west));
        assert!(!rule.accepts(&missing));
    }
}
