//! FILENAME: pivot-dataset/src/dataset.rs
//! Dataset - Builds and owns the cube, key arrays and header trees.
//!
//! Build order (each step is a `BuildPhase`):
//! 1. Collect: derive fields, filter, ingest records into the cube and the
//!    value collector, then finish the collected values
//! 2. Total: synthesize subtotal and grand-total cells
//! 3. Sort: order the row and column key arrays
//! 4. TreeBuild: header trees and their root-to-leaf paths
//! 5. Align: zero alignment of paired measures (pivot chart only)
//!
//! Resorting and refiltering mutate the owned state in place.

use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::aggregator::{noop, Aggregator, AggregatorRegistry};
use crate::collect::{self, CollectedValues};
use crate::cube::Cube;
use crate::definition::{
    AggregationType, Axis, DatasetOptions, DerivedFieldRule, FilterRule, IndicatorAggregation,
    ResolvedConfig, RowHierarchyType, SortRule,
};
use crate::error::PivotError;
use crate::hooks::{run_phase, BuildPhase, PhaseHooks};
use crate::sort::SortContext;
use crate::totals::compute_totals;
use crate::tree::{build_plain_tree, build_tree, normalize_custom_tree, tree_to_paths, HeaderTreeNode, TreeBuildOptions};
use crate::value::{dimension_key, flat_key, DimensionKey, Record};
use crate::zero_align::align_collected;

// ============================================================================
// INPUT RECORDS
// ============================================================================

/// The records a dataset is built from.
#[derive(Debug, Clone)]
pub enum RecordSet {
    Flat(Vec<Record>),
    /// Records already split per indicator; each group only feeds its indicator.
    ByIndicator(Vec<(String, Vec<Record>)>),
}

impl Default for RecordSet {
    fn default() -> Self {
        RecordSet::Flat(Vec::new())
    }
}

impl From<Vec<Record>> for RecordSet {
    fn from(records: Vec<Record>) -> Self {
        RecordSet::Flat(records)
    }
}

impl RecordSet {
    pub fn len(&self) -> usize {
        match self {
            RecordSet::Flat(records) => records.len(),
            RecordSet::ByIndicator(groups) => groups.iter().map(|(_, r)| r.len()).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Dataset-wide statistics of one indicator, kept when mapping rules exist.
#[derive(Debug, Clone)]
pub struct IndicatorStatistics {
    /// Largest running cell value seen.
    pub max: Aggregator,
    /// Smallest running cell value seen.
    pub min: Aggregator,
    /// The indicator's aggregation over every kept record.
    pub total: Aggregator,
}

fn apply_derived_fields(record: &mut Record, rules: &[DerivedFieldRule]) {
    for rule in rules {
        let value = (rule.derive)(record);
        record.insert(rule.field_name.clone(), value);
    }
}

// ============================================================================
// DATASET
// ============================================================================

#[derive(Debug)]
pub struct Dataset {
    config: ResolvedConfig,
    registry: AggregatorRegistry,
    hooks: Option<PhaseHooks>,
    records: RecordSet,

    cube: Cube,
    row_keys: Vec<DimensionKey>,
    col_keys: Vec<DimensionKey>,
    row_flat_keys: FxHashSet<String>,
    col_flat_keys: FxHashSet<String>,

    collected_values: CollectedValues,
    cached_collected_values: CollectedValues,
    indicator_statistics: Vec<IndicatorStatistics>,

    custom_row_tree: Option<Vec<HeaderTreeNode>>,
    custom_col_tree: Option<Vec<HeaderTreeNode>>,
    row_header_tree: Vec<HeaderTreeNode>,
    col_header_tree: Vec<HeaderTreeNode>,
    row_keys_path: Vec<Vec<String>>,
    col_keys_path: Vec<Vec<String>>,

    sorted: bool,
}

impl Dataset {
    /// Builds a dataset. Never fails: bad configuration degrades to empty values.
    pub fn new(options: DatasetOptions, records: impl Into<RecordSet>) -> Self {
        Self::with_registry(options, records, AggregatorRegistry::default())
    }

    /// Validates the configuration strictly, then builds.
    pub fn try_new(options: DatasetOptions, records: impl Into<RecordSet>) -> Result<Self, PivotError> {
        let registry = AggregatorRegistry::default();
        options.validate(&registry)?;
        Ok(Self::with_registry(options, records, registry))
    }

    /// Strict variant of `with_registry`.
    pub fn try_with_registry(
        options: DatasetOptions,
        records: impl Into<RecordSet>,
        registry: AggregatorRegistry,
    ) -> Result<Self, PivotError> {
        options.validate(&registry)?;
        Ok(Self::with_registry(options, records, registry))
    }

    /// Builds with custom aggregation kinds available.
    pub fn with_registry(
        options: DatasetOptions,
        records: impl Into<RecordSet>,
        registry: AggregatorRegistry,
    ) -> Self {
        let config = ResolvedConfig::resolve(&options);
        let DatasetOptions {
            custom_row_tree,
            custom_col_tree,
            hooks,
            ..
        } = options;

        let mut dataset = Dataset {
            config,
            registry,
            hooks,
            records: records.into(),
            cube: Cube::new(),
            row_keys: Vec::new(),
            col_keys: Vec::new(),
            row_flat_keys: FxHashSet::default(),
            col_flat_keys: FxHashSet::default(),
            collected_values: CollectedValues::default(),
            cached_collected_values: CollectedValues::default(),
            indicator_statistics: Vec::new(),
            custom_row_tree,
            custom_col_tree,
            row_header_tree: Vec::new(),
            col_header_tree: Vec::new(),
            row_keys_path: Vec::new(),
            col_keys_path: Vec::new(),
            sorted: false,
        };
        dataset.build();
        dataset
    }

    fn build(&mut self) {
        let hooks = self.hooks.clone();
        let hooks = hooks.as_ref();

        run_phase(hooks, BuildPhase::Collect, || self.ingest());
        run_phase(hooks, BuildPhase::Total, || self.compute_totals());
        run_phase(hooks, BuildPhase::Sort, || self.sort_keys());
        run_phase(hooks, BuildPhase::TreeBuild, || self.build_trees());
        if self.config.is_pivot_chart {
            run_phase(hooks, BuildPhase::Align, || {
                align_collected(&mut self.collected_values, &self.config.paired_fields);
                self.cached_collected_values = collect::cache_dimension_values(
                    &self.collected_values,
                    &self.config.collect_values_by,
                    self.config.dimension_sort_array.as_deref(),
                );
            });
        }

        log::debug!(
            target: "PIVOT",
            "dataset built: {} records, {} row keys, {} col keys, {} cells",
            self.records.len(),
            self.row_keys.len(),
            self.col_keys.len(),
            self.cube.len()
        );
    }

    // ------------------------------------------------------------------------
    // Collect
    // ------------------------------------------------------------------------

    fn accepts(&self, record: &Record) -> bool {
        self.config.filter_rules.iter().all(|rule| rule.accepts(record))
    }

    fn ingest(&mut self) {
        let mut records = std::mem::take(&mut self.records);
        let mut kept = 0usize;

        match &mut records {
            RecordSet::Flat(records) => {
                for record in records.iter_mut() {
                    apply_derived_fields(record, &self.config.derived_field_rules);
                    if self.accepts(record) {
                        self.process_record(record, None);
                        kept += 1;
                    }
                }
            }
            RecordSet::ByIndicator(groups) => {
                for (indicator_key, records) in groups.iter_mut() {
                    for record in records.iter_mut() {
                        apply_derived_fields(record, &self.config.derived_field_rules);
                        if self.accepts(record) {
                            self.process_record(record, Some(indicator_key.as_str()));
                            kept += 1;
                        }
                    }
                }
            }
        }

        self.records = records;
        collect::finish(&mut self.collected_values, &self.config.collect_values_by);
        log::debug!(target: "PIVOT", "ingested {} of {} records", kept, self.records.len());
    }

    fn process_record(&mut self, record: &Record, assigned_indicator: Option<&str>) {
        let config = &self.config;
        let registry = &self.registry;

        let row_key = dimension_key(record, &config.rows);
        let col_key = dimension_key(record, &config.columns);

        collect::collect_record(
            &mut self.collected_values,
            &config.collect_values_by,
            record,
            config.split_positive_negative,
        );

        let flat_row = flat_key(&row_key);
        let flat_col = flat_key(&col_key);
        if !config.rows.is_empty() && self.row_flat_keys.insert(flat_row.clone()) {
            self.row_keys.push(row_key);
        }
        if !config.columns.is_empty() && self.col_flat_keys.insert(flat_col.clone()) {
            self.col_keys.push(col_key);
        }

        let indicator_count = config.aggregations.len();
        let cell = self.cube.cell_or_insert_with(&flat_row, &flat_col, indicator_count, |i| {
            registry.create(&config.aggregations[i])
        });
        for (i, aggregator) in cell.iter_mut().enumerate() {
            let carries_field = match assigned_indicator {
                Some(key) => config.indicator_keys[i] == key,
                None => aggregator.fields().iter().any(|f| record.contains_key(f)),
            };
            if carries_field {
                aggregator.push(record);
            }
        }

        if config.mapping_rules {
            let values: SmallVec<[Option<f64>; 4]> = cell.iter().map(Aggregator::value).collect();
            if self.indicator_statistics.len() < indicator_count {
                self.indicator_statistics = (0..indicator_count)
                    .map(|i| {
                        let bound = |aggregation_type| IndicatorAggregation {
                            aggregation_type,
                            fields: SmallVec::from_elem(config.indicator_keys[i].clone(), 1),
                            formatter: None,
                            split_positive_negative: false,
                        };
                        IndicatorStatistics {
                            max: registry.create(&bound(AggregationType::Max)),
                            min: registry.create(&bound(AggregationType::Min)),
                            total: registry.create(&config.aggregations[i]),
                        }
                    })
                    .collect();
            }
            for (statistics, value) in self.indicator_statistics.iter_mut().zip(values) {
                if let Some(value) = value {
                    statistics.max.push(value);
                    statistics.min.push(value);
                }
                statistics.total.push(record);
            }
        }
    }

    fn compute_totals(&mut self) {
        compute_totals(&mut self.cube, &self.config, &self.registry);
    }

    // ------------------------------------------------------------------------
    // Sort & trees
    // ------------------------------------------------------------------------

    /// Sorts both key arrays. A no-op until the sort rules change.
    pub fn sort_keys(&mut self) {
        if self.sorted {
            return;
        }
        self.sorted = true;
        SortContext::new(Axis::Row, &self.config, &self.cube).sort(&mut self.row_keys);
        SortContext::new(Axis::Column, &self.config, &self.cube).sort(&mut self.col_keys);
    }

    fn build_trees(&mut self) {
        let config = &self.config;
        let row_indicators = (!config.indicators_as_col).then_some(config.indicators.as_slice());
        let col_indicators = config.indicators_as_col.then_some(config.indicators.as_slice());

        self.row_header_tree = match &self.custom_row_tree {
            Some(tree) => normalize_custom_tree(tree.clone(), row_indicators),
            None => {
                let options = TreeBuildOptions {
                    dimensions: &config.rows,
                    indicators: row_indicators,
                    subtotal_flags: &config.row_totals.subtotal_flags,
                    grand_total: config.row_totals.show_grand_totals || config.columns.is_empty(),
                    grand_total_label: &config.row_totals.grand_total_label,
                    sub_total_label: &config.row_totals.sub_total_label,
                    label_subtotal_keys: config.labels_subtotal_keys(),
                };
                match config.row_hierarchy_type {
                    RowHierarchyType::Grid => build_tree(&self.row_keys, &options),
                    RowHierarchyType::Tree => build_plain_tree(&self.row_keys, &options),
                }
            }
        };

        self.col_header_tree = match &self.custom_col_tree {
            Some(tree) => normalize_custom_tree(tree.clone(), col_indicators),
            None => build_tree(
                &self.col_keys,
                &TreeBuildOptions {
                    dimensions: &config.columns,
                    indicators: col_indicators,
                    subtotal_flags: &config.column_totals.subtotal_flags,
                    grand_total: config.column_totals.show_grand_totals,
                    grand_total_label: &config.column_totals.grand_total_label,
                    sub_total_label: &config.column_totals.sub_total_label,
                    label_subtotal_keys: config.labels_subtotal_keys(),
                },
            ),
        };

        self.row_keys_path = tree_to_paths(&self.row_header_tree);
        self.col_keys_path = tree_to_paths(&self.col_header_tree);
    }

    // ------------------------------------------------------------------------
    // Updates
    // ------------------------------------------------------------------------

    /// Replaces the sort rules, resorts and rebuilds the header trees.
    pub fn update_sort_rules(&mut self, sort_rules: Vec<SortRule>) {
        self.config.sort_rules = sort_rules;
        self.sorted = false;
        let hooks = self.hooks.clone();
        run_phase(hooks.as_ref(), BuildPhase::Sort, || self.sort_keys());
        run_phase(hooks.as_ref(), BuildPhase::TreeBuild, || self.build_trees());
    }

    /// Replaces the filter rules and rebuilds in place.
    ///
    /// With `reset_tree` the cube and key sets are dropped, so filtered-out
    /// keys disappear. Without it every aggregator is reset instead: keys of
    /// filtered-out records stay, with empty values.
    pub fn update_filter_rules(&mut self, filter_rules: Vec<FilterRule>, reset_tree: bool) {
        self.config.filter_rules = filter_rules;
        if reset_tree {
            self.cube.clear();
            self.row_keys.clear();
            self.col_keys.clear();
            self.row_flat_keys.clear();
            self.col_flat_keys.clear();
        } else {
            self.cube.reset_aggregators();
        }
        self.collected_values.clear();
        self.indicator_statistics.clear();
        self.sorted = false;

        let hooks = self.hooks.clone();
        let hooks = hooks.as_ref();
        run_phase(hooks, BuildPhase::Collect, || self.ingest());
        run_phase(hooks, BuildPhase::Total, || self.compute_totals());
        run_phase(hooks, BuildPhase::Sort, || self.sort_keys());
        run_phase(hooks, BuildPhase::TreeBuild, || self.build_trees());
        if self.config.is_pivot_chart {
            run_phase(hooks, BuildPhase::Align, || {
                align_collected(&mut self.collected_values, &self.config.paired_fields)
            });
        }
    }

    // ------------------------------------------------------------------------
    // Lookups & accessors
    // ------------------------------------------------------------------------

    /// Aggregator of `indicator_key` at the given dimension tuples. Missing
    /// cells and unknown indicators give the shared no-op aggregator.
    pub fn aggregator<R, C>(&self, row_key: &[R], col_key: &[C], indicator_key: &str) -> &Aggregator
    where
        R: AsRef<str>,
        C: AsRef<str>,
    {
        self.aggregator_by_flat_key(&flat_key(row_key), &flat_key(col_key), indicator_key)
    }

    pub fn aggregator_by_flat_key(&self, row_key: &str, col_key: &str, indicator_key: &str) -> &Aggregator {
        match self.config.indicator_index(indicator_key) {
            Some(index) => self.cube.aggregator(row_key, col_key, index),
            None => noop(),
        }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn cube(&self) -> &Cube {
        &self.cube
    }

    pub fn records(&self) -> &RecordSet {
        &self.records
    }

    pub fn row_keys(&self) -> &[DimensionKey] {
        &self.row_keys
    }

    pub fn col_keys(&self) -> &[DimensionKey] {
        &self.col_keys
    }

    pub fn row_header_tree(&self) -> &[HeaderTreeNode] {
        &self.row_header_tree
    }

    pub fn col_header_tree(&self) -> &[HeaderTreeNode] {
        &self.col_header_tree
    }

    pub fn row_keys_path(&self) -> &[Vec<String>] {
        &self.row_keys_path
    }

    pub fn col_keys_path(&self) -> &[Vec<String>] {
        &self.col_keys_path
    }

    pub fn collected_values(&self) -> &CollectedValues {
        &self.collected_values
    }

    /// Chart axis values copied after construction.
    pub fn cached_collected_values(&self) -> &CollectedValues {
        &self.cached_collected_values
    }

    pub fn indicator_statistics(&self) -> &[IndicatorStatistics] {
        &self.indicator_statistics
    }
}
