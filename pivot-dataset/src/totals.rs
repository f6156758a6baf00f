//! FILENAME: pivot-dataset/src/totals.rs
//! Totals Engine - Synthesizes subtotal and grand-total cells.
//!
//! Every data cell is merged, aggregator into aggregator, into the cells of
//! its column totals and row totals. Row-total keys created on the way go on
//! a worklist; a second sweep over that worklist fills the intersections of
//! row totals and column totals. Cost is proportional to the cube size, not
//! to the record count.

use rustc_hash::FxHashSet;

use crate::aggregator::{Aggregator, AggregatorRegistry};
use crate::cube::Cube;
use crate::definition::{Axis, ResolvedConfig};
use crate::value::{flat_key, split_flat_key};

/// Flat keys of every total that `key` contributes to on `axis`.
pub fn total_keys(key: &str, axis: Axis, config: &ResolvedConfig) -> Vec<String> {
    let totals = config.totals(axis);
    let mut keys: Vec<String> = Vec::new();

    if totals.has_subtotals() {
        let parts = split_flat_key(key);
        for &index in &totals.sub_total_dimensions {
            let end = (index + 1).min(parts.len());
            let mut total_key: Vec<&str> = parts[..end].iter().map(String::as_str).collect();
            if config.labels_subtotal_keys() {
                total_key.push(&totals.sub_total_label);
            }
            let total_key = flat_key(&total_key);
            // Deepest dimension without a label: the cell is its own subtotal.
            if total_key != key && !keys.contains(&total_key) {
                keys.push(total_key);
            }
        }
    }

    if config.merges_grand_total(axis) {
        keys.push(totals.grand_total_label.clone());
    }
    keys
}

fn merge_into(
    cube: &mut Cube,
    row_key: &str,
    col_key: &str,
    source: &[Aggregator],
    config: &ResolvedConfig,
    registry: &AggregatorRegistry,
) {
    let target = cube.cell_or_insert_with(row_key, col_key, config.aggregations.len(), |i| {
        registry.create(&config.aggregations[i])
    });
    for (aggregator, partial) in target.iter_mut().zip(source) {
        aggregator.push(partial);
    }
}

/// Populates every subtotal and grand-total cell from the data cells.
///
/// Total cells are keyed by synthesized keys; they are remembered on the cube
/// and never fed back into the pass, so after `Cube::reset_aggregators` and
/// a fresh ingestion this recomputes the totals exactly.
pub fn compute_totals(cube: &mut Cube, config: &ResolvedConfig, registry: &AggregatorRegistry) {
    if !config.needs_totals() {
        return;
    }

    let mut data_cells = cube.data_cells();
    data_cells.sort();

    let mut worklist: Vec<String> = Vec::new();
    let mut seen: FxHashSet<String> = FxHashSet::default();
    let mut merges = 0usize;

    for (row_key, col_key) in &data_cells {
        let source: Vec<Aggregator> = match cube.cell(row_key, col_key) {
            Some(cell) => cell.to_vec(),
            None => continue,
        };

        for total_col in total_keys(col_key, Axis::Column, config) {
            cube.mark_total_col(&total_col);
            merge_into(cube, row_key, &total_col, &source, config, registry);
            merges += 1;
        }

        for total_row in total_keys(row_key, Axis::Row, config) {
            cube.mark_total_row(&total_row);
            merge_into(cube, &total_row, col_key, &source, config, registry);
            merges += 1;
            if seen.insert(total_row.clone()) {
                worklist.push(total_row);
            }
        }
    }

    // Totals of totals: row-total rows only hold data columns so far.
    for total_row in &worklist {
        let mut col_keys: Vec<String> = match cube.row(total_row) {
            Some(row) => row
                .keys()
                .filter(|col_key| !cube.is_total_col(col_key))
                .cloned()
                .collect(),
            None => continue,
        };
        col_keys.sort();

        for col_key in col_keys {
            let source: Vec<Aggregator> = match cube.cell(total_row, &col_key) {
                Some(cell) => cell.to_vec(),
                None => continue,
            };
            for total_col in total_keys(&col_key, Axis::Column, config) {
                cube.mark_total_col(&total_col);
                merge_into(cube, total_row, &total_col, &source, config, registry);
                merges += 1;
            }
        }
    }

    log::debug!(
        target: "PIVOT",
        "totals: {} data cells, {} total rows, {} merges",
        data_cells.len(),
        worklist.len(),
        merges
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{
        DatasetOptions, RowHierarchyType, Totals, TotalsOptions, DEFAULT_GRAND_TOTAL_LABEL,
    };
    use crate::value::{dimension_key, record_from, DataValue, Record};

    fn create_test_records() -> Vec<Record> {
        [
            ("East", "Boston", "Chairs", 10.0),
            ("East", "Boston", "Tables", 20.0),
            ("East", "NYC", "Chairs", 1.0),
            ("West", "LA", "Chairs", 5.0),
        ]
        .into_iter()
        .map(|(region, city, cat, sales)| {
            record_from([
                ("region", DataValue::from(region)),
                ("city", DataValue::from(city)),
                ("cat", DataValue::from(cat)),
                ("sales", DataValue::from(sales)),
            ])
        })
        .collect()
    }

    fn create_test_config(hierarchy: RowHierarchyType) -> ResolvedConfig {
        let mut options = DatasetOptions::new(["region", "city"], ["cat"], ["sales"]);
        options.row_hierarchy_type = hierarchy;
        options.data_config.totals = Some(Totals {
            row: Some(TotalsOptions {
                show_sub_totals: true,
                sub_totals_dimensions: vec!["region".to_string()],
                show_grand_totals: true,
                ..Default::default()
            }),
            column: Some(TotalsOptions {
                show_grand_totals: true,
                ..Default::default()
            }),
        });
        ResolvedConfig::resolve(&options)
    }

    fn build_cube(config: &ResolvedConfig, registry: &AggregatorRegistry) -> Cube {
        let mut cube = Cube::new();
        for record in &create_test_records() {
            let row = flat_key(&dimension_key(record, &config.rows));
            let col = flat_key(&dimension_key(record, &config.columns));
            let cell = cube.cell_or_insert_with(&row, &col, 1, |i| {
                registry.create(&config.aggregations[i])
            });
            cell[0].push(record);
        }
        cube
    }

    #[test]
    fn test_total_keys_grid_and_tree() {
        let grid = create_test_config(RowHierarchyType::Grid);
        let key = flat_key(&["East", "Boston"]);
        assert_eq!(
            total_keys(&key, Axis::Row, &grid),
            vec![flat_key(&["East", "Subtotal"]), DEFAULT_GRAND_TOTAL_LABEL.to_string()]
        );

        let tree = create_test_config(RowHierarchyType::Tree);
        assert_eq!(
            total_keys(&key, Axis::Row, &tree),
            vec!["East".to_string(), DEFAULT_GRAND_TOTAL_LABEL.to_string()]
        );
        assert_eq!(
            total_keys("Chairs", Axis::Column, &tree),
            vec![DEFAULT_GRAND_TOTAL_LABEL.to_string()]
        );
    }

    #[test]
    fn test_subtotals_and_grand_totals() {
        let registry = AggregatorRegistry::default();
        let config = create_test_config(RowHierarchyType::Grid);
        let mut cube = build_cube(&config, &registry);
        compute_totals(&mut cube, &config, &registry);

        let gt = DEFAULT_GRAND_TOTAL_LABEL;
        let east_subtotal = flat_key(&["East", "Subtotal"]);
        assert_eq!(cube.aggregator(&east_subtotal, "Chairs", 0).value(), Some(11.0));
        assert_eq!(cube.aggregator(&east_subtotal, gt, 0).value(), Some(31.0));
        assert_eq!(cube.aggregator(gt, "Chairs", 0).value(), Some(16.0));
        assert_eq!(cube.aggregator(gt, gt, 0).value(), Some(36.0));
        assert_eq!(
            cube.aggregator(&flat_key(&["East", "Boston"]), gt, 0).value(),
            Some(30.0)
        );
    }

    #[test]
    fn test_recompute_after_reset_is_exact() {
        let registry = AggregatorRegistry::default();
        let config = create_test_config(RowHierarchyType::Tree);
        let mut cube = build_cube(&config, &registry);
        compute_totals(&mut cube, &config, &registry);
        let cells = cube.len();

        cube.reset_aggregators();
        for record in &create_test_records() {
            let row = flat_key(&dimension_key(record, &config.rows));
            let col = flat_key(&dimension_key(record, &config.columns));
            cube.cell_or_insert_with(&row, &col, 1, |i| registry.create(&config.aggregations[i]))
                [0]
            .push(record);
        }
        compute_totals(&mut cube, &config, &registry);

        assert_eq!(cube.len(), cells);
        let gt = DEFAULT_GRAND_TOTAL_LABEL;
        assert_eq!(cube.aggregator(gt, gt, 0).value(), Some(36.0));
        assert_eq!(cube.aggregator("East", gt, 0).value(), Some(31.0));
    }

    #[test]
    fn test_no_totals_configured() {
        let registry = AggregatorRegistry::default();
        let config = ResolvedConfig::resolve(&DatasetOptions::new(["region"], ["cat"], ["sales"]));
        let mut cube = build_cube(&config, &registry);
        let cells = cube.len();
        compute_totals(&mut cube, &config, &registry);
        assert_eq!(cube.len(), cells);
    }
}
