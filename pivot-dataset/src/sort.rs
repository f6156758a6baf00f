//! FILENAME: pivot-dataset/src/sort.rs
//! Key Sorter - Orders the row and column key arrays.
//!
//! The element comparators (natural, type, explicit order) are pure
//! functions. The composite comparator for an axis is built once from a
//! `SortContext` that names everything it reads: dimensions, rules, labels
//! and the cube (for indicator-value rules).

use std::cmp::Ordering;

use crate::cube::Cube;
use crate::definition::{
    Axis, AxisOrder, KeyComparator, ResolvedConfig, SortMethod, SortType,
};
use crate::value::{flat_key, DimensionKey};

// ============================================================================
// ELEMENT COMPARATORS
// ============================================================================

#[derive(PartialEq)]
enum Chunk<'a> {
    Digits(&'a str),
    Text(&'a str),
}

fn chunks(s: &str) -> Vec<Chunk<'_>> {
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut digits: Option<bool> = None;
    for (i, c) in s.char_indices() {
        let is_digit = c.is_ascii_digit();
        match digits {
            Some(d) if d == is_digit => {}
            Some(d) => {
                chunks.push(if d { Chunk::Digits(&s[start..i]) } else { Chunk::Text(&s[start..i]) });
                start = i;
                digits = Some(is_digit);
            }
            None => digits = Some(is_digit),
        }
    }
    if let Some(d) = digits {
        chunks.push(if d { Chunk::Digits(&s[start..]) } else { Chunk::Text(&s[start..]) });
    }
    chunks
}

fn compare_digits(a: &str, b: &str) -> Ordering {
    let a_trimmed = a.trim_start_matches('0');
    let b_trimmed = b.trim_start_matches('0');
    a_trimmed
        .len()
        .cmp(&b_trimmed.len())
        .then_with(|| a_trimmed.cmp(b_trimmed))
}

/// Parses optional sign, digits and an optional `.digits` fraction. Exponents,
/// `inf` and `nan` are not numbers here.
fn plain_decimal(s: &str) -> Option<f64> {
    let unsigned = s.strip_prefix(|c: char| c == '-' || c == '+').unwrap_or(s);
    let (int_part, fraction) = match unsigned.split_once('.') {
        Some((int_part, fraction)) => (int_part, Some(fraction)),
        None => (unsigned, None),
    };
    let all_digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(int_part) || !fraction.map_or(true, all_digits) {
        return None;
    }
    s.parse::<f64>().ok()
}

/// Natural order: plain decimal numbers come first and compare numerically;
/// other values compare chunk by chunk, with digit runs by value
/// ("item2" < "item10"). Ties fall back to plain string order, so this is a
/// total order.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    match (plain_decimal(a.trim()), plain_decimal(b.trim())) {
        (Some(x), Some(y)) => return x.total_cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => return Ordering::Less,
        (None, Some(_)) => return Ordering::Greater,
        (None, None) => {}
    }

    let a_chunks = chunks(a);
    let b_chunks = chunks(b);
    for (x, y) in a_chunks.iter().zip(&b_chunks) {
        let ordering = match (x, y) {
            (Chunk::Digits(x), Chunk::Digits(y)) => compare_digits(x, y),
            (Chunk::Digits(x), Chunk::Text(y))
            | (Chunk::Text(x), Chunk::Digits(y))
            | (Chunk::Text(x), Chunk::Text(y)) => x.cmp(y),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    a_chunks
        .len()
        .cmp(&b_chunks.len())
        .then_with(|| a.cmp(b))
}

/// Natural order of aggregate values; missing values come first.
pub fn natural_cmp_values(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Plain string order; empty values sort first.
pub fn type_cmp(a: &str, b: &str) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (false, false) => a.cmp(b),
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (true, true) => Ordering::Equal,
    }
}

/// Listed values first, by position in `order`; unlisted values follow in
/// natural order.
pub fn explicit_order_cmp(a: &str, b: &str, order: &[String]) -> Ordering {
    let a_index = order.iter().position(|o| o == a);
    let b_index = order.iter().position(|o| o == b);
    match (a_index, b_index) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => natural_cmp(a, b),
    }
}

// ============================================================================
// COMPOSITE COMPARATOR
// ============================================================================

/// Everything the comparator of one axis reads.
#[derive(Clone, Copy)]
pub struct SortContext<'a> {
    pub axis: Axis,
    pub config: &'a ResolvedConfig,
    pub cube: &'a Cube,
}

enum SortMode<'a> {
    Natural,
    ByType,
    ByValues(&'a [String]),
    ByIndicator {
        indicator: Option<usize>,
        query: Vec<String>,
    },
    Custom(&'a KeyComparator),
}

struct DimensionSorter<'a> {
    field_index: usize,
    descending: bool,
    mode: SortMode<'a>,
}

fn element(key: &DimensionKey, index: usize) -> &str {
    key.get(index).map(String::as_str).unwrap_or("")
}

fn opposite(axis: Axis) -> Axis {
    match axis {
        Axis::Row => Axis::Column,
        Axis::Column => Axis::Row,
    }
}

impl<'a> SortContext<'a> {
    pub fn new(axis: Axis, config: &'a ResolvedConfig, cube: &'a Cube) -> Self {
        SortContext { axis, config, cube }
    }

    /// Completes a partial key on `axis` into its subtotal key.
    fn complete_key(&self, axis: Axis, mut parts: Vec<String>) -> String {
        let dims = self.config.dimensions(axis).len();
        let totals = self.config.totals(axis);
        if parts.len() < dims && self.config.labels_subtotal_keys() {
            let last = parts.last().map(String::as_str);
            if last != Some(totals.sub_total_label.as_str())
                && last != Some(totals.grand_total_label.as_str())
            {
                parts.push(totals.sub_total_label.clone());
            }
        }
        flat_key(&parts)
    }

    /// Key of the opposite axis used when a value lookup names no position.
    fn opposite_grand_total(&self) -> String {
        let other = opposite(self.axis);
        if self.config.dimensions(other).is_empty() {
            String::new()
        } else {
            self.config.totals(other).grand_total_label.clone()
        }
    }

    fn value_at(&self, own_key: String, other_key: &str, indicator: Option<usize>) -> Option<f64> {
        let indicator = indicator?;
        let aggregator = match self.axis {
            Axis::Row => self.cube.aggregator(&own_key, other_key, indicator),
            Axis::Column => self.cube.aggregator(other_key, &own_key, indicator),
        };
        aggregator.value()
    }

    fn sorters(&self) -> Vec<DimensionSorter<'a>> {
        let config = self.config;
        config
            .dimensions(self.axis)
            .iter()
            .enumerate()
            .map(|(field_index, field)| {
                let rule = config.sort_rules.iter().find(|r| &r.sort_field == field);
                let Some(rule) = rule else {
                    return DimensionSorter {
                        field_index,
                        descending: false,
                        mode: SortMode::Natural,
                    };
                };
                let mode = match &rule.method {
                    SortMethod::Natural => SortMode::Natural,
                    SortMethod::ByType => SortMode::ByType,
                    SortMethod::ByValues(order) => SortMode::ByValues(order),
                    SortMethod::Custom(comparator) => SortMode::Custom(comparator),
                    SortMethod::ByIndicator { indicator_key, query } => SortMode::ByIndicator {
                        indicator: config.indicator_index(indicator_key),
                        query: query.clone(),
                    },
                };
                DimensionSorter {
                    field_index,
                    descending: rule.sort_type == SortType::Desc,
                    mode,
                }
            })
            .collect()
    }

    /// Builds the dimension-by-dimension comparator for this axis.
    pub fn key_comparator(self) -> impl Fn(&DimensionKey, &DimensionKey) -> Ordering + 'a {
        let sorters = self.sorters();
        let dims = self.config.dimensions(self.axis).len();
        let other = opposite(self.axis);
        let grand_total = self.opposite_grand_total();

        let query_keys: Vec<Option<String>> = sorters
            .iter()
            .map(|sorter| match &sorter.mode {
                SortMode::ByIndicator { query, .. } if query.is_empty() => Some(grand_total.clone()),
                SortMode::ByIndicator { query, .. } => Some(self.complete_key(other, query.clone())),
                _ => None,
            })
            .collect();

        move |a: &DimensionKey, b: &DimensionKey| {
            for (sorter, query_key) in sorters.iter().zip(&query_keys) {
                let i = sorter.field_index;
                let (x, y) = (element(a, i), element(b, i));
                let ordering = match &sorter.mode {
                    SortMode::Natural => natural_cmp(x, y),
                    SortMode::ByType => type_cmp(x, y),
                    SortMode::ByValues(order) => explicit_order_cmp(x, y, order),
                    SortMode::Custom(comparator) => comparator.compare(x, y),
                    SortMode::ByIndicator { indicator, .. } => {
                        let prefix = |key: &DimensionKey| -> Vec<String> {
                            let end = if i + 1 < dims { i + 1 } else { key.len() };
                            key.iter().take(end).cloned().collect()
                        };
                        let other_key = query_key.as_deref().unwrap_or("");
                        natural_cmp_values(
                            self.value_at(self.complete_key(self.axis, prefix(a)), other_key, *indicator),
                            self.value_at(self.complete_key(self.axis, prefix(b)), other_key, *indicator),
                        )
                    }
                };
                if ordering != Ordering::Equal {
                    return if sorter.descending { ordering.reverse() } else { ordering };
                }
            }
            Ordering::Equal
        }
    }

    /// Orders keys by an indicator's value at the opposite grand total.
    fn value_order(&self, keys: &mut [DimensionKey], indicator_key: Option<&str>, descending: bool) {
        let indicator = match indicator_key {
            Some(key) => self.config.indicator_index(key),
            None => (!self.config.indicator_keys.is_empty()).then_some(0),
        };
        let other_key = self.opposite_grand_total();
        keys.sort_by(|a, b| {
            let ordering = natural_cmp_values(
                self.value_at(flat_key(a), &other_key, indicator),
                self.value_at(flat_key(b), &other_key, indicator),
            );
            if descending {
                ordering.reverse()
            } else {
                ordering
            }
        });
    }

    /// Sorts the key array of this axis per its order policy. Stable.
    pub fn sort(self, keys: &mut [DimensionKey]) {
        match self.config.order(self.axis) {
            AxisOrder::ValueAToZ { indicator_key } => {
                self.value_order(keys, indicator_key.as_deref(), false)
            }
            AxisOrder::ValueZToA { indicator_key } => {
                self.value_order(keys, indicator_key.as_deref(), true)
            }
            AxisOrder::KeyAToZ => {
                let comparator = self.key_comparator();
                keys.sort_by(|a, b| comparator(a, b));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::AggregatorRegistry;
    use crate::definition::{DatasetOptions, SortRule, Totals, TotalsOptions};
    use crate::totals::compute_totals;
    use crate::value::{dimension_key, record_from, DataValue};

    fn keys(values: &[&[&str]]) -> Vec<DimensionKey> {
        values
            .iter()
            .map(|k| k.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    fn create_test_cube(config: &ResolvedConfig) -> Cube {
        let registry = AggregatorRegistry::default();
        let mut cube = Cube::new();
        for (region, city, cat, sales) in [
            ("East", "Boston", "Chairs", 10.0),
            ("East", "NYC", "Chairs", 30.0),
            ("West", "LA", "Chairs", 25.0),
            ("West", "LA", "Tables", 1.0),
            ("North", "Oslo", "Tables", 100.0),
        ] {
            let record = record_from([
                ("region", DataValue::from(region)),
                ("city", DataValue::from(city)),
                ("cat", DataValue::from(cat)),
                ("sales", DataValue::from(sales)),
            ]);
            let row = flat_key(&dimension_key(&record, &config.rows));
            let col = flat_key(&dimension_key(&record, &config.columns));
            cube.cell_or_insert_with(&row, &col, 1, |i| registry.create(&config.aggregations[i]))[0]
                .push(&record);
        }
        compute_totals(&mut cube, config, &registry);
        cube
    }

    fn create_test_options() -> DatasetOptions {
        let mut options = DatasetOptions::new(["region", "city"], ["cat"], ["sales"]);
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
        options
    }

    #[test]
    fn test_natural_cmp() {
        assert_eq!(natural_cmp("item2", "item10"), Ordering::Less);
        assert_eq!(natural_cmp("10", "9"), Ordering::Greater);
        assert_eq!(natural_cmp("-10", "-5"), Ordering::Less);
        assert_eq!(natural_cmp("1.5", "1.25"), Ordering::Greater);
        assert_eq!(natural_cmp("apple", "banana"), Ordering::Less);
        assert_eq!(natural_cmp("a01", "a1"), Ordering::Less);
        assert_eq!(natural_cmp("same", "same"), Ordering::Equal);
    }

    #[test]
    fn test_natural_cmp_is_transitive() {
        let values = [
            "1f", "5", "1e3", "inf", "NaN", "-3", "+2", "1.5", "1.25", "1.9x", "1.", ".5", "a01",
            "a1", "item10", "item2", "", "10", "9x",
        ];
        for a in values {
            assert_eq!(natural_cmp(a, a), Ordering::Equal);
            for b in values {
                assert_eq!(natural_cmp(a, b), natural_cmp(b, a).reverse(), "{:?} vs {:?}", a, b);
                for c in values {
                    if natural_cmp(a, b) != Ordering::Greater && natural_cmp(b, c) != Ordering::Greater {
                        assert_ne!(natural_cmp(a, c), Ordering::Greater, "{:?} <= {:?} <= {:?}", a, b, c);
                    }
                }
            }
        }

        let mut forward: Vec<&str> = values.to_vec();
        let mut backward: Vec<&str> = values.iter().rev().copied().collect();
        forward.sort_by(|a, b| natural_cmp(a, b));
        backward.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(forward, backward);
        assert_eq!(&forward[..5], &["-3", "1.25", "1.5", "+2", "5"]);
    }

    #[test]
    fn test_exponent_and_inf_are_text() {
        assert_eq!(natural_cmp("5", "1e3"), Ordering::Less);
        assert_eq!(natural_cmp("1e3", "1f"), Ordering::Less);
        assert_eq!(natural_cmp("5", "1f"), Ordering::Less);
        assert_eq!(natural_cmp("100", "inf"), Ordering::Less);
    }

    #[test]
    fn test_type_and_explicit_order() {
        assert_eq!(type_cmp("", "a"), Ordering::Less);
        assert_eq!(type_cmp("b", "a"), Ordering::Greater);

        let order = vec!["West".to_string(), "East".to_string()];
        assert_eq!(explicit_order_cmp("West", "East", &order), Ordering::Less);
        assert_eq!(explicit_order_cmp("North", "East", &order), Ordering::Greater);
        assert_eq!(explicit_order_cmp("North", "Central", &order), Ordering::Greater);
    }

    #[test]
    fn test_missing_values_sort_first() {
        assert_eq!(natural_cmp_values(None, Some(-5.0)), Ordering::Less);
        assert_eq!(natural_cmp_values(Some(2.0), Some(1.0)), Ordering::Greater);
    }

    #[test]
    fn test_natural_key_order() {
        let config = ResolvedConfig::resolve(&create_test_options());
        let cube = create_test_cube(&config);
        let mut row_keys = keys(&[&["West", "LA"], &["East", "NYC"], &["East", "Boston"]]);
        SortContext::new(Axis::Row, &config, &cube).sort(&mut row_keys);
        assert_eq!(row_keys, keys(&[&["East", "Boston"], &["East", "NYC"], &["West", "LA"]]));
    }

    #[test]
    fn test_descending_explicit_rule() {
        let mut options = create_test_options();
        options.data_config.sort_rules =
            vec![SortRule::by_values("region", ["West", "East"]).descending()];
        let config = ResolvedConfig::resolve(&options);
        let cube = create_test_cube(&config);
        let mut row_keys = keys(&[&["West", "LA"], &["East", "Boston"], &["North", "Oslo"]]);
        SortContext::new(Axis::Row, &config, &cube).sort(&mut row_keys);
        assert_eq!(
            row_keys,
            keys(&[&["North", "Oslo"], &["East", "Boston"], &["West", "LA"]])
        );
    }

    #[test]
    fn test_sort_by_indicator_on_outer_dimension_uses_subtotals() {
        let mut options = create_test_options();
        options.data_config.sort_rules =
            vec![SortRule::by_indicator("region", "sales", ["Chairs"]).descending()];
        let config = ResolvedConfig::resolve(&options);
        let cube = create_test_cube(&config);
        let mut row_keys = keys(&[
            &["East", "Boston"],
            &["East", "NYC"],
            &["North", "Oslo"],
            &["West", "LA"],
        ]);
        SortContext::new(Axis::Row, &config, &cube).sort(&mut row_keys);
        // Chairs subtotals: East 40, West 25, North none.
        assert_eq!(
            row_keys,
            keys(&[
                &["East", "Boston"],
                &["East", "NYC"],
                &["West", "LA"],
                &["North", "Oslo"],
            ])
        );
    }

    #[test]
    fn test_value_order_reads_grand_total() {
        let mut options = DatasetOptions::new(["region"], ["cat"], ["sales"]);
        options.data_config.totals = Some(Totals {
            row: None,
            column: Some(TotalsOptions {
                show_grand_totals: true,
                ..Default::default()
            }),
        });
        options.data_config.row_order = AxisOrder::ValueZToA { indicator_key: None };
        let config = ResolvedConfig::resolve(&options);
        let cube = create_test_cube(&config);
        let mut row_keys = keys(&[&["East"], &["North"], &["West"]]);
        SortContext::new(Axis::Row, &config, &cube).sort(&mut row_keys);
        assert_eq!(row_keys, keys(&[&["North"], &["East"], &["West"]]));
    }

    #[test]
    fn test_custom_comparator() {
        let mut options = create_test_options();
        options.data_config.sort_rules = vec![SortRule::custom("region", |a, b| b.len().cmp(&a.len()))];
        let config = ResolvedConfig::resolve(&options);
        let cube = create_test_cube(&config);
        let mut row_keys = keys(&[&["East", "NYC"], &["North", "Oslo"]]);
        SortContext::new(Axis::Row, &config, &cube).sort(&mut row_keys);
        assert_eq!(row_keys, keys(&[&["North", "Oslo"], &["East", "NYC"]]));
    }
}
