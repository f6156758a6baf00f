//! FILENAME: pivot-dataset/src/zero_align.rs
//! Zero alignment of paired measure ranges for dual-axis charts.

use crate::collect::{CollectedValue, CollectedValues, FieldCollection, ValueRange};

/// Range used for a group missing from one side of a pair.
const MISSING_RANGE: ValueRange = ValueRange { min: 0.0, max: 1.0 };

/// Suffix of the collected field holding aligned ranges.
pub const ALIGN_SUFFIX: &str = "_align";

fn usable(range: &ValueRange) -> bool {
    range.min.is_finite() && range.max.is_finite() && range.min < range.max
}

/// Smallest span `L` with `[-p * L, (1 - p) * L]` covering `range`.
fn span(range: &ValueRange, p: f64) -> f64 {
    if p <= 0.0 {
        range.max
    } else if p >= 1.0 {
        -range.min
    } else {
        (-range.min / p).max(range.max / (1.0 - p))
    }
}

/// Widens two ranges so that zero sits at the same relative height in both.
/// Returns `None` for a degenerate or non-finite input.
pub fn align_zero(first: ValueRange, second: ValueRange) -> Option<(ValueRange, ValueRange)> {
    if !usable(&first) || !usable(&second) {
        return None;
    }

    let widen = |r: ValueRange| ValueRange::new(r.min.min(0.0), r.max.max(0.0));
    let (a, b) = (widen(first), widen(second));
    let zero_fraction = |r: &ValueRange| -r.min / (r.max - r.min);
    let (pa, pb) = (zero_fraction(&a), zero_fraction(&b));

    let mut p = pa.max(pb);
    if p >= 1.0 && (a.max > 0.0 || b.max > 0.0) {
        p = (pa + pb) / 2.0;
    }

    let scaled = |r: &ValueRange| {
        let l = span(r, p);
        ValueRange::new(-p * l, (1.0 - p) * l)
    };
    let (a, b) = (scaled(&a), scaled(&b));
    if !(usable(&a) && usable(&b)) {
        return None;
    }
    Some((a, b))
}

/// Stores aligned ranges for every two-field measure under `<field>_align`.
/// Groups that cannot be aligned keep their original ranges.
pub fn align_collected(collected: &mut CollectedValues, pairs: &[(String, String)]) {
    for (first, second) in pairs {
        let first_values = collected.get(first);
        let second_values = collected.get(second);
        let mut group_keys: Vec<String> = first_values
            .into_iter()
            .chain(second_values)
            .flat_map(|groups| groups.keys().cloned())
            .collect();
        group_keys.sort();
        group_keys.dedup();

        let lookup = |groups: Option<&FieldCollection>, key: &str| {
            groups
                .and_then(|g| g.get(key))
                .and_then(CollectedValue::range)
                .unwrap_or(MISSING_RANGE)
        };

        let mut first_aligned = FieldCollection::default();
        let mut second_aligned = FieldCollection::default();
        for key in group_keys {
            let r1 = lookup(first_values, &key);
            let r2 = lookup(second_values, &key);
            let (a, b) = align_zero(r1, r2).unwrap_or_else(|| {
                log::debug!(
                    target: "PIVOT",
                    "zero align of '{}'/'{}' skipped for group {:?}",
                    first,
                    second,
                    key
                );
                (r1, r2)
            });
            first_aligned.insert(key.clone(), CollectedValue::Range(a));
            second_aligned.insert(key, CollectedValue::Range(b));
        }

        collected.insert(format!("{}{}", first, ALIGN_SUFFIX), first_aligned);
        collected.insert(format!("{}{}", second, ALIGN_SUFFIX), second_aligned);
    }
}
