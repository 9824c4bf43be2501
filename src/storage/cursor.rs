//! Merge-scan cursor (spec §4.4.5): materializes qualifying keys at open
//! time by walking the layer chain from the connection's active layer to the
//! base, then re-looks-up nothing further since rows are captured eagerly —
//! tolerant of concurrent mutation by the same connection during iteration.

use std::collections::BTreeMap;

use crate::storage::layer::{EncodedKey, Layer, LayerRef, Modification, RowTuple};
use crate::value::{Collation, Value};
use crate::vtab::ScanPlan;

/// Collect, for one index (`None` = primary), the topmost modification for
/// every key reachable from `start`, child layers winning over parents.
fn materialize(start: &LayerRef, index_name: Option<&str>) -> BTreeMap<EncodedKey, Modification> {
    let mut result: BTreeMap<EncodedKey, Modification> = BTreeMap::new();
    let mut layer = start.clone();
    loop {
        match &*layer {
            Layer::Transaction(t) => {
                let mods = match index_name {
                    None => t.primary_mods.lock().unwrap().clone(),
                    Some(idx) => t.secondary_mods.lock().unwrap().get(idx).cloned().unwrap_or_default(),
                };
                for (k, v) in mods {
                    result.entry(k).or_insert(v);
                }
                let parent = t.parent.clone();
                layer = parent;
            }
            Layer::Base(base) => {
                let base = base.lock().unwrap();
                match index_name {
                    None => {
                        for (k, row) in base.primary.iter() {
                            result.entry(k.clone()).or_insert_with(|| Modification::Upsert(row.clone()));
                        }
                    }
                    Some(idx) => {
                        if let Some(map) = base.secondary.get(idx) {
                            for (k, row) in map.iter() {
                                result.entry(k.clone()).or_insert_with(|| Modification::Upsert(row.clone()));
                            }
                        }
                    }
                }
                break;
            }
        }
    }
    result
}

/// Encode a scan bound using the same single-field convention as the key
/// being scanned (spec §4.4.5 only requires range bounds on an index's
/// first column, which for a single-column key is the whole key).
fn encode_bound(value: &Value, descending: bool, collation: Collation) -> EncodedKey {
    crate::value::serialize_key(std::slice::from_ref(value), &[descending], &[collation])
}

/// Run `plan` against the layer chain rooted at `from`, returning rows in
/// the plan's requested order.
pub fn scan(from: &LayerRef, plan: &ScanPlan, collation: Collation) -> Vec<RowTuple> {
    let materialized = materialize(from, plan.index_name.as_deref());

    let rows: Vec<RowTuple> = if let Some(eq) = &plan.equality_key {
        if eq.len() == 1 {
            let target = encode_bound(&eq[0], plan.descending, collation);
            materialized
                .range(target.clone()..)
                .take_while(|(k, _)| key_prefix_matches(k, &target))
                .filter_map(|(_, m)| m.row().cloned())
                .collect()
        } else {
            Vec::new()
        }
    } else {
        let lower = plan.lower_bound.as_ref().map(|v| encode_bound(v, plan.descending, collation));
        let upper = plan.upper_bound.as_ref().map(|v| encode_bound(v, plan.descending, collation));
        materialized
            .iter()
            .filter(|(k, _)| lower.as_ref().map(|l| *k >= l).unwrap_or(true))
            .filter(|(k, _)| upper.as_ref().map(|u| *k <= u).unwrap_or(true))
            .filter_map(|(_, m)| m.row().cloned())
            .collect()
    };

    if plan.descending {
        rows.into_iter().rev().collect()
    } else {
        rows
    }
}

fn key_prefix_matches(key: &EncodedKey, prefix: &EncodedKey) -> bool {
    key.len() >= prefix.len() && &key[..prefix.len()] == prefix.as_slice()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::layer::{encode_rowid, Layer};

    fn base_with_rows(rows: &[(i64, &str)]) -> LayerRef {
        let base = Layer::new_base(true);
        if let Layer::Base(b) = &*base {
            let mut b = b.lock().unwrap();
            for (rowid, text) in rows {
                b.primary.insert(
                    encode_rowid(*rowid),
                    (*rowid, vec![Value::Integer(*rowid), Value::Text((*text).to_string())]),
                );
            }
        }
        base
    }

    #[test]
    fn full_scan_returns_all_rows_in_order() {
        let base = base_with_rows(&[(1, "a"), (2, "b"), (3, "c")]);
        let plan = ScanPlan {
            index_name: None,
            descending: false,
            equality_key: None,
            lower_bound: None,
            upper_bound: None,
            idx_num: 0,
            idx_str: None,
        };
        let rows = scan(&base, &plan, Collation::Binary);
        assert_eq!(rows.iter().map(|r| r.0).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn descending_scan_reverses_order() {
        let base = base_with_rows(&[(1, "a"), (2, "b"), (3, "c")]);
        let plan = ScanPlan {
            index_name: None,
            descending: true,
            equality_key: None,
            lower_bound: None,
            upper_bound: None,
            idx_num: 0,
            idx_str: None,
        };
        let rows = scan(&base, &plan, Collation::Binary);
        assert_eq!(rows.iter().map(|r| r.0).collect::<Vec<_>>(), vec![3, 2, 1]);
    }

    #[test]
    fn equality_scan_finds_single_row() {
        let base = base_with_rows(&[(1, "a"), (2, "b"), (3, "c")]);
        let plan = ScanPlan {
            index_name: None,
            descending: false,
            equality_key: Some(vec![Value::Integer(2)]),
            lower_bound: None,
            upper_bound: None,
            idx_num: 0,
            idx_str: None,
        };
        let rows = scan(&base, &plan, Collation::Binary);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, 2);
    }
}
