//! Aggregate context map (spec §4.5.1/§4.6.2): one `AggregateContext` per
//! `GROUP BY` (or whole-table aggregate) in a program, holding one
//! accumulator slot per aggregate expression for every distinct group key,
//! plus an iteration cursor so the finalize/emit pass (`AggIterate`/
//! `AggNext`/`AggKey`) can walk groups in key order.
//!
//! Grounded on `udf::Context`'s per-group accumulator slot (C7), lifted from
//! "one accumulator" to "one accumulator per group per aggregate
//! expression" the way the teacher's `functions/aggregate.rs::AggregateState`
//! is threaded per-row in the old btree-cursor engine.

use std::any::Any;
use std::collections::BTreeMap;

use crate::value::Value;

/// The accumulators for one GROUP BY group: one slot per aggregate
/// expression the statement computes (`AggStep`'s `p1` selects which slot).
#[derive(Default)]
pub struct GroupState {
    pub key_values: Vec<Value>,
    pub accumulators: Vec<Option<Box<dyn Any + Send>>>,
}

impl GroupState {
    fn new(key_values: Vec<Value>, num_aggregates: usize) -> Self {
        GroupState {
            key_values,
            accumulators: (0..num_aggregates).map(|_| None).collect(),
        }
    }
}

/// One aggregate context, addressed by the compiler-assigned index the
/// `p1` operand of `AggStep`/`AggFinal`/`AggReset`/`AggIterate`/`AggNext`/
/// `AggGroupValue`/`AggContext` carries.
pub struct AggregateContext {
    num_aggregates: usize,
    groups: BTreeMap<Vec<u8>, GroupState>,
    current_key: Option<Vec<u8>>,
    iter_key: Option<Vec<u8>>,
}

impl AggregateContext {
    pub fn new(num_aggregates: usize) -> Self {
        AggregateContext {
            num_aggregates,
            groups: BTreeMap::new(),
            current_key: None,
            iter_key: None,
        }
    }

    pub fn reset(&mut self) {
        self.groups.clear();
        self.current_key = None;
        self.iter_key = None;
    }

    /// Select (creating if absent) the group keyed by `key`/`key_values` as
    /// the target of subsequent `step`/`finalize` calls.
    pub fn select_group(&mut self, key: Vec<u8>, key_values: Vec<Value>) {
        self.groups.entry(key.clone()).or_insert_with(|| GroupState::new(key_values, self.num_aggregates));
        self.current_key = Some(key);
    }

    pub fn current_group_mut(&mut self) -> Option<&mut GroupState> {
        let key = self.current_key.clone()?;
        self.groups.get_mut(&key)
    }

    pub fn iterate_first(&mut self) -> bool {
        self.iter_key = self.groups.keys().next().cloned();
        self.iter_key.is_some()
    }

    pub fn iterate_next(&mut self) -> bool {
        let Some(key) = &self.iter_key else { return false };
        self.iter_key = self.groups.range((std::ops::Bound::Excluded(key.clone()), std::ops::Bound::Unbounded)).next().map(|(k, _)| k.clone());
        self.iter_key.is_some()
    }

    pub fn iter_group(&self) -> Option<&GroupState> {
        let key = self.iter_key.as_ref()?;
        self.groups.get(key)
    }

    pub fn iter_group_mut(&mut self) -> Option<&mut GroupState> {
        let key = self.iter_key.clone()?;
        self.groups.get_mut(&key)
    }

    /// Select the group currently under iteration (`AggIterate`/`AggNext`)
    /// as the target for `AggFinal` during the emit pass.
    pub fn focus_iter_group(&mut self) {
        self.current_key = self.iter_key.clone();
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
