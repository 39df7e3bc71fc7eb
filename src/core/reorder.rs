//! Dense ordering of workflow items.
//!
//! Stages and sub-stages carry a 1-based `order_index`. Moving an item is modelled as
//! a pure list operation followed by a full renumbering, so the result is always a
//! dense permutation of `1..=N` no matter what state the input was in.

use crate::entities::{stage, sub_stage};

/// An item with an id and a position in an ordered list.
pub trait Ordered {
    /// Primary key of the item
    fn id(&self) -> i64;
    /// Current position
    fn order_index(&self) -> i32;
    /// Overwrites the position
    fn set_order_index(&mut self, index: i32);
}

impl Ordered for stage::Model {
    fn id(&self) -> i64 {
        self.id
    }

    fn order_index(&self) -> i32 {
        self.order_index
    }

    fn set_order_index(&mut self, index: i32) {
        self.order_index = index;
    }
}

impl Ordered for sub_stage::Model {
    fn id(&self) -> i64 {
        self.id
    }

    fn order_index(&self) -> i32 {
        self.order_index
    }

    fn set_order_index(&mut self, index: i32) {
        self.order_index = index;
    }
}

/// Sorts by `order_index`. Ties keep their input order.
pub fn sort_by_order<T: Ordered>(items: &mut [T]) {
    items.sort_by_key(Ordered::order_index);
}

/// Rewrites positions to `1..=N` following the current slice order.
pub fn renumber<T: Ordered>(items: &mut [T]) {
    for (position, item) in (1..).zip(items.iter_mut()) {
        item.set_order_index(position);
    }
}

/// Position for an item appended after `items`.
pub fn next_order_index<T: Ordered>(items: &[T]) -> i32 {
    items
        .iter()
        .map(Ordered::order_index)
        .max()
        .unwrap_or(0)
        .saturating_add(1)
}

/// Moves the item at `from` so it ends up at index `to`, then renumbers the whole
/// list. Indexes past the end are clamped.
#[must_use]
pub fn reorder<T: Ordered>(mut items: Vec<T>, from: usize, to: usize) -> Vec<T> {
    if from < items.len() {
        let moved = items.remove(from);
        let to = to.min(items.len());
        items.insert(to, moved);
    }
    renumber(&mut items);
    items
}

/// Moves `dragged_id` into the position currently held by `target_id`.
///
/// The input is sorted by `order_index` first. Returns `None` when either id is not
/// part of the list.
#[must_use]
pub fn move_to_target<T: Ordered>(mut items: Vec<T>, dragged_id: i64, target_id: i64) -> Option<Vec<T>> {
    sort_by_order(&mut items);
    let from = items.iter().position(|item| item.id() == dragged_id)?;
    let to = items.iter().position(|item| item.id() == target_id)?;
    Some(reorder(items, from, to))
}

/// Whether positions form exactly `1..=N`.
#[must_use]
pub fn is_dense<T: Ordered>(items: &[T]) -> bool {
    let mut indices: Vec<i32> = items.iter().map(Ordered::order_index).collect();
    indices.sort_unstable();
    indices.into_iter().eq(1..=i32::try_from(items.len()).unwrap_or(i32::MAX))
}
