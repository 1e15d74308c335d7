//! Observable sequences.
//!
//! Per-index reads and writes are never tracked. Instead the seven mutating
//! operations (`push`, `pop`, `shift`, `unshift`, `splice`, `sort`,
//! `reverse`) report to the array's container-level dependency node once the
//! array has been observed, after making any inserted elements reactive.

use std::cell::{Cell, OnceCell, RefCell};
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use super::Value;
use crate::reactive::{observe, Observer};

/// A shared, growable sequence of values.
///
/// Cloning an `Array` clones the handle, not the contents.
#[derive(Clone)]
pub struct Array(Rc<ArrayInner>);

struct ArrayInner {
    items: RefCell<Vec<Value>>,
    observer: OnceCell<Rc<Observer>>,
    extensible: Cell<bool>,
    frozen: Cell<bool>,
}

impl Array {
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    pub fn from_vec(items: Vec<Value>) -> Self {
        Self(Rc::new(ArrayInner {
            items: RefCell::new(items),
            observer: OnceCell::new(),
            extensible: Cell::new(true),
            frozen: Cell::new(false),
        }))
    }

    pub fn len(&self) -> usize {
        self.0.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Untracked index read. Out of range reads as `Undefined`.
    pub fn get(&self, index: usize) -> Value {
        self.0.items.borrow().get(index).cloned().unwrap_or_default()
    }

    /// Snapshot of the current elements.
    pub fn to_vec(&self) -> Vec<Value> {
        self.0.items.borrow().clone()
    }

    /// Raw index assignment. Grows the array with `Undefined` holes when
    /// needed. Does not notify and does not observe the new element.
    pub fn set_index(&self, index: usize, value: Value) {
        if self.is_frozen() {
            return;
        }
        let mut items = self.0.items.borrow_mut();
        if index >= items.len() {
            if !self.is_extensible() {
                return;
            }
            items.resize(index + 1, Value::Undefined);
        }
        items[index] = value;
    }

    /// Raw length assignment. Does not notify.
    pub fn set_len(&self, len: usize) {
        if self.is_frozen() || (len > self.len() && !self.is_extensible()) {
            return;
        }
        self.0.items.borrow_mut().resize(len, Value::Undefined);
    }

    /// Append one element. Returns the new length.
    pub fn push(&self, value: Value) -> usize {
        self.extend(std::iter::once(value))
    }

    /// Append elements. Returns the new length.
    pub fn extend<I: IntoIterator<Item = Value>>(&self, values: I) -> usize {
        if !self.is_growable() {
            return self.len();
        }
        let inserted: Vec<Value> = values.into_iter().collect();
        let len = {
            let mut items = self.0.items.borrow_mut();
            items.extend(inserted.iter().cloned());
            items.len()
        };
        self.mutated(&inserted);
        len
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Value {
        if self.is_frozen() {
            return Value::Undefined;
        }
        let popped = self.0.items.borrow_mut().pop();
        self.mutated(&[]);
        popped.unwrap_or_default()
    }

    /// Remove and return the first element.
    pub fn shift(&self) -> Value {
        if self.is_frozen() {
            return Value::Undefined;
        }
        let shifted = {
            let mut items = self.0.items.borrow_mut();
            (!items.is_empty()).then(|| items.remove(0))
        };
        self.mutated(&[]);
        shifted.unwrap_or_default()
    }

    /// Prepend elements, keeping their order. Returns the new length.
    pub fn unshift<I: IntoIterator<Item = Value>>(&self, values: I) -> usize {
        if !self.is_growable() {
            return self.len();
        }
        let inserted: Vec<Value> = values.into_iter().collect();
        let len = {
            let mut items = self.0.items.borrow_mut();
            items.splice(0..0, inserted.iter().cloned());
            items.len()
        };
        self.mutated(&inserted);
        len
    }

    /// Remove `delete_count` elements starting at `start` and insert `values`
    /// in their place. Both bounds are clamped to the array. Returns the
    /// removed elements.
    pub fn splice<I: IntoIterator<Item = Value>>(
        &self,
        start: usize,
        delete_count: usize,
        values: I,
    ) -> Vec<Value> {
        if self.is_frozen() {
            return Vec::new();
        }
        let inserted: Vec<Value> = values.into_iter().collect();
        let removed: Vec<Value> = {
            let mut items = self.0.items.borrow_mut();
            let start = start.min(items.len());
            let end = start.saturating_add(delete_count).min(items.len());
            if inserted.len() > end - start && !self.is_extensible() {
                return Vec::new();
            }
            items.splice(start..end, inserted.iter().cloned()).collect()
        };
        self.mutated(&inserted);
        removed
    }

    /// Sort by loose string conversion, `Undefined` last.
    pub fn sort(&self) {
        self.sort_by(|a, b| match (a, b) {
            (Value::Undefined, Value::Undefined) => Ordering::Equal,
            (Value::Undefined, _) => Ordering::Greater,
            (_, Value::Undefined) => Ordering::Less,
            _ => a.to_string().cmp(&b.to_string()),
        });
    }

    /// Stable sort with a comparator.
    pub fn sort_by<F>(&self, mut compare: F)
    where
        F: FnMut(&Value, &Value) -> Ordering,
    {
        if self.is_frozen() {
            return;
        }
        // The comparator may read this array, or panic; sort a copy outside the borrow.
        let mut items = self.to_vec();
        items.sort_by(&mut compare);
        *self.0.items.borrow_mut() = items;
        self.mutated(&[]);
    }

    pub fn reverse(&self) {
        if self.is_frozen() {
            return;
        }
        self.0.items.borrow_mut().reverse();
        self.mutated(&[]);
    }

    pub fn freeze(&self) {
        self.0.frozen.set(true);
        self.0.extensible.set(false);
    }

    pub fn prevent_extensions(&self) {
        self.0.extensible.set(false);
    }

    pub fn is_frozen(&self) -> bool {
        self.0.frozen.get()
    }

    pub fn is_extensible(&self) -> bool {
        self.0.extensible.get()
    }

    pub fn ptr_eq(&self, other: &Array) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    pub fn observer(&self) -> Option<Rc<Observer>> {
        self.0.observer.get().cloned()
    }

    pub(crate) fn attach_observer(&self, observer: Rc<Observer>) -> Rc<Observer> {
        self.0.observer.get_or_init(|| observer).clone()
    }

    fn is_growable(&self) -> bool {
        !self.is_frozen() && self.is_extensible()
    }

    /// Observe inserted elements, then notify the container node.
    fn mutated(&self, inserted: &[Value]) {
        let Some(observer) = self.observer() else {
            return;
        };
        for value in inserted {
            observe(value, false);
        }
        observer.dep().notify();
    }
}

impl Default for Array {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<Value> for Array {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Array")
            .field("len", &self.len())
            .field("observed", &self.0.observer.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbers(array: &Array) -> Vec<f64> {
        array.to_vec().iter().filter_map(Value::as_f64).collect()
    }

    #[test]
    fn splice_clamps_and_returns_removed() {
        let array: Array = (1..=5).map(Value::from).collect();

        let removed = array.splice(1, 2, [Value::from(9)]);

        assert_eq!(removed, [Value::from(2), Value::from(3)]);
        assert_eq!(numbers(&array), [1.0, 9.0, 4.0, 5.0]);
        assert!(array.splice(10, 3, []).is_empty());
    }

    #[test]
    fn unshift_keeps_argument_order() {
        let array: Array = [Value::from(3)].into_iter().collect();
        assert_eq!(array.unshift([Value::from(1), Value::from(2)]), 3);
        assert_eq!(numbers(&array), [1.0, 2.0, 3.0]);
    }

    #[test]
    fn default_sort_compares_as_strings() {
        let array: Array = [10, 9, 1].into_iter().map(Value::from).collect();
        array.sort();
        assert_eq!(numbers(&array), [1.0, 10.0, 9.0]);
    }

    #[test]
    fn comparator_may_read_the_array() {
        let array: Array = [3, 1, 2].into_iter().map(Value::from).collect();
        let peek = array.clone();
        array.sort_by(|a, b| {
            let _ = peek.len();
            a.as_f64().partial_cmp(&b.as_f64()).unwrap_or(Ordering::Equal)
        });
        assert_eq!(numbers(&array), [1.0, 2.0, 3.0]);
    }

    #[test]
    fn panicking_comparator_keeps_every_element() {
        let array: Array = [3, 1, 2].into_iter().map(Value::from).collect();
        let sorting = array.clone();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            sorting.sort_by(|_, _| panic!("comparator failed"));
        }));

        assert!(result.is_err());
        assert_eq!(numbers(&array), [3.0, 1.0, 2.0]);
    }

    #[test]
    fn set_index_fills_holes() {
        let array = Array::new();
        array.set_index(2, 7.into());
        assert_eq!(array.len(), 3);
        assert_eq!(array.get(0), Value::Undefined);
        assert_eq!(array.get(2), Value::from(7));
    }

    #[test]
    fn frozen_arrays_ignore_mutators() {
        let array: Array = [1, 2].into_iter().map(Value::from).collect();
        array.freeze();

        array.push(3.into());
        array.pop();
        array.reverse();

        assert_eq!(numbers(&array), [1.0, 2.0]);
    }
}
