//! Dense, name-addressed counters for ion series labels.
//!
//! An [`IonTypeIndex`] assigns every distinct ion type name a slot. Any
//! number of [`IonTypeAccumulator`]s can share one index (through an `Arc`),
//! and accumulators bound to the same index can be merged element-wise.

use fnv::FnvHashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::Error;

#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct IonTypeIndex {
    names: Vec<Arc<str>>,
    slots: FnvHashMap<Arc<str>, usize>,
}

impl IonTypeIndex {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut index = Self::default();
        for name in names {
            index.register(name.as_ref());
        }
        index
    }

    /// Return the slot for `name`, assigning the next free slot if the name
    /// has not been seen before
    pub fn register(&mut self, name: &str) -> usize {
        if let Some(&slot) = self.slots.get(name) {
            return slot;
        }
        let name: Arc<str> = Arc::from(name);
        let slot = self.names.len();
        self.names.push(name.clone());
        self.slots.insert(name, slot);
        slot
    }

    pub fn slot(&self, name: &str) -> Option<usize> {
        self.slots.get(name).copied()
    }

    pub fn names(&self) -> &[Arc<str>] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// One `f64` per slot of a shared [`IonTypeIndex`]
#[derive(Clone, Debug)]
pub struct IonTypeAccumulator {
    index: Arc<IonTypeIndex>,
    values: Box<[f64]>,
}

impl IonTypeAccumulator {
    pub fn new(index: Arc<IonTypeIndex>) -> Self {
        let values = vec![0.0; index.len()].into_boxed_slice();
        Self { index, values }
    }

    pub fn index(&self) -> &Arc<IonTypeIndex> {
        &self.index
    }

    fn slot(&self, name: &str) -> Result<usize, Error> {
        self.index
            .slot(name)
            .ok_or_else(|| Error::UnknownIonType(name.into()))
    }

    pub fn add(&mut self, name: &str, delta: f64) -> Result<(), Error> {
        let slot = self.slot(name)?;
        self.values[slot] += delta;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<f64, Error> {
        Ok(self.values[self.slot(name)?])
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    fn shares_index(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.index, &other.index) || self.index.names == other.index.names
    }

    /// Element-wise sum of `other` into `self`
    pub fn merge(&mut self, other: &Self) -> Result<(), Error> {
        if !self.shares_index(other) {
            return Err(Error::IndexMismatch);
        }
        for (lhs, rhs) in self.values.iter_mut().zip(other.values.iter()) {
            *lhs += rhs;
        }
        Ok(())
    }

    pub fn to_map(&self) -> BTreeMap<String, f64> {
        self.index
            .names
            .iter()
            .zip(self.values.iter())
            .map(|(name, value)| (name.to_string(), *value))
            .collect()
    }
}

impl Serialize for IonTypeAccumulator {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_map().serialize(serializer)
    }
}
