//! Append-only, index-addressed observation storage.
//!
//! Slots may be tombstoned by [`ObservationStore::remove`], but indices are never
//! reused or shifted, so trees and tracks built over a snapshot keep pointing at
//! the same detections for as long as the store lives.

use log::warn;

use crate::{
    constants::ObsIndex,
    linker_errors::LinkerError,
    observations::{Observation, ObservationRecord},
};

#[derive(Debug, Clone, Default)]
pub struct ObservationStore {
    slots: Vec<Option<Observation>>,
    live: usize,
}

impl ObservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        ObservationStore {
            slots: Vec::with_capacity(capacity),
            live: 0,
        }
    }

    /// Build a store from validated records, failing on the first malformed one.
    ///
    /// Arguments
    /// ---------
    /// * `records`: ingestion tuples in input order; record `i` lands at index `i`
    ///
    /// Return
    /// ------
    /// * the populated store, or the [`LinkerError`] of the first bad record
    pub fn from_records<I>(records: I) -> Result<Self, LinkerError>
    where
        I: IntoIterator<Item = ObservationRecord>,
    {
        let mut store = ObservationStore::new();
        for (i, rec) in records.into_iter().enumerate() {
            store.push(rec.into_observation(i)?);
        }
        Ok(store)
    }

    /// Build a store from records, skipping malformed ones.
    ///
    /// Skipped records are reported through `log::warn!` and leave no slot behind,
    /// so indices are dense over the accepted records only.
    pub fn from_records_lossy<I>(records: I) -> Self
    where
        I: IntoIterator<Item = ObservationRecord>,
    {
        let mut store = ObservationStore::new();
        for (i, rec) in records.into_iter().enumerate() {
            match rec.into_observation(i) {
                Ok(obs) => {
                    store.push(obs);
                }
                Err(e) => warn!("skipping observation record: {e}"),
            }
        }
        store
    }

    /// Append an observation and return its index.
    pub fn push(&mut self, obs: Observation) -> ObsIndex {
        self.slots.push(Some(obs));
        self.live += 1;
        self.slots.len() - 1
    }

    /// Replace the observation at `index`, filling it if it was tombstoned.
    ///
    /// Return
    /// ------
    /// * the previous occupant, if any
    pub fn set(
        &mut self,
        index: ObsIndex,
        obs: Observation,
    ) -> Result<Option<Observation>, LinkerError> {
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(LinkerError::ObservationNotFound(index))?;
        let previous = slot.replace(obs);
        if previous.is_none() {
            self.live += 1;
        }
        Ok(previous)
    }

    /// Tombstone the observation at `index`. The index stays reserved.
    pub fn remove(&mut self, index: ObsIndex) -> Option<Observation> {
        let removed = self.slots.get_mut(index).and_then(Option::take);
        if removed.is_some() {
            self.live -= 1;
        }
        removed
    }

    #[inline]
    pub fn get(&self, index: ObsIndex) -> Option<&Observation> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn try_get(&self, index: ObsIndex) -> Result<&Observation, LinkerError> {
        self.get(index).ok_or(LinkerError::ObservationNotFound(index))
    }

    /// Access an observation that the caller knows to be live.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range or tombstoned; indices handed to the search
    /// core always come from a snapshot of live slots, so this signals a bug.
    #[inline]
    pub fn obs(&self, index: ObsIndex) -> &Observation {
        match self.slots.get(index) {
            Some(Some(obs)) => obs,
            Some(None) => panic!("observation {index} has been removed from the store"),
            None => panic!(
                "observation index {index} out of range (store holds {} slots)",
                self.slots.len()
            ),
        }
    }

    /// Number of slots, tombstones included.
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn num_live(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Indices of every live observation, ascending.
    pub fn live_indices(&self) -> Vec<ObsIndex> {
        self.iter().map(|(i, _)| i).collect()
    }

    /// Iterate over `(index, observation)` pairs of live slots.
    pub fn iter(&self) -> impl Iterator<Item = (ObsIndex, &Observation)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|obs| (i, obs)))
    }

    /// External identities of the given observations, in the given order.
    pub fn identities(&self, indices: &[ObsIndex]) -> Vec<String> {
        indices.iter().map(|&i| self.obs(i).id.clone()).collect()
    }
}

impl FromIterator<Observation> for ObservationStore {
    fn from_iter<T: IntoIterator<Item = Observation>>(iter: T) -> Self {
        let mut store = ObservationStore::new();
        for obs in iter {
            store.push(obs);
        }
        store
    }
}
