//! Per-frame result series.

use crate::core::parallel::{CommError, ReduceOp, World};
use slotmap::{SlotMap, new_key_type};
use thiserror::Error;
use tracing::info;

new_key_type! {
    pub struct DataSetId;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DataSetError {
    #[error("Data set '{0}' already exists")]
    Duplicate(String),
    #[error("Frame {frame} is outside data set '{name}' ({len} frames)")]
    OutOfRange {
        name: String,
        frame: usize,
        len: usize,
    },
    #[error("Unknown data set")]
    Unknown,
}

/// A named series indexed by global frame number.
#[derive(Debug, Clone)]
pub struct DataSet {
    name: String,
    values: Vec<f64>,
    present: Vec<bool>,
}

impl DataSet {
    fn new(name: &str, len: usize) -> Self {
        Self {
            name: name.to_string(),
            values: vec![0.0; len],
            present: vec![false; len],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Capacity in frames.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of frames that hold a value.
    pub fn count(&self) -> usize {
        self.present.iter().filter(|&&p| p).count()
    }

    pub fn get(&self, frame: usize) -> Option<f64> {
        self.present
            .get(frame)
            .copied()
            .unwrap_or(false)
            .then(|| self.values[frame])
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.present
            .iter()
            .zip(&self.values)
            .enumerate()
            .filter_map(|(i, (&p, &v))| p.then_some((i, v)))
    }

    pub fn mean(&self) -> Option<f64> {
        let n = self.count();
        (n > 0).then(|| self.iter().map(|(_, v)| v).sum::<f64>() / n as f64)
    }

    fn resize(&mut self, len: usize) {
        self.values.resize(len, 0.0);
        self.present.resize(len, false);
    }
}

#[derive(Debug, Default)]
pub struct DataSetList {
    sets: SlotMap<DataSetId, DataSet>,
    order: Vec<DataSetId>,
    max: usize,
}

impl DataSetList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the frame capacity of every current and future set.
    pub fn set_max(&mut self, max: usize) {
        self.max = max;
        for set in self.sets.values_mut() {
            set.resize(max);
        }
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn add(&mut self, name: &str) -> Result<DataSetId, DataSetError> {
        if self.find(name).is_some() {
            return Err(DataSetError::Duplicate(name.to_string()));
        }
        let id = self.sets.insert(DataSet::new(name, self.max));
        self.order.push(id);
        Ok(id)
    }

    pub fn find(&self, name: &str) -> Option<DataSetId> {
        self.order
            .iter()
            .copied()
            .find(|&id| self.sets[id].name == name)
    }

    pub fn get(&self, id: DataSetId) -> Option<&DataSet> {
        self.sets.get(id)
    }

    pub fn set(&mut self, id: DataSetId, frame: usize, value: f64) -> Result<(), DataSetError> {
        let set = self.sets.get_mut(id).ok_or(DataSetError::Unknown)?;
        if frame >= set.len() {
            return Err(DataSetError::OutOfRange {
                name: set.name.clone(),
                frame,
                len: set.len(),
            });
        }
        set.values[frame] = value;
        set.present[frame] = true;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Sets in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (DataSetId, &DataSet)> + '_ {
        self.order.iter().map(|&id| (id, &self.sets[id]))
    }

    /// Merges every set across ranks so all ranks end up with the union of their frames.
    ///
    /// Ranks write disjoint global frame indices, so a sum of values and a max of presence
    /// flags reproduces every value exactly. Collective: every rank must call it with the
    /// same sets in the same order.
    pub fn sync(&mut self, world: &World) -> Result<(), CommError> {
        if world.size() == 1 {
            return Ok(());
        }
        for &id in &self.order {
            let set = &mut self.sets[id];
            let flags: Vec<u64> = set.present.iter().map(|&p| u64::from(p)).collect();
            let flags = world.all_reduce(&flags, ReduceOp::Max)?;
            set.values = world.all_reduce(&set.values, ReduceOp::Sum)?;
            set.present = flags.into_iter().map(|f| f > 0).collect();
        }
        Ok(())
    }

    pub fn info(&self) {
        info!(count = self.len(), "Data sets:");
        for (_, set) in self.iter() {
            match set.mean() {
                Some(mean) => info!("  {} ({} frames, mean {mean:.4})", set.name, set.count()),
                None => info!("  {} (empty)", set.name),
            }
        }
    }
}
