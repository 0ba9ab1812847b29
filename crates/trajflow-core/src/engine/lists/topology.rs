use super::super::args::{ArgError, ArgList};
use super::super::dispatch::DispatchError;
use crate::core::models::topology::Topology;
use crate::core::topology::{self, TopologyError};
use std::path::Path;
use tracing::info;

/// Loaded topologies in load order; a topology's index in the list is its `pindex`.
#[derive(Debug, Default)]
pub struct TopologyList {
    topologies: Vec<Topology>,
}

impl TopologyList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, path: impl AsRef<Path>) -> Result<usize, TopologyError> {
        let mut loaded = topology::load(path)?;
        let pindex = self.topologies.len();
        loaded.pindex = pindex;
        info!(pindex, "Loaded topology {loaded}");
        self.topologies.push(loaded);
        Ok(pindex)
    }

    /// Adds an already-built topology, assigning its `pindex`.
    pub fn push(&mut self, mut topology: Topology) -> usize {
        let pindex = self.topologies.len();
        topology.pindex = pindex;
        self.topologies.push(topology);
        pindex
    }

    pub fn get(&self, pindex: usize) -> Option<&Topology> {
        self.topologies.get(pindex)
    }

    pub fn get_mut(&mut self, pindex: usize) -> Option<&mut Topology> {
        self.topologies.get_mut(pindex)
    }

    pub fn len(&self) -> usize {
        self.topologies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topologies.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Topology> {
        self.topologies.iter()
    }

    /// Finds a topology by file name or by the path it was loaded from.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.topologies
            .iter()
            .position(|t| t.name() == name || t.path() == Path::new(name))
    }

    /// Resolves an explicit `parm <name>` or `parmindex <i>` from `args`, if either is given.
    pub fn resolve_explicit(&self, args: &mut ArgList) -> Result<Option<usize>, DispatchError> {
        let name = args.key_string("parm")?;
        let index = args
            .key_string("parmindex")?
            .map(|value| {
                value.parse::<i64>().map_err(|_| ArgError::InvalidNumber {
                    key: "parmindex".into(),
                    value,
                })
            })
            .transpose()?;
        if name.is_none() && index.is_none() {
            return Ok(None);
        }
        if self.topologies.is_empty() {
            return Err(DispatchError::NoTopology);
        }
        match (name, index) {
            (Some(name), _) => self
                .find(&name)
                .map(Some)
                .ok_or(DispatchError::UnknownTopology(name)),
            (None, Some(index)) => usize::try_from(index)
                .ok()
                .filter(|&i| i < self.topologies.len())
                .map(Some)
                .ok_or(DispatchError::TopologyIndex {
                    index,
                    count: self.topologies.len(),
                }),
            (None, None) => Ok(None),
        }
    }

    /// Like [`Self::resolve_explicit`], defaulting to the first topology.
    pub fn resolve(&self, args: &mut ArgList) -> Result<usize, DispatchError> {
        match self.resolve_explicit(args)? {
            Some(pindex) => Ok(pindex),
            None if self.topologies.is_empty() => Err(DispatchError::NoTopology),
            None => Ok(0),
        }
    }

    pub fn print(&self) {
        info!("Topologies:");
        for t in &self.topologies {
            info!("  {}: {t}, {} frames written", t.pindex(), t.out_frame());
        }
    }
}
