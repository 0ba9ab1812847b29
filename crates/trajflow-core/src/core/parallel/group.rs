use super::CommError;
use std::any::Any;
use std::sync::{Condvar, Mutex, MutexGuard};

type Slot = Option<Box<dyn Any + Send>>;

#[derive(Debug)]
struct GroupState {
    arrived: usize,
    generation: u64,
    aborted: Option<usize>,
    slots: Vec<Slot>,
    // Filled by the last arriving rank; each rank clones what it needs.
    published: Vec<Slot>,
    taken: usize,
}

/// Shared rendezvous for the rank threads of one [`super::World`].
///
/// All collectives are built on a generation-counted barrier. `all_gather` deposits every
/// rank's contribution into a slot, and the last rank to arrive publishes the full set.
#[derive(Debug)]
pub(super) struct ThreadGroup {
    size: usize,
    state: Mutex<GroupState>,
    cond: Condvar,
}

impl ThreadGroup {
    pub(super) fn new(size: usize) -> Self {
        Self {
            size,
            state: Mutex::new(GroupState {
                arrived: 0,
                generation: 0,
                aborted: None,
                slots: (0..size).map(|_| None).collect(),
                published: Vec::new(),
                taken: 0,
            }),
            cond: Condvar::new(),
        }
    }

    fn lock(&self, rank: usize, op: &'static str) -> Result<MutexGuard<'_, GroupState>, CommError> {
        self.state.lock().map_err(|_| CommError::Collective {
            rank,
            op,
            reason: "group state poisoned".into(),
        })
    }

    pub(super) fn abort(&self, rank: usize) {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.aborted.get_or_insert(rank);
        self.cond.notify_all();
    }

    pub(super) fn wait(&self, rank: usize, op: &'static str) -> Result<(), CommError> {
        self.all_gather::<()>(rank, op, Vec::new()).map(|_| ())
    }

    /// Exchanges one buffer per rank and returns all of them in rank order.
    pub(super) fn all_gather<T: Clone + Send + 'static>(
        &self,
        rank: usize,
        op: &'static str,
        data: Vec<T>,
    ) -> Result<Vec<Vec<T>>, CommError> {
        let mut state = self.lock(rank, op)?;
        check_aborted(&state, rank, op)?;

        // A previous round is still being drained by slower ranks.
        while !state.published.is_empty() {
            state = self.cond.wait(state).map_err(|_| poisoned(rank, op))?;
            check_aborted(&state, rank, op)?;
        }

        state.slots[rank] = Some(Box::new(data));
        state.arrived += 1;
        let generation = state.generation;

        if state.arrived == self.size {
            state.published = std::mem::replace(
                &mut state.slots,
                (0..self.size).map(|_| None).collect(),
            );
            state.arrived = 0;
            state.taken = 0;
            state.generation = state.generation.wrapping_add(1);
            self.cond.notify_all();
        } else {
            while state.generation == generation {
                state = self.cond.wait(state).map_err(|_| poisoned(rank, op))?;
                check_aborted(&state, rank, op)?;
            }
        }

        let gathered = state
            .published
            .iter()
            .enumerate()
            .map(|(source, slot)| {
                slot.as_ref()
                    .and_then(|b| b.downcast_ref::<Vec<T>>())
                    .cloned()
                    .ok_or_else(|| CommError::Collective {
                        rank,
                        op,
                        reason: format!("rank {source} entered a different collective"),
                    })
            })
            .collect::<Result<Vec<_>, _>>();

        state.taken += 1;
        if state.taken == self.size {
            state.published.clear();
            state.taken = 0;
            self.cond.notify_all();
        }
        gathered
    }
}

fn check_aborted(state: &GroupState, rank: usize, op: &'static str) -> Result<(), CommError> {
    match state.aborted {
        Some(by) => Err(CommError::Collective {
            rank,
            op,
            reason: format!("group aborted by rank {by}"),
        }),
        None => Ok(()),
    }
}

fn poisoned(rank: usize, op: &'static str) -> CommError {
    CommError::Collective {
        rank,
        op,
        reason: "group state poisoned".into(),
    }
}
