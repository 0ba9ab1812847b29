//! Rank context and collective operations.
//!
//! A [`World`] describes one rank of a cooperating group. The serial world (rank 0 of 1)
//! turns every collective into a no-op that hands its input back unchanged. Multi-rank
//! worlds are created by [`World::spawn`], which runs one thread per rank over a shared
//! [`group::ThreadGroup`].

mod group;

use group::ThreadGroup;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

#[derive(Debug, Error)]
pub enum CommError {
    #[error("Failed to initialize the rank runtime: {0}")]
    Init(String),

    #[error("Rank {rank}: collective operation '{op}' failed: {reason}")]
    Collective {
        rank: usize,
        op: &'static str,
        reason: String,
    },

    #[error("Rank {rank} panicked before completing")]
    RankPanicked { rank: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    Sum,
    Max,
    Min,
}

/// Element types that collective reductions can combine.
pub trait Reducible: Copy + Send + Sync + 'static {
    fn combine(self, other: Self, op: ReduceOp) -> Self;
}

impl Reducible for f64 {
    fn combine(self, other: Self, op: ReduceOp) -> Self {
        match op {
            ReduceOp::Sum => self + other,
            ReduceOp::Max => self.max(other),
            ReduceOp::Min => self.min(other),
        }
    }
}

macro_rules! impl_reducible_int {
    ($($t:ty),*) => {
        $(
            impl Reducible for $t {
                fn combine(self, other: Self, op: ReduceOp) -> Self {
                    match op {
                        ReduceOp::Sum => self + other,
                        ReduceOp::Max => self.max(other),
                        ReduceOp::Min => self.min(other),
                    }
                }
            }
        )*
    };
}

impl_reducible_int!(i64, u64, usize);

/// One rank's view of the cooperating group.
///
/// Every collective method must be called by all ranks in the same order; a rank that
/// skips a collective stalls the others.
#[derive(Debug, Clone)]
pub struct World {
    rank: usize,
    size: usize,
    group: Option<Arc<ThreadGroup>>,
}

impl World {
    /// The single-process context: rank 0 of 1.
    pub fn serial() -> Self {
        Self {
            rank: 0,
            size: 1,
            group: None,
        }
    }

    /// Runs `f` once per rank on `size` threads and returns the results in rank order.
    ///
    /// A size of one runs `f` on the calling thread with the serial world. A rank whose
    /// closure panics aborts the group, so ranks blocked in a collective return an error
    /// instead of waiting forever.
    ///
    /// # Errors
    ///
    /// Returns [`CommError::Init`] for a size of zero or when a rank thread cannot be
    /// started, and [`CommError::RankPanicked`] when a rank panicked.
    pub fn spawn<F, R>(size: usize, f: F) -> Result<Vec<R>, CommError>
    where
        F: Fn(World) -> R + Sync,
        R: Send,
    {
        if size == 0 {
            return Err(CommError::Init("rank count must be at least 1".into()));
        }
        if size == 1 {
            return Ok(vec![f(World::serial())]);
        }

        debug!(size, "Starting rank threads.");
        let group = Arc::new(ThreadGroup::new(size));
        std::thread::scope(|scope| {
            let mut handles = Vec::with_capacity(size);
            for rank in 0..size {
                let world = World {
                    rank,
                    size,
                    group: Some(Arc::clone(&group)),
                };
                let f = &f;
                let spawned = std::thread::Builder::new()
                    .name(format!("rank-{rank}"))
                    .spawn_scoped(scope, move || {
                        let _guard = AbortOnPanic(&world);
                        f(world.clone())
                    });
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(e) => {
                        group.abort(rank);
                        return Err(CommError::Init(format!(
                            "could not start thread for rank {rank}: {e}"
                        )));
                    }
                }
            }

            let mut results = Vec::with_capacity(size);
            let mut panicked = None;
            for (rank, handle) in handles.into_iter().enumerate() {
                match handle.join() {
                    Ok(result) => results.push(result),
                    Err(_) => {
                        panicked.get_or_insert(rank);
                    }
                }
            }
            match panicked {
                Some(rank) => Err(CommError::RankPanicked { rank }),
                None => Ok(results),
            }
        })
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_master(&self) -> bool {
        self.rank == 0
    }

    /// Marks the group as failed; every rank blocked in or entering a collective gets an error.
    pub fn abort(&self) {
        if let Some(group) = &self.group {
            error!(rank = self.rank, "Aborting all ranks.");
            group.abort(self.rank);
        }
    }

    pub fn barrier(&self) -> Result<(), CommError> {
        match &self.group {
            None => Ok(()),
            Some(group) => group.wait(self.rank, "barrier"),
        }
    }

    /// Combines `data` element-wise across ranks; only rank 0 receives the result.
    pub fn reduce<T: Reducible>(
        &self,
        data: &[T],
        op: ReduceOp,
    ) -> Result<Option<Vec<T>>, CommError> {
        let Some(group) = &self.group else {
            return Ok(Some(data.to_vec()));
        };
        let gathered = group.all_gather(self.rank, "reduce", data.to_vec())?;
        if !self.is_master() {
            return Ok(None);
        }
        combine_all(self.rank, "reduce", gathered, op).map(Some)
    }

    /// Combines `data` element-wise across ranks; every rank receives the result.
    pub fn all_reduce<T: Reducible>(&self, data: &[T], op: ReduceOp) -> Result<Vec<T>, CommError> {
        let Some(group) = &self.group else {
            return Ok(data.to_vec());
        };
        let gathered = group.all_gather(self.rank, "all_reduce", data.to_vec())?;
        combine_all(self.rank, "all_reduce", gathered, op)
    }

    /// Copies `from_rank`'s buffer into rank 0's buffer. Buffers on other ranks are untouched.
    pub fn send_master<T: Reducible>(&self, data: &mut [T], from_rank: usize) -> Result<(), CommError> {
        let Some(group) = &self.group else {
            return Ok(());
        };
        if from_rank >= self.size {
            return Err(CommError::Collective {
                rank: self.rank,
                op: "send_master",
                reason: format!("source rank {from_rank} out of range for {} ranks", self.size),
            });
        }
        let gathered = group.all_gather(self.rank, "send_master", data.to_vec())?;
        if self.is_master() {
            let source = &gathered[from_rank];
            if source.len() != data.len() {
                return Err(CommError::Collective {
                    rank: self.rank,
                    op: "send_master",
                    reason: format!(
                        "rank {from_rank} sent {} elements, expected {}",
                        source.len(),
                        data.len()
                    ),
                });
            }
            data.copy_from_slice(source);
        }
        Ok(())
    }
}

struct AbortOnPanic<'a>(&'a World);

impl Drop for AbortOnPanic<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.abort();
        }
    }
}

fn combine_all<T: Reducible>(
    rank: usize,
    op_name: &'static str,
    gathered: Vec<Vec<T>>,
    op: ReduceOp,
) -> Result<Vec<T>, CommError> {
    let mut iter = gathered.into_iter().enumerate();
    let Some((_, mut acc)) = iter.next() else {
        return Ok(Vec::new());
    };
    for (source, values) in iter {
        if values.len() != acc.len() {
            return Err(CommError::Collective {
                rank,
                op: op_name,
                reason: format!(
                    "rank {source} contributed {} elements, rank 0 contributed {}",
                    values.len(),
                    acc.len()
                ),
            });
        }
        for (a, b) in acc.iter_mut().zip(values) {
            *a = a.combine(b, op);
        }
    }
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;

    mod serial {
        use super::*;

        #[test]
        fn serial_world_is_rank_zero_of_one() {
            let world = World::serial();
            assert_eq!(world.rank(), 0);
            assert_eq!(world.size(), 1);
            assert!(world.is_master());
        }

        #[test]
        fn collectives_return_input_unchanged() {
            let world = World::serial();
            world.barrier().unwrap();
            assert_eq!(
                world.reduce(&[1.5, 2.5], ReduceOp::Sum).unwrap(),
                Some(vec![1.5, 2.5])
            );
            assert_eq!(world.all_reduce(&[3_i64], ReduceOp::Max).unwrap(), vec![3]);
            let mut buf = [7_usize];
            world.send_master(&mut buf, 0).unwrap();
            assert_eq!(buf, [7]);
        }

        #[test]
        fn spawn_with_one_rank_runs_on_serial_world() {
            let results = World::spawn(1, |world| (world.rank(), world.size())).unwrap();
            assert_eq!(results, vec![(0, 1)]);
        }

        #[test]
        fn spawn_with_zero_ranks_is_an_init_error() {
            let result = World::spawn(0, |world| world.rank());
            assert!(matches!(result, Err(CommError::Init(_))));
        }
    }

    mod threaded {
        use super::*;

        #[test]
        fn spawn_returns_results_in_rank_order() {
            let results = World::spawn(4, |world| world.rank() * 10).unwrap();
            assert_eq!(results, vec![0, 10, 20, 30]);
        }

        #[test]
        fn all_reduce_sums_on_every_rank() {
            let results = World::spawn(3, |world| {
                let value = world.rank() as f64 + 1.0;
                world.all_reduce(&[value, 1.0], ReduceOp::Sum).unwrap()
            })
            .unwrap();
            for r in results {
                assert_eq!(r, vec![6.0, 3.0]);
            }
        }

        #[test]
        fn reduce_delivers_result_only_to_master() {
            let results = World::spawn(3, |world| {
                world
                    .reduce(&[world.rank() as i64], ReduceOp::Max)
                    .unwrap()
            })
            .unwrap();
            assert_eq!(results[0], Some(vec![2]));
            assert_eq!(results[1], None);
            assert_eq!(results[2], None);
        }

        #[test]
        fn min_reduction_picks_smallest_value() {
            let results = World::spawn(2, |world| {
                world
                    .all_reduce(&[10 - world.rank() as u64], ReduceOp::Min)
                    .unwrap()
            })
            .unwrap();
            assert_eq!(results, vec![vec![9], vec![9]]);
        }

        #[test]
        fn send_master_copies_source_buffer_to_rank_zero() {
            let results = World::spawn(3, |world| {
                let mut buf = [world.rank() as f64 * 2.0; 2];
                world.send_master(&mut buf, 2).unwrap();
                buf
            })
            .unwrap();
            assert_eq!(results[0], [4.0, 4.0]);
            assert_eq!(results[1], [2.0, 2.0]);
            assert_eq!(results[2], [4.0, 4.0]);
        }

        #[test]
        fn mismatched_lengths_are_reported_with_rank_and_operation() {
            let results = World::spawn(2, |world| {
                let data = vec![1.0; world.rank() + 1];
                world.all_reduce(&data, ReduceOp::Sum)
            })
            .unwrap();
            for result in results {
                match result {
                    Err(CommError::Collective { op, .. }) => assert_eq!(op, "all_reduce"),
                    other => panic!("expected collective error, got {other:?}"),
                }
            }
        }

        #[test]
        fn aborted_group_releases_ranks_waiting_at_barrier() {
            let results = World::spawn(2, |world| {
                if world.rank() == 1 {
                    world.abort();
                    return true;
                }
                world.barrier().is_err()
            })
            .unwrap();
            assert_eq!(results, vec![true, true]);
        }

        #[test]
        fn panicking_rank_is_reported() {
            let result = World::spawn(2, |world| {
                if world.rank() == 1 {
                    panic!("rank failure");
                }
                let _ = world.barrier();
            });
            assert!(matches!(result, Err(CommError::RankPanicked { rank: 1 })));
        }
    }
}
