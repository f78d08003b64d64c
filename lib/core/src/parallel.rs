// Data-parallel fan-out over independent inputs (files, shards).
// Results always come back in input order; callers re-sort by `_ref` anyway.

use crate::{Error, Result};
use rayon::prelude::*;
use std::num::NonZeroUsize;
use tracing::debug;

/// Degree of parallelism for per-file and per-shard reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parallelism {
    #[default]
    Serial,
    /// Rayon's global pool, one worker per core
    AllCores,
    /// Dedicated pool with a fixed worker count
    Workers(NonZeroUsize),
}

impl Parallelism {
    /// Map a worker count setting: -1 = all cores, 1 = serial, n > 1 = fixed pool.
    pub fn from_workers(n: i64) -> Result<Self> {
        match n {
            -1 => Ok(Parallelism::AllCores),
            1 => Ok(Parallelism::Serial),
            n if n > 1 => NonZeroUsize::new(n as usize)
                .map(Parallelism::Workers)
                .ok_or_else(|| Error::InvalidConfig(format!("invalid worker count {}", n))),
            n => Err(Error::InvalidConfig(format!(
                "invalid worker count {} (use -1 for all cores)",
                n
            ))),
        }
    }

    /// Apply `f` to every item, failing as a whole if any call fails.
    pub fn try_map<T, R, F>(&self, items: &[T], f: F) -> Result<Vec<R>>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> Result<R> + Send + Sync,
    {
        debug!("Fan-out of {} items ({:?})", items.len(), self);
        match self {
            Parallelism::Serial => items.iter().map(f).collect(),
            Parallelism::AllCores => items.par_iter().map(f).collect(),
            Parallelism::Workers(n) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(n.get())
                    .build()
                    .map_err(|e| Error::InvalidConfig(format!("thread pool: {}", e)))?;
                pool.install(|| items.par_iter().map(&f).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_workers() {
        assert_eq!(Parallelism::from_workers(-1).unwrap(), Parallelism::AllCores);
        assert_eq!(Parallelism::from_workers(1).unwrap(), Parallelism::Serial);
        assert_eq!(
            Parallelism::from_workers(4).unwrap(),
            Parallelism::Workers(NonZeroUsize::new(4).unwrap())
        );
        assert!(Parallelism::from_workers(0).is_err());
        assert!(Parallelism::from_workers(-2).is_err());
    }

    #[test]
    fn test_try_map_preserves_order() {
        let items: Vec<u32> = (0..200).collect();
        for p in [
            Parallelism::Serial,
            Parallelism::AllCores,
            Parallelism::Workers(NonZeroUsize::new(3).unwrap()),
        ] {
            let out = p.try_map(&items, |x| Ok(x * 2)).unwrap();
            assert_eq!(out, items.iter().map(|x| x * 2).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_try_map_fails_as_a_whole() {
        let items: Vec<u32> = (0..50).collect();
        let result = Parallelism::AllCores.try_map(&items, |&x| {
            if x == 17 {
                Err(Error::ShapeMismatch("bad item".to_string()))
            } else {
                Ok(x)
            }
        });
        assert!(matches!(result, Err(Error::ShapeMismatch(_))));
    }
}
