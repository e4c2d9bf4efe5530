//! Parallelism configuration shared by batch components.

use rayon::prelude::*;

// =============================================================================
// Parallelism Configuration
// =============================================================================

/// Whether parallel execution is allowed.
///
/// The thread pool itself is set up once per batch by [`run_with_threads`];
/// components only branch on this flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Parallelism {
    Sequential,
    Parallel,
}

impl Parallelism {
    /// Create from thread count semantics.
    ///
    /// - 0 = auto (parallel if the rayon pool has multiple threads)
    /// - 1 = sequential
    /// - >1 = parallel
    #[inline]
    pub fn from_threads(n_threads: usize) -> Self {
        if n_threads == 1 || (n_threads == 0 && rayon::current_num_threads() == 1) {
            Parallelism::Sequential
        } else {
            Parallelism::Parallel
        }
    }

    #[inline]
    pub fn is_parallel(self) -> bool {
        matches!(self, Parallelism::Parallel)
    }

    /// Map over a slice with item positions, keeping input order in the
    /// output regardless of completion order.
    ///
    /// `min_len` is the smallest number of items a parallel task processes.
    #[inline]
    pub fn maybe_par_map_indexed<T, B, F>(self, items: &[T], min_len: usize, f: F) -> Vec<B>
    where
        T: Sync,
        B: Send,
        F: Fn(usize, &T) -> B + Sync + Send,
    {
        if self.is_parallel() {
            items
                .par_iter()
                .enumerate()
                .with_min_len(min_len.max(1))
                .map(|(i, item)| f(i, item))
                .collect()
        } else {
            items.iter().enumerate().map(|(i, item)| f(i, item)).collect()
        }
    }
}

// =============================================================================
// Thread Pool Setup
// =============================================================================

/// Run a closure with the appropriate thread pool.
///
/// Thread count semantics:
/// - `0` = auto (the global pool, all available cores)
/// - `1` = sequential (no thread pool)
/// - `n > 1` = a dedicated pool of exactly `n` threads
///
/// If a dedicated pool cannot be created the closure runs on the global
/// pool instead.
pub fn run_with_threads<T: Send>(n_threads: usize, f: impl FnOnce(Parallelism) -> T + Send) -> T {
    let parallelism = Parallelism::from_threads(n_threads);

    match parallelism {
        Parallelism::Sequential => f(Parallelism::Sequential),
        Parallelism::Parallel if n_threads == 0 => f(Parallelism::Parallel),
        Parallelism::Parallel => {
            match rayon::ThreadPoolBuilder::new().num_threads(n_threads).build() {
                Ok(pool) => pool.install(|| f(Parallelism::Parallel)),
                Err(error) => {
                    tracing::warn!(n_threads, %error, "thread pool unavailable, using global pool");
                    f(Parallelism::Parallel)
                }
            }
        }
    }
}
