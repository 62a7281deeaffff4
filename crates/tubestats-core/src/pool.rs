//! Bounded fan-out over scoped worker threads.
//!
//! A fixed number of workers pull jobs from a bounded channel, so at most
//! `workers` jobs run at once and at most `workers` more wait in the queue.
//! Results come back in input order.

use std::thread;

use crossbeam_channel::{bounded, unbounded};

/// A worker thread panicked before finishing its jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("worker thread panicked")]
pub struct WorkerPanicked;

/// Apply `f` to every item on at most `workers` threads.
///
/// `workers` is clamped to `1..=items.len()`.
///
/// # Errors
///
/// Returns [`WorkerPanicked`] if any invocation of `f` panicked; the other
/// workers still drain the queue before this returns.
pub fn run_bounded<T, R, F>(workers: usize, items: Vec<T>, f: F) -> Result<Vec<R>, WorkerPanicked>
where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Sync,
{
    let total = items.len();
    if total == 0 {
        return Ok(Vec::new());
    }
    let workers = workers.clamp(1, total);

    let (job_tx, job_rx) = bounded::<(usize, T)>(workers);
    let (out_tx, out_rx) = unbounded::<(usize, R)>();

    let panicked = thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let jobs = job_rx.clone();
                let results = out_tx.clone();
                let f = &f;
                scope.spawn(move || {
                    for (idx, item) in jobs {
                        if results.send((idx, f(item))).is_err() {
                            break;
                        }
                    }
                })
            })
            .collect();
        drop(job_rx);
        drop(out_tx);

        for job in items.into_iter().enumerate() {
            if job_tx.send(job).is_err() {
                break;
            }
        }
        drop(job_tx);

        handles
            .into_iter()
            .map(thread::ScopedJoinHandle::join)
            .filter(Result::is_err)
            .count()
    });

    if panicked > 0 {
        tracing::error!(panicked, workers, "worker pool lost threads");
        return Err(WorkerPanicked);
    }

    let mut slots: Vec<Option<R>> = std::iter::repeat_with(|| None).take(total).collect();
    for (idx, result) in out_rx.try_iter() {
        if let Some(slot) = slots.get_mut(idx) {
            *slot = Some(result);
        }
    }
    slots.into_iter().collect::<Option<Vec<R>>>().ok_or(WorkerPanicked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn results_keep_input_order() {
        let out = run_bounded(3, (0..50).collect(), |n: u32| n * 2).expect("pool");
        assert_eq!(out, (0..50).map(|n| n * 2).collect::<Vec<_>>());
    }

    #[test]
    fn empty_input_spawns_nothing() {
        let out: Vec<u8> = run_bounded(4, Vec::<u8>::new(), |n| n).expect("pool");
        assert!(out.is_empty());
    }

    #[test]
    fn concurrency_never_exceeds_worker_count() {
        let running = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        run_bounded(2, (0..20).collect::<Vec<u32>>(), |_| {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(2));
            running.fetch_sub(1, Ordering::SeqCst);
        })
        .expect("pool");
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn zero_workers_still_runs() {
        let out = run_bounded(0, vec![1, 2, 3], |n: i32| n + 1).expect("pool");
        assert_eq!(out, vec![2, 3, 4]);
    }

    #[test]
    fn panicking_job_is_reported() {
        let result = run_bounded(2, vec![1, 2, 3], |n: i32| {
            assert!(n != 2, "boom");
            n
        });
        assert_eq!(result, Err(WorkerPanicked));
    }
}
