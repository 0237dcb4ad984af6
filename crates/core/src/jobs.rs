use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

/// Completion counter for a batch dispatch. One count per batch; reaches
/// zero when every batch ran.
pub struct JobCounter {
    remaining: AtomicU32,
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl JobCounter {
    fn new(count: u32) -> Arc<Self> {
        Arc::new(Self {
            remaining: AtomicU32::new(count),
            mutex: Mutex::new(()),
            condvar: Condvar::new(),
        })
    }

    pub fn is_complete(&self) -> bool {
        self.remaining.load(Ordering::Acquire) == 0
    }

    fn decrement(&self) {
        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            let _guard = self.mutex.lock();
            self.condvar.notify_all();
        }
    }
}

type Task = Arc<dyn Fn(u32) + Send + Sync>;

struct Batch {
    start: u32,
    end: u32,
    task: Task,
    counter: Arc<JobCounter>,
}

/// Worker-thread pool. `dispatch_batch(n, ..)` schedules `n` invocations of
/// a task across the workers; `wait_for_counter` blocks the caller until all
/// of them ran.
pub struct JobSystem {
    sender: Option<flume::Sender<Batch>>,
    workers: Vec<JoinHandle<()>>,
}

impl JobSystem {
    /// `worker_count == 0` sizes the pool to the machine, leaving one core
    /// for the main thread.
    pub fn new(worker_count: usize) -> Self {
        let worker_count = if worker_count == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get().saturating_sub(1).max(1))
                .unwrap_or(1)
        } else {
            worker_count
        };

        let (sender, receiver) = flume::unbounded::<Batch>();
        let workers = (0..worker_count)
            .map(|i| {
                let receiver = receiver.clone();
                std::thread::Builder::new()
                    .name(format!("helio-job-{i}"))
                    .spawn(move || {
                        while let Ok(batch) = receiver.recv() {
                            for invocation in batch.start..batch.end {
                                (batch.task)(invocation);
                            }
                            batch.counter.decrement();
                        }
                    })
                    .expect("failed to spawn job worker")
            })
            .collect();

        tracing::debug!("job system started with {worker_count} workers");
        Self {
            sender: Some(sender),
            workers,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Schedules `invocations` runs of `task` in batches of `batch_size`
    /// (0 picks a size that spreads the work across the pool). Returns the
    /// counter to pass to [`JobSystem::wait_for_counter`].
    pub fn dispatch_batch(
        &self,
        invocations: u32,
        batch_size: u32,
        task: impl Fn(u32) + Send + Sync + 'static,
    ) -> Arc<JobCounter> {
        if invocations == 0 {
            return JobCounter::new(0);
        }
        let batch_size = if batch_size == 0 {
            invocations.div_ceil(self.workers.len() as u32).max(1)
        } else {
            batch_size
        };
        let batch_count = invocations.div_ceil(batch_size);
        let counter = JobCounter::new(batch_count);
        let task: Task = Arc::new(task);

        let sender = match &self.sender {
            Some(sender) => sender,
            None => return counter,
        };
        for batch in 0..batch_count {
            let start = batch * batch_size;
            let end = (start + batch_size).min(invocations);
            if sender
                .send(Batch {
                    start,
                    end,
                    task: task.clone(),
                    counter: counter.clone(),
                })
                .is_err()
            {
                counter.decrement();
            }
        }
        counter
    }

    /// Blocks until every batch behind `counter` completed.
    pub fn wait_for_counter(&self, counter: &JobCounter) {
        let mut guard = counter.mutex.lock();
        while !counter.is_complete() {
            counter.condvar.wait(&mut guard);
        }
    }
}

impl Drop for JobSystem {
    fn drop(&mut self) {
        self.sender = None;
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

/// Shared output buffer for batch jobs where invocation `i` owns element
/// `i`. The disjointness contract is what makes the writes sound.
pub struct BatchOutput<T> {
    data: UnsafeCell<Vec<T>>,
}

// SAFETY: concurrent access is limited to disjoint elements per the
// `write` contract.
unsafe impl<T: Send> Sync for BatchOutput<T> {}
unsafe impl<T: Send> Send for BatchOutput<T> {}

impl<T: Clone> BatchOutput<T> {
    pub fn new(len: usize, fill: T) -> Arc<Self> {
        Arc::new(Self {
            data: UnsafeCell::new(vec![fill; len]),
        })
    }

    /// # Safety
    /// No two concurrent invocations may pass the same `index`, and the
    /// buffer must not be read until the dispatch completed.
    pub unsafe fn write(&self, index: usize, value: T) {
        (&mut *self.data.get())[index] = value;
    }

    /// Takes the finished buffer. Call only after `wait_for_counter`.
    pub fn take(self: Arc<Self>) -> Vec<T> {
        match Arc::try_unwrap(self) {
            Ok(output) => output.data.into_inner(),
            Err(shared) => unsafe { (*shared.data.get()).clone() },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_runs_every_invocation_once() {
        let jobs = JobSystem::new(4);
        let hits: Arc<Vec<AtomicU32>> = Arc::new((0..1000).map(|_| AtomicU32::new(0)).collect());
        let hits2 = hits.clone();
        let counter = jobs.dispatch_batch(1000, 16, move |i| {
            hits2[i as usize].fetch_add(1, Ordering::SeqCst);
        });
        jobs.wait_for_counter(&counter);
        assert!(counter.is_complete());
        assert!(hits.iter().all(|h| h.load(Ordering::SeqCst) == 1));
    }

    #[test]
    fn empty_dispatch_completes_immediately() {
        let jobs = JobSystem::new(1);
        let counter = jobs.dispatch_batch(0, 0, |_| {});
        jobs.wait_for_counter(&counter);
        assert!(counter.is_complete());
    }

    #[test]
    fn batch_output_collects_disjoint_writes() {
        let jobs = JobSystem::new(4);
        let output = BatchOutput::new(256, 0u32);
        let writer = output.clone();
        let counter = jobs.dispatch_batch(256, 0, move |i| {
            // SAFETY: each invocation writes its own index
            unsafe { writer.write(i as usize, i * 2) };
        });
        jobs.wait_for_counter(&counter);
        let values = output.take();
        assert!(values.iter().enumerate().all(|(i, v)| *v == i as u32 * 2));
    }
}
