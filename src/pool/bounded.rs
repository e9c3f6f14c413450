use std::panic;
use std::sync::Arc;
use std::thread;

use anyhow::{Result, bail};
use futures::StreamExt;
use futures::executor::{BlockingStream, block_on_stream};
use futures::stream::{self, LocalBoxStream};
use tokio::runtime::{Builder, Runtime};
use tokio::task::JoinError;
use tracing::{Level, event};

use crate::core::konst::{APP_NAME, QUEUE_FACTOR, THREADS_PER_CPU, WORKER_THREAD_NAME};

/// Worker thread count for a host with `cpus` logical CPUs.
///
/// Lookups spend their time blocked on network round trips rather than
/// on the CPU, so this is a multiple of the CPU count.
pub fn concurrency_for_cpus(cpus: usize) -> usize {
    cpus.max(1) * THREADS_PER_CPU
}

/// Worker thread count for the current host.
pub fn default_concurrency() -> usize {
    let cpus = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    concurrency_for_cpus(cpus)
}

/// Applies a blocking function to every item of an input sequence using a
/// fixed number of threads.
///
/// At most `queue_length()` tasks are outstanding at any time. The input is
/// only pulled from when a slot frees up, so very large (or endless) inputs
/// never pile up as queued work. Results come back in completion order.
#[derive(Clone, Debug)]
pub struct WorkerPool {
    concurrency: usize,
    thread_name: String,
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            thread_name: WORKER_THREAD_NAME.to_owned(),
        }
    }
}

impl WorkerPool {
    pub fn new(concurrency: usize) -> Result<WorkerPool> {
        if concurrency == 0 {
            bail!("worker pool needs at least one thread")
        }
        Ok(WorkerPool {
            concurrency,
            thread_name: WORKER_THREAD_NAME.to_owned(),
        })
    }

    /// Name given to every worker thread spawned by `run`.
    pub fn with_thread_name(mut self, name: &str) -> Self {
        self.thread_name = name.to_owned();
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Ceiling on submitted-but-not-yet-yielded tasks.
    pub fn queue_length(&self) -> usize {
        self.concurrency * QUEUE_FACTOR
    }

    /// Run `worker` over `inputs`, yielding outputs as tasks complete.
    ///
    /// `worker` has no error channel: failures must be encoded in `O`. A
    /// worker that panics is a defect, and the panic is resumed on the
    /// consuming thread when its result would have been yielded.
    ///
    /// The threads live exactly as long as the returned `PoolResults`.
    /// Dropping it early stops all further submissions, cancels queued
    /// tasks and joins the worker threads. It must not be dropped from
    /// inside an async context.
    pub fn run<'a, F, I, O, T>(&self, worker: F, inputs: T) -> Result<PoolResults<'a, O>>
    where
        F: Fn(I) -> O + Send + Sync + 'static,
        I: Send + 'static,
        O: Send + 'static,
        T: IntoIterator<Item = I>,
        T::IntoIter: 'a,
    {
        let queue_length = self.queue_length();
        event!(
            target: APP_NAME,
            Level::DEBUG,
            "worker pool started using {} threads, queue length {}",
            self.concurrency,
            queue_length
        );

        // Worker threads are spawned on demand by the blocking pool,
        // never more than `concurrency` of them.
        let runtime = Builder::new_current_thread()
            .max_blocking_threads(self.concurrency)
            .thread_name(self.thread_name.clone())
            .build()?;

        let handle = runtime.handle().clone();
        let worker = Arc::new(worker);

        let tasks = stream::iter(inputs)
            .map(move |input| {
                let worker = Arc::clone(&worker);
                handle.spawn_blocking(move || worker(input))
            })
            .buffer_unordered(queue_length)
            .boxed_local();

        Ok(PoolResults {
            results: block_on_stream(tasks),
            _runtime: runtime,
        })
    }
}

/// Lazy, single pass sequence of worker outputs in completion order.
pub struct PoolResults<'a, O> {
    // Field order matters: the task stream must be dropped before the
    // runtime so nothing can be submitted once teardown starts.
    results: BlockingStream<LocalBoxStream<'a, Result<O, JoinError>>>,
    _runtime: Runtime,
}

impl<O> Iterator for PoolResults<'_, O> {
    type Item = O;

    fn next(&mut self) -> Option<O> {
        match self.results.next()? {
            Ok(output) => Some(output),
            Err(e) => match e.try_into_panic() {
                Ok(payload) => panic::resume_unwind(payload),
                // Tasks are only cancelled when the runtime shuts down,
                // which cannot happen while `self` is alive.
                Err(e) => panic!("worker task cancelled: {e}"),
            },
        }
    }
}
