//! The caller-facing event loop and job scheduling.
//!
//! [`EventLoop`] owns every processor it creates. `feed` submits scaling
//! jobs to an [`Executor`]; each job sends its buffer back through a
//! completion queue, and [`EventLoop::run`] dispatches those completions on
//! the loop's thread. The processor state, not the scheduler, keeps at most
//! one job in flight per processor.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::{CallbackError, Error, FeedError, Result};
use crate::executor::{Executor, PoolOptions, WorkerPool};
use crate::processor::{Admission, Buffer, Finish, GainProcessor, Processor, ProcessorId};

/// Hook fired after a processor has been destroyed.
pub type DestroyHook = Arc<dyn Fn(ProcessorId) + Send + Sync>;

/// Options for configuring an [`EventLoop`].
#[derive(Default)]
pub struct LoopOptions {
    /// Options for the default worker pool. Ignored by
    /// [`EventLoop::with_executor`].
    pub pool: PoolOptions,
    on_processor_destroyed: Option<DestroyHook>,
}

impl fmt::Debug for LoopOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopOptions")
            .field("pool", &self.pool)
            .field("on_processor_destroyed", &self.on_processor_destroyed.is_some())
            .finish()
    }
}

impl LoopOptions {
    pub fn with_pool(mut self, pool: PoolOptions) -> Self {
        self.pool = pool;
        self
    }

    /// Sets a callback that fires when a processor is destroyed.
    pub fn with_on_processor_destroyed(
        mut self,
        f: impl Fn(ProcessorId) + Send + Sync + 'static,
    ) -> Self {
        self.on_processor_destroyed = Some(Arc::new(f));
        self
    }
}

/// How [`EventLoop::run`] waits for completions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Dispatch until no job is outstanding.
    #[default]
    Default,
    /// Block for one completion, dispatch it and return.
    Once,
    /// Dispatch completions that are already available without blocking.
    NoWait,
}

/// A finished job on its way back to the loop thread.
pub(crate) struct Completion<B> {
    id: ProcessorId,
    buffer: B,
}

/// State shared between the loop and its processor handles.
pub(crate) struct Shared<B: Buffer> {
    processors: RefCell<HashMap<ProcessorId, Processor<B>>>,
    next_id: Cell<u64>,
    outstanding: Cell<usize>,
    executor: Arc<dyn Executor>,
    completions: mpsc::UnboundedSender<Completion<B>>,
    on_destroyed: Option<DestroyHook>,
}

impl<B: Buffer> Shared<B> {
    pub(crate) fn with_processor<R>(
        &self,
        id: ProcessorId,
        f: impl FnOnce(&mut Processor<B>) -> R,
    ) -> Result<R> {
        let mut processors = self.processors.borrow_mut();
        let processor = processors.get_mut(&id).ok_or(Error::InvalidHandle)?;
        Ok(f(processor))
    }

    pub(crate) fn feed(&self, id: ProcessorId, mut buffer: B) -> std::result::Result<(), FeedError<B>> {
        let len = buffer.as_mut().len();
        let admission = self
            .with_processor(id, |p| p.admit(len))
            .and_then(|admitted| admitted);

        match admission {
            Err(e) => Err(FeedError::new(e, buffer)),
            Ok(Admission::Skip) => {
                tracing::trace!(%id, "multiply: empty buffer ignored");
                Ok(())
            }
            Ok(Admission::Identity) => {
                // Unit gain leaves the samples as they are; the completion
                // still takes the regular path through the queue.
                self.outstanding.set(self.outstanding.get() + 1);
                tracing::debug!(%id, len, "multiply: unit gain, completing without a job");
                let _ = self.completions.send(Completion { id, buffer });
                Ok(())
            }
            Ok(Admission::Scale { encoding, gain }) => {
                self.outstanding.set(self.outstanding.get() + 1);
                tracing::debug!(%id, len, ?encoding, gain, "multiply: job submitted");

                let completions = self.completions.clone();
                self.executor.submit(Box::new(move || {
                    let mut buffer = buffer;
                    let samples = encoding.scale(buffer.as_mut(), gain);
                    tracing::trace!(%id, samples, "multiply: job scaled");
                    if completions.send(Completion { id, buffer }).is_err() {
                        tracing::debug!(%id, "multiply: event loop gone, dropping buffer");
                    }
                }));
                Ok(())
            }
        }
    }

    /// Handles release of a processor handle.
    pub(crate) fn release(&self, id: ProcessorId) {
        let destroy_now = self
            .with_processor(id, |p| p.release())
            .unwrap_or(false);
        if destroy_now {
            self.destroy(id);
        } else {
            tracing::debug!(%id, "multiply: released while working, destruction deferred");
        }
    }

    fn destroy(&self, id: ProcessorId) {
        // Removed outside the borrow: dropping the callback may drop other
        // handles, which re-enter the registry.
        let processor = self.processors.borrow_mut().remove(&id);
        if processor.is_none() {
            return;
        }
        drop(processor);
        if let Some(hook) = &self.on_destroyed {
            hook(id);
        }
    }

    fn complete(&self, completion: Completion<B>) -> Result<()> {
        let Completion { id, buffer } = completion;

        let finish = match self.with_processor(id, |p| p.finish()) {
            Ok(finish) => finish,
            Err(_) => {
                tracing::warn!(%id, "multiply: completion for unknown processor");
                return Ok(());
            }
        };

        if finish == Finish::Destroy {
            drop(buffer);
            self.destroy(id);
            return Ok(());
        }

        let callback = self.with_processor(id, |p| p.take_callback())?;
        let Some(mut callback) = callback else {
            return Err(Error::Invocation(format!(
                "callback of {id} is already running"
            )));
        };

        // No borrow is held while the callback runs, so it may feed, queue
        // formats or drop handles.
        let result = callback(buffer);

        let mut callback = Some(callback);
        if let Some(p) = self.processors.borrow_mut().get_mut(&id) {
            if let Some(cb) = callback.take() {
                p.restore_callback(cb);
            }
        }
        drop(callback);

        result.map_err(|e: CallbackError| {
            tracing::warn!(%id, error = %e, "multiply: completion callback failed");
            Error::Invocation(e.to_string())
        })
    }
}

/// The caller-facing context: creates processors and dispatches their
/// completions.
///
/// The loop is not `Send`; keep it on the thread that configures and feeds
/// its processors. `run` blocks that thread, so do not call it from inside
/// an async task.
///
/// # Example
///
/// ```no_run
/// use multiply_pcm::{EventLoop, FormatDescriptor, RunMode};
///
/// let event_loop = EventLoop::new().unwrap();
/// let processor = event_loop
///     .create(0.5, |buffer: Vec<u8>| {
///         println!("scaled {} bytes", buffer.len());
///         Ok(())
///     })
///     .unwrap();
/// processor.queue_format(FormatDescriptor::CD).unwrap();
/// processor.feed(vec![0u8; 4096]).unwrap();
/// event_loop.run(RunMode::Default).unwrap();
/// ```
pub struct EventLoop<B: Buffer = Vec<u8>> {
    shared: Rc<Shared<B>>,
    completions: RefCell<mpsc::UnboundedReceiver<Completion<B>>>,
}

impl<B: Buffer> EventLoop<B> {
    /// Creates a loop backed by a default [`WorkerPool`].
    pub fn new() -> Result<Self> {
        Self::with_options(LoopOptions::default())
    }

    /// Creates a loop backed by a [`WorkerPool`] built from `opts.pool`.
    pub fn with_options(opts: LoopOptions) -> Result<Self> {
        let pool = WorkerPool::new(&opts.pool)?;
        Ok(Self::with_executor(Arc::new(pool), opts))
    }

    /// Creates a loop that submits jobs to `executor`.
    pub fn with_executor(executor: Arc<dyn Executor>, opts: LoopOptions) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            shared: Rc::new(Shared {
                processors: RefCell::new(HashMap::new()),
                next_id: Cell::new(1),
                outstanding: Cell::new(0),
                executor,
                completions: tx,
                on_destroyed: opts.on_processor_destroyed,
            }),
            completions: RefCell::new(rx),
        }
    }

    /// Creates a processor with a fixed gain.
    ///
    /// `on_complete` runs on this loop's thread once per completed feed and
    /// receives the processed buffer. It never runs after the processor has
    /// been destroyed.
    pub fn create<F>(&self, gain: f32, on_complete: F) -> Result<GainProcessor<B>>
    where
        F: FnMut(B) -> std::result::Result<(), CallbackError> + 'static,
    {
        if !gain.is_finite() {
            return Err(Error::Configuration(format!(
                "gain must be a finite number, got {gain}"
            )));
        }

        let id = ProcessorId(self.shared.next_id.get());
        self.shared.next_id.set(id.0 + 1);
        self.shared
            .processors
            .borrow_mut()
            .insert(id, Processor::new(id, gain, Box::new(on_complete)));

        tracing::debug!(%id, gain, "multiply: processor created");
        Ok(GainProcessor::new(id, Rc::downgrade(&self.shared)))
    }

    /// Dispatches completions according to `mode`.
    ///
    /// Returns the number of completions dispatched. A failing callback
    /// stops the run with [`Error::Invocation`]; the failed completion has
    /// already been committed and the remaining ones stay queued.
    pub fn run(&self, mode: RunMode) -> Result<usize> {
        let mut dispatched = 0;
        while self.shared.outstanding.get() > 0 {
            let completion = match mode {
                RunMode::NoWait => match self.completions.borrow_mut().try_recv() {
                    Ok(c) => c,
                    Err(_) => break,
                },
                RunMode::Default | RunMode::Once => self
                    .completions
                    .borrow_mut()
                    .blocking_recv()
                    .ok_or(Error::Closed)?,
            };
            self.shared.outstanding.set(self.shared.outstanding.get() - 1);
            dispatched += 1;

            self.shared.complete(completion)?;

            if mode == RunMode::Once {
                break;
            }
        }
        Ok(dispatched)
    }

    /// Returns the number of jobs whose completion has not been dispatched.
    pub fn outstanding(&self) -> usize {
        self.shared.outstanding.get()
    }

    /// Returns the number of processors not yet destroyed.
    pub fn live_processors(&self) -> usize {
        self.shared.processors.borrow().len()
    }
}

impl<B: Buffer> fmt::Debug for EventLoop<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("outstanding", &self.outstanding())
            .field("live_processors", &self.live_processors())
            .finish()
    }
}
