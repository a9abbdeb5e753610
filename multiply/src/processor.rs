//! Gain processors and their lifecycle.
//!
//! A [`GainProcessor`] is the caller's handle to one processor living in an
//! [`EventLoop`](crate::EventLoop). The processor itself stays in the loop's
//! registry so that background work and completion handling never depend on
//! the handle still existing.
//!
//! Dropping the handle releases the processor:
//!
//! - while idle, the processor is destroyed immediately;
//! - while a job is in flight, it is marked pending destruction and the
//!   loop destroys it when the job completes, without invoking the callback.

use std::fmt;
use std::rc::Weak;

use crate::error::{CallbackError, Error, FeedError, Result};
use crate::event_loop::Shared;
use crate::format::{Encoding, FormatDescriptor};

/// A buffer that can be lent to a processor for one scaling job.
///
/// The processor never allocates or frees buffers; it takes the caller's
/// buffer on `feed` and hands the same buffer back to the completion
/// callback.
pub trait Buffer: AsMut<[u8]> + Send + 'static {}

impl<T: AsMut<[u8]> + Send + 'static> Buffer for T {}

/// Completion callback. Receives the processed buffer.
pub type Callback<B> = Box<dyn FnMut(B) -> std::result::Result<(), CallbackError>>;

/// Identifies a processor within its event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessorId(pub(crate) u64);

impl fmt::Display for ProcessorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "processor-{}", self.0)
    }
}

/// Lifecycle state of a processor. A destroyed processor has no state; it is
/// no longer in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    /// A job has been submitted and its completion has not been handled yet.
    Working,
    /// The handle was released while working.
    PendingDestruction,
}

/// Outcome of admitting a buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Admission {
    /// Empty buffer, nothing to do.
    Skip,
    /// Unit gain: complete without running a job.
    Identity,
    Scale { encoding: Encoding, gain: f32 },
}

/// What completion handling must do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Finish {
    Notify,
    Destroy,
}

pub(crate) struct Processor<B> {
    id: ProcessorId,
    gain: f32,
    formats: Vec<FormatDescriptor>,
    state: State,
    on_complete: Option<Callback<B>>,
}

impl<B> Processor<B> {
    pub(crate) fn new(id: ProcessorId, gain: f32, on_complete: Callback<B>) -> Self {
        Self {
            id,
            gain,
            formats: Vec::new(),
            state: State::Idle,
            on_complete: Some(on_complete),
        }
    }

    pub(crate) fn gain(&self) -> f32 {
        self.gain
    }

    pub(crate) fn state(&self) -> State {
        self.state
    }

    pub(crate) fn formats(&self) -> &[FormatDescriptor] {
        &self.formats
    }

    /// Appends a format. Allowed while working; it only affects later jobs.
    pub(crate) fn queue_format(&mut self, format: FormatDescriptor) -> Result<()> {
        format.encoding()?;
        self.formats.push(format);
        Ok(())
    }

    /// Decides whether a buffer of `len` bytes may be fed. Marks the
    /// processor working unless the buffer is skipped or rejected.
    pub(crate) fn admit(&mut self, len: usize) -> Result<Admission> {
        if self.state != State::Idle {
            return Err(Error::Busy);
        }
        let Some(format) = self.formats.first() else {
            return Err(Error::NoFormat);
        };
        if len == 0 {
            return Ok(Admission::Skip);
        }
        let encoding = format.encoding()?;

        self.state = State::Working;
        if self.gain == 1.0 {
            Ok(Admission::Identity)
        } else {
            Ok(Admission::Scale {
                encoding,
                gain: self.gain,
            })
        }
    }

    /// Commits a completed job. Only the most recently queued format
    /// survives.
    pub(crate) fn finish(&mut self) -> Finish {
        if self.state == State::PendingDestruction {
            return Finish::Destroy;
        }
        self.state = State::Idle;
        if self.formats.len() > 1 {
            let stale = self.formats.len() - 1;
            self.formats.drain(..stale);
        }
        Finish::Notify
    }

    /// Handles release of the caller's handle. Returns true if the processor
    /// must be destroyed now.
    pub(crate) fn release(&mut self) -> bool {
        match self.state {
            State::Idle => true,
            State::Working => {
                self.state = State::PendingDestruction;
                false
            }
            State::PendingDestruction => false,
        }
    }

    pub(crate) fn take_callback(&mut self) -> Option<Callback<B>> {
        self.on_complete.take()
    }

    pub(crate) fn restore_callback(&mut self, cb: Callback<B>) {
        self.on_complete = Some(cb);
    }
}

impl<B> Drop for Processor<B> {
    fn drop(&mut self) {
        tracing::debug!(id = %self.id, "multiply: processor destroyed");
    }
}

/// Caller's handle to a gain processor.
///
/// Handles are not `Send`: configuration, feeding and completion callbacks
/// all happen on the thread that owns the event loop.
pub struct GainProcessor<B: Buffer = Vec<u8>> {
    id: ProcessorId,
    shared: Weak<Shared<B>>,
}

impl<B: Buffer> GainProcessor<B> {
    pub(crate) fn new(id: ProcessorId, shared: Weak<Shared<B>>) -> Self {
        Self { id, shared }
    }

    pub fn id(&self) -> ProcessorId {
        self.id
    }

    pub fn gain(&self) -> Result<f32> {
        self.with(|p| p.gain())
    }

    pub fn state(&self) -> Result<State> {
        self.with(|p| p.state())
    }

    /// Returns true from `feed` until the completion has been handled.
    pub fn is_working(&self) -> Result<bool> {
        self.with(|p| p.state() != State::Idle)
    }

    /// Returns the queued formats, oldest first.
    pub fn formats(&self) -> Result<Vec<FormatDescriptor>> {
        self.with(|p| p.formats().to_vec())
    }

    /// Queues a format. The next job uses the oldest queued format; after it
    /// completes only the newest one is kept.
    pub fn queue_format(&self, format: FormatDescriptor) -> Result<()> {
        self.with(|p| p.queue_format(format))?
    }

    /// Lends `buffer` to the processor and scales it in the background.
    ///
    /// Returns immediately. The buffer comes back through the completion
    /// callback once the loop dispatches the completion. A zero-length
    /// buffer is a no-op: no job runs and no callback fires.
    ///
    /// Rejected buffers are returned inside the [`FeedError`].
    pub fn feed(&self, buffer: B) -> std::result::Result<(), FeedError<B>> {
        match self.shared.upgrade() {
            Some(shared) => shared.feed(self.id, buffer),
            None => Err(FeedError::new(Error::Closed, buffer)),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut Processor<B>) -> R) -> Result<R> {
        let shared = self.shared.upgrade().ok_or(Error::Closed)?;
        shared.with_processor(self.id, f)
    }
}

impl<B: Buffer> fmt::Debug for GainProcessor<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GainProcessor").field("id", &self.id).finish()
    }
}

impl<B: Buffer> Drop for GainProcessor<B> {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.release(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processor(gain: f32) -> Processor<Vec<u8>> {
        Processor::new(ProcessorId(1), gain, Box::new(|_| Ok(())))
    }

    const F1: FormatDescriptor = FormatDescriptor::new(2, 16, 44100, true);
    const F2: FormatDescriptor = FormatDescriptor::new(1, 24, 48000, false);

    #[test]
    fn test_admit_requires_format() {
        let mut p = processor(2.0);
        assert!(matches!(p.admit(4), Err(Error::NoFormat)));
        assert_eq!(p.state(), State::Idle);
    }

    #[test]
    fn test_admit_empty_buffer_is_skipped() {
        let mut p = processor(2.0);
        p.queue_format(F1).unwrap();
        assert_eq!(p.admit(0).unwrap(), Admission::Skip);
        assert_eq!(p.state(), State::Idle);
    }

    #[test]
    fn test_admit_uses_first_format() {
        let mut p = processor(0.5);
        p.queue_format(F1).unwrap();
        p.queue_format(F2).unwrap();
        assert_eq!(
            p.admit(8).unwrap(),
            Admission::Scale {
                encoding: Encoding::S16LE,
                gain: 0.5
            }
        );
        assert_eq!(p.state(), State::Working);
    }

    #[test]
    fn test_admit_busy() {
        let mut p = processor(2.0);
        p.queue_format(F1).unwrap();
        p.admit(2).unwrap();
        assert!(matches!(p.admit(2), Err(Error::Busy)));
        assert_eq!(p.state(), State::Working);
    }

    #[test]
    fn test_admit_identity_gain() {
        let mut p = processor(1.0);
        p.queue_format(F1).unwrap();
        assert_eq!(p.admit(2).unwrap(), Admission::Identity);
        assert_eq!(p.state(), State::Working);
    }

    #[test]
    fn test_queue_format_rejects_unsupported_depth() {
        let mut p = processor(2.0);
        let err = p.queue_format(FormatDescriptor::new(2, 12, 44100, true)).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(p.formats().is_empty());
    }

    #[test]
    fn test_finish_collapses_to_last_format() {
        let mut p = processor(2.0);
        p.queue_format(F1).unwrap();
        p.queue_format(F2).unwrap();
        p.queue_format(F1).unwrap();
        p.queue_format(F2).unwrap();
        p.admit(6).unwrap();
        assert_eq!(p.finish(), Finish::Notify);
        assert_eq!(p.formats(), &[F2]);
        assert_eq!(p.state(), State::Idle);
    }

    #[test]
    fn test_finish_single_format_kept() {
        let mut p = processor(2.0);
        p.queue_format(F1).unwrap();
        p.admit(2).unwrap();
        p.finish();
        assert_eq!(p.formats(), &[F1]);
    }

    #[test]
    fn test_release_idle_destroys() {
        let mut p = processor(2.0);
        assert!(p.release());
    }

    #[test]
    fn test_release_working_defers() {
        let mut p = processor(2.0);
        p.queue_format(F1).unwrap();
        p.admit(2).unwrap();
        assert!(!p.release());
        assert_eq!(p.state(), State::PendingDestruction);
        assert!(!p.release());
        assert_eq!(p.finish(), Finish::Destroy);
    }

    #[test]
    fn test_processor_id_display() {
        assert_eq!(ProcessorId(7).to_string(), "processor-7");
    }
}
