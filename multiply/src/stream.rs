//! Chunk pipeline on top of a single processor.
//!
//! [`Multiply`] accepts chunks in order, feeds them to its processor one at
//! a time and collects the processed chunks in the same order. Partial
//! format updates are merged into the last known format before they are
//! queued.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use crate::error::{Error, Result};
use crate::event_loop::EventLoop;
use crate::format::{FormatDescriptor, FormatUpdate};
use crate::processor::{Buffer, GainProcessor};

struct Inner<B: Buffer> {
    processor: RefCell<Option<GainProcessor<B>>>,
    pending: RefCell<VecDeque<B>>,
    output: RefCell<VecDeque<B>>,
    in_flight: Cell<bool>,
    last_format: Cell<FormatUpdate>,
}

impl<B: Buffer> Inner<B> {
    /// Feeds the oldest pending chunk unless one is already in flight.
    fn pump(&self) -> Result<()> {
        if self.in_flight.get() {
            return Ok(());
        }
        loop {
            let Some(mut chunk) = self.pending.borrow_mut().pop_front() else {
                return Ok(());
            };
            if chunk.as_mut().is_empty() {
                // Feeding an empty chunk never completes; pass it through.
                self.output.borrow_mut().push_back(chunk);
                continue;
            }

            let processor = self.processor.borrow();
            let Some(processor) = processor.as_ref() else {
                self.pending.borrow_mut().push_front(chunk);
                return Err(Error::Closed);
            };

            self.in_flight.set(true);
            return match processor.feed(chunk) {
                Ok(()) => Ok(()),
                Err(e) => {
                    self.in_flight.set(false);
                    let (err, chunk) = e.into_parts();
                    self.pending.borrow_mut().push_front(chunk);
                    Err(err)
                }
            };
        }
    }

    fn on_complete(&self, chunk: B) -> Result<()> {
        self.in_flight.set(false);
        self.output.borrow_mut().push_back(chunk);
        self.pump()
    }
}

/// Scales a sequence of chunks through one processor.
///
/// Completions are delivered by the [`EventLoop`] the pipeline was created
/// on; call [`EventLoop::run`] to make progress.
pub struct Multiply<B: Buffer = Vec<u8>> {
    inner: Rc<Inner<B>>,
}

impl<B: Buffer> Multiply<B> {
    /// Creates a pipeline with a fixed gain. `format` is applied right away
    /// if it sets any field.
    pub fn new(event_loop: &EventLoop<B>, gain: f32, format: FormatUpdate) -> Result<Self> {
        let inner = Rc::new(Inner {
            processor: RefCell::new(None),
            pending: RefCell::new(VecDeque::new()),
            output: RefCell::new(VecDeque::new()),
            in_flight: Cell::new(false),
            last_format: Cell::new(FormatUpdate::default()),
        });

        let weak: Weak<Inner<B>> = Rc::downgrade(&inner);
        let processor = event_loop.create(gain, move |chunk| {
            if let Some(inner) = weak.upgrade() {
                inner.on_complete(chunk)?;
            }
            Ok(())
        })?;
        *inner.processor.borrow_mut() = Some(processor);

        let multiply = Self { inner };
        multiply.set_format(format)?;
        Ok(multiply)
    }

    /// Merges `update` into the last known format and queues the result.
    ///
    /// Returns `None` if `update` sets no field. Fails with
    /// [`Error::Configuration`] if the merged format is still incomplete or
    /// unsupported; the last known format is left unchanged in that case.
    pub fn set_format(&self, update: FormatUpdate) -> Result<Option<FormatDescriptor>> {
        let mut merged = self.inner.last_format.get();
        if !merged.merge(&update) {
            return Ok(None);
        }
        let format = merged.resolve()?;

        let processor = self.inner.processor.borrow();
        let processor = processor.as_ref().ok_or(Error::Closed)?;
        processor.queue_format(format)?;

        self.inner.last_format.set(merged);
        tracing::debug!(id = %processor.id(), ?format, "multiply: format queued");
        Ok(Some(format))
    }

    /// Returns the last merged format.
    pub fn format(&self) -> FormatUpdate {
        self.inner.last_format.get()
    }

    /// Queues a chunk for scaling.
    ///
    /// If feeding fails (for example because no format was set yet) the
    /// chunk stays queued and the error is returned.
    pub fn write(&self, chunk: B) -> Result<()> {
        self.inner.pending.borrow_mut().push_back(chunk);
        self.inner.pump()
    }

    /// Retries feeding queued chunks, e.g. after a format was set.
    pub fn flush(&self) -> Result<()> {
        self.inner.pump()
    }

    /// Pops the oldest processed chunk.
    pub fn read(&self) -> Option<B> {
        self.inner.output.borrow_mut().pop_front()
    }

    /// Returns the number of chunks written but not yet processed.
    pub fn pending(&self) -> usize {
        self.inner.pending.borrow().len() + usize::from(self.inner.in_flight.get())
    }

    pub fn processor(&self) -> Option<crate::processor::ProcessorId> {
        self.inner.processor.borrow().as_ref().map(|p| p.id())
    }
}
