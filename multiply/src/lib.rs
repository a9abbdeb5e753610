//! In-place gain scaling for raw PCM buffers.
//!
//! This crate multiplies every sample of a raw PCM buffer by a fixed gain,
//! in place, on a background worker pool:
//!
//! - `format`: format descriptors and the eight supported sample encodings
//!   (8/16/24/32-bit, signed or unsigned, little-endian)
//! - `scale`: the per-encoding scalers, including packed 24-bit samples
//! - `processor`: gain processors, at most one job in flight each, and their
//!   release/destruction lifecycle
//! - `event_loop`: the caller-facing loop that submits jobs and dispatches
//!   completions
//! - `stream`: an ordered chunk pipeline on top of one processor
//!
//! Overflowing products wrap around to the sample width; nothing is clamped.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use multiply_pcm::{EventLoop, FormatDescriptor, Inline, LoopOptions, RunMode};
//!
//! let event_loop: EventLoop = EventLoop::with_executor(Arc::new(Inline), LoopOptions::default());
//! let processor = event_loop
//!     .create(2.0, |buffer| {
//!         assert_eq!(buffer, vec![20, 0, 0xF6, 0xFF]);
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! processor.queue_format(FormatDescriptor::S16_MONO_16K).unwrap();
//! processor.feed(vec![10, 0, 0xFB, 0xFF]).unwrap(); // [10, -5]
//! assert_eq!(event_loop.run(RunMode::Default).unwrap(), 1);
//! ```

mod error;
mod event_loop;
mod executor;
mod format;
mod processor;
mod scale;
mod stream;

pub use error::{CallbackError, Error, FeedError, Result};
pub use event_loop::{DestroyHook, EventLoop, LoopOptions, RunMode};
pub use executor::{Executor, Inline, Job, PoolOptions, WorkerPool};
pub use format::{Encoding, FormatDescriptor, FormatUpdate};
pub use processor::{Buffer, Callback, GainProcessor, ProcessorId, State};
pub use scale::{DATA_BITS_MASK, SIGN_BIT_MASK, UNSIGNED_DATA_BITS_MASK, scale_s24le, scale_u24le};
pub use stream::Multiply;
