//! Background processing of pending jobs.
//!
//! Uploads are handed to the [`Dispatcher`] straight away; the
//! [`QueueSweeper`] catches anything left pending. Both go through
//! [`JobProcessor::process`], whose conditional claim is the only way a job
//! enters `processing`, so a job is never analyzed twice.

pub mod dispatcher;
pub mod processor;
pub mod sweeper;

pub use dispatcher::Dispatcher;
pub use processor::{JobProcessor, ProcessOutcome};
pub use sweeper::{QueueSweeper, INTERRUPTED_MESSAGE};
