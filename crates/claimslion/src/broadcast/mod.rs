//! Broadcasting of job lifecycle events to in-process subscribers.

pub mod job_events;

pub use job_events::{JobEvent, JobEventBroadcaster};
