//! Broadcasting of job lifecycle events.
//!
//! Events are informational. The job store stays the source of truth, and
//! a send with no subscribers is not an error.

pub mod job_events;

pub use job_events::{JobEvent, JobEventBroadcaster, JobEventKind};
