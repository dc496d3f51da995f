//! Fixed-interval re-fetch loops, one per observed resource.

pub mod scheduler;

pub use scheduler::PollScheduler;
