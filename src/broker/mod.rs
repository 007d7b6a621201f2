//! Task Broker: the durable queue and scheduler that decouples job/document
//! lifecycle decisions from the workers that actually rasterize, extract,
//! and post-process.

pub mod queue;
pub mod scheduler;
pub mod task;

pub use queue::TaskQueue;
pub use scheduler::{Scheduler, TaskHandler};
pub use task::{Task, TaskStatus};
