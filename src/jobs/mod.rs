//! Research jobs: records, background execution and follow-up chat.

pub mod chat;
pub mod manager;
pub mod model;

pub use manager::JobManager;
pub use model::{Job, JobStatus, JobType, Output};
