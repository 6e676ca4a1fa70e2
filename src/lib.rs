//! Agent Ops: background research-report jobs over an HTTP API.

pub mod api;
pub mod config;
pub mod error;
pub mod generators;
pub mod jobs;
pub mod llm;
pub mod metrics;
pub mod sandbox;
pub mod store;
