//! applywright: a job-board automation engine.
//!
//! Crawls search-result pages on LinkedIn, Indeed and Upwork into a local
//! store, scores the results, and drives native apply flows, pacing itself
//! like a careful human and shutting itself off when a site starts failing
//! systematically.

pub mod browser;
pub mod core;
pub mod healing;
pub mod inference;
pub mod platforms;
pub mod resilience;
pub mod runner;
pub mod services;

pub use crate::core::config::{load_config, AppConfig, EngineConfig};
pub use crate::core::errors::AutomationError;
pub use crate::core::types::{
    AutomationEvent, AutomationStatus, JobListing, JobStatus, Platform, RunState, SearchProfile,
};
pub use crate::runner::{AutomationRunner, RunnerDeps};
