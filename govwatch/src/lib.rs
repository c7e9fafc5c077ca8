pub mod cli;
pub mod config;
pub mod db;
pub mod fetcher;
pub mod log;
pub mod notifier;
pub mod reconciler;
pub mod scheduler;

pub use crate::{reconciler::Reconciler, scheduler::Scheduler};
pub use govwatch_core as core;

#[macro_use]
extern crate slog;
#[macro_use]
extern crate serde_derive;
