pub mod calendar;
pub mod compare;
pub mod metrics;
pub mod monitoring;
pub mod scheduler;
pub mod service;
pub mod storage;
pub mod types;

pub use crate::types::*;
