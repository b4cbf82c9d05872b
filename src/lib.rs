//! `speedgate`: scheduled network-performance scenarios judged against
//! declarative expectations.
//!
//! - [`metrics`] scopes, aggregates and compares measured series
//! - [`scheduler`] fires scenarios on once/recurring/every/daily/weekly/hourly
//!   schedules and tracks each job to completion
//! - [`runner`] connects firings to measurement sources and result sinks
//! - [`config`] loads scenario documents and layered settings

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod runner;
pub mod scheduler;
pub mod util;

pub use error::{ErrorCode, Result, SpeedgateError, StructuredError};
pub use metrics::{EvalContext, ExpectationEvaluator};
pub use model::{DataPoint, EvaluationResult, Expectation, ExpectedValue, Verdict};
pub use scheduler::{Scheduler, SchedulerOptions, SchedulerStatus, StopHandle};
