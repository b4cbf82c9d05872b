//! Metrics evaluation engine.
//!
//! - [`aggregation`] - Aggregator: reduce values to one statistic
//! - [`operator`] - Comparator: judge a statistic against an expected value
//! - [`scope`] - ScopeSelector: pick the relevant slice of a series
//! - [`ingest`] - Turn raw records and scalars into `DataPoint`s
//! - [`evaluator`] - ExpectationEvaluator: the pipeline plus history

pub mod aggregation;
pub mod evaluator;
pub mod ingest;
pub mod operator;
pub mod scope;

pub use aggregation::{Aggregation, Estimator};
pub use evaluator::{
    EvalContext, ExpectationEvaluator, Export, MetricStats, ResolvedExpectation, Summary,
};
pub use ingest::{RawPoint, normalize_points, record_points};
pub use operator::{CompareOptions, Inclusive, Operator, compare};
pub use scope::{Scope, ScopeParams, cumulative_success_rate};

use serde::Serialize;

/// Everything `sg methods` lists.
#[derive(Debug, Clone, Serialize)]
pub struct Catalogue {
    pub aggregations: Vec<aggregation::MethodInfo>,
    pub operators: Vec<operator::OperatorInfo>,
    pub scopes: Vec<scope::ScopeInfo>,
}

#[must_use]
pub fn describe() -> Catalogue {
    Catalogue {
        aggregations: aggregation::catalogue(),
        operators: operator::catalogue(),
        scopes: scope::catalogue(),
    }
}
