#![deny(missing_docs)]
//! Pre-execution plan validation.
//!
//! [`PlanValidator::validate`] inspects a plan, the catalog plans it reaches
//! and the execution context, and either accepts the plan or returns the
//! first [`ValidationError`](stage0::ValidationError) found. It never
//! mutates anything and never invokes a handler, so a rejected plan has no
//! side effects.

mod config;
mod validator;

pub use config::{DEFAULT_MAX_PLAN_DEPTH, ValidatorConfig};
pub use validator::PlanValidator;
