//! rafter-lib: the core of the rafter build tool.
//!
//! The pieces fit together as a pipeline:
//! - [`script`]: build scripts are evaluated into raw declarations
//! - [`model`]: declarations are resolved into a rule/target graph, cached
//!   across invocations, and materialized into a job graph for requested
//!   goals
//! - [`queue`]: the generic dependency-ordered scheduler the model
//!   populates
//! - [`exec`]: the parallel executor that drains the queue
//!
//! [`symbol`] underpins all of it with interned name handles.

pub mod consts;
pub mod exec;
pub mod model;
pub mod queue;
pub mod script;
pub mod symbol;
