//! Core data primitives for the gridbase SDK.
//!
//! This crate is the pure layer under the SDK front end: no I/O, no model
//! objects, no backend talk. It defines
//!
//! - the [`watchable`] pub/sub primitive every stateful model builds on,
//! - the [`mutation`] taxonomy (every change a client may request),
//! - the batch/payload [`limits`] a mutation must stay under,
//! - the [`model_change`] patcher that writes `{path, value}` batches into
//!   the cached base tree,
//! - the [`config_store`] operations behind the global-config store,
//! - [`path`] string helpers and client-side [`ids`].

pub mod config_store;
pub mod ids;
pub mod limits;
pub mod model_change;
pub mod mutation;
pub mod path;
pub mod watchable;
