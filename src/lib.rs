//! Quarry - a caching client for cloud SQL query services.
//!
//! Queries are normalized and bound, looked up in a local and a remote
//! cache, and only submitted when no reusable execution exists. Submitted
//! executions are polled to completion and their results decoded into
//! typed rows.

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod query;
pub mod results;
pub mod service;
pub mod sql;
pub mod storage;

pub use client::Client;
pub use config::{ClientConfig, ConfigOverrides};
pub use error::{QuarryError, Result};
pub use query::{Origin, QueryHandle};
pub use results::{QueryResults, Value};
pub use sql::{Params, SqlParam};
