//! JPServe client library
//!
//! Runs Python scripts on a remote JPServe instance and returns the value
//! each script assigns to `_result_`:
//!
//! - `client` - connection management, framing and the script executor
//! - `result` - `ScriptResult`, the outcome of one execution
//! - `config` - connection settings and environment overrides
//! - `error` - `ClientError` taxonomy
//!
//! ```ignore
//! use std::sync::Arc;
//! use jpserve_client::{ClientConfig, ServeContext};
//!
//! let context = Arc::new(ServeContext::connect_with_config(&ClientConfig::from_env()?).await?);
//! let rs = context.executor().exec("_result_ = [1, 2, 3]").await;
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod result;

pub use client::{ConnectionState, ScriptExecutor, ServeContext, MAX_SCRIPT_SIZE};
pub use config::{ClientConfig, ConfigError};
pub use error::ClientError;
pub use result::ScriptResult;
