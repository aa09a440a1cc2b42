//! Client for the JPServe remote Python script executor.
//!
//! JPServe executes Python scripts sent over a TCP connection and replies
//! with the value the script bound to `_result_`.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐          TCP socket          ┌──────────────────┐
//! │  ScriptExecutor  │                              │                  │
//! │        │         │  ◄─────────────────────────► │     JPServe      │
//! │   ServeContext   │   #!{ ... #!} line frames    │     (Python)     │
//! └──────────────────┘                              └──────────────────┘
//! ```
//!
//! # Protocol
//!
//! Both directions use sentinel marker lines with CRLF line breaks:
//!
//! ```text
//! #!{\r\n
//! _result_ = 'Hello World!'\r\n
//! #!}\r\n
//! ```
//!
//! The response frame carries `{"success": .., "msg": .., "result": ..}`.
//! Closing the session sends `#!exit\r\n`.
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use jpserve_client::client::ServeContext;
//!
//! let context = Arc::new(ServeContext::connect("localhost", 8888).await?);
//! let rs = context.executor().exec("a = 2\nb = 3\n_result_ = a * b").await;
//! if rs.is_success() {
//!     println!("{}", rs.payload().unwrap_or_default());
//! }
//! context.close().await;
//! ```

mod context;
mod executor;
mod framing;

pub use context::{ConnectionState, ServeContext};
pub use executor::{ScriptExecutor, MAX_SCRIPT_SIZE};
pub use framing::{
    decode_response, encode_request, encode_response, read_frame, read_frame_with_limit,
    write_frame, FrameParser, CMD_EXIT, LINE_BREAK, MARK_BEGIN, MARK_END, MAX_RESPONSE_SIZE,
};
