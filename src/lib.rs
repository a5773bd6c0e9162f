//! Dispatch Engine - request dispatch decisions for a reverse proxy
//!
//! Decides, for every inbound request, whether it is proxied, to which
//! upstream target, and with which path. Moving bytes is left to a
//! [`dispatch::Transport`].

pub mod config;
pub mod dispatch;
pub mod error;
pub mod http;

pub use dispatch::{DispatchDecision, Dispatcher, Transport};
pub use error::{DispatchError, Result};
