//! Request descriptors.
//!
//! The dispatch core does not own any HTTP machinery. The transport hands
//! it a minimal descriptor of each inbound request:
//!
//! - **`request`**: the `Request` descriptor (method, raw request target,
//!   headers) and its builder
//! - **`parser`**: reads a descriptor out of a raw HTTP/1.x request head
//!
//! ```text
//!   raw bytes ──parser──▶ Request ──▶ Dispatcher::dispatch ──▶ DispatchDecision
//! ```

pub mod parser;
pub mod request;
