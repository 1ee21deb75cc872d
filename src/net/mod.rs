//! Request/response types and the network transport.

mod client;
mod types;

pub use client::{HttpTransport, Transport};
pub use types::{Request, RequestKey, Response, OFFLINE_PAGE};
