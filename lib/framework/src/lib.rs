pub mod http;
pub mod signal;
pub mod tls;
pub mod trace;

#[macro_use]
extern crate tracing;

/// Basic error type, dynamically dispatched and safe to send across threads
pub type Error = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Basic result type, defined in terms of [`Error`] and generic over `T`
pub type Result<T> = std::result::Result<T, Error>;
