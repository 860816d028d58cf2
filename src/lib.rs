//! An implementation of the RSocket protocol: request / response, fire and forget, request stream
//!  and request channel interactions over a single multiplexed connection, with credit based flow
//!  control, fragmentation of large payloads and keep-alive.
//!
//! Application code talks to the peer through a [connection::Connection] (which implements
//!  [rsocket::RSocket]), and handles the peer's requests through its own [rsocket::RSocket]
//!  implementation, provided per connection by a [connection::ConnectionAcceptor].

pub mod buffer_pool;
pub mod config;
pub mod connection;
pub mod error;
pub mod frame;
pub mod limiter;
pub mod metadata;
pub mod operation;
pub mod payload;
pub mod rsocket;
pub mod stream_id;
pub mod streams;
pub mod termination;
pub mod transport;

#[cfg(test)]
mod test_util;
