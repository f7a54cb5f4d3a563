//! Client library for connecting to muninnd.
//!
//! Provides [`ServiceClient`], which implements [`CacheService`](crate::CacheService)
//! by forwarding calls to a remote muninnd instance over gRPC.

mod service_client;

pub use service_client::ServiceClient;
