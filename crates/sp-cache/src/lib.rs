//! # sp-cache
//!
//! Cache abstraction traits for the SAML 2.0 service provider.
//!
//! The correlation store (pending requests, established authentications,
//! replay detection) is written against these traits so that any concurrent
//! key-value cache with TTL support can back it.
//!
//! ## Cache Providers
//!
//! - [`CacheProvider`] - Basic key-value cache operations
//! - [`AtomicCacheProvider`] - Atomic operations (set-if-not-exists, get-and-delete)
//! - [`MemoryCacheProvider`] - In-process implementation of both
//!
//! ## Example
//!
//! ```ignore
//! use sp_cache::{CacheProvider, CacheResult};
//! use std::time::Duration;
//!
//! async fn remember(cache: &impl CacheProvider, id: &str, request: &Request) -> CacheResult<()> {
//!     cache.set(&format!("request:{id}"), request, Some(Duration::from_secs(600))).await
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod error;
pub mod memory;
pub mod provider;

pub use error::{CacheError, CacheResult};
pub use memory::MemoryCacheProvider;
pub use provider::{AtomicCacheProvider, CacheProvider};
