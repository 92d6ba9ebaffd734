//! # lib_common
//!
//! Shared building blocks for the crypto market terminal. Every folder is a
//! feature-gated module so binaries only compile what they use.
//!
//! Data flows upstream API -> (optional proxy) -> `validation` -> `ingestors`
//! -> `core::store` -> subscribed views.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// Strict parse-or-reject schemas for upstream payloads.
#[cfg(feature = "validation")]
pub mod validation;

/// Generic HTTP retrieval with retry middleware.
#[cfg(feature = "retrieve")]
pub mod retrieve;

/// Upstream market data clients.
#[cfg(feature = "markets")]
pub mod markets;

/// Persistent connections to external services (Redis).
#[cfg(feature = "connections")]
pub mod connections;

/// Store, snapshots, quota limiter and the feed mode state machine.
#[cfg(feature = "core")]
pub mod core;

/// Source synchronizers that keep the store fresh.
#[cfg(feature = "ingestors")]
pub mod ingestors;
