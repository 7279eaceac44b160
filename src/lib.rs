//! ZugChain Presale Relayer - Library interface
//!
//! Watches presale `Transfer` events on Ethereum and pays out the matching
//! vZUG amount from the ZugChain treasury, at most once per source transaction.
//!
//! Re-exports internal modules for use in the binary and integration tests.

pub mod api;
pub mod bounded_cache;
pub mod config;
pub mod contracts;
pub mod error;
pub mod events;
pub mod metrics;
pub mod relay;
pub mod shutdown;
pub mod state;
pub mod watchers;
pub mod writers;
