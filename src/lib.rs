//! Companion sensor sync library.
//!
//! Registers device sensors with one or more home-automation servers and
//! keeps their values, enabled flags and registrations in sync.

pub mod clock;
pub mod config;
pub mod error;
pub mod integration;
pub mod notifier;
pub mod sensors;
pub mod store;
pub mod sync;

#[cfg(test)]
pub(crate) mod test_support;
