//! Storage provider abstraction for Keyward.
//!
//! The vault core only needs a durable key-value area (encrypted vault blob
//! and salt record) and an ephemeral one (session mirror). This module
//! provides the trait both areas implement and a provider registry for
//! resolving backends by name.
//!
//! # Design Principles
//! - Provider isolation: No provider-specific logic in vault or crypto modules
//! - Async operations: All I/O operations are async
//! - Atomic replacement: a `put` either fully replaces the value or leaves
//!   the previous one untouched

pub mod local;
pub mod memory;
pub mod provider;
pub mod registry;

pub use local::LocalProvider;
pub use memory::MemoryProvider;
pub use provider::StorageProvider;
pub use registry::{create_default_registry, ProviderFactory, ProviderRegistry};
