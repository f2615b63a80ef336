//! # Refsmith Core
//!
//! Core library for placeholder resolution.
//!
//! This crate provides:
//! - Placeholder parsing and classification (`{{namespace:identifier}}`)
//! - A provider trait with built-in env, vault CLI, OAuth, and alias providers
//! - A cycle-safe, timeout-bounded resolution queue with a redacted audit trail
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use refsmith_core::{Config, Resolver};
//!
//! async fn render(template: &str) -> anyhow::Result<String> {
//!     let resolver = Resolver::initialize(Config::load(None)?).await?;
//!     let result = resolver.resolve(template, &[]).await;
//!     Ok(result.text)
//! }
//! ```

pub mod audit;
pub mod cache;
pub mod config;
pub mod error;
pub mod provider;
pub mod queue;
pub mod reference;
pub mod registry;
pub mod resolver;
pub mod secret;

// Re-export commonly used types at crate root
pub use reference::{
    classify,
    extract_references,
    has_references,
    Reference,
};

pub use error::{
    ErrorKind,
    ProviderError,
    RefsmithError,
};

pub use secret::Secret;

pub use cache::TtlCache;

pub use config::Config;

pub use provider::Provider;

pub use registry::{
    ProviderRegistry,
    ProviderStatus,
};

pub use queue::{
    Failure,
    ResolutionQueue,
    RunResult,
};

pub use audit::{
    AuditEntry,
    AuditStatus,
    AuditTrail,
};

pub use resolver::Resolver;
