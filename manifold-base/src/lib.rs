//! # manifold-base
//!
//! Bootstrap utilities for manifold applications: configuration loading
//! and merging from JSON sources, tracing subscriber setup, and the
//! runtime that owns the process-lifetime root context.
//!
//! ## Quick Start
//!
//! ```rust
//! use manifold::{ModuleOptions, Provider, Token};
//! use manifold_base::{Config, Runtime};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let config = Config::parse(r#"{"modules": {"default_scope": "transient"}}"#)?;
//! let runtime = Runtime::with_config(&config)?;
//! let module = runtime
//!     .build_module(
//!         ModuleOptions::new("app")
//!             .provider(Provider::value(Token::named("name"), "manifold".to_string())),
//!     )
//!     .await?;
//! assert_eq!(module.get::<String>(&Token::named("name"))?.as_str(), "manifold");
//! # Ok(())
//! # }
//! ```

mod config;
mod logging;
mod runtime;

pub use config::*;
pub use logging::*;
pub use runtime::*;

pub use async_trait::async_trait;

/// Type alias for boxed errors that can be sent across threads.
pub type StdError = Box<dyn std::error::Error + Send + Sync>;
