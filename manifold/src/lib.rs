//! # manifold
//!
//! A dependency-injection module runtime for Rust applications: modules
//! bundle providers, import each other, and re-export what importers may
//! see, with the whole graph staying mutable at run time.
//!
//! ## Core Concepts
//!
//! - **Module**: a named DI scope owning providers, imports, and exports
//! - **Provider**: a recipe binding an injection token to a class, value,
//!   or factory
//! - **Export proxy**: the per-import layer exposing an imported module's
//!   exports inside the importer's container, kept in sync with live
//!   export changes
//! - **Middleware**: typed interceptors able to veto, transform, or
//!   filter every graph mutation and access
//! - **Root context**: explicit owner of the root module and the
//!   global-module registry
//!
//! ## Basic Usage
//!
//! Wiring two modules through an export:
//!
//! ```rust
//! use manifold::{Module, ModuleOptions, Provider, RootContext, Token};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let ctx = RootContext::new();
//! let config = Module::build(
//!     ModuleOptions::new("config")
//!         .provider(Provider::value(
//!             Token::named("database_url"),
//!             "sqlite::memory:".to_string(),
//!         ))
//!         .export_provider(Token::named("database_url")),
//!     &ctx,
//! )
//! .await?;
//!
//! let app = Module::build(ModuleOptions::new("app").import(config), &ctx).await?;
//! let url = app.get::<String>(&Token::named("database_url"))?;
//! assert_eq!(url.as_str(), "sqlite::memory:");
//! # Ok(())
//! # }
//! ```
//!
//! ## Constructor-Built Providers
//!
//! Types implementing [`Injectable`] self-bind and resolve their own
//! dependencies through the container:
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use manifold::{
//!     Injectable, Module, ModuleError, ModuleOptions, Provider, ResolveContext, RootContext,
//!     Token,
//! };
//!
//! struct Database {
//!     url: Arc<String>,
//! }
//!
//! impl Injectable for Database {
//!     fn build(ctx: &ResolveContext<'_>) -> Result<Self, ModuleError> {
//!         Ok(Self {
//!             url: ctx.get(&Token::named("database_url"))?,
//!         })
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let ctx = RootContext::new();
//! let storage = Module::build(
//!     ModuleOptions::new("storage")
//!         .provider(Provider::value(
//!             Token::named("database_url"),
//!             "postgres://localhost".to_string(),
//!         ))
//!         .provider(Provider::class::<Database>()),
//!     &ctx,
//! )
//! .await?;
//! let database = storage.resolve::<Database>()?;
//! assert_eq!(database.url.as_str(), "postgres://localhost");
//! # Ok(())
//! # }
//! ```
//!
//! ## Live Graph Mutation
//!
//! Imports, providers, and exports can be added and removed after
//! construction through [`ModuleUpdateExt::update`]; export proxies and
//! event subscriptions follow every change:
//!
//! ```rust
//! use manifold::{Module, ModuleOptions, ModuleUpdateExt as _, Provider, RootContext, Token};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let ctx = RootContext::new();
//! let library = Module::build(ModuleOptions::new("library"), &ctx).await?;
//! let app = Module::build(
//!     ModuleOptions::new("app").import(library.clone()),
//!     &ctx,
//! )
//! .await?;
//!
//! // Exported after the import was made; the importer sees it anyway.
//! library
//!     .update()
//!     .add_provider(Provider::value(Token::named("answer"), 42i64), true)?;
//! assert_eq!(*app.get::<i64>(&Token::named("answer"))?, 42);
//! # Ok(())
//! # }
//! ```

mod container;
mod context;
mod definition;
mod error;
mod event;
mod middleware;
mod module;
mod provider;
mod proxy;
mod signal;
mod token;

pub use container::*;
pub use context::*;
pub use definition::*;
pub use error::*;
pub use event::*;
pub use middleware::*;
pub use module::*;
pub use provider::*;
pub use signal::*;
pub use token::*;
