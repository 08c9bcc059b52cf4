// Copyright 2026 Listing Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! Marketplace listing extraction.
//!
//! Given a public listing URL, [`Engine`] picks the matching platform
//! adapter, pulls the listing's fields from the page, and normalizes them
//! into a [`CanonicalItem`].
//!
//! ```no_run
//! # async fn run() -> listing_engine::ExtractResult<()> {
//! use listing_engine::{Engine, EngineConfig};
//!
//! let engine = Engine::new(EngineConfig::from_env());
//! let item = engine.extract("https://offerup.com/item/detail/123").await?;
//! println!("{} - ${}", item.title, item.price);
//! engine.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod browser;
pub mod candidates;
pub mod config;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod item;
pub mod normalize;
pub mod patterns;
pub mod platforms;
pub mod structured;

pub use config::{BrowserConfig, EngineConfig};
pub use engine::Engine;
pub use error::{ExtractError, ExtractResult, TransportError};
pub use item::{CanonicalItem, Condition, ItemField, PartialDataWarning};
pub use normalize::{normalize, RawFields};
pub use platforms::{marketplace_label, Platform};
