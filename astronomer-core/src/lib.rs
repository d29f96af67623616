//! # astronomer-core
//!
//! Core library for astronomer - an analytics envelope normalizer.
//!
//! This library provides:
//! - Envelope assembly for page, identify, track, group and alias calls
//! - Identity resolution and context enrichment (campaign, referrer)
//! - Cookie jar and local store persistence with SQLite
//! - Delivery to the Astronomer ingestion API
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Example
//!
//! ```rust,no_run
//! use astronomer_core::{Config, Database, PageEnvironment, RawCall, Tracker, UserState};
//!
//! let config = Config::load().expect("failed to load config");
//! let db = Database::open(&Config::database_path()).expect("failed to open database");
//! let tracker = Tracker::new(&config, db).expect("failed to create tracker");
//!
//! let page = PageEnvironment::from_url("https://example.com/?utm_source=news", "Mozilla/5.0")
//!     .expect("invalid page url");
//! let envelope = tracker
//!     .normalize(RawCall::track("Signed Up"), &UserState::default(), &page)
//!     .expect("invalid call");
//! println!("{}", serde_json::to_string_pretty(&envelope).unwrap());
//! ```

// Re-export commonly used items at the crate root
pub use collector::{Delivery, Dispatcher, Endpoint, Envelope, EnvelopeBuilder, RawCall, Tracker};
pub use config::Config;
pub use context::{Campaign, Context, ContextEnricher, Referrer, ReferrerNetworks};
pub use db::Database;
pub use error::{Error, Result};
pub use identity::{IdentityResolver, UserState};
pub use page::{PageEnvironment, Scheme};
pub use storage::{KeyValueStore, StorageSelector};

// Public modules
pub mod collector;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod identity;
pub mod logging;
pub mod page;
pub mod storage;
