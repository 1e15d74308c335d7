//! Ripple Core
//!
//! This crate provides fine-grained reactivity for dynamic object graphs.
//! It implements:
//!
//! - A property installer that turns plain objects and arrays into
//!   dependency-tracked graphs
//! - Dependency nodes and automatic dependency collection
//! - Watchers (eager, lazy, sync, deep) and computed values
//! - A batched, id-ordered flush scheduler and a deferred tick queue
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `value`: the dynamic value model (`Value`, `Object`, `Array`)
//! - `reactive`: dependency tracking, installation, and subscribers
//! - `schedule`: flush batching and tick arming
//! - `config`, `error`: runtime configuration and error reporting
//!
//! # Example
//!
//! ```rust,ignore
//! use ripple_core::reactive::{Owner, WatcherOptions};
//! use ripple_core::schedule::run_until_idle;
//! use ripple_core::Value;
//! use serde_json::json;
//!
//! let owner = Owner::new("counter", Value::from_json(&json!({ "count": 0 })));
//!
//! owner.watch("count", |new, old| {
//!     println!("count: {old} -> {new}");
//!     Ok(())
//! }, WatcherOptions::new())?;
//!
//! let data = owner.data().as_object().unwrap();
//! data.set("count", 1.into());
//! data.set("count", 2.into());
//!
//! // Both writes coalesce into one run: prints "count: 0 -> 2"
//! run_until_idle();
//! ```

pub mod config;
pub mod error;
pub mod reactive;
pub mod schedule;
pub mod value;

pub use config::Config;
pub use error::{ReactiveError, Result};
pub use value::{Array, Object, Value};
