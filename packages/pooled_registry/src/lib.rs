#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Keyed registries of pooled objects, one registry per value type, with lock-free lookups.
//!
//! A [`Registry<T>`] maps [`Identifier`]s to values of type `T`. The values live in a
//! fixed-capacity pool owned by the registry and are accessed through [`Handle`]s. Lookups never
//! block, even while other threads are creating, replacing or removing bindings.
//!
//! # Features
//!
//! - **Pooled storage**: each registry preallocates storage for a fixed number of values and
//!   constructs new values directly into it. Values never move once created.
//! - **Lock-free lookups**: [`Registry::find()`] does not take any lock and never observes a
//!   partially written binding.
//! - **Upsert semantics**: creating a binding for an identifier that is already bound replaces
//!   the existing binding.
//! - **Snapshot handles**: a [`Handle`] keeps referring to the value it was obtained for, even if
//!   the binding is later replaced or removed. The value is dropped and its storage reused once
//!   nothing refers to it anymore.
//! - **Generated identifiers**: values can be bound under identifiers generated by the registry,
//!   which never collide with caller-supplied ones.
//! - **Per-type instances**: [`Registry::instance()`] returns a process-wide registry for each
//!   value type, created on first use. Scoped collections are available via [`Registries`].
//! - **Configurable exhaustion**: when the pool is full, creation either fails with
//!   [`Error::OutOfCapacity`] or waits for storage to be released, per [`ExhaustionPolicy`].
//!
//! # Example
//!
//! ```
//! use std::thread;
//!
//! use pooled_registry::Registry;
//!
//! struct Player {
//!     name: String,
//!     score: u32,
//! }
//!
//! let players = Registry::<Player>::new();
//!
//! players
//!     .create("p1", Player {
//!         name: "Alice".to_string(),
//!         score: 120,
//!     })
//!     .unwrap();
//!
//! thread::scope(|s| {
//!     s.spawn(|| {
//!         let p1 = players.find("p1").unwrap();
//!         assert_eq!(p1.name, "Alice");
//!         assert_eq!(p1.score, 120);
//!     });
//! });
//!
//! // Replace the binding. Existing handles keep seeing the old value.
//! let old = players.find("p1").unwrap();
//!
//! players
//!     .create("p1", Player {
//!         name: "Alice".to_string(),
//!         score: 150,
//!     })
//!     .unwrap();
//!
//! assert_eq!(old.score, 120);
//! assert_eq!(players.find("p1").unwrap().score, 150);
//! ```
//!
//! # Metrics
//!
//! The package reports the following events via [`nm`]:
//!
//! * `pooled_registry_bindings_created` - a binding was created for a previously unbound
//!   identifier.
//! * `pooled_registry_bindings_replaced` - an existing binding was replaced.
//! * `pooled_registry_pool_exhausted` - creation failed because the pool was full.
//!
//! Registry construction, pool exhaustion and clearing are also logged via [`tracing`] at the
//! debug level, and waiting for storage under [`ExhaustionPolicy::Block`] at the trace level.

mod bindings;
mod builder;
mod entry;
mod error;
mod handle;
mod identifier;
mod pool;
mod registries;
mod registry;

pub use builder::*;
pub use error::*;
pub use handle::*;
pub use identifier::Identifier;
pub use pool::{ExhaustionPolicy, MAX_CAPACITY};
pub use registries::*;
pub use registry::*;
