//! # Rehabflow Core Library
//!
//! This library provides the session state engine for guided rehabilitation
//! routines. It implements a CLI-first philosophy where all operations are
//! available via a standalone CLI binary over the same core library.
//!
//! ## Architecture
//!
//! - **Countdown**: A wall-clock-reconciled countdown that requires the caller
//!   to periodically invoke `poll()`
//! - **Phase machine**: Pure transition function for an exercise's runtime
//! - **Session reducer**: Pure `(state, action, catalog) -> state` function
//!   owning exercise order, rep/set bookkeeping and the skip queue
//! - **Storage**: Versioned session snapshots over a key-value store (SQLite),
//!   TOML-based configuration
//!
//! ## Key Components
//!
//! - [`reduce`]: Session reducer
//! - [`SessionEngine`]: Reducer + persistence + countdown wiring
//! - [`SessionStore`]: Persistence gateway
//! - [`Countdown`]: Countdown controller
//! - [`Config`]: Application configuration management

pub mod catalog;
pub mod error;
pub mod events;
pub mod session;
pub mod storage;
pub mod timer;

pub use catalog::{Exercise, Program};
pub use error::{CatalogError, ConfigError, CoreError, DatabaseError, StorageError, ValidationError};
pub use events::Event;
pub use session::{
    reduce, reduce_slot, Action, ActionKind, PassPhase, SessionEngine, SessionState, SessionStatus,
};
pub use storage::{Config, Database, KeyValueStore, MemoryStore, SessionStore};
pub use timer::{format_remaining, Countdown, CountdownSignal, MonotonicClock, RuntimePhase};
