//! hwmatch core library
//!
//! This library provides the hardware matching engine:
//! - Spec predicates and the backtracking matcher
//! - Range-expanding CMDB template generator
//! - CMDB allocation and persistence
//! - Ordered profile state with quotas, under an advisory lock
//! - Structured logging and CLI exit codes
//!
//! The binary entry point is in `main.rs`.

pub mod cmdb;
pub mod exit_codes;
pub mod generate;
pub mod lock;
pub mod logging;
pub mod matcher;
pub mod persist;
pub mod predicate;
pub mod state;

pub use cmdb::CmdbError;
pub use lock::{LockError, LockGuard, LockOptions};
pub use matcher::{Bindings, MatchError, Matcher};
pub use predicate::{PredicateError, PredicateRegistry};
pub use state::{HardwareInfo, ProfileMatch, State, StateError};
