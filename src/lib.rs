//! addr-acl: prefix-based access control tables for DNS servers
//!
//! This crate decides, for a given network address, whether a policy (query
//! access, zone transfer, recursion, rate limiting) permits or denies that
//! address. Entries are CIDR prefixes with permit/deny outcomes; matching is
//! longest-prefix with deterministic, security-relevant precedence that holds
//! under overlapping prefixes, negation, and nesting of named lists inside
//! other lists.
//!
//! # Features
//!
//! - **Compressed binary trie**: one structure for v4 and v6 prefixes,
//!   O(address width) insert and lookup regardless of entry count
//! - **Four outcome slots per node**: {transport, client-subnet} x {v4, v6},
//!   so the same prefix can answer differently per matching context
//! - **Negation-safe merge**: composing a list under a negation flips permits
//!   to denies but never turns a nested deny into a permit
//! - **Hot reload**: lock-free reads via atomic table swaps; old generations
//!   are freed by their last in-flight reader
//!
//! # Architecture
//!
//! ```text
//! config loader -> IpTable::insert_cidr / merge   (build phase, one thread)
//!                        |
//!                  into_shared()
//!                        |
//! request threads -> AclEngine::evaluate()        (steady state, lock-free)
//! ```
//!
//! # Quick Start
//!
//! ```
//! use addr_acl::{AclEngine, Action, AddrScope, IpTable};
//!
//! // Build: { 10.0.0.0/8; !10.1.0.0/16; }
//! let mut table = IpTable::new();
//! table.insert_cidr("10.1.0.0/16", Action::Deny, AddrScope::Transport)?;
//! table.insert_cidr("10.0.0.0/8", Action::Permit, AddrScope::Transport)?;
//!
//! // Serve: lock-free lookups, hot-reloadable.
//! let engine = AclEngine::new(table);
//! let addr = "10.2.3.4".parse().unwrap();
//! assert_eq!(engine.evaluate(addr, AddrScope::Transport), Some(Action::Permit));
//! let addr = "10.1.3.4".parse().unwrap();
//! assert_eq!(engine.evaluate(addr, AddrScope::Transport), Some(Action::Deny));
//! # Ok::<(), addr_acl::AclError>(())
//! ```
//!
//! # Modules
//!
//! - [`engine`]: hot-reloadable table holder
//! - [`error`]: error types
//! - [`key`]: prefix keys, outcome and scope discriminators
//! - [`table`]: access table build API and shared handles
//! - [`trie`]: the compressed prefix trie

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod engine;
pub mod error;
pub mod key;
pub mod table;
pub mod trie;

// Re-export commonly used types at the crate root
pub use engine::AclEngine;
pub use error::{AclError, Result};
pub use key::{Action, AddrScope, Family, PrefixKey, V4_MAXBITS, V6_MAXBITS};
pub use table::{IpTable, SharedTable};
pub use trie::PrefixTrie;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
