//! Hot-reloadable access table holder.
//!
//! The steady-state side of the crate: request threads evaluate addresses
//! against the current table generation without locking, while a reload
//! thread builds a replacement [`IpTable`] and swaps it in atomically. The
//! old generation is destroyed lazily, when the last in-flight reader drops
//! its pin — readers never observe a freed table.
//!
//! ```text
//! request thread -> AclEngine::evaluate() -> ArcSwap::load() -> IpTable
//!                                                 |
//!                                          (lock-free read)
//!
//! reload thread  -> AclEngine::reload()   -> ArcSwap::store() -> old table
//!                                                 |              dropped by its
//!                                           (atomic swap)        last reader
//! ```
//!
//! # Example
//!
//! ```
//! use addr_acl::{AclEngine, Action, AddrScope, IpTable};
//!
//! let mut table = IpTable::new();
//! table.insert_cidr("192.168.0.0/16", Action::Permit, AddrScope::Transport).unwrap();
//! let engine = AclEngine::new(table);
//!
//! let addr = "192.168.1.1".parse().unwrap();
//! assert_eq!(engine.evaluate(addr, AddrScope::Transport), Some(Action::Permit));
//!
//! // Reload with a replacement table; readers switch atomically.
//! let mut rebuilt = IpTable::new();
//! rebuilt.insert_cidr("192.168.0.0/16", Action::Deny, AddrScope::Transport).unwrap();
//! engine.reload(rebuilt);
//! assert_eq!(engine.evaluate(addr, AddrScope::Transport), Some(Action::Deny));
//! assert_eq!(engine.generation(), 2);
//! ```

use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::{ArcSwap, Guard};

use crate::key::{Action, AddrScope};
use crate::table::{IpTable, SharedTable};

/// Shares one access table between reader threads and a reload thread.
///
/// Reads are lock-free; reloads are atomic and wait-free. Safe to share
/// across threads behind an `Arc` or a `static`.
#[derive(Debug)]
pub struct AclEngine {
    table: ArcSwap<IpTable>,
    generation: AtomicU64,
}

impl AclEngine {
    /// Create an engine holding the first table generation.
    #[must_use]
    pub fn new(table: IpTable) -> Self {
        Self::from_shared(table.into_shared())
    }

    /// Create an engine from an already-shared table.
    #[must_use]
    pub fn from_shared(table: SharedTable) -> Self {
        Self {
            table: ArcSwap::new(table),
            generation: AtomicU64::new(1),
        }
    }

    /// Pin the current table generation.
    ///
    /// The returned guard keeps that generation alive for its lifetime, so a
    /// batch of lookups sees one consistent rule set even across a
    /// concurrent reload.
    pub fn load(&self) -> Guard<Arc<IpTable>> {
        self.table.load()
    }

    /// Swap in a replacement table.
    ///
    /// The previous generation stays alive until its last reader drops; the
    /// swap itself never blocks readers.
    pub fn reload(&self, table: IpTable) {
        self.reload_shared(table.into_shared());
    }

    /// Swap in an already-shared replacement table.
    pub fn reload_shared(&self, table: SharedTable) {
        let nodes = table.node_count();
        self.table.store(table);
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(generation, nodes, "access table reloaded");
    }

    /// Evaluate one address against the current generation.
    ///
    /// `None` means no entry matched; the policy layer picks the default.
    #[must_use]
    pub fn evaluate(&self, addr: IpAddr, scope: AddrScope) -> Option<Action> {
        self.table.load().lookup(addr, scope)
    }

    /// The current table generation, starting at 1. Useful for logging
    /// which configuration answered a request.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Relaxed)
    }
}
