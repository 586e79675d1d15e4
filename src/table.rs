//! Access tables: the build-phase API over the prefix trie.
//!
//! An [`IpTable`] is built single-threaded by the configuration loader —
//! repeated [`insert_prefix`](IpTable::insert_prefix) calls plus
//! [`merge`](IpTable::merge) for nested named lists — then frozen into a
//! [`SharedTable`] for the steady-state phase, where any number of reader
//! threads may look addresses up concurrently. Sharing and teardown are
//! `Arc` semantics: cloning the handle attaches a reader, dropping it
//! detaches one, and the trie is destroyed when the last handle goes away.
//! A detach past zero is unrepresentable.
//!
//! # Example
//!
//! ```
//! use addr_acl::{Action, AddrScope, IpTable};
//!
//! let mut table = IpTable::new();
//! table.insert_cidr("10.0.0.0/8", Action::Permit, AddrScope::Transport).unwrap();
//! table.insert_cidr("10.1.0.0/16", Action::Deny, AddrScope::Transport).unwrap();
//!
//! let addr = "10.1.2.3".parse().unwrap();
//! assert_eq!(table.lookup(addr, AddrScope::Transport), Some(Action::Deny));
//! let addr = "10.2.2.3".parse().unwrap();
//! assert_eq!(table.lookup(addr, AddrScope::Transport), Some(Action::Permit));
//! let addr = "192.168.0.1".parse().unwrap();
//! assert_eq!(table.lookup(addr, AddrScope::Transport), None);
//! ```

use std::net::IpAddr;
use std::sync::Arc;

use ipnet::IpNet;

use crate::error::AclError;
use crate::key::{addr_bits, slot_index, Action, AddrScope, PrefixKey, SLOT_COUNT};
use crate::trie::PrefixTrie;

/// A frozen, shareable access table.
///
/// Clone to attach another reader context; drop to detach. The underlying
/// trie is torn down when the last handle drops, which may be a request
/// thread rather than the reload thread that replaced the table.
pub type SharedTable = Arc<IpTable>;

/// An access table: one prefix trie plus the insertion sequence counter.
///
/// Lookup returns a ternary result through `Option`: `Some(Permit)`,
/// `Some(Deny)`, or `None` for "no entry matched" — the caller decides the
/// default for the unmatched case.
#[derive(Debug, Default)]
pub struct IpTable {
    trie: PrefixTrie,
    next_seq: u64,
}

impl IpTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            trie: PrefixTrie::new(),
            next_seq: 1,
        }
    }

    /// Insert a prefix with the given outcome for one slot.
    ///
    /// First write wins: if the (prefix, family, scope) slot is already
    /// decided, the table is left untouched and `false` is returned — even
    /// when the new `action` differs. Returns `true` when the slot was newly
    /// set.
    ///
    /// # Panics
    ///
    /// Panics if `bitlen` exceeds the width of `addr`'s family; see
    /// [`PrefixKey::from_addr`].
    pub fn insert_prefix(
        &mut self,
        addr: IpAddr,
        bitlen: u8,
        action: Action,
        scope: AddrScope,
    ) -> bool {
        let key = PrefixKey::from_addr(addr, bitlen);
        let slot = slot_index(addr.is_ipv6(), scope);
        let seq = self.next_seq;
        let node = self.trie.insert(key);
        let set = node.set_if_unset(slot, action, seq);
        if set {
            self.next_seq += 1;
        }
        set
    }

    /// Insert a prefix given in CIDR text form (`10.0.0.0/8`,
    /// `2001:db8::/32`); a bare address is treated as a host prefix.
    ///
    /// # Errors
    ///
    /// Returns [`AclError::InvalidPrefix`] if the text parses as neither a
    /// network nor an address, or carries an out-of-range length.
    pub fn insert_cidr(
        &mut self,
        cidr: &str,
        action: Action,
        scope: AddrScope,
    ) -> Result<bool, AclError> {
        let net: IpNet = if cidr.contains('/') {
            cidr.parse()
                .map_err(|e: ipnet::AddrParseError| AclError::invalid_prefix(cidr, e.to_string()))?
        } else {
            let addr: IpAddr = cidr
                .parse()
                .map_err(|e: std::net::AddrParseError| {
                    AclError::invalid_prefix(cidr, e.to_string())
                })?;
            IpNet::from(addr)
        };
        Ok(self.insert_prefix(net.addr(), net.prefix_len(), action, scope))
    }

    /// Insert the family-agnostic "any" entry (length 0), writing `action`
    /// into every slot not already decided — never into ones that are.
    ///
    /// Returns how many of the four slots were newly set.
    pub fn insert_any(&mut self, action: Action) -> usize {
        let node = self.trie.insert(PrefixKey::any());
        let mut filled = 0u64;
        for slot in 0..SLOT_COUNT {
            if node.set_if_unset(slot, action, self.next_seq + filled) {
                filled += 1;
            }
        }
        self.next_seq += filled;
        filled as usize
    }

    /// Merge every entry of `source` into this table.
    ///
    /// Nodes are always freshly inserted here — never aliased from the
    /// source — so either table can be destroyed independently afterwards.
    /// Per slot, subject to first-write-wins on the target:
    ///
    /// - `positive`: the source outcome is copied unchanged.
    /// - `!positive` (the source list is included under a negation): a
    ///   source `Permit` is copied as `Deny`, and a source `Deny` stays
    ///   `Deny`. A deny entry nested inside a negated list must never
    ///   surface as a permit in the including table.
    ///
    /// Copied slots keep their source sequence numbers; afterwards this
    /// table's counter is advanced past the highest sequence observed in the
    /// source, so later fresh insertions cannot collide with absorbed
    /// entries.
    pub fn merge(&mut self, source: &IpTable, positive: bool) {
        let mut max_seq = 0u64;
        let mut copied = 0usize;
        source.trie.walk(|node| {
            if !node.has_data() {
                return;
            }
            let key = PrefixKey::from_raw(node.prefix_bits(), node.prefix_len());
            let target = self.trie.insert(key);
            for slot in 0..SLOT_COUNT {
                if let Some(entry) = node.entry(slot) {
                    max_seq = max_seq.max(entry.seq);
                    let action = if positive { entry.action } else { Action::Deny };
                    if target.set_if_unset(slot, action, entry.seq) {
                        copied += 1;
                    }
                }
            }
        });
        self.next_seq = self.next_seq.max(max_seq + 1);
        tracing::debug!(
            copied,
            positive,
            source_nodes = source.trie.node_count(),
            nodes = self.trie.node_count(),
            "merged access table"
        );
    }

    /// Look up `addr` for one scope: the outcome of the most specific
    /// matching prefix, or `None` when nothing on the address's path has
    /// that slot decided.
    #[must_use]
    pub fn lookup(&self, addr: IpAddr, scope: AddrScope) -> Option<Action> {
        let (bits, width) = addr_bits(addr);
        self.trie.lookup(bits, width, slot_index(addr.is_ipv6(), scope))
    }

    /// Number of trie nodes held by this table.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.trie.node_count()
    }

    /// Whether the table holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.trie.is_empty()
    }

    /// The sequence number the next fresh insertion will receive.
    /// Bookkeeping only; never affects match precedence.
    #[must_use]
    pub fn next_sequence(&self) -> u64 {
        self.next_seq
    }

    /// Freeze the table for the steady-state phase.
    ///
    /// After this point the table is immutable and may be read from any
    /// number of threads without locking.
    #[must_use]
    pub fn into_shared(self) -> SharedTable {
        Arc::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Weak;

    const TR: AddrScope = AddrScope::Transport;
    const CS: AddrScope = AddrScope::ClientSubnet;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_longest_prefix_precedence() {
        let mut table = IpTable::new();
        assert!(table.insert_cidr("0.0.0.0/0", Action::Deny, TR).unwrap());
        assert!(table.insert_cidr("192.168.0.0/16", Action::Permit, TR).unwrap());
        assert_eq!(table.lookup(ip("192.168.1.1"), TR), Some(Action::Permit));
        assert_eq!(table.lookup(ip("10.0.0.1"), TR), Some(Action::Deny));
    }

    #[test]
    fn test_first_insert_wins() {
        let mut table = IpTable::new();
        assert!(table.insert_cidr("10.0.0.0/8", Action::Permit, TR).unwrap());
        // Second write to the same slot is ignored even with the opposite
        // outcome.
        assert!(!table.insert_cidr("10.0.0.0/8", Action::Deny, TR).unwrap());
        assert_eq!(table.lookup(ip("10.0.0.1"), TR), Some(Action::Permit));
    }

    #[test]
    fn test_wildcard_fills_only_unset_slots() {
        let mut table = IpTable::new();
        table.insert_prefix(ip("10.0.0.0"), 8, Action::Permit, TR);
        // Family-specific /0 for the same slot, then the deeper /8 still
        // wins by specificity.
        table.insert_prefix(ip("0.0.0.0"), 0, Action::Deny, TR);
        assert_eq!(table.lookup(ip("10.0.0.1"), TR), Some(Action::Permit));
        assert_eq!(table.lookup(ip("8.8.8.8"), TR), Some(Action::Deny));
    }

    #[test]
    fn test_insert_any_respects_decided_slots() {
        let mut table = IpTable::new();
        // Decide the v4 transport slot at length 0 first.
        table.insert_prefix(ip("0.0.0.0"), 0, Action::Permit, TR);
        // "any" fills the three remaining slots only.
        assert_eq!(table.insert_any(Action::Deny), 3);
        assert_eq!(table.lookup(ip("8.8.8.8"), TR), Some(Action::Permit));
        assert_eq!(table.lookup(ip("8.8.8.8"), CS), Some(Action::Deny));
        assert_eq!(table.lookup(ip("2001:db8::1"), TR), Some(Action::Deny));
        assert_eq!(table.lookup(ip("2001:db8::1"), CS), Some(Action::Deny));
    }

    #[test]
    fn test_families_do_not_interfere() {
        let mut table = IpTable::new();
        // 10.0.0.0/8 and a00::/8 share leading bits but live in different
        // family slots.
        table.insert_cidr("10.0.0.0/8", Action::Deny, TR).unwrap();
        table.insert_cidr("a00::/8", Action::Permit, TR).unwrap();
        assert_eq!(table.lookup(ip("10.1.1.1"), TR), Some(Action::Deny));
        assert_eq!(table.lookup(ip("a00::1"), TR), Some(Action::Permit));
    }

    #[test]
    fn test_scopes_do_not_interfere() {
        let mut table = IpTable::new();
        table.insert_cidr("10.0.0.0/8", Action::Deny, TR).unwrap();
        assert_eq!(table.lookup(ip("10.0.0.1"), TR), Some(Action::Deny));
        assert_eq!(table.lookup(ip("10.0.0.1"), CS), None);

        table.insert_cidr("10.0.0.0/8", Action::Permit, CS).unwrap();
        assert_eq!(table.lookup(ip("10.0.0.1"), CS), Some(Action::Permit));
        assert_eq!(table.lookup(ip("10.0.0.1"), TR), Some(Action::Deny));
    }

    #[test]
    fn test_bare_address_is_host_prefix() {
        let mut table = IpTable::new();
        table.insert_cidr("10.0.0.1", Action::Permit, TR).unwrap();
        assert_eq!(table.lookup(ip("10.0.0.1"), TR), Some(Action::Permit));
        assert_eq!(table.lookup(ip("10.0.0.2"), TR), None);
    }

    #[test]
    fn test_invalid_cidr_rejected() {
        let mut table = IpTable::new();
        assert!(matches!(
            table.insert_cidr("not-a-prefix", Action::Permit, TR),
            Err(AclError::InvalidPrefix { .. })
        ));
        assert!(table.insert_cidr("10.0.0.0/33", Action::Permit, TR).is_err());
        assert!(table.insert_cidr("2001:db8::/129", Action::Permit, TR).is_err());
        assert!(table.is_empty());
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_typed_bad_bitlen_is_contract_violation() {
        let mut table = IpTable::new();
        table.insert_prefix(ip("10.0.0.0"), 64, Action::Permit, TR);
    }

    #[test]
    fn test_merge_positive_copies_unchanged() {
        let mut source = IpTable::new();
        source.insert_cidr("10.0.0.0/8", Action::Deny, TR).unwrap();
        source.insert_cidr("192.168.0.0/16", Action::Permit, TR).unwrap();

        let mut target = IpTable::new();
        target.merge(&source, true);
        assert_eq!(target.lookup(ip("10.0.0.1"), TR), Some(Action::Deny));
        assert_eq!(target.lookup(ip("192.168.1.1"), TR), Some(Action::Permit));
    }

    #[test]
    fn test_negated_merge_never_escalates() {
        let mut source = IpTable::new();
        source.insert_cidr("10.0.0.0/8", Action::Deny, TR).unwrap();
        source.insert_cidr("192.168.0.0/16", Action::Permit, TR).unwrap();

        let mut target = IpTable::new();
        target.merge(&source, false);
        // Deny stays deny; permit flips to deny. Nothing becomes a permit.
        assert_eq!(target.lookup(ip("10.0.0.1"), TR), Some(Action::Deny));
        assert_eq!(target.lookup(ip("192.168.1.1"), TR), Some(Action::Deny));
    }

    #[test]
    fn test_merge_respects_target_first_write() {
        let mut source = IpTable::new();
        source.insert_cidr("10.0.0.0/8", Action::Deny, TR).unwrap();

        let mut target = IpTable::new();
        target.insert_cidr("10.0.0.0/8", Action::Permit, TR).unwrap();
        target.merge(&source, true);
        // Target already decided this slot before the merge.
        assert_eq!(target.lookup(ip("10.0.0.1"), TR), Some(Action::Permit));
    }

    #[test]
    fn test_merge_copies_nodes_not_aliases() {
        let mut source = IpTable::new();
        source.insert_cidr("10.0.0.0/8", Action::Permit, TR).unwrap();
        let mut target = IpTable::new();
        target.merge(&source, true);
        drop(source);
        // Target still answers after the source is gone.
        assert_eq!(target.lookup(ip("10.0.0.1"), TR), Some(Action::Permit));
    }

    #[test]
    fn test_merge_all_scopes_and_families() {
        let mut source = IpTable::new();
        source.insert_cidr("10.0.0.0/8", Action::Permit, TR).unwrap();
        source.insert_cidr("10.0.0.0/8", Action::Permit, CS).unwrap();
        source.insert_cidr("2001:db8::/32", Action::Permit, TR).unwrap();

        let mut target = IpTable::new();
        target.merge(&source, false);
        assert_eq!(target.lookup(ip("10.0.0.1"), TR), Some(Action::Deny));
        assert_eq!(target.lookup(ip("10.0.0.1"), CS), Some(Action::Deny));
        assert_eq!(target.lookup(ip("2001:db8::1"), TR), Some(Action::Deny));
        assert_eq!(target.lookup(ip("2001:db8::1"), CS), None);
    }

    #[test]
    fn test_merge_advances_sequence_counter() {
        let mut source = IpTable::new();
        source.insert_cidr("10.0.0.0/8", Action::Permit, TR).unwrap();
        source.insert_cidr("10.1.0.0/16", Action::Permit, TR).unwrap();
        source.insert_cidr("10.2.0.0/16", Action::Permit, TR).unwrap();
        let highest = source.next_sequence() - 1;

        let mut target = IpTable::new();
        target.merge(&source, true);
        assert!(target.next_sequence() > highest);

        // The next fresh insertion gets a number past everything absorbed.
        let before = target.next_sequence();
        assert!(target.insert_cidr("172.16.0.0/12", Action::Deny, TR).unwrap());
        assert_eq!(target.next_sequence(), before + 1);
        assert!(before > highest);
    }

    #[test]
    fn test_merge_empty_source_is_noop() {
        let source = IpTable::new();
        let mut target = IpTable::new();
        target.insert_cidr("10.0.0.0/8", Action::Permit, TR).unwrap();
        let seq = target.next_sequence();
        target.merge(&source, false);
        assert_eq!(target.node_count(), 1);
        assert_eq!(target.next_sequence(), seq);
    }

    #[test]
    fn test_shared_table_lifecycle() {
        let mut table = IpTable::new();
        table.insert_cidr("10.0.0.0/8", Action::Permit, TR).unwrap();
        let shared = table.into_shared();
        assert_eq!(Arc::strong_count(&shared), 1);

        // Three more reader contexts attach.
        let readers: Vec<SharedTable> = (0..3).map(|_| Arc::clone(&shared)).collect();
        assert_eq!(Arc::strong_count(&shared), 4);

        let probe: Weak<IpTable> = Arc::downgrade(&shared);
        drop(readers);
        assert_eq!(Arc::strong_count(&shared), 1);
        assert!(probe.upgrade().is_some());

        // Last detach destroys the table.
        drop(shared);
        assert!(probe.upgrade().is_none());
    }
}
