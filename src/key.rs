//! Prefix keys and outcome/scope discriminators.
//!
//! A [`PrefixKey`] normalizes an IP prefix of either family into a
//! left-aligned 128-bit word plus a bit length, so the trie never needs to
//! branch on the address family. The family still matters for *matching*:
//! together with the [`AddrScope`] it selects one of the four outcome slots a
//! trie node carries, so a v4 and a v6 prefix with identical leading bits
//! share a node without ever sharing an outcome.

use std::fmt;
use std::net::IpAddr;

/// Maximum prefix length for IPv4.
pub const V4_MAXBITS: u8 = 32;

/// Maximum prefix length for IPv6.
pub const V6_MAXBITS: u8 = 128;

/// Number of outcome slots per trie node: {transport, client-subnet} x {v4, v6}.
pub(crate) const SLOT_COUNT: usize = 4;

/// The outcome recorded for a matching prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// The address is permitted by this entry.
    Permit,
    /// The address is denied by this entry.
    Deny,
}

/// Which logical address of a request an entry matches against.
///
/// A DNS request carries the transport (socket) address and, optionally, a
/// client subnet in an EDNS option. The two are matched independently: an
/// entry inserted for one scope is invisible to lookups in the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddrScope {
    /// The primary transport address of the request.
    Transport,
    /// The secondary, option-carried client subnet address.
    ClientSubnet,
}

/// Address family discriminator of a prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    /// IPv4, prefix length 0..=32.
    V4,
    /// IPv6, prefix length 0..=128.
    V6,
    /// Family-agnostic "any"; always prefix length 0.
    Any,
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V4 => write!(f, "IPv4"),
            Self::V6 => write!(f, "IPv6"),
            Self::Any => write!(f, "any"),
        }
    }
}

/// A normalized IP prefix: the first `len` bits of an address, left-aligned
/// in a 128-bit word, with all trailing bits zeroed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefixKey {
    family: Family,
    bits: u128,
    len: u8,
}

impl PrefixKey {
    /// Build a key from an address and prefix length.
    ///
    /// Bits past `bitlen` are masked off, so `10.9.8.7/8` and `10.0.0.0/8`
    /// produce the same key.
    ///
    /// # Panics
    ///
    /// Panics if `bitlen` exceeds the width of the address family. Prefix
    /// lengths come from already-validated configuration; an out-of-range
    /// value here means the caller is acting on corrupted state.
    #[must_use]
    pub fn from_addr(addr: IpAddr, bitlen: u8) -> Self {
        let (bits, width, family) = match addr {
            IpAddr::V4(v4) => ((u128::from(u32::from(v4))) << 96, V4_MAXBITS, Family::V4),
            IpAddr::V6(v6) => (u128::from(v6), V6_MAXBITS, Family::V6),
        };
        assert!(
            bitlen <= width,
            "prefix length {bitlen} out of range for {family} address {addr} (max {width})",
        );
        Self {
            family,
            bits: mask_bits(bits, bitlen),
            len: bitlen,
        }
    }

    /// The family-agnostic "any" key (length 0, matches every address).
    #[must_use]
    pub const fn any() -> Self {
        Self {
            family: Family::Any,
            bits: 0,
            len: 0,
        }
    }

    /// Rebuild a key from raw trie coordinates (used when copying nodes
    /// between tables during a merge).
    pub(crate) const fn from_raw(bits: u128, len: u8) -> Self {
        Self {
            family: Family::Any,
            bits,
            len,
        }
    }

    /// The left-aligned prefix bits.
    #[must_use]
    pub const fn bits(&self) -> u128 {
        self.bits
    }

    /// The prefix length in bits.
    #[must_use]
    pub const fn len(&self) -> u8 {
        self.len
    }

    /// Whether this is a length-0 prefix.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The address family this key was built from.
    #[must_use]
    pub const fn family(&self) -> Family {
        self.family
    }
}

/// Select the outcome slot for an address family and scope.
pub(crate) const fn slot_index(is_v6: bool, scope: AddrScope) -> usize {
    let family_off = if is_v6 { 1 } else { 0 };
    let scope_off = match scope {
        AddrScope::Transport => 0,
        AddrScope::ClientSubnet => 2,
    };
    family_off + scope_off
}

/// Left-aligned bits and bit width of an address.
pub(crate) fn addr_bits(addr: IpAddr) -> (u128, u8) {
    match addr {
        IpAddr::V4(v4) => ((u128::from(u32::from(v4))) << 96, V4_MAXBITS),
        IpAddr::V6(v6) => (u128::from(v6), V6_MAXBITS),
    }
}

/// Zero every bit past the first `len`.
pub(crate) const fn mask_bits(bits: u128, len: u8) -> u128 {
    if len == 0 {
        0
    } else if len >= 128 {
        bits
    } else {
        bits & (u128::MAX << (128 - len as u32))
    }
}

/// The bit at `index` (0 = most significant), as a child selector.
pub(crate) const fn bit_at(bits: u128, index: u8) -> usize {
    ((bits >> (127 - index as u32)) & 1) as usize
}

/// Length of the common prefix of two bit strings, capped at `max`.
pub(crate) fn common_prefix(a: u128, b: u128, max: u8) -> u8 {
    if max == 0 {
        return 0;
    }
    let diff = a ^ b;
    let agree = diff.leading_zeros().min(128) as u8;
    agree.min(max)
}
