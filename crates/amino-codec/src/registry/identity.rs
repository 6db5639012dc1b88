//! Type identities derived from registered names.
//!
//! ```text
//! hash   = SHA-256(name)
//! hash   = hash without leading 0x00 bytes
//! disamb = hash[0..3]
//! rest   = hash[3..] without leading 0x00 bytes
//! prefix = rest[0..4]
//! ```
//!
//! Neither the prefix nor the disambiguation bytes ever start with `0x00`,
//! so a leading zero byte on the wire marks the long (disambiguated) form.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::limits::{DISAMB_LEN, PREFIX_LEN};

/// Short binary identity.
pub type PrefixBytes = [u8; PREFIX_LEN];

/// Disambiguation bytes.
pub type DisambBytes = [u8; DISAMB_LEN];

/// Marker byte preceding the disambiguated identity form.
pub const DISFIX_MARKER: u8 = 0x00;

/// Length of the disambiguated identity on the wire, marker included.
pub const DISFIX_WIRE_LEN: usize = 1 + DISAMB_LEN + PREFIX_LEN;

/// Binary identity of a registered concrete type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BinaryIdentity {
    pub disamb: DisambBytes,
    pub prefix: PrefixBytes,
}

impl BinaryIdentity {
    /// Derives the identity of `name`.
    pub fn from_name(name: &str) -> Self {
        let hash = Sha256::digest(name.as_bytes());
        let bz = skip_zeros(&hash);
        let mut disamb = [0u8; DISAMB_LEN];
        disamb.copy_from_slice(&bz[..DISAMB_LEN]);
        let bz = skip_zeros(&bz[DISAMB_LEN..]);
        let mut prefix = [0u8; PREFIX_LEN];
        prefix.copy_from_slice(&bz[..PREFIX_LEN]);
        Self { disamb, prefix }
    }

    /// Wire form of the short identity.
    pub fn prefix_bytes(&self) -> &[u8] {
        &self.prefix
    }

    /// Wire form of the disambiguated identity: marker, disamb, prefix.
    pub fn disfix_bytes(&self) -> [u8; DISFIX_WIRE_LEN] {
        let mut out = [0u8; DISFIX_WIRE_LEN];
        out[0] = DISFIX_MARKER;
        out[1..1 + DISAMB_LEN].copy_from_slice(&self.disamb);
        out[1 + DISAMB_LEN..].copy_from_slice(&self.prefix);
        out
    }
}

impl fmt::Display for BinaryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.disamb.iter().chain(self.prefix.iter()) {
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}

/// Identity bytes read off the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireIdentity {
    pub prefix: PrefixBytes,
    pub disamb: Option<DisambBytes>,
}

impl WireIdentity {
    /// Parses the identity at the start of `bz`, returning it and the number
    /// of bytes consumed.
    pub fn parse(bz: &[u8]) -> Result<(Self, usize)> {
        if bz.len() < PREFIX_LEN {
            return Err(Error::MalformedIdentity(format!(
                "EOF while reading prefix bytes ({} of {})",
                bz.len(),
                PREFIX_LEN
            )));
        }
        if bz[0] == DISFIX_MARKER {
            if bz.len() < DISFIX_WIRE_LEN {
                return Err(Error::MalformedIdentity(
                    "EOF while reading disambiguation bytes".to_string(),
                ));
            }
            let mut disamb = [0u8; DISAMB_LEN];
            disamb.copy_from_slice(&bz[1..1 + DISAMB_LEN]);
            let mut prefix = [0u8; PREFIX_LEN];
            prefix.copy_from_slice(&bz[1 + DISAMB_LEN..DISFIX_WIRE_LEN]);
            Ok((
                Self {
                    prefix,
                    disamb: Some(disamb),
                },
                DISFIX_WIRE_LEN,
            ))
        } else {
            let mut prefix = [0u8; PREFIX_LEN];
            prefix.copy_from_slice(&bz[..PREFIX_LEN]);
            Ok((
                Self {
                    prefix,
                    disamb: None,
                },
                PREFIX_LEN,
            ))
        }
    }
}

/// Type URL of a registered name.
pub fn type_url(name: &str, slash_prefixed: bool) -> String {
    if slash_prefixed {
        format!("/{}", name)
    } else {
        name.to_string()
    }
}

fn skip_zeros(bz: &[u8]) -> &[u8] {
    let start = bz.iter().position(|b| *b != 0).unwrap_or(bz.len());
    &bz[start..]
}
