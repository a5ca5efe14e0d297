//! RHIDs: namespaced identifiers for every object a run produces.
//!
//! An RHID is rendered as `rhid:<kind>:<fingerprint>`. The kind is parsed once
//! at the boundary into [`RhidKind`]; the rest of the crate never looks at the
//! string form again.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::digest::Sha256Digest;
use crate::error::RhidParseError;

/// Scheme prefix of every RHID.
pub const RHID_SCHEME: &str = "rhid";

/// Number of hex characters kept from the seed digest when minting.
pub const FINGERPRINT_LEN: usize = 12;

/// The kind of object an RHID names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RhidKind {
    Receipt,
    Artifact,
    Llm,
    Toolio,
    Policy,
    Gate,
    Logslice,
}

impl RhidKind {
    /// Every kind, in declaration order.
    pub const ALL: [RhidKind; 7] = [
        RhidKind::Receipt,
        RhidKind::Artifact,
        RhidKind::Llm,
        RhidKind::Toolio,
        RhidKind::Policy,
        RhidKind::Gate,
        RhidKind::Logslice,
    ];

    /// The tag used inside the RHID string.
    pub fn as_str(self) -> &'static str {
        match self {
            RhidKind::Receipt => "receipt",
            RhidKind::Artifact => "artifact",
            RhidKind::Llm => "llm",
            RhidKind::Toolio => "toolio",
            RhidKind::Policy => "policy",
            RhidKind::Gate => "gate",
            RhidKind::Logslice => "logslice",
        }
    }
}

impl fmt::Display for RhidKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RhidKind {
    type Err = RhidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RhidKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| RhidParseError::UnknownKind(s.to_string()))
    }
}

/// A parsed RHID.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rhid {
    kind: RhidKind,
    fingerprint: String,
}

impl Rhid {
    /// Build an RHID from a kind and an already-derived fingerprint.
    pub fn new(kind: RhidKind, fingerprint: impl Into<String>) -> Result<Self, RhidParseError> {
        let fingerprint = fingerprint.into();
        if !is_valid_fingerprint(&fingerprint) {
            return Err(RhidParseError::InvalidFingerprint(fingerprint));
        }
        Ok(Self { kind, fingerprint })
    }

    /// Mint an RHID from a seed: the first 12 hex characters of SHA-256(seed).
    ///
    /// Identical seeds always mint identical RHIDs, so producers must make
    /// seeds unique within a run (name plus logical timestamp, receipt id).
    pub fn mint(kind: RhidKind, seed: &str) -> Self {
        let hex = Sha256Digest::of(seed.as_bytes()).to_hex();
        Self {
            kind,
            fingerprint: hex[..FINGERPRINT_LEN].to_string(),
        }
    }

    /// The policy RHID attached to every decision of the given action type.
    pub fn policy_for(action_type: &str) -> Self {
        Self::mint(RhidKind::Policy, &format!("policy-{action_type}"))
    }

    /// The kind of object this RHID names.
    pub fn kind(&self) -> RhidKind {
        self.kind
    }

    /// The fingerprint part.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// File stem used by file-based stores: colons replaced by underscores.
    pub fn storage_stem(&self) -> String {
        format!("{}_{}_{}", RHID_SCHEME, self.kind, self.fingerprint)
    }
}

/// Lowercase alphanumerics and `-`. Minted fingerprints are always hex;
/// hand-written ones such as `phantom-123` still parse.
fn is_valid_fingerprint(s: &str) -> bool {
    !s.is_empty()
        && s
            .bytes()
            .all(|b| b.is_ascii_digit() || b.is_ascii_lowercase() || b == b'-')
}

impl fmt::Debug for Rhid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rhid({self})")
    }
}

impl fmt::Display for Rhid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", RHID_SCHEME, self.kind, self.fingerprint)
    }
}

impl FromStr for Rhid {
    type Err = RhidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix(RHID_SCHEME)
            .and_then(|r| r.strip_prefix(':'))
            .ok_or_else(|| RhidParseError::MissingScheme(s.to_string()))?;
        let (kind, fingerprint) = rest
            .split_once(':')
            .ok_or_else(|| RhidParseError::InvalidFingerprint(s.to_string()))?;
        Self::new(kind.parse()?, fingerprint)
    }
}

impl Serialize for Rhid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Rhid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
