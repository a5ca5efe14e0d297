//! The content-addressed manifest: the authoritative RHID index of a run.
//!
//! Entries are created once, at first write of the underlying content, and
//! never mutated. The manifest only grows while a run is open.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::digest::Sha256Digest;
use crate::error::{CoreError, StructuralViolation};
use crate::rhid::{Rhid, RhidKind};
use crate::types::Timestamp;

/// Metadata for one stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestEntry {
    pub rhid: Rhid,
    /// Digest of the bytes at `storage_uri`.
    pub sha256: Sha256Digest,
    pub content_type: String,
    pub size_bytes: u64,
    pub storage_uri: String,
    pub created_by_actor_id: String,
    pub created_at: Timestamp,
}

impl ManifestEntry {
    /// Whether the given bytes are the content this entry describes.
    pub fn matches_content(&self, content: &[u8]) -> bool {
        Sha256Digest::of(content) == self.sha256
    }
}

/// The full manifest document (`evidence/manifest.json`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a new entry. RHIDs are unique within a manifest.
    pub fn insert(&mut self, entry: ManifestEntry) -> Result<(), CoreError> {
        if self.contains(&entry.rhid) {
            return Err(CoreError::DuplicateRhid(entry.rhid));
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Resolve an RHID by exact match. `None` is a first-class outcome: the
    /// caller decides whether absence is an omission to report.
    pub fn resolve(&self, rhid: &Rhid) -> Option<&ManifestEntry> {
        self.entries.iter().find(|e| &e.rhid == rhid)
    }

    pub fn contains(&self, rhid: &Rhid) -> bool {
        self.resolve(rhid).is_some()
    }

    /// Entries naming objects of the given kind, in manifest order.
    pub fn entries_of_kind(&self, kind: RhidKind) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.iter().filter(move |e| e.rhid.kind() == kind)
    }
}

/// O(1) RHID lookup over a borrowed manifest.
#[derive(Debug)]
pub struct ManifestIndex<'a> {
    by_rhid: HashMap<&'a Rhid, &'a ManifestEntry>,
}

impl<'a> ManifestIndex<'a> {
    /// Build the index, rejecting manifests that register an RHID twice.
    pub fn build(manifest: &'a Manifest) -> Result<Self, StructuralViolation> {
        let mut by_rhid = HashMap::with_capacity(manifest.len());
        for entry in &manifest.entries {
            if by_rhid.insert(&entry.rhid, entry).is_some() {
                return Err(StructuralViolation::DuplicateRhid(entry.rhid.clone()));
            }
        }
        Ok(Self { by_rhid })
    }

    pub fn resolve(&self, rhid: &Rhid) -> Option<&'a ManifestEntry> {
        self.by_rhid.get(rhid).copied()
    }

    pub fn len(&self) -> usize {
        self.by_rhid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_rhid.is_empty()
    }
}

/// A manifest that is being grown, with O(1) membership.
///
/// Producers check every new RHID against the manifest; this keeps the
/// position of each entry so a run of `n` registrations stays linear.
#[derive(Debug, Clone, Default)]
pub struct IndexedManifest {
    manifest: Manifest,
    positions: HashMap<Rhid, usize>,
}

impl IndexedManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index an existing manifest, rejecting one that registers an RHID twice.
    pub fn from_manifest(manifest: Manifest) -> Result<Self, StructuralViolation> {
        let mut positions = HashMap::with_capacity(manifest.len());
        for (i, entry) in manifest.entries.iter().enumerate() {
            if positions.insert(entry.rhid.clone(), i).is_some() {
                return Err(StructuralViolation::DuplicateRhid(entry.rhid.clone()));
            }
        }
        Ok(Self { manifest, positions })
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn into_manifest(self) -> Manifest {
        self.manifest
    }

    pub fn len(&self) -> usize {
        self.manifest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifest.is_empty()
    }

    pub fn contains(&self, rhid: &Rhid) -> bool {
        self.positions.contains_key(rhid)
    }

    pub fn resolve(&self, rhid: &Rhid) -> Option<&ManifestEntry> {
        self.positions.get(rhid).map(|&i| &self.manifest.entries[i])
    }

    /// Append a new entry. RHIDs are unique within a manifest.
    pub fn insert(&mut self, entry: ManifestEntry) -> Result<(), CoreError> {
        if self.contains(&entry.rhid) {
            return Err(CoreError::DuplicateRhid(entry.rhid));
        }
        self.positions.insert(entry.rhid.clone(), self.manifest.len());
        self.manifest.entries.push(entry);
        Ok(())
    }

    /// Take back the most recent entry.
    pub fn pop(&mut self) -> Option<ManifestEntry> {
        let entry = self.manifest.entries.pop()?;
        self.positions.remove(&entry.rhid);
        Some(entry)
    }
}

/// Content type for a named object, inferred from its extension.
pub fn content_type_for(name: &str) -> &'static str {
    if name.ends_with(".md") {
        "text/markdown"
    } else if name.ends_with(".json") {
        "application/json"
    } else {
        "text/plain"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(rhid: &str, content: &[u8]) -> ManifestEntry {
        ManifestEntry {
            rhid: rhid.parse().unwrap(),
            sha256: Sha256Digest::of(content),
            content_type: "text/plain".into(),
            size_bytes: content.len() as u64,
            storage_uri: format!("mem://{rhid}"),
            created_by_actor_id: "tool:executor".into(),
            created_at: Timestamp::from_raw("2026-02-07T08:00:00.000Z"),
        }
    }

    #[test]
    fn test_insert_and_resolve() {
        let mut manifest = Manifest::new();
        manifest.insert(entry("rhid:artifact:aa01", b"one")).unwrap();
        manifest.insert(entry("rhid:artifact:aa02", b"two")).unwrap();

        let found = manifest.resolve(&"rhid:artifact:aa02".parse().unwrap()).unwrap();
        assert!(found.matches_content(b"two"));
        assert!(!found.matches_content(b"one"));
        assert!(manifest.resolve(&"rhid:artifact:ffff".parse().unwrap()).is_none());
    }

    #[test]
    fn test_insert_rejects_duplicate() {
        let mut manifest = Manifest::new();
        manifest.insert(entry("rhid:artifact:aa01", b"one")).unwrap();
        let err = manifest.insert(entry("rhid:artifact:aa01", b"other")).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateRhid(_)));
        assert_eq!(manifest.len(), 1);
    }

    #[test]
    fn test_index_detects_duplicates() {
        let manifest = Manifest {
            entries: vec![
                entry("rhid:artifact:aa01", b"one"),
                entry("rhid:artifact:aa01", b"one"),
            ],
        };
        assert!(matches!(
            ManifestIndex::build(&manifest),
            Err(StructuralViolation::DuplicateRhid(_))
        ));
    }

    #[test]
    fn test_index_resolve() {
        let manifest = Manifest {
            entries: vec![
                entry("rhid:artifact:aa01", b"one"),
                entry("rhid:receipt:bb01", b"{}"),
            ],
        };
        let index = ManifestIndex::build(&manifest).unwrap();
        assert_eq!(index.len(), 2);
        assert!(index.resolve(&"rhid:receipt:bb01".parse().unwrap()).is_some());
        assert_eq!(manifest.entries_of_kind(RhidKind::Receipt).count(), 1);
    }

    #[test]
    fn test_indexed_manifest() {
        let mut indexed = IndexedManifest::new();
        indexed.insert(entry("rhid:artifact:aa01", b"one")).unwrap();
        indexed.insert(entry("rhid:artifact:aa02", b"two")).unwrap();
        assert!(matches!(
            indexed.insert(entry("rhid:artifact:aa01", b"again")),
            Err(CoreError::DuplicateRhid(_))
        ));

        let second: Rhid = "rhid:artifact:aa02".parse().unwrap();
        assert!(indexed.resolve(&second).unwrap().matches_content(b"two"));
        assert_eq!(indexed.pop().unwrap().rhid, second);
        assert!(!indexed.contains(&second));
        assert_eq!(indexed.len(), 1);

        let reindexed = IndexedManifest::from_manifest(indexed.manifest().clone()).unwrap();
        assert!(reindexed.contains(&"rhid:artifact:aa01".parse().unwrap()));
        assert_eq!(reindexed.into_manifest(), indexed.into_manifest());
    }

    #[test]
    fn test_indexed_manifest_rejects_duplicates() {
        let manifest = Manifest {
            entries: vec![
                entry("rhid:artifact:aa01", b"one"),
                entry("rhid:artifact:aa01", b"one"),
            ],
        };
        assert!(matches!(
            IndexedManifest::from_manifest(manifest),
            Err(StructuralViolation::DuplicateRhid(_))
        ));
    }

    #[test]
    fn test_entry_rejects_unknown_fields() {
        let mut json = serde_json::to_value(entry("rhid:artifact:aa01", b"one")).unwrap();
        json["annotated_by"] = "someone".into();
        assert!(serde_json::from_value::<ManifestEntry>(json).is_err());
    }

    #[test]
    fn test_manifest_json_shape() {
        let manifest = Manifest {
            entries: vec![entry("rhid:artifact:aa01", b"one")],
        };
        let json = serde_json::to_value(&manifest).unwrap();
        let first = &json["entries"][0];
        assert_eq!(first["rhid"], "rhid:artifact:aa01");
        assert_eq!(first["size_bytes"], 3);
        assert!(first["sha256"].as_str().unwrap().starts_with("sha256:"));
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("plan.md"), "text/markdown");
        assert_eq!(content_type_for("work_order.json"), "application/json");
        assert_eq!(content_type_for("output.txt"), "text/plain");
    }
}
