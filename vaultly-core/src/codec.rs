//! Credential records and their plaintext serialization.
//!
//! The plaintext payload is a JSON array of `{website, username, password, note}` objects,
//! in snapshot order.

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

use crate::error::{VaultError, VaultResult};

/// A single stored credential. Identity within a vault is the exact `website` string.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct CredentialRecord {
    /// Site the credential belongs to; the record's key within a vault.
    pub website: String,
    /// Account name on the site.
    pub username: String,
    /// Secret. Never logged.
    pub password: String,
    /// Free-form note.
    pub note: String,
}

impl CredentialRecord {
    /// Convenience constructor.
    #[must_use]
    pub fn new(
        website: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        note: impl Into<String>,
    ) -> Self {
        Self {
            website: website.into(),
            username: username.into(),
            password: password.into(),
            note: note.into(),
        }
    }
}

impl std::fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("website", &self.website)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("note", &self.note)
            .finish()
    }
}

/// Ordered set of credential records, at most one per `website`.
///
/// Passwords are wiped from memory when the snapshot is dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VaultSnapshot {
    records: Vec<CredentialRecord>,
}

impl VaultSnapshot {
    /// Creates an empty snapshot.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Builds a snapshot from records, collapsing duplicate websites (last one wins,
    /// in the position of the first).
    #[must_use]
    pub fn from_records(records: Vec<CredentialRecord>) -> Self {
        let mut snapshot = Self::new();
        for record in records {
            snapshot.upsert(record);
        }
        snapshot
    }

    /// Replaces the record with the same `website` in place, or appends it.
    pub fn upsert(&mut self, record: CredentialRecord) {
        match self.records.iter_mut().find(|r| r.website == record.website) {
            Some(existing) => {
                existing.password.zeroize();
                *existing = record;
            }
            None => self.records.push(record),
        }
    }

    /// Removes the record for `website`. Returns whether a record was removed.
    pub fn remove(&mut self, website: &str) -> bool {
        let Some(index) = self.records.iter().position(|r| r.website == website) else {
            return false;
        };
        let mut removed = self.records.remove(index);
        removed.password.zeroize();
        true
    }

    /// Looks up the record for `website`.
    #[must_use]
    pub fn get(&self, website: &str) -> Option<&CredentialRecord> {
        self.records.iter().find(|r| r.website == website)
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the snapshot holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterates records in snapshot order.
    pub fn iter(&self) -> impl Iterator<Item = &CredentialRecord> {
        self.records.iter()
    }

    /// Records in snapshot order.
    #[must_use]
    pub fn records(&self) -> &[CredentialRecord] {
        &self.records
    }

    /// Hands the records to the caller, e.g. across the FFI boundary.
    #[must_use]
    pub fn into_records(mut self) -> Vec<CredentialRecord> {
        std::mem::take(&mut self.records)
    }
}

impl Drop for VaultSnapshot {
    fn drop(&mut self) {
        for record in &mut self.records {
            record.password.zeroize();
        }
    }
}

// Crosses the FFI boundary as a plain list of records.
uniffi::custom_type!(VaultSnapshot, Vec<CredentialRecord>, {
    lower: |snapshot| snapshot.into_records(),
    try_lift: |records| Ok(VaultSnapshot::from_records(records)),
});

/// Serializes a snapshot to its plaintext payload.
///
/// # Errors
/// Returns `Serialization` if JSON encoding fails.
pub fn encode(snapshot: &VaultSnapshot) -> VaultResult<Zeroizing<Vec<u8>>> {
    serde_json::to_vec(&snapshot.records)
        .map(Zeroizing::new)
        .map_err(|e| VaultError::Serialization(e.to_string()))
}

/// Parses a plaintext payload.
///
/// # Errors
/// Returns `Decode` if the payload is not a JSON array of complete records.
pub fn decode(bytes: &[u8]) -> VaultResult<VaultSnapshot> {
    let records: Vec<CredentialRecord> =
        serde_json::from_slice(bytes).map_err(|e| VaultError::Decode(e.to_string()))?;
    Ok(VaultSnapshot::from_records(records))
}
