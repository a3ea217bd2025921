// crates/qflash-core/src/core/identifiers.rs
// ============================================================================
// Module: QFlash Identifiers
// Description: Opaque catalog identifiers for namespaces and relations.
// Purpose: Provide strongly typed, nonzero object identifiers.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Engines hand out opaque numeric identifiers for namespaces and relations.
//! Zero is reserved as the invalid identifier, so every wrapper holds a
//! [`NonZeroU64`] and construction from a raw value is fallible.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::num::NonZeroU64;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

/// Namespace (schema) identifier assigned by the engine catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NamespaceOid(NonZeroU64);

impl NamespaceOid {
    /// Creates a namespace identifier from a nonzero value.
    #[must_use]
    pub const fn new(id: NonZeroU64) -> Self {
        Self(id)
    }

    /// Creates a namespace identifier from a raw value, rejecting zero.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Option<Self> {
        match NonZeroU64::new(raw) {
            Some(value) => Some(Self(value)),
            None => None,
        }
    }

    /// Returns the raw identifier value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for NamespaceOid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Relation (table) identifier assigned by the engine catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationOid(NonZeroU64);

impl RelationOid {
    /// Creates a relation identifier from a nonzero value.
    #[must_use]
    pub const fn new(id: NonZeroU64) -> Self {
        Self(id)
    }

    /// Creates a relation identifier from a raw value, rejecting zero.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Option<Self> {
        match NonZeroU64::new(raw) {
            Some(value) => Some(Self(value)),
            None => None,
        }
    }

    /// Returns the raw identifier value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for RelationOid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
