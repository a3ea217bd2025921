// crates/qflash-core/src/runtime/settings.rs
// ============================================================================
// Module: QFlash Settings
// Description: Session configuration with a lazily resolved log target.
// Purpose: Apply check/assign semantics to every tunable setting.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! [`QflashSettings`] holds the tunable values consulted by the gate, the
//! capture stage and the writer. The log target is resolved lazily against
//! the engine catalog and cached in a [`TargetCache`]; the cache is
//! invalidated by every mutation that can change the resolution. While
//! logging is enabled, target names are resolved at assignment time and
//! unresolved names are rejected with the previous value left in effect.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::ExplainFormat;
use crate::core::NamespaceOid;
use crate::core::RelationOid;
use crate::interfaces::Catalog;
use crate::interfaces::CatalogError;
use crate::runtime::error::ConfigurationError;

// ============================================================================
// SECTION: Resolved Target
// ============================================================================

/// Log store target with both identifiers resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    /// Namespace identifier.
    pub namespace: NamespaceOid,
    /// Relation identifier.
    pub relation: RelationOid,
    /// Namespace name used to build the insert statement.
    pub namespace_name: String,
    /// Relation name used to build the insert statement.
    pub relation_name: String,
}

/// Cached catalog identifiers for the configured target.
///
/// # Invariants
/// - The target is valid only when both identifiers are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TargetCache {
    /// Resolved namespace identifier.
    namespace: Option<NamespaceOid>,
    /// Resolved relation identifier.
    relation: Option<RelationOid>,
}

impl TargetCache {
    /// Drops both cached identifiers.
    pub const fn invalidate(&mut self) {
        self.namespace = None;
        self.relation = None;
    }

    /// Returns true when both identifiers are cached.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.namespace.is_some() && self.relation.is_some()
    }

    /// Returns the cached namespace identifier.
    #[must_use]
    pub const fn namespace(&self) -> Option<NamespaceOid> {
        self.namespace
    }

    /// Returns the cached relation identifier.
    #[must_use]
    pub const fn relation(&self) -> Option<RelationOid> {
        self.relation
    }
}

// ============================================================================
// SECTION: Settings
// ============================================================================

/// Tunable QFlash settings for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct QflashSettings {
    /// Master switch.
    enabled: bool,
    /// Minimum duration (ms) a statement must exceed to be logged.
    min_duration_ms: f64,
    /// Correlation tag stored with each record; empty means null.
    correlation_tag: String,
    /// Log store namespace name.
    target_namespace: String,
    /// Log store relation name.
    target_relation: String,
    /// Log statements executed below the top level.
    log_nested: bool,
    /// Plan render format.
    plan_format: ExplainFormat,
    /// Lazily resolved target identifiers.
    cache: TargetCache,
}

impl Default for QflashSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            min_duration_ms: 0.0,
            correlation_tag: String::new(),
            target_namespace: String::new(),
            target_relation: String::new(),
            log_nested: false,
            plan_format: ExplainFormat::Text,
            cache: TargetCache::default(),
        }
    }
}

impl QflashSettings {
    /// Creates settings with defaults (disabled, log everything once enabled).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether logging is enabled.
    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the minimum duration threshold in milliseconds.
    #[must_use]
    pub const fn min_duration_ms(&self) -> f64 {
        self.min_duration_ms
    }

    /// Returns the correlation tag.
    #[must_use]
    pub fn correlation_tag(&self) -> &str {
        &self.correlation_tag
    }

    /// Returns the configured namespace name.
    #[must_use]
    pub fn target_namespace(&self) -> &str {
        &self.target_namespace
    }

    /// Returns the configured relation name.
    #[must_use]
    pub fn target_relation(&self) -> &str {
        &self.target_relation
    }

    /// Returns whether nested statements are logged.
    #[must_use]
    pub const fn log_nested(&self) -> bool {
        self.log_nested
    }

    /// Returns the plan render format.
    #[must_use]
    pub const fn plan_format(&self) -> ExplainFormat {
        self.plan_format
    }

    /// Returns the target cache.
    #[must_use]
    pub const fn target_cache(&self) -> TargetCache {
        self.cache
    }

    /// Enables or disables logging. Disabling drops the resolved target.
    pub const fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.cache.invalidate();
        }
    }

    /// Sets the minimum duration threshold.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidValue`] for negative or
    /// non-finite values.
    pub fn set_min_duration_ms(&mut self, value: f64) -> Result<(), ConfigurationError> {
        if !value.is_finite() || value < 0.0 {
            return Err(ConfigurationError::InvalidValue {
                setting: "min_duration_ms",
                message: "must be a finite, non-negative number".to_string(),
            });
        }
        self.min_duration_ms = value;
        Ok(())
    }

    /// Sets the correlation tag.
    pub fn set_correlation_tag(&mut self, tag: impl Into<String>) {
        self.correlation_tag = tag.into();
    }

    /// Enables or disables logging of nested statements.
    pub const fn set_log_nested(&mut self, log_nested: bool) {
        self.log_nested = log_nested;
    }

    /// Sets the plan render format.
    pub const fn set_plan_format(&mut self, format: ExplainFormat) {
        self.plan_format = format;
    }

    /// Sets the log namespace name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] when logging is enabled and the
    /// namespace does not resolve; the previous name stays in effect.
    pub fn set_target_namespace(
        &mut self,
        name: &str,
        catalog: &dyn Catalog,
    ) -> Result<(), ConfigurationError> {
        if !self.enabled {
            self.target_namespace = name.to_string();
            self.cache.invalidate();
            return Ok(());
        }
        let namespace = resolve_namespace(catalog, name)?
            .ok_or_else(|| ConfigurationError::UnknownNamespace(name.to_string()))?;
        self.target_namespace = name.to_string();
        self.cache = TargetCache {
            namespace: Some(namespace),
            relation: None,
        };
        Ok(())
    }

    /// Sets the log relation name, resolved within the current namespace.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] when logging is enabled and the
    /// relation does not resolve; the previous name stays in effect.
    pub fn set_target_relation(
        &mut self,
        name: &str,
        catalog: &dyn Catalog,
    ) -> Result<(), ConfigurationError> {
        if !self.enabled {
            self.target_relation = name.to_string();
            self.cache.invalidate();
            return Ok(());
        }
        let unknown = || ConfigurationError::UnknownRelation {
            namespace: self.target_namespace.clone(),
            relation: name.to_string(),
        };
        let namespace = match self.cache.namespace {
            Some(namespace) => Some(namespace),
            None => resolve_namespace(catalog, &self.target_namespace)?,
        };
        let Some(namespace) = namespace else {
            return Err(unknown());
        };
        let relation = resolve_relation(catalog, namespace, name)?.ok_or_else(unknown)?;
        self.target_relation = name.to_string();
        self.cache = TargetCache {
            namespace: Some(namespace),
            relation: Some(relation),
        };
        Ok(())
    }

    /// Returns the resolved target, consulting the catalog only when the
    /// cache is not valid.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when the catalog cannot be read.
    pub fn resolve_target(
        &mut self,
        catalog: &dyn Catalog,
    ) -> Result<Option<ResolvedTarget>, CatalogError> {
        if !self.cache.is_valid() {
            let namespace = resolve_namespace(catalog, &self.target_namespace)?;
            let relation = match namespace {
                Some(namespace) => resolve_relation(catalog, namespace, &self.target_relation)?,
                None => None,
            };
            self.cache = TargetCache {
                namespace,
                relation,
            };
        }
        Ok(self.resolved())
    }

    /// Returns the cached target without consulting the catalog.
    #[must_use]
    pub fn resolved(&self) -> Option<ResolvedTarget> {
        match (self.cache.namespace, self.cache.relation) {
            (Some(namespace), Some(relation)) => Some(ResolvedTarget {
                namespace,
                relation,
                namespace_name: self.target_namespace.clone(),
                relation_name: self.target_relation.clone(),
            }),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves a namespace name; empty names never resolve.
fn resolve_namespace(
    catalog: &dyn Catalog,
    name: &str,
) -> Result<Option<NamespaceOid>, CatalogError> {
    if name.is_empty() {
        return Ok(None);
    }
    catalog.namespace_oid(name)
}

/// Resolves a relation name; empty names never resolve.
fn resolve_relation(
    catalog: &dyn Catalog,
    namespace: NamespaceOid,
    name: &str,
) -> Result<Option<RelationOid>, CatalogError> {
    if name.is_empty() {
        return Ok(None);
    }
    catalog.relation_oid(namespace, name)
}
