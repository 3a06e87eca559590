//! Collection declarations and remote lifecycle.
//!
//! A [`CollectionConfig`] pairs a collection name with the record kind it
//! stores and its embedding bindings. The [`CollectionManager`] is the
//! registry of declared configurations; it is created once, shared by
//! `Arc`, and consulted by every store operation. Declaring is local only;
//! [`CollectionManager::ensure_exists`] and [`CollectionManager::drop`] are
//! the only calls that change the remote structure.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use quire_core::{Error, Result};

use crate::binding::EmbeddingBinding;
use crate::index::{PayloadSchema, ScrollRequest, VectorIndex, VectorParams};
use crate::schema::RecordKind;

// ============================================================================
// Configuration
// ============================================================================

/// Declared shape of one collection.
#[derive(Clone)]
pub struct CollectionConfig {
    name: String,
    kind: Arc<dyn RecordKind>,
    bindings: Vec<EmbeddingBinding>,
    payload_indexes: Vec<(String, PayloadSchema)>,
}

impl CollectionConfig {
    /// Validate and build a configuration.
    ///
    /// Fails with `InvalidBinding` when there are no bindings, when two
    /// bindings share a slot name, or when a binding was built for a
    /// different record kind.
    pub fn new(
        name: impl Into<String>,
        kind: Arc<dyn RecordKind>,
        bindings: Vec<EmbeddingBinding>,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::binding("collection name must not be empty"));
        }
        if bindings.is_empty() {
            return Err(Error::binding(format!(
                "collection '{name}' needs at least one binding"
            )));
        }

        let mut slots = HashSet::new();
        for binding in &bindings {
            if !slots.insert(binding.slot()) {
                return Err(Error::binding(format!(
                    "collection '{name}' declares slot '{}' twice",
                    binding.slot()
                )));
            }
            if binding.kind() != kind.name() {
                return Err(Error::binding(format!(
                    "slot '{}' was built for kind '{}', collection '{name}' stores '{}'",
                    binding.slot(),
                    binding.kind(),
                    kind.name()
                )));
            }
        }

        Ok(Self {
            name,
            kind,
            bindings,
            payload_indexes: Vec::new(),
        })
    }

    /// Add a secondary payload index created with the collection.
    pub fn with_payload_index(mut self, field: impl Into<String>, schema: PayloadSchema) -> Result<Self> {
        let field = field.into();
        if !self.kind.has_field(&field) {
            return Err(Error::unknown_field(self.kind.name(), field));
        }
        self.payload_indexes.retain(|(f, _)| *f != field);
        self.payload_indexes.push((field, schema));
        Ok(self)
    }

    /// Collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record kind stored in the collection.
    pub fn kind(&self) -> &dyn RecordKind {
        self.kind.as_ref()
    }

    /// Bindings in declaration order.
    pub fn bindings(&self) -> &[EmbeddingBinding] {
        &self.bindings
    }

    /// Declared payload indexes.
    pub fn payload_indexes(&self) -> &[(String, PayloadSchema)] {
        &self.payload_indexes
    }

    /// True when at least one payload index is declared.
    pub fn has_payload_indexes(&self) -> bool {
        !self.payload_indexes.is_empty()
    }

    /// First binding that embeds `field`.
    pub fn binding_for_field(&self, field: &str) -> Option<&EmbeddingBinding> {
        self.bindings.iter().find(|b| b.source_field() == field)
    }

    /// Vector spaces to create, keyed by slot.
    pub fn vector_params(&self) -> BTreeMap<String, VectorParams> {
        self.bindings
            .iter()
            .map(|b| (b.slot().to_string(), b.vector_params()))
            .collect()
    }
}

impl fmt::Debug for CollectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionConfig")
            .field("name", &self.name)
            .field("kind", &self.kind.name())
            .field("bindings", &self.bindings)
            .field("payload_indexes", &self.payload_indexes)
            .finish()
    }
}

// ============================================================================
// Manager
// ============================================================================

/// Result of [`CollectionManager::ensure_exists`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// The collection and its payload indexes were created.
    Created,
    /// The collection was already present and left untouched.
    AlreadyExists,
}

/// Lifecycle state of a collection as seen by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionStatus {
    /// No configuration is declared.
    Undeclared,
    /// Declared locally, absent remotely.
    Declared,
    /// Present remotely with no points.
    Ensured,
    /// Present remotely with at least one point.
    Populated,
}

/// Registry of declared collections over a vector index.
pub struct CollectionManager {
    index: Arc<dyn VectorIndex>,
    registry: RwLock<HashMap<String, Arc<CollectionConfig>>>,
}

impl CollectionManager {
    /// Create an empty registry.
    pub fn new(index: Arc<dyn VectorIndex>) -> Self {
        Self {
            index,
            registry: RwLock::new(HashMap::new()),
        }
    }

    /// The vector index this manager drives.
    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// Register a configuration. Last declaration wins; no remote call.
    pub fn declare(&self, config: CollectionConfig) -> Arc<CollectionConfig> {
        let config = Arc::new(config);
        let previous = self
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(config.name().to_string(), config.clone());
        if previous.is_some() {
            log::info!("Redeclared collection '{}'", config.name());
        } else {
            log::debug!("Declared collection '{}'", config.name());
        }
        config
    }

    /// Declared configuration of a collection.
    pub fn config(&self, name: &str) -> Result<Arc<CollectionConfig>> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnconfiguredCollection(name.to_string()))
    }

    /// Names of all declared collections, sorted.
    pub fn declared(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Create the declared collection remotely if it is absent.
    ///
    /// A present collection is left as is, even if its structure differs
    /// from the declaration.
    pub async fn ensure_exists(&self, name: &str) -> Result<EnsureOutcome> {
        let config = self.config(name)?;

        let existing = self.index.list_collections().await?;
        if existing.iter().any(|c| c == name) {
            log::warn!("Collection '{name}' already exists");
            return Ok(EnsureOutcome::AlreadyExists);
        }

        self.index
            .create_collection(name, &config.vector_params())
            .await?;
        for (field, schema) in config.payload_indexes() {
            self.index.create_payload_index(name, field, *schema).await?;
        }

        log::info!(
            "Created collection '{name}' with {} vector slot(s) and {} payload index(es)",
            config.bindings().len(),
            config.payload_indexes().len()
        );
        Ok(EnsureOutcome::Created)
    }

    /// Declare and ensure in one step.
    pub async fn create(&self, config: CollectionConfig) -> Result<EnsureOutcome> {
        let name = self.declare(config).name().to_string();
        self.ensure_exists(&name).await
    }

    /// Delete the collection remotely. The declaration is kept.
    pub async fn drop(&self, name: &str) -> Result<()> {
        self.config(name)?;
        self.index.drop_collection(name).await?;
        log::info!("Dropped collection '{name}'");
        Ok(())
    }

    /// Current lifecycle state.
    pub async fn status(&self, name: &str) -> Result<CollectionStatus> {
        if self.config(name).is_err() {
            return Ok(CollectionStatus::Undeclared);
        }
        let existing = self.index.list_collections().await?;
        if !existing.iter().any(|c| c == name) {
            return Ok(CollectionStatus::Declared);
        }
        let sample = self.index.scroll(name, ScrollRequest::new(None, 1)).await?;
        Ok(if sample.is_empty() {
            CollectionStatus::Ensured
        } else {
            CollectionStatus::Populated
        })
    }
}

impl fmt::Debug for CollectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionManager")
            .field("index", &self.index.name())
            .field("declared", &self.declared())
            .finish()
    }
}
