//! Archetype registry: shader name → [`ShaderArchetype`].
//!
//! The standard PBR archetype is built in. Further archetypes are authored in a RON
//! manifest:
//!
//! ```ron
//! (
//!     archetypes: {
//!         "Unlit": (
//!             rules: { "_MainTex": ColorTint(color: "_Color") },
//!             srgb_slots: ["_MainTex"],
//!         ),
//!     },
//! )
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::archetype::ShaderArchetype;

/// Shader name the built-in archetype is registered under.
pub const STANDARD_SHADER: &str = "Standard";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned while loading archetype manifests.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// I/O error reading the manifest file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// RON deserialization error.
    #[error("ron parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),

    /// A manifest tried to redefine an already registered shader.
    #[error("duplicate shader archetype: {0}")]
    DuplicateShader(String),
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

/// Top-level RON manifest.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ArchetypeManifest {
    #[serde(default)]
    pub archetypes: BTreeMap<String, ShaderArchetype>,
}

// ---------------------------------------------------------------------------
// ArchetypeRegistry
// ---------------------------------------------------------------------------

/// Lookup of archetypes by shader name. Immutable once handed to the driver.
#[derive(Clone, Debug, Default)]
pub struct ArchetypeRegistry {
    archetypes: BTreeMap<String, ShaderArchetype>,
}

impl ArchetypeRegistry {
    /// An empty registry. Nothing is atlased until archetypes are registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding only the built-in standard archetype.
    pub fn with_standard() -> Self {
        let mut registry = Self::new();
        registry.register(STANDARD_SHADER, ShaderArchetype::standard());
        registry
    }

    /// Binds `archetype` to `shader`, replacing any previous binding.
    pub fn register(&mut self, shader: impl Into<String>, archetype: ShaderArchetype) {
        self.archetypes.insert(shader.into(), archetype);
    }

    pub fn get(&self, shader: &str) -> Option<&ShaderArchetype> {
        self.archetypes.get(shader)
    }

    pub fn contains(&self, shader: &str) -> bool {
        self.archetypes.contains_key(shader)
    }

    pub fn shaders(&self) -> impl Iterator<Item = &str> {
        self.archetypes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.archetypes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archetypes.is_empty()
    }

    /// Builds a registry from a RON manifest string.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Ron`] if the manifest does not parse.
    pub fn from_ron_str(ron_str: &str) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        registry.merge_ron_str(ron_str)?;
        Ok(registry)
    }

    /// Builds a registry from a RON manifest file.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] on I/O or parse failures.
    pub fn from_ron(path: &Path) -> Result<Self, RegistryError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron_str(&contents)
    }

    /// Adds every archetype in a manifest string. Shaders already registered are
    /// rejected rather than overwritten; on error the registry is unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Ron`] or [`RegistryError::DuplicateShader`].
    pub fn merge_ron_str(&mut self, ron_str: &str) -> Result<usize, RegistryError> {
        let manifest: ArchetypeManifest = ron::from_str(ron_str)?;
        if let Some(shader) = manifest
            .archetypes
            .keys()
            .find(|shader| self.archetypes.contains_key(*shader))
        {
            return Err(RegistryError::DuplicateShader(shader.clone()));
        }

        let count = manifest.archetypes.len();
        for (shader, archetype) in manifest.archetypes {
            debug!(
                shader = shader.as_str(),
                rules = archetype.rules.len(),
                excluded = archetype.excluded.len(),
                "registered archetype"
            );
            self.archetypes.insert(shader, archetype);
        }
        Ok(count)
    }

    /// File variant of [`ArchetypeRegistry::merge_ron_str`].
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] on I/O, parse, or duplicate failures.
    pub fn merge_ron(&mut self, path: &Path) -> Result<usize, RegistryError> {
        let contents = std::fs::read_to_string(path)?;
        self.merge_ron_str(&contents)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
