//! Materials built from one source material, one per (engine, variant).

use std::sync::Arc;

use uuid::Uuid;

use super::{ConstructGraph, FinalizeCodegen, Material};
use crate::errors::Result;
use crate::pass::{EngineId, PassCache};
use crate::settings::MaterialOptions;

#[derive(Debug, Default)]
pub struct MaterialSet {
    materials: Vec<Material>,
}

impl MaterialSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the material for `(engine, uuid)`, building it on first use.
    ///
    /// Callbacks are only invoked when a new material is built.
    pub fn find_or_create(
        &mut self,
        cache: &Arc<PassCache>,
        name: &str,
        engine: EngineId,
        uuid: Uuid,
        construct: impl ConstructGraph,
        finalize: impl FinalizeCodegen,
        options: &MaterialOptions,
    ) -> Result<&Material> {
        if let Some(index) = self.position(engine, uuid) {
            return Ok(&self.materials[index]);
        }
        let material = Material::new(cache, name, engine, uuid, construct, finalize, options)?;
        self.materials.push(material);
        Ok(&self.materials[self.materials.len() - 1])
    }

    #[must_use]
    pub fn get(&self, engine: EngineId, uuid: Uuid) -> Option<&Material> {
        self.position(engine, uuid).map(|i| &self.materials[i])
    }

    /// Removes a material, releasing its pass references.
    pub fn remove(&mut self, engine: EngineId, uuid: Uuid) -> Option<Material> {
        self.position(engine, uuid).map(|i| self.materials.swap_remove(i))
    }

    /// Drops every material, e.g. after the source material was edited.
    pub fn clear(&mut self) {
        self.materials.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.materials.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Material> + '_ {
        self.materials.iter()
    }

    fn position(&self, engine: EngineId, uuid: Uuid) -> Option<usize> {
        self.materials
            .iter()
            .position(|m| m.engine() == engine && m.uuid() == uuid)
    }
}
