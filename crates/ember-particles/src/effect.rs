//! Particle effects: named groups of controllers loaded from TOML

use crate::controller::ParticleController;
use crate::influencers::{Influencer, TemplateRef, TemplateResolver};
use ember_core::{BoundingBox, EmberError, Result, Transform};
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// A complete effect: every controller shares one lifecycle.
#[derive(Debug, Serialize, Deserialize)]
pub struct ParticleEffect {
    pub name: String,
    #[serde(default)]
    pub controllers: Vec<ParticleController>,
}

impl ParticleEffect {
    pub fn new(name: impl Into<String>, controllers: Vec<ParticleController>) -> Self {
        Self {
            name: name.into(),
            controllers,
        }
    }

    /// Parse an effect definition
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Serialize the effect's configuration. Particle state is never written.
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let effect = Self::from_toml_str(&content)?;
        info!(
            effect = %effect.name,
            controllers = effect.controllers.len(),
            path = %path.display(),
            "loaded particle effect"
        );
        Ok(effect)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_toml_string()?)?;
        debug!(effect = %self.name, path = %path.display(), "saved particle effect");
        Ok(())
    }

    /// Resolve every nested-controller template reference through `resolver`.
    pub fn resolve_templates(&mut self, resolver: &dyn TemplateResolver) -> Result<()> {
        for controller in &mut self.controllers {
            for influencer in &mut controller.influencers {
                if let Influencer::ParticleController(nested) = influencer {
                    nested.load(resolver)?;
                }
            }
        }
        Ok(())
    }

    pub fn init(&mut self) -> Result<()> {
        self.controllers.iter_mut().try_for_each(ParticleController::init)
    }

    pub fn start(&mut self) -> Result<()> {
        self.controllers.iter_mut().try_for_each(ParticleController::start)
    }

    pub fn end(&mut self) -> Result<()> {
        self.controllers.iter_mut().try_for_each(ParticleController::end)
    }

    pub fn reset(&mut self) -> Result<()> {
        self.controllers.iter_mut().try_for_each(ParticleController::reset)
    }

    pub fn update(&mut self, dt: f32) -> Result<()> {
        for controller in &mut self.controllers {
            controller.update(dt)?;
        }
        Ok(())
    }

    pub fn dispose(&mut self) -> Result<()> {
        self.controllers.iter_mut().try_for_each(ParticleController::dispose)
    }

    /// True once every controller has finished its cycle with nothing alive
    pub fn is_complete(&self) -> bool {
        self.controllers.iter().all(ParticleController::is_complete)
    }

    /// Configuration-only copy; every controller gets a new identity
    pub fn copy(&self) -> Self {
        Self {
            name: self.name.clone(),
            controllers: self.controllers.iter().map(ParticleController::copy).collect(),
        }
    }

    pub fn find_controller(&self, name: &str) -> Option<&ParticleController> {
        self.controllers.iter().find(|c| c.name == name)
    }

    pub fn find_controller_mut(&mut self, name: &str) -> Option<&mut ParticleController> {
        self.controllers.iter_mut().find(|c| c.name == name)
    }

    pub fn set_transform(&mut self, transform: &Transform) {
        for controller in &mut self.controllers {
            controller.set_transform(transform);
        }
    }

    pub fn translate(&mut self, translation: Vec3) {
        for controller in &mut self.controllers {
            controller.translate(translation);
        }
    }

    pub fn rotate(&mut self, rotation: Quat) {
        for controller in &mut self.controllers {
            controller.rotate(rotation);
        }
    }

    pub fn scale_by(&mut self, scale: Vec3) {
        for controller in &mut self.controllers {
            controller.scale_by(scale);
        }
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let mut bounds = BoundingBox::default();
        for controller in &self.controllers {
            bounds.merge(&controller.bounding_box());
        }
        bounds
    }

    /// Live particles across all controllers
    pub fn alive_count(&self) -> usize {
        self.controllers.iter().map(|c| c.particles().size()).sum()
    }
}

/// In-memory effect assets, usable as a [`TemplateResolver`]
#[derive(Debug, Default)]
pub struct EffectLibrary {
    effects: HashMap<String, ParticleEffect>,
}

impl EffectLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an effect under its name, resolving its own templates against what the
    /// library already holds.
    pub fn insert(&mut self, mut effect: ParticleEffect) -> Result<()> {
        effect.resolve_templates(&*self)?;
        self.effects.insert(effect.name.clone(), effect);
        Ok(())
    }

    pub fn load(&mut self, path: &Path) -> Result<()> {
        self.insert(ParticleEffect::load(path)?)
    }

    pub fn get(&self, name: &str) -> Option<&ParticleEffect> {
        self.effects.get(name)
    }

    /// Fresh, uninitialized copy of the named effect
    pub fn instantiate(&self, name: &str) -> Option<ParticleEffect> {
        self.effects.get(name).map(ParticleEffect::copy)
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }
}

impl TemplateResolver for EffectLibrary {
    fn resolve(&self, template: &TemplateRef) -> Result<ParticleController> {
        self.effects
            .get(&template.asset)
            .and_then(|effect| effect.controllers.get(template.index))
            .map(ParticleController::copy)
            .ok_or_else(|| {
                warn!(asset = %template.asset, index = template.index, "unresolved controller template");
                EmberError::TemplateNotFound {
                    asset: template.asset.clone(),
                    index: template.index,
                }
            })
    }
}
