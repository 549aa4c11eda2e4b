//! Scenes of the network

use tracing::{debug, info};

use super::MeshNetwork;
use crate::address::{Address, SceneNumber};
use crate::errors::{ConflictError, MeshError, PolicyError, ValidationError};
use crate::node::Node;
use crate::provisioner::Provisioner;
use crate::range::RangeObject;
use crate::scene::Scene;
use crate::Result;

impl MeshNetwork {
    pub fn scene(&self, number: SceneNumber) -> Option<&Scene> {
        self.scenes.iter().find(|s| s.number() == number)
    }

    fn scene_mut(&mut self, number: SceneNumber) -> Result<&mut Scene> {
        self.scenes
            .iter_mut()
            .find(|s| s.number() == number)
            .ok_or_else(|| MeshError::not_found(format!("Scene {}", number)))
    }

    pub fn add_scene<T: Into<String>>(&mut self, number: SceneNumber, name: T) -> Result<()> {
        if !number.is_valid() {
            return Err(ValidationError::InvalidSceneNumber { scene: number.value() }.into());
        }
        if self.scene(number).is_some() {
            return Err(ConflictError::SceneAlreadyExists { scene: number.value() }.into());
        }
        let scene = Scene::new(number, name)?;
        info!("Added scene {} '{}'", number, scene.name);
        self.scenes.push(scene);
        self.touch();
        Ok(())
    }

    /// Remove a scene no element stores
    pub fn remove_scene(&mut self, number: SceneNumber) -> Result<Scene> {
        let position = self
            .scenes
            .iter()
            .position(|s| s.number() == number)
            .ok_or_else(|| MeshError::not_found(format!("Scene {}", number)))?;
        if self.scenes[position].is_used() {
            return Err(PolicyError::SceneInUse { scene: number.value() }.into());
        }
        let scene = self.scenes.remove(position);
        self.touch();
        info!("Removed scene {}", number);
        Ok(scene)
    }

    /// Register the element with the given unicast address as storing the scene
    pub fn add_scene_address(&mut self, number: SceneNumber, address: Address) -> Result<()> {
        if !address.is_unicast() {
            return Err(MeshError::invalid_address(address));
        }
        if self.scene_mut(number)?.add_address(address) {
            self.touch();
            debug!("Scene {} stored by 0x{}", number, address);
        }
        Ok(())
    }

    pub fn remove_scene_address(&mut self, number: SceneNumber, address: Address) -> Result<()> {
        if self.scene_mut(number)?.remove_address(address) {
            self.touch();
            debug!("Scene {} no longer stored by 0x{}", number, address);
        }
        Ok(())
    }

    /// Nodes with at least one element storing the scene
    pub fn nodes_registered_to(&self, number: SceneNumber) -> Vec<&Node> {
        let Some(scene) = self.scene(number) else {
            return Vec::new();
        };
        self.nodes
            .iter()
            .filter(|n| scene.addresses().iter().any(|a| n.contains_element_with_address(*a)))
            .collect()
    }

    /// The lowest scene number of the provisioner's ranges not used yet
    pub fn next_available_scene(&self, provisioner: &Provisioner) -> Option<SceneNumber> {
        let mut used: Vec<u32> = self.scenes.iter().map(|s| u32::from(s.number().value())).collect();
        used.sort_unstable();

        for range in provisioner.allocated_scene_range() {
            let mut scene = u32::from(range.lower_bound());
            for &used_scene in &used {
                if scene > used_scene {
                    continue;
                }
                if scene < used_scene {
                    break;
                }
                scene = used_scene + 1;
            }
            if scene <= u32::from(range.upper_bound()) {
                return Some(SceneNumber::new(scene as u16));
            }
        }
        None
    }
}
