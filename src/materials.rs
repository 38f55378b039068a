use std::sync::Arc;

use glam::{Vec3, Vec4};
use log::debug;

use crate::params::GlobalParams;
use crate::scene::SceneGraph;

/// Decoded RGBA8 texture shared between materials.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
    /// Colour data (sRGB encoded) as opposed to linear data such as
    /// metallic/roughness.
    pub srgb: bool,
}

/// Lit material sampling the scene environment.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardMaterial {
    pub base_color: Vec4,
    pub base_color_texture: Option<Arc<TextureImage>>,
    pub metallic: f32,
    pub roughness: f32,
    pub metallic_roughness_texture: Option<Arc<TextureImage>>,
    pub env_map_intensity: f32,
    pub needs_update: bool,
}

impl Default for StandardMaterial {
    fn default() -> Self {
        Self {
            base_color: Vec4::ONE,
            base_color_texture: None,
            metallic: 0.0,
            roughness: 1.0,
            metallic_roughness_texture: None,
            env_map_intensity: 1.0,
            needs_update: true,
        }
    }
}

/// Unlit flat colour.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicMaterial {
    pub color: Vec3,
    pub needs_update: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Material {
    Standard(StandardMaterial),
    Basic(BasicMaterial),
}

impl Material {
    pub fn as_standard(&self) -> Option<&StandardMaterial> {
        match self {
            Self::Standard(material) => Some(material),
            Self::Basic(_) => None,
        }
    }

    pub fn needs_update(&self) -> bool {
        match self {
            Self::Standard(material) => material.needs_update,
            Self::Basic(material) => material.needs_update,
        }
    }

    pub(crate) fn acknowledge_update(&mut self) {
        match self {
            Self::Standard(material) => material.needs_update = false,
            Self::Basic(material) => material.needs_update = false,
        }
    }
}

/// Pushes the global environment intensity into every standard material and
/// flags those meshes as shadow casters and receivers.
///
/// Returns the number of materials touched.
pub fn update_all_materials(scene: &mut SceneGraph, params: &GlobalParams) -> usize {
    let mut updated = 0;
    scene.traverse_mut(|_, node| {
        let Some(mesh) = node.mesh_mut() else {
            return;
        };
        let Material::Standard(material) = &mut mesh.material else {
            return;
        };
        material.env_map_intensity = params.env_map_intensity;
        material.needs_update = true;
        mesh.cast_shadow = true;
        mesh.receive_shadow = true;
        updated += 1;
    });
    debug!(
        "updated {updated} material(s) to env map intensity {:.3}",
        params.env_map_intensity
    );
    updated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::PerspectiveCamera;
    use crate::geometry::Geometry;
    use crate::scene::{Mesh, NodeKind};

    fn scene_with_materials() -> SceneGraph {
        let mut scene = SceneGraph::new(PerspectiveCamera::new(75.0, 1.0, 0.1, 100.0));
        let geometry = Arc::new(Geometry::default());
        let group = scene.add(scene.root(), "model", NodeKind::Group);
        for name in ["visor", "strap"] {
            scene.add(
                group,
                name,
                NodeKind::Mesh(Mesh::new(
                    Arc::clone(&geometry),
                    Material::Standard(StandardMaterial::default()),
                )),
            );
        }
        scene.add(
            scene.root(),
            "marker",
            NodeKind::Mesh(Mesh::new(
                geometry,
                Material::Basic(BasicMaterial {
                    color: Vec3::ONE,
                    needs_update: false,
                }),
            )),
        );
        scene.acknowledge_material_updates();
        scene
    }

    fn snapshot(scene: &SceneGraph) -> Vec<(Material, bool, bool)> {
        scene
            .mesh_instances()
            .iter()
            .map(|i| (i.mesh.material.clone(), i.mesh.cast_shadow, i.mesh.receive_shadow))
            .collect()
    }

    #[test]
    fn every_standard_mesh_takes_the_global_intensity() {
        for intensity in [0.0, 0.001, 2.5, 5.0, 9.999, 10.0] {
            let mut scene = scene_with_materials();
            let params = GlobalParams {
                env_map_intensity: intensity,
                ..GlobalParams::default()
            };
            assert_eq!(update_all_materials(&mut scene, &params), 2);
            for instance in scene.mesh_instances() {
                match &instance.mesh.material {
                    Material::Standard(material) => {
                        assert_eq!(material.env_map_intensity, intensity);
                        assert!(material.needs_update);
                        assert!(instance.mesh.cast_shadow);
                        assert!(instance.mesh.receive_shadow);
                    }
                    Material::Basic(material) => {
                        assert!(!material.needs_update);
                        assert!(!instance.mesh.cast_shadow);
                    }
                }
            }
        }
    }

    #[test]
    fn repeated_updates_are_idempotent() {
        let mut scene = scene_with_materials();
        let params = GlobalParams::default();
        update_all_materials(&mut scene, &params);
        let first = snapshot(&scene);
        update_all_materials(&mut scene, &params);
        assert_eq!(first, snapshot(&scene));
    }

    #[test]
    fn acknowledging_clears_dirty_flags() {
        let mut scene = scene_with_materials();
        update_all_materials(&mut scene, &GlobalParams::default());
        scene.acknowledge_material_updates();
        assert!(scene
            .mesh_instances()
            .iter()
            .all(|i| !i.mesh.material.needs_update()));
    }
}
