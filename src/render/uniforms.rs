use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4};

use crate::materials::Material;
use crate::scene::SceneGraph;

/// Per-frame values shared by the background and mesh pipelines.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GlobalUniform {
    pub view_proj: [[f32; 4]; 4],
    pub inv_view_proj: [[f32; 4]; 4],
    pub camera_position: [f32; 4],
    /// Blurriness, intensity, highest mip, background bound.
    pub background: [f32; 4],
    /// Highest mip, environment bound, encode output as sRGB, unused.
    pub environment: [f32; 4],
    /// Enabled, radius, height, unused.
    pub skybox: [f32; 4],
}

impl GlobalUniform {
    pub fn from_scene(scene: &SceneGraph, encode_srgb: bool) -> Self {
        let view_proj = scene.camera.view_projection();
        let max_mip = |map: Option<&std::sync::Arc<crate::environment::EnvironmentMap>>| {
            map.map_or(0.0, |map| map.mip_count().saturating_sub(1) as f32)
        };
        let skybox = scene
            .skybox()
            .map_or([0.0; 4], |skybox| [1.0, skybox.radius, skybox.height, 0.0]);
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            inv_view_proj: view_proj.inverse().to_cols_array_2d(),
            camera_position: scene.camera.position.extend(1.0).into(),
            background: [
                scene.background_blurriness.clamp(0.0, 1.0),
                scene.background_intensity,
                max_mip(scene.background.as_ref()),
                flag(scene.background.is_some()),
            ],
            environment: [
                max_mip(scene.environment.as_ref()),
                flag(scene.environment.is_some()),
                flag(encode_srgb),
                0.0,
            ],
            skybox,
        }
    }
}

/// Per-mesh transform block, rewritten every frame.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ObjectTransform {
    pub model: [[f32; 4]; 4],
    pub normal: [[f32; 4]; 3],
}

impl ObjectTransform {
    pub fn new(world: Mat4) -> Self {
        let normal = Mat3::from_mat4(world).inverse().transpose();
        Self {
            model: world.to_cols_array_2d(),
            normal: mat3_to_3x4(normal),
        }
    }
}

/// Per-mesh material block, rewritten only when the material is flagged.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MaterialUniform {
    pub base_color: [f32; 4],
    /// Metallic, roughness, env map intensity, unlit.
    pub pbr: [f32; 4],
}

impl MaterialUniform {
    pub fn new(material: &Material) -> Self {
        match material {
            Material::Standard(standard) => Self {
                base_color: standard.base_color.into(),
                pbr: [
                    standard.metallic.clamp(0.0, 1.0),
                    standard.roughness.clamp(0.0, 1.0),
                    standard.env_map_intensity,
                    0.0,
                ],
            },
            Material::Basic(basic) => Self {
                base_color: basic.color.extend(1.0).into(),
                pbr: [0.0, 1.0, 0.0, 1.0],
            },
        }
    }
}

/// Layout of the per-mesh uniform buffer: the transform followed by the
/// material.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MeshUniform {
    pub transform: ObjectTransform,
    pub material: MaterialUniform,
}

impl MeshUniform {
    pub const MATERIAL_OFFSET: u64 = std::mem::size_of::<ObjectTransform>() as u64;
}

fn flag(value: bool) -> f32 {
    if value {
        1.0
    } else {
        0.0
    }
}

fn mat3_to_3x4(matrix: Mat3) -> [[f32; 4]; 3] {
    [
        matrix.x_axis.extend(0.0).into(),
        matrix.y_axis.extend(0.0).into(),
        matrix.z_axis.extend(0.0).into(),
    ]
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use glam::{Vec3, Vec4};
    use image::{Rgba, Rgba32FImage};

    use super::*;
    use crate::camera::PerspectiveCamera;
    use crate::environment::EnvironmentMap;
    use crate::materials::{BasicMaterial, StandardMaterial};
    use crate::scene::{NodeKind, Skybox};

    fn scene() -> SceneGraph {
        let mut camera = PerspectiveCamera::new(75.0, 1.5, 0.1, 100.0);
        camera.position = Vec3::new(4.0, 5.0, 12.0);
        camera.look_at(Vec3::new(0.0, 3.5, 0.0));
        SceneGraph::new(camera)
    }

    #[test]
    fn layouts_match_the_shader_structs() {
        assert_eq!(std::mem::size_of::<GlobalUniform>(), 192);
        assert_eq!(MeshUniform::MATERIAL_OFFSET, 112);
        assert_eq!(std::mem::size_of::<MeshUniform>(), 144);
    }

    #[test]
    fn inverse_view_projection_round_trips() {
        let uniform = GlobalUniform::from_scene(&scene(), false);
        let product = Mat4::from_cols_array_2d(&uniform.inv_view_proj)
            * Mat4::from_cols_array_2d(&uniform.view_proj);
        assert!(product.abs_diff_eq(Mat4::IDENTITY, 1e-4));
        assert_eq!(uniform.camera_position, [4.0, 5.0, 12.0, 1.0]);
    }

    #[test]
    fn environment_and_skybox_flags_follow_the_scene() {
        let mut scene = scene();
        let uniform = GlobalUniform::from_scene(&scene, true);
        assert_eq!(uniform.background[3], 0.0);
        assert_eq!(uniform.environment, [0.0, 0.0, 1.0, 0.0]);
        assert_eq!(uniform.skybox, [0.0; 4]);

        let face = Rgba32FImage::from_pixel(16, 16, Rgba([1.0, 1.0, 1.0, 1.0]));
        let map = Arc::new(
            EnvironmentMap::from_cube_faces(std::array::from_fn(|_| face.clone())).unwrap(),
        );
        scene.environment = Some(Arc::clone(&map));
        scene.background = Some(map);
        scene.background_blurriness = 0.5;
        scene.background_intensity = 2.0;
        scene.add(
            scene.root(),
            "skybox",
            NodeKind::Skybox(Skybox {
                radius: 120.0,
                height: 11.0,
            }),
        );

        let uniform = GlobalUniform::from_scene(&scene, false);
        assert_eq!(uniform.background, [0.5, 2.0, 4.0, 1.0]);
        assert_eq!(uniform.environment, [4.0, 1.0, 0.0, 0.0]);
        assert_eq!(uniform.skybox, [1.0, 120.0, 11.0, 0.0]);
    }

    #[test]
    fn normal_matrix_undoes_non_uniform_scale() {
        let world = Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        let transform = ObjectTransform::new(world);
        assert_eq!(transform.normal[0], [0.5, 0.0, 0.0, 0.0]);
        assert_eq!(transform.normal[1], [0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn materials_pack_pbr_and_unlit_values() {
        let standard = Material::Standard(StandardMaterial {
            base_color: Vec4::new(1.0, 0.5, 0.25, 1.0),
            metallic: 0.75,
            roughness: 0.2,
            env_map_intensity: 5.0,
            ..StandardMaterial::default()
        });
        let packed = MaterialUniform::new(&standard);
        assert_eq!(packed.base_color, [1.0, 0.5, 0.25, 1.0]);
        assert_eq!(packed.pbr, [0.75, 0.2, 5.0, 0.0]);

        let basic = Material::Basic(BasicMaterial {
            color: Vec3::new(0.1, 0.2, 0.3),
            needs_update: true,
        });
        assert_eq!(MaterialUniform::new(&basic).pbr[3], 1.0);
    }
}
