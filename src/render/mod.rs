//! Frame targets: the wgpu window renderer and a headless stand-in.

mod gpu;
mod shaders;
mod uniforms;

use anyhow::Result;

use crate::scene::SceneGraph;
use crate::ui::UiFrame;
use crate::viewport::drawing_buffer_size;

pub use gpu::Renderer;
pub use uniforms::{GlobalUniform, MeshUniform};

/// Something a frame can be drawn into.
///
/// `set_size` takes logical pixels; the drawing buffer is that size scaled by
/// the pixel ratio.
pub trait FrameTarget {
    fn set_size(&mut self, width: u32, height: u32);
    fn set_pixel_ratio(&mut self, ratio: f64);
    fn size(&self) -> (u32, u32);
    fn pixel_ratio(&self) -> f64;
    fn render(&mut self, scene: &SceneGraph, overlay: Option<&UiFrame>) -> Result<()>;
}

/// Target without a GPU. Records what each frame would have drawn so the
/// render loop can run in tests and `--summary-only` mode.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadlessTarget {
    size: (u32, u32),
    pixel_ratio: f64,
    frames: u64,
    last_frame: Option<FrameStats>,
}

/// Summary of the most recent headless frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStats {
    pub meshes: usize,
    pub dirty_materials: usize,
    pub has_environment: bool,
    pub has_background: bool,
    pub has_skybox: bool,
}

impl HeadlessTarget {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width.max(1), height.max(1)),
            pixel_ratio: 1.0,
            frames: 0,
            last_frame: None,
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn last_frame(&self) -> Option<FrameStats> {
        self.last_frame
    }

    pub fn drawing_buffer_size(&self) -> (u32, u32) {
        drawing_buffer_size(self.size.0, self.size.1, self.pixel_ratio)
    }
}

impl FrameTarget for HeadlessTarget {
    fn set_size(&mut self, width: u32, height: u32) {
        self.size = (width.max(1), height.max(1));
    }

    fn set_pixel_ratio(&mut self, ratio: f64) {
        self.pixel_ratio = ratio;
    }

    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn pixel_ratio(&self) -> f64 {
        self.pixel_ratio
    }

    fn render(&mut self, scene: &SceneGraph, _overlay: Option<&UiFrame>) -> Result<()> {
        let instances = scene.mesh_instances();
        self.last_frame = Some(FrameStats {
            meshes: instances.len(),
            dirty_materials: instances
                .iter()
                .filter(|instance| instance.mesh.material.needs_update())
                .count(),
            has_environment: scene.environment.is_some(),
            has_background: scene.background.is_some(),
            has_skybox: scene.skybox().is_some(),
        });
        self.frames += 1;
        Ok(())
    }
}
