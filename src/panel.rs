use std::f32::consts::PI;
use std::ops::RangeInclusive;

use crate::materials::update_all_materials;
use crate::params::GlobalParams;
use crate::scene::{NodeId, NodeKind, SceneGraph, Skybox};

/// Folder holding the scene-wide controls.
pub const GLOBAL_FOLDER: &str = "Global";
pub const SKYBOX_FOLDER: &str = "Skybox";

/// Identifier returned when a control is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControlId(usize);

/// Property a slider writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// Writes [`GlobalParams::env_map_intensity`] and reruns the material updater.
    EnvMapIntensity,
    BackgroundBlurriness,
    BackgroundIntensity,
    /// Y Euler angle of a node.
    RotationY(NodeId),
    SkyboxRadius(NodeId),
    SkyboxHeight(NodeId),
}

impl Binding {
    /// Current value of the bound property, if its target still exists.
    pub fn read(self, scene: &SceneGraph, params: &GlobalParams) -> Option<f32> {
        match self {
            Self::EnvMapIntensity => Some(params.env_map_intensity),
            Self::BackgroundBlurriness => Some(params.background_blurriness),
            Self::BackgroundIntensity => Some(params.background_intensity),
            Self::RotationY(id) => scene.node(id).map(|node| node.transform.rotation.y),
            Self::SkyboxRadius(id) => skybox(scene, id).map(|skybox| skybox.radius),
            Self::SkyboxHeight(id) => skybox(scene, id).map(|skybox| skybox.height),
        }
    }

    /// Writes `value` and runs the change callback. Returns the number of
    /// materials refreshed when the callback reran the material updater.
    pub fn apply(
        self,
        scene: &mut SceneGraph,
        params: &mut GlobalParams,
        value: f32,
    ) -> Option<usize> {
        match self {
            Self::EnvMapIntensity => {
                params.env_map_intensity = value;
                return Some(update_all_materials(scene, params));
            }
            Self::BackgroundBlurriness => {
                params.background_blurriness = value;
                scene.background_blurriness = value;
            }
            Self::BackgroundIntensity => {
                params.background_intensity = value;
                scene.background_intensity = value;
            }
            Self::RotationY(id) => {
                if let Some(node) = scene.node_mut(id) {
                    node.transform.rotation.y = value;
                }
            }
            Self::SkyboxRadius(id) => {
                if let Some(skybox) = scene.skybox_mut(id) {
                    skybox.radius = value;
                }
            }
            Self::SkyboxHeight(id) => {
                if let Some(skybox) = scene.skybox_mut(id) {
                    skybox.height = value;
                }
            }
        }
        None
    }
}

fn skybox(scene: &SceneGraph, id: NodeId) -> Option<&Skybox> {
    match &scene.node(id)?.kind {
        NodeKind::Skybox(skybox) => Some(skybox),
        _ => None,
    }
}

/// Slider bound to one property.
#[derive(Debug, Clone, PartialEq)]
pub struct Control {
    pub id: ControlId,
    pub folder: String,
    pub label: String,
    pub binding: Binding,
    pub min: f32,
    pub max: f32,
    pub step: f32,
}

impl Control {
    /// Clamps to the range. `step` only drives the slider widget; values
    /// set programmatically are stored as given.
    pub fn constrain(&self, value: f32) -> f32 {
        let value = if value.is_finite() { value } else { self.min };
        value.clamp(self.min, self.max)
    }
}

/// Debug panel model: folders of range sliders in registration order.
///
/// Drawing lives in `ui`; this type only keeps the control definitions so it
/// can be driven headlessly.
#[derive(Debug, Clone, Default)]
pub struct ParameterPanel {
    controls: Vec<Control>,
    folders: Vec<String>,
}

impl ParameterPanel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the Map Intensity, Background Blur and Background Intensity
    /// sliders.
    pub fn with_global_controls() -> Self {
        let mut panel = Self::new();
        panel.add(
            GLOBAL_FOLDER,
            "Map Intensity",
            Binding::EnvMapIntensity,
            0.0..=10.0,
            0.001,
        );
        panel.add(
            GLOBAL_FOLDER,
            "Background Blur",
            Binding::BackgroundBlurriness,
            0.0..=1.0,
            0.001,
        );
        panel.add(
            GLOBAL_FOLDER,
            "Background Intensity",
            Binding::BackgroundIntensity,
            0.5..=5.0,
            0.001,
        );
        panel
    }

    pub fn add(
        &mut self,
        folder: &str,
        label: &str,
        binding: Binding,
        range: RangeInclusive<f32>,
        step: f32,
    ) -> ControlId {
        if !self.folders.iter().any(|existing| existing == folder) {
            self.folders.push(folder.to_string());
        }
        let id = ControlId(self.controls.len());
        let (min, max) = range.into_inner();
        self.controls.push(Control {
            id,
            folder: folder.to_string(),
            label: label.to_string(),
            binding,
            min: min.min(max),
            max: max.max(min),
            step,
        });
        id
    }

    /// Registers the per-model rotation slider covering one full turn.
    pub fn add_rotation(&mut self, folder: &str, node: NodeId) -> ControlId {
        self.add(folder, "rotation", Binding::RotationY(node), -PI..=PI, 0.001)
    }

    /// Registers the skybox radius and height sliders.
    pub fn add_skybox(&mut self, node: NodeId) -> (ControlId, ControlId) {
        let radius = self.add(
            SKYBOX_FOLDER,
            "radius",
            Binding::SkyboxRadius(node),
            1.0..=200.0,
            0.1,
        );
        let height = self.add(
            SKYBOX_FOLDER,
            "height",
            Binding::SkyboxHeight(node),
            1.0..=100.0,
            0.1,
        );
        (radius, height)
    }

    pub fn get(&self, id: ControlId) -> Option<&Control> {
        self.controls.get(id.0)
    }

    pub fn find(&self, folder: &str, label: &str) -> Option<&Control> {
        self.controls
            .iter()
            .find(|control| control.folder == folder && control.label == label)
    }

    pub fn controls(&self) -> &[Control] {
        &self.controls
    }

    pub fn folders(&self) -> &[String] {
        &self.folders
    }

    pub fn folder_controls<'a>(
        &'a self,
        folder: &'a str,
    ) -> impl Iterator<Item = &'a Control> + 'a {
        self.controls
            .iter()
            .filter(move |control| control.folder == folder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::PerspectiveCamera;

    fn scene() -> SceneGraph {
        SceneGraph::new(PerspectiveCamera::new(75.0, 1.0, 0.1, 100.0))
    }

    #[test]
    fn global_folder_matches_the_debug_panel_layout() {
        let panel = ParameterPanel::with_global_controls();
        assert_eq!(panel.folders(), &["Global".to_string()]);
        let intensity = panel.find("Global", "Map Intensity").unwrap();
        assert_eq!((intensity.min, intensity.max, intensity.step), (0.0, 10.0, 0.001));
        let blur = panel.find("Global", "Background Blur").unwrap();
        assert_eq!((blur.min, blur.max), (0.0, 1.0));
        let background = panel.find("Global", "Background Intensity").unwrap();
        assert_eq!((background.min, background.max), (0.5, 5.0));
    }

    #[test]
    fn constrain_clamps_and_passes_values_through() {
        let panel = ParameterPanel::with_global_controls();
        let intensity = panel.find("Global", "Map Intensity").unwrap();
        assert_eq!(intensity.constrain(42.0), 10.0);
        assert_eq!(intensity.constrain(-1.0), 0.0);
        assert_eq!(intensity.constrain(2.50049), 2.50049);
        assert_eq!(intensity.constrain(2.3456), 2.3456);
        assert_eq!(intensity.constrain(f32::NAN), 0.0);
        let blur = panel.find("Global", "Background Blur").unwrap();
        assert_eq!(blur.constrain(0.7), 0.7);
        assert_eq!(blur.constrain(0.1234), 0.1234);

        let mut panel = ParameterPanel::new();
        let (id, _) = panel.add_skybox(NodeId::ROOT);
        assert_eq!(panel.get(id).unwrap().constrain(57.04), 57.04);

        let rotation = panel.add_rotation("FlightHelmet", NodeId::ROOT);
        assert_eq!(panel.get(rotation).unwrap().constrain(0.0), 0.0);
        assert_eq!(panel.get(rotation).unwrap().constrain(4.0), PI);
    }

    #[test]
    fn blur_binding_writes_params_and_scene() {
        let mut scene = scene();
        let mut params = GlobalParams::default();
        assert_eq!(Binding::BackgroundBlurriness.apply(&mut scene, &mut params, 0.5), None);
        assert_eq!(params.background_blurriness, 0.5);
        assert_eq!(scene.background_blurriness, 0.5);
        assert_eq!(Binding::BackgroundBlurriness.read(&scene, &params), Some(0.5));
    }

    #[test]
    fn intensity_binding_reruns_the_material_updater() {
        let mut scene = scene();
        let mut params = GlobalParams::default();
        assert_eq!(Binding::EnvMapIntensity.apply(&mut scene, &mut params, 7.0), Some(0));
        assert_eq!(params.env_map_intensity, 7.0);
    }

    #[test]
    fn node_bindings_follow_their_targets() {
        let mut scene = scene();
        let mut params = GlobalParams::default();
        let model = scene.add(scene.root(), "FlightHelmet", NodeKind::Group);
        let skybox = scene.add(
            scene.root(),
            "skybox",
            NodeKind::Skybox(Skybox {
                radius: 120.0,
                height: 11.0,
            }),
        );

        Binding::RotationY(model).apply(&mut scene, &mut params, 1.25);
        assert_eq!(scene.node(model).unwrap().transform.rotation.y, 1.25);
        Binding::SkyboxHeight(skybox).apply(&mut scene, &mut params, 30.0);
        assert_eq!(Binding::SkyboxHeight(skybox).read(&scene, &params), Some(30.0));
        assert_eq!(Binding::SkyboxRadius(skybox).read(&scene, &params), Some(120.0));
        assert_eq!(Binding::SkyboxRadius(model).read(&scene, &params), None);
    }

    #[test]
    fn rotation_and_skybox_folders_are_added_in_order() {
        let mut panel = ParameterPanel::with_global_controls();
        let rotation = panel.add_rotation("FlightHelmet", NodeId::ROOT);
        panel.add_skybox(NodeId::ROOT);
        assert_eq!(panel.folders(), &["Global", "FlightHelmet", "Skybox"]);
        let control = panel.get(rotation).unwrap();
        assert_eq!((control.min, control.max), (-PI, PI));
        assert_eq!(panel.folder_controls("Skybox").count(), 2);
    }
}
