use std::fmt;
use std::sync::Arc;

use log::{error, info, warn};

use crate::assets::{
    load_environment, load_model, AssetSource, LoadEvent, LoadKind, LoadQueue, LoadedModel,
    MaybeSend,
};
use crate::camera::{OrbitControls, PerspectiveCamera};
use crate::config::ViewerConfig;
use crate::environment::EnvironmentMap;
use crate::materials::update_all_materials;
use crate::panel::{ControlId, ParameterPanel};
use crate::params::GlobalParams;
use crate::render::FrameTarget;
use crate::scene::{NodeId, NodeKind, SceneGraph, Skybox};
use crate::viewport::{handle_resize, Viewport};

/// Progress of one background asset.
#[derive(Debug, Clone, PartialEq)]
pub enum AssetStatus {
    Pending,
    Ready,
    Failed(String),
}

impl fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("loading"),
            Self::Ready => f.write_str("ready"),
            Self::Failed(message) => write!(f, "failed: {message}"),
        }
    }
}

/// Everything the viewer mutates, owned in one place and handed by `&mut`
/// to the loaders' completion handler, the panel and the render loop.
#[derive(Debug)]
pub struct AppContext {
    pub config: ViewerConfig,
    pub scene: SceneGraph,
    pub controls: OrbitControls,
    pub params: GlobalParams,
    pub panel: ParameterPanel,
    pub viewport: Viewport,
    pub environment_status: AssetStatus,
    pub model_status: AssetStatus,
    model: Option<ModelSummary>,
    skybox: Option<NodeId>,
    material_passes: usize,
    updated_materials: usize,
}

#[derive(Debug, Clone)]
struct ModelSummary {
    name: String,
    root: NodeId,
    meshes: usize,
    textures: usize,
}

impl AppContext {
    /// Builds the empty scene: camera from the config, damped orbit controls
    /// and the Global panel folder.
    pub fn new(config: ViewerConfig, width: u32, height: u32, device_pixel_ratio: f64) -> Self {
        let viewport = Viewport::new(width, height, device_pixel_ratio);
        let camera = PerspectiveCamera::from_config(&config.camera, viewport.aspect());
        let params = config.params;
        let mut scene = SceneGraph::new(camera);
        scene.background_blurriness = params.background_blurriness;
        scene.background_intensity = params.background_intensity;

        let mut controls = OrbitControls::new(config.camera.target);
        controls.enable_damping = true;

        let mut app = Self {
            config,
            scene,
            controls,
            params,
            panel: ParameterPanel::with_global_controls(),
            viewport,
            environment_status: AssetStatus::Pending,
            model_status: AssetStatus::Pending,
            model: None,
            skybox: None,
            material_passes: 0,
            updated_materials: 0,
        };
        app.clamp_into_controls();
        app
    }

    /// Pulls configured values into their control ranges.
    fn clamp_into_controls(&mut self) {
        for control in self.panel.controls() {
            let Some(value) = control.binding.read(&self.scene, &self.params) else {
                continue;
            };
            let clamped = control.constrain(value);
            if clamped != value {
                warn!(
                    "{} / {} = {value} is outside {}..{}, using {clamped}",
                    control.folder, control.label, control.min, control.max
                );
                control
                    .binding
                    .apply(&mut self.scene, &mut self.params, clamped);
            }
        }
    }

    /// Starts the environment and model loads. Their results arrive on
    /// `queue` in whichever order they finish.
    pub fn start_loading<S>(&self, queue: &LoadQueue, source: S)
    where
        S: AssetSource + Clone + MaybeSend + 'static,
    {
        let environment = self.config.environment.clone();
        let environment_source = source.clone();
        queue.spawn(LoadKind::Environment, move || async move {
            LoadEvent::Environment(load_environment(&environment_source, &environment).await)
        });

        let path = self.config.model.path.clone();
        queue.spawn(LoadKind::Model, move || async move {
            LoadEvent::Model(load_model(&source, &path).await)
        });
    }

    /// Applies every finished load. Returns how many were applied.
    pub fn apply_load_events(&mut self, queue: &LoadQueue) -> usize {
        let events = queue.drain();
        let count = events.len();
        for event in events {
            self.apply_load_event(event);
        }
        count
    }

    pub fn apply_load_event(&mut self, event: LoadEvent) {
        match event {
            LoadEvent::Environment(Ok(map)) => self.attach_environment(map),
            LoadEvent::Environment(Err(err)) => {
                error!("environment failed to load: {err}");
                self.environment_status = AssetStatus::Failed(err.to_string());
            }
            LoadEvent::Model(Ok(model)) => self.attach_model(model),
            LoadEvent::Model(Err(err)) => {
                error!("model failed to load: {err}");
                self.model_status = AssetStatus::Failed(err.to_string());
            }
        }
    }

    fn attach_environment(&mut self, map: EnvironmentMap) {
        let map = Arc::new(map);
        self.scene.environment = Some(Arc::clone(&map));
        self.scene.background = Some(map);

        if let (Some(config), None) = (self.config.skybox, self.skybox) {
            let id = self.scene.add(
                self.scene.root(),
                "skybox",
                NodeKind::Skybox(Skybox {
                    radius: config.radius,
                    height: config.height,
                }),
            );
            self.panel.add_skybox(id);
            self.skybox = Some(id);
            self.clamp_into_controls();
        }

        self.environment_status = AssetStatus::Ready;
        self.run_material_updater();
    }

    fn attach_model(&mut self, model: LoadedModel) {
        let LoadedModel {
            name,
            mut tree,
            texture_count,
        } = model;
        let meshes = tree.mesh_count();
        tree.transform.scale = self.config.model.scale;
        tree.transform.position = self.config.model.position;
        let root = self.scene.attach(self.scene.root(), tree);
        self.panel.add_rotation(&name, root);
        info!("attached model {name} with {meshes} mesh(es)");
        self.model = Some(ModelSummary {
            name,
            root,
            meshes,
            textures: texture_count,
        });

        self.model_status = AssetStatus::Ready;
        self.run_material_updater();
    }

    fn run_material_updater(&mut self) -> usize {
        self.updated_materials = update_all_materials(&mut self.scene, &self.params);
        self.material_passes += 1;
        self.updated_materials
    }

    /// Clamps `value` into the control's range and writes it through the
    /// binding. Returns the stored value, or `None` for an unknown control.
    pub fn set_control(&mut self, id: ControlId, value: f32) -> Option<f32> {
        let control = self.panel.get(id)?;
        let binding = control.binding;
        let value = control.constrain(value);
        if let Some(updated) = binding.apply(&mut self.scene, &mut self.params, value) {
            self.updated_materials = updated;
            self.material_passes += 1;
        }
        Some(value)
    }

    pub fn control_value(&self, id: ControlId) -> Option<f32> {
        let control = self.panel.get(id)?;
        control.binding.read(&self.scene, &self.params)
    }

    /// Window resize entry point; see [`handle_resize`].
    pub fn resize<T>(&mut self, target: &mut T, width: u32, height: u32, device_pixel_ratio: f64) -> bool
    where
        T: FrameTarget + ?Sized,
    {
        handle_resize(
            &mut self.viewport,
            &mut self.scene.camera,
            target,
            width,
            height,
            device_pixel_ratio,
        )
    }

    pub fn is_loading(&self) -> bool {
        self.environment_status == AssetStatus::Pending || self.model_status == AssetStatus::Pending
    }

    pub fn model_root(&self) -> Option<NodeId> {
        self.model.as_ref().map(|model| model.root)
    }

    pub fn skybox_node(&self) -> Option<NodeId> {
        self.skybox
    }

    /// Times the material updater has run, from loads and the intensity
    /// slider combined.
    pub fn material_passes(&self) -> usize {
        self.material_passes
    }

    /// Panel lines for assets that are not ready yet.
    pub fn status_lines(&self) -> Vec<String> {
        [
            ("environment", &self.environment_status),
            ("model", &self.model_status),
        ]
        .into_iter()
        .filter(|(_, status)| **status != AssetStatus::Ready)
        .map(|(asset, status)| format!("{asset}: {status}"))
        .collect()
    }

    /// Human-readable report printed by `--summary-only`.
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![format!("Viewer: {}", self.config.name)];

        lines.push(match (&self.environment_status, &self.scene.environment) {
            (AssetStatus::Ready, Some(map)) => format!(
                "Environment: {} map, {}px faces, {} mip levels",
                self.config.environment.kind(),
                map.face_size(),
                map.mip_count()
            ),
            (status, _) => format!("Environment: {status}"),
        });
        if let Some(skybox) = self.scene.skybox() {
            lines.push(format!(
                "Skybox: radius {:.1}, height {:.1}",
                skybox.radius, skybox.height
            ));
        }

        lines.push(match (&self.model_status, &self.model) {
            (AssetStatus::Ready, Some(model)) => format!(
                "Model: {} ({} meshes, {} textures)",
                model.name, model.meshes, model.textures
            ),
            (status, _) => format!("Model: {status}"),
        });
        lines.push(format!(
            "Material passes: {} ({} standard materials at intensity {:.3})",
            self.material_passes, self.updated_materials, self.params.env_map_intensity
        ));

        lines.push("Controls:".to_string());
        for control in self.panel.controls() {
            let value = self.control_value(control.id).unwrap_or(f32::NAN);
            lines.push(format!(
                " - {} / {} = {:.3} ({:.3}..{:.3})",
                control.folder, control.label, value, control.min, control.max
            ));
        }
        lines
    }

    pub fn print_summary(&self) {
        for line in self.summary_lines() {
            println!("{line}");
        }
    }
}
