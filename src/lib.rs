//! Environment-lit glTF viewer.
//!
//! Loads a cube or equirectangular environment map and a glTF model in the
//! background, lights the model's materials from the environment and renders
//! it with orbit controls and a small tuning panel. Everything except the
//! `render`, `ui` and `shell` modules runs without a GPU, so the whole load
//! and update pipeline can be driven headlessly.

pub mod app;
pub mod assets;
pub mod camera;
pub mod config;
pub mod environment;
pub mod geometry;
pub mod input;
pub mod materials;
pub mod panel;
pub mod params;
pub mod render;
pub mod render_loop;
pub mod scene;
pub mod shell;
pub mod ui;
pub mod viewport;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use app::{AppContext, AssetStatus};
pub use assets::{load_environment, load_model, AssetSource, LoadError, LoadEvent, LoadQueue};
pub use camera::{OrbitControls, PerspectiveCamera};
pub use config::{ConfigError, Variant, ViewerConfig};
pub use environment::EnvironmentMap;
pub use materials::update_all_materials;
pub use params::GlobalParams;
pub use render::{FrameTarget, HeadlessTarget, Renderer};
pub use render_loop::{LoopState, RenderLoop, StopToken};
pub use scene::SceneGraph;
