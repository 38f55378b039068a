use serde::{Deserialize, Serialize};

/// Scalars shared by the material updater and the background setters.
///
/// The panel is the only writer; everything else reads.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalParams {
    #[serde(default = "default_env_map_intensity")]
    pub env_map_intensity: f32,
    #[serde(default)]
    pub background_blurriness: f32,
    #[serde(default = "default_background_intensity")]
    pub background_intensity: f32,
}

impl Default for GlobalParams {
    fn default() -> Self {
        Self {
            env_map_intensity: default_env_map_intensity(),
            background_blurriness: 0.0,
            background_intensity: default_background_intensity(),
        }
    }
}

fn default_env_map_intensity() -> f32 {
    5.0
}

fn default_background_intensity() -> f32 {
    1.0
}
