use std::fmt;
use std::str::FromStr;

use glam::Vec3;
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::params::GlobalParams;

/// Errors raised while reading a viewer description.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid viewer XML: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("<{0}> is missing")]
    Missing(&'static str),
    #[error("<{tag}> has an invalid value `{value}`")]
    InvalidValue { tag: &'static str, value: String },
    #[error("cube environments need exactly six <face> entries, found {0}")]
    FaceCount(usize),
    #[error("unknown environment kind `{0}` (expected cube or equirect)")]
    UnknownEnvironmentKind(String),
    #[error("unknown variant `{0}` (expected helmet or skybox)")]
    UnknownVariant(String),
}

/// Everything the viewer needs to know to assemble a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerConfig {
    pub name: String,
    pub environment: EnvironmentSource,
    pub model: ModelConfig,
    pub camera: CameraConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skybox: Option<SkyboxConfig>,
    #[serde(default)]
    pub params: GlobalParams,
}

/// Where the background environment comes from.
///
/// Cube faces are listed in cube-layer order: +X, -X, +Y, -Y, +Z, -Z.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EnvironmentSource {
    Cube { faces: [String; 6] },
    Equirect { path: String },
}

impl EnvironmentSource {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Cube { .. } => "cube",
            Self::Equirect { .. } => "equirect",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub path: String,
    #[serde(default = "unit_scale")]
    pub scale: Vec3,
    #[serde(default)]
    pub position: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    pub position: Vec3,
    pub target: Vec3,
    #[serde(default = "default_fov")]
    pub fov: f32,
    #[serde(default = "default_near")]
    pub near: f32,
    #[serde(default = "default_far")]
    pub far: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: Vec3::new(4.0, 5.0, 30.0),
            target: Vec3::new(0.0, 3.5, 0.0),
            fov: default_fov(),
            near: default_near(),
            far: default_far(),
        }
    }
}

/// Ground-projected skybox helper settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkyboxConfig {
    pub radius: f32,
    pub height: f32,
}

impl Default for SkyboxConfig {
    fn default() -> Self {
        Self {
            radius: 120.0,
            height: 11.0,
        }
    }
}

/// The two scenes shipped with the viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    #[default]
    Helmet,
    Skybox,
}

impl FromStr for Variant {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "helmet" | "cube" => Ok(Self::Helmet),
            "skybox" | "hdr" => Ok(Self::Skybox),
            other => Err(ConfigError::UnknownVariant(other.to_string())),
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Helmet => f.write_str("helmet"),
            Self::Skybox => f.write_str("skybox"),
        }
    }
}

const FLIGHT_HELMET: &str = "models/FlightHelmet/glTF/FlightHelmet.gltf";

impl ViewerConfig {
    pub fn for_variant(variant: Variant) -> Self {
        match variant {
            Variant::Helmet => Self::helmet(),
            Variant::Skybox => Self::skybox(),
        }
    }

    /// Cube-mapped environment around the flight helmet.
    ///
    /// The +Z and -Z slots intentionally take `nz` and `pz` respectively; the
    /// shipped face set was authored with the opposite handedness.
    pub fn helmet() -> Self {
        let face = |name: &str| format!("environmentMaps/0/{name}.png");
        Self {
            name: "helmet".to_string(),
            environment: EnvironmentSource::Cube {
                faces: [
                    face("px"),
                    face("nx"),
                    face("py"),
                    face("ny"),
                    face("nz"),
                    face("pz"),
                ],
            },
            model: ModelConfig {
                path: FLIGHT_HELMET.to_string(),
                scale: Vec3::splat(10.0),
                position: Vec3::ZERO,
            },
            camera: CameraConfig::default(),
            skybox: None,
            params: GlobalParams::default(),
        }
    }

    /// Equirectangular HDR environment with a ground-projected skybox.
    pub fn skybox() -> Self {
        Self {
            name: "skybox".to_string(),
            environment: EnvironmentSource::Equirect {
                path: "environmentMaps/2/2k.hdr".to_string(),
            },
            model: ModelConfig {
                path: FLIGHT_HELMET.to_string(),
                scale: Vec3::splat(10.0),
                position: Vec3::ZERO,
            },
            camera: CameraConfig {
                position: Vec3::new(4.0, 5.0, 12.0),
                ..CameraConfig::default()
            },
            skybox: Some(SkyboxConfig::default()),
            params: GlobalParams::default(),
        }
    }

    /// Parses a `<viewer>` document. Omitted sections keep the helmet defaults.
    pub fn from_xml(xml: &str) -> Result<Self, ConfigError> {
        let document = Document::parse(xml)?;
        let root = document.root_element();
        let mut config = Self::helmet();

        if let Some(name) = root.attribute("name") {
            config.name = name.to_string();
        }

        if let Some(node) = child(&root, "environment") {
            config.environment = parse_environment(&node)?;
        }

        if let Some(node) = child(&root, "model") {
            config.model.path = required_text(&node, "path")?;
            config.model.scale = parse_vec3(&node, "scale", config.model.scale)?;
            config.model.position = parse_vec3(&node, "position", config.model.position)?;
        }

        if let Some(node) = child(&root, "camera") {
            let camera = &mut config.camera;
            camera.position = parse_vec3(&node, "position", camera.position)?;
            camera.target = parse_vec3(&node, "target", camera.target)?;
            camera.fov = parse_f32(&node, "fov", camera.fov)?;
            camera.near = parse_f32(&node, "near", camera.near)?;
            camera.far = parse_f32(&node, "far", camera.far)?;
        }

        if let Some(node) = child(&root, "skybox") {
            let defaults = SkyboxConfig::default();
            config.skybox = Some(SkyboxConfig {
                radius: parse_f32(&node, "radius", defaults.radius)?,
                height: parse_f32(&node, "height", defaults.height)?,
            });
        }

        if let Some(node) = child(&root, "params") {
            let params = &mut config.params;
            params.env_map_intensity =
                parse_f32(&node, "envMapIntensity", params.env_map_intensity)?;
            params.background_blurriness =
                parse_f32(&node, "backgroundBlurriness", params.background_blurriness)?;
            params.background_intensity =
                parse_f32(&node, "backgroundIntensity", params.background_intensity)?;
        }

        Ok(config)
    }
}

fn parse_environment(node: &Node<'_, '_>) -> Result<EnvironmentSource, ConfigError> {
    let kind = node.attribute("kind").unwrap_or("cube");
    match kind {
        "cube" => {
            let faces: Vec<String> = node
                .children()
                .filter(|n| n.has_tag_name("face"))
                .filter_map(|n| n.text())
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .map(str::to_string)
                .collect();
            let count = faces.len();
            let faces: [String; 6] = faces
                .try_into()
                .map_err(|_| ConfigError::FaceCount(count))?;
            Ok(EnvironmentSource::Cube { faces })
        }
        "equirect" => Ok(EnvironmentSource::Equirect {
            path: required_text(node, "path")?,
        }),
        other => Err(ConfigError::UnknownEnvironmentKind(other.to_string())),
    }
}

fn child<'a, 'input>(node: &Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.has_tag_name(tag))
}

fn required_text(node: &Node<'_, '_>, tag: &'static str) -> Result<String, ConfigError> {
    optional_text(node, tag).ok_or(ConfigError::Missing(tag))
}

fn optional_text(node: &Node<'_, '_>, tag: &str) -> Option<String> {
    child(node, tag)
        .and_then(|n| n.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| text.to_string())
}

fn parse_vec3(node: &Node<'_, '_>, tag: &'static str, default: Vec3) -> Result<Vec3, ConfigError> {
    let Some(value) = optional_text(node, tag) else {
        return Ok(default);
    };
    let numbers: Vec<f32> = value
        .split_whitespace()
        .map(str::parse::<f32>)
        .collect::<Result<_, _>>()
        .map_err(|_| ConfigError::InvalidValue {
            tag,
            value: value.clone(),
        })?;
    match numbers.as_slice() {
        [x, y, z] => Ok(Vec3::new(*x, *y, *z)),
        _ => Err(ConfigError::InvalidValue { tag, value }),
    }
}

fn parse_f32(node: &Node<'_, '_>, tag: &'static str, default: f32) -> Result<f32, ConfigError> {
    match optional_text(node, tag) {
        Some(value) => value
            .parse::<f32>()
            .map_err(|_| ConfigError::InvalidValue { tag, value }),
        None => Ok(default),
    }
}

fn unit_scale() -> Vec3 {
    Vec3::ONE
}

fn default_fov() -> f32 {
    75.0
}

fn default_near() -> f32 {
    0.1
}

fn default_far() -> f32 {
    100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
    <viewer name="lab">
        <environment kind="equirect">
            <path>maps/studio.hdr</path>
        </environment>
        <model>
            <path>models/Duck.gltf</path>
            <scale>2 2 2</scale>
        </model>
        <camera>
            <position>1 2 3</position>
            <fov>60</fov>
        </camera>
        <skybox>
            <radius>50</radius>
        </skybox>
        <params>
            <envMapIntensity>2.5</envMapIntensity>
        </params>
    </viewer>
    "#;

    #[test]
    fn parse_viewer_overrides_sections() {
        let config = ViewerConfig::from_xml(SAMPLE).unwrap();
        assert_eq!(config.name, "lab");
        assert_eq!(
            config.environment,
            EnvironmentSource::Equirect {
                path: "maps/studio.hdr".to_string()
            }
        );
        assert_eq!(config.model.path, "models/Duck.gltf");
        assert_eq!(config.model.scale, Vec3::splat(2.0));
        assert_eq!(config.model.position, Vec3::ZERO);
        assert_eq!(config.camera.position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(config.camera.target, Vec3::new(0.0, 3.5, 0.0));
        assert_eq!(config.camera.fov, 60.0);
        let skybox = config.skybox.unwrap();
        assert_eq!(skybox.radius, 50.0);
        assert_eq!(skybox.height, 11.0);
        assert_eq!(config.params.env_map_intensity, 2.5);
        assert_eq!(config.params.background_intensity, 1.0);
    }

    #[test]
    fn cube_environment_needs_six_faces() {
        let xml = r#"<viewer><environment kind="cube"><face>a.png</face></environment></viewer>"#;
        assert!(matches!(
            ViewerConfig::from_xml(xml),
            Err(ConfigError::FaceCount(1))
        ));
    }

    #[test]
    fn model_without_path_is_an_error() {
        let xml = "<viewer><model><scale>1 1 1</scale></model></viewer>";
        assert!(matches!(
            ViewerConfig::from_xml(xml),
            Err(ConfigError::Missing("path"))
        ));
    }

    #[test]
    fn malformed_vector_is_reported() {
        let xml = "<viewer><camera><position>1 2</position></camera></viewer>";
        assert!(matches!(
            ViewerConfig::from_xml(xml),
            Err(ConfigError::InvalidValue { tag: "position", .. })
        ));
    }

    #[test]
    fn helmet_swaps_z_faces() {
        let EnvironmentSource::Cube { faces } = ViewerConfig::helmet().environment else {
            panic!("helmet uses a cube map");
        };
        assert!(faces[4].ends_with("nz.png"));
        assert!(faces[5].ends_with("pz.png"));
    }

    #[test]
    fn variants_differ_in_camera_and_skybox() {
        let helmet = ViewerConfig::for_variant(Variant::Helmet);
        let skybox = ViewerConfig::for_variant(Variant::Skybox);
        assert!(helmet.skybox.is_none());
        assert!(skybox.skybox.is_some());
        assert_ne!(helmet.camera.position, skybox.camera.position);
        assert_eq!(skybox.environment.kind(), "equirect");
        assert_eq!("HDR".parse::<Variant>().unwrap(), Variant::Skybox);
        assert!("mars".parse::<Variant>().is_err());
    }
}
