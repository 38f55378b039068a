//! Asynchronous asset loading.
//!
//! Loaders read bytes through an [`AssetSource`], decode them off the UI
//! thread and post a [`LoadEvent`] to a [`LoadQueue`]. The event loop drains
//! the queue and applies results to the scene.

mod model;
mod queue;
mod source;

use image::{DynamicImage, Rgba32FImage};
use log::info;
use thiserror::Error;

use crate::config::EnvironmentSource;
use crate::environment::{linearize_srgb, EnvironmentMap};

#[cfg(test)]
pub(crate) use model::fixtures;
pub use model::{load_model, LoadedModel};
pub use queue::{LoadEvent, LoadKind, LoadQueue};
#[cfg(not(target_arch = "wasm32"))]
pub use source::DirectorySource;
#[cfg(target_arch = "wasm32")]
pub use source::HttpSource;
pub use source::{join_uri, AssetSource, MemorySource};

/// Failure while reading or decoding an asset.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {message}")]
    Read { path: String, message: String },
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: String,
        source: image::ImageError,
    },
    #[error("invalid glTF {path}: {source}")]
    Gltf { path: String, source: gltf::Error },
    #[error("cube face {face} is {width}x{height}, expected {expected}x{expected}")]
    FaceMismatch {
        face: usize,
        width: u32,
        height: u32,
        expected: u32,
    },
    #[error("{0}")]
    MissingData(String),
    #[error("unsupported asset reference: {0}")]
    Unsupported(String),
    #[error("loader panicked: {0}")]
    Panicked(String),
}

/// `Send` on native targets where loaders run on worker threads; no bound on
/// the web where they run on the browser's event loop.
#[cfg(not(target_arch = "wasm32"))]
pub trait MaybeSend: Send {}
#[cfg(not(target_arch = "wasm32"))]
impl<T: Send> MaybeSend for T {}

#[cfg(target_arch = "wasm32")]
pub trait MaybeSend {}
#[cfg(target_arch = "wasm32")]
impl<T> MaybeSend for T {}

/// Loads either six cube faces or one equirectangular panorama.
pub async fn load_environment<S>(
    source: &S,
    environment: &EnvironmentSource,
) -> Result<EnvironmentMap, LoadError>
where
    S: AssetSource + ?Sized,
{
    let map = match environment {
        EnvironmentSource::Cube { faces } => {
            let mut images = Vec::with_capacity(faces.len());
            for path in faces {
                let bytes = source.read(path).await?;
                images.push(decode_linear(path, &bytes)?);
            }
            let images: [Rgba32FImage; 6] = images
                .try_into()
                .map_err(|_| LoadError::MissingData("expected six cube faces".into()))?;
            EnvironmentMap::from_cube_faces(images)?
        }
        EnvironmentSource::Equirect { path } => {
            let bytes = source.read(path).await?;
            EnvironmentMap::from_equirect(&decode_linear(path, &bytes)?)?
        }
    };
    info!(
        "loaded {} environment ({}px faces, {} mip levels)",
        environment.kind(),
        map.face_size(),
        map.mip_count()
    );
    Ok(map)
}

/// Decodes an image into linear RGBA floats. 8 and 16 bit images are treated
/// as sRGB; float formats such as Radiance HDR are already linear.
fn decode_linear(path: &str, bytes: &[u8]) -> Result<Rgba32FImage, LoadError> {
    let decoded = image::load_from_memory(bytes).map_err(|source| LoadError::Decode {
        path: path.to_string(),
        source,
    })?;
    let is_float = matches!(
        decoded,
        DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_)
    );
    let mut image = decoded.to_rgba32f();
    if !is_float {
        linearize_srgb(&mut image);
    }
    Ok(image)
}

#[cfg(test)]
mod tests {
    use image::codecs::hdr::HdrEncoder;
    use image::Rgb;
    use pollster::block_on;

    use super::fixtures::png_bytes;
    use super::*;
    use crate::environment::EnvironmentKind;

    fn cube_source(sizes: [u32; 6]) -> (MemorySource, EnvironmentSource) {
        let names = ["px.png", "nx.png", "py.png", "ny.png", "nz.png", "pz.png"];
        let mut source = MemorySource::default();
        for (name, size) in names.iter().zip(sizes) {
            source.insert(format!("env/{name}"), png_bytes(size, [255, 128, 0, 255]));
        }
        let faces = names.map(|name| format!("env/{name}"));
        (source, EnvironmentSource::Cube { faces })
    }

    #[test]
    fn loads_cube_faces_as_linear_light() {
        let (source, environment) = cube_source([16; 6]);
        let map = block_on(load_environment(&source, &environment)).unwrap();
        assert_eq!(map.kind, EnvironmentKind::Cube);
        assert_eq!(map.face_size(), 16);
        let texel = map.sample(glam::Vec3::X, 0).unwrap();
        assert!((texel.x - 1.0).abs() < 1e-3);
        assert!((texel.y - 0.2158).abs() < 1e-2, "sRGB 128 is ~0.216 linear");
        assert_eq!(texel.z, 0.0);
    }

    #[test]
    fn mismatched_face_is_rejected() {
        let (source, environment) = cube_source([16, 16, 16, 8, 16, 16]);
        let err = block_on(load_environment(&source, &environment)).unwrap_err();
        assert!(matches!(err, LoadError::FaceMismatch { face: 3, .. }));
    }

    #[test]
    fn missing_face_reports_its_path() {
        let (mut source, environment) = cube_source([16; 6]);
        source.remove("env/ny.png");
        let err = block_on(load_environment(&source, &environment)).unwrap_err();
        assert!(err.to_string().contains("env/ny.png"));
    }

    #[test]
    fn loads_radiance_hdr_without_gamma() {
        let pixels = vec![Rgb([2.5f32, 0.5, 0.25]); 32 * 16];
        let mut bytes = Vec::new();
        HdrEncoder::new(&mut bytes)
            .encode(&pixels, 32, 16)
            .expect("encode hdr");
        let mut source = MemorySource::default();
        source.insert("env/2k.hdr", bytes);

        let environment = EnvironmentSource::Equirect {
            path: "env/2k.hdr".into(),
        };
        let map = block_on(load_environment(&source, &environment)).unwrap();
        assert_eq!(map.kind, EnvironmentKind::Equirect);
        let texel = map.sample(glam::Vec3::Z, 0).unwrap();
        assert!((texel.x - 2.5).abs() < 0.05);
        assert!((texel.y - 0.5).abs() < 0.02);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let mut source = MemorySource::default();
        source.insert("env/2k.hdr", b"not an image".to_vec());
        let environment = EnvironmentSource::Equirect {
            path: "env/2k.hdr".into(),
        };
        let err = block_on(load_environment(&source, &environment)).unwrap_err();
        assert!(matches!(err, LoadError::Decode { .. }));
    }
}
