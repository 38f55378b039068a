use std::f32::consts::FRAC_1_PI;

use glam::Vec3;
use image::Rgba32FImage;

use crate::assets::LoadError;

/// Faces larger than this are box-filtered down before upload.
pub const MAX_FACE_SIZE: u32 = 512;
const MIN_FACE_SIZE: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentKind {
    Cube,
    Equirect,
}

/// One mip level of a cube map: six square faces of linear RGBA.
#[derive(Debug, Clone, PartialEq)]
pub struct CubeLevel {
    pub size: u32,
    pub faces: [Vec<f32>; 6],
}

/// Immutable cube texture with a full mip chain.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentMap {
    pub kind: EnvironmentKind,
    levels: Vec<CubeLevel>,
}

impl EnvironmentMap {
    /// Builds a cube map from six decoded faces in layer order (+X, -X, +Y,
    /// -Y, +Z, -Z). Pixel values are expected to be linear already.
    pub fn from_cube_faces(faces: [Rgba32FImage; 6]) -> Result<Self, LoadError> {
        let size = faces[0].width();
        for (index, face) in faces.iter().enumerate() {
            if face.width() != face.height() || face.width() != size || size == 0 {
                return Err(LoadError::FaceMismatch {
                    face: index,
                    width: face.width(),
                    height: face.height(),
                    expected: size,
                });
            }
        }
        let chains: Vec<Vec<(u32, Vec<f32>)>> = faces
            .into_iter()
            .map(|face| face_chain(face.into_raw(), size))
            .collect();
        Ok(Self::from_chains(EnvironmentKind::Cube, chains))
    }

    /// Projects a linear equirectangular image onto a cube.
    pub fn from_equirect(image: &Rgba32FImage) -> Result<Self, LoadError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(LoadError::MissingData("equirectangular image is empty".into()));
        }
        let size = equirect_face_size(image.width());
        let chains = (0..6)
            .map(|face| {
                let mut pixels = Vec::with_capacity((size * size * 4) as usize);
                for y in 0..size {
                    for x in 0..size {
                        let direction = face_direction(face, x, y, size);
                        let rgb = sample_equirect(image, direction);
                        pixels.extend_from_slice(&[rgb.x, rgb.y, rgb.z, 1.0]);
                    }
                }
                face_chain(pixels, size)
            })
            .collect();
        Ok(Self::from_chains(EnvironmentKind::Equirect, chains))
    }

    fn from_chains(kind: EnvironmentKind, mut chains: Vec<Vec<(u32, Vec<f32>)>>) -> Self {
        let level_count = chains.iter().map(Vec::len).min().unwrap_or(0);
        let mut levels = Vec::with_capacity(level_count);
        for level in 0..level_count {
            let size = chains[0][level].0;
            let faces = std::array::from_fn(|face| std::mem::take(&mut chains[face][level].1));
            levels.push(CubeLevel { size, faces });
        }
        Self { kind, levels }
    }

    pub fn face_size(&self) -> u32 {
        self.levels.first().map_or(0, |level| level.size)
    }

    pub fn mip_count(&self) -> u32 {
        self.levels.len() as u32
    }

    pub fn levels(&self) -> &[CubeLevel] {
        &self.levels
    }

    /// Nearest-texel lookup, mostly useful for inspection and tests.
    pub fn sample(&self, direction: Vec3, level: usize) -> Option<Vec3> {
        let level = self.levels.get(level)?;
        let (face, u, v) = direction_to_face_uv(direction)?;
        let size = level.size as f32;
        let x = ((u * size) as u32).min(level.size - 1);
        let y = ((v * size) as u32).min(level.size - 1);
        let base = ((y * level.size + x) * 4) as usize;
        let texel = &level.faces[face][base..base + 3];
        Some(Vec3::new(texel[0], texel[1], texel[2]))
    }
}

/// Converts sRGB-encoded channels to linear in place. Alpha is untouched.
pub fn linearize_srgb(image: &mut Rgba32FImage) {
    for pixel in image.pixels_mut() {
        for channel in &mut pixel.0[..3] {
            *channel = srgb_to_linear(*channel);
        }
    }
}

pub fn srgb_to_linear(value: f32) -> f32 {
    if value <= 0.04045 {
        value / 12.92
    } else {
        ((value + 0.055) / 1.055).powf(2.4)
    }
}

fn equirect_face_size(width: u32) -> u32 {
    (width / 4)
        .max(1)
        .next_power_of_two()
        .clamp(MIN_FACE_SIZE, MAX_FACE_SIZE)
}

/// Successive 2x2 box-filtered levels down to 1x1, skipping levels above
/// [`MAX_FACE_SIZE`].
fn face_chain(mut pixels: Vec<f32>, mut size: u32) -> Vec<(u32, Vec<f32>)> {
    let mut chain = Vec::new();
    loop {
        if size <= MAX_FACE_SIZE {
            chain.push((size, pixels.clone()));
        }
        if size == 1 {
            break;
        }
        let next = (size / 2).max(1);
        pixels = downsample(&pixels, size, next);
        size = next;
    }
    chain
}

fn downsample(pixels: &[f32], size: u32, next: u32) -> Vec<f32> {
    let mut out = Vec::with_capacity((next * next * 4) as usize);
    let texel = |x: u32, y: u32| {
        let x = x.min(size - 1);
        let y = y.min(size - 1);
        let base = ((y * size + x) * 4) as usize;
        &pixels[base..base + 4]
    };
    for y in 0..next {
        for x in 0..next {
            let mut sum = [0.0f32; 4];
            for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                let value = texel(x * 2 + dx, y * 2 + dy);
                for channel in 0..4 {
                    sum[channel] += value[channel];
                }
            }
            out.extend(sum.iter().map(|value| value * 0.25));
        }
    }
    out
}

/// World direction through the centre of texel (x, y) of a cube face, using
/// the usual cube-map layout where v grows downwards on every face.
fn face_direction(face: usize, x: u32, y: u32, size: u32) -> Vec3 {
    let u = 2.0 * (x as f32 + 0.5) / size as f32 - 1.0;
    let v = 2.0 * (y as f32 + 0.5) / size as f32 - 1.0;
    let direction = match face {
        0 => Vec3::new(1.0, -v, -u),
        1 => Vec3::new(-1.0, -v, u),
        2 => Vec3::new(u, 1.0, v),
        3 => Vec3::new(u, -1.0, -v),
        4 => Vec3::new(u, -v, 1.0),
        _ => Vec3::new(-u, -v, -1.0),
    };
    direction.normalize()
}

/// Inverse of [`face_direction`]: face index and uv in [0, 1].
fn direction_to_face_uv(direction: Vec3) -> Option<(usize, f32, f32)> {
    let abs = direction.abs();
    let (face, major, u, v) = if abs.x >= abs.y && abs.x >= abs.z {
        if direction.x > 0.0 {
            (0, abs.x, -direction.z, -direction.y)
        } else {
            (1, abs.x, direction.z, -direction.y)
        }
    } else if abs.y >= abs.z {
        if direction.y > 0.0 {
            (2, abs.y, direction.x, direction.z)
        } else {
            (3, abs.y, direction.x, -direction.z)
        }
    } else if direction.z > 0.0 {
        (4, abs.z, direction.x, -direction.y)
    } else {
        (5, abs.z, -direction.x, -direction.y)
    };
    if major <= 0.0 {
        return None;
    }
    Some((face, (u / major + 1.0) * 0.5, (v / major + 1.0) * 0.5))
}

fn sample_equirect(image: &Rgba32FImage, direction: Vec3) -> Vec3 {
    let u = direction.z.atan2(direction.x) * (0.5 * FRAC_1_PI) + 0.5;
    let v = direction.y.clamp(-1.0, 1.0).asin() * FRAC_1_PI + 0.5;
    let width = image.width();
    let height = image.height();
    let fx = u * width as f32 - 0.5;
    let fy = (1.0 - v) * height as f32 - 0.5;
    let x0 = fx.floor();
    let y0 = fy.floor();
    let tx = fx - x0;
    let ty = fy - y0;
    let fetch = |x: f32, y: f32| {
        let x = (x as i64).rem_euclid(width as i64) as u32;
        let y = (y.max(0.0) as u32).min(height - 1);
        let pixel = image.get_pixel(x, y).0;
        Vec3::new(pixel[0], pixel[1], pixel[2])
    };
    let top = fetch(x0, y0).lerp(fetch(x0 + 1.0, y0), tx);
    let bottom = fetch(x0, y0 + 1.0).lerp(fetch(x0 + 1.0, y0 + 1.0), tx);
    top.lerp(bottom, ty)
}

#[cfg(test)]
mod tests {
    use image::Rgba;

    use super::*;

    fn solid_face(size: u32, value: f32) -> Rgba32FImage {
        Rgba32FImage::from_pixel(size, size, Rgba([value, value, value, 1.0]))
    }

    #[test]
    fn cube_faces_build_a_full_mip_chain() {
        let faces = std::array::from_fn(|i| solid_face(8, i as f32 / 10.0));
        let map = EnvironmentMap::from_cube_faces(faces).unwrap();
        assert_eq!(map.kind, EnvironmentKind::Cube);
        assert_eq!(map.face_size(), 8);
        assert_eq!(map.mip_count(), 4);
        let last = map.levels().last().unwrap();
        assert_eq!(last.size, 1);
        assert!((last.faces[3][0] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn mismatched_faces_are_rejected() {
        let mut faces: [Rgba32FImage; 6] = std::array::from_fn(|_| solid_face(8, 1.0));
        faces[2] = Rgba32FImage::new(8, 4);
        assert!(matches!(
            EnvironmentMap::from_cube_faces(faces),
            Err(LoadError::FaceMismatch { face: 2, .. })
        ));
    }

    #[test]
    fn oversized_faces_are_reduced() {
        let faces = std::array::from_fn(|_| solid_face(MAX_FACE_SIZE * 2, 0.5));
        let map = EnvironmentMap::from_cube_faces(faces).unwrap();
        assert_eq!(map.face_size(), MAX_FACE_SIZE);
    }

    #[test]
    fn sampling_picks_the_matching_face() {
        let faces = std::array::from_fn(|i| solid_face(4, i as f32));
        let map = EnvironmentMap::from_cube_faces(faces).unwrap();
        let axes = [Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z];
        for (face, axis) in axes.into_iter().enumerate() {
            assert_eq!(map.sample(axis, 0).unwrap().x, face as f32);
        }
    }

    #[test]
    fn face_directions_round_trip() {
        for face in 0..6 {
            for (x, y) in [(0, 0), (3, 1), (7, 7)] {
                let direction = face_direction(face, x, y, 8);
                let (back, u, v) = direction_to_face_uv(direction).unwrap();
                assert_eq!(back, face);
                assert!((u * 8.0 - (x as f32 + 0.5)).abs() < 1e-3);
                assert!((v * 8.0 - (y as f32 + 0.5)).abs() < 1e-3);
            }
        }
    }

    #[test]
    fn equirect_sky_lands_on_the_top_face() {
        let image = Rgba32FImage::from_fn(64, 32, |_, y| {
            if y < 16 {
                Rgba([1.0, 0.0, 0.0, 1.0])
            } else {
                Rgba([0.0, 0.0, 1.0, 1.0])
            }
        });
        let map = EnvironmentMap::from_equirect(&image).unwrap();
        assert_eq!(map.kind, EnvironmentKind::Equirect);
        assert_eq!(map.face_size(), MIN_FACE_SIZE);
        assert_eq!(map.sample(Vec3::Y, 0).unwrap(), Vec3::X);
        assert_eq!(map.sample(Vec3::NEG_Y, 0).unwrap(), Vec3::Z);
    }

    #[test]
    fn srgb_endpoints_are_preserved() {
        assert_eq!(srgb_to_linear(0.0), 0.0);
        assert!((srgb_to_linear(1.0) - 1.0).abs() < 1e-6);
        assert!(srgb_to_linear(0.5) < 0.5);
    }
}
