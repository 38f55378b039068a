use assert_cmd::prelude::*;
use image::codecs::hdr::HdrEncoder;
use image::{Rgb, Rgba, RgbaImage};
use predicates::str::contains;
use std::fs::{self, File};
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

const FACES: [&str; 6] = ["px", "nx", "py", "ny", "pz", "nz"];

/// One-triangle glTF with its positions and indices in `{stem}.bin`.
fn write_model(dir: &Path, stem: &str) {
    fs::create_dir_all(dir).expect("model dir");
    let gltf = format!(
        r#"{{
  "asset": {{"version": "2.0"}},
  "scene": 0,
  "scenes": [{{"nodes": [0]}}],
  "nodes": [{{"name": "Body", "mesh": 0}}],
  "meshes": [{{"name": "BodyMesh", "primitives": [{{"attributes": {{"POSITION": 0}}, "indices": 1}}]}}],
  "buffers": [{{"uri": "{stem}.bin", "byteLength": 44}}],
  "bufferViews": [
    {{"buffer": 0, "byteOffset": 0, "byteLength": 36}},
    {{"buffer": 0, "byteOffset": 36, "byteLength": 6}}
  ],
  "accessors": [
    {{"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3", "min": [0, 0, 0], "max": [1, 1, 0]}},
    {{"bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR"}}
  ]
}}"#
    );
    fs::write(dir.join(format!("{stem}.gltf")), gltf).expect("write gltf");

    let mut bin = Vec::new();
    for value in [0.0f32, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0] {
        bin.extend_from_slice(&value.to_le_bytes());
    }
    for index in [0u16, 1, 2] {
        bin.extend_from_slice(&index.to_le_bytes());
    }
    bin.extend_from_slice(&[0, 0]);
    fs::write(dir.join(format!("{stem}.bin")), bin).expect("write bin");
}

fn write_cube_faces(dir: &Path, size: u32) {
    fs::create_dir_all(dir).expect("env dir");
    for face in FACES {
        RgbaImage::from_pixel(size, size, Rgba([180, 160, 140, 255]))
            .save(dir.join(format!("{face}.png")))
            .expect("write face");
    }
}

fn helmet_assets() -> TempDir {
    let root = TempDir::new().expect("temp assets");
    write_cube_faces(&root.path().join("environmentMaps/0"), 16);
    write_model(&root.path().join("models/FlightHelmet/glTF"), "FlightHelmet");
    root
}

fn viewer() -> Command {
    Command::cargo_bin("envmap-viewer").expect("binary exists")
}

#[test]
fn summary_mode_loads_the_helmet_layout() {
    let assets = helmet_assets();
    viewer()
        .arg("--summary-only")
        .arg("--assets")
        .arg(assets.path())
        .assert()
        .success()
        .stdout(contains("Viewer: helmet"))
        .stdout(contains("Environment: cube map, 16px faces, 5 mip levels"))
        .stdout(contains("Model: FlightHelmet (1 meshes, 0 textures)"))
        .stdout(contains(
            "Material passes: 2 (1 standard materials at intensity 5.000)",
        ))
        .stdout(contains(" - FlightHelmet / rotation = 0.000 (-3.142..3.142)"))
        .stdout(contains("Frame: 1 meshes, 1 refreshed materials"));
}

#[test]
fn config_file_selects_an_hdr_skybox_scene() {
    let assets = TempDir::new().expect("temp assets");
    let env_dir = assets.path().join("env");
    fs::create_dir_all(&env_dir).expect("env dir");
    let pixels = vec![Rgb([1.5f32, 1.0, 0.5]); 64 * 32];
    HdrEncoder::new(File::create(env_dir.join("sky.hdr")).expect("create hdr"))
        .encode(&pixels, 64, 32)
        .expect("encode hdr");
    write_model(&assets.path().join("models"), "Crate");

    let config = assets.path().join("viewer.xml");
    fs::write(
        &config,
        r#"<viewer name="yard">
  <environment kind="equirect"><path>env/sky.hdr</path></environment>
  <model><path>models/Crate.gltf</path><scale>2 2 2</scale></model>
  <skybox><radius>50</radius><height>8</height></skybox>
  <params><envMapIntensity>2.5</envMapIntensity></params>
</viewer>"#,
    )
    .expect("write config");

    viewer()
        .arg("--summary-only")
        .arg("--assets")
        .arg(assets.path())
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(contains("Viewer: yard"))
        .stdout(contains("Environment: equirect map, 16px faces"))
        .stdout(contains("Skybox: radius 50.0, height 8.0"))
        .stdout(contains("Model: Crate (1 meshes, 0 textures)"))
        .stdout(contains("at intensity 2.500"))
        .stdout(contains(" - Skybox / height = 8.000 (1.000..100.000)"));
}

#[test]
fn missing_assets_are_reported_not_fatal() {
    let empty = TempDir::new().expect("temp assets");
    viewer()
        .arg("--summary-only")
        .arg("--assets")
        .arg(empty.path())
        .assert()
        .success()
        .stdout(contains("Environment: failed: failed to read"))
        .stdout(contains("Model: failed: failed to read"))
        .stdout(contains("Material passes: 0"));
}

#[test]
fn dump_config_prints_json() {
    viewer()
        .args(["--variant", "skybox", "--dump-config"])
        .assert()
        .success()
        .stdout(contains(r#""name": "skybox""#))
        .stdout(contains(r#""kind": "equirect""#))
        .stdout(contains(r#""envMapIntensity": 5.0"#));
}

#[test]
fn unknown_arguments_fail() {
    viewer()
        .arg("--teapot")
        .assert()
        .failure()
        .stderr(contains("Unknown argument: --teapot"));
}
