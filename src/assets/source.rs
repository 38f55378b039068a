use std::collections::HashMap;
#[cfg(not(target_arch = "wasm32"))]
use std::path::PathBuf;
use std::sync::Arc;

use super::LoadError;

/// Byte source for asset paths such as `models/FlightHelmet/glTF/FlightHelmet.gltf`.
///
/// Paths always use forward slashes and are relative to the source root.
#[allow(async_fn_in_trait)]
pub trait AssetSource {
    async fn read(&self, path: &str) -> Result<Vec<u8>, LoadError>;
}

impl<S: AssetSource + ?Sized> AssetSource for Arc<S> {
    async fn read(&self, path: &str) -> Result<Vec<u8>, LoadError> {
        (**self).read(path).await
    }
}

/// Reads assets from a directory on disk.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

#[cfg(not(target_arch = "wasm32"))]
impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl AssetSource for DirectorySource {
    async fn read(&self, path: &str) -> Result<Vec<u8>, LoadError> {
        let full = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .fold(self.root.clone(), |acc, segment| acc.join(segment));
        std::fs::read(&full).map_err(|err| LoadError::Read {
            path: full.display().to_string(),
            message: err.to_string(),
        })
    }
}

/// Fetches assets relative to a base URL with the browser's `fetch`.
#[cfg(target_arch = "wasm32")]
#[derive(Debug, Clone)]
pub struct HttpSource {
    base_url: String,
}

#[cfg(target_arch = "wasm32")]
impl HttpSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.is_empty() {
            path.to_string()
        } else {
            format!("{base}/{}", path.trim_start_matches('/'))
        }
    }
}

#[cfg(target_arch = "wasm32")]
impl AssetSource for HttpSource {
    async fn read(&self, path: &str) -> Result<Vec<u8>, LoadError> {
        use wasm_bindgen::JsCast;
        use wasm_bindgen_futures::JsFuture;

        let url = self.url(path);
        let read_error = |message: String| LoadError::Read {
            path: url.clone(),
            message,
        };
        let window = web_sys::window().ok_or_else(|| read_error("no window".into()))?;
        let response = JsFuture::from(window.fetch_with_str(&url))
            .await
            .map_err(|err| read_error(format!("{err:?}")))?;
        let response: web_sys::Response = response
            .dyn_into()
            .map_err(|_| read_error("fetch did not return a Response".into()))?;
        if !response.ok() {
            return Err(read_error(format!("HTTP {}", response.status())));
        }
        let buffer = response
            .array_buffer()
            .map_err(|err| read_error(format!("{err:?}")))?;
        let buffer = JsFuture::from(buffer)
            .await
            .map_err(|err| read_error(format!("{err:?}")))?;
        Ok(js_sys::Uint8Array::new(&buffer).to_vec())
    }
}

/// In-memory assets keyed by path. Used for bundled assets and tests.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: HashMap<String, Vec<u8>>,
}

impl MemorySource {
    pub fn insert(&mut self, path: impl Into<String>, bytes: Vec<u8>) {
        self.files.insert(path.into(), bytes);
    }

    pub fn remove(&mut self, path: &str) -> Option<Vec<u8>> {
        self.files.remove(path)
    }
}

impl AssetSource for MemorySource {
    async fn read(&self, path: &str) -> Result<Vec<u8>, LoadError> {
        self.files.get(path).cloned().ok_or_else(|| LoadError::Read {
            path: path.to_string(),
            message: "not found".into(),
        })
    }
}

/// Resolves `uri` against the directory of `base`, collapsing `.` and `..`
/// segments and percent-escapes.
pub fn join_uri(base: &str, uri: &str) -> String {
    let mut segments: Vec<String> = match base.rfind('/') {
        Some(index) => base[..index].split('/').map(str::to_string).collect(),
        None => Vec::new(),
    };
    for segment in uri.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(percent_decode(other)),
        }
    }
    segments.retain(|segment| !segment.is_empty());
    segments.join("/")
}

fn percent_decode(segment: &str) -> String {
    let bytes = segment.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(value) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(value);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use pollster::block_on;

    use super::*;

    #[test]
    fn joins_relative_uris() {
        let base = "models/FlightHelmet/glTF/FlightHelmet.gltf";
        assert_eq!(
            join_uri(base, "FlightHelmet.bin"),
            "models/FlightHelmet/glTF/FlightHelmet.bin"
        );
        assert_eq!(
            join_uri(base, "./textures/../Leather.png"),
            "models/FlightHelmet/glTF/Leather.png"
        );
        assert_eq!(join_uri("scene.gltf", "My%20Mesh.bin"), "My Mesh.bin");
        assert_eq!(join_uri("a/b.gltf", "100%"), "a/100%");
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn directory_source_reads_nested_paths() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("models/box")).unwrap();
        std::fs::write(dir.path().join("models/box/box.bin"), [1u8, 2, 3]).unwrap();

        let source = DirectorySource::new(dir.path());
        assert_eq!(block_on(source.read("models/box/box.bin")).unwrap(), vec![1, 2, 3]);
        let err = block_on(source.read("models/box/missing.bin")).unwrap_err();
        assert!(matches!(err, LoadError::Read { .. }));
    }
}
