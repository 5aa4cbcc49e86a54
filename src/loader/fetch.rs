//! Byte sources for models and their side files
//!
//! - `http(s)://` URLs are fetched with ureq (native only)
//! - `file://` URLs and plain paths are read from disk
//! - `data:` URIs are decoded inline (base64 or percent-encoded)

use std::fs;
#[cfg(not(target_arch = "wasm32"))]
use std::io::Read;

use base64::Engine as _;

use super::LoadError;

/// Refuse bodies larger than this
pub const MAX_FETCH_BYTES: u64 = 512 * 1024 * 1024;

/// Read the bytes behind a URL, path, or data URI
pub fn fetch(url: &str) -> Result<Vec<u8>, LoadError> {
    if let Some(rest) = url.strip_prefix("data:") {
        return decode_data_uri(rest);
    }
    if is_http(url) {
        return fetch_http(url);
    }
    let path = local_path(url);
    fs::read(&path).map_err(|e| LoadError::Fetch(format!("{}: {}", path, e)))
}

fn is_http(url: &str) -> bool {
    let lower = url.get(..8).unwrap_or(url).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Strip `file://` and percent-decode into a filesystem path
pub fn local_path(url: &str) -> String {
    match url.strip_prefix("file://") {
        Some(rest) => urlencoding::decode(rest)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| rest.to_string()),
        None => url.to_string(),
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn fetch_http(url: &str) -> Result<Vec<u8>, LoadError> {
    let response = ureq::get(url).call().map_err(|e| match e {
        ureq::Error::Status(code, _) => LoadError::Fetch(format!("HTTP {} for {}", code, url)),
        other => LoadError::Fetch(other.to_string()),
    })?;

    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(MAX_FETCH_BYTES)
        .read_to_end(&mut bytes)
        .map_err(|e| LoadError::Fetch(format!("reading {}: {}", url, e)))?;
    Ok(bytes)
}

#[cfg(target_arch = "wasm32")]
fn fetch_http(url: &str) -> Result<Vec<u8>, LoadError> {
    Err(LoadError::Fetch(format!("network fetch is not available on this target: {}", url)))
}

/// Decode the part of a data URI after `data:`
fn decode_data_uri(rest: &str) -> Result<Vec<u8>, LoadError> {
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| LoadError::Decode("data URI without payload".to_string()))?;
    if meta.ends_with(";base64") {
        base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| LoadError::Decode(format!("data URI: {}", e)))
    } else {
        Ok(urlencoding::decode_binary(payload.as_bytes()).into_owned())
    }
}

/// Resolve `relative` (a glTF buffer URI, an mtl or texture name) against the
/// URL of the file that referenced it.
pub fn resolve_relative(base: &str, relative: &str) -> String {
    if relative.starts_with("data:") || is_http(relative) || relative.starts_with("file://") {
        return relative.to_string();
    }
    if relative.starts_with('/') && !is_http(base) {
        return relative.to_string();
    }

    // Drop query/fragment, then the last path segment
    let base = base.split(['?', '#']).next().unwrap_or(base);
    let dir = match base.rfind(['/', '\\']) {
        Some(i) => &base[..=i],
        None => "",
    };

    if is_http(base) {
        // Side files in URLs are percent-encoded already
        if let Some(path) = relative.strip_prefix('/') {
            let origin_end = base
                .find("://")
                .and_then(|s| base[s + 3..].find('/').map(|i| s + 3 + i))
                .unwrap_or(base.len());
            return format!("{}/{}", &base[..origin_end], path);
        }
        format!("{}{}", dir, relative)
    } else {
        let relative = urlencoding::decode(relative)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| relative.to_string());
        format!("{}{}", dir, relative.replace('\\', "/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative() {
        assert_eq!(resolve_relative("models/chair.gltf", "chair.bin"), "models/chair.bin");
        assert_eq!(resolve_relative("chair.obj", "chair.mtl"), "chair.mtl");
        assert_eq!(
            resolve_relative("https://cdn.example.com/a/b/model.gltf?v=3", "tex/wood.png"),
            "https://cdn.example.com/a/b/tex/wood.png"
        );
        assert_eq!(
            resolve_relative("https://cdn.example.com/a/model.gltf", "/shared/t.png"),
            "https://cdn.example.com/shared/t.png"
        );
        assert_eq!(resolve_relative("/tmp/x/m.obj", "my%20file.mtl"), "/tmp/x/my file.mtl");
        assert_eq!(resolve_relative("m.gltf", "data:,abc"), "data:,abc");
    }

    #[test]
    fn test_data_uris() {
        assert_eq!(fetch("data:application/octet-stream;base64,AAEC").unwrap(), vec![0, 1, 2]);
        assert_eq!(fetch("data:text/plain,a%20b").unwrap(), b"a b".to_vec());
        assert!(matches!(fetch("data:nothing"), Err(LoadError::Decode(_))));
    }

    #[test]
    fn test_local_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a b.stl");
        fs::write(&path, b"solid").unwrap();

        let plain = path.to_string_lossy().to_string();
        assert_eq!(fetch(&plain).unwrap(), b"solid");

        let url = format!("file://{}", plain.replace(' ', "%20"));
        assert_eq!(fetch(&url).unwrap(), b"solid");

        let missing = dir.path().join("missing.obj");
        assert!(matches!(fetch(&missing.to_string_lossy()), Err(LoadError::Fetch(_))));
    }
}
