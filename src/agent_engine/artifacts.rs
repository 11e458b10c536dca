use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::errors::WebPilotResult;

/// Files produced by a session: screenshots, reports and macros.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir(&self, name: &str) -> WebPilotResult<PathBuf> {
        let dir = self.root.join(name);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Writes `screenshots/<label>_<timestamp>.png`.
    pub fn save_screenshot(&self, label: &str, png: &[u8]) -> WebPilotResult<PathBuf> {
        let path = self.dir("screenshots")?.join(format!("{label}_{}.png", stamp()));
        std::fs::write(&path, png)?;
        tracing::debug!(path = %path.display(), "screenshot saved");
        Ok(path)
    }

    /// Pretty JSON under `<subdir>/<name>.json`.
    pub fn write_json<T: Serialize>(&self, subdir: &str, name: &str, value: &T) -> WebPilotResult<PathBuf> {
        let path = self.dir(subdir)?.join(format!("{name}.json"));
        std::fs::write(&path, serde_json::to_string_pretty(value)?)?;
        Ok(path)
    }
}

pub fn stamp() -> String {
    chrono::Utc::now().format("%Y%m%d_%H%M%S%3f").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screenshots_and_json_land_in_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());

        let shot = store.save_screenshot("final", b"png").unwrap();
        assert!(shot.starts_with(dir.path().join("screenshots")));
        assert_eq!(std::fs::read(&shot).unwrap(), b"png");

        let json = store.write_json("reports", "r1", &serde_json::json!({"ok": true})).unwrap();
        let back: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(json).unwrap()).unwrap();
        assert_eq!(back["ok"], true);
    }
}
