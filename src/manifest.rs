//! Project manifest reader.
//!
//! Loads the `name → command` scripts map (the `scripts` object of
//! `package.json` by default). Read fresh on every gate invocation.

use std::path::{Path, PathBuf};

use crate::error::ManifestError;
use crate::settings::ManifestSettings;

/// Declared scripts of a project, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptManifest {
    pub path: PathBuf,
    scripts: Vec<(String, String)>,
}

impl ScriptManifest {
    /// Load the manifest under `project_dir`.
    ///
    /// Returns `Ok(None)` when the file does not exist. A manifest without a
    /// scripts section (or whose scripts value is not an object) loads with
    /// zero scripts.
    pub fn load(
        project_dir: &Path,
        settings: &ManifestSettings,
    ) -> Result<Option<Self>, ManifestError> {
        let path = project_dir.join(&settings.file);
        let data = match std::fs::read_to_string(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(ManifestError::Read { path, source }),
        };

        let json: serde_json::Value = serde_json::from_str(&data)
            .map_err(|source| ManifestError::Parse {
                path: path.clone(),
                source,
            })?;

        let scripts = json
            .get(&settings.scripts_key)
            .and_then(|v| v.as_object())
            .map(|obj| {
                obj.iter()
                    .map(|(name, cmd)| {
                        let cmd = cmd
                            .as_str()
                            .map(String::from)
                            .unwrap_or_else(|| cmd.to_string());
                        (name.clone(), cmd)
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Some(Self { path, scripts }))
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.scripts.iter().any(|(n, _)| n == name)
    }

    /// Command string declared for `name`.
    pub fn command(&self, name: &str) -> Option<&str> {
        self.scripts
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c.as_str())
    }

    /// Script names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.scripts.iter().map(|(n, _)| n.as_str())
    }
}
