//! Project manifest (`package.json`) loading.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::error::ConfigError;

/// The subset of `package.json` the dev environment cares about.
///
/// `proxy` and `browserslist` are kept as raw JSON so validation can
/// distinguish a missing field from one with the wrong shape.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PackageManifest {
    pub name: Option<String>,
    pub version: Option<String>,
    pub homepage: Option<String>,
    pub proxy: Option<Value>,
    pub browserslist: Option<Value>,
    pub dependencies: BTreeMap<String, String>,
    pub dev_dependencies: BTreeMap<String, String>,
}

impl PackageManifest {
    /// Load and parse the manifest at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ManifestRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::ManifestParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Display name for startup output.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("the app")
    }

    #[must_use]
    pub fn has_browserslist(&self) -> bool {
        self.browserslist.is_some()
    }
}

/// Read the installed version of a package from `node_modules`.
///
/// Returns `None` when the package is absent or its manifest does not
/// carry a parseable semver version.
#[must_use]
pub fn installed_package_version(app_dir: &Path, name: &str) -> Option<semver::Version> {
    let manifest_path = app_dir.join("node_modules").join(name).join("package.json");
    let content = std::fs::read_to_string(manifest_path).ok()?;
    let value: Value = serde_json::from_str(&content).ok()?;
    semver::Version::parse(value.get("version")?.as_str()?).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write_package_json(dir: &Path, content: &str) -> std::path::PathBuf {
        let path = dir.join("package.json");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_full_manifest() {
        let dir = tempdir().unwrap();
        let path = write_package_json(
            dir.path(),
            r#"{
                "name": "my-app",
                "version": "0.1.0",
                "homepage": "/my-app",
                "proxy": "http://localhost:4000",
                "browserslist": [">0.2%", "not dead"],
                "dependencies": { "react": "^18.0.0" },
                "devDependencies": { "vitest": "^1.0.0" }
            }"#,
        );

        let manifest = PackageManifest::load(&path).unwrap();
        assert_eq!(manifest.display_name(), "my-app");
        assert_eq!(manifest.homepage.as_deref(), Some("/my-app"));
        assert_eq!(
            manifest.proxy.as_ref().and_then(Value::as_str),
            Some("http://localhost:4000")
        );
        assert!(manifest.has_browserslist());
        assert_eq!(manifest.dependencies.get("react").unwrap(), "^18.0.0");
        assert_eq!(manifest.dev_dependencies.len(), 1);
    }

    #[test]
    fn test_load_minimal_manifest() {
        let dir = tempdir().unwrap();
        let path = write_package_json(dir.path(), r#"{ "name": "bare" }"#);

        let manifest = PackageManifest::load(&path).unwrap();
        assert!(manifest.homepage.is_none());
        assert!(manifest.proxy.is_none());
        assert!(!manifest.has_browserslist());
        assert!(manifest.dependencies.is_empty());
    }

    #[test]
    fn test_display_name_fallback() {
        let manifest = PackageManifest::default();
        assert_eq!(manifest.display_name(), "the app");
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let dir = tempdir().unwrap();
        let path = write_package_json(
            dir.path(),
            r#"{ "name": "x", "scripts": { "start": "baily start" }, "private": true }"#,
        );

        assert!(PackageManifest::load(&path).is_ok());
    }

    #[test]
    fn test_missing_file_error_names_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("package.json");

        let err = PackageManifest::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ManifestRead { .. }));
        assert!(err.to_string().contains("package.json"));
    }

    #[test]
    fn test_invalid_json_error() {
        let dir = tempdir().unwrap();
        let path = write_package_json(dir.path(), "not valid json {{{");

        let err = PackageManifest::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ManifestParse { .. }));
    }

    #[test]
    fn test_installed_package_version() {
        let dir = tempdir().unwrap();
        let react_dir = dir.path().join("node_modules").join("react");
        fs::create_dir_all(&react_dir).unwrap();
        fs::write(
            react_dir.join("package.json"),
            r#"{ "name": "react", "version": "18.2.0" }"#,
        )
        .unwrap();

        let version = installed_package_version(dir.path(), "react").unwrap();
        assert_eq!(version, semver::Version::new(18, 2, 0));
    }

    #[test]
    fn test_installed_package_version_absent() {
        let dir = tempdir().unwrap();
        assert!(installed_package_version(dir.path(), "react").is_none());
    }
}
