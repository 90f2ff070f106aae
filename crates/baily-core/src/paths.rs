//! Project path resolution.
//!
//! Everything the dev server serves or watches is addressed through
//! [`ProjectPaths`], resolved once from the app directory and the captured
//! environment. Resolution is pure; only [`app_directory`] and
//! [`check_required_files`] touch the filesystem.

use std::path::{Path, PathBuf};

use serde::Serialize;
use url::Url;

use crate::env::EnvironmentSnapshot;
use crate::error::ConfigError;

/// Extensions probed when resolving an entry module, in priority order.
/// The platform-specific `web.*` variants win over their plain siblings.
pub const MODULE_FILE_EXTENSIONS: [&str; 11] = [
    "web.mjs", "mjs", "web.js", "js", "web.ts", "ts", "web.tsx", "tsx", "json", "web.jsx", "jsx",
];

/// Base used to parse path-only public URLs. Never dialed.
const STUB_BASE: &str = "https://baily.invalid";

/// Canonical filesystem layout of the project being served.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectPaths {
    pub app_dir: PathBuf,
    pub dotenv: PathBuf,
    pub app_src: PathBuf,
    pub app_public: PathBuf,
    pub app_html: PathBuf,
    pub app_build: PathBuf,
    pub app_package_json: PathBuf,
    pub yarn_lock: PathBuf,
    pub app_index: PathBuf,
    /// Mount point for all served assets. Always ends with `/`.
    pub public_url_or_path: String,
}

impl ProjectPaths {
    /// Resolve the project layout relative to `app_dir`.
    ///
    /// `BUILD_PATH` overrides the build output directory and `PUBLIC_URL`
    /// overrides the manifest `homepage` when computing the mount point.
    #[must_use]
    pub fn resolve(
        app_dir: &Path,
        snapshot: &EnvironmentSnapshot,
        homepage: Option<&str>,
    ) -> Self {
        let app_src = app_dir.join("src");
        let build_dir = snapshot.get_or("BUILD_PATH", "build");
        let dev = snapshot.get_or("NODE_ENV", "development") == "development";

        Self {
            app_dir: app_dir.to_path_buf(),
            dotenv: app_dir.join(".env"),
            app_public: app_dir.join("public"),
            app_html: app_dir.join("public").join("index.html"),
            app_build: app_dir.join(build_dir),
            app_package_json: app_dir.join("package.json"),
            yarn_lock: app_dir.join("yarn.lock"),
            app_index: resolve_module(&app_src, "index"),
            public_url_or_path: public_url_or_path(dev, homepage, snapshot.get("PUBLIC_URL")),
            app_src,
        }
    }

    /// Rooted path the dev server mounts its routes under. Outside
    /// development the mount point may be a full URL or dot-relative;
    /// routes still need a rooted path, so full URLs reduce to their path
    /// component and dot-relative values to `/`. The bundler's public
    /// path keeps the verbatim value.
    #[must_use]
    pub fn served_path(&self) -> String {
        let public = &self.public_url_or_path;
        if public.starts_with('/') {
            return public.clone();
        }
        if public.starts_with('.') {
            return "/".to_string();
        }
        pathname_of(public)
    }
}

/// Canonicalize the working directory the project lives in.
///
/// Symlinks are resolved so file watching sees the same paths the
/// resolver hands out.
pub fn app_directory(cwd: &Path) -> Result<PathBuf, ConfigError> {
    Ok(dunce::canonicalize(cwd)?)
}

/// Probe for `dir/name.<ext>` across [`MODULE_FILE_EXTENSIONS`] and return
/// the first match, falling back to the plain `.js` path when nothing
/// exists yet.
#[must_use]
pub fn resolve_module(dir: &Path, name: &str) -> PathBuf {
    for ext in MODULE_FILE_EXTENSIONS {
        let candidate = dir.join(format!("{name}.{ext}"));
        if candidate.is_file() {
            return candidate;
        }
    }
    dir.join(format!("{name}.js"))
}

/// Compute the URL mount point the app is served from.
///
/// `PUBLIC_URL` wins over the manifest `homepage`. Values may be full
/// URLs, absolute paths, or dot-relative paths; the result always ends
/// with `/`. In development, dot-relative values collapse to `/` and full
/// URLs are reduced to their path component.
#[must_use]
pub fn public_url_or_path(
    dev: bool,
    homepage: Option<&str>,
    env_public_url: Option<&str>,
) -> String {
    if let Some(public_url) = env_public_url {
        let with_slash = ensure_trailing_slash(public_url);
        if dev {
            if with_slash.starts_with('.') {
                return "/".to_string();
            }
            return pathname_of(&with_slash);
        }
        return with_slash;
    }

    if let Some(homepage) = homepage {
        let with_slash = ensure_trailing_slash(homepage);
        if with_slash.starts_with('.') {
            return if dev { "/".to_string() } else { with_slash };
        }
        return pathname_of(&with_slash);
    }

    "/".to_string()
}

/// Path component of `value` resolved against the stub base. Full URLs
/// keep their own path; bare paths come back normalized.
fn pathname_of(value: &str) -> String {
    Url::parse(STUB_BASE)
        .ok()
        .and_then(|stub| stub.join(value).ok())
        .map_or_else(|| "/".to_string(), |url| url.path().to_string())
}

fn ensure_trailing_slash(value: &str) -> String {
    if value.ends_with('/') {
        value.to_string()
    } else {
        format!("{value}/")
    }
}

/// Verify the files the dev server cannot start without.
pub fn check_required_files(files: &[&Path]) -> Result<(), ConfigError> {
    for file in files {
        if !file.is_file() {
            return Err(ConfigError::MissingRequiredFile {
                path: (*file).to_path_buf(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(pairs: &[(&str, &str)]) -> EnvironmentSnapshot {
        EnvironmentSnapshot::from_vars(
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string())),
        )
    }

    #[test]
    fn test_resolve_module_prefers_web_variant() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir(&src).unwrap();
        std::fs::write(src.join("index.web.js"), "").unwrap();
        std::fs::write(src.join("index.js"), "").unwrap();

        assert_eq!(resolve_module(&src, "index"), src.join("index.web.js"));
    }

    #[test]
    fn test_resolve_module_finds_tsx() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir(&src).unwrap();
        std::fs::write(src.join("index.tsx"), "").unwrap();

        assert_eq!(resolve_module(&src, "index"), src.join("index.tsx"));
    }

    #[test]
    fn test_resolve_module_falls_back_to_js() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir(&src).unwrap();

        assert_eq!(resolve_module(&src, "index"), src.join("index.js"));
    }

    #[test]
    fn test_public_url_default_is_root() {
        assert_eq!(public_url_or_path(true, None, None), "/");
        assert_eq!(public_url_or_path(false, None, None), "/");
    }

    #[test]
    fn test_public_url_from_homepage_path() {
        assert_eq!(public_url_or_path(true, Some("/app"), None), "/app/");
        assert_eq!(public_url_or_path(true, Some("/app/"), None), "/app/");
    }

    #[test]
    fn test_public_url_full_url_reduced_to_path_in_dev() {
        assert_eq!(
            public_url_or_path(true, Some("https://cdn.example.com/assets"), None),
            "/assets/"
        );
    }

    #[test]
    fn test_public_url_dot_relative_collapses_in_dev() {
        assert_eq!(public_url_or_path(true, Some("./relative"), None), "/");
        assert_eq!(public_url_or_path(false, Some("./relative"), None), "./relative/");
    }

    #[test]
    fn test_env_public_url_wins_over_homepage() {
        assert_eq!(
            public_url_or_path(true, Some("/homepage"), Some("/env")),
            "/env/"
        );
    }

    #[test]
    fn test_env_public_url_kept_verbatim_in_production() {
        assert_eq!(
            public_url_or_path(false, None, Some("https://cdn.example.com/assets")),
            "https://cdn.example.com/assets/"
        );
    }

    #[test]
    fn test_served_path_reduces_non_path_mounts() {
        let dir = tempfile::tempdir().unwrap();

        let cdn = ProjectPaths::resolve(
            dir.path(),
            &snapshot(&[
                ("NODE_ENV", "production"),
                ("PUBLIC_URL", "https://cdn.example.com/assets"),
            ]),
            None,
        );
        assert_eq!(cdn.public_url_or_path, "https://cdn.example.com/assets/");
        assert_eq!(cdn.served_path(), "/assets/");

        let relative = ProjectPaths::resolve(
            dir.path(),
            &snapshot(&[("NODE_ENV", "production")]),
            Some("./relative"),
        );
        assert_eq!(relative.public_url_or_path, "./relative/");
        assert_eq!(relative.served_path(), "/");

        let dev = ProjectPaths::resolve(dir.path(), &snapshot(&[]), Some("/my-app"));
        assert_eq!(dev.served_path(), dev.public_url_or_path);
    }

    #[test]
    fn test_resolve_honors_build_path_override() {
        let dir = tempfile::tempdir().unwrap();
        let snap = snapshot(&[("BUILD_PATH", "dist")]);
        let paths = ProjectPaths::resolve(dir.path(), &snap, None);
        assert_eq!(paths.app_build, dir.path().join("dist"));

        let default = ProjectPaths::resolve(dir.path(), &snapshot(&[]), None);
        assert_eq!(default.app_build, dir.path().join("build"));
    }

    #[test]
    fn test_resolve_layout() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ProjectPaths::resolve(dir.path(), &snapshot(&[]), Some("/my-app"));

        assert_eq!(paths.app_html, dir.path().join("public").join("index.html"));
        assert_eq!(paths.app_src, dir.path().join("src"));
        assert_eq!(paths.public_url_or_path, "/my-app/");
    }

    #[test]
    fn test_check_required_files_reports_first_missing() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.txt");
        std::fs::write(&present, "").unwrap();
        let missing = dir.path().join("missing.txt");

        assert!(check_required_files(&[&present]).is_ok());
        let err = check_required_files(&[&present, &missing]).unwrap_err();
        match err {
            ConfigError::MissingRequiredFile { path } => assert_eq!(path, missing),
            other => panic!("unexpected error: {other}"),
        }
    }
}
