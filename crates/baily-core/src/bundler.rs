//! Declarative build configuration.
//!
//! [`BundlerConfig`] is pure data combining resolved paths with the
//! harvested environment. The external bundler consumes it; nothing in
//! this crate interprets the rule table beyond handing it over.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

use crate::env::{ClientEnv, EnvironmentSnapshot};
use crate::paths::ProjectPaths;

/// Default threshold below which images are inlined as data URLs.
const DEFAULT_IMAGE_INLINE_SIZE_LIMIT: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Development,
    Production,
}

impl Mode {
    /// Anything other than the literal `production` builds in development
    /// mode; `.env` loading still sees the original mode name.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        if name == "production" {
            Self::Production
        } else {
            Self::Development
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }

    #[must_use]
    pub fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OutputConfig {
    pub path: PathBuf,
    pub public_path: String,
}

/// One entry in the module-rule table. Rules are evaluated in order;
/// the first matching rule claims the file.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleRule {
    pub name: &'static str,
    pub test: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_size_limit: Option<u64>,
}

/// Build configuration handed to the bundler.
#[derive(Debug, Clone, Serialize)]
pub struct BundlerConfig {
    pub mode: Mode,
    /// Stop at the first error instead of tolerating it during the run.
    pub bail: bool,
    pub stats: &'static str,
    pub target: &'static str,
    pub entry: PathBuf,
    pub output: OutputConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub devtool: Option<&'static str>,
    /// `process.env.<KEY>` replacement table, values JSON-serialized.
    pub define: BTreeMap<String, String>,
    pub image_inline_size_limit: u64,
    pub jsx_runtime: &'static str,
    pub module_rules: Vec<ModuleRule>,
}

impl BundlerConfig {
    #[must_use]
    pub fn create(
        mode: Mode,
        paths: &ProjectPaths,
        client_env: &ClientEnv,
        snapshot: &EnvironmentSnapshot,
    ) -> Self {
        let image_inline_size_limit = snapshot
            .get("IMAGE_INLINE_SIZE_LIMIT")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_IMAGE_INLINE_SIZE_LIMIT);

        Self {
            mode,
            bail: !mode.is_development(),
            stats: "errors-warnings",
            target: "browserslist",
            entry: paths.app_index.clone(),
            output: OutputConfig {
                path: paths.app_build.clone(),
                public_path: paths.public_url_or_path.clone(),
            },
            devtool: devtool(mode, snapshot),
            define: client_env.stringified(),
            image_inline_size_limit,
            jsx_runtime: if snapshot.is_true("DISABLE_NEW_JSX_TRANSFORM") {
                "classic"
            } else {
                "automatic"
            },
            module_rules: module_rules(paths, image_inline_size_limit),
        }
    }
}

/// Source-map choice. Development always gets the cheap rebuild-friendly
/// variant; production maps are full, or off entirely when
/// `GENERATE_SOURCEMAP` is `"false"`.
fn devtool(mode: Mode, snapshot: &EnvironmentSnapshot) -> Option<&'static str> {
    if mode.is_development() {
        return Some("cheap-module-source-map");
    }
    if snapshot.get("GENERATE_SOURCEMAP") == Some("false") {
        None
    } else {
        Some("source-map")
    }
}

fn module_rules(paths: &ProjectPaths, inline_size_limit: u64) -> Vec<ModuleRule> {
    vec![
        ModuleRule {
            name: "image",
            test: r"\.(bmp|gif|jpe?g|png|avif)$",
            include: None,
            inline_size_limit: Some(inline_size_limit),
        },
        ModuleRule {
            name: "source",
            test: r"\.(js|mjs|jsx|ts|tsx)$",
            include: Some(paths.app_src.clone()),
            inline_size_limit: None,
        },
        ModuleRule {
            name: "style",
            test: r"\.css$",
            include: None,
            inline_size_limit: None,
        },
        // Catch-all: anything unclaimed is copied through as a file asset.
        ModuleRule {
            name: "asset",
            test: r".*",
            include: None,
            inline_size_limit: None,
        },
    ]
}
