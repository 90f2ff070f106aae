#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

pub mod bundler;
pub mod env;
pub mod error;
pub mod https;
pub mod manifest;
pub mod paths;
pub mod proxy;
pub mod server;
pub mod urls;
pub mod version;

pub use bundler::{BundlerConfig, Mode};
pub use env::{ClientEnv, EnvValue, EnvironmentSnapshot};
pub use error::ConfigError;
pub use https::{resolve_https_config, HttpsConfig};
pub use manifest::PackageManifest;
pub use paths::ProjectPaths;
pub use proxy::ProxyTarget;
pub use server::{AllowedHosts, DevServerConfig};
pub use urls::{choose_port, prepare_urls, DevUrls};
pub use version::VERSION;
