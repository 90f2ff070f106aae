//! Backend proxy target resolution.
//!
//! Projects may point API requests at a backend by setting `"proxy"` in
//! `package.json`. The value must be a string carrying an absolute
//! `http://` or `https://` URL; anything else is a configuration error
//! rather than something to silently ignore.

use serde_json::Value;
use url::Url;

use crate::error::ConfigError;
use crate::manifest::PackageManifest;

/// Validated proxy target parsed from the manifest.
#[derive(Debug, Clone)]
pub struct ProxyTarget {
    url: Url,
}

impl ProxyTarget {
    /// Validate the manifest's `proxy` field, if present.
    pub fn from_manifest(manifest: &PackageManifest) -> Result<Option<Self>, ConfigError> {
        let Some(value) = &manifest.proxy else {
            return Ok(None);
        };

        let Some(proxy) = value.as_str() else {
            return Err(ConfigError::InvalidProxy {
                reason: format!(
                    "When specified, \"proxy\" in package.json must be a string. \
                     Instead, the type of \"proxy\" was \"{}\".",
                    json_type_name(value)
                ),
            });
        };

        if !proxy.starts_with("http://") && !proxy.starts_with("https://") {
            return Err(ConfigError::InvalidProxy {
                reason: "When \"proxy\" is specified in package.json it must start with either \
                         http:// or https://"
                    .to_string(),
            });
        }

        let url = Url::parse(proxy).map_err(|e| ConfigError::InvalidProxy {
            reason: format!("\"proxy\" in package.json is not a valid URL: {e}"),
        })?;

        Ok(Some(Self { url }))
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest_with_proxy(proxy: Value) -> PackageManifest {
        PackageManifest {
            proxy: Some(proxy),
            ..PackageManifest::default()
        }
    }

    #[test]
    fn test_absent_proxy_is_none() {
        let target = ProxyTarget::from_manifest(&PackageManifest::default()).unwrap();
        assert!(target.is_none());
    }

    #[test]
    fn test_valid_http_proxy() {
        let manifest = manifest_with_proxy(Value::String("http://localhost:4000".into()));
        let target = ProxyTarget::from_manifest(&manifest).unwrap().unwrap();
        assert_eq!(target.as_str(), "http://localhost:4000/");
        assert_eq!(target.url().port(), Some(4000));
    }

    #[test]
    fn test_non_string_proxy_names_actual_type() {
        let manifest = manifest_with_proxy(serde_json::json!({ "target": "http://x" }));
        let err = ProxyTarget::from_manifest(&manifest).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("must be a string"));
        assert!(msg.contains("\"object\""));

        let manifest = manifest_with_proxy(Value::Bool(true));
        let err = ProxyTarget::from_manifest(&manifest).unwrap_err();
        assert!(err.to_string().contains("\"boolean\""));
    }

    #[test]
    fn test_scheme_is_required() {
        let manifest = manifest_with_proxy(Value::String("localhost:4000".into()));
        let err = ProxyTarget::from_manifest(&manifest).unwrap_err();
        assert!(err
            .to_string()
            .contains("must start with either http:// or https://"));
    }

    #[test]
    fn test_unparseable_url_is_rejected() {
        let manifest = manifest_with_proxy(Value::String("http://[broken".into()));
        let err = ProxyTarget::from_manifest(&manifest).unwrap_err();
        assert!(err.to_string().contains("not a valid URL"));
    }
}
