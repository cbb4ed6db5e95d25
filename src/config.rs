//! Run configuration.
//!
//! [`Settings`] is the flat key/value view built from an optional
//! `appsettings.json` next to the binary's working directory and the process
//! environment, environment winning. [`JobConfig`] pulls the keys a run needs
//! out of it and is passed explicitly into [`crate::job::run`].

use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const SETTINGS_FILE_NAME: &str = "appsettings.json";

pub const KEY_VAULT_URI: &str = "KeyVaultUri";
pub const SECRET_NAME: &str = "SecretName";
pub const STORAGE_ACCOUNT_NAME: &str = "StorageAccountName";
/// Optional blob service endpoint override (local emulators, sovereign clouds).
pub const BLOB_ENDPOINT: &str = "BlobEndpoint";

/// Section whose keys are also exposed without a prefix, matching the local
/// functions host settings layout.
const VALUES_SECTION: &str = "Values";

/// Flat configuration view. Nested JSON keys are joined with `:`.
#[derive(Debug, Default, Clone)]
pub struct Settings {
    base_dir: PathBuf,
    values: HashMap<String, String>,
}

impl Settings {
    /// Loads `<base_dir>/appsettings.json` (if present) overlaid with the
    /// process environment.
    pub fn load(base_dir: &Path) -> Result<Self> {
        Self::from_sources(base_dir, std::env::vars())
    }

    /// Same as [`Settings::load`] with an explicit set of environment
    /// variables.
    pub fn from_sources<I>(base_dir: &Path, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut settings = Self {
            base_dir: base_dir.to_path_buf(),
            values: HashMap::new(),
        };

        let path = base_dir.join(SETTINGS_FILE_NAME);
        if path.is_file() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let json: Value = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?;
            let mut flat = Vec::new();
            flatten("", &json, &mut flat);
            settings.merge_layer(flat);
            debug!(path = %path.display(), keys = settings.values.len(), "Loaded settings file");
        } else {
            debug!(path = %path.display(), "No settings file, using environment only");
        }

        settings.merge_layer(
            vars.into_iter()
                .map(|(name, value)| (name.replace("__", ":"), value))
                .collect(),
        );

        Ok(settings)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Like [`Settings::get`], but an absent or empty value is an error.
    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("missing configuration value '{key}'"))
    }

    /// Applies one source on top of the current values. Unprefixed aliases of
    /// `Values:` keys go in first so a key the source sets explicitly always
    /// beats an alias from the same source, whatever the order.
    fn merge_layer(&mut self, pairs: Vec<(String, String)>) {
        for (key, value) in &pairs {
            if let Some(unprefixed) = key
                .strip_prefix(VALUES_SECTION)
                .and_then(|k| k.strip_prefix(':'))
            {
                self.values.insert(unprefixed.to_string(), value.clone());
            }
        }
        self.values.extend(pairs);
    }
}

fn flatten(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) {
    let join = |key: &str| {
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{prefix}:{key}")
        }
    };
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                flatten(&join(key), child, out);
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                flatten(&join(&i.to_string()), child, out);
            }
        }
        Value::Null => {}
        Value::String(s) => out.push((prefix.to_string(), s.clone())),
        other => out.push((prefix.to_string(), other.to_string())),
    }
}

/// Everything a run needs from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobConfig {
    pub key_vault_uri: String,
    pub secret_name: String,
    pub storage_account_name: String,
    pub blob_endpoint: Option<String>,
}

impl JobConfig {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self {
            key_vault_uri: settings.require(KEY_VAULT_URI)?.to_string(),
            secret_name: settings.require(SECRET_NAME)?.to_string(),
            storage_account_name: settings.require(STORAGE_ACCOUNT_NAME)?.to_string(),
            blob_endpoint: settings
                .get(BLOB_ENDPOINT)
                .filter(|v| !v.is_empty())
                .map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn write_settings(dir: &Path, content: &str) {
        std::fs::write(dir.join(SETTINGS_FILE_NAME), content).unwrap();
    }

    #[test]
    fn test_missing_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let settings =
            Settings::from_sources(dir.path(), vars(&[("SecretName", "from-env")])).unwrap();
        assert_eq!(settings.get("SecretName"), Some("from-env"));
        assert_eq!(settings.base_dir(), dir.path());
    }

    #[test]
    fn test_environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        write_settings(
            dir.path(),
            r#"{"KeyVaultUri": "https://file.vault.azure.net/", "SecretName": "file-secret"}"#,
        );
        let settings =
            Settings::from_sources(dir.path(), vars(&[("SecretName", "env-secret")])).unwrap();

        assert_eq!(settings.get("KeyVaultUri"), Some("https://file.vault.azure.net/"));
        assert_eq!(settings.get("SecretName"), Some("env-secret"));
    }

    #[test]
    fn test_nested_sections_are_flattened() {
        let dir = tempfile::tempdir().unwrap();
        write_settings(
            dir.path(),
            r#"{"IsEncrypted": false, "Values": {"StorageAccountName": "acct"}, "Hosts": ["a", "b"]}"#,
        );
        let settings = Settings::from_sources(dir.path(), Vec::new()).unwrap();

        assert_eq!(settings.get("Values:StorageAccountName"), Some("acct"));
        assert_eq!(settings.get("StorageAccountName"), Some("acct"));
        assert_eq!(settings.get("IsEncrypted"), Some("false"));
        assert_eq!(settings.get("Hosts:1"), Some("b"));
    }

    #[test]
    fn test_double_underscore_maps_to_section() {
        let dir = tempfile::tempdir().unwrap();
        let settings =
            Settings::from_sources(dir.path(), vars(&[("Values__SecretName", "s")])).unwrap();
        assert_eq!(settings.get("Values:SecretName"), Some("s"));
        assert_eq!(settings.get("SecretName"), Some("s"));
    }

    #[test]
    fn test_explicit_file_key_beats_values_alias() {
        let dir = tempfile::tempdir().unwrap();
        write_settings(
            dir.path(),
            r#"{"SecretName": "top", "Values": {"SecretName": "nested"}}"#,
        );
        let settings = Settings::from_sources(dir.path(), Vec::new()).unwrap();

        assert_eq!(settings.get("SecretName"), Some("top"));
        assert_eq!(settings.get("Values:SecretName"), Some("nested"));
    }

    #[test]
    fn test_explicit_env_var_beats_values_alias_in_any_order() {
        let dir = tempfile::tempdir().unwrap();
        let plain_first = vars(&[
            ("SecretName", "env-plain"),
            ("Values__SecretName", "env-values"),
        ]);
        let alias_first = vars(&[
            ("Values__SecretName", "env-values"),
            ("SecretName", "env-plain"),
        ]);

        for order in [plain_first, alias_first] {
            let settings = Settings::from_sources(dir.path(), order).unwrap();
            assert_eq!(settings.get("SecretName"), Some("env-plain"));
            assert_eq!(settings.get("Values:SecretName"), Some("env-values"));
        }
    }

    #[test]
    fn test_env_alias_beats_file_key() {
        let dir = tempfile::tempdir().unwrap();
        write_settings(dir.path(), r#"{"SecretName": "file"}"#);
        let settings =
            Settings::from_sources(dir.path(), vars(&[("Values__SecretName", "env")])).unwrap();
        assert_eq!(settings.get("SecretName"), Some("env"));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write_settings(dir.path(), "{ not json");
        assert!(Settings::from_sources(dir.path(), Vec::new()).is_err());
    }

    #[test]
    fn test_job_config_requires_vault_uri() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::from_sources(
            dir.path(),
            vars(&[("SecretName", "s"), ("StorageAccountName", "acct")]),
        )
        .unwrap();

        let err = JobConfig::from_settings(&settings).unwrap_err();
        assert_eq!(err.to_string(), "missing configuration value 'KeyVaultUri'");
    }

    #[test]
    fn test_job_config_reads_all_keys() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::from_sources(
            dir.path(),
            vars(&[
                ("Values__KeyVaultUri", "https://v.vault.azure.net/"),
                ("SecretName", "s"),
                ("StorageAccountName", "acct"),
            ]),
        )
        .unwrap();

        let config = JobConfig::from_settings(&settings).unwrap();
        assert_eq!(config.key_vault_uri, "https://v.vault.azure.net/");
        assert_eq!(config.secret_name, "s");
        assert_eq!(config.storage_account_name, "acct");
        assert_eq!(config.blob_endpoint, None);
    }

    #[test]
    fn test_empty_value_counts_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::from_sources(
            dir.path(),
            vars(&[
                ("KeyVaultUri", "https://v.vault.azure.net/"),
                ("SecretName", ""),
                ("StorageAccountName", "acct"),
            ]),
        )
        .unwrap();
        let err = JobConfig::from_settings(&settings).unwrap_err();
        assert!(err.to_string().contains("SecretName"));
    }

    #[test]
    fn test_blob_endpoint_is_optional() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::from_sources(
            dir.path(),
            vars(&[
                ("KeyVaultUri", "https://v.vault.azure.net/"),
                ("SecretName", "s"),
                ("StorageAccountName", "acct"),
                ("BlobEndpoint", "http://127.0.0.1:10000/devstoreaccount1"),
            ]),
        )
        .unwrap();
        let config = JobConfig::from_settings(&settings).unwrap();
        assert_eq!(
            config.blob_endpoint.as_deref(),
            Some("http://127.0.0.1:10000/devstoreaccount1")
        );
    }
}
