// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use crate::backend::BackendKind;
use crate::error::{Error, Result};
use crate::fs::{atomic_write, ensure_dir, path_to_str};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const CONFIG_FILE_NAME: &str = "localsites.config.json";
pub const DEV_CONFIG_FILE_NAME: &str = "dev.localsites.config.json";

const SSL_DIR_NAME: &str = "ssl";
const NGINX_DIR_NAME: &str = "nginx";
const TEMPLATES_DIR_NAME: &str = "templates";

/// Sentinels written by `--init` until the user fills the identity in.
pub const AUTHORITY_NAME_SENTINEL: &str = "{{CONFIG_AN}}";
pub const ORGANISATION_NAME_SENTINEL: &str = "{{CONFIG_ON}}";
pub const COMMON_NAME_SENTINEL: &str = "{{CONFIG_CN}}";

/// Default reload command when the config does not override it.
pub const DEFAULT_RELOAD_COMMAND: &[&str] = &["sudo", "nginx", "-s", "reload"];

/// The persisted configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(default = "unset_authority_name")]
    pub authority_name: String,
    #[serde(default = "unset_organisation_name")]
    pub organisation_name: String,
    #[serde(default = "unset_common_name")]
    pub common_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nginx_dir: Option<String>,
    /// Which certificate backend to use, `openssl` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_backend: Option<BackendKind>,
    /// Argument vector used to reload the proxy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reload_command: Option<Vec<String>>,
}

fn unset_authority_name() -> String {
    AUTHORITY_NAME_SENTINEL.to_string()
}

fn unset_organisation_name() -> String {
    ORGANISATION_NAME_SENTINEL.to_string()
}

fn unset_common_name() -> String {
    COMMON_NAME_SENTINEL.to_string()
}

/// CA identity fields that the user has to fill in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityField {
    AuthorityName,
    OrganisationName,
    CommonName,
}

impl IdentityField {
    pub const ALL: [IdentityField; 3] = [
        IdentityField::AuthorityName,
        IdentityField::OrganisationName,
        IdentityField::CommonName,
    ];

    pub fn sentinel(self) -> &'static str {
        match self {
            IdentityField::AuthorityName => AUTHORITY_NAME_SENTINEL,
            IdentityField::OrganisationName => ORGANISATION_NAME_SENTINEL,
            IdentityField::CommonName => COMMON_NAME_SENTINEL,
        }
    }

    /// CLI flag that sets this field.
    pub fn flag(self) -> &'static str {
        match self {
            IdentityField::AuthorityName => "--an",
            IdentityField::OrganisationName => "--on",
            IdentityField::CommonName => "--cn",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            IdentityField::AuthorityName => "authority name",
            IdentityField::OrganisationName => "organisation name",
            IdentityField::CommonName => "common name",
        }
    }

    pub fn hint(self) -> String {
        let article = match self {
            IdentityField::AuthorityName | IdentityField::OrganisationName => "an",
            IdentityField::CommonName => "a",
        };
        format!(
            "Use {} \"<{}>\" to set {} {}.",
            self.flag(),
            self.label(),
            article,
            self.label()
        )
    }

    fn get(self, doc: &ConfigDocument) -> &str {
        match self {
            IdentityField::AuthorityName => &doc.authority_name,
            IdentityField::OrganisationName => &doc.organisation_name,
            IdentityField::CommonName => &doc.common_name,
        }
    }

    fn set(self, doc: &mut ConfigDocument, value: String) {
        match self {
            IdentityField::AuthorityName => doc.authority_name = value,
            IdentityField::OrganisationName => doc.organisation_name = value,
            IdentityField::CommonName => doc.common_name = value,
        }
    }
}

impl fmt::Display for IdentityField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Valid,
    Invalid(Vec<IdentityField>),
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Validation::Valid)
    }

    pub fn invalid_fields(&self) -> &[IdentityField] {
        match self {
            Validation::Valid => &[],
            Validation::Invalid(fields) => fields,
        }
    }
}

/// Validated CA identity, only obtainable from a valid document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub authority_name: String,
    pub organisation_name: String,
    pub common_name: String,
}

/// A directory taken from the config, or the default when the config leaves it out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDir {
    pub path: PathBuf,
    pub is_default: bool,
}

impl ConfigDocument {
    /// A fresh document with sentinel identity fields and the default directories.
    pub fn template(paths: &Paths) -> Result<Self> {
        Ok(Self {
            authority_name: unset_authority_name(),
            organisation_name: unset_organisation_name(),
            common_name: unset_common_name(),
            ssl_dir: Some(path_to_str(&paths.ssl)?.to_string()),
            nginx_dir: Some(path_to_str(&paths.nginx)?.to_string()),
            cert_backend: None,
            reload_command: None,
        })
    }

    /// Check every identity field independently.
    pub fn validate(&self) -> Validation {
        let invalid: Vec<IdentityField> = IdentityField::ALL
            .iter()
            .copied()
            .filter(|field| {
                let value = field.get(self);
                value == field.sentinel() || value.trim().is_empty()
            })
            .collect();

        if invalid.is_empty() {
            Validation::Valid
        } else {
            Validation::Invalid(invalid)
        }
    }

    pub fn identity(&self) -> Result<Identity> {
        match self.validate() {
            Validation::Valid => Ok(Identity {
                authority_name: self.authority_name.clone(),
                organisation_name: self.organisation_name.clone(),
                common_name: self.common_name.clone(),
            }),
            Validation::Invalid(fields) => Err(Error::ConfigInvalid { fields }),
        }
    }

    pub fn ssl_dir(&self, paths: &Paths) -> ResolvedDir {
        resolve_dir("ssl_dir", self.ssl_dir.as_deref(), &paths.ssl)
    }

    pub fn nginx_dir(&self, paths: &Paths) -> ResolvedDir {
        resolve_dir("nginx_dir", self.nginx_dir.as_deref(), &paths.nginx)
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.cert_backend.unwrap_or_default()
    }

    pub fn reload_argv(&self) -> Vec<String> {
        match &self.reload_command {
            Some(argv) if !argv.is_empty() => argv.clone(),
            _ => DEFAULT_RELOAD_COMMAND.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Use `value` verbatim when set, otherwise fall back to `default` with a warning.
pub fn resolve_dir(field: &str, value: Option<&str>, default: &Path) -> ResolvedDir {
    match value {
        Some(v) if !v.trim().is_empty() => ResolvedDir {
            path: PathBuf::from(v),
            is_default: false,
        },
        _ => {
            warn!(
                "No {} property defined in the config file. Using {}",
                field,
                default.display()
            );
            ResolvedDir {
                path: default.to_path_buf(),
                is_default: true,
            }
        }
    }
}

/// Well-known locations under the config root.
#[derive(Debug, Clone)]
pub struct Paths {
    pub root: PathBuf,
    pub config: PathBuf,
    pub ssl: PathBuf,
    pub nginx: PathBuf,
    pub templates: PathBuf,
    /// Development mode keeps a separate config file and CA.
    pub dev: bool,
}

impl Paths {
    pub fn new() -> Result<Self> {
        Ok(Self::with_root(Self::base_dir()?, dev_mode_from_env()))
    }

    pub fn with_root(root: PathBuf, dev: bool) -> Self {
        let config_name = if dev {
            DEV_CONFIG_FILE_NAME
        } else {
            CONFIG_FILE_NAME
        };
        Self {
            config: root.join(config_name),
            ssl: root.join(SSL_DIR_NAME),
            nginx: root.join(NGINX_DIR_NAME),
            templates: root.join(TEMPLATES_DIR_NAME),
            root,
            dev,
        }
    }

    fn base_dir() -> Result<PathBuf> {
        if let Ok(custom_root) = std::env::var("LOCALSITES_ROOT") {
            let path = PathBuf::from(&custom_root);
            if !path.is_absolute() {
                return Err(Error::Config(format!(
                    "LOCALSITES_ROOT must be an absolute path, got: {}",
                    custom_root
                )));
            }
            return Ok(path);
        }

        // `sudo localsites` should still find the invoking user's config
        #[cfg(unix)]
        if let Ok(sudo_user) = std::env::var("SUDO_USER") {
            if sudo_user
                .chars()
                .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
            {
                let user_home = PathBuf::from("/home").join(&sudo_user);
                if user_home.is_dir() {
                    return Ok(user_home.join(".config").join("localsites"));
                }
            }
        }

        BaseDirs::new()
            .map(|dirs| dirs.config_dir().join("localsites"))
            .ok_or_else(|| {
                Error::Config(
                    "Could not determine the user config directory. \
                     Set LOCALSITES_ROOT to choose a location."
                        .into(),
                )
            })
    }
}

fn dev_mode_from_env() -> bool {
    matches!(std::env::var("LOCALSITES_DEV"), Ok(v) if !v.is_empty() && v != "0")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    Created,
    AlreadyExists,
}

/// Loads and persists the configuration document.
///
/// Every write replaces the whole document.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    paths: Paths,
}

impl ConfigStore {
    pub fn new(paths: Paths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    pub fn exists(&self) -> bool {
        self.paths.config.exists()
    }

    pub fn load(&self) -> Result<ConfigDocument> {
        let path = &self.paths.config;
        if !path.exists() {
            return Err(Error::ConfigMissing { path: path.clone() });
        }

        let content = crate::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| Error::ConfigParse {
            path: path.clone(),
            source: e,
        })
    }

    pub fn save(&self, doc: &ConfigDocument) -> Result<()> {
        ensure_dir(&self.paths.root).map_err(|e| Error::CreateDir {
            path: self.paths.root.clone(),
            source: e,
        })?;
        let mut content =
            serde_json::to_string_pretty(doc).map_err(|e| Error::Config(e.to_string()))?;
        content.push('\n');
        atomic_write(&self.paths.config, content.as_bytes())
    }

    /// Create the directory layout and a template document.
    ///
    /// An existing document is kept unless `force` is set.
    pub fn bootstrap(&self, force: bool) -> Result<BootstrapOutcome> {
        let root = &self.paths.root;
        let existed = ensure_dir(root).map_err(|e| Error::CreateDir {
            path: root.clone(),
            source: e,
        })?;
        if existed {
            warn!("A localsites directory already exists at {}", root.display());
        }

        for dir in [&self.paths.ssl, &self.paths.nginx] {
            ensure_dir(dir).map_err(|e| Error::CreateDir {
                path: dir.clone(),
                source: e,
            })?;
        }

        if self.exists() && !force {
            warn!(
                "A config file already exists. Use \"--init force\" if you want to rewrite the current config file."
            );
            return Ok(BootstrapOutcome::AlreadyExists);
        }

        info!("Creating config file");
        let doc = ConfigDocument::template(&self.paths)?;
        self.save(&doc)?;
        info!("Config file created at {}", self.paths.config.display());

        Ok(BootstrapOutcome::Created)
    }

    /// Set one identity field and persist the whole document.
    ///
    /// Works on invalid documents too. A blank value is ignored with a warning
    /// and `Ok(false)` is returned.
    pub fn set_identity_field(
        &self,
        doc: &mut ConfigDocument,
        field: IdentityField,
        value: &str,
    ) -> Result<bool> {
        if value.trim().is_empty() {
            warn!("Ignoring blank {} ({})", field.label(), field.flag());
            return Ok(false);
        }

        field.set(doc, value.to_string());
        self.save(doc)?;
        info!("Set {} to \"{}\"", field.label(), value);
        Ok(true)
    }
}
