// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Reverse-proxy config rendering.

use crate::cert::{validate_domain, LeafPaths};
use crate::error::{Error, Result};
use crate::fs::{atomic_write, ensure_dir, path_to_str};
use crate::template::{Placeholder, Template};
use std::path::{Path, PathBuf};
use tracing::info;

pub const SECURE_TEMPLATE: &str = include_str!("../stubs/nginx.secure.conf");
pub const SECURE_TEMPLATE_NAME: &str = "nginx.secure.conf";
pub const UNSECURE_TEMPLATE: &str = include_str!("../stubs/nginx.unsecure.conf");
pub const UNSECURE_TEMPLATE_NAME: &str = "nginx.unsecure.conf";

/// One site to provision. Only the rendered config is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    pub domain: String,
    pub port: u16,
    pub secure: bool,
}

impl Site {
    pub fn new(domain: impl Into<String>, port: u16, secure: bool) -> Result<Self> {
        let domain = domain.into();
        validate_domain(&domain)?;
        if port == 0 {
            return Err(Error::Usage("Port must be between 1 and 65535".into()));
        }
        Ok(Self {
            domain,
            port,
            secure,
        })
    }

    pub fn config_file_name(&self) -> String {
        format!("{}.conf", self.domain)
    }
}

/// The secure and unsecure proxy templates.
#[derive(Debug, Clone)]
pub struct SiteTemplates {
    pub secure: Template,
    pub unsecure: Template,
}

impl SiteTemplates {
    pub fn packaged() -> Self {
        Self {
            secure: Template::new(SECURE_TEMPLATE_NAME, SECURE_TEMPLATE),
            unsecure: Template::new(UNSECURE_TEMPLATE_NAME, UNSECURE_TEMPLATE),
        }
    }

    /// Packaged templates, replaced by same-named files in `dir` when present.
    pub fn load(dir: &Path) -> Result<Self> {
        Ok(Self {
            secure: Template::with_override(dir, SECURE_TEMPLATE_NAME, SECURE_TEMPLATE)?,
            unsecure: Template::with_override(dir, UNSECURE_TEMPLATE_NAME, UNSECURE_TEMPLATE)?,
        })
    }

    fn select(&self, secure: bool) -> &Template {
        if secure {
            &self.secure
        } else {
            &self.unsecure
        }
    }
}

pub struct SiteRenderer<'a> {
    nginx_dir: &'a Path,
    templates: SiteTemplates,
}

impl<'a> SiteRenderer<'a> {
    pub fn new(nginx_dir: &'a Path, templates: SiteTemplates) -> Self {
        Self {
            nginx_dir,
            templates,
        }
    }

    /// Render the site's config and write it to `<nginx_dir>/<domain>.conf`,
    /// replacing any previous file.
    ///
    /// Certificate placeholders are only bound for secure sites. A template
    /// that still needs them fails with [`Error::TemplateRenderFailed`].
    pub fn render(&self, site: &Site, leaf: Option<&LeafPaths>) -> Result<PathBuf> {
        let port = site.port.to_string();
        let mut bindings = vec![
            (Placeholder::Domain, site.domain.as_str()),
            (Placeholder::TargetPort, port.as_str()),
        ];
        if site.secure {
            if let Some(leaf) = leaf {
                bindings.push((Placeholder::CertificatePath, path_to_str(&leaf.cert)?));
                bindings.push((Placeholder::CertificateKeyPath, path_to_str(&leaf.key)?));
            }
        }

        let rendered = self.templates.select(site.secure).render(&bindings)?;

        ensure_dir(self.nginx_dir).map_err(|e| Error::ProxyDirUnavailable {
            path: self.nginx_dir.to_path_buf(),
            source: e,
        })?;

        let path = self.nginx_dir.join(site.config_file_name());
        atomic_write(&path, rendered.as_bytes())?;
        info!("Site config written to {}", path.display());

        Ok(path)
    }
}
