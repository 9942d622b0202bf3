// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Single-pass provisioning of one site.
//!
//! Secure sites go through every [`Stage`]. Unsecure sites skip straight from
//! `Idle` to `SiteRendering` and never touch the CA. A failing stage stops the
//! run and files written by earlier stages stay on disk.

use crate::backend::CertBackend;
use crate::ca::{CaStatus, CertificateAuthority};
use crate::cert::{CertificateIssuer, LeafPaths, OPENSSL_CONF, OPENSSL_CONF_NAME};
use crate::config::{ConfigDocument, Identity, Paths};
use crate::error::{Error, Result};
use crate::exec::CommandRunner;
use crate::reload::ProxyReloader;
use crate::site::{Site, SiteRenderer, SiteTemplates};
use crate::template::Template;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    CaEnsuring,
    CertIssuing,
    SiteRendering,
    ProxyReloading,
    Done,
}

impl Stage {
    /// The stage after `self`, `None` once done.
    pub fn next(self, secure: bool) -> Option<Stage> {
        match self {
            Stage::Idle if secure => Some(Stage::CaEnsuring),
            Stage::Idle => Some(Stage::SiteRendering),
            Stage::CaEnsuring => Some(Stage::CertIssuing),
            Stage::CertIssuing => Some(Stage::SiteRendering),
            Stage::SiteRendering => Some(Stage::ProxyReloading),
            Stage::ProxyReloading => Some(Stage::Done),
            Stage::Done => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Idle => "idle",
            Stage::CaEnsuring => "ensuring the certificate authority",
            Stage::CertIssuing => "issuing the certificate",
            Stage::SiteRendering => "rendering the site config",
            Stage::ProxyReloading => "reloading the proxy",
            Stage::Done => "done",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    Reloaded,
    Skipped,
    /// The site files are in place but the proxy did not pick them up.
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct ProvisionReport {
    /// `None` for unsecure sites.
    pub ca: Option<CaStatus>,
    pub leaf: Option<LeafPaths>,
    pub site_config: PathBuf,
    pub reload: ReloadOutcome,
    /// Stages entered, in order.
    pub stages: Vec<Stage>,
}

/// Everything a run needs, resolved from the config once.
#[derive(Debug, Clone)]
pub struct Settings {
    pub identity: Identity,
    pub ssl_dir: PathBuf,
    pub nginx_dir: PathBuf,
    pub dev: bool,
    /// `None` skips the reload stage.
    pub reload_argv: Option<Vec<String>>,
    pub site_templates: SiteTemplates,
    pub extfile: Template,
}

impl Settings {
    /// Fails with [`Error::ConfigInvalid`] while identity fields are unset.
    pub fn from_config(doc: &ConfigDocument, paths: &Paths) -> Result<Self> {
        let identity = doc.identity()?;
        Ok(Self {
            identity,
            ssl_dir: doc.ssl_dir(paths).path,
            nginx_dir: doc.nginx_dir(paths).path,
            dev: paths.dev,
            reload_argv: Some(doc.reload_argv()),
            site_templates: SiteTemplates::load(&paths.templates)?,
            extfile: Template::with_override(&paths.templates, OPENSSL_CONF_NAME, OPENSSL_CONF)?,
        })
    }

    pub fn without_reload(mut self) -> Self {
        self.reload_argv = None;
        self
    }
}

pub struct Provisioner<'a> {
    settings: Settings,
    backend: &'a dyn CertBackend,
    runner: &'a dyn CommandRunner,
}

#[derive(Default)]
struct Progress {
    ca: Option<CaStatus>,
    leaf: Option<LeafPaths>,
    site_config: Option<PathBuf>,
    reload: Option<ReloadOutcome>,
    stages: Vec<Stage>,
}

impl<'a> Provisioner<'a> {
    pub fn new(
        settings: Settings,
        backend: &'a dyn CertBackend,
        runner: &'a dyn CommandRunner,
    ) -> Self {
        Self {
            settings,
            backend,
            runner,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn provision(&self, site: &Site) -> Result<ProvisionReport> {
        let mut progress = Progress::default();
        let mut stage = Stage::Idle;

        while let Some(next) = stage.next(site.secure) {
            stage = next;
            progress.stages.push(stage);
            debug!(domain = %site.domain, "{}", stage);

            if let Err(e) = self.run_stage(stage, site, &mut progress) {
                error!("Provisioning {} failed while {}", site.domain, stage);
                return Err(e);
            }
        }

        let site_config = progress
            .site_config
            .ok_or_else(|| Error::Config("site config was not rendered".into()))?;
        Ok(ProvisionReport {
            ca: progress.ca,
            leaf: progress.leaf,
            site_config,
            reload: progress.reload.unwrap_or(ReloadOutcome::Skipped),
            stages: progress.stages,
        })
    }

    fn run_stage(&self, stage: Stage, site: &Site, progress: &mut Progress) -> Result<()> {
        let s = &self.settings;
        match stage {
            Stage::Idle | Stage::Done => {}
            Stage::CaEnsuring => {
                let ca = CertificateAuthority::new(&s.identity, &s.ssl_dir, self.backend, s.dev);
                progress.ca = Some(ca.ensure()?);
            }
            Stage::CertIssuing => {
                let issuer = CertificateIssuer::new(&s.identity, &s.ssl_dir, self.backend, s.dev)
                    .with_extfile(s.extfile.clone());
                progress.leaf = Some(issuer.issue(&site.domain)?);
            }
            Stage::SiteRendering => {
                let renderer = SiteRenderer::new(&s.nginx_dir, s.site_templates.clone());
                progress.site_config = Some(renderer.render(site, progress.leaf.as_ref())?);
            }
            Stage::ProxyReloading => {
                progress.reload = Some(self.reload());
            }
        }
        Ok(())
    }

    /// Reload failures are reported, never fatal.
    fn reload(&self) -> ReloadOutcome {
        let Some(argv) = &self.settings.reload_argv else {
            return ReloadOutcome::Skipped;
        };
        match ProxyReloader::new(self.runner, argv.clone()).reload() {
            Ok(()) => ReloadOutcome::Reloaded,
            Err(e) => {
                warn!("{}", e);
                ReloadOutcome::Failed(e.to_string())
            }
        }
    }
}
