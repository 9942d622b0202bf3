// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Local reverse-proxy sites with certificates from a local CA.
//!
//! ```rust,no_run
//! use localsites::{backend_for, ConfigStore, Paths, Provisioner, Settings, Site, SystemRunner};
//!
//! let store = ConfigStore::new(Paths::new()?);
//! let doc = store.load()?;
//! let runner = SystemRunner;
//! let backend = backend_for(doc.backend_kind(), &runner);
//!
//! let settings = Settings::from_config(&doc, store.paths())?;
//! let report = Provisioner::new(settings, backend.as_ref(), &runner)
//!     .provision(&Site::new("app.test", 3000, true)?)?;
//! println!("{}", report.site_config.display());
//! # Ok::<(), localsites::Error>(())
//! ```

/// Certificate backends (openssl CLI or in-process).
pub mod backend;
/// Certificate Authority management.
pub mod ca;
/// Leaf certificate issuance.
pub mod cert;
/// Configuration handling.
pub mod config;
/// Error types.
pub mod error;
/// Subprocess execution.
pub mod exec;
/// Filesystem utilities.
pub mod fs;
/// Provisioning pipeline.
pub mod pipeline;
/// Proxy reload.
pub mod reload;
/// Proxy site config rendering.
pub mod site;
/// Placeholder templates.
pub mod template;
/// X.509 certificate parsing.
pub mod x509;

pub use backend::{backend_for, BackendKind, CertBackend, NativeBackend, OpensslBackend};
pub use ca::{CaPaths, CaState, CaStatus, CertificateAuthority};
pub use cert::{validate_domain, CertificateIssuer, LeafPaths};
pub use config::{
    BootstrapOutcome, ConfigDocument, ConfigStore, Identity, IdentityField, Paths, Validation,
};
pub use error::{Error, Result};
pub use exec::{CommandOutput, CommandRunner, SystemRunner};
pub use pipeline::{ProvisionReport, Provisioner, ReloadOutcome, Settings, Stage};
pub use reload::ProxyReloader;
pub use site::{Site, SiteRenderer, SiteTemplates};
pub use template::{Placeholder, Template};
pub use x509::{parse_cert_file, parse_cert_pem, CertInfo};
