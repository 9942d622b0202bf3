// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use crate::backend::{CertBackend, SignRequest, Subject};
use crate::ca::CaPaths;
use crate::config::Identity;
use crate::error::{Error, Result};
use crate::fs::{atomic_write, remove_if_exists};
use crate::template::{Placeholder, Template};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Packaged extension file carrying the subjectAltName section.
pub const OPENSSL_CONF: &str = include_str!("../stubs/openssl.conf");
pub const OPENSSL_CONF_NAME: &str = "openssl.conf";

/// Maximum DNS name length per RFC 1035
const MAX_DNS_NAME_LENGTH: usize = 253;
const MAX_LABEL_LENGTH: usize = 63;

/// Check that `domain` is a hostname that is also safe to use as a file name.
pub fn validate_domain(domain: &str) -> Result<()> {
    let invalid = |reason: &str| {
        Err(Error::InvalidDomain {
            domain: domain.to_string(),
            reason: reason.to_string(),
        })
    };

    if domain.is_empty() {
        return invalid("Domain must not be empty");
    }
    if domain.len() > MAX_DNS_NAME_LENGTH {
        return invalid("DNS name exceeds maximum length of 253 characters");
    }

    for label in domain.split('.') {
        if label.is_empty() {
            return invalid("Empty label");
        }
        if label.len() > MAX_LABEL_LENGTH {
            return invalid("Label exceeds 63 characters");
        }
        if label.starts_with('-') || label.ends_with('-') {
            return invalid("Labels must not start or end with '-'");
        }
        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return invalid("Only letters, digits, '-' and '.' are allowed");
        }
    }

    Ok(())
}

/// Leaf key and certificate issued for one domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

impl LeafPaths {
    pub fn new(ssl_dir: &Path, domain: &str) -> Self {
        Self {
            cert: ssl_dir.join(format!("{}.crt", domain)),
            key: ssl_dir.join(format!("{}.key", domain)),
        }
    }
}

/// A file that is removed when the guard goes out of scope, whatever happened in between.
struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    fn create(path: PathBuf, contents: &str) -> Result<Self> {
        atomic_write(&path, contents.as_bytes())?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Err(e) = remove_if_exists(&self.path) {
            warn!("{}", e);
        }
    }
}

/// Issues per-domain leaf certificates signed by the local CA.
pub struct CertificateIssuer<'a> {
    identity: &'a Identity,
    ssl_dir: &'a Path,
    backend: &'a dyn CertBackend,
    dev: bool,
    extfile: Template,
}

impl<'a> CertificateIssuer<'a> {
    pub fn new(
        identity: &'a Identity,
        ssl_dir: &'a Path,
        backend: &'a dyn CertBackend,
        dev: bool,
    ) -> Self {
        Self {
            identity,
            ssl_dir,
            backend,
            dev,
            extfile: Template::new(OPENSSL_CONF_NAME, OPENSSL_CONF),
        }
    }

    /// Use a different extension file template.
    pub fn with_extfile(mut self, template: Template) -> Self {
        self.extfile = template;
        self
    }

    /// Generate a fresh key and certificate for `domain`, replacing any previous pair.
    pub fn issue(&self, domain: &str) -> Result<LeafPaths> {
        validate_domain(domain)?;
        let ca = CaPaths::new(self.ssl_dir, &self.identity.authority_name, self.dev)?;
        let extfile = self.extfile.render(&[(Placeholder::Domain, domain)])?;

        info!("Creating certificate for {}", domain);
        let leaf = LeafPaths::new(self.ssl_dir, domain);
        self.sign(domain, &ca, &leaf, &extfile)
            .map_err(|e| Error::CertificateGenerationFailed {
                domain: domain.to_string(),
                source: Box::new(e),
            })?;
        info!("Certificate written to {}", leaf.cert.display());

        Ok(leaf)
    }

    fn sign(&self, domain: &str, ca: &CaPaths, leaf: &LeafPaths, extfile: &str) -> Result<()> {
        let scratch =
            ScratchFile::create(self.ssl_dir.join(format!(".{}.san.cnf", domain)), extfile)?;
        let csr = self.ssl_dir.join(format!("{}.csr", domain));
        let subject = Subject::from_identity(self.identity);

        self.backend
            .create_signing_request(&subject, &leaf.key, &csr)?;
        self.backend.sign_request(&SignRequest {
            csr: &csr,
            ca_pem: &ca.pem,
            ca_key: &ca.key,
            serial: &ca.serial,
            extfile: scratch.path(),
            cert_out: &leaf.cert,
        })
    }
}
