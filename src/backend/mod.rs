// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! X.509 operations behind one trait.
//!
//! The CA and issuer only speak [`CertBackend`]. [`OpensslBackend`] shells out
//! to the `openssl` CLI, [`NativeBackend`] produces the same files in-process
//! with `rcgen`.

mod native;
mod openssl;

pub use native::NativeBackend;
pub use openssl::OpensslBackend;

use crate::config::Identity;
use crate::error::Result;
use crate::exec::CommandRunner;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Country written into every subject.
pub const COUNTRY: &str = "GB";
/// RSA key size used by the openssl backend.
pub const KEY_BITS: u32 = 2048;
/// Validity of both the CA and leaf certificates.
pub const VALIDITY_DAYS: u32 = 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Openssl,
    Native,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            BackendKind::Openssl => "openssl",
            BackendKind::Native => "native",
        })
    }
}

/// Distinguished name shared by the CA and leaf certificates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub country: String,
    pub organisation: String,
    pub common_name: String,
}

impl Subject {
    pub fn from_identity(identity: &Identity) -> Self {
        Self {
            country: COUNTRY.to_string(),
            organisation: identity.organisation_name.clone(),
            common_name: identity.common_name.clone(),
        }
    }

    /// `/C=../O=../CN=..` as accepted by `openssl req -subj`.
    pub fn openssl_subj(&self) -> String {
        format!(
            "/C={}/O={}/CN={}",
            escape_rdn(&self.country),
            escape_rdn(&self.organisation),
            escape_rdn(&self.common_name)
        )
    }
}

fn escape_rdn(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '/' | '+') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Files produced when creating a CA.
#[derive(Debug, Clone, Copy)]
pub struct CaRequest<'a> {
    pub subject: &'a Subject,
    pub key: &'a Path,
    pub pem: &'a Path,
}

/// Inputs and output of signing a leaf CSR with the CA.
#[derive(Debug, Clone, Copy)]
pub struct SignRequest<'a> {
    pub csr: &'a Path,
    pub ca_pem: &'a Path,
    pub ca_key: &'a Path,
    /// Serial number store next to the CA, created on first use.
    pub serial: &'a Path,
    /// Extension file carrying the subjectAltName section.
    pub extfile: &'a Path,
    pub cert_out: &'a Path,
}

pub trait CertBackend {
    /// Write a new key and self-signed CA certificate (PEM).
    fn create_self_signed_ca(&self, request: &CaRequest<'_>) -> Result<()>;

    /// Write the plain certificate artifact derived from the CA PEM.
    fn export_certificate(&self, pem: &Path, crt: &Path) -> Result<()>;

    /// Write a new key and a certificate signing request for it.
    fn create_signing_request(&self, subject: &Subject, key: &Path, csr: &Path) -> Result<()>;

    /// Sign a CSR with the CA, bumping the CA serial store.
    fn sign_request(&self, request: &SignRequest<'_>) -> Result<()>;

    fn name(&self) -> &'static str;
}

/// Build the backend selected in the config.
pub fn backend_for<'a>(kind: BackendKind, runner: &'a dyn CommandRunner) -> Box<dyn CertBackend + 'a> {
    match kind {
        BackendKind::Openssl => Box::new(OpensslBackend::new(runner)),
        BackendKind::Native => Box::new(NativeBackend),
    }
}
