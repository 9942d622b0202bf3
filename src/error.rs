// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use crate::config::IdentityField;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("You need to create a config file ({}). Use 'localsites --init'.", .path.display())]
    ConfigMissing { path: PathBuf },

    #[error("Config file is not filled in. {}", describe_invalid(.fields))]
    ConfigInvalid { fields: Vec<IdentityField> },

    #[error("Failed to parse config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Certificate directory {path} is unavailable: {source}")]
    CaDirectoryUnavailable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(
        "Certificate Authority is in an inconsistent state: {} exists but {} is missing.\n\
         Restore the missing file or remove the leftover one to regenerate the CA.",
        .present.display(),
        .missing.display()
    )]
    CaStateInconsistent { present: PathBuf, missing: PathBuf },

    #[error("Certificate Authority creation failed: {0}")]
    CaIssuanceFailed(#[source] Box<Error>),

    #[error("Certificate generation for '{domain}' failed: {source}")]
    CertificateGenerationFailed {
        domain: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Template '{template}' has unresolved placeholders: {}", .unresolved.join(", "))]
    TemplateRenderFailed {
        template: String,
        unresolved: Vec<String>,
    },

    #[error("Proxy config directory {path} is unavailable: {source}")]
    ProxyDirUnavailable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Proxy reload failed: {command}\n{stderr}")]
    ProxyReloadFailed { command: String, stderr: String },

    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to remove {path}: {source}")]
    Remove {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Certificate generation failed: {0}")]
    CertGen(#[from] rcgen::Error),

    #[error("Failed to parse certificate: {0}")]
    CertParse(String),

    #[error("Invalid domain '{domain}': {reason}")]
    InvalidDomain { domain: String, reason: String },

    #[error("Invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Invalid path (non-UTF8): {0}")]
    InvalidPath(PathBuf),

    #[error("Command '{command}' not found.\n{hint}")]
    CommandNotFound { command: String, hint: String },

    #[error("Command failed: {command}\n{stderr}")]
    Command { command: String, stderr: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Usage(String),
}

fn describe_invalid(fields: &[IdentityField]) -> String {
    fields
        .iter()
        .map(|f| f.hint())
        .collect::<Vec<_>>()
        .join(" ")
}

pub type Result<T> = std::result::Result<T, Error>;
