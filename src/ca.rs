// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use crate::backend::{CaRequest, CertBackend, Subject};
use crate::config::Identity;
use crate::error::{Error, Result};
use crate::fs::ensure_dir;
use std::path::{Path, PathBuf};
use tracing::info;

/// Appended to CA file names in development mode.
pub const DEV_SUFFIX: &str = "__DEV__";

/// CA artifact locations inside the certificate store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaPaths {
    pub key: PathBuf,
    pub pem: PathBuf,
    pub crt: PathBuf,
    /// Serial store, named the way `openssl x509 -CAcreateserial` names it.
    pub serial: PathBuf,
}

impl CaPaths {
    pub fn new(ssl_dir: &Path, authority_name: &str, dev: bool) -> Result<Self> {
        validate_authority_name(authority_name)?;
        let base = if dev {
            format!("{}{}", authority_name, DEV_SUFFIX)
        } else {
            authority_name.to_string()
        };
        Ok(Self {
            key: ssl_dir.join(format!("{}.key", base)),
            pem: ssl_dir.join(format!("{}.pem", base)),
            crt: ssl_dir.join(format!("{}.crt", base)),
            serial: ssl_dir.join(format!("{}.srl", base)),
        })
    }

    /// Classify the key/PEM pair on disk.
    pub fn state(&self) -> CaState {
        match (self.key.exists(), self.pem.exists()) {
            (true, true) => CaState::Present,
            (false, false) => CaState::Absent,
            (true, false) => CaState::Inconsistent {
                present: self.key.clone(),
                missing: self.pem.clone(),
            },
            (false, true) => CaState::Inconsistent {
                present: self.pem.clone(),
                missing: self.key.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaState {
    Present,
    Absent,
    Inconsistent { present: PathBuf, missing: PathBuf },
}

/// The authority name becomes a file name, so it must stay a single path component.
fn validate_authority_name(name: &str) -> Result<()> {
    let reason = if name.trim().is_empty() {
        Some("must not be empty")
    } else if name.contains(['/', '\\', '\0']) {
        Some("must not contain path separators")
    } else if name.starts_with('.') {
        Some("must not start with '.'")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(Error::InvalidName {
            name: name.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

#[derive(Debug, Clone)]
pub struct CaStatus {
    /// The CA was already on disk and nothing was written.
    pub existed: bool,
    pub paths: CaPaths,
}

/// Creates the local CA on first use and leaves it alone afterwards.
pub struct CertificateAuthority<'a> {
    identity: &'a Identity,
    ssl_dir: &'a Path,
    backend: &'a dyn CertBackend,
    dev: bool,
}

impl<'a> CertificateAuthority<'a> {
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
        }
    }

    pub fn paths(&self) -> Result<CaPaths> {
        CaPaths::new(self.ssl_dir, &self.identity.authority_name, self.dev)
    }

    pub fn ensure(&self) -> Result<CaStatus> {
        let paths = self.paths()?;

        ensure_dir(self.ssl_dir).map_err(|e| Error::CaDirectoryUnavailable {
            path: self.ssl_dir.to_path_buf(),
            source: e,
        })?;

        match paths.state() {
            CaState::Present => {
                info!(
                    "CA key and PEM already exist. Skipping creation of {}",
                    self.identity.authority_name
                );
                return Ok(CaStatus {
                    existed: true,
                    paths,
                });
            }
            CaState::Inconsistent { present, missing } => {
                return Err(Error::CaStateInconsistent { present, missing });
            }
            CaState::Absent => {}
        }

        info!(
            "Creating Certificate Authority {} with {}",
            self.identity.authority_name,
            self.backend.name()
        );
        self.create(&paths)
            .map_err(|e| Error::CaIssuanceFailed(Box::new(e)))?;
        info!("Certificate Authority written to {}", paths.crt.display());

        Ok(CaStatus {
            existed: false,
            paths,
        })
    }

    fn create(&self, paths: &CaPaths) -> Result<()> {
        let subject = Subject::from_identity(self.identity);
        self.backend.create_self_signed_ca(&CaRequest {
            subject: &subject,
            key: &paths.key,
            pem: &paths.pem,
        })?;
        self.backend.export_certificate(&paths.pem, &paths.crt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{NativeBackend, SignRequest};
    use std::cell::Cell;
    use tempfile::TempDir;

    fn identity() -> Identity {
        Identity {
            authority_name: "LocalDevCA".into(),
            organisation_name: "Acme".into(),
            common_name: "Acme Dev".into(),
        }
    }

    /// Counts calls and fails the CA step on demand.
    #[derive(Default)]
    struct CountingBackend {
        created: Cell<u32>,
        fail: bool,
    }

    impl CertBackend for CountingBackend {
        fn create_self_signed_ca(&self, request: &CaRequest<'_>) -> Result<()> {
            self.created.set(self.created.get() + 1);
            if self.fail {
                return Err(Error::Command {
                    command: "openssl req -x509".into(),
                    stderr: "unable to load config".into(),
                });
            }
            std::fs::write(request.key, "key").unwrap();
            std::fs::write(request.pem, "pem").unwrap();
            Ok(())
        }

        fn export_certificate(&self, pem: &Path, crt: &Path) -> Result<()> {
            std::fs::copy(pem, crt).unwrap();
            Ok(())
        }

        fn create_signing_request(&self, _: &Subject, _: &Path, _: &Path) -> Result<()> {
            unreachable!()
        }

        fn sign_request(&self, _: &SignRequest<'_>) -> Result<()> {
            unreachable!()
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    #[test]
    fn test_ca_paths_naming() {
        let paths = CaPaths::new(Path::new("/ssl"), "LocalDevCA", false).unwrap();
        assert_eq!(paths.key, PathBuf::from("/ssl/LocalDevCA.key"));
        assert_eq!(paths.pem, PathBuf::from("/ssl/LocalDevCA.pem"));
        assert_eq!(paths.crt, PathBuf::from("/ssl/LocalDevCA.crt"));
        assert_eq!(paths.serial, PathBuf::from("/ssl/LocalDevCA.srl"));

        let dev = CaPaths::new(Path::new("/ssl"), "LocalDevCA", true).unwrap();
        assert_eq!(dev.key, PathBuf::from("/ssl/LocalDevCA__DEV__.key"));
        assert_eq!(dev.serial, PathBuf::from("/ssl/LocalDevCA__DEV__.srl"));
    }

    #[test]
    fn test_authority_name_must_be_a_file_name() {
        for bad in ["", "  ", "../etc", "a/b", "a\\b", ".hidden"] {
            assert!(
                matches!(
                    CaPaths::new(Path::new("/ssl"), bad, false),
                    Err(Error::InvalidName { .. })
                ),
                "{:?} should be rejected",
                bad
            );
        }
        assert!(CaPaths::new(Path::new("/ssl"), "Local Dev CA", false).is_ok());
    }

    #[test]
    fn test_ensure_creates_store_and_ca_once() {
        let dir = TempDir::new().unwrap();
        let ssl = dir.path().join("nested").join("ssl");
        let identity = identity();
        let backend = CountingBackend::default();
        let ca = CertificateAuthority::new(&identity, &ssl, &backend, false);

        let first = ca.ensure().unwrap();
        assert!(!first.existed);
        assert!(ssl.is_dir());
        assert!(first.paths.crt.exists());

        let second = ca.ensure().unwrap();
        assert!(second.existed);
        assert_eq!(second.paths, first.paths);
        assert_eq!(backend.created.get(), 1);
    }

    #[test]
    fn test_ensure_is_idempotent_on_disk() {
        let dir = TempDir::new().unwrap();
        let identity = identity();
        let backend = NativeBackend;
        let ca = CertificateAuthority::new(&identity, dir.path(), &backend, false);

        let status = ca.ensure().unwrap();
        let read = |p: &Path| std::fs::read(p).unwrap();
        let before = (
            read(&status.paths.key),
            read(&status.paths.pem),
            read(&status.paths.crt),
        );
        let mtime = std::fs::metadata(&status.paths.key).unwrap().modified().unwrap();

        assert!(ca.ensure().unwrap().existed);
        let after = (
            read(&status.paths.key),
            read(&status.paths.pem),
            read(&status.paths.crt),
        );
        assert_eq!(before, after);
        assert_eq!(
            std::fs::metadata(&status.paths.key).unwrap().modified().unwrap(),
            mtime
        );
    }

    #[test]
    fn test_ensure_reports_inconsistent_state() {
        let dir = TempDir::new().unwrap();
        let identity = identity();
        let backend = CountingBackend::default();
        let ca = CertificateAuthority::new(&identity, dir.path(), &backend, false);
        let paths = ca.paths().unwrap();

        std::fs::write(&paths.pem, "orphan").unwrap();
        match ca.ensure() {
            Err(Error::CaStateInconsistent { present, missing }) => {
                assert_eq!(present, paths.pem);
                assert_eq!(missing, paths.key);
            }
            other => panic!("expected CaStateInconsistent, got {:?}", other),
        }
        assert_eq!(backend.created.get(), 0);
        assert_eq!(std::fs::read_to_string(&paths.pem).unwrap(), "orphan");
    }

    #[test]
    fn test_ensure_wraps_backend_failure() {
        let dir = TempDir::new().unwrap();
        let identity = identity();
        let backend = CountingBackend {
            fail: true,
            ..Default::default()
        };
        let ca = CertificateAuthority::new(&identity, dir.path(), &backend, false);

        let err = ca.ensure().unwrap_err();
        assert!(matches!(err, Error::CaIssuanceFailed(_)));
        assert!(err.to_string().contains("unable to load config"));
    }

    #[cfg(unix)]
    #[test]
    fn test_ensure_store_unavailable() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "").unwrap();
        let ssl = blocker.join("ssl");
        let identity = identity();
        let backend = CountingBackend::default();
        let ca = CertificateAuthority::new(&identity, &ssl, &backend, false);

        assert!(matches!(
            ca.ensure(),
            Err(Error::CaDirectoryUnavailable { .. })
        ));
    }

    #[test]
    fn test_dev_mode_uses_separate_ca() {
        let dir = TempDir::new().unwrap();
        let identity = identity();
        let backend = CountingBackend::default();

        CertificateAuthority::new(&identity, dir.path(), &backend, false)
            .ensure()
            .unwrap();
        let dev = CertificateAuthority::new(&identity, dir.path(), &backend, true)
            .ensure()
            .unwrap();
        assert!(!dev.existed);
        assert!(dir.path().join("LocalDevCA__DEV__.pem").exists());
        assert_eq!(backend.created.get(), 2);
    }
}
