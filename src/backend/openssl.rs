// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use super::{CaRequest, CertBackend, SignRequest, Subject, KEY_BITS, VALIDITY_DAYS};
use crate::error::Result;
use crate::exec::{run_checked, CommandRunner};
use crate::fs::path_to_str;
use std::path::Path;

const OPENSSL: &str = "openssl";

/// Runs the `openssl` CLI. Arguments are passed as an argv vector, never
/// through a shell.
pub struct OpensslBackend<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> OpensslBackend<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    fn openssl(&self, args: Vec<String>) -> Result<()> {
        run_checked(self.runner, OPENSSL, &args)?;
        Ok(())
    }
}

fn arg(path: &Path) -> Result<String> {
    Ok(path_to_str(path)?.to_string())
}

impl CertBackend for OpensslBackend<'_> {
    fn create_self_signed_ca(&self, request: &CaRequest<'_>) -> Result<()> {
        self.openssl(vec![
            "req".into(),
            "-x509".into(),
            "-nodes".into(),
            "-new".into(),
            "-sha256".into(),
            "-days".into(),
            VALIDITY_DAYS.to_string(),
            "-newkey".into(),
            format!("rsa:{}", KEY_BITS),
            "-keyout".into(),
            arg(request.key)?,
            "-out".into(),
            arg(request.pem)?,
            "-subj".into(),
            request.subject.openssl_subj(),
        ])
    }

    fn export_certificate(&self, pem: &Path, crt: &Path) -> Result<()> {
        self.openssl(vec![
            "x509".into(),
            "-outform".into(),
            "pem".into(),
            "-in".into(),
            arg(pem)?,
            "-out".into(),
            arg(crt)?,
        ])
    }

    fn create_signing_request(&self, subject: &Subject, key: &Path, csr: &Path) -> Result<()> {
        self.openssl(vec![
            "req".into(),
            "-new".into(),
            "-nodes".into(),
            "-newkey".into(),
            format!("rsa:{}", KEY_BITS),
            "-keyout".into(),
            arg(key)?,
            "-out".into(),
            arg(csr)?,
            "-subj".into(),
            subject.openssl_subj(),
        ])
    }

    fn sign_request(&self, request: &SignRequest<'_>) -> Result<()> {
        // openssl keeps the serial in <ca>.srl on its own; request.serial names the same file
        self.openssl(vec![
            "x509".into(),
            "-req".into(),
            "-sha256".into(),
            "-days".into(),
            VALIDITY_DAYS.to_string(),
            "-in".into(),
            arg(request.csr)?,
            "-CA".into(),
            arg(request.ca_pem)?,
            "-CAkey".into(),
            arg(request.ca_key)?,
            "-CAcreateserial".into(),
            "-extfile".into(),
            arg(request.extfile)?,
            "-out".into(),
            arg(request.cert_out)?,
        ])
    }

    fn name(&self) -> &'static str {
        "openssl"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::COUNTRY;
    use crate::error::Error;
    use crate::exec::CommandOutput;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<Vec<String>>>,
        fail: bool,
    }

    impl CommandRunner for Recorder {
        fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
            let mut call = vec![program.to_string()];
            call.extend(args.iter().cloned());
            self.calls.borrow_mut().push(call);
            Ok(CommandOutput {
                success: !self.fail,
                code: Some(if self.fail { 1 } else { 0 }),
                stdout: String::new(),
                stderr: if self.fail { "boom".into() } else { String::new() },
            })
        }
    }

    fn subject() -> Subject {
        Subject {
            country: COUNTRY.into(),
            organisation: "Acme".into(),
            common_name: "Acme Dev".into(),
        }
    }

    #[test]
    fn test_ca_command_line() {
        let runner = Recorder::default();
        let backend = OpensslBackend::new(&runner);
        let subject = subject();
        backend
            .create_self_signed_ca(&CaRequest {
                subject: &subject,
                key: Path::new("/ssl/LocalDevCA.key"),
                pem: Path::new("/ssl/LocalDevCA.pem"),
            })
            .unwrap();
        backend
            .export_certificate(
                Path::new("/ssl/LocalDevCA.pem"),
                Path::new("/ssl/LocalDevCA.crt"),
            )
            .unwrap();

        let calls = runner.calls.borrow();
        assert_eq!(
            calls[0].join(" "),
            "openssl req -x509 -nodes -new -sha256 -days 1024 -newkey rsa:2048 \
             -keyout /ssl/LocalDevCA.key -out /ssl/LocalDevCA.pem -subj /C=GB/O=Acme/CN=Acme Dev"
        );
        assert_eq!(
            calls[1].join(" "),
            "openssl x509 -outform pem -in /ssl/LocalDevCA.pem -out /ssl/LocalDevCA.crt"
        );
    }

    #[test]
    fn test_leaf_command_lines() {
        let runner = Recorder::default();
        let backend = OpensslBackend::new(&runner);
        backend
            .create_signing_request(
                &subject(),
                Path::new("/ssl/app.test.key"),
                Path::new("/ssl/app.test.csr"),
            )
            .unwrap();
        backend
            .sign_request(&SignRequest {
                csr: Path::new("/ssl/app.test.csr"),
                ca_pem: Path::new("/ssl/LocalDevCA.pem"),
                ca_key: Path::new("/ssl/LocalDevCA.key"),
                serial: Path::new("/ssl/LocalDevCA.srl"),
                extfile: Path::new("/ssl/.app.test.san.cnf"),
                cert_out: Path::new("/ssl/app.test.crt"),
            })
            .unwrap();

        let calls = runner.calls.borrow();
        assert_eq!(
            calls[0].join(" "),
            "openssl req -new -nodes -newkey rsa:2048 -keyout /ssl/app.test.key \
             -out /ssl/app.test.csr -subj /C=GB/O=Acme/CN=Acme Dev"
        );
        assert_eq!(
            calls[1].join(" "),
            "openssl x509 -req -sha256 -days 1024 -in /ssl/app.test.csr -CA /ssl/LocalDevCA.pem \
             -CAkey /ssl/LocalDevCA.key -CAcreateserial -extfile /ssl/.app.test.san.cnf \
             -out /ssl/app.test.crt"
        );
    }

    #[test]
    fn test_failure_surfaces_stderr() {
        let runner = Recorder {
            fail: true,
            ..Default::default()
        };
        let backend = OpensslBackend::new(&runner);
        let err = backend
            .export_certificate(Path::new("/a.pem"), Path::new("/a.crt"))
            .unwrap_err();
        match err {
            Error::Command { stderr, .. } => assert_eq!(stderr, "boom"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
