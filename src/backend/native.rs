// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use super::{CaRequest, CertBackend, SignRequest, Subject, VALIDITY_DAYS};
use crate::error::{Error, Result};
use crate::fs::{atomic_write, atomic_write_secret, read_to_string};
use rcgen::{
    BasicConstraints, CertificateParams, CertificateSigningRequestParams, DistinguishedName,
    DnType, ExtendedKeyUsagePurpose, IsCa, Issuer, KeyPair, KeyUsagePurpose, SanType,
    SerialNumber,
};
use std::net::IpAddr;
use std::path::Path;

/// In-process backend built on `rcgen`.
///
/// Keys are ECDSA P-256 signed with SHA-256, the file layout and serial store
/// match the openssl backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeBackend;

fn subject_params(subject: &Subject) -> CertificateParams {
    let mut params = CertificateParams::default();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CountryName, subject.country.as_str());
    dn.push(DnType::OrganizationName, subject.organisation.as_str());
    dn.push(DnType::CommonName, subject.common_name.as_str());
    params.distinguished_name = dn;
    params
}

fn set_validity(params: &mut CertificateParams, days: u32) {
    let now = time::OffsetDateTime::now_utc();
    params.not_before = now;
    params.not_after = now + time::Duration::days(days as i64);
}

impl CertBackend for NativeBackend {
    fn create_self_signed_ca(&self, request: &CaRequest<'_>) -> Result<()> {
        let key_pair = KeyPair::generate()?;

        let mut params = subject_params(request.subject);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        set_validity(&mut params, VALIDITY_DAYS);

        let cert = params.self_signed(&key_pair)?;

        atomic_write_secret(request.key, key_pair.serialize_pem().as_bytes())?;
        atomic_write(request.pem, cert.pem().as_bytes())?;
        Ok(())
    }

    fn export_certificate(&self, pem: &Path, crt: &Path) -> Result<()> {
        let content = read_to_string(pem)?;
        let parsed = ::pem::parse(&content)
            .map_err(|e| Error::CertParse(format!("Failed to parse PEM: {}", e)))?;

        if parsed.tag() != "CERTIFICATE" {
            return Err(Error::CertParse(format!(
                "Expected CERTIFICATE in {}, got {}",
                pem.display(),
                parsed.tag()
            )));
        }

        let config = ::pem::EncodeConfig::new().set_line_ending(::pem::LineEnding::LF);
        atomic_write(crt, ::pem::encode_config(&parsed, config).as_bytes())
    }

    fn create_signing_request(&self, subject: &Subject, key: &Path, csr: &Path) -> Result<()> {
        let key_pair = KeyPair::generate()?;
        let request = subject_params(subject).serialize_request(&key_pair)?;

        atomic_write_secret(key, key_pair.serialize_pem().as_bytes())?;
        atomic_write(csr, request.pem()?.as_bytes())?;
        Ok(())
    }

    fn sign_request(&self, request: &SignRequest<'_>) -> Result<()> {
        let csr_pem = read_to_string(request.csr)?;
        let csr = CertificateSigningRequestParams::from_pem(&csr_pem)?;

        let alt_names = read_alt_names(&read_to_string(request.extfile)?)?;
        if alt_names.is_empty() {
            return Err(Error::Config(format!(
                "No subjectAltName entries in {}",
                request.extfile.display()
            )));
        }

        let mut params = csr.params;
        params.subject_alt_names = alt_names;
        params.is_ca = IsCa::ExplicitNoCa;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::ContentCommitment,
            KeyUsagePurpose::KeyEncipherment,
            KeyUsagePurpose::DataEncipherment,
        ];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        params.use_authority_key_identifier_extension = true;
        params.serial_number = Some(SerialNumber::from_slice(&next_serial(request.serial)?));
        set_validity(&mut params, VALIDITY_DAYS);

        let ca_pem = read_to_string(request.ca_pem)?;
        let ca_key = KeyPair::from_pem(&read_to_string(request.ca_key)?)?;
        let issuer = Issuer::from_ca_cert_pem(&ca_pem, ca_key)?;

        let csr = CertificateSigningRequestParams {
            params,
            public_key: csr.public_key,
        };
        let cert = csr.signed_by(&issuer)?;

        atomic_write(request.cert_out, cert.pem().as_bytes())
    }

    fn name(&self) -> &'static str {
        "native"
    }
}

/// Collect `DNS.n = ..` and `IP.n = ..` entries from an openssl extension file.
fn read_alt_names(extfile: &str) -> Result<Vec<SanType>> {
    let mut names = Vec::new();

    for line in extfile.lines() {
        let line = line.split('#').next().unwrap_or("").trim();
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let (key, value) = (key.trim(), value.trim());

        if key.starts_with("DNS.") {
            names.push(SanType::DnsName(value.to_string().try_into().map_err(
                |_| Error::InvalidDomain {
                    domain: value.to_string(),
                    reason: "Invalid DNS name".into(),
                },
            )?));
        } else if key.starts_with("IP.") {
            let ip: IpAddr = value.parse().map_err(|_| Error::InvalidDomain {
                domain: value.to_string(),
                reason: "Invalid IP address".into(),
            })?;
            names.push(SanType::IpAddress(ip));
        }
    }

    Ok(names)
}

/// Read the last serial from the store, bump it and write it back.
/// A missing store starts from a random serial.
fn next_serial(path: &Path) -> Result<Vec<u8>> {
    let next = match std::fs::read_to_string(path) {
        Ok(current) => increment_hex(current.trim()).ok_or_else(|| {
            Error::Config(format!("Serial file {} is not valid hex", path.display()))
        })?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            // Top bit clear keeps the DER integer positive
            let random: u64 = rand::Rng::random(&mut rand::rng());
            format!("{:016X}", random >> 1)
        }
        Err(e) => {
            return Err(Error::ReadFile {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    atomic_write(path, format!("{}\n", next).as_bytes())?;
    hex_to_bytes(&next).ok_or_else(|| Error::Config(format!("Invalid serial {}", next)))
}

/// Add one to an arbitrarily long hex number. Output is uppercase with an
/// even number of digits.
fn increment_hex(hex: &str) -> Option<String> {
    if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    let mut digits: Vec<u32> = hex.chars().filter_map(|c| c.to_digit(16)).collect();
    let mut carry = true;
    for digit in digits.iter_mut().rev() {
        if !carry {
            break;
        }
        if *digit == 15 {
            *digit = 0;
        } else {
            *digit += 1;
            carry = false;
        }
    }
    if carry {
        digits.insert(0, 1);
    }
    if digits.len() % 2 == 1 {
        digits.insert(0, 0);
    }

    digits
        .into_iter()
        .map(|d| std::char::from_digit(d, 16).map(|c| c.to_ascii_uppercase()))
        .collect()
}

fn hex_to_bytes(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 == 1 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| hex.get(i..i + 2).and_then(|b| u8::from_str_radix(b, 16).ok()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::COUNTRY;
    use crate::x509::parse_cert_file;
    use tempfile::TempDir;

    fn subject() -> Subject {
        Subject {
            country: COUNTRY.into(),
            organisation: "Acme".into(),
            common_name: "Acme Dev".into(),
        }
    }

    #[test]
    fn test_increment_hex() {
        assert_eq!(increment_hex("01").as_deref(), Some("02"));
        assert_eq!(increment_hex("0F").as_deref(), Some("10"));
        assert_eq!(increment_hex("ff").as_deref(), Some("0100"));
        assert_eq!(increment_hex("1A2B").as_deref(), Some("1A2C"));
        assert_eq!(increment_hex("7").as_deref(), Some("08"));
        assert_eq!(increment_hex(""), None);
        assert_eq!(increment_hex("xyz"), None);
    }

    #[test]
    fn test_hex_to_bytes() {
        assert_eq!(hex_to_bytes("0100"), Some(vec![1, 0]));
        assert_eq!(hex_to_bytes("ABC"), None);
    }

    #[test]
    fn test_read_alt_names() {
        let ext = "subjectAltName = @alt_names\n\n[alt_names]\nDNS.1 = app.test # main\nIP.1 = 127.0.0.1\n";
        let names = read_alt_names(ext).unwrap();
        assert_eq!(names.len(), 2);
        assert!(matches!(names[0], SanType::DnsName(_)));
        assert!(matches!(names[1], SanType::IpAddress(_)));
    }

    #[test]
    fn test_next_serial_creates_then_increments() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("LocalDevCA.srl");

        let first = next_serial(&path).unwrap();
        assert!(first[0] < 0x80);
        let stored = std::fs::read_to_string(&path).unwrap();

        let second = next_serial(&path).unwrap();
        let expected = increment_hex(stored.trim()).unwrap();
        assert_eq!(second, hex_to_bytes(&expected).unwrap());
    }

    #[test]
    fn test_ca_then_leaf_signed_by_ca() {
        let dir = TempDir::new().unwrap();
        let d = dir.path();
        let subject = subject();
        let backend = NativeBackend;

        backend
            .create_self_signed_ca(&CaRequest {
                subject: &subject,
                key: &d.join("ca.key"),
                pem: &d.join("ca.pem"),
            })
            .unwrap();
        backend
            .export_certificate(&d.join("ca.pem"), &d.join("ca.crt"))
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(d.join("ca.pem")).unwrap(),
            std::fs::read_to_string(d.join("ca.crt")).unwrap()
        );

        backend
            .create_signing_request(&subject, &d.join("app.test.key"), &d.join("app.test.csr"))
            .unwrap();
        std::fs::write(d.join("san.cnf"), "[alt_names]\nDNS.1 = app.test\n").unwrap();
        backend
            .sign_request(&SignRequest {
                csr: &d.join("app.test.csr"),
                ca_pem: &d.join("ca.pem"),
                ca_key: &d.join("ca.key"),
                serial: &d.join("ca.srl"),
                extfile: &d.join("san.cnf"),
                cert_out: &d.join("app.test.crt"),
            })
            .unwrap();

        let ca = parse_cert_file(&d.join("ca.crt")).unwrap();
        assert!(ca.is_ca);
        assert_eq!(ca.common_name.as_deref(), Some("Acme Dev"));
        assert_eq!(ca.organisation.as_deref(), Some("Acme"));

        let leaf = parse_cert_file(&d.join("app.test.crt")).unwrap();
        assert!(!leaf.is_ca);
        assert_eq!(leaf.issuer_common_name.as_deref(), Some("Acme Dev"));
        assert_eq!(leaf.subject_alt_names, vec!["app.test".to_string()]);
        assert!(leaf.days_remaining() >= 1022);
        assert!(d.join("ca.srl").exists());
    }

    #[test]
    fn test_sign_request_requires_alt_names() {
        let dir = TempDir::new().unwrap();
        let d = dir.path();
        let subject = subject();
        let backend = NativeBackend;
        backend
            .create_self_signed_ca(&CaRequest {
                subject: &subject,
                key: &d.join("ca.key"),
                pem: &d.join("ca.pem"),
            })
            .unwrap();
        backend
            .create_signing_request(&subject, &d.join("x.key"), &d.join("x.csr"))
            .unwrap();
        std::fs::write(d.join("san.cnf"), "basicConstraints=CA:FALSE\n").unwrap();

        let result = backend.sign_request(&SignRequest {
            csr: &d.join("x.csr"),
            ca_pem: &d.join("ca.pem"),
            ca_key: &d.join("ca.key"),
            serial: &d.join("ca.srl"),
            extfile: &d.join("san.cnf"),
            cert_out: &d.join("x.crt"),
        });
        assert!(result.is_err());
        assert!(!d.join("x.crt").exists());
    }

    #[test]
    fn test_export_rejects_non_certificate() {
        let dir = TempDir::new().unwrap();
        let key = dir.path().join("ca.key");
        std::fs::write(&key, KeyPair::generate().unwrap().serialize_pem()).unwrap();
        assert!(NativeBackend
            .export_certificate(&key, &dir.path().join("ca.crt"))
            .is_err());
    }
}
