// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Read back issued certificates without shelling out to openssl.

use crate::error::{Error, Result};
use std::path::Path;
use x509_parser::prelude::*;

#[derive(Debug, Clone)]
pub struct CertInfo {
    pub not_after_timestamp: i64,
    pub common_name: Option<String>,
    pub organisation: Option<String>,
    pub issuer_common_name: Option<String>,
    pub subject_alt_names: Vec<String>,
    pub is_ca: bool,
}

impl CertInfo {
    pub fn expiry_string(&self) -> String {
        match ::time::OffsetDateTime::from_unix_timestamp(self.not_after_timestamp) {
            Ok(dt) => format!("{}-{:02}-{:02}", dt.year(), dt.month() as u8, dt.day()),
            Err(_) => "Invalid date".to_string(),
        }
    }

    pub fn days_remaining(&self) -> i64 {
        let now = ::time::OffsetDateTime::now_utc();
        match ::time::OffsetDateTime::from_unix_timestamp(self.not_after_timestamp) {
            Ok(expiry) => (expiry - now).whole_days(),
            Err(_) => -1,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.days_remaining() < 0
    }
}

pub fn parse_cert_file(path: &Path) -> Result<CertInfo> {
    parse_cert_pem(&crate::fs::read_to_string(path)?)
}

fn first_string<'a, 'b: 'a>(
    mut values: impl Iterator<Item = &'a AttributeTypeAndValue<'b>>,
) -> Option<String> {
    values.next().and_then(|v| v.as_str().ok()).map(String::from)
}

pub fn parse_cert_pem(pem_str: &str) -> Result<CertInfo> {
    let pem = ::pem::parse(pem_str)
        .map_err(|e| Error::CertParse(format!("Failed to parse PEM: {}", e)))?;

    if pem.tag() != "CERTIFICATE" {
        return Err(Error::CertParse(format!(
            "Expected CERTIFICATE, got {}",
            pem.tag()
        )));
    }

    let (_, cert) = X509Certificate::from_der(pem.contents())
        .map_err(|e| Error::CertParse(format!("Invalid X.509: {}", e)))?;

    let mut subject_alt_names = Vec::new();
    let mut is_ca = false;

    for ext in cert.extensions() {
        match ext.parsed_extension() {
            ParsedExtension::SubjectAlternativeName(san) => {
                for name in &san.general_names {
                    match name {
                        GeneralName::DNSName(dns) => subject_alt_names.push(dns.to_string()),
                        GeneralName::IPAddress(bytes) => {
                            if let Ok(octets) = <[u8; 4]>::try_from(*bytes) {
                                subject_alt_names.push(std::net::Ipv4Addr::from(octets).to_string());
                            } else if let Ok(octets) = <[u8; 16]>::try_from(*bytes) {
                                subject_alt_names.push(std::net::Ipv6Addr::from(octets).to_string());
                            }
                        }
                        _ => {}
                    }
                }
            }
            ParsedExtension::BasicConstraints(bc) => {
                is_ca = bc.ca;
            }
            _ => {}
        }
    }

    Ok(CertInfo {
        not_after_timestamp: cert.validity().not_after.timestamp(),
        common_name: first_string(cert.subject().iter_common_name()),
        organisation: first_string(cert.subject().iter_organization()),
        issuer_common_name: first_string(cert.issuer().iter_common_name()),
        subject_alt_names,
        is_ca,
    })
}
