// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! `{{NAME}}` placeholder substitution that refuses to leave tokens behind.

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use std::path::Path;

static PLACEHOLDER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("invalid placeholder regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    Domain,
    TargetPort,
    CertificatePath,
    CertificateKeyPath,
}

impl Placeholder {
    pub fn name(self) -> &'static str {
        match self {
            Placeholder::Domain => "DOMAIN",
            Placeholder::TargetPort => "TARGET_PORT",
            Placeholder::CertificatePath => "CERTIFICATE_PATH",
            Placeholder::CertificateKeyPath => "CERTIFICATE_KEY_PATH",
        }
    }

    pub fn token(self) -> String {
        format!("{{{{{}}}}}", self.name())
    }
}

/// A named template source.
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    source: Cow<'static, str>,
}

impl Template {
    pub fn new(name: impl Into<String>, source: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }

    /// Load `<dir>/<name>` if it exists, otherwise use the packaged `fallback`.
    pub fn with_override(dir: &Path, name: &str, fallback: &'static str) -> Result<Self> {
        let path = dir.join(name);
        if path.is_file() {
            tracing::debug!(template = %path.display(), "using template override");
            let source = crate::fs::read_to_string(&path)?;
            return Ok(Self::new(path.display().to_string(), source));
        }
        Ok(Self::new(name, fallback))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Placeholder names used by the source, in order of first appearance.
    pub fn placeholders(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for caps in PLACEHOLDER_REGEX.captures_iter(&self.source) {
            let name = caps[1].to_string();
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    /// Substitute every bound placeholder.
    ///
    /// Fails with [`Error::TemplateRenderFailed`] if the source uses a
    /// placeholder that has no binding. Values are inserted verbatim and are
    /// never re-scanned.
    pub fn render(&self, bindings: &[(Placeholder, &str)]) -> Result<String> {
        let unresolved: Vec<String> = self
            .placeholders()
            .into_iter()
            .filter(|name| !bindings.iter().any(|(p, _)| p.name() == name.as_str()))
            .map(|name| format!("{{{{{}}}}}", name))
            .collect();

        if !unresolved.is_empty() {
            return Err(Error::TemplateRenderFailed {
                template: self.name.clone(),
                unresolved,
            });
        }

        let rendered = PLACEHOLDER_REGEX.replace_all(&self.source, |caps: &regex::Captures| {
            bindings
                .iter()
                .find(|(p, _)| p.name() == &caps[1])
                .map(|(_, value)| value.to_string())
                .unwrap_or_default()
        });

        Ok(rendered.into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_regex_compiles() {
        assert!(PLACEHOLDER_REGEX.is_match("{{DOMAIN}}"));
        assert!(PLACEHOLDER_REGEX.is_match("{{ TARGET_PORT }}"));
        assert!(!PLACEHOLDER_REGEX.is_match("{ DOMAIN }"));
    }

    #[test]
    fn test_token_format() {
        assert_eq!(Placeholder::Domain.token(), "{{DOMAIN}}");
        assert_eq!(
            Placeholder::CertificateKeyPath.token(),
            "{{CERTIFICATE_KEY_PATH}}"
        );
    }

    #[test]
    fn test_render_replaces_every_occurrence() {
        let template = Template::new(
            "t",
            "server_name {{DOMAIN}};\nreturn https://{{DOMAIN}}:{{TARGET_PORT}};",
        );
        let out = template
            .render(&[(Placeholder::Domain, "app.test"), (Placeholder::TargetPort, "3000")])
            .unwrap();
        assert_eq!(
            out,
            "server_name app.test;\nreturn https://app.test:3000;"
        );
    }

    #[test]
    fn test_render_fails_on_unbound_placeholder() {
        let template = Template::new(
            "nginx.unsecure.conf",
            "{{DOMAIN}} {{TARGET_PORT}} {{CERTIFICATE_PATH}} {{CERTIFICATE_PATH}}",
        );
        let err = template
            .render(&[(Placeholder::Domain, "a.test"), (Placeholder::TargetPort, "1")])
            .unwrap_err();
        match err {
            Error::TemplateRenderFailed {
                template,
                unresolved,
            } => {
                assert_eq!(template, "nginx.unsecure.conf");
                assert_eq!(unresolved, vec!["{{CERTIFICATE_PATH}}".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_render_fails_on_unknown_placeholder() {
        let template = Template::new("t", "{{DOMAIN}} {{UPSTREAM}}");
        assert!(template.render(&[(Placeholder::Domain, "a.test")]).is_err());
    }

    #[test]
    fn test_render_does_not_rescan_values() {
        let template = Template::new("t", "path {{CERTIFICATE_PATH}}");
        let out = template
            .render(&[(Placeholder::CertificatePath, "/odd/{{DOMAIN}}/x.crt")])
            .unwrap();
        assert_eq!(out, "path /odd/{{DOMAIN}}/x.crt");
    }

    #[test]
    fn test_unused_bindings_are_fine() {
        let template = Template::new("t", "{{DOMAIN}}");
        let out = template
            .render(&[(Placeholder::Domain, "a.test"), (Placeholder::TargetPort, "80")])
            .unwrap();
        assert_eq!(out, "a.test");
    }

    #[test]
    fn test_with_override_prefers_file() {
        let dir = tempfile::tempdir().unwrap();
        let t = Template::with_override(dir.path(), "nginx.secure.conf", "packaged").unwrap();
        assert_eq!(t.name(), "nginx.secure.conf");
        assert_eq!(t.render(&[]).unwrap(), "packaged");

        std::fs::write(dir.path().join("nginx.secure.conf"), "custom {{DOMAIN}}").unwrap();
        let t = Template::with_override(dir.path(), "nginx.secure.conf", "packaged").unwrap();
        assert_eq!(
            t.render(&[(Placeholder::Domain, "a.test")]).unwrap(),
            "custom a.test"
        );
    }
}
