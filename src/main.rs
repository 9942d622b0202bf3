// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use clap::{CommandFactory, Parser};
use clap_complete::{generate, Shell};
use localsites::{
    backend_for, parse_cert_file, BootstrapOutcome, CaPaths, CaState, ConfigDocument,
    ConfigStore, Error, IdentityField, Paths, Provisioner, ReloadOutcome, Result, Settings, Site,
    SystemRunner,
};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "localsites")]
#[command(about = "Local nginx sites with HTTPS from your own certificate authority")]
#[command(version)]
#[command(after_help = "\
EXAMPLES:
    localsites --init                          # Create the config file
    localsites --an LocalDevCA --on Acme --cn \"Acme Dev\"
    localsites -d app.test -p 3000             # http://app.test -> localhost:3000
    localsites -d app.test -p 3000 --secure    # https://app.test with a local certificate
    localsites --status                        # Show config, CA and sites")]
struct Cli {
    /// Domain to serve
    #[arg(short, long)]
    domain: Option<String>,

    /// Local port the site proxies to
    #[arg(short, long, value_parser = clap::value_parser!(u16).range(1..))]
    port: Option<u16>,

    /// Serve over HTTPS with a certificate signed by the local CA
    #[arg(short, long)]
    secure: bool,

    /// Create the config file; `--init force` rewrites an existing one
    #[arg(long, value_name = "force", num_args = 0..=1, default_missing_value = "")]
    init: Option<String>,

    /// Set the certificate authority name
    #[arg(long = "an", value_name = "NAME")]
    authority_name: Option<String>,

    /// Set the organisation name
    #[arg(long = "on", value_name = "NAME")]
    organisation_name: Option<String>,

    /// Set the common name
    #[arg(long = "cn", value_name = "NAME")]
    common_name: Option<String>,

    /// Show config, CA and provisioned sites
    #[arg(long)]
    status: bool,

    /// Write the files but do not reload nginx
    #[arg(long)]
    no_reload: bool,

    /// Print shell completions
    #[arg(long, value_name = "SHELL")]
    completions: Option<Shell>,

    /// Only print warnings and errors
    #[arg(short, long)]
    quiet: bool,

    /// Show every command that is run
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,
}

impl Cli {
    fn identity_values(&self) -> Vec<(IdentityField, &str)> {
        [
            (IdentityField::AuthorityName, &self.authority_name),
            (IdentityField::OrganisationName, &self.organisation_name),
            (IdentityField::CommonName, &self.common_name),
        ]
        .into_iter()
        .filter_map(|(field, value)| value.as_deref().map(|v| (field, v)))
        .collect()
    }
}

/// Output helper that respects --quiet. Logs go to stderr, results to stdout.
#[derive(Clone, Copy)]
struct Output {
    quiet: bool,
}

impl Output {
    fn new(quiet: bool) -> Self {
        Self { quiet }
    }

    fn print(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg);
        }
    }
}

fn init_logging(quiet: bool, verbose: bool) {
    let default_level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .without_time()
        .with_target(false)
        .init();
}

fn main() {
    // Reset SIGPIPE to default behavior (exit) instead of panic
    #[cfg(unix)]
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);
    let out = Output::new(cli.quiet);

    if let Some(shell) = cli.completions {
        return cmd_completions(shell);
    }

    let store = ConfigStore::new(Paths::new()?);

    if let Some(arg) = &cli.init {
        return cmd_init(&store, parse_init_arg(arg)?, out);
    }

    let mut doc = store.load()?;

    let identity = cli.identity_values();
    if !identity.is_empty() {
        return cmd_set_identity(&store, &mut doc, &identity, out);
    }

    if cli.status {
        return cmd_status(&store, &doc, out);
    }

    cmd_provision(&store, &doc, &cli, out)
}

fn parse_init_arg(arg: &str) -> Result<bool> {
    match arg {
        "" => Ok(false),
        "force" => Ok(true),
        other => Err(Error::Usage(format!(
            "Unknown --init option '{}'. Use '--init' or '--init force'.",
            other
        ))),
    }
}

fn cmd_init(store: &ConfigStore, force: bool, out: Output) -> Result<()> {
    match store.bootstrap(force)? {
        BootstrapOutcome::Created => {
            out.print(&format!(
                "Config file created at {}",
                store.paths().config.display()
            ));
            out.print("Next, set the certificate authority identity:");
            for field in IdentityField::ALL {
                out.print(&format!("  {}", field.hint()));
            }
        }
        BootstrapOutcome::AlreadyExists => {
            out.print(&format!(
                "Config file kept at {}",
                store.paths().config.display()
            ));
        }
    }
    Ok(())
}

fn cmd_set_identity(
    store: &ConfigStore,
    doc: &mut ConfigDocument,
    values: &[(IdentityField, &str)],
    out: Output,
) -> Result<()> {
    let mut changed = false;
    for (field, value) in values {
        changed |= store.set_identity_field(doc, *field, value)?;
    }

    if changed {
        out.print(&format!("Config saved to {}", store.paths().config.display()));
    }

    let remaining = doc.validate();
    for field in remaining.invalid_fields() {
        tracing::warn!("No {} set yet. {}", field, field.hint());
    }
    Ok(())
}

fn cmd_provision(store: &ConfigStore, doc: &ConfigDocument, cli: &Cli, out: Output) -> Result<()> {
    let mut settings = Settings::from_config(doc, store.paths())?;
    if cli.no_reload {
        settings = settings.without_reload();
    }

    let domain = cli.domain.as_deref().ok_or_else(|| {
        Error::Usage("Missing domain. Use -d/--domain <domain> to choose one.".into())
    })?;
    let port = cli
        .port
        .ok_or_else(|| Error::Usage("Missing port. Use -p/--port <port> to choose one.".into()))?;
    let site = Site::new(domain, port, cli.secure)?;

    let runner = SystemRunner;
    let backend = backend_for(doc.backend_kind(), &runner);
    let report = Provisioner::new(settings, backend.as_ref(), &runner).provision(&site)?;

    let scheme = if site.secure { "https" } else { "http" };
    out.print(&format!(
        "{}://{} -> http://localhost:{}",
        scheme, site.domain, site.port
    ));
    out.print(&format!("  Config:      {}", report.site_config.display()));
    if let Some(leaf) = &report.leaf {
        out.print(&format!("  Certificate: {}", leaf.cert.display()));
        out.print(&format!("  Private key: {}", leaf.key.display()));
    }
    if let Some(ca) = report.ca.as_ref().filter(|ca| !ca.existed) {
        out.print(&format!(
            "  New CA:      {} (add it to your trust store)",
            ca.paths.crt.display()
        ));
    }
    match &report.reload {
        ReloadOutcome::Reloaded => out.print("  nginx reloaded"),
        ReloadOutcome::Skipped => out.print("  nginx not reloaded (--no-reload)"),
        ReloadOutcome::Failed(_) => {
            out.print("  nginx reload failed, the files are in place. Reload it by hand.")
        }
    }

    Ok(())
}

fn cmd_status(store: &ConfigStore, doc: &ConfigDocument, out: Output) -> Result<()> {
    let paths = store.paths();
    let validation = doc.validate();

    out.print("localsites status");
    out.print("=================");
    out.print("");
    out.print(&format!(
        "Config: {} ({})",
        paths.config.display(),
        if validation.is_valid() {
            "complete"
        } else {
            "incomplete"
        }
    ));
    if paths.dev {
        out.print("    Mode: development");
    }
    for field in IdentityField::ALL {
        if validation.invalid_fields().contains(&field) {
            out.print(&format!("    {}: not set. {}", field, field.hint()));
        }
    }
    out.print(&format!("    Backend: {}", doc.backend_kind()));

    let ssl = doc.ssl_dir(paths);
    let nginx = doc.nginx_dir(paths);
    out.print(&format!("SSL dir: {}", describe_dir(&ssl.path, ssl.is_default)));
    out.print(&format!(
        "Nginx dir: {}",
        describe_dir(&nginx.path, nginx.is_default)
    ));
    out.print("");

    out.print(&format!("CA: {}", describe_ca(doc, &ssl.path, paths.dev)));
    out.print("");

    out.print("Sites:");
    let sites = list_sites(&nginx.path)?;
    if sites.is_empty() {
        out.print("    (none)");
    }
    for (domain, conf) in sites {
        let cert = ssl.path.join(format!("{}.crt", domain));
        match parse_cert_file(&cert) {
            Ok(info) => out.print(&format!(
                "    {} (https, certificate expires: {}, {} days)",
                conf.display(),
                info.expiry_string(),
                info.days_remaining()
            )),
            Err(_) => out.print(&format!("    {}", conf.display())),
        }
    }

    Ok(())
}

fn describe_dir(path: &Path, is_default: bool) -> String {
    let mut line = path.display().to_string();
    if is_default {
        line.push_str(" (default)");
    }
    if !path.is_dir() {
        line.push_str(" (missing)");
    }
    line
}

fn describe_ca(doc: &ConfigDocument, ssl_dir: &Path, dev: bool) -> String {
    if doc
        .validate()
        .invalid_fields()
        .contains(&IdentityField::AuthorityName)
    {
        return "unknown (authority name not set)".into();
    }

    let paths = match CaPaths::new(ssl_dir, &doc.authority_name, dev) {
        Ok(p) => p,
        Err(e) => return e.to_string(),
    };

    match paths.state() {
        CaState::Absent => "not created yet (created with the first --secure site)".into(),
        CaState::Inconsistent { present, missing } => format!(
            "inconsistent ({} exists, {} is missing)",
            present.display(),
            missing.display()
        ),
        CaState::Present => match parse_cert_file(&paths.pem) {
            Ok(info) => format!(
                "{} (expires: {}, {} days)",
                paths.crt.display(),
                info.expiry_string(),
                info.days_remaining()
            ),
            Err(e) => format!("{} ({})", paths.crt.display(), e),
        },
    }
}

/// Rendered site configs, sorted by domain.
fn list_sites(nginx_dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    if !nginx_dir.is_dir() {
        return Ok(Vec::new());
    }

    let entries = std::fs::read_dir(nginx_dir).map_err(|e| Error::ReadDir {
        path: nginx_dir.to_path_buf(),
        source: e,
    })?;

    let mut sites = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(
                    "Could not read directory entry in {}: {}",
                    nginx_dir.display(),
                    e
                );
                continue;
            }
        };
        let path = entry.path();
        if path.extension().map(|e| e == "conf").unwrap_or(false) {
            if let Some(stem) = path.file_stem() {
                sites.push((stem.to_string_lossy().to_string(), path));
            }
        }
    }

    sites.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(sites)
}

fn cmd_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "localsites", &mut std::io::stdout());
    Ok(())
}
