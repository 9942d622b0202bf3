// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Blocking subprocess execution.
//!
//! Everything that shells out (the `openssl` backend, the proxy reload) goes
//! through [`CommandRunner`] so tests can substitute a fake.

use crate::error::{Error, Result};
use std::process::{Command, Stdio};

/// Captured result of a finished command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub success: bool,
    /// Exit code, `None` if the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

pub trait CommandRunner {
    /// Run `program` with `args` and wait for it to exit.
    ///
    /// A non-zero exit is *not* an error here, only a failure to spawn is.
    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput>;
}

/// Runs commands on the host. Waits indefinitely for the child to exit.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        tracing::debug!(command = %display_command(program, args), "running");

        let output = Command::new(program)
            .args(args)
            // sudo may need to prompt
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::CommandNotFound {
                        command: program.to_string(),
                        hint: get_install_hint(program),
                    }
                } else {
                    Error::Command {
                        command: display_command(program, args),
                        stderr: e.to_string(),
                    }
                }
            })?;

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Run a command and turn a non-zero exit into [`Error::Command`].
pub fn run_checked(
    runner: &dyn CommandRunner,
    program: &str,
    args: &[String],
) -> Result<CommandOutput> {
    let output = runner.run(program, args)?;
    if !output.success {
        let mut stderr = output.stderr.trim().to_string();
        if stderr.is_empty() {
            stderr = match output.code {
                Some(code) => format!("exited with status {}", code),
                None => "terminated by signal".to_string(),
            };
        }
        return Err(Error::Command {
            command: display_command(program, args),
            stderr,
        });
    }
    Ok(output)
}

/// Render a command line for messages. Not meant to be fed back to a shell.
pub fn display_command(program: &str, args: &[String]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        if arg.is_empty() || arg.contains(char::is_whitespace) {
            line.push('"');
            line.push_str(arg);
            line.push('"');
        } else {
            line.push_str(arg);
        }
    }
    line
}

fn get_install_hint(command: &str) -> String {
    match command {
        "openssl" => {
            "Install OpenSSL (e.g. 'sudo apt install openssl'), or set \"cert_backend\": \"native\" in the config file."
                .to_string()
        }
        "sudo" => "Sudo is required to reload nginx. Install sudo or run as root.".to_string(),
        "nginx" => "Install nginx (e.g. 'sudo apt install nginx').".to_string(),
        _ => format!("Please install the '{}' command", command),
    }
}
