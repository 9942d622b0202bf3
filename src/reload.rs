// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use crate::error::{Error, Result};
use crate::exec::{display_command, run_checked, CommandRunner};
use tracing::info;

/// Sends the reload signal to the running proxy.
pub struct ProxyReloader<'a> {
    runner: &'a dyn CommandRunner,
    argv: Vec<String>,
}

impl<'a> ProxyReloader<'a> {
    pub fn new(runner: &'a dyn CommandRunner, argv: Vec<String>) -> Self {
        Self { runner, argv }
    }

    pub fn command_line(&self) -> String {
        match self.argv.split_first() {
            Some((program, args)) => display_command(program, args),
            None => String::new(),
        }
    }

    /// Run the reload command once and wait for it.
    pub fn reload(&self) -> Result<()> {
        let (program, args) = self
            .argv
            .split_first()
            .ok_or_else(|| Error::Config("reload_command is empty".into()))?;

        info!("Reloading proxy ({})", self.command_line());
        match run_checked(self.runner, program, args) {
            Ok(_) => Ok(()),
            Err(Error::Command { command, stderr }) => {
                Err(Error::ProxyReloadFailed { command, stderr })
            }
            Err(e) => Err(Error::ProxyReloadFailed {
                command: self.command_line(),
                stderr: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::CommandOutput;
    use std::cell::RefCell;

    struct ScriptedRunner {
        output: std::result::Result<CommandOutput, ()>,
        calls: RefCell<Vec<String>>,
    }

    impl CommandRunner for ScriptedRunner {
        fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
            self.calls.borrow_mut().push(display_command(program, args));
            self.output.clone().map_err(|_| Error::CommandNotFound {
                command: program.to_string(),
                hint: "install nginx".into(),
            })
        }
    }

    fn runner(output: std::result::Result<CommandOutput, ()>) -> ScriptedRunner {
        ScriptedRunner {
            output,
            calls: RefCell::new(Vec::new()),
        }
    }

    fn argv() -> Vec<String> {
        vec!["sudo".into(), "nginx".into(), "-s".into(), "reload".into()]
    }

    #[test]
    fn test_reload_runs_configured_command() {
        let runner = runner(Ok(CommandOutput {
            success: true,
            code: Some(0),
            ..Default::default()
        }));
        ProxyReloader::new(&runner, argv()).reload().unwrap();
        assert_eq!(*runner.calls.borrow(), vec!["sudo nginx -s reload".to_string()]);
    }

    #[test]
    fn test_reload_failure_carries_stderr() {
        let runner = runner(Ok(CommandOutput {
            success: false,
            code: Some(1),
            stderr: "nginx: [error] invalid PID number\n".into(),
            ..Default::default()
        }));
        match ProxyReloader::new(&runner, argv()).reload() {
            Err(Error::ProxyReloadFailed { command, stderr }) => {
                assert_eq!(command, "sudo nginx -s reload");
                assert_eq!(stderr, "nginx: [error] invalid PID number");
            }
            other => panic!("expected ProxyReloadFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_reload_failure_without_stderr_reports_status() {
        let runner = runner(Ok(CommandOutput {
            success: false,
            code: Some(2),
            ..Default::default()
        }));
        let err = ProxyReloader::new(&runner, argv()).reload().unwrap_err();
        assert!(err.to_string().contains("exited with status 2"));
    }

    #[test]
    fn test_reload_spawn_failure_is_reload_failure() {
        let runner = runner(Err(()));
        assert!(matches!(
            ProxyReloader::new(&runner, argv()).reload(),
            Err(Error::ProxyReloadFailed { .. })
        ));
    }

    #[test]
    fn test_empty_argv_is_config_error() {
        let runner = runner(Err(()));
        assert!(matches!(
            ProxyReloader::new(&runner, Vec::new()).reload(),
            Err(Error::Config(_))
        ));
        assert!(runner.calls.borrow().is_empty());
    }
}
