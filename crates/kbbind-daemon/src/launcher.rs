//! Launching commands bound by `exec` rules

use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;

const FALLBACK_SHELL: &str = "/bin/sh";

/// Runs commands through the user's shell without waiting for them.
///
/// Each child is reaped by a detached task, so the event loop never blocks
/// on a launched command and no zombies are left behind.
#[derive(Debug, Clone)]
pub struct ActionLauncher {
    shell: PathBuf,
}

impl ActionLauncher {
    pub fn new(shell: impl Into<PathBuf>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    /// Use `$SHELL`, or `/bin/sh` when it is unset or empty.
    pub fn from_env() -> Self {
        Self::new(shell_from(std::env::var_os("SHELL")))
    }

    pub fn shell(&self) -> &std::path::Path {
        &self.shell
    }

    /// Start `command` as `<shell> -c <command>`.
    ///
    /// Must be called from within a tokio runtime. Only failure to start the
    /// process is reported; its exit status is logged at debug level.
    pub fn spawn(&self, command: &str) -> io::Result<()> {
        let mut child = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .spawn()?;

        let pid = child.id();
        tracing::debug!("Launched '{}' (pid {:?})", command, pid);

        let command = command.to_string();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => tracing::debug!("'{}' exited with {}", command, status),
                Err(e) => tracing::warn!("Failed to wait for '{}': {}", command, e),
            }
        });

        Ok(())
    }
}

fn shell_from(var: Option<OsString>) -> PathBuf {
    match var {
        Some(shell) if !shell.is_empty() => PathBuf::from(shell),
        _ => PathBuf::from(FALLBACK_SHELL),
    }
}
