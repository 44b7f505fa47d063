//! The two capabilities the runner needs from the outside world: running shell commands on the
//! benchmark host, and waiting.

use std::process::Command;
use std::time::Duration;

use failure::ResultExt;

use log::debug;

use spurs::{cmd, Execute, SshShell};

/// Something that can run a `bash` command line on the benchmark host.
///
/// A non-zero exit status is _not_ an error: callers look at the captured output to decide what
/// happened. `Err` means the command could not be run at all.
pub trait Shell {
    /// Run `cmd` and return its stdout.
    fn run(&self, cmd: &str) -> Result<String, failure::Error>;
}

/// Runs commands on this machine.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalShell;

impl Shell for LocalShell {
    fn run(&self, cmd: &str) -> Result<String, failure::Error> {
        debug!("$ {}", cmd);

        let output = Command::new("bash")
            .arg("-c")
            .arg(cmd)
            .output()
            .with_context(|_| format!("unable to run `{}`", cmd))?;

        if !output.status.success() {
            debug!(
                "`{}` exited with {:?}: {}",
                cmd,
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Runs commands on a remote benchmark host.
impl Shell for SshShell {
    fn run(&self, command: &str) -> Result<String, failure::Error> {
        let out = Execute::run(self, cmd!("{}", command).use_bash().allow_error())?;
        Ok(out.stdout)
    }
}

/// Blocks the runner between steps.
pub trait Waiter {
    fn wait(&self, duration: Duration);
}

/// Really sleeps.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sleeper;

impl Waiter for Sleeper {
    fn wait(&self, duration: Duration) {
        debug!("Sleeping for {:?}", duration);
        std::thread::sleep(duration);
    }
}
