//! A library for measuring the memory overhead of a virtual machine monitor.
//!
//! The benchmark boots the hypervisor once for every combination of VFIO passthrough, shared
//! guest memory, and patched/baseline binary, lets the guest settle, and then records host
//! `/proc/meminfo` and the `Total Overhead` reported by a memory introspection tool. See
//! `runner::Runner` for the loop itself.

// Must be imported first because the other submodules use the macros defined therein.
#[macro_use]
mod macros;

pub mod cli;
pub mod config;
pub mod matrix;
pub mod meminfo;
pub mod report;
pub mod runner;
pub mod shell;
pub mod vmm;

use std::process::Command;
use std::time::Duration;

use failure::ResultExt;

use spurs::SshShell;

pub use crate::runner::Runner;

/// Information needed to log into a remote machine.
#[derive(Clone, Debug)]
pub struct Login<'u, 'h, A: std::net::ToSocketAddrs + std::fmt::Display + Clone> {
    /// A network address for the host.
    pub host: A,
    /// A human-readable address for the host. Often, this is the same as `host`.
    pub hostname: &'h str,
    /// The username to log in as.
    pub username: &'u str,
}

/// Connect to the remote benchmark host.
pub fn connect<A>(login: &Login<A>) -> Result<SshShell, failure::Error>
where
    A: std::net::ToSocketAddrs + std::fmt::Display + std::fmt::Debug + Clone,
{
    let shell = SshShell::with_default_key(login.username, &login.host)?;
    Ok(shell)
}

/// Given an array of timings, generate a human-readable string.
pub fn timings_str<S: AsRef<str>>(timings: &[(S, Duration)]) -> String {
    let mut s = String::new();
    for (label, d) in timings.iter() {
        s.push_str(&format!("{}: {:?}\n", label.as_ref(), d));
    }
    s
}

/// Get the git hash of the workspace from which the runner is run. Returns `"dirty"` if the
/// workspace has uncommitted changes.
pub fn local_git_hash() -> Result<String, failure::Error> {
    let status = Command::new("git").args(&["diff", "--quiet"]).status()?;

    if status.code() == Some(1) {
        return Ok("dirty".into());
    }

    let output = Command::new("git").args(&["rev-parse", "HEAD"]).output()?;
    if !output.status.success() {
        failure::bail!("`git rev-parse HEAD` failed: not in a git repository?");
    }

    let output =
        std::str::from_utf8(&output.stdout).context("converting git hash string to UTF-8")?;
    Ok(output.trim().into())
}
