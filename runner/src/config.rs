//! The benchmark configuration. Everything that is fixed for a whole matrix run lives here and is
//! passed into the `Runner` once at startup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use failure::ResultExt;

use serde::{Deserialize, Serialize};

/// Default values for `BenchConfig`.
pub mod defaults {
    /// The baseline hypervisor binary.
    pub const VMM_BINARY: &str = "/usr/local/bin/cloud-hypervisor";

    /// The patched hypervisor binary.
    pub const PATCHED_VMM_BINARY: &str = "/usr/local/bin/cloud-hypervisor-patched";

    /// The memory introspection tool. It takes a pid and the expected guest size in KiB.
    pub const INTROSPECTION_BINARY: &str = "/usr/local/bin/vmm_memory";

    pub const KERNEL: &str = "/opt/ch/vmlinux";
    pub const DISK: &str = "/opt/ch/focal-server-cloudimg-amd64.raw";
    pub const CMDLINE: &str = "console=hvc0 root=/dev/vda1 rw";

    pub const CPUS: usize = 4;

    /// Guest memory size in MiB.
    pub const MEMORY_MIB: u64 = 16 << 10;

    pub const NET: &str = "tap=,mac=12:34:56:78:90:ab,ip=192.168.249.1,mask=255.255.255.0";

    /// The PCI device handed to the guest in VFIO runs.
    pub const VFIO_DEVICE: &str = "/sys/bus/pci/devices/0000:01:00.0/";

    pub const RESULTS_DIR: &str = "results";

    pub const LAUNCH_GRACE_SECS: u64 = 1;
    pub const SETTLE_SECS: u64 = 15;
    pub const CLEANUP_SECS: u64 = 2;
}

/// Fixed parameters of a benchmark run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Hypervisor used when `patched` is off.
    pub vmm_binary: String,
    /// Hypervisor used when `patched` is on.
    pub patched_vmm_binary: String,
    pub introspection_binary: String,

    pub kernel: String,
    pub disk: String,
    pub cmdline: Option<String>,
    pub cpus: usize,
    pub memory_mib: u64,
    pub net: String,
    pub vfio_device: String,

    /// Local directory for the summary and the raw captures.
    pub results_dir: PathBuf,
    /// Directory on the benchmark host where the hypervisor writes its own log. Defaults to
    /// `results_dir`.
    pub vmm_log_dir: Option<String>,

    /// Run privileged steps through `sudo`.
    pub use_sudo: bool,

    pub launch_grace_secs: u64,
    pub settle_secs: u64,
    pub cleanup_secs: u64,
}

impl Default for BenchConfig {
    fn default() -> Self {
        BenchConfig {
            vmm_binary: defaults::VMM_BINARY.into(),
            patched_vmm_binary: defaults::PATCHED_VMM_BINARY.into(),
            introspection_binary: defaults::INTROSPECTION_BINARY.into(),

            kernel: defaults::KERNEL.into(),
            disk: defaults::DISK.into(),
            cmdline: Some(defaults::CMDLINE.into()),
            cpus: defaults::CPUS,
            memory_mib: defaults::MEMORY_MIB,
            net: defaults::NET.into(),
            vfio_device: defaults::VFIO_DEVICE.into(),

            results_dir: PathBuf::from(defaults::RESULTS_DIR),
            vmm_log_dir: None,

            use_sudo: true,

            launch_grace_secs: defaults::LAUNCH_GRACE_SECS,
            settle_secs: defaults::SETTLE_SECS,
            cleanup_secs: defaults::CLEANUP_SECS,
        }
    }
}

impl BenchConfig {
    /// Read a config from a JSON file. Fields missing from the file keep their default values.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, failure::Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|_| format!("reading config file {}", path.display()))?;
        Self::from_json(&contents)
    }

    pub fn from_json(json: &str) -> Result<Self, failure::Error> {
        Ok(serde_json::from_str(json).context("parsing benchmark config")?)
    }

    /// Reject settings that parse but cannot work. The hypervisors are killed by name, so each
    /// binary path must end in a file name.
    pub fn validate(&self) -> Result<(), failure::Error> {
        for binary in [&self.vmm_binary, &self.patched_vmm_binary].iter() {
            if crate::vmm::process_name(binary).is_empty() {
                failure::bail!("`{}` does not name an executable file", binary);
            }
        }

        Ok(())
    }

    /// The expected guest size in KiB, as passed to the introspection tool.
    pub fn memory_kib(&self) -> u64 {
        self.memory_mib << 10
    }

    /// Where the hypervisor should put its log, on the benchmark host.
    pub fn vmm_log_dir(&self) -> String {
        match &self.vmm_log_dir {
            Some(dir) => dir.clone(),
            None => self.results_dir.display().to_string(),
        }
    }

    /// The prefix for privileged commands (`"sudo "` or nothing).
    pub fn sudo(&self) -> &'static str {
        if self.use_sudo {
            "sudo "
        } else {
            ""
        }
    }

    pub fn launch_grace(&self) -> Duration {
        Duration::from_secs(self.launch_grace_secs)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }

    pub fn cleanup(&self) -> Duration {
        Duration::from_secs(self.cleanup_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = BenchConfig::from_json(r#"{ "memory_mib": 2048, "use_sudo": false }"#).unwrap();

        assert_eq!(cfg.memory_mib, 2048);
        assert_eq!(cfg.memory_kib(), 2048 * 1024);
        assert!(!cfg.use_sudo);
        assert_eq!(cfg.sudo(), "");
        assert_eq!(cfg.vmm_binary, defaults::VMM_BINARY);
        assert_eq!(cfg.settle(), Duration::from_secs(15));
    }

    #[test]
    fn vmm_log_dir_falls_back_to_results_dir() {
        let mut cfg = BenchConfig::default();
        cfg.results_dir = PathBuf::from("/tmp/out");
        assert_eq!(cfg.vmm_log_dir(), "/tmp/out");

        cfg.vmm_log_dir = Some("/var/log/ch".into());
        assert_eq!(cfg.vmm_log_dir(), "/var/log/ch");
    }

    #[test]
    fn binaries_must_have_a_name() {
        assert!(BenchConfig::default().validate().is_ok());

        let mut cfg = BenchConfig::default();
        cfg.patched_vmm_binary = "/usr/local/bin/".into();
        assert!(cfg.validate().is_err());

        let mut cfg = BenchConfig::default();
        cfg.vmm_binary = "cloud-hypervisor".into();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn bad_json_is_an_error() {
        assert!(BenchConfig::from_json("{ memory_mib: }").is_err());
    }

    #[test]
    fn round_trips_through_json() {
        let cfg = BenchConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        assert_eq!(BenchConfig::from_json(&json).unwrap(), cfg);
    }
}
