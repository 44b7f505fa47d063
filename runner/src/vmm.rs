//! Building hypervisor command lines.

use spurs_util::escape_for_bash;

use crate::{config::BenchConfig, dir, matrix::RunConfig};

/// The kernel truncates process names (`comm`) to this many bytes, and `pkill`/`pgrep` match
/// against the truncated name.
pub const TASK_COMM_LEN: usize = 15;

/// A concrete hypervisor invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmmCommand {
    pub executable: String,
    pub args: Vec<String>,
}

/// Map a point of the matrix to the command line that runs it. Pure; the only inputs are the
/// fixed parameters in `cfg` and the three booleans in `run`.
pub fn build_command(cfg: &BenchConfig, run: RunConfig) -> VmmCommand {
    let executable = if run.patched {
        cfg.patched_vmm_binary.clone()
    } else {
        cfg.vmm_binary.clone()
    };

    let mut args = vec![
        "--kernel".to_owned(),
        cfg.kernel.clone(),
        "--disk".to_owned(),
        format!("path={}", cfg.disk),
        "--cpus".to_owned(),
        format!("boot={}", cfg.cpus),
        "--memory".to_owned(),
        format!(
            "size={}M,shared={}",
            cfg.memory_mib,
            if run.shared { "on" } else { "off" }
        ),
        "--net".to_owned(),
        cfg.net.clone(),
    ];

    if let Some(cmdline) = &cfg.cmdline {
        args.push("--cmdline".into());
        args.push(cmdline.clone());
    }

    if run.vfio {
        args.push("--device".into());
        args.push(format!("path={}", cfg.vfio_device));
    }

    args.push("--log-file".into());
    args.push(dir!(cfg.vmm_log_dir(), run.vmm_log_file()));

    VmmCommand { executable, args }
}

impl VmmCommand {
    /// Render as a single shell-safe command string.
    pub fn to_shell(&self) -> String {
        let mut s = escape_for_bash(&self.executable);
        for arg in self.args.iter() {
            s.push(' ');
            s.push_str(&escape_for_bash(arg));
        }
        s
    }

    /// The name the kernel knows the running process by, as matched by `pkill -x`.
    pub fn process_name(&self) -> &str {
        process_name(&self.executable)
    }
}

/// The `comm` of a process started from `path`: its file name truncated to `TASK_COMM_LEN` bytes.
pub fn process_name(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    let mut end = std::cmp::min(name.len(), TASK_COMM_LEN);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(vfio: bool, shared: bool, patched: bool) -> RunConfig {
        RunConfig {
            vfio,
            shared,
            patched,
        }
    }

    fn has_device(cmd: &VmmCommand) -> bool {
        cmd.args.iter().any(|a| a == "--device")
    }

    fn memory_arg(cmd: &VmmCommand) -> &str {
        let i = cmd.args.iter().position(|a| a == "--memory").unwrap();
        &cmd.args[i + 1]
    }

    #[test]
    fn axes_map_to_arguments() {
        let cfg = BenchConfig::default();

        for r in crate::matrix::run_matrix() {
            let cmd = build_command(&cfg, r);

            assert_eq!(r.patched, cmd.executable == cfg.patched_vmm_binary);
            assert_eq!(!r.patched, cmd.executable == cfg.vmm_binary);
            assert_eq!(r.vfio, has_device(&cmd));
            assert_eq!(r.shared, memory_arg(&cmd).ends_with("shared=on"));
            assert_eq!(!r.shared, memory_arg(&cmd).ends_with("shared=off"));
        }
    }

    #[test]
    fn base_parameters() {
        let mut cfg = BenchConfig::default();
        cfg.memory_mib = 4096;
        cfg.cpus = 2;
        cfg.cmdline = None;
        cfg.vmm_log_dir = Some("/var/log/ch".into());

        let cmd = build_command(&cfg, run(true, true, false));

        assert_eq!(
            cmd.args,
            vec![
                "--kernel".to_owned(),
                cfg.kernel.clone(),
                "--disk".into(),
                format!("path={}", cfg.disk),
                "--cpus".into(),
                "boot=2".into(),
                "--memory".into(),
                "size=4096M,shared=on".into(),
                "--net".into(),
                cfg.net.clone(),
                "--device".into(),
                format!("path={}", cfg.vfio_device),
                "--log-file".into(),
                "/var/log/ch/ch_vfio_yes_shared_yes_patched_no.log".into(),
            ]
        );
    }

    #[test]
    fn cmdline_is_optional() {
        let mut cfg = BenchConfig::default();
        let cmd = build_command(&cfg, run(false, false, false));
        assert!(cmd.args.iter().any(|a| a == "--cmdline"));

        cfg.cmdline = None;
        let cmd = build_command(&cfg, run(false, false, false));
        assert!(!cmd.args.iter().any(|a| a == "--cmdline"));
    }

    /// The rendered command line must reach the hypervisor as exactly these argv words.
    #[test]
    fn shell_rendering_preserves_argv() {
        use crate::shell::{LocalShell, Shell};

        let mut cfg = BenchConfig::default();
        cfg.vmm_log_dir = Some("/tmp/ch logs/it's here".into());

        for r in crate::matrix::run_matrix() {
            let cmd = build_command(&cfg, r);
            let out = LocalShell
                .run(&format!("printf '%s\\n' {}", cmd.to_shell()))
                .unwrap();

            let mut expected = vec![cmd.executable.clone()];
            expected.extend(cmd.args.iter().cloned());
            assert_eq!(out.lines().collect::<Vec<_>>(), expected);
        }
    }

    #[test]
    fn process_name_is_truncated() {
        assert_eq!(
            process_name("/usr/local/bin/cloud-hypervisor"),
            "cloud-hyperviso"
        );
        assert_eq!(process_name("vmm"), "vmm");
        assert_eq!(process_name("/opt/ch/"), "");
    }
}
