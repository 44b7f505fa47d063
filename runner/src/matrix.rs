//! The configuration matrix: every combination of the three boolean axes.

use serde::{Deserialize, Serialize};

/// One point in the matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunConfig {
    /// Pass the configured PCI device through to the guest.
    pub vfio: bool,
    /// Back guest memory with a shared mapping.
    pub shared: bool,
    /// Use the patched hypervisor binary.
    pub patched: bool,
}

/// `yes` or `no`, as used in file names and the summary.
pub fn yes_no(b: bool) -> &'static str {
    if b {
        "yes"
    } else {
        "no"
    }
}

/// All 8 configurations in run order: `vfio` outermost, then `shared`, then `patched`.
pub fn run_matrix() -> Vec<RunConfig> {
    let mut runs = Vec::with_capacity(8);

    for &vfio in &[false, true] {
        for &shared in &[false, true] {
            for &patched in &[false, true] {
                runs.push(RunConfig {
                    vfio,
                    shared,
                    patched,
                });
            }
        }
    }

    runs
}

impl RunConfig {
    /// `vfio_<b>_shared_<b>_patched_<b>`
    pub fn tag(&self) -> String {
        format!(
            "vfio_{}_shared_{}_patched_{}",
            yes_no(self.vfio),
            yes_no(self.shared),
            yes_no(self.patched)
        )
    }

    /// Generate a file name for this configuration with the given prefix and extension, e.g.
    /// `proc_meminfo_vfio_no_shared_yes_patched_no.txt`.
    pub fn gen_file_name(&self, prefix: &str, ext: &str) -> String {
        format!("{}_{}.{}", prefix, self.tag(), ext)
    }

    /// The hypervisor's own log.
    pub fn vmm_log_file(&self) -> String {
        self.gen_file_name("ch", "log")
    }

    /// Capture of the introspection tool's output.
    pub fn introspection_file(&self) -> String {
        self.gen_file_name("vmm_memory", "txt")
    }

    /// Snapshot of `/proc/meminfo`.
    pub fn meminfo_file(&self) -> String {
        self.gen_file_name("proc_meminfo", "txt")
    }
}

impl std::fmt::Display for RunConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "vfio={} shared={} patched={}",
            yes_no(self.vfio),
            yes_no(self.shared),
            yes_no(self.patched)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_order() {
        let order: Vec<_> = run_matrix()
            .into_iter()
            .map(|r| (yes_no(r.vfio), yes_no(r.shared), yes_no(r.patched)))
            .collect();

        assert_eq!(
            order,
            vec![
                ("no", "no", "no"),
                ("no", "no", "yes"),
                ("no", "yes", "no"),
                ("no", "yes", "yes"),
                ("yes", "no", "no"),
                ("yes", "no", "yes"),
                ("yes", "yes", "no"),
                ("yes", "yes", "yes"),
            ]
        );
    }

    #[test]
    fn matrix_members_are_unique() {
        let runs = run_matrix();
        let uniq: std::collections::HashSet<_> = runs.iter().cloned().collect();
        assert_eq!(runs.len(), 8);
        assert_eq!(uniq.len(), 8);
        assert_eq!(run_matrix(), runs);
    }

    #[test]
    fn file_names() {
        let run = RunConfig {
            vfio: true,
            shared: false,
            patched: true,
        };

        assert_eq!(run.vmm_log_file(), "ch_vfio_yes_shared_no_patched_yes.log");
        assert_eq!(
            run.introspection_file(),
            "vmm_memory_vfio_yes_shared_no_patched_yes.txt"
        );
        assert_eq!(
            run.meminfo_file(),
            "proc_meminfo_vfio_yes_shared_no_patched_yes.txt"
        );
        assert_eq!(run.to_string(), "vfio=yes shared=no patched=yes");
    }
}
