//! Per-run records and the summary table.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use failure::ResultExt;

use serde::{Deserialize, Serialize};

use crate::{
    matrix::{yes_no, RunConfig},
    meminfo::{kib_to_gib, kib_to_mib, MeminfoSample},
};

/// Printed in place of a value that could not be measured.
pub const UNAVAILABLE: &str = "n/a";

/// Width of a value column, including the ` GiB` suffix.
const VALUE_WIDTH: usize = 14;

/// Everything measured for one point in the matrix. Any value may be missing if a step failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run: RunConfig,

    /// The pid of the process we launched (e.g. `sudo`).
    pub wrapper_pid: Option<u32>,
    /// The pid of the hypervisor itself.
    pub pid: Option<u32>,

    /// Host memory accounting in KiB.
    pub meminfo: MeminfoSample,
    /// From the introspection tool, in KiB.
    pub total_overhead: Option<u64>,

    pub elapsed: Option<Duration>,
}

impl RunRecord {
    pub fn new(run: RunConfig) -> Self {
        RunRecord {
            run,
            wrapper_pid: None,
            pid: None,
            meminfo: MeminfoSample::default(),
            total_overhead: None,
            elapsed: None,
        }
    }

    /// The five summary columns, in KiB.
    pub fn columns(&self) -> [Option<u64>; 5] {
        [
            self.meminfo.mem_available,
            self.meminfo.active_anon,
            self.meminfo.anon_pages,
            self.meminfo.mapped,
            self.meminfo.shmem,
        ]
    }

    pub fn overhead_mib(&self) -> Option<f64> {
        self.total_overhead.map(kib_to_mib)
    }
}

fn labels(vfio: &str, shared: &str, patched: &str) -> String {
    format!("{:<6}{:<8}{:<9}", vfio, shared, patched)
}

/// The first line of `summary.txt`.
pub fn summary_header() -> String {
    let mut line = labels("VFIO", "Shared", "Patched");
    for name in &["MemAvailable", "Active(anon)", "AnonPages", "Mapped", "Shmem"] {
        line.push_str(&format!("{:>width$}", name, width = VALUE_WIDTH));
    }
    line
}

/// One fixed-width row: three yes/no labels followed by five GiB values.
pub fn summary_row(record: &RunRecord) -> String {
    let run = record.run;
    let mut line = labels(yes_no(run.vfio), yes_no(run.shared), yes_no(run.patched));

    for value in record.columns().iter() {
        match value {
            Some(kib) => line.push_str(&format!(
                "{:>width$.2} GiB",
                kib_to_gib(*kib),
                width = VALUE_WIDTH - 4
            )),
            None => line.push_str(&format!("{:>width$}", UNAVAILABLE, width = VALUE_WIDTH)),
        }
    }

    line
}

/// The append-only summary table. Every row is flushed as soon as it is written.
pub struct Summary<W: Write> {
    out: W,
}

impl Summary<File> {
    /// Create (or truncate) the summary file at `path` and write the header.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, failure::Error> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|_| format!("creating summary file {}", path.display()))?;
        let mut summary = Summary::new(file);
        summary.write_line(&summary_header())?;
        Ok(summary)
    }
}

impl<W: Write> Summary<W> {
    pub fn new(out: W) -> Self {
        Summary { out }
    }

    fn write_line(&mut self, line: &str) -> Result<(), failure::Error> {
        writeln!(self.out, "{}", line).context("writing summary")?;
        self.out.flush().context("flushing summary")?;
        Ok(())
    }

    pub fn append(&mut self, record: &RunRecord) -> Result<(), failure::Error> {
        self.write_line(&summary_row(record))
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
