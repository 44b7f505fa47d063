//! The benchmark loop: for every point in the matrix, boot the hypervisor, let it settle, sample
//! host memory and the introspection tool, record a summary row, and kill the hypervisor before
//! moving on. At most one hypervisor is alive at any time.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

use console::style;

use failure::ResultExt;
use failure_derive::Fail;

use log::{info, warn};

use serde::Serialize;

use spurs_util::escape_for_bash;

use crate::{
    config::BenchConfig,
    matrix::{run_matrix, RunConfig},
    meminfo::{extract_field, fields, MeminfoSample, PROC_MEMINFO},
    report::{RunRecord, Summary},
    shell::{Shell, Waiter},
    time, timings_str,
    vmm::{build_command, VmmCommand},
};

pub const SUMMARY_FILE: &str = "summary.txt";
pub const PARAMS_FILE: &str = "params.json";
pub const RESULTS_FILE: &str = "results.json";
pub const TIME_FILE: &str = "time.txt";

/// Failures that end a single iteration but not the whole run.
#[derive(Debug, Fail)]
pub enum IterationError {
    #[fail(display = "`{}` is not executable on the benchmark host", path)]
    MissingBinary { path: String },

    #[fail(display = "launching did not report a pid (got {:?})", output)]
    NoPid { output: String },
}

/// A launched hypervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    /// The pid of the process the shell started, which may be `sudo` rather than the hypervisor.
    pub wrapper_pid: u32,
    /// The name to kill the hypervisor by.
    pub process_name: String,
}

/// Metadata saved next to the results.
#[derive(Debug, Serialize)]
pub struct Params<'c> {
    pub config: &'c BenchConfig,
    pub host: String,
    pub local_git_hash: String,
    pub timestamp: String,
}

/// Raw text captured during one iteration.
#[derive(Debug, Default)]
struct Captures {
    meminfo: Option<String>,
    introspection: Option<String>,
}

pub struct Runner<'c, S: Shell, W: Waiter> {
    cfg: &'c BenchConfig,
    shell: S,
    waiter: W,
}

impl<'c, S: Shell, W: Waiter> Runner<'c, S, W> {
    pub fn new(cfg: &'c BenchConfig, shell: S, waiter: W) -> Self {
        Runner { cfg, shell, waiter }
    }

    pub fn shell(&self) -> &S {
        &self.shell
    }

    pub fn waiter(&self) -> &W {
        &self.waiter
    }

    fn results_path(&self, file: &str) -> PathBuf {
        self.cfg.results_dir.join(file)
    }

    fn check_executable(&self, path: &str) -> Result<(), failure::Error> {
        let out = self
            .shell
            .run(&format!("test -x {} && echo ok", escape_for_bash(path)))?;

        if out.trim() == "ok" {
            Ok(())
        } else {
            Err(IterationError::MissingBinary { path: path.into() }.into())
        }
    }

    /// Start the hypervisor in the background. Returns once the shell reports the pid of the
    /// process it started; the hypervisor may still be booting.
    pub fn launch(&self, command: &VmmCommand) -> Result<ProcessHandle, failure::Error> {
        self.check_executable(&command.executable)?;

        let out = self.shell.run(&format!(
            "nohup {}{} > /dev/null 2>&1 < /dev/null & echo $!",
            self.cfg.sudo(),
            command.to_shell()
        ))?;

        let wrapper_pid = out
            .trim()
            .parse::<u32>()
            .map_err(|_| IterationError::NoPid {
                output: out.trim().to_owned(),
            })?;

        info!("Launched {} (pid {})", command.executable, wrapper_pid);

        Ok(ProcessHandle {
            wrapper_pid,
            process_name: command.process_name().to_owned(),
        })
    }

    /// Find the pid of the hypervisor itself. When launched through `sudo`, that is the first
    /// child of the wrapper; otherwise the wrapper is the hypervisor.
    pub fn resolve_child_pid(&self, handle: &ProcessHandle) -> Result<Option<u32>, failure::Error> {
        if !self.cfg.use_sudo {
            return Ok(Some(handle.wrapper_pid));
        }

        let out = self
            .shell
            .run(&format!("pgrep -P {}", handle.wrapper_pid))?;

        Ok(out
            .lines()
            .filter_map(|line| line.trim().parse::<u32>().ok())
            .next())
    }

    pub fn sample_host_meminfo(&self) -> Result<String, failure::Error> {
        self.shell.run(&format!("cat {}", PROC_MEMINFO))
    }

    /// Run the introspection tool against `pid`. Its stdout and stderr are returned as is, so a
    /// stale pid shows up as whatever the tool reports for it.
    pub fn run_memory_introspection(
        &self,
        pid: u32,
        expected_guest_size_kib: u64,
    ) -> Result<String, failure::Error> {
        self.check_executable(&self.cfg.introspection_binary)?;

        self.shell.run(&format!(
            "{}{} {} {} 2>&1",
            self.cfg.sudo(),
            escape_for_bash(&self.cfg.introspection_binary),
            pid,
            expected_guest_size_kib
        ))
    }

    /// Kill every process with the hypervisor's name, then give it time to clean up.
    ///
    /// NOTE: this is by name, so unrelated hypervisors with the same name die too.
    pub fn terminate(&self, handle: &ProcessHandle) -> Result<(), failure::Error> {
        self.kill_by_name(&handle.process_name)
    }

    fn kill_by_name(&self, process_name: &str) -> Result<(), failure::Error> {
        let out = self.shell.run(&format!(
            "{}pkill -e -x {}",
            self.cfg.sudo(),
            escape_for_bash(process_name)
        ))?;

        if out.trim().is_empty() {
            warn!("No `{}` process to terminate", process_name);
        } else {
            for line in out.lines() {
                info!("{}", line.trim());
            }
        }

        self.waiter.wait(self.cfg.cleanup());

        Ok(())
    }

    /// Everything between launch and terminate. Fills in `record` and `captures` as far as it
    /// gets.
    fn measure(
        &self,
        handle: &ProcessHandle,
        record: &mut RunRecord,
        captures: &mut Captures,
    ) -> Result<(), failure::Error> {
        self.waiter.wait(self.cfg.launch_grace());

        record.pid = self.resolve_child_pid(handle)?;
        if record.pid.is_none() {
            warn!(
                "No child of pid {}; the overhead of this run is not measured",
                handle.wrapper_pid
            );
        }

        self.waiter.wait(self.cfg.settle());

        let meminfo = self.sample_host_meminfo()?;
        record.meminfo = MeminfoSample::parse(&meminfo);
        captures.meminfo = Some(meminfo);

        let pid = match record.pid {
            Some(pid) => pid,
            None => return Ok(()),
        };

        let out = self.run_memory_introspection(pid, self.cfg.memory_kib())?;
        record.total_overhead = extract_field(&out, fields::TOTAL_OVERHEAD);
        captures.introspection = Some(out);

        match record.overhead_mib() {
            Some(mib) => info!("{}: {:.2} MiB", fields::TOTAL_OVERHEAD, mib),
            None => warn!("No `{}` in introspection output", fields::TOTAL_OVERHEAD),
        }

        Ok(())
    }

    fn persist(&self, run: RunConfig, captures: &Captures) -> Result<(), failure::Error> {
        let files = [
            (run.meminfo_file(), &captures.meminfo),
            (run.introspection_file(), &captures.introspection),
        ];

        for (file, contents) in files.iter() {
            if let Some(contents) = contents {
                let path = self.results_path(file);
                fs::write(&path, contents)
                    .with_context(|_| format!("writing {}", path.display()))?;
            }
        }

        Ok(())
    }

    /// Run one point of the matrix and append its row to `summary`.
    ///
    /// A failure to launch or measure only costs this iteration; its row shows what is missing.
    /// Failing to write local results ends the run, but only after the hypervisor is killed.
    pub fn run_one<Wr: Write>(
        &self,
        run: RunConfig,
        summary: &mut Summary<Wr>,
    ) -> Result<RunRecord, failure::Error> {
        let start = Instant::now();
        let command = build_command(self.cfg, run);
        let mut record = RunRecord::new(run);

        println!("{}", style(format!("== {} ==", run)).bold());

        let handle = match self.launch(&command) {
            Ok(handle) => handle,
            Err(err) => {
                warn!("Skipping {}: {}", run, err);

                // With `NoPid` the launch line did run, so a hypervisor may be up anyway.
                let launched = matches!(
                    err.downcast_ref::<IterationError>(),
                    Some(IterationError::NoPid { .. })
                );

                let saved = summary.append(&record);
                if launched {
                    self.kill_by_name(command.process_name())?;
                }
                saved?;

                record.elapsed = Some(start.elapsed());
                return Ok(record);
            }
        };
        record.wrapper_pid = Some(handle.wrapper_pid);

        let mut captures = Captures::default();
        if let Err(err) = self.measure(&handle, &mut record, &mut captures) {
            warn!("Measuring {} failed: {}", run, err);
        }

        let saved = self
            .persist(run, &captures)
            .and_then(|()| summary.append(&record));
        self.terminate(&handle)?;
        saved?;

        record.elapsed = Some(start.elapsed());
        Ok(record)
    }

    /// Run the whole matrix, writing `summary.txt`, the raw captures, `results.json`, and
    /// `time.txt` to the results directory.
    pub fn run_all(&self) -> Result<Vec<RunRecord>, failure::Error> {
        self.cfg.validate()?;

        fs::create_dir_all(&self.cfg.results_dir).with_context(|_| {
            format!(
                "creating results directory {}",
                self.cfg.results_dir.display()
            )
        })?;

        let mut summary = Summary::create(self.results_path(SUMMARY_FILE))?;
        let mut timers = vec![];
        let mut records = vec![];

        for run in run_matrix() {
            let record = time!(timers, run.tag(), self.run_one(run, &mut summary)?);
            records.push(record);
        }

        self.write_json(RESULTS_FILE, &records)?;

        let path = self.results_path(TIME_FILE);
        fs::write(&path, timings_str(timers.as_slice()))
            .with_context(|_| format!("writing {}", path.display()))?;

        Ok(records)
    }

    /// Serialize `value` into `file` in the results directory.
    pub fn write_json<T: Serialize>(&self, file: &str, value: &T) -> Result<(), failure::Error> {
        fs::create_dir_all(&self.cfg.results_dir)?;
        let path = self.results_path(file);
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&path, json).with_context(|_| format!("writing {}", path.display()))?;
        Ok(())
    }
}
