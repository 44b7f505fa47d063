//! Some routines for adding common CLI options in a consistent, less boilerplatey way.

/// Validators for `clap` arguments.
pub mod validator {
    use std::fmt::Debug;
    use std::str::FromStr;

    /// Accept the argument iff it parses as a `T`.
    pub fn is<T>(s: String) -> Result<(), String>
    where
        T: FromStr,
        T::Err: Debug,
    {
        s.as_str()
            .parse::<T>()
            .map(|_| ())
            .map_err(|e| format!("{:?}", e))
    }
}

/// CLI options that override parts of the benchmark config.
pub mod bench_config {
    use clap::{App, Arg, ArgMatches};

    use super::validator;
    use crate::config::BenchConfig;

    pub fn add_cli_options<'a, 'b>(app: App<'a, 'b>) -> App<'a, 'b> {
        app.arg(
            Arg::with_name("CONFIG")
                .long("config")
                .takes_value(true)
                .help(
                    "A JSON file with benchmark settings. Settings missing from the file keep \
                     their default values (see --print_config).",
                ),
        )
        .arg(
            Arg::with_name("RESULTS_DIR")
                .long("results_dir")
                .takes_value(true)
                .help("The local directory for the summary and the raw captures."),
        )
        .arg(
            Arg::with_name("VMM_LOG_DIR")
                .long("vmm_log_dir")
                .takes_value(true)
                .help(
                    "The directory on the benchmark host where the hypervisor writes its log \
                     (default: the results directory).",
                ),
        )
        .arg(
            Arg::with_name("MEMORY_MIB")
                .long("memory_mib")
                .takes_value(true)
                .validator(validator::is::<u64>)
                .help("The guest memory size in MiB (e.g. 16384)."),
        )
        .arg(
            Arg::with_name("CPUS")
                .long("cpus")
                .takes_value(true)
                .validator(validator::is::<usize>)
                .help("The number of guest vCPUs (e.g. 4)."),
        )
        .arg(
            Arg::with_name("NO_SUDO")
                .long("no_sudo")
                .help("Do not use `sudo` to launch, measure, or kill the hypervisor."),
        )
    }

    /// Build the config from the defaults, the `--config` file, and the overrides, in that order.
    pub fn parse_cli_options(sub_m: &ArgMatches<'_>) -> Result<BenchConfig, failure::Error> {
        let mut cfg = match sub_m.value_of("CONFIG") {
            Some(path) => BenchConfig::from_file(path)?,
            None => BenchConfig::default(),
        };

        if let Some(dir) = sub_m.value_of("RESULTS_DIR") {
            cfg.results_dir = dir.into();
        }
        if let Some(dir) = sub_m.value_of("VMM_LOG_DIR") {
            cfg.vmm_log_dir = Some(dir.into());
        }
        if let Some(mib) = sub_m.value_of("MEMORY_MIB") {
            cfg.memory_mib = mib.parse()?;
        }
        if let Some(cpus) = sub_m.value_of("CPUS") {
            cfg.cpus = cpus.parse()?;
        }
        if sub_m.is_present("NO_SUDO") {
            cfg.use_sudo = false;
        }

        cfg.validate()?;

        Ok(cfg)
    }
}

/// CLI options for running the benchmark on a remote host.
pub mod remote {
    use clap::{App, Arg, ArgMatches};

    use crate::Login;

    pub fn add_cli_options<'a, 'b>(app: App<'a, 'b>) -> App<'a, 'b> {
        app.arg(
            Arg::with_name("HOSTNAME")
                .long("host")
                .takes_value(true)
                .requires("USERNAME")
                .help(
                    "Run the benchmark on this remote over SSH instead of locally \
                     (e.g. c240g2-031321.wisc.cloudlab.us:22)",
                ),
        )
        .arg(
            Arg::with_name("USERNAME")
                .long("user")
                .takes_value(true)
                .requires("HOSTNAME")
                .help("The username on the remote (e.g. markm)"),
        )
    }

    /// Returns the login for the remote, if one was given.
    pub fn parse_cli_options<'a>(sub_m: &'a ArgMatches<'a>) -> Option<Login<'a, 'a, &'a str>> {
        let hostname = sub_m.value_of("HOSTNAME")?;
        let username = sub_m.value_of("USERNAME")?;

        Some(Login {
            host: hostname,
            hostname,
            username,
        })
    }
}
