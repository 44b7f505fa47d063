//! This program measures the memory overhead of a VMM. It boots the hypervisor once for every
//! combination of VFIO passthrough, shared memory, and patched binary, and records host memory
//! usage and the overhead reported by the introspection tool for each.

use runner::{
    cli,
    config::BenchConfig,
    report::RunRecord,
    runner::{Params, PARAMS_FILE, SUMMARY_FILE},
    shell::{LocalShell, Shell, Sleeper},
    Runner,
};

fn run_matrix<S: Shell>(
    cfg: &BenchConfig,
    shell: S,
    host: &str,
) -> Result<Vec<RunRecord>, failure::Error> {
    let runner = Runner::new(cfg, shell, Sleeper);

    runner.write_json(
        PARAMS_FILE,
        &Params {
            config: cfg,
            host: host.into(),
            local_git_hash: runner::local_git_hash().unwrap_or_else(|_| "unknown".into()),
            timestamp: chrono::Local::now().format("%Y-%m-%d-%H-%M-%S").to_string(),
        },
    )?;

    runner.run_all()
}

fn run() -> Result<(), failure::Error> {
    let app = clap::App::new("overhead-runner")
        .about(
            "This program measures the memory overhead of a VMM across all combinations of \
             VFIO passthrough, shared memory, and patched binary. With no arguments, it runs \
             locally with the built-in defaults. Requires `sudo`.",
        )
        .arg(
            clap::Arg::with_name("PRINT_CONFIG")
                .long("print_config")
                .help("Print the effective config as JSON and exit."),
        )
        .setting(clap::AppSettings::DisableVersion);
    let app = cli::bench_config::add_cli_options(app);
    let app = cli::remote::add_cli_options(app);
    let matches = app.get_matches();

    let cfg = cli::bench_config::parse_cli_options(&matches)?;

    if matches.is_present("PRINT_CONFIG") {
        println!("{}", serde_json::to_string_pretty(&cfg)?);
        return Ok(());
    }

    let records = match cli::remote::parse_cli_options(&matches) {
        Some(login) => {
            let ushell = runner::connect(&login)?;
            run_matrix(&cfg, ushell, login.hostname)?
        }
        None => run_matrix(&cfg, LocalShell, "localhost")?,
    };

    for record in records.iter() {
        println!(
            "{}: Total Overhead {}",
            record.run,
            record
                .overhead_mib()
                .map(|mib| format!("{:.2} MiB", mib))
                .unwrap_or_else(|| runner::report::UNAVAILABLE.into())
        );
    }

    println!("RESULTS: {}", cfg.results_dir.join(SUMMARY_FILE).display());

    Ok(())
}

fn main() {
    use console::style;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Set the RUST_BACKTRACE environment variable so that we always get backtraces. Normally, one
    // doesn't want this because of the performance penalty, but in this case, we don't care too
    // much, whereas the debugging improve is massive.
    std::env::set_var("RUST_BACKTRACE", "1");

    // If an error occurred, try to print something helpful.
    if let Err(err) = run() {
        const MESSAGE: &str = r#"== ERROR ==================================================================================
`overhead-runner` encountered an error. Results written so far are kept in the results directory.
A hypervisor may have been left running; check with `pgrep -a cloud-hyperv` before rerunning.
Setting RUST_LOG=debug shows every command that was run.
"#;

        println!("{}", style(MESSAGE).red().bold());

        // Errors from SSH commands
        if err.downcast_ref::<spurs::SshError>().is_some() {
            println!("An error occurred while attempting to run a command over SSH");
        }

        // Print error and backtrace
        println!(
            "`overhead-runner` encountered the following error:\n{}\n{}",
            err.as_fail(),
            err.backtrace(),
        );

        std::process::exit(101);
    }
}
