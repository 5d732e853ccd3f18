use std::path::PathBuf;
use std::process::ExitCode;

use clap::{App, Arg, ArgMatches, SubCommand};

use stream::cancel::CancellationToken;
use stream::config::StreamConfig;
use stream::error::{Result, StreamError};
use stream::target::TargetSpec;
use stream::{pull, push, signal};

fn main() -> ExitCode {
    let matches = App::new("stream")
        .version("0.1")
        .author("Allan Clark. <napta2k@gmail.com>")
        .about("Resumable, chunked, hash-verified directory transfer over a multiplexed SSH control channel")
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .multiple_occurrences(true)
                .global(true)
                .help("Increase log verbosity (-v, -vv)"),
        )
        .arg(
            Arg::new("workers")
                .long("workers")
                .takes_value(true)
                .global(true)
                .default_value("3")
                .help("Number of concurrent chunk workers"),
        )
        .arg(
            Arg::new("chunk_size_mb")
                .long("chunk-size-mb")
                .takes_value(true)
                .global(true)
                .default_value("4")
                .help("Chunk size in MiB"),
        )
        .arg(
            Arg::new("max_retry")
                .long("max-retry")
                .takes_value(true)
                .global(true)
                .default_value("3")
                .help("Max retries per chunk"),
        )
        .arg(
            Arg::new("control_persist_secs")
                .long("control-persist-secs")
                .takes_value(true)
                .global(true)
                .default_value("600")
                .help("Seconds the SSH control master stays warm after the last command"),
        )
        .subcommand(
            SubCommand::with_name("push")
                .about("Push a local directory to a remote path")
                .arg(Arg::new("target").help("user@host:port").required(true).index(1))
                .arg(Arg::new("local_dir").help("Local directory to send").required(true).index(2))
                .arg(Arg::new("remote_path").help("Destination path on the remote host").required(true).index(3)),
        )
        .subcommand(
            SubCommand::with_name("pull")
                .about("Pull a remote directory into a local path")
                .arg(Arg::new("target").help("user@host:port").required(true).index(1))
                .arg(Arg::new("remote_path").help("Directory on the remote host to fetch").required(true).index(2))
                .arg(Arg::new("local_dir").help("Local destination directory").required(true).index(3)),
        )
        .get_matches();

    init_logging(matches.occurrences_of("verbose"));

    let token = CancellationToken::new();
    signal::install(token.clone());

    // Global flags are inherited onto each subcommand's own ArgMatches, so
    // read the tunables from there rather than the top level.
    let result = match matches.subcommand() {
        Some(("push", sub)) => build_config(sub).and_then(|cfg| run_push(sub, &cfg, &token)),
        Some(("pull", sub)) => build_config(sub).and_then(|cfg| run_pull(sub, &cfg, &token)),
        _ => unreachable!("clap requires a subcommand"),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fail("stream", &e),
    }
}

fn run_push(sub: &ArgMatches, cfg: &StreamConfig, token: &CancellationToken) -> Result<()> {
    let target = TargetSpec::parse(sub.value_of("target").expect("required"))?;
    let local_dir = PathBuf::from(sub.value_of("local_dir").expect("required"));
    let remote_path = sub.value_of("remote_path").expect("required");
    push::push(&target, &local_dir, remote_path, cfg, token)
}

fn run_pull(sub: &ArgMatches, cfg: &StreamConfig, token: &CancellationToken) -> Result<()> {
    let target = TargetSpec::parse(sub.value_of("target").expect("required"))?;
    let remote_path = sub.value_of("remote_path").expect("required");
    let local_dir = PathBuf::from(sub.value_of("local_dir").expect("required"));
    pull::pull(&target, remote_path, &local_dir, cfg, token)
}

fn build_config(matches: &ArgMatches) -> Result<StreamConfig> {
    let workers = parse_flag(matches, "workers")?;
    let chunk_size_mb: u64 = parse_flag(matches, "chunk_size_mb")?;
    let max_retry = parse_flag(matches, "max_retry")?;
    let control_persist_secs = parse_flag(matches, "control_persist_secs")?;

    Ok(StreamConfig {
        chunk_size: chunk_size_mb * 1024 * 1024,
        max_retry,
        workers,
        control_persist_secs,
    })
}

fn parse_flag<T: std::str::FromStr>(matches: &ArgMatches, name: &str) -> Result<T> {
    matches
        .value_of(name)
        .expect("flag has a default_value")
        .parse()
        .map_err(|_| StreamError::InvalidConfig(format!("--{} must be a positive integer", name.replace('_', "-"))))
}

fn init_logging(verbosity: u64) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", level);
    }
    pretty_env_logger::init_timed();
}

fn fail(context: &str, err: &StreamError) -> ExitCode {
    eprintln!("❌ {}: {}", context, err);
    ExitCode::FAILURE
}
