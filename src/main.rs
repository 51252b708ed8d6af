use std::{error::Error, fs, io, path::PathBuf, process, time::Duration};

use clap::{command, Parser, ValueHint};
use log::{debug, error, info, warn, LevelFilter};

use scrobbled::{
    config::Config,
    engine::{AuthStatus, Engine},
    signal,
    track::TrackEvent,
};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Profile to display when not built in release mode.
#[cfg(debug_assertions)]
const BUILD_PROFILE: &str = "debug";
/// Profile to display when built in release mode.
#[cfg(not(debug_assertions))]
const BUILD_PROFILE: &str = "release";

/// Group name for mutually exclusive logging options.
const ARGS_GROUP_LOGGING: &str = "logging";

/// Command line arguments as parsed by `clap`.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Secrets file
    ///
    /// Ensure that this file is kept secure and not shared publicly, as
    /// it contains the API key pair used to sign requests on behalf of
    /// your account.
    #[arg(short, long, value_name = "FILE", value_hint = ValueHint::FilePath, default_value_t = String::from("secrets.toml"))]
    secrets_file: String,

    /// Data directory
    ///
    /// Where the queue snapshot and the session blob are kept so that
    /// unsent scrobbles and the signed-in session survive restarts.
    #[arg(short, long, value_name = "DIR", value_hint = ValueHint::DirPath, default_value_t = String::from("."))]
    data_dir: String,

    /// Seconds between automatic queue flushes
    ///
    /// [default: 30]
    #[arg(long, value_name = "SECONDS")]
    flush_interval: Option<u64>,

    /// Suppresses all output except warnings and errors.
    #[arg(short, long, default_value_t = false, group = ARGS_GROUP_LOGGING)]
    quiet: bool,

    /// Enable verbose logging
    ///
    /// Specify twice for trace logging.
    #[arg(short, long, action = clap::ArgAction::Count, group = ARGS_GROUP_LOGGING)]
    verbose: u8,
}

/// Initializes the logger facade.
///
/// The logging level is determined as follows, in order of precedence
/// from highest to lowest:
/// 1. Command line arguments
/// 2. `RUST_LOG` environment variable
/// 3. Hard coded default
///
/// # Panics
///
/// Panics when a logger facade is already initialized.
fn init_logger(config: &Args) {
    let mut logger = env_logger::Builder::from_env(
        // Note: if you change the default logging level here, then you should
        // probably also change the verbosity levels below.
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    if config.quiet || config.verbose > 0 {
        let level = match config.verbose {
            0 => {
                // Quiet and verbose are mutually exclusive, and `verbose` is 0
                // by default. So this arm means: quiet mode.
                LevelFilter::Warn
            }
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        // Filter log messages of external crates.
        logger.filter_module(module_path!(), level);
    }

    logger.init();
}

/// Loads the API key pair from the secrets file.
///
/// # Errors
///
/// Returns an error when the file cannot be read, is implausibly
/// large, or does not contain both `api_key` and `api_secret`.
fn load_secrets(secrets_file: &str) -> io::Result<(String, String)> {
    // Prevent out-of-memory condition: the secrets file should be small.
    let attributes = fs::metadata(secrets_file)?;
    if attributes.len() > 1024 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{secrets_file} is too large"),
        ));
    }

    let contents = fs::read_to_string(secrets_file)?;
    let value = contents.parse::<toml::Value>().map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{secrets_file} format is invalid: {e}"),
        )
    })?;

    let field = |name: &str| {
        value
            .get(name)
            .and_then(toml::Value::as_str)
            .map(ToOwned::to_owned)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("{secrets_file} does not contain {name}"),
                )
            })
    };

    Ok((field("api_key")?, field("api_secret")?))
}

/// Parses one adapter feed line.
///
/// The format is tab-separated: `artist<TAB>title<TAB>duration-seconds`
/// with an optional fourth album field.
fn parse_track_line(line: &str) -> Option<(String, String, u32, Option<String>)> {
    let mut fields = line.split('\t');
    let artist = fields.next()?.trim();
    let title = fields.next()?.trim();
    let duration = fields.next()?.trim().parse::<u32>().ok()?;
    let album = fields.next().map(|album| album.trim().to_owned());

    if artist.is_empty() || title.is_empty() {
        return None;
    }
    Some((artist.to_owned(), title.to_owned(), duration, album))
}

/// Hands the finished track to the engine, logging refusals.
///
/// Queue admission errors are ordinary here (too short, skipped early,
/// duplicate feed lines) and must not bring the feed loop down.
fn scrobble_finished(engine: &Engine, track: Option<TrackEvent>) {
    if let Some(track) = track {
        match engine.scrobble(track) {
            Ok(id) => debug!("scrobble queued as #{id}"),
            Err(e) => info!("not scrobbling: {e}"),
        }
    }
}

/// Main application loop.
///
/// Reads the adapter feed from stdin, one track per line, and treats
/// the start of the next track as the end of the previous one. Flushes
/// run on a timer and on SIGHUP; Ctrl-C and SIGTERM shut down
/// gracefully after a final flush.
///
/// # Errors
///
/// This function returns an error when the secrets cannot be loaded,
/// the engine cannot be constructed, or the authentication handshake
/// fails.
async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let secrets = load_secrets(&args.secrets_file);
    if let Err(ref e) = secrets {
        if e.kind() == io::ErrorKind::NotFound {
            info!(
                "create {} from secrets.toml.example with your API key pair",
                args.secrets_file
            );
        }
    }
    let (api_key, api_secret) = secrets?;

    let data_dir = PathBuf::from(&args.data_dir);
    fs::create_dir_all(&data_dir)?;

    let mut config = Config::new(api_key, api_secret);
    config.queue_file = Some(data_dir.join("queue.json"));
    config.session_file = Some(data_dir.join("session.toml"));
    if let Some(secs) = args.flush_interval {
        config.flush_interval = Duration::from_secs(secs);
    }
    let flush_interval = config.flush_interval;

    let engine = Engine::with_client(config)?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    match engine.authenticate().await? {
        AuthStatus::Authenticated(creds) => {
            info!(
                "scrobbling as {}",
                creds.username.as_deref().unwrap_or("unknown user")
            );
        }
        AuthStatus::ChallengePending(challenge) => {
            println!("Authorize this application in your browser:");
            println!("\n  {}\n", challenge.url);
            println!("Press Enter when done.");
            let _ = lines.next_line().await?;
            let creds = engine.complete_authentication().await?;
            info!(
                "authenticated as {}",
                creds.username.as_deref().unwrap_or("unknown user")
            );
        }
    }

    let mut signals = signal::Handler::new()?;

    // Stagger the first automatic flush with jitter to spread requests
    // when many instances are launched from the same crontab.
    let first_flush =
        tokio::time::Instant::now() + Duration::from_millis(fastrand::u64(500..1_500));
    let mut flush_timer = tokio::time::interval_at(first_flush, flush_interval);

    let mut current: Option<TrackEvent> = None;
    loop {
        tokio::select! {
            // Prioritize shutdown signals.
            biased;

            sig = signals.recv() => match sig {
                signal::ShutdownSignal::Flush => {
                    info!("flushing on {sig}");
                    engine.flush().await;
                }
                _ => {
                    info!("shutting down gracefully on {sig}");
                    break;
                }
            },

            line = lines.next_line() => match line? {
                Some(line) => {
                    scrobble_finished(&engine, current.take());
                    match parse_track_line(&line) {
                        Some((artist, title, duration, album)) => {
                            current = Some(
                                engine
                                    .on_track_started(&artist, &title, album.as_deref(), duration)
                                    .await,
                            );
                        }
                        None => warn!("unparseable feed line ignored"),
                    }
                }
                None => {
                    info!("adapter feed closed");
                    break;
                }
            },

            _ = flush_timer.tick() => {
                let summary = engine.flush().await;
                if summary.accepted > 0 {
                    info!("{} scrobbles accepted, {} remaining", summary.accepted, summary.remaining);
                }
            }
        }
    }

    scrobble_finished(&engine, current.take());
    let summary = engine.flush().await;
    if summary.remaining > 0 {
        warn!(
            "{} scrobbles still queued; they will be submitted on the next run",
            summary.remaining
        );
    }
    engine.shutdown().await;

    Ok(())
}

/// Main entry point of the application.
///
/// This function initializes the logger facade, parses the command
/// line arguments, and starts the main application loop.
#[tokio::main]
async fn main() {
    // `clap` handles our command line arguments and help text.
    let args = Args::parse();
    init_logger(&args);

    // Dump command line arguments before we do anything more.
    // This aids in debugging of whatever comes next.
    debug!("Command {args:#?}");

    let cmd = command!();
    let name = cmd.get_name().to_string();
    let version = cmd.get_version().unwrap_or("UNKNOWN").to_string();

    info!("starting {name}/{version}; {BUILD_PROFILE}");

    if let Err(e) = run(args).await {
        error!("{e}");
        process::exit(1);
    }
}
