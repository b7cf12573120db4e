mod config;
mod error;
mod library;
mod logging;
mod ports;
mod services;
mod spotify_rs;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::{Result, eyre::WrapErr};
use tokio::sync::mpsc;

use crate::{
    config::Config,
    library::TrackNormalizer,
    logging::init_tracing,
    services::library_sync::{SyncEvent, SyncSession, SyncSummary},
    spotify_rs::SpotifyClient,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The config file to use
    #[arg(short, long, env = "LIBRARY_SYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Tracing filter, e.g. `info` or `library_sync=debug`
    #[arg(long, default_value = "info", global = true, env = "LOG_LEVEL")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

fn is_directory(s: &str) -> Result<PathBuf, String> {
    let p: PathBuf = s.into();
    if p.is_dir() {
        Ok(p)
    } else {
        Err(format!("`{}` is not an existing directory", s))
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch the saved-track library and list it
    Sync {
        /// Bearer token for the Web API
        #[arg(short = 't', long, env = "SPOTIFY_ACCESS_TOKEN", hide_env_values = true)]
        access_token: String,

        /// Market (country code) for page requests; defaults to the locale's country
        #[arg(short, long)]
        market: Option<String>,

        /// Directory checked for already-downloaded tracks
        #[arg(short = 'd', long, value_parser = is_directory, env = "LIBRARY_SYNC_MUSIC_DIRECTORY")]
        music_directory: Option<PathBuf>,

        /// Maximum number of page requests in flight (default: unlimited)
        #[arg(long)]
        max_in_flight: Option<usize>,

        /// Base URL of the Web API
        #[arg(long, env = "SPOTIFY_API_BASE_URL")]
        api_base_url: Option<String>,
    },
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Create a default config file, if it doesn't exist
    CreateDefault,
    /// Print the path to the config file
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    let mut config = {
        if let Some(config) = &args.config {
            Config::from_file(config)
        } else {
            Config::load()
        }
    }
    .wrap_err("Failed to load library-sync config")?;

    let tracer_provider = init_tracing(
        "library-sync",
        config.otlp_endpoint.as_deref(),
        &args.log_level,
    )?;

    match args.command {
        Commands::Sync {
            access_token,
            market,
            music_directory,
            max_in_flight,
            api_base_url,
        } => {
            if let Some(market) = market {
                config.market = Some(market.to_ascii_uppercase());
            }
            if let Some(music_directory) = music_directory {
                config.music_directory = music_directory.to_string_lossy().to_string();
            }
            if max_in_flight.is_some() {
                config.max_in_flight = max_in_flight;
            }
            if let Some(api_base_url) = api_base_url {
                config.api_base_url = api_base_url;
            }
            sync_library(&config, access_token).await?;
        }
        Commands::Config(config_commands) => match config_commands {
            ConfigCommands::CreateDefault => {
                let path = Config::create_default()?;
                tracing::info!("Default config available at {}", path.display());
            }
            ConfigCommands::Path => match Config::config_path() {
                Some(path) => println!("{}", path.display()),
                None => println!("No default config path found"),
            },
        },
    }

    if let Some(tracer_provider) = tracer_provider {
        tracer_provider
            .shutdown()
            .wrap_err("Failed to shut down tracer provider")?;
    }

    Ok(())
}

async fn sync_library(config: &Config, access_token: String) -> Result<()> {
    let client = Arc::new(SpotifyClient::new(
        access_token,
        config.api_base_url()?,
        config.request_timeout(),
    ));
    let music_directory = config.music_directory_path();
    tracing::debug!("Checking local tracks in {}", music_directory.display());

    let session = SyncSession::new(
        client,
        TrackNormalizer::new(music_directory),
        config.fetch_options(),
    );

    let (events, mut receiver) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = receiver.recv().await {
            print_event(event);
        }
    });

    let summary = tokio::select! {
        summary = session.run(events) => Some(summary),
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, cancelling in-flight requests");
            session.teardown();
            None
        }
    };

    printer.await.wrap_err("Event printer failed")?;

    if summary.is_none() {
        let tracks = session.store().snapshot();
        tracing::info!(
            "Sync interrupted after {} tracks ({} already downloaded)",
            tracks.len(),
            tracks.iter().filter(|track| track.local).count()
        );
    }
    Ok(())
}

fn print_event(event: SyncEvent) {
    match event {
        SyncEvent::Connected(user) => println!(
            "Connected as {} <{}>",
            user.display_name.as_deref().unwrap_or("unknown"),
            user.email.as_deref().unwrap_or("no email")
        ),
        SyncEvent::Track(track) => {
            let marker = if track.local { "*" } else { " " };
            println!("{} {}", marker, track);
            tracing::debug!(
                "{} downloads via {} with artwork {}",
                track.filename_final(),
                track.filename_temporary(),
                track.filename_artwork()
            );
        }
        SyncEvent::Failure(failure) => {
            if failure.error.is_timeout() {
                tracing::error!("{:?} timed out: {}", failure.origin, failure.error);
            } else {
                tracing::error!("{:?}: {}", failure.origin, failure.error);
            }
        }
        SyncEvent::Finished(SyncSummary {
            total,
            pages_requested,
            tracks,
            failures,
        }) => println!(
            "Library: {} saved, {} pages requested, {} tracks stored, {} failures",
            total.map_or_else(|| "?".to_string(), |total| total.to_string()),
            pages_requested,
            tracks,
            failures
        ),
    }
}
