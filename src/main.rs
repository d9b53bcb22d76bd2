mod cli;

use onair::{
    config,
    server::{self, AppContext},
    station::{
        pipeline::{HttpSource, ToolTranscoder},
        FfmpegPublisher, MediaLookup, SongResolver, SqliteArchive, Station, StationDeps,
        YtDlpLookup,
    },
    sync::ManifestSnapshot,
};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use oa_av::ToolRegistry;
use oa_core::events::EventBus;
use oa_core::{PostId, SongCandidate};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

async fn start_station(
    host: Option<String>,
    port: Option<u16>,
    config_path: Option<&Path>,
) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;

    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config::validate_config(&config)?;
    let config = Arc::new(config);

    tracing::info!("Starting onair stream '{}'", config.stream.name);
    tracing::info!("Publishing to {}", config.publish_url());
    tracing::info!("Watching manifest {}", config.manifest_path().display());

    tracing::info!("Opening archive at {}", config.archive.db_path.display());
    let pool = oa_db::pool::init_pool(&config.archive.db_path).context("Failed to open archive")?;

    let tools = Arc::new(ToolRegistry::discover(&config.tools));
    tools.require("yt-dlp")?;
    let transcoder = ToolTranscoder::ffmpeg(&tools, &config.stream)?;
    let publisher = FfmpegPublisher::for_stream(&tools, &config)?;

    let deps = StationDeps {
        archive: Arc::new(SqliteArchive::new(pool, config.archive.link_source.clone())),
        lookup: Arc::new(YtDlpLookup::new(tools.clone())),
        source: Arc::new(HttpSource::new(&config.source.user_agent)?),
        transcoder: Arc::new(transcoder),
        publisher: Arc::new(publisher),
    };

    let events = Arc::new(EventBus::default());
    let station = Station::new(config.clone(), events.clone(), deps);
    station.start();

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        server::shutdown_signal().await;
        signal.cancel();
    });

    let ctx = AppContext {
        station: station.clone(),
        events,
        config,
    };
    let server_result = server::serve(ctx, shutdown).await;

    tracing::info!("Shutting down...");
    station.teardown().await;

    server_result
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "onair=trace,oa_av=trace,oa_db=debug,tower_http=debug".to_string()
        } else {
            "onair=debug,oa_av=debug,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt().with_env_filter(&env_filter).init();

    match cli.command {
        Commands::Start { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_station(host, port, cli.config.as_deref()))
        }
        Commands::Resolve { link } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(resolve_link(&link, cli.config.as_deref()))
        }
        Commands::Manifest { path, json } => {
            show_manifest(path.as_deref(), cli.config.as_deref(), json)
        }
        Commands::Import { file } => import_posts(&file, cli.config.as_deref()),
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate { file } => {
            let path = file.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("onair {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn resolve_link(link: &str, config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let tools = Arc::new(ToolRegistry::discover(&config.tools));
    let lookup: Arc<dyn MediaLookup> = Arc::new(YtDlpLookup::new(tools));
    let resolver = SongResolver::new(lookup);

    let candidate = SongCandidate {
        id: PostId::new(),
        link: Some(link.to_string()),
        link_source: config.archive.link_source.clone(),
        user_name: "cli".into(),
        text: None,
        date_posted: chrono::Utc::now(),
        has_been_played: false,
    };

    let Some(song) = resolver.resolve(&candidate).await? else {
        anyhow::bail!("{link} is not playable (bad link or no audio-only encoding)");
    };

    println!("{}", serde_json::to_string_pretty(&song)?);
    if song.exceeds(config.stream.max_clip_bytes) {
        println!(
            "\nNote: {} bytes exceeds the {} byte cap; the queue would skip it.",
            song.length, config.stream.max_clip_bytes
        );
    }
    Ok(())
}

fn show_manifest(path: Option<&Path>, config_path: Option<&Path>, json: bool) -> Result<()> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config::load_config_or_default(config_path)?.manifest_path(),
    };

    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read manifest: {:?}", path))?;
    let snapshot = ManifestSnapshot::parse(&text)
        .with_context(|| format!("Failed to parse manifest: {:?}", path))?;
    let summary = snapshot.summary();

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Manifest: {}", path.display());
    println!("Target duration: {}s", summary.target_duration);
    match summary.media_sequence {
        Some(seq) => println!("Media sequence: {}", seq),
        None => println!("Media sequence: (not declared)"),
    }
    println!("Segments: {} ({:.1}s window)", summary.segments, summary.window_secs);
    if let Some(ref first) = summary.first_uri {
        println!("  Oldest: {}", first);
    }
    if let Some(ref last) = summary.last_uri {
        println!("  Newest: {}", last);
    }
    if summary.ended {
        println!("Playlist has ended");
    }
    Ok(())
}

fn import_posts(file: &Path, config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;

    let content =
        std::fs::read_to_string(file).with_context(|| format!("Failed to read {:?}", file))?;
    let posts: Vec<oa_db::models::NewPost> =
        serde_json::from_str(&content).with_context(|| format!("Failed to parse {:?}", file))?;

    let pool = oa_db::pool::init_pool(&config.archive.db_path)?;
    let conn = oa_db::pool::get_conn(&pool)?;
    let inserted = oa_db::queries::posts::import_posts(&conn, &posts)?;

    println!(
        "Imported {} of {} posts into {}",
        inserted,
        posts.len(),
        config.archive.db_path.display()
    );
    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = config::load_config_or_default(config_path)?;
    let tools = ToolRegistry::discover(&config.tools).check_all();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version.lines().next().unwrap_or(""));
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. The station cannot go live without them.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            config::load_config(p)?
        }
        None => {
            println!("No config file specified, using defaults");
            config::Config::default()
        }
    };

    println!("✓ Configuration is valid");
    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Stream: {} -> {}", config.stream.name, config.publish_url());
    println!("  Manifest: {}", config.manifest_path().display());
    println!("  Archive: {} ({})", config.archive.db_path.display(), config.archive.link_source);
    println!("  Clip cap: {} bytes", config.stream.max_clip_bytes);

    let warnings = config.validate();
    if !warnings.is_empty() {
        println!("\nWarnings:");
        for warning in warnings {
            println!("  - {}", warning);
        }
    }

    Ok(())
}
