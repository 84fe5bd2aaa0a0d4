//! PMTiles Streamer - A tile server for PMTiles archives.
//!
//! This binary starts the HTTP server and configures all components.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pmtiles_streamer::{
    archive::{
        ArchiveProvider, HttpArchiveProvider, LocalArchiveProvider, PmTiles, S3ArchiveProvider,
    },
    cache::{ResolvedValueCache, SharedPromiseCache},
    config::{Backend, Cli, Command, InspectConfig, ServeConfig},
    create_s3_client,
    io::{DefaultDecompressor, FileSource, HttpSource, Source},
    server::{create_router, RouterConfig},
    Header,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve(config) => run_serve(config).await,
        Command::Inspect(config) => run_inspect(config).await,
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let Some(backend) = config.backend() else {
        error!("Configuration error: no archive backend configured");
        return ExitCode::FAILURE;
    };

    info!("PMTiles Streamer v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");

    let provider: Arc<dyn ArchiveProvider> = match backend {
        Backend::S3 { bucket } => {
            info!("  S3 bucket: {}", bucket);
            if let Some(ref endpoint) = config.s3_endpoint {
                info!("  S3 endpoint: {}", endpoint);
            }
            info!("  S3 region: {}", config.s3_region);

            let client = create_s3_client(config.s3_endpoint.as_deref(), &config.s3_region).await;
            Arc::new(S3ArchiveProvider::new(client, bucket).with_template(config.pmtiles_path.clone()))
        }
        Backend::Http { base_url } => {
            info!("  HTTP origin: {}", base_url);
            Arc::new(HttpArchiveProvider::new(base_url).with_template(config.pmtiles_path.clone()))
        }
        Backend::Local { dir } => {
            info!("  Local directory: {}", dir.display());
            if !dir.is_dir() {
                warn!("  {} is not a directory; every request will 404", dir.display());
            }
            Arc::new(LocalArchiveProvider::new(dir).with_template(config.pmtiles_path.clone()))
        }
    };

    if let Some(ref template) = config.pmtiles_path {
        info!("  Archive path template: {}", template);
    }
    info!(
        "  Cache: {} entries, root prefetch {}",
        config.cache_entries,
        if config.no_prefetch { "off" } else { "on" }
    );
    info!("  Cache-Control max-age: {}s", config.cache_max_age);

    if config.allowed_origins.is_empty() {
        info!("  CORS: no origins allowed");
    } else {
        info!("  CORS: {}", config.allowed_origins.join(", "));
    }

    let cache = Arc::new(SharedPromiseCache::new(
        config.cache_entries,
        !config.no_prefetch,
        Arc::new(DefaultDecompressor),
    ));

    let router = create_router(provider, cache, build_router_config(&config));

    let addr = config.bind_address();

    info!("");
    info!("────────────────────────────────────────────────────────────────");
    info!("  Server listening on: http://{}", addr);
    info!("");
    info!("  Try these endpoints:");
    info!("    curl http://{}/health", addr);
    info!("    curl http://{}/<archive>.json", addr);
    info!("    curl http://{}/<archive>/0/0/0.mvt", addr);
    info!("────────────────────────────────────────────────────────────────");
    info!("");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "pmtiles_streamer=debug,tower_http=debug"
    } else {
        "pmtiles_streamer=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the application ServeConfig.
fn build_router_config(config: &ServeConfig) -> RouterConfig {
    RouterConfig::new()
        .with_cache_max_age(config.cache_max_age)
        .with_allowed_origins(config.allowed_origins.clone())
        .with_public_hostname(config.public_hostname.clone())
        .with_tracing(!config.no_tracing)
}

// =============================================================================
// Inspect Command
// =============================================================================

async fn run_inspect(config: InspectConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    let source: Arc<dyn Source> = if config.is_remote() {
        Arc::new(HttpSource::new(config.archive.clone()))
    } else {
        Arc::new(FileSource::new(config.archive.clone()))
    };

    let archive = PmTiles::new(source, Arc::new(ResolvedValueCache::default()));

    let header = match archive.get_header().await {
        Ok(header) => header,
        Err(e) if e.is_not_found() => {
            eprintln!("Error: no archive at '{}'", config.archive);
            return ExitCode::FAILURE;
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    println!("Archive: {}", config.archive);
    println!("═════════════════════════════════");
    print_header(&header);

    match archive.get_metadata().await {
        Ok(metadata) => match serde_json::to_string_pretty(&metadata) {
            Ok(json) => {
                println!();
                println!("Metadata:");
                println!("{}", json);
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        },
        Err(e) => {
            eprintln!("Error reading metadata: {}", e);
            return ExitCode::FAILURE;
        }
    }

    ExitCode::SUCCESS
}

fn print_header(header: &Header) {
    println!("  Spec version:         {}", header.spec_version);
    println!("  Tile type:            {:?}", header.tile_type);
    println!("  Tile compression:     {:?}", header.tile_compression);
    println!("  Internal compression: {:?}", header.internal_compression);
    println!("  Clustered:            {}", header.clustered);
    println!("  Zoom:                 {}-{}", header.min_zoom, header.max_zoom);
    println!(
        "  Bounds:               {}, {}, {}, {}",
        header.min_lon, header.min_lat, header.max_lon, header.max_lat
    );
    println!(
        "  Center:               {}, {} @ z{}",
        header.center_lon, header.center_lat, header.center_zoom
    );
    println!("  Addressed tiles:      {}", header.num_addressed_tiles);
    println!("  Tile entries:         {}", header.num_tile_entries);
    println!("  Tile contents:        {}", header.num_tile_contents);
    println!(
        "  Root directory:       {} bytes @ {}",
        header.root_directory_length, header.root_directory_offset
    );
    println!(
        "  Leaf directories:     {} bytes @ {}",
        header.leaf_directory_length, header.leaf_directory_offset
    );
    println!(
        "  Tile data:            {} bytes @ {}",
        header.tile_data_length, header.tile_data_offset
    );
    if let Some(ref etag) = header.etag {
        println!("  ETag:                 {}", etag);
    }
}
