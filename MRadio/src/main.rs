use mradiocache::CacheConfigExt;
use mradioconfig::get_config;
use mradioplayer::{StationBuilder, StationConfigExt};
use mradiorelay::{FfmpegRelayEncoder, RelayConfigExt, RelayStreamer};
use mradioserver::{api, init_logging, logs, LoggingOptions, ServerBuilder};
use mradiosource::{
    FfmpegProbe, LocalLibraryResolver, NextTrackFetcher, OrderedStore, ResolverRegistry,
    SourceConfigExt,
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = get_config();
    let log_state = init_logging(LoggingOptions::from_config(&config));
    info!("📻 Starting MRadio (config in {})", config.config_dir().display());

    // ========== PHASE 1 : Stockage ==========

    let cache = config.create_cache_manager()?;
    info!(
        "💾 Cache ready at {} ({} bytes max)",
        cache.cache_dir().display(),
        cache.max_size()
    );

    let requests = config.open_request_store()?;
    let playlists = config.open_playlist_store()?;
    let playlist_tracks = config.open_playlist_track_store()?;
    info!("📋 {} pending request(s)", requests.len());

    // ========== PHASE 2 : Sources et station ==========

    let ffmpeg = config.get_ffmpeg_path()?;
    let probe = Arc::new(FfmpegProbe::new(ffmpeg));
    let library = LocalLibraryResolver::new(config.get_library_dir()?).with_probe(probe.clone());
    let resolvers = Arc::new(ResolverRegistry::new().with(Arc::new(library)));
    info!("🎵 Local library resolver registered");

    let fetcher = NextTrackFetcher::new(
        requests.clone(),
        playlists,
        playlist_tracks,
        resolvers,
        cache.clone(),
        config.fetcher_options()?,
    );

    let mut builder = config.configure_station(StationBuilder::new(
        cache,
        Arc::new(fetcher),
        requests,
    ))?;

    let relay_config = config.get_relay_config()?;
    if relay_config.enabled {
        info!("📡 Relay enabled: {}", relay_config.display_url());
    }
    builder = builder.relay(RelayStreamer::new(
        relay_config,
        Arc::new(FfmpegRelayEncoder),
    ));

    let station = Arc::new(builder.build());

    // ========== PHASE 3 : Serveur HTTP ==========

    let mut server = ServerBuilder::new_configured().build();
    server
        .add_router("/", api::create_router(station.clone()))
        .await;
    server
        .add_router("/api", logs::create_logs_router(log_state))
        .await;
    server.add_openapi(api::openapi(), "mradio").await;

    info!("🌐 Starting HTTP server...");
    server.start().await?;

    if let Err(e) = station.start().await {
        tracing::error!("❌ Playback failed to start: {}", e);
    }

    info!("✅ MRadio is on air!");
    info!("Press Ctrl+C to stop...");
    server.wait().await;

    station.shutdown().await;
    info!("👋 MRadio stopped");
    Ok(())
}
