//! Station settings read from mradioconfig

use crate::engine::EngineOptions;
use crate::station::StationBuilder;
use crate::transcoder::FfmpegTranscoder;
use anyhow::Result;
use mradioconfig::Config;
use mradiosource::FfmpegProbe;
use std::sync::Arc;
use std::time::Duration;

/// Extension trait for `mradioconfig::Config`
///
/// ```rust,ignore
/// use mradioconfig::get_config;
/// use mradioplayer::{StationBuilder, StationConfigExt};
///
/// let config = get_config();
/// let station = config
///     .configure_station(StationBuilder::new(cache, fetcher, requests))?
///     .build();
/// ```
pub trait StationConfigExt {
    /// Engine options (queue wait, progress period)
    fn engine_options(&self) -> Result<EngineOptions>;

    fn heartbeat_interval(&self) -> Result<Duration>;

    /// Applies the `station` section and the ffmpeg path to the builder
    fn configure_station(&self, builder: StationBuilder) -> Result<StationBuilder>;
}

impl StationConfigExt for Config {
    fn engine_options(&self) -> Result<EngineOptions> {
        Ok(EngineOptions {
            wait_timeout: Duration::from_secs(self.get_wait_timeout_secs()?),
            progress_interval: Duration::from_secs(self.get_progress_interval_secs()?.max(1)),
            ..EngineOptions::default()
        })
    }

    fn heartbeat_interval(&self) -> Result<Duration> {
        Ok(Duration::from_secs(
            self.get_heartbeat_interval_secs()?.max(1),
        ))
    }

    fn configure_station(&self, builder: StationBuilder) -> Result<StationBuilder> {
        let ffmpeg = self.get_ffmpeg_path()?;
        Ok(builder
            .min_queue_size(self.get_min_queue_size()?)
            .engine_options(self.engine_options()?)
            .heartbeat_interval(self.heartbeat_interval()?)
            .probe(Arc::new(FfmpegProbe::new(ffmpeg.clone())))
            .transcoder(Arc::new(FfmpegTranscoder::new(ffmpeg))))
    }
}
