mod settings;

use crate::config::settings::PartialSettings;
use config::{Config, ConfigError, Environment, File};

pub use settings::{ProducerSettings, RealtimeSettings, ServerSettings, Settings};

/// Loads the configuration from the default file and environment variables.
///
/// A `.env` file in the working directory is read first so its variables take
/// part in the environment source. Values present in neither place fall back
/// to `Settings::default()`. Zero intervals are rejected.
pub fn load_config() -> Result<Settings, ConfigError> {
    let _ = dotenvy::dotenv();

    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix("ENVSUB")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;
    let partial: PartialSettings = config.try_deserialize()?;

    let settings = merge(partial, Settings::default());
    settings.validate()?;
    Ok(settings)
}

fn merge(partial: PartialSettings, default: Settings) -> Settings {
    let server = partial.server.as_ref();
    let realtime = partial.realtime.as_ref();
    let producers = partial.producers.as_ref();

    Settings {
        server: ServerSettings {
            host: server
                .and_then(|s| s.host.clone())
                .unwrap_or(default.server.host),
            port: server.and_then(|s| s.port).unwrap_or(default.server.port),
            status_port: server
                .and_then(|s| s.status_port)
                .unwrap_or(default.server.status_port),
        },
        realtime: RealtimeSettings {
            max_connections: realtime
                .and_then(|r| r.max_connections)
                .unwrap_or(default.realtime.max_connections),
            receive_timeout_secs: realtime
                .and_then(|r| r.receive_timeout_secs)
                .unwrap_or(default.realtime.receive_timeout_secs),
            stale_threshold_secs: realtime
                .and_then(|r| r.stale_threshold_secs)
                .unwrap_or(default.realtime.stale_threshold_secs),
            sweep_interval_secs: realtime
                .and_then(|r| r.sweep_interval_secs)
                .unwrap_or(default.realtime.sweep_interval_secs),
            heartbeat_interval_secs: realtime
                .and_then(|r| r.heartbeat_interval_secs)
                .unwrap_or(default.realtime.heartbeat_interval_secs),
            timelapse_stage_delay_ms: realtime
                .and_then(|r| r.timelapse_stage_delay_ms)
                .unwrap_or(default.realtime.timelapse_stage_delay_ms),
        },
        producers: ProducerSettings {
            environmental_interval_secs: producers
                .and_then(|p| p.environmental_interval_secs)
                .unwrap_or(default.producers.environmental_interval_secs),
            environmental_retry_secs: producers
                .and_then(|p| p.environmental_retry_secs)
                .unwrap_or(default.producers.environmental_retry_secs),
            hazards_interval_secs: producers
                .and_then(|p| p.hazards_interval_secs)
                .unwrap_or(default.producers.hazards_interval_secs),
            hazards_retry_secs: producers
                .and_then(|p| p.hazards_retry_secs)
                .unwrap_or(default.producers.hazards_retry_secs),
            alerts_interval_secs: producers
                .and_then(|p| p.alerts_interval_secs)
                .unwrap_or(default.producers.alerts_interval_secs),
            alerts_retry_secs: producers
                .and_then(|p| p.alerts_retry_secs)
                .unwrap_or(default.producers.alerts_retry_secs),
            satellite_interval_secs: producers
                .and_then(|p| p.satellite_interval_secs)
                .unwrap_or(default.producers.satellite_interval_secs),
            satellite_retry_secs: producers
                .and_then(|p| p.satellite_retry_secs)
                .unwrap_or(default.producers.satellite_retry_secs),
        },
    }
}
