//! Initialisation du logging et réglage du niveau à chaud
//!
//! Le subscriber est un `Registry` avec un `LevelFilter` rechargeable et,
//! si la configuration le demande, une couche `fmt` vers la console. Le
//! niveau se lit et se change via `GET/POST /api/log_setup`.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use mradioconfig::Config;
use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::{
    filter::LevelFilter, layer::SubscriberExt, reload, util::SubscriberInitExt, Registry,
};

const LEVELS: [Level; 5] = [
    Level::ERROR,
    Level::WARN,
    Level::INFO,
    Level::DEBUG,
    Level::TRACE,
];

/// Accès au filtre de niveau installé par [`init_logging`]
#[derive(Clone)]
pub struct LogState {
    filter: reload::Handle<LevelFilter, Registry>,
}

impl LogState {
    /// Niveau le plus verbeux actuellement émis (`None` si tout est coupé)
    pub fn level(&self) -> Option<Level> {
        self.filter
            .clone_current()
            .and_then(|filter| filter.into_level())
    }

    pub fn set_level(&self, level: Level) -> Result<(), reload::Error> {
        self.filter.reload(LevelFilter::from_level(level))
    }
}

/// Options de la section `host.logger`
#[derive(Debug, Clone)]
pub struct LoggingOptions {
    pub min_level: Level,
    pub enable_console: bool,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            min_level: Level::INFO,
            enable_console: true,
        }
    }
}

impl LoggingOptions {
    /// Une valeur invalide garde le défaut
    pub fn from_config(config: &Config) -> Self {
        let defaults = Self::default();
        let min_level = config
            .get_log_min_level()
            .ok()
            .and_then(|name| parse_level(&name))
            .unwrap_or(defaults.min_level);
        let enable_console = config
            .get_log_enable_console()
            .unwrap_or(defaults.enable_console);

        Self {
            min_level,
            enable_console,
        }
    }
}

/// Installe le subscriber global et retourne l'accès à son filtre
pub fn init_logging(options: LoggingOptions) -> LogState {
    let (filter, handle) = reload::Layer::new(LevelFilter::from_level(options.min_level));

    // `Option<Layer>` est lui-même une couche : `None` n'écrit rien
    let console = options
        .enable_console
        .then(|| tracing_subscriber::fmt::layer().with_target(true));

    Registry::default().with(filter).with(console).init();

    LogState { filter: handle }
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct LogSetupRequest {
    /// ERROR, WARN, INFO, DEBUG ou TRACE (casse indifférente)
    pub level: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct LogSetupResponse {
    pub current_level: String,
    pub available_levels: Vec<String>,
}

impl LogSetupResponse {
    fn describe(level: Option<Level>) -> Self {
        Self {
            current_level: level.map_or("OFF", |l| l.as_str()).to_string(),
            available_levels: LEVELS.iter().map(|l| l.as_str().to_string()).collect(),
        }
    }
}

type LogSetupError = (StatusCode, Json<serde_json::Value>);

fn log_setup_error(status: StatusCode, message: String) -> LogSetupError {
    (
        status,
        Json(serde_json::json!({ "success": false, "message": message })),
    )
}

#[utoipa::path(
    get,
    path = "/api/log_setup",
    responses(
        (status = 200, description = "Current log level", body = LogSetupResponse)
    ),
    tag = "logs"
)]
pub async fn log_setup_get(State(state): State<LogState>) -> Json<LogSetupResponse> {
    Json(LogSetupResponse::describe(state.level()))
}

#[utoipa::path(
    post,
    path = "/api/log_setup",
    request_body = LogSetupRequest,
    responses(
        (status = 200, description = "Log level updated", body = LogSetupResponse),
        (status = 400, description = "Unknown log level")
    ),
    tag = "logs"
)]
pub async fn log_setup_post(
    State(state): State<LogState>,
    Json(request): Json<LogSetupRequest>,
) -> Result<Json<LogSetupResponse>, LogSetupError> {
    let level = parse_level(&request.level).ok_or_else(|| {
        log_setup_error(
            StatusCode::BAD_REQUEST,
            format!("Unknown log level '{}'", request.level),
        )
    })?;

    state.set_level(level).map_err(|e| {
        log_setup_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Cannot change log level: {}", e),
        )
    })?;

    tracing::info!("Log level set to {}", level);
    Ok(Json(LogSetupResponse::describe(Some(level))))
}

/// `warning` est accepté comme synonyme de `warn`
pub fn parse_level(name: &str) -> Option<Level> {
    let name = name.trim();
    if name.eq_ignore_ascii_case("warning") {
        return Some(Level::WARN);
    }
    LEVELS
        .into_iter()
        .find(|level| level.as_str().eq_ignore_ascii_case(name))
}

/// Routes `/log_setup`, à monter sous `/api`
pub fn create_logs_router(state: LogState) -> Router {
    Router::new()
        .route("/log_setup", get(log_setup_get).post(log_setup_post))
        .with_state(state)
}

#[derive(utoipa::OpenApi)]
#[openapi(
    paths(log_setup_get, log_setup_post),
    components(schemas(LogSetupRequest, LogSetupResponse)),
    tags((name = "logs", description = "Runtime log level"))
)]
pub struct LogsApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug"), Some(Level::DEBUG));
        assert_eq!(parse_level(" Warning "), Some(Level::WARN));
        assert_eq!(parse_level("TRACE"), Some(Level::TRACE));
        assert_eq!(parse_level("loud"), None);
    }

    #[test]
    fn test_describe_lists_every_level() {
        let response = LogSetupResponse::describe(Some(Level::INFO));
        assert_eq!(response.current_level, "INFO");
        assert_eq!(
            response.available_levels,
            vec!["ERROR", "WARN", "INFO", "DEBUG", "TRACE"]
        );
        assert_eq!(LogSetupResponse::describe(None).current_level, "OFF");
    }
}
