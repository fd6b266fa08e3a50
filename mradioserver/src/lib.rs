//! # mradioserver - surface HTTP de MRadio
//!
//! - [`server`] : enveloppe Axum (routers, Swagger UI, arrêt sur Ctrl+C)
//! - [`api`] : flux audio, événements SSE, état et contrôle de la lecture
//! - [`logs`] : initialisation de `tracing` et niveau réglable à chaud
//!
//! ```rust,ignore
//! let log_state = init_logging(LoggingOptions::from_config(&config));
//! let mut server = ServerBuilder::new_configured().build();
//! server.add_router("/", api::create_router(station.clone())).await;
//! server.add_router("/api", logs::create_logs_router(log_state)).await;
//! server.start().await?;
//! server.wait().await;
//! ```

pub mod api;
pub mod logs;
pub mod server;

pub use logs::{init_logging, LogState, LoggingOptions};
pub use server::{Server, ServerBuilder, ServerInfo};
