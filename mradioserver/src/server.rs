//! # Enveloppe Axum de la station
//!
//! - 🚀 **Routes** : sous-routers fusionnés ou imbriqués avec `add_router()`
//! - 📚 **Documentation API** : Swagger UI avec `add_openapi()`
//! - ⚡ **Arrêt** : sur Ctrl+C ou via `shutdown()`

use anyhow::{Context, Result};
use axum::Router;
use mradioconfig::get_config;
use serde::Serialize;
use std::future::IntoFuture;
use std::net::SocketAddr;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use utoipa_swagger_ui::SwaggerUi;

#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub http_port: u16,
}

/// Serveur HTTP
///
/// Les routes sont assemblées avant `start()` ; le router est figé au
/// démarrage.
pub struct Server {
    name: String,
    http_port: u16,
    router: Router,
    serving: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl Server {
    /// `http_port` à 0 : port libre choisi par l'OS
    pub fn new(name: impl Into<String>, http_port: u16) -> Self {
        Self {
            name: name.into(),
            http_port,
            router: Router::new(),
            serving: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn new_configured() -> Self {
        ServerBuilder::new_configured().build()
    }

    /// Ajoute un sous-router
    ///
    /// `path` égal à `/` : fusion au niveau racine, sinon imbrication sous
    /// `path`.
    pub async fn add_router(&mut self, path: &str, routes: Router) {
        let current = std::mem::take(&mut self.router);
        let prefix = path.trim_matches('/');
        self.router = if prefix.is_empty() {
            current.merge(routes)
        } else {
            current.nest(&format!("/{}", prefix), routes)
        };
    }

    /// Sert `openapi` sur `/api-docs/{name}.json` et son Swagger UI sur
    /// `/swagger-ui/{name}`
    pub async fn add_openapi(&mut self, openapi: utoipa::openapi::OpenApi, name: &str) {
        // SwaggerUi ne prend que des chemins 'static ; appelé une fois par doc
        let ui: &'static str = Box::leak(format!("/swagger-ui/{}", name).into_boxed_str());
        let json_path: &'static str = Box::leak(format!("/api-docs/{}.json", name).into_boxed_str());

        let current = std::mem::take(&mut self.router);
        self.router = current.merge(SwaggerUi::new(ui).url(json_path, openapi));
    }

    pub async fn router(&self) -> Router {
        self.router.clone()
    }

    /// Écoute sur toutes les interfaces et retourne l'adresse effective
    ///
    /// Les flux audio n'ont pas de fin naturelle : à l'arrêt, le serveur
    /// cesse d'accepter des connexions sans attendre celles en cours.
    pub async fn start(&mut self) -> Result<SocketAddr> {
        let listener = tokio::net::TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], self.http_port)))
            .await
            .with_context(|| format!("Cannot bind HTTP port {}", self.http_port))?;
        let local = listener.local_addr()?;
        info!("🌐 Server {} running at http://{}", self.name, local);

        let serve = axum::serve(listener, self.router.clone().into_make_service());
        let cancel = self.cancel.clone();
        self.serving = Some(tokio::spawn(async move {
            tokio::select! {
                result = serve.into_future() => {
                    if let Err(e) = result {
                        tracing::error!("HTTP server error: {}", e);
                    }
                }
                signal = tokio::signal::ctrl_c() => match signal {
                    Ok(()) => info!("Ctrl+C received, shutting down"),
                    Err(e) => tracing::error!("Cannot listen for Ctrl+C: {}", e),
                },
                _ = cancel.cancelled() => info!("Shutdown requested"),
            }
        }));
        Ok(local)
    }

    /// Attend l'arrêt du serveur
    pub async fn wait(&mut self) {
        if let Some(serving) = self.serving.take() {
            let _ = serving.await;
        }
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn info(&self) -> ServerInfo {
        ServerInfo {
            name: self.name.clone(),
            http_port: self.http_port,
        }
    }
}

pub struct ServerBuilder {
    name: String,
    http_port: u16,
}

impl ServerBuilder {
    pub fn new(name: impl Into<String>, http_port: u16) -> Self {
        Self {
            name: name.into(),
            http_port,
        }
    }

    /// Port lu dans `host.http_port`
    pub fn new_configured() -> Self {
        Self::new("MRadio", get_config().get_http_port())
    }

    pub fn http_port(mut self, port: u16) -> Self {
        self.http_port = port;
        self
    }

    pub fn build(self) -> Server {
        Server::new(self.name, self.http_port)
    }
}
