//! Extension pour construire le cache depuis mradioconfig
//!
//! Clés utilisées :
//! - `host.cache.directory` : répertoire du cache (défaut `cache`)
//! - `host.cache.max_size` : taille maximale en octets (défaut 1 Gio)
//! - `host.tracks.directory` : répertoire de téléchargement (défaut `media/tracks`)

use crate::CacheManager;
use anyhow::Result;
use mradioconfig::Config;
use serde_yaml::{Number, Value};
use std::path::PathBuf;
use std::sync::Arc;

const DEFAULT_CACHE_DIR: &str = "cache";
const DEFAULT_TRACKS_DIR: &str = "media/tracks";
const DEFAULT_CACHE_MAX_SIZE: u64 = 1024 * 1024 * 1024;

/// Trait d'extension ajoutant la gestion du cache à `mradioconfig::Config`
///
/// ```rust,ignore
/// use mradioconfig::get_config;
/// use mradiocache::CacheConfigExt;
///
/// let cache = get_config().create_cache_manager()?;
/// ```
pub trait CacheConfigExt {
    fn get_cache_dir(&self) -> Result<PathBuf>;
    fn set_cache_dir(&self, directory: String) -> Result<()>;

    /// Taille maximale du cache en octets
    fn get_cache_max_size(&self) -> Result<u64>;
    fn set_cache_max_size(&self, size: u64) -> Result<()>;

    /// Répertoire où les résolveurs déposent les pistes téléchargées
    fn get_tracks_dir(&self) -> Result<PathBuf>;

    /// Crée le gestionnaire de cache configuré
    fn create_cache_manager(&self) -> Result<Arc<CacheManager>>;
}

impl CacheConfigExt for Config {
    fn get_cache_dir(&self) -> Result<PathBuf> {
        self.get_managed_dir(&["host", "cache", "directory"], DEFAULT_CACHE_DIR)
    }

    fn set_cache_dir(&self, directory: String) -> Result<()> {
        self.set_managed_dir(&["host", "cache", "directory"], directory)
    }

    fn get_cache_max_size(&self) -> Result<u64> {
        match self.get_value(&["host", "cache", "max_size"]) {
            Ok(Value::Number(n)) => Ok(n.as_u64().unwrap_or(DEFAULT_CACHE_MAX_SIZE)),
            _ => Ok(DEFAULT_CACHE_MAX_SIZE),
        }
    }

    fn set_cache_max_size(&self, size: u64) -> Result<()> {
        self.set_value(
            &["host", "cache", "max_size"],
            Value::Number(Number::from(size)),
        )
    }

    fn get_tracks_dir(&self) -> Result<PathBuf> {
        self.get_managed_dir(&["host", "tracks", "directory"], DEFAULT_TRACKS_DIR)
    }

    fn create_cache_manager(&self) -> Result<Arc<CacheManager>> {
        let cache_dir = self.get_cache_dir()?;
        let tracks_dir = self.get_tracks_dir()?;
        let max_size = self.get_cache_max_size()?;
        Ok(Arc::new(CacheManager::new(cache_dir, tracks_dir, max_size)?))
    }
}
