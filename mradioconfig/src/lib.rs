//! # mradioconfig - Configuration de la station
//!
//! La configuration est un arbre YAML : le fichier `mradio.yaml` embarqué
//! fournit toutes les valeurs par défaut, le fichier `config.yaml` du
//! répertoire de configuration les surcharge, puis les variables
//! d'environnement `MRADIO_CONFIG__SECTION__CLE` surchargent le tout.
//! Le résultat fusionné est réécrit sur disque au chargement.
//!
//! Les crates de la station ne lisent jamais la configuration directement :
//! elles reçoivent des structures d'options construites par des traits
//! d'extension (`CacheConfigExt`, `RelayConfigExt`, ...) implémentés sur
//! [`Config`].
//!
//! ```no_run
//! use mradioconfig::get_config;
//!
//! let config = get_config();
//! let port = config.get_http_port();
//! let min_queue = config.get_min_queue_size()?;
//! config.set_http_port(9000)?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{bail, Context, Result};
use lazy_static::lazy_static;
use serde::de::DeserializeOwned;
use serde_yaml::Value;
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use tracing::{debug, info, warn};

pub mod encryption;
mod tree;

const EMBEDDED_DEFAULTS: &str = include_str!("mradio.yaml");
const CONFIG_FILE: &str = "config.yaml";
const LOCAL_DIR: &str = ".mradio";

const ENV_CONFIG_DIR: &str = "MRADIO_CONFIG";
const ENV_PREFIX: &str = "MRADIO_CONFIG__";

const DEFAULT_HTTP_PORT: u16 = 8000;

lazy_static! {
    static ref CONFIG: Arc<Config> =
        Arc::new(Config::load_config("").expect("Failed to load MRadio configuration"));
}

/// Configuration chargée, partagée par toute la station
#[derive(Debug)]
pub struct Config {
    config_dir: PathBuf,
    file: PathBuf,
    root: Mutex<Value>,
}

/// Choisit le répertoire de configuration
///
/// Ordre : argument explicite, `$MRADIO_CONFIG`, `./.mradio`, `~/.mradio`.
/// Sans rien d'existant, `./.mradio` sera créé.
fn locate_config_dir(explicit: &str) -> PathBuf {
    if !explicit.is_empty() {
        return PathBuf::from(explicit);
    }
    if let Ok(from_env) = env::var(ENV_CONFIG_DIR) {
        debug!(path = %from_env, "Config directory taken from {}", ENV_CONFIG_DIR);
        return PathBuf::from(from_env);
    }

    let local = PathBuf::from(LOCAL_DIR);
    if local.is_dir() {
        return local;
    }
    dirs::home_dir()
        .map(|home| home.join(LOCAL_DIR))
        .filter(|candidate| candidate.is_dir())
        .unwrap_or(local)
}

/// Crée le répertoire au besoin et vérifie qu'on peut y écrire
fn prepare_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Cannot create config directory {}", dir.display()))?;
    if !dir.is_dir() {
        bail!("{} n'est pas un répertoire", dir.display());
    }
    let probe = dir.join(".mradio_write_probe");
    fs::write(&probe, b"")
        .with_context(|| format!("Config directory {} is not writable", dir.display()))?;
    fs::remove_file(&probe)?;
    Ok(())
}

impl Config {
    /// Charge la configuration
    ///
    /// `directory` vide : le répertoire est cherché comme décrit dans
    /// [`locate_config_dir`]. La configuration fusionnée est sauvegardée.
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = locate_config_dir(directory);
        prepare_dir(&config_dir)?;
        let file = config_dir.join(CONFIG_FILE);
        info!(config_dir = %config_dir.display(), "Using config directory");

        let mut root: Value = serde_yaml::from_str(EMBEDDED_DEFAULTS)?;
        match fs::read_to_string(&file) {
            Ok(text) => {
                let user: Value = serde_yaml::from_str(&text)
                    .with_context(|| format!("Invalid YAML in {}", file.display()))?;
                tree::merge(&mut root, &user);
                info!(config_file = %file.display(), "Loaded config file");
            }
            Err(_) => info!(config_file = %file.display(), "No config file, using defaults"),
        }

        let mut root = tree::lowercase_keys(root);
        tree::apply_env_overrides(&mut root, ENV_PREFIX, env::vars());

        let config = Config {
            config_dir,
            file,
            root: Mutex::new(root),
        };
        config.save()?;
        Ok(config)
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Réécrit `config.yaml`
    pub fn save(&self) -> Result<()> {
        let yaml = serde_yaml::to_string(&*self.root.lock().unwrap())?;
        fs::write(&self.file, yaml)
            .with_context(|| format!("Cannot write {}", self.file.display()))
    }

    /// Lit la valeur située sous `path` (ex. `&["host", "http_port"]`)
    ///
    /// Erreur si un élément du chemin n'existe pas.
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let root = self.root.lock().unwrap();
        tree::lookup(&root, path).cloned()
    }

    /// Écrit une valeur puis sauvegarde
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        tree::assign(&mut self.root.lock().unwrap(), path, value)?;
        self.save()
    }

    /// Valeur typée, ou `default` si elle manque ou n'a pas le bon type
    fn typed<T: DeserializeOwned>(&self, path: &[&str], default: T) -> T {
        match self.get_value(path) {
            Ok(value) => serde_yaml::from_value(value).unwrap_or_else(|e| {
                warn!(key = %path.join("."), "Invalid configuration value: {}", e);
                default
            }),
            Err(_) => default,
        }
    }

    /// Répertoire déclaré sous `path`, créé s'il n'existe pas
    ///
    /// Un chemin relatif est résolu par rapport au répertoire de
    /// configuration. Si la clé manque, `default` est enregistré.
    pub fn get_managed_dir(&self, path: &[&str], default: &str) -> Result<PathBuf> {
        let declared = match self.get_value(path) {
            Ok(Value::String(dir)) => dir,
            _ => {
                self.set_managed_dir(path, default.to_string())?;
                default.to_string()
            }
        };

        let dir = self.config_dir.join(&declared);
        if !dir.is_dir() {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Cannot create directory {}", dir.display()))?;
            info!(directory = %dir.display(), "Created managed directory");
        }
        Ok(dir)
    }

    pub fn set_managed_dir(&self, path: &[&str], directory: String) -> Result<()> {
        self.set_value(path, Value::String(directory))
    }

    /// Port HTTP ; accepte un nombre ou une chaîne, 8000 si invalide
    pub fn get_http_port(&self) -> u16 {
        let port = match self.get_value(&["host", "http_port"]) {
            Ok(Value::Number(n)) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
            Ok(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        };
        port.unwrap_or_else(|| {
            warn!("Invalid or missing HTTP port, using {}", DEFAULT_HTTP_PORT);
            DEFAULT_HTTP_PORT
        })
    }

    pub fn set_http_port(&self, port: u16) -> Result<()> {
        self.set_value(&["host", "http_port"], Value::from(port))
    }

    pub fn get_ffmpeg_path(&self) -> Result<String> {
        Ok(self.typed(&["host", "ffmpeg_path"], "ffmpeg".to_string()))
    }

    /// Répertoire des pistes de repli (fallback)
    pub fn get_fallback_dir(&self) -> Result<PathBuf> {
        self.get_managed_dir(&["host", "fallback", "directory"], "media/fallback")
    }

    /// Bibliothèque locale lue par le résolveur de fichiers locaux
    pub fn get_library_dir(&self) -> Result<PathBuf> {
        self.get_managed_dir(&["host", "library", "directory"], "media/library")
    }

    /// Fichiers de données persistées (file de requêtes, playlists)
    pub fn get_data_dir(&self) -> Result<PathBuf> {
        self.get_managed_dir(&["host", "data", "directory"], "data")
    }

    pub fn get_min_queue_size(&self) -> Result<usize> {
        Ok(self.typed(&["station", "min_queue_size"], 2))
    }

    pub fn get_max_fetch_retries(&self) -> Result<usize> {
        Ok(self.typed(&["station", "max_fetch_retries"], 3))
    }

    pub fn get_wait_timeout_secs(&self) -> Result<u64> {
        Ok(self.typed(&["station", "wait_timeout_secs"], 30))
    }

    pub fn get_progress_interval_secs(&self) -> Result<u64> {
        Ok(self.typed(&["station", "progress_interval_secs"], 5))
    }

    pub fn get_heartbeat_interval_secs(&self) -> Result<u64> {
        Ok(self.typed(&["station", "heartbeat_interval_secs"], 15))
    }

    /// Genre des playlists par défaut (`all` : pas de filtre)
    pub fn get_default_genre(&self) -> Result<String> {
        Ok(self.typed(&["station", "default_genre"], "all".to_string()))
    }

    pub fn get_log_min_level(&self) -> Result<String> {
        Ok(self.typed(&["host", "logger", "min_level"], "INFO".to_string()))
    }

    pub fn get_log_enable_console(&self) -> Result<bool> {
        Ok(self.typed(&["host", "logger", "enable_console"], true))
    }
}

/// Configuration globale, chargée au premier accès
pub fn get_config() -> Arc<Config> {
    CONFIG.clone()
}
