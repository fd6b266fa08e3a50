//! # mradiocache - Cache disque des pistes jouées
//!
//! Les résolveurs téléchargent les pistes dans un répertoire de travail
//! (*scratch*). Une fois qu'une piste a été jouée, le moteur de lecture la
//! déplace dans le cache, dont la taille totale est bornée : au-delà de la
//! limite, les fichiers les moins récemment lus sont supprimés en premier.
//!
//! ```text
//! tracks/ (scratch)  --move_to_cache-->  cache/  --cleanup_if_needed-->  (évincé)
//! ```
//!
//! La date de dernier accès est celle que rapporte le système de fichiers
//! (mise à jour par les lectures externes, typiquement le transcodeur).
//!
//! ## Utilisation
//!
//! ```rust,no_run
//! use mradiocache::CacheManager;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let cache = CacheManager::new("./cache", "./tracks", 1 << 30)?;
//! if let Some(path) = cache.get_from_cache("Artist - Title") {
//!     println!("cached at {}", path.display());
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;

#[cfg(feature = "mradioconfig")]
pub mod config_ext;

pub use cache::{sanitize_title, CacheManager, CleanupReport};

#[cfg(feature = "mradioconfig")]
pub use config_ext::CacheConfigExt;
