use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Caractères interdits dans un nom de fichier portable
const FORBIDDEN_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Extension des fichiers du cache
const CACHE_EXTENSION: &str = "mp3";

/// Construit le nom de fichier associé à un titre
///
/// Les caractères `< > : " / \ | ? *` sont supprimés et l'extension `.mp3`
/// est ajoutée. La transformation est déterministe : le même titre donne
/// toujours le même fichier.
pub fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| !FORBIDDEN_CHARS.contains(c))
        .collect();
    format!("{}.{}", cleaned, CACHE_EXTENSION)
}

/// Résultat d'un passage d'éviction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Nombre de fichiers examinés
    pub scanned: usize,
    /// Nombre de fichiers supprimés
    pub evicted: usize,
    /// Taille totale restante dans le cache (octets)
    pub remaining_bytes: u64,
}

#[derive(Debug)]
struct CacheEntry {
    path: PathBuf,
    size: u64,
    accessed: SystemTime,
}

/// Gestionnaire du cache disque
///
/// Deux répertoires sont gérés :
/// - `cache_dir` : pistes déjà jouées, bornées à `max_size` octets
/// - `scratch_dir` : pistes téléchargées en attente de lecture
#[derive(Debug, Clone)]
pub struct CacheManager {
    cache_dir: PathBuf,
    scratch_dir: PathBuf,
    max_size: u64,
}

impl CacheManager {
    /// Crée un gestionnaire et les deux répertoires s'ils n'existent pas
    pub fn new(
        cache_dir: impl AsRef<Path>,
        scratch_dir: impl AsRef<Path>,
        max_size: u64,
    ) -> Result<Self> {
        let cache_dir = cache_dir.as_ref().to_path_buf();
        let scratch_dir = scratch_dir.as_ref().to_path_buf();

        std::fs::create_dir_all(&cache_dir)
            .with_context(|| format!("Cannot create cache directory {}", cache_dir.display()))?;
        std::fs::create_dir_all(&scratch_dir).with_context(|| {
            format!("Cannot create scratch directory {}", scratch_dir.display())
        })?;

        Ok(Self {
            cache_dir,
            scratch_dir,
            max_size,
        })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Chemin que la piste occupe (ou occuperait) dans le cache
    pub fn get_cached_path(&self, title: &str) -> PathBuf {
        self.cache_dir.join(sanitize_title(title))
    }

    /// Chemin de téléchargement de la piste dans le répertoire de travail
    pub fn get_original_path(&self, title: &str) -> PathBuf {
        self.scratch_dir.join(sanitize_title(title))
    }

    pub fn is_cached(&self, title: &str) -> bool {
        self.get_cached_path(title).is_file()
    }

    /// Indique si `path` se trouve dans le répertoire de travail
    pub fn is_scratch_path(&self, path: &Path) -> bool {
        if path.starts_with(&self.scratch_dir) {
            return true;
        }
        match (path.canonicalize(), self.scratch_dir.canonicalize()) {
            (Ok(path), Ok(scratch)) => path.starts_with(scratch),
            _ => false,
        }
    }

    /// Chemin en cache de la piste, ou `None` si elle n'y est pas
    pub fn get_from_cache(&self, title: &str) -> Option<PathBuf> {
        let path = self.get_cached_path(title);
        path.is_file().then_some(path)
    }

    /// Déplace un fichier dans le cache puis lance un passage d'éviction
    ///
    /// Retourne `Ok(false)` si le fichier source n'existe pas. Un échec de
    /// copie est une erreur ; un échec de suppression de la source est
    /// seulement journalisé.
    pub async fn move_to_cache(&self, source: &Path, title: &str) -> Result<bool> {
        if !tokio::fs::try_exists(source).await.unwrap_or(false) {
            tracing::debug!(source = %source.display(), "Nothing to cache, source is missing");
            return Ok(false);
        }

        let target = self.get_cached_path(title);
        if source != target {
            tokio::fs::copy(source, &target).await.with_context(|| {
                format!(
                    "Cannot copy {} to cache {}",
                    source.display(),
                    target.display()
                )
            })?;

            if let Err(e) = tokio::fs::remove_file(source).await {
                tracing::warn!(
                    source = %source.display(),
                    "Copied to cache but failed to delete source: {}",
                    e
                );
            }
        }

        tracing::debug!(title = %title, path = %target.display(), "Track moved to cache");

        if let Err(e) = self.cleanup_if_needed().await {
            tracing::warn!("Cache cleanup after move failed: {}", e);
        }

        Ok(true)
    }

    async fn list_entries(&self) -> Result<Vec<CacheEntry>> {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.cache_dir).await?;

        while let Some(dir_entry) = dir.next_entry().await? {
            let metadata = match dir_entry.metadata().await {
                Ok(m) if m.is_file() => m,
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(path = %dir_entry.path().display(), "Cannot stat cache entry: {}", e);
                    continue;
                }
            };

            let accessed = metadata
                .accessed()
                .or_else(|_| metadata.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);

            entries.push(CacheEntry {
                path: dir_entry.path(),
                size: metadata.len(),
                accessed,
            });
        }

        Ok(entries)
    }

    /// Taille totale des fichiers du cache (octets)
    pub async fn total_size(&self) -> Result<u64> {
        Ok(self.list_entries().await?.iter().map(|e| e.size).sum())
    }

    /// Supprime les fichiers les moins récemment lus tant que la taille
    /// totale dépasse `max_size`
    ///
    /// Un échec de suppression est journalisé et le passage continue avec
    /// l'entrée suivante.
    pub async fn cleanup_if_needed(&self) -> Result<CleanupReport> {
        let entries = self.list_entries().await?;
        Ok(self.evict(entries).await)
    }

    /// Passage d'éviction sur une liste déjà relevée
    ///
    /// La liste peut être périmée : une entrée disparue entre-temps échoue
    /// comme n'importe quelle suppression.
    async fn evict(&self, mut entries: Vec<CacheEntry>) -> CleanupReport {
        entries.sort_by_key(|e| e.accessed);

        let scanned = entries.len();
        let mut total: u64 = entries.iter().map(|e| e.size).sum();
        let mut evicted = 0;

        for entry in entries {
            if total <= self.max_size {
                break;
            }
            match tokio::fs::remove_file(&entry.path).await {
                Ok(()) => {
                    total -= entry.size;
                    evicted += 1;
                    tracing::debug!(path = %entry.path.display(), size = entry.size, "Evicted from cache");
                }
                Err(e) => {
                    tracing::warn!(path = %entry.path.display(), "Error evicting cache entry: {}", e);
                }
            }
        }

        if evicted > 0 {
            tracing::info!(
                "LRU eviction: removed {} files ({} bytes remaining, limit {})",
                evicted,
                total,
                self.max_size
            );
        }

        CleanupReport {
            scanned,
            evicted,
            remaining_bytes: total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_title() {
        assert_eq!(sanitize_title("AC/DC: Back?"), "ACDC Back.mp3");
        assert_eq!(sanitize_title(r#"a<b>c"d\e|f*"#), "abcdef.mp3");
        assert_eq!(sanitize_title("Plain"), "Plain.mp3");
    }

    #[test]
    fn test_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let cache =
            CacheManager::new(tmp.path().join("cache"), tmp.path().join("tracks"), 10).unwrap();

        assert_eq!(
            cache.get_cached_path("A/B"),
            tmp.path().join("cache").join("AB.mp3")
        );
        let original = cache.get_original_path("A/B");
        assert!(cache.is_scratch_path(&original));
        assert!(!cache.is_scratch_path(&cache.get_cached_path("A/B")));
        assert!(!cache.is_cached("A/B"));
        assert!(cache.get_from_cache("A/B").is_none());
    }

    #[tokio::test]
    async fn test_failed_eviction_does_not_stop_the_sweep() {
        let tmp = tempfile::tempdir().unwrap();
        let cache =
            CacheManager::new(tmp.path().join("cache"), tmp.path().join("tracks"), 200).unwrap();

        let now = SystemTime::now();
        let entry = |title: &str, age: u64| CacheEntry {
            path: cache.get_cached_path(title),
            size: 100,
            accessed: now - std::time::Duration::from_secs(age),
        };
        for title in ["older", "newer"] {
            std::fs::write(cache.get_cached_path(title), vec![0u8; 100]).unwrap();
        }

        // "ghost" a été supprimé par un tiers après le relevé
        let report = cache
            .evict(vec![entry("newer", 10), entry("ghost", 300), entry("older", 200)])
            .await;

        assert_eq!(report.scanned, 3);
        assert_eq!(report.evicted, 1);
        assert_eq!(report.remaining_bytes, 200);
        assert!(!cache.is_cached("older"));
        assert!(cache.is_cached("newer"));
    }
}
