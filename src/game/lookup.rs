use log::{info, warn};
use rustc_hash::FxHashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LookupError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("beatmap cache is not valid JSON: {0}")]
    Cache(#[from] serde_json::Error),
}

/// Resolves a beatmap-identity hash to a `.osu` file path, backed by a
/// persisted hash -> absolute-path JSON map so the songs folder is only
/// walked on a cache miss. Both folders are injected here; nothing in this
/// module reads process-wide state.
pub struct BeatmapLookup {
    songs_folder: PathBuf,
    cache_path: PathBuf,
    cache: FxHashMap<String, String>,
}

impl BeatmapLookup {
    pub fn new(songs_folder: PathBuf, cache_path: PathBuf) -> Self {
        let cache = match load_cache(&cache_path) {
            Ok(cache) => cache,
            Err(e) => {
                warn!("Ignoring beatmap cache at {}: {e}", cache_path.display());
                FxHashMap::default()
            }
        };
        Self {
            songs_folder,
            cache_path,
            cache,
        }
    }

    /// Zero or one matching chart path. A cached path whose file has gone
    /// away falls through to a fresh walk.
    pub fn find(&mut self, beatmap_hash: &str) -> Option<PathBuf> {
        if let Some(cached) = self.cache.get(beatmap_hash) {
            let path = PathBuf::from(cached);
            if path.is_file() {
                info!("Beatmap cache hit: {}", path.display());
                return Some(path);
            }
            warn!("Cached beatmap path {} no longer exists", path.display());
        }

        info!(
            "Searching {} for beatmap {beatmap_hash}",
            self.songs_folder.display()
        );
        let found = scan_folder(&self.songs_folder, beatmap_hash)?;
        info!("Found matching beatmap: {}", found.display());
        self.cache
            .insert(beatmap_hash.to_string(), found.display().to_string());
        if let Err(e) = self.save_cache() {
            warn!("Failed to write beatmap cache: {e}");
        }
        Some(found)
    }

    fn save_cache(&self) -> Result<(), LookupError> {
        let json = serde_json::to_string(&self.cache)?;
        fs::write(&self.cache_path, json)?;
        Ok(())
    }
}

fn load_cache(path: &Path) -> Result<FxHashMap<String, String>, LookupError> {
    if !path.exists() {
        return Ok(FxHashMap::default());
    }
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Depth-first walk for a `.osu` file whose text contains the hash. Charts
/// embed their own MD5 in the metadata section, so a substring match is
/// enough. Non-UTF-8 files are read lossily rather than skipped.
fn scan_folder(dir: &Path, beatmap_hash: &str) -> Option<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Cannot read {}: {e}", dir.display());
            return None;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if let Some(found) = scan_folder(&path, beatmap_hash) {
                return Some(found);
            }
        } else if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("osu")) {
            match fs::read(&path) {
                Ok(bytes) => {
                    if String::from_utf8_lossy(&bytes).contains(beatmap_hash) {
                        return Some(path);
                    }
                }
                Err(e) => warn!("Error reading {}: {e}", path.display()),
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::BeatmapLookup;
    use std::fs;
    use std::path::PathBuf;

    struct TempDir(PathBuf);

    impl TempDir {
        fn new(tag: &str) -> Self {
            let dir = std::env::temp_dir().join(format!(
                "osrview-test-{tag}-{}",
                std::process::id()
            ));
            let _ = fs::remove_dir_all(&dir);
            fs::create_dir_all(dir.join("pack/map")).unwrap();
            Self(dir)
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    const HASH: &str = "d41d8cd98f00b204e9800998ecf8427e";

    #[test]
    fn walk_finds_and_caches_the_chart() {
        let tmp = TempDir::new("walk");
        let chart = tmp.0.join("pack/map/song.osu");
        fs::write(&chart, format!("BeatmapID:1\nhash {HASH} here\n")).unwrap();
        fs::write(tmp.0.join("pack/map/readme.txt"), HASH).unwrap();
        let cache_path = tmp.0.join("beatmap_cache.json");

        let mut lookup = BeatmapLookup::new(tmp.0.clone(), cache_path.clone());
        assert_eq!(lookup.find(HASH), Some(chart.clone()));
        assert!(lookup.find("0000").is_none());

        // A fresh instance resolves from the persisted cache.
        let written = fs::read_to_string(&cache_path).unwrap();
        assert!(written.contains(HASH));
        let mut second = BeatmapLookup::new(tmp.0.join("nonexistent"), cache_path);
        assert_eq!(second.find(HASH), Some(chart));
    }

    #[test]
    fn stale_cache_entry_falls_through_to_the_walk() {
        let tmp = TempDir::new("stale");
        let chart = tmp.0.join("pack/map/song.osu");
        fs::write(&chart, HASH).unwrap();
        let cache_path = tmp.0.join("beatmap_cache.json");
        fs::write(
            &cache_path,
            format!("{{\"{HASH}\":\"{}\"}}", tmp.0.join("gone.osu").display()),
        )
        .unwrap();

        let mut lookup = BeatmapLookup::new(tmp.0.clone(), cache_path);
        assert_eq!(lookup.find(HASH), Some(chart));
    }

    #[test]
    fn corrupt_cache_is_ignored_not_fatal() {
        let tmp = TempDir::new("corrupt");
        let cache_path = tmp.0.join("beatmap_cache.json");
        fs::write(&cache_path, "not json").unwrap();
        let mut lookup = BeatmapLookup::new(tmp.0.clone(), cache_path);
        assert!(lookup.find(HASH).is_none());
    }
}
