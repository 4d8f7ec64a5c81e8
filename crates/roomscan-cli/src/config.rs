//! Configuration vault – reads/writes `~/.roomscan/config.toml`.
//!
//! The file carries CLI output preferences plus a `[pipeline]` table that
//! deserialises straight into [`PipelineConfig`]; every key is optional.
//!
//! ```toml
//! [output]
//! pretty = false
//!
//! [pipeline]
//! seed = 7
//!
//! [pipeline.preprocess]
//! voxel_size = 0.03
//! ```

use roomscan_perception::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// How reports and clouds are written to stdout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Indented JSON instead of one line.
    #[serde(default = "default_pretty")]
    pub pretty: bool,
}

fn default_pretty() -> bool {
    true
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            pretty: default_pretty(),
        }
    }
}

/// Persisted user configuration stored in `~/.roomscan/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Return the path to `~/.roomscan/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".roomscan").join("config.toml")
}

/// Load the config from `explicit` or the default location, falling back to
/// defaults when no file exists.  Environment overrides are always applied.
pub fn resolve(explicit: Option<&Path>) -> Result<Config, String> {
    let loaded = match explicit {
        Some(path) => {
            let cfg = load_from(path)?;
            if cfg.is_none() {
                return Err(format!("Config file {} does not exist", path.display()));
            }
            cfg
        }
        None => load_from(&config_path())?,
    };
    let mut cfg = loaded.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Load the config from a specific path.  Returns `None` if the file does
/// not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `ROOMSCAN_*` environment variable overrides to `cfg`.
///
/// Unparseable values are ignored.
///
/// | Variable | Config field |
/// |---|---|
/// | `ROOMSCAN_SEED` | `pipeline.seed` |
/// | `ROOMSCAN_VOXEL_SIZE` | `pipeline.preprocess.voxel_size` |
/// | `ROOMSCAN_MAX_PLANES` | `pipeline.planes.max_planes` |
/// | `ROOMSCAN_DBSCAN_EPS` | `pipeline.clustering.eps` |
/// | `ROOMSCAN_DBSCAN_MIN_POINTS` | `pipeline.clustering.min_points` |
pub fn apply_env_overrides(cfg: &mut Config) {
    let p = &mut cfg.pipeline;
    if let Some(seed) = env_parse("ROOMSCAN_SEED") {
        p.seed = seed;
    }
    if let Some(voxel) = env_parse("ROOMSCAN_VOXEL_SIZE") {
        p.preprocess.voxel_size = voxel;
    }
    if let Some(n) = env_parse("ROOMSCAN_MAX_PLANES") {
        p.planes.max_planes = n;
    }
    if let Some(eps) = env_parse("ROOMSCAN_DBSCAN_EPS") {
        p.clustering.eps = eps;
    }
    if let Some(n) = env_parse("ROOMSCAN_DBSCAN_MIN_POINTS") {
        p.clustering.min_points = n;
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.trim().parse().ok()
}

/// Save the config to disk, creating `~/.roomscan/` if necessary.
pub fn save(cfg: &Config) -> Result<PathBuf, String> {
    let path = config_path();
    save_to(cfg, &path)?;
    Ok(path)
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw = to_toml(cfg)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

pub fn to_toml(cfg: &Config) -> Result<String, String> {
    toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let dir_mode = std::fs::metadata(path.parent().unwrap())
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");
        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded, Config::default());
        assert_eq!(loaded.pipeline.classifier.rules.len(), 7);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("partial.toml");
        let raw = "[output]\npretty = false\n\n\
                   [pipeline]\nseed = 7\n\n\
                   [pipeline.preprocess]\nvoxel_size = 0.03\n";
        std::fs::write(&path, raw).unwrap();

        let cfg = load_from(&path).unwrap().unwrap();
        assert!(!cfg.output.pretty);
        assert_eq!(cfg.pipeline.seed, 7);
        assert_eq!(cfg.pipeline.preprocess.voxel_size, 0.03);
        assert_eq!(cfg.pipeline.preprocess.outlier_neighbors, 20);
        assert_eq!(cfg.pipeline.planes, PipelineConfig::default().planes);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[pipeline\nseed = ").unwrap();
        let err = load_from(&path).unwrap_err();
        assert!(err.contains("Failed to parse config"));
    }

    #[test]
    fn config_path_points_to_roomscan_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".roomscan"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let missing = dir.path().join("absent.toml");
        let err = resolve(Some(missing.as_path())).unwrap_err();
        assert!(err.contains("does not exist"));
    }

    #[test]
    fn apply_env_overrides_changes_seed() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("ROOMSCAN_SEED", "1234") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.pipeline.seed, 1234);
        unsafe { std::env::remove_var("ROOMSCAN_SEED") };
    }

    #[test]
    fn apply_env_overrides_changes_voxel_size() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("ROOMSCAN_VOXEL_SIZE", "0.02") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.pipeline.preprocess.voxel_size, 0.02);
        unsafe { std::env::remove_var("ROOMSCAN_VOXEL_SIZE") };
    }

    #[test]
    fn apply_env_overrides_changes_dbscan_parameters() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe {
            std::env::set_var("ROOMSCAN_DBSCAN_EPS", "0.2");
            std::env::set_var("ROOMSCAN_DBSCAN_MIN_POINTS", "12");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.pipeline.clustering.eps, 0.2);
        assert_eq!(cfg.pipeline.clustering.min_points, 12);
        unsafe {
            std::env::remove_var("ROOMSCAN_DBSCAN_EPS");
            std::env::remove_var("ROOMSCAN_DBSCAN_MIN_POINTS");
        }
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_plane_count() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("ROOMSCAN_MAX_PLANES", "many") };
        let mut cfg = Config::default();
        let original = cfg.pipeline.planes.max_planes;
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.pipeline.planes.max_planes, original);
        unsafe { std::env::remove_var("ROOMSCAN_MAX_PLANES") };
    }
}
