//! Layered configuration.
//!
//! Later layers win:
//!
//! 1. built-in defaults,
//! 2. a config file (`--config`, otherwise `config.toml` in the platform
//!    config directory if present); TOML, YAML or JSON by extension,
//! 3. `CACHEMAP_*` environment variables (`CACHEMAP_BLOCK_SIZE=4096`),
//! 4. command-line flags, passed in as [`Overrides`].

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Everything on the command line and in config files is sized in sectors.
pub const SECTOR_SIZE: u64 = 512;
const ENV_PREFIX: &str = "CACHEMAP_";
/// Smallest storage block that holds one index record.
const MIN_INDEX_BLOCK_SIZE: u64 = 28;

/// Resolved settings. Sizes are in bytes unless the name says otherwise.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Fine block size that origin and cache are hashed in.
    pub block_size: u64,
    /// Storage block size of index files.
    pub index_block_size: u64,
    /// Largest region of a device mapped at once.
    pub window_size: u64,
    /// Indexes up to this size are loaded into memory for lookups.
    pub memory_limit: u64,
    /// Cache block size, in sectors.
    pub cache_block_sectors: u64,
}
impl Default for Config {
    fn default() -> Self {
        Self {
            block_size: 16 * SECTOR_SIZE,
            index_block_size: 16 * SECTOR_SIZE,
            window_size: 128 * 1024 * 1024,
            memory_limit: 256 * 1024 * 1024,
            cache_block_sectors: 512,
        }
    }
}
impl Config {
    /// Load and validate configuration from every layer.
    pub fn load(file: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let config: Self = figment(file)?
            .merge(Serialized::defaults(overrides))
            .extract()
            .or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        tracing::debug!(?config, "Loaded configuration");
        Ok(config)
    }

    pub fn cache_block_size(&self) -> u64 {
        self.cache_block_sectors.saturating_mul(SECTOR_SIZE)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("block_size", self.block_size),
            ("index_block_size", self.index_block_size),
            ("window_size", self.window_size),
        ] {
            if value == 0 || value % SECTOR_SIZE != 0 {
                exn::bail!(ErrorKind::Invalid(format!(
                    "{name} must be a non-zero multiple of {SECTOR_SIZE}, got {value}"
                )));
            }
        }
        if self.index_block_size < MIN_INDEX_BLOCK_SIZE {
            exn::bail!(ErrorKind::Invalid(format!(
                "index_block_size must be at least {MIN_INDEX_BLOCK_SIZE}, got {}",
                self.index_block_size
            )));
        }
        if self.window_size % self.block_size != 0 || self.window_size % self.index_block_size != 0 {
            exn::bail!(ErrorKind::Invalid(format!(
                "window_size {} must be a multiple of both block_size {} and index_block_size {}",
                self.window_size, self.block_size, self.index_block_size
            )));
        }
        if self.cache_block_sectors == 0 || self.cache_block_size() % self.block_size != 0 {
            exn::bail!(ErrorKind::Invalid(format!(
                "cache block of {} sectors is not a positive multiple of block_size {}",
                self.cache_block_sectors, self.block_size
            )));
        }
        Ok(())
    }
}

/// Values given on the command line; `None` leaves the lower layers alone.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_block_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_block_sectors: Option<u64>,
}

/// Default config file location, e.g. `~/.config/cachemap/config.toml`.
pub fn default_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "cachemap").map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Defaults, file and environment layers.
fn figment(file: Option<&Path>) -> Result<Figment> {
    let figment = Figment::from(Serialized::defaults(Config::default()));
    let file = match file {
        Some(path) if !path.is_file() => exn::bail!(ErrorKind::NotFound(path.to_path_buf())),
        Some(path) => Some(path.to_path_buf()),
        None => default_path().filter(|path| path.is_file()),
    };
    let figment = match file {
        Some(path) => {
            tracing::debug!(path = %path.display(), "Reading config file");
            match path.extension().and_then(|ext| ext.to_str()) {
                Some("toml") => figment.merge(Toml::file(path)),
                Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
                Some("json") => figment.merge(Json::file(path)),
                _ => exn::bail!(ErrorKind::Invalid(format!(
                    "unsupported config file format: {}",
                    path.display()
                ))),
            }
        },
        None => figment,
    };
    Ok(figment.merge(Env::prefixed(ENV_PREFIX)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;

    fn load(jail_path: Option<&str>, overrides: &Overrides) -> std::result::Result<Config, figment::Error> {
        Config::load(jail_path.map(Path::new), overrides).map_err(|e| figment::Error::from(format!("{e:?}")))
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.block_size, 8192);
        assert_eq!(config.cache_block_size(), 256 * 1024);
    }

    #[test]
    fn test_file_then_env_then_overrides() {
        Jail::expect_with(|jail| {
            jail.create_file("cachemap.toml", "block_size = 4096\nmemory_limit = 1024\ncache_block_sectors = 64")?;
            jail.set_env("CACHEMAP_MEMORY_LIMIT", "2048");
            let overrides = Overrides { cache_block_sectors: Some(128), ..Overrides::default() };
            let config = load(Some("cachemap.toml"), &overrides)?;
            assert_eq!(config.block_size, 4096);
            assert_eq!(config.memory_limit, 2048);
            assert_eq!(config.cache_block_sectors, 128);
            assert_eq!(config.index_block_size, 8192);
            Ok(())
        });
    }

    #[rstest]
    #[case("config.yaml", "block_size: 1024\n")]
    #[case("config.yml", "block_size: 1024\n")]
    #[case("config.json", r#"{"block_size": 1024}"#)]
    fn test_file_formats(#[case] name: &str, #[case] contents: &str) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        let config = Config::load(Some(&path), &Overrides::default()).unwrap();
        assert_eq!(config.block_size, 1024);
    }

    #[test]
    fn test_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let err = Config::load(Some(&path), &Overrides::default()).unwrap_err();
        assert_eq!(*err, ErrorKind::NotFound(path));
    }

    #[test]
    fn test_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ini");
        std::fs::write(&path, "block_size=1").unwrap();
        let err = Config::load(Some(&path), &Overrides::default()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid(_)));
    }

    #[test]
    fn test_unparseable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "block_size = \"big\"").unwrap();
        let err = Config::load(Some(&path), &Overrides::default()).unwrap_err();
        assert_eq!(*err, ErrorKind::Load);
    }

    #[rstest]
    #[case::zero_block(Config { block_size: 0, ..Config::default() })]
    #[case::unaligned_block(Config { block_size: 1000, ..Config::default() })]
    #[case::window_not_multiple(Config { block_size: 3 * 512, ..Config::default() })]
    #[case::zero_cache_block(Config { cache_block_sectors: 0, ..Config::default() })]
    #[case::cache_block_too_small(Config { cache_block_sectors: 8, ..Config::default() })]
    fn test_invalid(#[case] config: Config) {
        let err = config.validate().unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid(_)));
    }
}
