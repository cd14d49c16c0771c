use std::collections::HashMap;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;

use crate::aggregator::KeyFinderAggregator;
use crate::profiles::{CustomProfileConfig, ProfileRegistry};
use crate::trellis::{FinderError, FinderSettings};

/// Application configuration loaded from TOML config file.
/// All fields have sensible defaults — the config file is optional.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Weight kept by an observation when the path changes key.
    pub penalty: f64,
    /// Share of the winning path a key needs before it is reported.
    pub modulation_tolerance: f64,
    /// Score pitch-class presence instead of duration.
    pub flatten: bool,
    /// Profiles to run (names or aliases). Empty = every registered profile.
    pub profiles: Vec<String>,
    /// Number of parallel workers for batch analysis. 0 = auto-detect (cores / 2, min 1).
    pub workers: usize,
    /// Extra profiles, registered after the built-ins.
    pub custom_profiles: Vec<CustomProfileConfig>,
    /// Per-profile settings, keyed by profile name or alias.
    pub overrides: HashMap<String, ProfileOverride>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            penalty: 0.8,
            modulation_tolerance: 0.3,
            flatten: true,
            profiles: Vec::new(),
            workers: 0,
            custom_profiles: Vec::new(),
            overrides: HashMap::new(),
        }
    }
}

/// Settings that replace the shared ones for a single profile.
#[derive(Debug, Deserialize, Default, Clone, Copy)]
#[serde(default)]
pub struct ProfileOverride {
    pub penalty: Option<f64>,
    pub modulation_tolerance: Option<f64>,
    pub flatten: Option<bool>,
}

impl ProfileOverride {
    fn apply(&self, base: FinderSettings) -> FinderSettings {
        FinderSettings {
            penalty: self.penalty.unwrap_or(base.penalty),
            modulation_tolerance: self.modulation_tolerance.unwrap_or(base.modulation_tolerance),
            flatten: self.flatten.unwrap_or(base.flatten),
        }
    }
}

impl AppConfig {
    /// Load config from `~/.config/keytrellis/config.toml`.
    /// Returns default config if file doesn't exist.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Load config from an explicit path.
    /// Logs a warning if the file can't be read or parsed.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<AppConfig>(&contents) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                Self::default()
            }
        }
    }

    /// Shared finder settings.
    pub fn finder_settings(&self) -> FinderSettings {
        FinderSettings::new(self.penalty, self.modulation_tolerance, self.flatten)
    }

    /// Build the profile registry: built-ins plus configured custom profiles.
    pub fn registry(&self) -> Result<ProfileRegistry, FinderError> {
        Ok(ProfileRegistry::new(&self.custom_profiles)?)
    }

    /// Build an aggregator over the selected profiles, applying overrides.
    /// Two override tables naming the same profile (e.g. `kk` and
    /// `krumhansl`) are rejected.
    pub fn build_aggregator(
        &self,
        registry: &ProfileRegistry,
    ) -> Result<KeyFinderAggregator, FinderError> {
        let base = self.finder_settings();
        let profiles = registry.select(self.profiles.as_slice())?;

        let mut names: Vec<&String> = self.overrides.keys().collect();
        names.sort();

        let mut resolved: HashMap<String, (&str, ProfileOverride)> = HashMap::new();
        for name in names {
            let Some(profile) = registry.get(name) else {
                log::warn!("Ignoring override for unknown profile '{}'", name);
                continue;
            };
            let over = self.overrides[name];
            let previous = resolved.insert(profile.name().to_string(), (name.as_str(), over));
            if let Some((first, _)) = previous {
                return Err(FinderError::DuplicateOverride {
                    profile: profile.name().to_string(),
                    first: first.to_string(),
                    second: name.clone(),
                });
            }
        }

        let configured = profiles
            .into_iter()
            .map(|profile| {
                let settings = resolved
                    .get(profile.name())
                    .map_or(base, |(_, over)| over.apply(base));
                (profile, settings)
            })
            .collect();

        KeyFinderAggregator::with_settings(configured)
    }

    /// Resolve worker count: 0 → auto-detect (cores / 2, min 1).
    pub fn resolve_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            let cores = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2);
            (cores / 2).max(1)
        }
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}
