use std::collections::HashMap;

use serde::Deserialize;
use thiserror::Error;

use crate::key::PITCH_CLASSES;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProfileError {
    #[error("Profile '{name}': {mode} template has {len} values, expected 12")]
    TemplateLength {
        name: String,
        mode: &'static str,
        len: usize,
    },
    #[error("Profile '{name}': {mode} weight {value} at degree {degree} is not finite and >= 0")]
    TemplateValue {
        name: String,
        mode: &'static str,
        degree: usize,
        value: f64,
    },
    #[error("Profile '{name}': {mode} template is all zeros")]
    EmptyTemplate { name: String, mode: &'static str },
    #[error("Unknown key profile: {0}")]
    Unknown(String),
    #[error("Profile name or alias '{0}' is already registered")]
    Duplicate(String),
}

/// Major and minor templates: expected salience of each scale degree,
/// degree 0 being the tonic. Only ratios matter.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyProfile {
    name: String,
    major: [f64; PITCH_CLASSES],
    minor: [f64; PITCH_CLASSES],
}

impl KeyProfile {
    pub fn new(
        name: impl Into<String>,
        major: &[f64],
        minor: &[f64],
    ) -> Result<Self, ProfileError> {
        let name = name.into();
        let major = validate_template(&name, "major", major)?;
        let minor = validate_template(&name, "minor", minor)?;
        Ok(Self { name, major, minor })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn major(&self) -> &[f64; PITCH_CLASSES] {
        &self.major
    }

    pub fn minor(&self) -> &[f64; PITCH_CLASSES] {
        &self.minor
    }
}

fn validate_template(
    name: &str,
    mode: &'static str,
    values: &[f64],
) -> Result<[f64; PITCH_CLASSES], ProfileError> {
    let template: [f64; PITCH_CLASSES] = values
        .try_into()
        .map_err(|_| ProfileError::TemplateLength {
            name: name.to_string(),
            mode,
            len: values.len(),
        })?;
    if let Some((degree, &value)) = template
        .iter()
        .enumerate()
        .find(|(_, v)| !v.is_finite() || **v < 0.0)
    {
        return Err(ProfileError::TemplateValue {
            name: name.to_string(),
            mode,
            degree,
            value,
        });
    }
    if template.iter().all(|&v| v == 0.0) {
        return Err(ProfileError::EmptyTemplate {
            name: name.to_string(),
            mode,
        });
    }
    Ok(template)
}

/// A published profile set shipped with the crate.
struct BuiltinProfile {
    name: &'static str,
    aliases: &'static [&'static str],
    major: [f64; PITCH_CLASSES],
    minor: [f64; PITCH_CLASSES],
}

/// Built-in profiles in canonical order. The aggregator breaks vote ties
/// in favour of earlier entries.
const BUILTIN_PROFILES: &[BuiltinProfile] = &[
    // Krumhansl & Kessler (1982), probe-tone ratings
    BuiltinProfile {
        name: "krumhansl-kessler",
        aliases: &["kk", "krumhansl"],
        major: [6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88],
        minor: [6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17],
    },
    // Aarden (2003), Essen folksong collection
    BuiltinProfile {
        name: "aarden-essen",
        aliases: &["ae", "aarden", "essen"],
        major: [
            17.7661, 0.145624, 14.9265, 0.160186, 19.8049, 11.3587, 0.291248, 22.062, 0.145624,
            8.15494, 0.232998, 4.95122,
        ],
        minor: [
            18.2648, 0.737619, 14.0499, 16.8599, 0.702494, 14.4362, 0.702494, 18.6161, 4.56621,
            1.93186, 7.37619, 1.75623,
        ],
    },
    // Bellman (2005), after Budge's chord statistics
    BuiltinProfile {
        name: "bellman-budge",
        aliases: &["bb", "bellman", "budge"],
        major: [16.80, 0.86, 12.95, 1.41, 13.49, 11.93, 1.25, 20.28, 1.80, 8.04, 0.62, 10.57],
        minor: [18.16, 0.69, 12.99, 13.34, 1.07, 11.15, 1.38, 21.07, 7.49, 1.53, 0.92, 10.21],
    },
    // Temperley (2007), Kostka-Payne corpus
    BuiltinProfile {
        name: "temperley-kostka-payne",
        aliases: &["tkp", "kostka-payne"],
        major: [0.748, 0.060, 0.488, 0.082, 0.670, 0.460, 0.096, 0.715, 0.104, 0.366, 0.057, 0.400],
        minor: [0.712, 0.084, 0.474, 0.618, 0.049, 0.460, 0.105, 0.747, 0.404, 0.067, 0.133, 0.330],
    },
    // Sapp's simple profile
    BuiltinProfile {
        name: "simple",
        aliases: &["sapp"],
        major: [2.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 2.0, 0.0, 1.0, 0.0, 1.0],
        minor: [2.0, 0.0, 1.0, 1.0, 0.0, 1.0, 0.0, 2.0, 1.0, 0.0, 0.5, 0.5],
    },
    // Temperley (1999), revised Krumhansl-Schmuckler
    BuiltinProfile {
        name: "temperley",
        aliases: &["cbms"],
        major: [5.0, 2.0, 3.5, 2.0, 4.5, 4.0, 2.0, 4.5, 2.0, 3.5, 1.5, 4.0],
        minor: [5.0, 2.0, 3.5, 4.5, 2.0, 4.0, 2.0, 4.5, 3.5, 2.0, 1.5, 4.0],
    },
];

/// Config file profile definition (deserialized from TOML).
#[derive(Debug, Deserialize, Clone)]
pub struct CustomProfileConfig {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub major: Vec<f64>,
    pub minor: Vec<f64>,
}

/// Every profile available for selection: built-ins first (canonical
/// order), then custom profiles in config order.
#[derive(Debug, Clone)]
pub struct ProfileRegistry {
    profiles: Vec<KeyProfile>,
    /// Maps lowercase name or alias → index in `profiles`
    lookup: HashMap<String, usize>,
}

impl ProfileRegistry {
    pub fn new(custom_profiles: &[CustomProfileConfig]) -> Result<Self, ProfileError> {
        let mut registry = Self {
            profiles: Vec::with_capacity(BUILTIN_PROFILES.len() + custom_profiles.len()),
            lookup: HashMap::new(),
        };

        for builtin in BUILTIN_PROFILES {
            let profile = KeyProfile::new(builtin.name, &builtin.major, &builtin.minor)?;
            registry.register(profile, builtin.aliases.iter().copied())?;
        }

        for custom in custom_profiles {
            let profile = KeyProfile::new(custom.name.trim(), &custom.major, &custom.minor)?;
            registry.register(profile, custom.aliases.iter().map(String::as_str))?;
        }

        Ok(registry)
    }

    /// Registry holding only the built-in profiles.
    pub fn builtin() -> Self {
        Self::new(&[]).expect("built-in profile tables are valid")
    }

    fn register<'a>(
        &mut self,
        profile: KeyProfile,
        aliases: impl Iterator<Item = &'a str>,
    ) -> Result<(), ProfileError> {
        let index = self.profiles.len();
        let names: Vec<String> = std::iter::once(profile.name().trim().to_lowercase())
            .chain(aliases.map(|n| n.trim().to_lowercase()))
            .collect();

        for name in &names {
            if self.lookup.contains_key(name) {
                return Err(ProfileError::Duplicate(name.clone()));
            }
        }
        for name in names {
            self.lookup.insert(name, index);
        }
        self.profiles.push(profile);
        Ok(())
    }

    /// Case-insensitive lookup by name or alias.
    pub fn get(&self, name: &str) -> Option<&KeyProfile> {
        self.lookup
            .get(&name.trim().to_lowercase())
            .map(|&i| &self.profiles[i])
    }

    /// Resolve a selection of names into profiles, keeping registry order
    /// and dropping repeats. An empty selection means every profile.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<KeyProfile>, ProfileError> {
        if names.is_empty() {
            return Ok(self.profiles.clone());
        }

        let mut indices = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            let index = self
                .lookup
                .get(&name.trim().to_lowercase())
                .copied()
                .ok_or_else(|| ProfileError::Unknown(name.to_string()))?;
            indices.push(index);
        }
        indices.sort_unstable();
        indices.dedup();

        Ok(indices.into_iter().map(|i| self.profiles[i].clone()).collect())
    }

    pub fn profiles(&self) -> &[KeyProfile] {
        &self.profiles
    }

    /// Aliases registered for a profile (excluding its own name), sorted.
    pub fn aliases(&self, profile: &KeyProfile) -> Vec<&str> {
        let own = profile.name().trim().to_lowercase();
        let Some(&index) = self.lookup.get(&own) else {
            return Vec::new();
        };
        let mut aliases: Vec<&str> = self
            .lookup
            .iter()
            .filter(|(alias, i)| **i == index && **alias != own)
            .map(|(alias, _)| alias.as_str())
            .collect();
        aliases.sort_unstable();
        aliases
    }
}

impl Default for ProfileRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
