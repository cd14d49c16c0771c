use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::key::PITCH_CLASSES;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DurationError {
    #[error("Expected 12 pitch-class weights, got {0}")]
    Length(usize),
    #[error("Negative weight {value} for pitch class {pitch_class}")]
    Negative { pitch_class: usize, value: f64 },
    #[error("Non-finite weight for pitch class {0}")]
    NonFinite(usize),
}

/// Time each pitch class occupies within one segment (index 0 = C).
///
/// Always 12 finite, non-negative weights. An all-zero vector marks a
/// silent segment.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct Durations([f64; PITCH_CLASSES]);

impl Durations {
    pub fn new(weights: [f64; PITCH_CLASSES]) -> Result<Self, DurationError> {
        for (pitch_class, &value) in weights.iter().enumerate() {
            if !value.is_finite() {
                return Err(DurationError::NonFinite(pitch_class));
            }
            if value < 0.0 {
                return Err(DurationError::Negative { pitch_class, value });
            }
        }
        Ok(Self(weights))
    }

    /// The silent segment.
    pub fn silence() -> Self {
        Self::default()
    }

    /// Presence indicator over the given pitch classes, e.g. `[0, 4, 7]` for a C triad.
    pub fn from_pitch_classes(pitch_classes: &[usize]) -> Self {
        let mut weights = [0.0; PITCH_CLASSES];
        for &pc in pitch_classes {
            weights[pc % PITCH_CLASSES] = 1.0;
        }
        Self(weights)
    }

    pub fn weights(&self) -> &[f64; PITCH_CLASSES] {
        &self.0
    }

    pub fn is_silent(&self) -> bool {
        self.0.iter().all(|&w| w == 0.0)
    }

    /// Every sounding pitch class becomes 1, everything else 0.
    pub fn flattened(&self) -> Self {
        Self(self.0.map(|w| if w > 0.0 { 1.0 } else { 0.0 }))
    }
}

impl TryFrom<&[f64]> for Durations {
    type Error = DurationError;

    fn try_from(weights: &[f64]) -> Result<Self, Self::Error> {
        let array: [f64; PITCH_CLASSES] = weights
            .try_into()
            .map_err(|_| DurationError::Length(weights.len()))?;
        Self::new(array)
    }
}

impl TryFrom<Vec<f64>> for Durations {
    type Error = DurationError;

    fn try_from(weights: Vec<f64>) -> Result<Self, Self::Error> {
        Self::try_from(weights.as_slice())
    }
}

impl From<Durations> for Vec<f64> {
    fn from(durations: Durations) -> Self {
        durations.0.to_vec()
    }
}
