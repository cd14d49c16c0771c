use std::collections::BTreeSet;

use rayon::prelude::*;
use serde::Serialize;

use crate::durations::{DurationError, Durations};
use crate::key::Key;
use crate::profiles::KeyProfile;
use crate::trellis::{FinderError, FinderSettings, Modulation, TrellisKeyFinder};

/// One finder's detected keys.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileVote {
    pub profile: String,
    pub keys: BTreeSet<Key>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedResult {
    /// Votes in finder order.
    pub votes: Vec<ProfileVote>,
    pub winner: BTreeSet<Key>,
}

impl AggregatedResult {
    /// How many finders reported exactly the winning set.
    pub fn agreement(&self) -> usize {
        self.votes.iter().filter(|v| v.keys == self.winner).count()
    }
}

/// Runs one trellis per key profile over the same segments and settles the
/// detected keys by majority vote.
#[derive(Debug, Clone)]
pub struct KeyFinderAggregator {
    finders: Vec<TrellisKeyFinder>,
}

impl KeyFinderAggregator {
    /// One finder per profile, all sharing `settings`.
    pub fn new(profiles: Vec<KeyProfile>, settings: FinderSettings) -> Result<Self, FinderError> {
        Self::with_settings(profiles.into_iter().map(|p| (p, settings)).collect())
    }

    /// One finder per profile with its own settings.
    pub fn with_settings(profiles: Vec<(KeyProfile, FinderSettings)>) -> Result<Self, FinderError> {
        if profiles.is_empty() {
            return Err(FinderError::NoProfiles);
        }
        let finders = profiles
            .into_iter()
            .map(|(profile, settings)| TrellisKeyFinder::new(profile, settings))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { finders })
    }

    pub fn finders(&self) -> &[TrellisKeyFinder] {
        &self.finders
    }

    /// Validate once, then feed the segment to every finder.
    pub fn insert_durations(&mut self, weights: &[f64]) -> Result<(), DurationError> {
        let durations = Durations::try_from(weights)?;
        self.insert(&durations);
        Ok(())
    }

    /// Feed one segment to every finder. Finders are independent, so they
    /// advance in parallel.
    pub fn insert(&mut self, durations: &Durations) {
        if durations.is_silent() {
            return;
        }
        self.finders
            .par_iter_mut()
            .for_each(|finder| finder.insert(durations));
    }

    /// Number of non-silent segments seen.
    pub fn segments(&self) -> usize {
        self.finders.first().map_or(0, |f| f.segments())
    }

    pub fn results(&self) -> AggregatedResult {
        let votes: Vec<ProfileVote> = self
            .finders
            .iter()
            .map(|f| ProfileVote {
                profile: f.profile().name().to_string(),
                keys: f.results(),
            })
            .collect();
        let sets: Vec<BTreeSet<Key>> = votes.iter().map(|v| v.keys.clone()).collect();
        let winner = majority_vote(&sets);
        AggregatedResult { votes, winner }
    }

    /// Modulations reported by the first finder whose detected keys match
    /// the winning set.
    pub fn modulations(&self, result: &AggregatedResult) -> Vec<Modulation> {
        self.finders
            .iter()
            .zip(&result.votes)
            .find(|(_, vote)| vote.keys == result.winner)
            .map(|(finder, _)| finder.modulations())
            .unwrap_or_default()
    }
}

/// Most frequent set by exact equality. Equally frequent sets are settled in
/// favour of the one reported first. No votes gives the empty set.
pub fn majority_vote(results: &[BTreeSet<Key>]) -> BTreeSet<Key> {
    let mut tally: Vec<(&BTreeSet<Key>, usize)> = Vec::new();
    for result in results {
        match tally.iter().position(|(set, _)| *set == result) {
            Some(i) => tally[i].1 += 1,
            None => tally.push((result, 1)),
        }
    }

    let mut best: Option<(&BTreeSet<Key>, usize)> = None;
    for (set, count) in tally {
        if best.is_none_or(|(_, c)| count > c) {
            best = Some((set, count));
        }
    }
    best.map(|(set, _)| set.clone()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiles::ProfileRegistry;

    fn keys(indices: &[usize]) -> BTreeSet<Key> {
        indices.iter().map(|&i| Key::new(i).unwrap()).collect()
    }

    fn all_profiles(penalty: f64, tolerance: f64) -> KeyFinderAggregator {
        let profiles = ProfileRegistry::builtin().select::<&str>(&[]).unwrap();
        KeyFinderAggregator::new(profiles, FinderSettings::new(penalty, tolerance, true)).unwrap()
    }

    #[test]
    fn test_majority_four_of_six() {
        let votes = vec![
            keys(&[7]),
            keys(&[0]),
            keys(&[0]),
            keys(&[7]),
            keys(&[0]),
            keys(&[0]),
        ];
        assert_eq!(majority_vote(&votes), keys(&[0]));
    }

    #[test]
    fn test_majority_tie_goes_to_first_reported() {
        let votes = vec![keys(&[7]), keys(&[0]), keys(&[0]), keys(&[7])];
        assert_eq!(majority_vote(&votes), keys(&[7]));

        let votes = vec![keys(&[0, 7]), keys(&[0]), keys(&[21])];
        assert_eq!(majority_vote(&votes), keys(&[0, 7]));
    }

    #[test]
    fn test_majority_empty() {
        assert!(majority_vote(&[]).is_empty());
    }

    #[test]
    fn test_requires_profiles() {
        let err = KeyFinderAggregator::new(Vec::new(), FinderSettings::new(0.8, 0.3, true));
        assert!(matches!(err, Err(FinderError::NoProfiles)));
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let profiles = ProfileRegistry::builtin().select(&["kk"]).unwrap();
        let err = KeyFinderAggregator::new(profiles, FinderSettings::new(0.0, 0.3, true));
        assert!(matches!(err, Err(FinderError::Penalty(_))));
    }

    #[test]
    fn test_all_profiles_agree_on_c_major() {
        let mut agg = all_profiles(0.8, 0.3);
        let c_triad = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0];
        for _ in 0..6 {
            agg.insert_durations(&c_triad).unwrap();
        }
        let result = agg.results();
        assert_eq!(result.votes.len(), 6);
        assert_eq!(result.winner, keys(&[0]));
        assert_eq!(result.agreement(), 6);
        assert_eq!(result.votes[0].profile, "krumhansl-kessler");
    }

    #[test]
    fn test_all_profiles_agree_on_a_minor() {
        let mut agg = all_profiles(0.2, 0.3);
        let a_minor_triad = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0];
        for _ in 0..4 {
            agg.insert_durations(&a_minor_triad).unwrap();
        }
        assert_eq!(agg.results().winner, keys(&[21]));
    }

    #[test]
    fn test_silence_and_invalid_input_skip_all_finders() {
        let mut agg = all_profiles(0.8, 0.3);
        agg.insert_durations(&[0.0; 12]).unwrap();
        assert!(agg.insert_durations(&[1.0; 5]).is_err());
        assert_eq!(agg.segments(), 0);
        assert!(agg.finders().iter().all(|f| f.segments() == 0));
        assert!(agg.results().winner.is_empty());
    }

    #[test]
    fn test_per_profile_settings() {
        let registry = ProfileRegistry::builtin();
        let profiles = vec![
            (
                registry.get("kk").unwrap().clone(),
                FinderSettings::new(0.8, 0.3, true),
            ),
            (
                registry.get("temperley").unwrap().clone(),
                FinderSettings::new(0.2, 0.15, false),
            ),
        ];
        let agg = KeyFinderAggregator::with_settings(profiles).unwrap();
        assert_eq!(agg.finders()[1].settings().penalty, 0.2);
        assert!(!agg.finders()[1].settings().flatten);
    }

    #[test]
    fn test_modulations_follow_winner() {
        let mut agg = all_profiles(0.8, 0.3);
        let c = Durations::from_pitch_classes(&[0, 4, 7]);
        for _ in 0..10 {
            agg.insert(&c);
        }
        let result = agg.results();
        assert!(agg.modulations(&result).is_empty());
    }
}
