use crate::durations::Durations;
use crate::key::{KEY_COUNT, Key, PITCH_CLASSES};
use crate::profiles::KeyProfile;

/// One score per key, indexed like [`Key::index`].
pub type KeyScores = [f64; KEY_COUNT];

/// Correlate a segment against every key of a profile.
///
/// For tonic `k` the major score is `Σ_d durations[(k + d) % 12] * major[d]`
/// (stored at `k`), and the minor score uses the minor template (stored at
/// `k + 12`).
pub fn score(durations: &Durations, profile: &KeyProfile) -> KeyScores {
    let weights = durations.weights();
    let mut scores = [0.0; KEY_COUNT];

    for tonic in 0..PITCH_CLASSES {
        let mut major = 0.0;
        let mut minor = 0.0;
        for degree in 0..PITCH_CLASSES {
            let w = weights[(tonic + degree) % PITCH_CLASSES];
            major += w * profile.major()[degree];
            minor += w * profile.minor()[degree];
        }
        scores[tonic] = major;
        scores[tonic + PITCH_CLASSES] = minor;
    }

    scores
}

/// Same as [`score`], optionally reducing the segment to pitch-class presence first.
pub fn score_segment(durations: &Durations, profile: &KeyProfile, flatten: bool) -> KeyScores {
    if flatten {
        score(&durations.flattened(), profile)
    } else {
        score(durations, profile)
    }
}

/// Keys sorted by descending score; equal scores keep index order.
pub fn ranked(scores: &KeyScores) -> Vec<(Key, f64)> {
    let mut ranked: Vec<(Key, f64)> = Key::all().map(|k| (k, scores[k.index()])).collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Mode;
    use crate::profiles::ProfileRegistry;

    fn temperley() -> KeyProfile {
        ProfileRegistry::builtin().get("temperley").unwrap().clone()
    }

    #[test]
    fn test_c_major_triad_scores() {
        let scores = score(&Durations::from_pitch_classes(&[0, 4, 7]), &temperley());
        // 5.0 + 4.5 + 4.5
        assert!((scores[0] - 14.0).abs() < 1e-9);
        // E minor: tonic, minor third, minor sixth
        assert!((scores[16] - 13.0).abs() < 1e-9);
        assert_eq!(ranked(&scores)[0].0, Key::new(0).unwrap());
    }

    /// Weight of pitch class `p` moves to `p + semitones`.
    fn transposed(durations: &Durations, semitones: usize) -> Durations {
        let mut weights = [0.0; PITCH_CLASSES];
        for (pc, &w) in durations.weights().iter().enumerate() {
            weights[(pc + semitones) % PITCH_CLASSES] = w;
        }
        Durations::new(weights).unwrap()
    }

    #[test]
    fn test_transposed_helper() {
        let c_triad = Durations::from_pitch_classes(&[0, 4, 7]);
        assert_eq!(transposed(&c_triad, 9), Durations::from_pitch_classes(&[9, 1, 4]));
        assert_eq!(transposed(&c_triad, 12), c_triad);
    }

    #[test]
    fn test_rotation_symmetry() {
        let registry = ProfileRegistry::builtin();
        let v = Durations::new([
            0.5, 0.0, 1.25, 0.0, 2.0, 0.75, 0.0, 3.0, 0.0, 0.25, 0.1, 1.0,
        ])
        .unwrap();

        for profile in registry.profiles() {
            let base = score(&v, profile);
            for r in 0..12 {
                let rotated = score(&transposed(&v, r), profile);
                for tonic in 0..12 {
                    for mode in [Mode::Major, Mode::Minor] {
                        let k = Key::from_parts(tonic, mode);
                        let shifted = Key::from_parts(tonic + r, mode);
                        assert!(
                            (base[k.index()] - rotated[shifted.index()]).abs() < 1e-9,
                            "{}: key {} vs {} (r={})",
                            profile.name(),
                            k,
                            shifted,
                            r
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_flatten_ignores_rhythmic_weight() {
        let profile = temperley();
        let long_root = Durations::new([
            8.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0,
        ])
        .unwrap();
        let even = Durations::from_pitch_classes(&[0, 4, 7]);

        assert_eq!(
            score_segment(&long_root, &profile, true),
            score_segment(&even, &profile, true)
        );
        assert_ne!(
            score_segment(&long_root, &profile, false),
            score_segment(&even, &profile, false)
        );
    }

    #[test]
    fn test_silence_scores_zero() {
        let scores = score(&Durations::silence(), &temperley());
        assert!(scores.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_ranked_ties_keep_index_order() {
        let scores = [1.0; KEY_COUNT];
        let order: Vec<usize> = ranked(&scores).iter().map(|(k, _)| k.index()).collect();
        assert_eq!(order, (0..KEY_COUNT).collect::<Vec<_>>());
    }
}
