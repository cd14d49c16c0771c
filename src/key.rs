use serde::Serialize;

/// Number of key hypotheses: 12 major keys followed by 12 minor keys.
pub const KEY_COUNT: usize = 24;

/// Number of pitch classes (C = 0 … B = 11).
pub const PITCH_CLASSES: usize = 12;

const MAJOR_NAMES: [&str; 12] = ["C", "Db", "D", "Eb", "E", "F", "F#", "G", "Ab", "A", "Bb", "B"];
const MINOR_NAMES: [&str; 12] = ["C", "C#", "D", "Eb", "E", "F", "F#", "G", "G#", "A", "Bb", "B"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Major,
    Minor,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Major => write!(f, "major"),
            Mode::Minor => write!(f, "minor"),
        }
    }
}

/// A key index in 0..24: 0–11 are C..B major, 12–23 are C..B minor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Key(u8);

impl Key {
    /// Returns `None` when `index` is not a valid key index.
    pub fn new(index: usize) -> Option<Self> {
        (index < KEY_COUNT).then_some(Self(index as u8))
    }

    pub fn from_parts(tonic: usize, mode: Mode) -> Self {
        let offset = match mode {
            Mode::Major => 0,
            Mode::Minor => PITCH_CLASSES,
        };
        Self(((tonic % PITCH_CLASSES) + offset) as u8)
    }

    /// All 24 keys in index order.
    pub fn all() -> impl Iterator<Item = Key> {
        (0..KEY_COUNT as u8).map(Key)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Tonic pitch class (0 = C).
    pub fn tonic(self) -> usize {
        self.index() % PITCH_CLASSES
    }

    pub fn mode(self) -> Mode {
        if self.index() < PITCH_CLASSES {
            Mode::Major
        } else {
            Mode::Minor
        }
    }

    /// Tonic spelled the way the key is usually written (Bb major, G# minor).
    pub fn tonic_name(self) -> &'static str {
        match self.mode() {
            Mode::Major => MAJOR_NAMES[self.tonic()],
            Mode::Minor => MINOR_NAMES[self.tonic()],
        }
    }

    /// Short form: "C", "Bb", "Am", "F#m".
    pub fn short_name(self) -> String {
        match self.mode() {
            Mode::Major => self.tonic_name().to_string(),
            Mode::Minor => format!("{}m", self.tonic_name()),
        }
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.tonic_name(), self.mode())
    }
}

/// Join key names for display: "C major, A minor".
pub fn describe<'a>(keys: impl IntoIterator<Item = &'a Key>) -> String {
    let names: Vec<String> = keys.into_iter().map(|k| k.to_string()).collect();
    if names.is_empty() {
        "(none)".to_string()
    } else {
        names.join(", ")
    }
}
