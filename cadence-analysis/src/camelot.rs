//! Musical keys and Camelot wheel notation
//!
//! The Camelot wheel is the circle of fifths laid out as numbers 1-12, with
//! 'A' for minor and 'B' for major. Relative major/minor keys share a number,
//! which is what the key calibration relies on.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Major or minor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Major,
    Minor,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Major => write!(f, "major"),
            Mode::Minor => write!(f, "minor"),
        }
    }
}

/// Root names indexed by pitch class (0 = C)
const ROOT_NAMES: [&str; 12] = [
    "C", "Db", "D", "Eb", "E", "F", "Gb", "G", "Ab", "A", "Bb", "B",
];

/// Musical key (24 possible: 12 major + 12 minor)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MusicalKey {
    root: u8,
    mode: Mode,
}

impl MusicalKey {
    pub fn new(root_pitch_class: u8, mode: Mode) -> Self {
        Self {
            root: root_pitch_class % 12,
            mode,
        }
    }

    pub fn major_from_pitch_class(pc: u8) -> Self {
        Self::new(pc, Mode::Major)
    }

    pub fn minor_from_pitch_class(pc: u8) -> Self {
        Self::new(pc, Mode::Minor)
    }

    /// All 24 keys: C major, C minor, Db major, Db minor, ...
    pub fn all() -> impl Iterator<Item = MusicalKey> {
        (0..12u8).flat_map(|pc| {
            [
                Self::major_from_pitch_class(pc),
                Self::minor_from_pitch_class(pc),
            ]
        })
    }

    /// Pitch class (0-11, where 0=C) of the key's root
    pub fn root_pitch_class(&self) -> u8 {
        self.root
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_major(&self) -> bool {
        self.mode == Mode::Major
    }

    /// Root name without mode, e.g. "Db"
    pub fn root_name(&self) -> &'static str {
        ROOT_NAMES[self.root as usize]
    }

    /// Relative major/minor (same Camelot number, other letter)
    pub fn relative(&self) -> Self {
        let camelot = CamelotKey::from_musical_key(*self);
        CamelotKey {
            number: camelot.number,
            is_major: !camelot.is_major,
        }
        .to_musical_key()
    }

    pub fn camelot(&self) -> CamelotKey {
        CamelotKey::from_musical_key(*self)
    }

    /// Parse a key name
    ///
    /// Accepts "C", "Cm", "C#m", "Db minor", "A min", "F# major", "Bbmaj"
    /// and Camelot codes like "8A". Sharps and flats are both accepted.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }
        if s.starts_with(|c: char| c.is_ascii_digit()) {
            return CamelotKey::parse(s).map(|c| c.to_musical_key());
        }

        let mut chars = s.chars();
        let letter = chars.next()?.to_ascii_uppercase();
        let natural: i8 = match letter {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return None,
        };

        let rest = chars.as_str();
        let (accidental, rest) = match rest.chars().next() {
            Some(c @ ('#' | '♯')) => (1i8, &rest[c.len_utf8()..]),
            Some(c @ ('b' | '♭')) => (-1i8, &rest[c.len_utf8()..]),
            _ => (0, rest),
        };

        let mode = match rest.trim().to_ascii_lowercase().as_str() {
            "" | "maj" | "major" => Mode::Major,
            "m" | "min" | "minor" => Mode::Minor,
            _ => return None,
        };

        let root = (natural + accidental).rem_euclid(12) as u8;
        Some(Self::new(root, mode))
    }
}

impl FromStr for MusicalKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unrecognized key: {}", s))
    }
}

impl fmt::Display for MusicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            Mode::Major => write!(f, "{}", self.root_name()),
            Mode::Minor => write!(f, "{}m", self.root_name()),
        }
    }
}

/// Camelot wheel notation (1A-12B)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CamelotKey {
    /// Position on the wheel (1-12)
    pub number: u8,
    /// true = B (major), false = A (minor)
    pub is_major: bool,
}

/// Camelot number of each minor key, indexed by root pitch class
const MINOR_WHEEL: [u8; 12] = [5, 12, 7, 2, 9, 4, 11, 6, 1, 8, 3, 10];

/// Camelot number of each major key, indexed by root pitch class
const MAJOR_WHEEL: [u8; 12] = [8, 3, 10, 5, 12, 7, 2, 9, 4, 11, 6, 1];

impl CamelotKey {
    pub fn new(number: u8, is_major: bool) -> Option<Self> {
        if (1..=12).contains(&number) {
            Some(Self { number, is_major })
        } else {
            None
        }
    }

    pub fn from_musical_key(key: MusicalKey) -> Self {
        let wheel = if key.is_major() { &MAJOR_WHEEL } else { &MINOR_WHEEL };
        CamelotKey {
            number: wheel[key.root_pitch_class() as usize],
            is_major: key.is_major(),
        }
    }

    pub fn to_musical_key(&self) -> MusicalKey {
        let (wheel, mode) = if self.is_major {
            (&MAJOR_WHEEL, Mode::Major)
        } else {
            (&MINOR_WHEEL, Mode::Minor)
        };
        let root = wheel
            .iter()
            .position(|&n| n == self.number)
            .unwrap_or(0) as u8;
        MusicalKey::new(root, mode)
    }

    /// Get display string (e.g., "8A", "12B")
    pub fn display(&self) -> String {
        format!("{}{}", self.number, if self.is_major { 'B' } else { 'A' })
    }

    /// Parse from string (e.g., "8A", "12B")
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.len() < 2 {
            return None;
        }

        let last = s.chars().last()?;
        let is_major = match last.to_ascii_uppercase() {
            'B' => true,
            'A' => false,
            _ => return None,
        };

        let number: u8 = s[..s.len() - 1].parse().ok()?;
        Self::new(number, is_major)
    }
}

impl fmt::Display for CamelotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display())
    }
}
