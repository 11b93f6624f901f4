//! Output types of the media-spec parser.

use serde::{Serialize, Serializer};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// How the `start`/`end` bounds of a [`MediaSpec`] are to be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SpecFlags(u8);

impl SpecFlags {
    /// Exact presentation timestamps.
    pub const DEFAULT: Self = Self(0);
    /// Snap the start to the nearest element at or before it.
    pub const FUZZY: Self = Self(1);
    /// Zero-based ordinal positions; `-1` means the last element.
    pub const INDEX: Self = Self(2);
    /// Seconds, to be converted with the stream time base.
    pub const REALTIME: Self = Self(4);
    /// The end was derived from a signed duration offset.
    pub const DURATION: Self = Self(8);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether any of the bits in `other` are set.
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for SpecFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for SpecFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for SpecFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(SpecFlags, &str); 4] = [
            (SpecFlags::INDEX, "INDEX"),
            (SpecFlags::REALTIME, "REALTIME"),
            (SpecFlags::DURATION, "DURATION"),
            (SpecFlags::FUZZY, "FUZZY"),
        ];

        let names: Vec<&str> = NAMES
            .iter()
            .filter(|(flag, _)| self.intersects(*flag))
            .map(|(_, name)| *name)
            .collect();

        if names.is_empty() {
            f.write_str("DEFAULT")
        } else {
            f.write_str(&names.join("|"))
        }
    }
}

impl Serialize for SpecFlags {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.0)
    }
}

/// One bound of a range: an integer (pts or index) or seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SpecValue {
    Int(i64),
    Seconds(f64),
}

impl SpecValue {
    /// The bound as an integer. Seconds are truncated toward zero.
    pub fn as_i64(self) -> i64 {
        match self {
            SpecValue::Int(v) => v,
            SpecValue::Seconds(s) => s as i64,
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            SpecValue::Int(v) => v as f64,
            SpecValue::Seconds(s) => s,
        }
    }
}

impl From<i64> for SpecValue {
    fn from(v: i64) -> Self {
        SpecValue::Int(v)
    }
}

impl From<f64> for SpecValue {
    fn from(s: f64) -> Self {
        SpecValue::Seconds(s)
    }
}

impl fmt::Display for SpecValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpecValue::Int(v) => write!(f, "{v}"),
            SpecValue::Seconds(s) => write!(f, "{s}s"),
        }
    }
}

/// A normalized media range: `start`, `end` and how to read them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MediaSpec {
    pub start: SpecValue,
    pub end: SpecValue,
    pub flags: SpecFlags,
}

impl MediaSpec {
    pub fn new(start: impl Into<SpecValue>, end: impl Into<SpecValue>, flags: SpecFlags) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
            flags,
        }
    }

    /// Whether the range names a single element.
    pub fn is_single(&self) -> bool {
        self.start == self.end
    }
}

impl fmt::Display for MediaSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{} ({})", self.start, self.end, self.flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_display() {
        assert_eq!(SpecFlags::DEFAULT.to_string(), "DEFAULT");
        assert_eq!(
            (SpecFlags::DURATION | SpecFlags::FUZZY).to_string(),
            "DURATION|FUZZY"
        );
    }

    #[test]
    fn default_is_contained_in_everything() {
        assert!(SpecFlags::INDEX.contains(SpecFlags::DEFAULT));
        assert!(!SpecFlags::INDEX.intersects(SpecFlags::FUZZY));
    }

    #[test]
    fn serializes_as_plain_numbers() {
        let spec = MediaSpec::new(1, 2, SpecFlags::INDEX);
        assert_eq!(
            serde_json::to_string(&spec).unwrap(),
            r#"{"start":1,"end":2,"flags":2}"#
        );
        let spec = MediaSpec::new(-1.5, 2.0, SpecFlags::REALTIME);
        assert_eq!(
            serde_json::to_string(&spec).unwrap(),
            r#"{"start":-1.5,"end":2.0,"flags":4}"#
        );
    }
}
