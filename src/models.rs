//! Core data models for the media scanner client

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;

/// Caller-facing bitmask selecting which media categories a query returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaTypeFlag(u8);

impl MediaTypeFlag {
    /// No media category
    pub const NONE: Self = Self(0);
    /// Audio files
    pub const AUDIO: Self = Self(0x01);
    /// Video files
    pub const VIDEO: Self = Self(0x02);
    /// Image files
    pub const IMAGE: Self = Self(0x04);
    /// Every known category
    pub const ALL: Self = Self(0x07);

    /// Build a flag from raw bits, dropping unknown bits
    pub const fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & Self::ALL.0)
    }

    /// Get the raw bits
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Check whether every bit of `other` is set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Check whether no bit is set
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for MediaTypeFlag {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for MediaTypeFlag {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for MediaTypeFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::ALL {
            return write!(f, "all");
        }
        let names: Vec<&str> = MediaTypeCode::ORDERED
            .iter()
            .filter(|code| self.contains(code.flag()))
            .map(|code| code.as_str())
            .collect();
        if names.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", names.join(","))
        }
    }
}

impl FromStr for MediaTypeFlag {
    type Err = String;

    /// Parse a comma separated list such as `audio,video`, or `all` / `none`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut flag = Self::NONE;
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match part.to_lowercase().as_str() {
                "all" => flag |= Self::ALL,
                "none" => {}
                other => flag |= other.parse::<MediaTypeCode>()?.flag(),
            }
        }
        Ok(flag)
    }
}

/// The provider's integer encoding of a media category.
///
/// Numbered differently from [`MediaTypeFlag`]; always translate through
/// [`MediaTypeCode::flag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaTypeCode {
    /// Audio files
    Audio = 1,
    /// Video files
    Video = 2,
    /// Image files
    Image = 3,
}

impl MediaTypeCode {
    /// Fixed clause order used when building query filters
    pub const ORDERED: [MediaTypeCode; 3] = [Self::Audio, Self::Video, Self::Image];

    /// Get the integer stored in the provider's `type` column
    pub const fn code(self) -> i64 {
        self as i64
    }

    /// Get the flag bit selecting this category
    pub const fn flag(self) -> MediaTypeFlag {
        match self {
            Self::Audio => MediaTypeFlag::AUDIO,
            Self::Video => MediaTypeFlag::VIDEO,
            Self::Image => MediaTypeFlag::IMAGE,
        }
    }

    /// Map a provider `type` value back to a category
    pub fn from_code(code: i64) -> Option<Self> {
        Self::ORDERED.into_iter().find(|c| c.code() == code)
    }

    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Image => "image",
        }
    }
}

impl fmt::Display for MediaTypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MediaTypeCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "audio" => Ok(Self::Audio),
            "video" => Ok(Self::Video),
            "image" => Ok(Self::Image),
            other => Err(format!("unknown media type: {}", other)),
        }
    }
}

/// Scan state reported by the provider's single state row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanState {
    /// No scan in progress
    #[default]
    Idle,
    /// A full scan is running
    Scanning,
}

impl ScanState {
    /// Interpret the `state` column: 1 means scanning, anything else idle
    pub fn from_code(state: i64) -> Self {
        if state == 1 {
            ScanState::Scanning
        } else {
            ScanState::Idle
        }
    }

    /// Get the value stored in the `state` column
    pub fn code(&self) -> i64 {
        match self {
            ScanState::Idle => 0,
            ScanState::Scanning => 1,
        }
    }

    /// Check if this is the scanning state
    pub fn is_scanning(&self) -> bool {
        *self == ScanState::Scanning
    }

    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanState::Idle => "idle",
            ScanState::Scanning => "scanning",
        }
    }
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One row of a media query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRecord {
    /// Path of the media file as stored by the provider
    pub path: String,
}

impl MediaRecord {
    /// Create a new record
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}
