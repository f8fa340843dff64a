//! Version parsing and the migration floor rule.

use anyhow::{Context, Result};
use std::fmt;

/// A three-part system version.
///
/// Version strings in the wild may carry extra components (build numbers
/// such as `5.3.6.100`); only the first three participate in compatibility
/// decisions, so anything past the patch component is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    /// Parse the leading `major.minor.patch` of a version string.
    pub fn parse(s: &str) -> Result<Self> {
        let mut parts = s.trim().split('.');
        let mut component = |name: &str| -> Result<u32> {
            let part = parts
                .next()
                .with_context(|| format!("version '{}' is missing its {} component", s, name))?;
            part.parse::<u32>()
                .with_context(|| format!("version '{}' has a non-numeric {} component", s, name))
        };

        Ok(Self {
            major: component("major")?,
            minor: component("minor")?,
            patch: component("patch")?,
        })
    }

    /// Whether a system at this version may migrate given `floor`.
    ///
    /// Major and minor must match the floor exactly; the patch level must be
    /// at or past it. A newer minor is just as unsupported as an older one,
    /// since the migration payload is validated against one release line.
    pub fn satisfies_floor(&self, floor: &Version) -> bool {
        self.major == floor.major && self.minor == floor.minor && self.patch >= floor.patch
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
