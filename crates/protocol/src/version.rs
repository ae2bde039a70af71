//! # Server Versions
//!
//! Parsing of the version strings a server reports about itself. Accepted
//! shapes:
//!
//! ```text
//! 1.20.4
//! 1.20
//! 1.20.4-R0.1-SNAPSHOT
//! git-Paper-196 (MC: 1.20.4)
//! ```

use nom::{
    branch::alt,
    bytes::complete::{tag, take_until},
    character::complete::{char, digit1, space0},
    combinator::{map_res, opt},
    sequence::{delimited, preceded, tuple},
    IResult,
};
use packettap_core::{Result, TapError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A `major.minor.patch` game version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ServerVersion {
    /// First version shipping Mojang-mapped class names
    pub const MOJANG_MAPPINGS: ServerVersion = ServerVersion::new(1, 17, 0);
    /// First version with signed player chat
    pub const WILD_UPDATE: ServerVersion = ServerVersion::new(1, 19, 0);
    /// First version with a configuration stage between login and play
    pub const CONFIG_PHASE: ServerVersion = ServerVersion::new(1, 20, 2);
    /// First version that renames the codec stages during configuration
    pub const CONFIG_PIPELINE_RENAME: ServerVersion = ServerVersion::new(1, 20, 5);

    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse any supported version string
    pub fn parse(input: &str) -> Result<Self> {
        match alt((mc_marker, version_triple))(input.trim()) {
            Ok((_, version)) => Ok(version),
            Err(e) => Err(TapError::InvalidData(format!(
                "Unrecognised server version '{}': {}",
                input, e
            ))),
        }
    }

    pub fn at_least(&self, other: ServerVersion) -> bool {
        *self >= other
    }

    pub fn has_configuration_stage(&self) -> bool {
        self.at_least(Self::CONFIG_PHASE)
    }
}

impl FromStr for ServerVersion {
    type Err = TapError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

fn number(input: &str) -> IResult<&str, u32> {
    map_res(digit1, |digits: &str| digits.parse::<u32>())(input)
}

/// `1.20` or `1.20.4`, trailing text ignored
fn version_triple(input: &str) -> IResult<&str, ServerVersion> {
    let (rest, (major, _, minor, patch)) =
        tuple((number, char('.'), number, opt(preceded(char('.'), number))))(input)?;
    Ok((rest, ServerVersion::new(major, minor, patch.unwrap_or(0))))
}

/// `... (MC: 1.20.4)`
fn mc_marker(input: &str) -> IResult<&str, ServerVersion> {
    let (rest, _) = take_until("(MC:")(input)?;
    delimited(
        tuple((tag("(MC:"), space0)),
        version_triple,
        preceded(space0, char(')')),
    )(rest)
}

/// Version information supplied by the host at start-up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerVersionInfo {
    pub version: ServerVersion,
    /// Raw string the host reported
    pub raw: String,
}

impl ServerVersionInfo {
    pub fn new(version: ServerVersion) -> Self {
        Self {
            version,
            raw: version.to_string(),
        }
    }

    pub fn from_raw(raw: &str) -> Result<Self> {
        Ok(Self {
            version: ServerVersion::parse(raw)?,
            raw: raw.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain() {
        assert_eq!(ServerVersion::parse("1.20.4").unwrap(), ServerVersion::new(1, 20, 4));
        assert_eq!(ServerVersion::parse("1.20").unwrap(), ServerVersion::new(1, 20, 0));
        assert_eq!(ServerVersion::parse(" 1.16.5 ").unwrap(), ServerVersion::new(1, 16, 5));
    }

    #[test]
    fn test_parse_bukkit_suffix() {
        let version = ServerVersion::parse("1.20.6-R0.1-SNAPSHOT").unwrap();
        assert_eq!(version, ServerVersion::new(1, 20, 6));
    }

    #[test]
    fn test_parse_mc_marker() {
        let version = ServerVersion::parse("git-Paper-196 (MC: 1.20.4)").unwrap();
        assert_eq!(version, ServerVersion::new(1, 20, 4));

        let version = ServerVersion::parse("This server is running CraftBukkit (MC:1.16.5)").unwrap();
        assert_eq!(version, ServerVersion::new(1, 16, 5));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ServerVersion::parse("paper").is_err());
        assert!(ServerVersion::parse("").is_err());
        assert!("x.y".parse::<ServerVersion>().is_err());
    }

    #[test]
    fn test_ordering() {
        let old = ServerVersion::new(1, 16, 5);
        let new = ServerVersion::new(1, 20, 4);
        assert!(old < new);
        assert!(!old.at_least(ServerVersion::MOJANG_MAPPINGS));
        assert!(new.has_configuration_stage());
        assert!(!ServerVersion::new(1, 20, 1).has_configuration_stage());
    }

    #[test]
    fn test_version_info() {
        let info = ServerVersionInfo::from_raw("git-Paper-196 (MC: 1.20.4)").unwrap();
        assert_eq!(info.version.to_string(), "1.20.4");
        assert_eq!(ServerVersionInfo::new(ServerVersion::new(1, 16, 5)).raw, "1.16.5");
    }
}
