//! Four part package versions.
//!
//! Both the catalog and the update service describe versions as `major.minor.build.revision`
//! with 16 bits per part. The catalog and the applicability rules ship them packed into a
//! single integer, file identifiers carry them as dotted strings.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionParseError {
	#[error("version `{0}` must have between 2 and 4 dot separated parts")]
	WrongPartCount(String),
	#[error("version `{0}` has an empty or non-numeric part")]
	InvalidPart(String),
	#[error("version `{0}` has a part larger than 65535")]
	PartOutOfRange(String),
}

/// A `major.minor.build.revision` version.
///
/// Ordering compares the parts left to right.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct PackedVersion {
	major: u16,
	minor: u16,
	build: u16,
	revision: u16,
}

impl PackedVersion {
	pub const fn new(major: u16, minor: u16, build: u16, revision: u16) -> Self {
		Self { major, minor, build, revision }
	}

	pub fn major(&self) -> u16 { self.major }
	pub fn minor(&self) -> u16 { self.minor }
	pub fn build(&self) -> u16 { self.build }
	pub fn revision(&self) -> u16 { self.revision }

	/// Parses `a.b`, `a.b.c` or `a.b.c.d`. Missing trailing parts are zero.
	pub fn parse(s: &str) -> Result<Self, VersionParseError> {
		let parts: Vec<&str> = s.split('.').collect();
		if parts.len() < 2 || parts.len() > 4 {
			return Err(VersionParseError::WrongPartCount(s.to_string()));
		}

		let mut values = [0u16; 4];
		for (slot, part) in values.iter_mut().zip(parts) {
			if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
				return Err(VersionParseError::InvalidPart(s.to_string()));
			}
			/* All digits, so the only way this fails is overflow */
			*slot = part.parse::<u16>().map_err(|_| VersionParseError::PartOutOfRange(s.to_string()))?;
		}

		Ok(Self::new(values[0], values[1], values[2], values[3]))
	}

	/// `major<<48 | minor<<32 | build<<16 | revision`
	pub fn pack(&self) -> u64 {
		(self.major as u64) << 48 | (self.minor as u64) << 32 | (self.build as u64) << 16 | self.revision as u64
	}

	pub fn unpack(value: u64) -> Self {
		Self {
			major: (value >> 48) as u16,
			minor: (value >> 32) as u16,
			build: (value >> 16) as u16,
			revision: value as u16,
		}
	}
}

impl std::str::FromStr for PackedVersion {
	type Err = VersionParseError;
	fn from_str(s: &str) -> Result<Self, Self::Err> { Self::parse(s) }
}

impl TryFrom<String> for PackedVersion {
	type Error = VersionParseError;
	fn try_from(value: String) -> Result<Self, Self::Error> { Self::parse(&value) }
}

impl From<PackedVersion> for String {
	fn from(v: PackedVersion) -> Self { v.to_string() }
}

impl std::fmt::Display for PackedVersion {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}.{}.{}.{}", self.major, self.minor, self.build, self.revision)
	}
}
