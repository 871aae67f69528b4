//! Device families and the lookup tables translating each service's platform codes into them.

use serde::{Deserialize, Serialize};

/// A Windows device family.
///
/// `Universal` is the wildcard used by files that apply to every family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceFamily {
	Unknown,
	Universal,
	#[default] Desktop,
	Mobile,
	Xbox,
	Team,
	Holographic,
	Core,
	Server,
	IoTUAP,
	Iot,
}

/// `PlatformName` values used by the catalog, compared lowercased.
const CATALOG_PLATFORMS: [(&str, DeviceFamily); 10] = [
	("windows.desktop", DeviceFamily::Desktop),
	("windows.server", DeviceFamily::Server),
	("windows.iotuap", DeviceFamily::IoTUAP),
	("windows.iot", DeviceFamily::Iot),
	("windows.team", DeviceFamily::Team),
	("windows.holographic", DeviceFamily::Holographic),
	("windows.mobile", DeviceFamily::Mobile),
	("windows.core", DeviceFamily::Core),
	("windows.xbox", DeviceFamily::Xbox),
	("windows.universal", DeviceFamily::Universal),
];

/// `platform.target` codes used by update applicability rules.
const UPDATE_PLATFORMS: [(i64, DeviceFamily); 7] = [
	(0, DeviceFamily::Universal),
	(3, DeviceFamily::Desktop),
	(4, DeviceFamily::Mobile),
	(5, DeviceFamily::Xbox),
	(6, DeviceFamily::Team),
	(10, DeviceFamily::Holographic),
	(16, DeviceFamily::Core),
];

const ALL: [DeviceFamily; 11] = [
	DeviceFamily::Unknown,
	DeviceFamily::Universal,
	DeviceFamily::Desktop,
	DeviceFamily::Mobile,
	DeviceFamily::Xbox,
	DeviceFamily::Team,
	DeviceFamily::Holographic,
	DeviceFamily::Core,
	DeviceFamily::Server,
	DeviceFamily::IoTUAP,
	DeviceFamily::Iot,
];

impl DeviceFamily {
	pub fn name(&self) -> &'static str {
		match self {
			DeviceFamily::Unknown => "Unknown",
			DeviceFamily::Universal => "Universal",
			DeviceFamily::Desktop => "Desktop",
			DeviceFamily::Mobile => "Mobile",
			DeviceFamily::Xbox => "Xbox",
			DeviceFamily::Team => "Team",
			DeviceFamily::Holographic => "Holographic",
			DeviceFamily::Core => "Core",
			DeviceFamily::Server => "Server",
			DeviceFamily::IoTUAP => "IoTUAP",
			DeviceFamily::Iot => "Iot",
		}
	}

	/// Maps a catalog `PlatformName` such as `Windows.Desktop`. Unrecognised names give `Unknown`.
	pub fn from_catalog_platform(name: &str) -> Self {
		let name = name.to_lowercase();
		CATALOG_PLATFORMS.iter()
			.find(|(k, _)| *k == name)
			.map(|(_, family)| *family)
			.unwrap_or(DeviceFamily::Unknown)
	}

	/// Maps an applicability rule's `platform.target` code. Unrecognised codes give `Unknown`.
	pub fn from_update_platform(code: i64) -> Self {
		UPDATE_PLATFORMS.iter()
			.find(|(k, _)| *k == code)
			.map(|(_, family)| *family)
			.unwrap_or(DeviceFamily::Unknown)
	}

	/// `InstallationType` device attribute reported to the update service.
	pub fn installation_type(&self) -> &'static str {
		match self {
			DeviceFamily::IoTUAP | DeviceFamily::Iot => "IoTUAP",
			DeviceFamily::Server => "Server",
			DeviceFamily::Holographic | DeviceFamily::Core => "FactoryOS",
			_ => "Client",
		}
	}

	/// True when a target declared for `self` applies to a device of `requested` family.
	pub fn covers(&self, requested: DeviceFamily) -> bool {
		*self == DeviceFamily::Universal || *self == requested
	}
}

impl std::fmt::Display for DeviceFamily {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.name())
	}
}

impl std::str::FromStr for DeviceFamily {
	type Err = crate::Error;
	/// Accepts family names case-insensitively, with or without a `Windows.` prefix.
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let lower = s.to_lowercase();
		let bare = lower.strip_prefix("windows.").unwrap_or(&lower);
		ALL.iter()
			.find(|family| family.name().to_lowercase() == bare)
			.copied()
			.ok_or_else(|| crate::Error::Parse(format!("unknown device family `{}`", s)))
	}
}

/// Language and market pair such as `en` / `US`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locale {
	pub language: String,
	pub market: String,
}

impl Locale {
	pub fn new(language: impl Into<String>, market: impl Into<String>) -> Self {
		Self { language: language.into(), market: market.into() }
	}

	/// `language-market`
	pub fn tag(&self) -> String {
		format!("{}-{}", self.language, self.market)
	}
}

impl Default for Locale {
	fn default() -> Self {
		Self::new("en", "US")
	}
}
