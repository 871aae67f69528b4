//! Store listing lookups: what a product is and how it installs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::json::*;
use crate::transport::Transport;
use crate::{DeviceFamily, Locale, StoreListingsOptions};

/// How a product is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstallerType {
	/// MSIX/AppX packages delivered by the update service.
	Packaged,
	/// A classic installer hosted by the publisher.
	Unpackaged,
	Unknown,
}

impl InstallerType {
	fn from_store(s: &str) -> Self {
		match s {
			"WindowsUpdate" => InstallerType::Packaged,
			"WPM" => InstallerType::Unpackaged,
			_ => InstallerType::Unknown,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSummary {
	pub product_id: String,
	pub title: String,
	pub description: Option<String>,
	pub publisher_name: String,
	pub installer_type: InstallerType,
}

impl ProductSummary {
	/// Reads the `Payload` of a store-edge product document.
	pub fn from_json(json: &Value) -> crate::Result<Self> {
		let payload = field(json, "Payload")?;

		/* Prefer the short description, otherwise the first line of the full one */
		let description = opt_str_field(payload, "ShortDescription")
			.or_else(|| opt_str_field(payload, "Description").and_then(|d| d.lines().next()))
			.map(|s| s.to_string());

		Ok(ProductSummary {
			product_id: str_field(payload, "ProductId")?.to_string(),
			title: str_field(payload, "Title")?.to_string(),
			description,
			publisher_name: str_field(payload, "PublisherName")?.to_string(),
			installer_type: InstallerType::from_store(str_field(field(payload, "Installer")?, "Type")?),
		})
	}
}

/// Download location of an unpackaged installer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnpackagedInstaller {
	pub url: String,
	pub silent_switches: String,
}

impl UnpackagedInstaller {
	/// Picks the installer matching `locale` from a package manifest document.
	///
	/// Installers whose locale starts with the language qualify, an exact `language-market`
	/// match wins over the others.
	pub fn from_manifest(json: &Value, locale: &Locale) -> crate::Result<Self> {
		let version = array_field(field(json, "Data")?, "Versions")?
			.first()
			.ok_or_else(|| crate::Error::Parse("package manifest has no versions".to_string()))?;

		let language = locale.language.to_lowercase();
		let tag = locale.tag();
		let mut best: Option<(bool, UnpackagedInstaller)> = None;

		for installer in array_field(version, "Installers")? {
			let Some(installer_locale) = opt_str_field(installer, "InstallerLocale") else {
				log::debug!("Skipping installer without a locale");
				continue;
			};
			if !installer_locale.to_lowercase().starts_with(&language) {
				continue;
			}
			let exact = installer_locale.eq_ignore_ascii_case(&tag);
			if best.as_ref().map_or(true, |(best_exact, _)| exact && !best_exact) {
				best = Some((exact, UnpackagedInstaller {
					url: str_field(installer, "InstallerUrl")?.to_string(),
					silent_switches: str_field(field(installer, "InstallerSwitches")?, "Silent")?.to_string(),
				}));
			}
		}

		best.map(|(_, installer)| installer).ok_or(crate::Error::NoInstaller)
	}
}

/// Looks up the store listing for `product_id`.
pub async fn query_product(transport: &dyn Transport, options: &StoreListingsOptions, product_id: &str, device_family: DeviceFamily, locale: &Locale) -> crate::Result<ProductSummary> {
	let url = format!(
		"{}products/{}?market={}&locale={}&deviceFamily=Windows.{}",
		options.storeedge_url(), product_id, locale.market, locale.tag(), device_family
	);
	log::trace!("Querying product {}", product_id);
	let json = parse_store_response(transport.get(&url).await?, &url)?;
	ProductSummary::from_json(&json)
}

/// Looks up the installer of an unpackaged product.
pub async fn unpackaged_installer(transport: &dyn Transport, options: &StoreListingsOptions, product_id: &str, locale: &Locale) -> crate::Result<UnpackagedInstaller> {
	let url = format!("{}packageManifests/{}", options.storeedge_url(), product_id);
	log::trace!("Fetching package manifest for {}", product_id);
	let json = parse_store_response(transport.get(&url).await?, &url)?;
	UnpackagedInstaller::from_manifest(&json, locale)
}
