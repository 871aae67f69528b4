//! # Display catalog
//!
//! The catalog lists every package published for a product together with what each one
//! needs at install time: other packages (framework dependencies) and a minimum OS version
//! per device family (platform dependencies). It also hands out the category id used to
//! query the update service.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::json::*;
use crate::transport::Transport;
use crate::{DeviceFamily, Locale, PackedVersion, StoreListingsOptions};

/// Another package required at install time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameworkDependency {
	pub package_identity: String,
	pub min_version: PackedVersion,
}

/// Minimum OS version for a device family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformDependency {
	pub family: DeviceFamily,
	pub min_version: PackedVersion,
}

/// One published package of a product.
///
/// Identity and version together identify a package, the same identity appears once per version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogPackage {
	pub package_identity: String,
	pub version: PackedVersion,
	/// Ordering hint from the catalog, not used for resolution.
	pub rank: i64,
	pub framework_dependencies: Vec<FrameworkDependency>,
	pub platform_dependencies: Vec<PlatformDependency>,
	/// Update service category, absent for packages not delivered through it.
	pub wu_category_id: Option<String>,
}

impl CatalogPackage {
	/// True if any platform dependency allows `os_version`.
	pub fn supports_os(&self, os_version: PackedVersion) -> bool {
		self.platform_dependencies.iter().any(|p| p.min_version <= os_version)
	}

	/// Case-insensitive identity and exact version match.
	pub fn is(&self, package_identity: &str, version: PackedVersion) -> bool {
		self.version == version && self.package_identity.eq_ignore_ascii_case(package_identity)
	}

	fn from_json(v: &Value, package_identity: &str) -> crate::Result<Self> {
		let platform_dependencies = array_field(v, "PlatformDependencies")?
			.iter()
			.map(|p| -> crate::Result<PlatformDependency> {
				let name = str_field(p, "PlatformName")?;
				let family = DeviceFamily::from_catalog_platform(name);
				if family == DeviceFamily::Unknown {
					log::warn!("Unrecognised platform `{}` in catalog package {}", name, package_identity);
				}
				Ok(PlatformDependency {
					family,
					min_version: PackedVersion::unpack(u64_field(p, "MinVersion")?),
				})
			})
			.collect::<crate::Result<Vec<_>>>()?;

		let framework_dependencies = array_field(v, "FrameworkDependencies")?
			.iter()
			.map(|f| -> crate::Result<FrameworkDependency> {
				Ok(FrameworkDependency {
					package_identity: str_field(f, "PackageIdentity")?.to_string(),
					min_version: PackedVersion::unpack(u64_field(f, "MinVersion")?),
				})
			})
			.collect::<crate::Result<Vec<_>>>()?;

		/* The packed version is a decimal string here, unlike MinVersion */
		let version = {
			let s = str_field(v, "Version")?;
			s.parse::<u64>()
				.map(PackedVersion::unpack)
				.map_err(|_| crate::Error::Parse(format!("package version `{}` is not a packed integer", s)))?
		};

		let wu_category_id = v.get("FulfillmentData")
			.and_then(|f| opt_str_field(f, "WuCategoryId"))
			.map(|s| s.to_string());
		if wu_category_id.is_none() {
			log::warn!("Catalog package {} {} has no update category", package_identity, version);
		}

		Ok(CatalogPackage {
			package_identity: package_identity.to_string(),
			version,
			rank: field(v, "PackageRank")?.as_i64().ok_or_else(|| crate::Error::Parse("PackageRank must be an integer".to_string()))?,
			framework_dependencies,
			platform_dependencies,
			wu_category_id,
		})
	}
}

/// Reads the package list out of a catalog product document.
pub fn parse_packages(json: &Value) -> crate::Result<Vec<CatalogPackage>> {
	let product = field(json, "Product")?;
	let package_identity = str_field(field(product, "Properties")?, "PackageIdentityName")?;

	let availability = array_field(product, "DisplaySkuAvailabilities")?
		.first()
		.ok_or_else(|| crate::Error::Parse("product has no sku availabilities".to_string()))?;
	let packages = array_field(field(field(availability, "Sku")?, "Properties")?, "Packages")?;

	packages.iter().map(|p| CatalogPackage::from_json(p, package_identity)).collect()
}

/// Builds the catalog URL for `product_id`.
pub fn packages_url(options: &StoreListingsOptions, product_id: &str, locale: &Locale) -> String {
	let neutral = if options.include_neutral_languages() { ",neutral" } else { "" };
	format!(
		"{}{}?market={}&languages={},{}{}",
		options.catalog_url(), product_id, locale.market, locale.tag(), locale.language, neutral
	)
}

/// Fetches every package the catalog declares for `product_id`.
pub async fn fetch_packages(transport: &dyn Transport, options: &StoreListingsOptions, product_id: &str, locale: &Locale) -> crate::Result<Vec<CatalogPackage>> {
	let url = packages_url(options, product_id, locale);
	log::trace!("Fetching catalog packages for {}", product_id);
	let response = transport.get(&url).await?;
	let json = parse_store_response(response, &url)?;
	let packages = parse_packages(&json)?;
	log::info!("Catalog lists {} package(s) for {}", packages.len(), product_id);
	Ok(packages)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn product(packages: Value) -> Value {
		serde_json::json!({
			"Product": {
				"Properties": { "PackageIdentityName": "Contoso.App" },
				"DisplaySkuAvailabilities": [ { "Sku": { "Properties": { "Packages": packages } } } ]
			}
		})
	}

	fn package(version: &str, platform: &str) -> Value {
		serde_json::json!({
			"Version": PackedVersion::parse(version).unwrap().pack().to_string(),
			"PackageRank": 30001,
			"FulfillmentData": { "WuCategoryId": "cat-1" },
			"PlatformDependencies": [
				{ "PlatformName": platform, "MinVersion": PackedVersion::new(10, 0, 17763, 0).pack() }
			],
			"FrameworkDependencies": [
				{ "PackageIdentity": "Microsoft.VCLibs.140.00", "MinVersion": PackedVersion::new(14, 0, 30704, 0).pack() }
			]
		})
	}

	#[test]
	fn parses_packages() {
		let packages = parse_packages(&product(serde_json::json!([package("1.2.3.0", "Windows.Desktop")]))).unwrap();
		assert_eq!(packages.len(), 1);
		let p = &packages[0];
		assert_eq!(p.package_identity, "Contoso.App");
		assert_eq!(p.version, PackedVersion::new(1, 2, 3, 0));
		assert_eq!(p.rank, 30001);
		assert_eq!(p.wu_category_id.as_deref(), Some("cat-1"));
		assert_eq!(p.platform_dependencies, vec![PlatformDependency { family: DeviceFamily::Desktop, min_version: PackedVersion::new(10, 0, 17763, 0) }]);
		assert_eq!(p.framework_dependencies[0].package_identity, "Microsoft.VCLibs.140.00");
		assert_eq!(p.framework_dependencies[0].min_version, PackedVersion::new(14, 0, 30704, 0));
	}

	#[test]
	fn unknown_platform_does_not_fail_the_fetch() {
		let packages = parse_packages(&product(serde_json::json!([package("1.0.0.0", "Windows.WindowsPhone8x")]))).unwrap();
		assert_eq!(packages[0].platform_dependencies[0].family, DeviceFamily::Unknown);
	}

	#[test]
	fn missing_category_is_none() {
		let mut p = package("1.0.0.0", "Windows.Desktop");
		p.as_object_mut().unwrap().remove("FulfillmentData");
		let packages = parse_packages(&product(serde_json::json!([p]))).unwrap();
		assert_eq!(packages[0].wu_category_id, None);
	}

	#[test]
	fn bad_version_string_is_a_parse_error() {
		let mut p = package("1.0.0.0", "Windows.Desktop");
		p["Version"] = serde_json::json!("1.0.0.0");
		assert!(matches!(parse_packages(&product(serde_json::json!([p]))), Err(crate::Error::Parse(_))));
	}

	#[test]
	fn missing_dependency_list_is_a_parse_error() {
		let mut p = package("1.0.0.0", "Windows.Desktop");
		p.as_object_mut().unwrap().remove("FrameworkDependencies");
		assert!(parse_packages(&product(serde_json::json!([p]))).is_err());
	}

	#[test]
	fn supports_os_checks_any_platform() {
		let packages = parse_packages(&product(serde_json::json!([package("1.0.0.0", "Windows.Desktop")]))).unwrap();
		assert!(packages[0].supports_os(PackedVersion::new(10, 0, 19041, 0)));
		assert!(!packages[0].supports_os(PackedVersion::new(10, 0, 10240, 0)));
	}

	#[test]
	fn identity_match_ignores_case() {
		let packages = parse_packages(&product(serde_json::json!([package("1.0.0.0", "Windows.Desktop")]))).unwrap();
		assert!(packages[0].is("contoso.app", PackedVersion::new(1, 0, 0, 0)));
		assert!(!packages[0].is("contoso.app", PackedVersion::new(1, 0, 0, 1)));
	}

	#[test]
	fn url_lists_languages() {
		let url = packages_url(&StoreListingsOptions::default(), "9NBLGGH4NNS1", &Locale::new("en", "GB"));
		assert_eq!(url, "https://displaycatalog.mp.microsoft.com/v7.0/products/9NBLGGH4NNS1?market=GB&languages=en-GB,en,neutral");
	}
}
