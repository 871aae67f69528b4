//! Turns the update fragments returned by a sync into downloadable candidates.

use serde_json::Value;

use super::soap::{attribute, child, children, text};
use super::{CandidateUpdate, TargetPlatform};
use crate::{DeviceFamily, PackedVersion};

/// The extended and published fragments the service returned for one update id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct UpdateFragments {
	pub id: String,
	pub extended: String,
	pub published: Option<String>,
}

impl UpdateFragments {
	/// One candidate per non-cab file of the update.
	///
	/// Updates without files, without a secured fragment or without declared target platforms
	/// yield nothing.
	pub fn candidates(&self) -> crate::Result<Vec<CandidateUpdate>> {
		let published = match &self.published {
			Some(p) if self.extended.contains("<Files") && p.contains("SecuredFragment") => p,
			_ => {
				log::trace!("Update {} has no downloadable files", self.id);
				return Ok(Vec::new());
			},
		};

		let xml = format!("<Xml>{}{}</Xml>", self.extended, published);
		let doc = roxmltree::Document::parse(&xml)?;
		let root = doc.root_element();

		let identity = child(root, None, "UpdateIdentity")?;
		let update_id = attribute(identity, "UpdateID")?;
		let revision_number = attribute(identity, "RevisionNumber")?;

		let properties = child(root, None, "ExtendedProperties")?;
		let package_identity = attribute(properties, "PackageIdentityName")?;
		let is_framework = properties.attribute("IsAppxFramework").map_or(false, |v| v.eq_ignore_ascii_case("true"));

		let blob = ["ApplicabilityRules", "Metadata", "AppxPackageMetadata", "AppxMetadata", "ApplicabilityBlob"]
			.iter()
			.try_fold(root, |node, name| child(node, None, name))?;
		let Some(target_platforms) = target_platforms(&text(blob))? else {
			log::debug!("Update {} declares no target platforms, skipping", update_id);
			return Ok(Vec::new());
		};

		let mut candidates = Vec::new();
		for file in children(child(root, None, "Files")?, None, "File") {
			let original_name = attribute(file, "FileName")?;
			if original_name.to_lowercase().ends_with(".cab") {
				continue;
			}
			let identifier = attribute(file, "InstallerSpecificIdentifier")?;
			let extension = original_name.rfind('.').map_or("", |i| &original_name[i..]);

			candidates.push(CandidateUpdate {
				update_id: update_id.to_string(),
				revision_number: revision_number.to_string(),
				digest: attribute(file, "Digest")?.to_string(),
				package_identity: package_identity.to_string(),
				version: identifier_version(identifier)?,
				file_name: format!("{}{}", identifier, extension),
				size: file.attribute("Size").and_then(|s| s.parse().ok()),
				target_platforms: target_platforms.clone(),
				is_framework,
			});
		}
		Ok(candidates)
	}
}

/// Reads `content.targetPlatforms` out of an applicability blob, `None` when it is absent.
fn target_platforms(blob: &str) -> crate::Result<Option<Vec<TargetPlatform>>> {
	let json: Value = serde_json::from_str(blob)?;
	let Some(platforms) = json.get("content.targetPlatforms") else {
		return Ok(None);
	};
	let platforms = platforms.as_array()
		.ok_or_else(|| crate::Error::Parse("content.targetPlatforms must be an array".to_string()))?;

	platforms.iter()
		.map(|p| -> crate::Result<TargetPlatform> {
			let target = p.get("platform.target").and_then(|t| t.as_i64())
				.ok_or_else(|| crate::Error::Parse("target platform has no platform.target".to_string()))?;
			let min_version = p.get("platform.minVersion").and_then(|v| v.as_u64())
				.ok_or_else(|| crate::Error::Parse("target platform has no platform.minVersion".to_string()))?;
			Ok(TargetPlatform {
				family: DeviceFamily::from_update_platform(target),
				min_version: PackedVersion::unpack(min_version),
			})
		})
		.collect::<crate::Result<Vec<_>>>()
		.map(Some)
}

/// The version segment of `Name_Version_Arch_Resource_Publisher`.
fn identifier_version(identifier: &str) -> crate::Result<PackedVersion> {
	let segment = identifier.split('_').nth(1)
		.filter(|_| identifier.matches('_').count() >= 2)
		.ok_or_else(|| crate::Error::Parse(format!("installer identifier `{}` has no version segment", identifier)))?;
	Ok(PackedVersion::parse(segment)?)
}
