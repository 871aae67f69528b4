//! # Dependency resolution
//!
//! Joins the catalog's package list with the files a sync produced. Each non-framework file
//! is a potential main package; it qualifies when one of its target platforms fits the
//! device and every framework dependency its catalog entry declares has at least one
//! fitting file. For each dependency only the files at the highest eligible version are kept.
//!
//! Resolution runs in two steps: [`plan`] is pure and decides what to install, [`resolve`]
//! then looks up download URLs for the chosen files.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::catalog::{CatalogPackage, FrameworkDependency};
use crate::sync::{CandidateUpdate, SyncClient, TargetParams};
use crate::{DeviceFamily, PackedVersion};

/// A file with its download location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedFile {
	pub file_name: String,
	pub update_id: String,
	pub revision_number: String,
	pub digest: String,
	pub url: String,
}

/// A main package and everything needed to install it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedInstallSet {
	pub version: PackedVersion,
	pub main: ResolvedFile,
	/// `None` when the catalog has no entry for this version, so its dependencies are unknown.
	pub dependencies: Option<Vec<ResolvedFile>>,
}

/// A version left out because one of its framework dependencies has no fitting file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedVersion {
	pub version: PackedVersion,
	pub dependency: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionReport {
	/// Highest version first.
	pub installable: Vec<ResolvedInstallSet>,
	/// Versions with no target platform fitting the device.
	pub filtered: Vec<PackedVersion>,
	pub unresolved: Vec<UnresolvedVersion>,
}

impl ResolutionReport {
	/// Nothing can be installed with the requested device options.
	pub fn is_no_applicable_packages(&self) -> bool {
		self.installable.is_empty()
	}
}

/// A main file and its chosen dependencies, before URLs are known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedSet<'c> {
	pub main: &'c CandidateUpdate,
	pub dependencies: Option<Vec<&'c CandidateUpdate>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionPlan<'c> {
	pub sets: Vec<PlannedSet<'c>>,
	pub filtered: Vec<PackedVersion>,
	pub unresolved: Vec<UnresolvedVersion>,
}

type FileKey<'c> = (&'c str, &'c str, &'c str);

fn file_key(c: &CandidateUpdate) -> FileKey<'_> {
	(c.update_id.as_str(), c.revision_number.as_str(), c.digest.as_str())
}

impl<'c> ResolutionPlan<'c> {
	/// Every file the plan installs, each once.
	pub fn files(&self) -> Vec<&'c CandidateUpdate> {
		let mut files: Vec<&'c CandidateUpdate> = Vec::new();
		let all = self.sets.iter()
			.flat_map(|s| std::iter::once(s.main).chain(s.dependencies.iter().flatten().copied()));
		for file in all {
			if !files.iter().any(|f| file_key(f) == file_key(file)) {
				files.push(file);
			}
		}
		files
	}

	fn into_report(self, urls: &HashMap<FileKey<'c>, String>) -> crate::Result<ResolutionReport> {
		let resolved = |c: &'c CandidateUpdate| -> crate::Result<ResolvedFile> {
			let url = urls.get(&file_key(c)).ok_or(crate::Error::NoMatchingLocation)?;
			Ok(ResolvedFile {
				file_name: c.file_name.clone(),
				update_id: c.update_id.clone(),
				revision_number: c.revision_number.clone(),
				digest: c.digest.clone(),
				url: url.clone(),
			})
		};

		let installable = self.sets.iter()
			.map(|set| -> crate::Result<ResolvedInstallSet> {
				let dependencies = match &set.dependencies {
					Some(d) => Some(d.iter().copied().map(&resolved).collect::<crate::Result<Vec<_>>>()?),
					None => None,
				};
				Ok(ResolvedInstallSet { version: set.main.version, main: resolved(set.main)?, dependencies })
			})
			.collect::<crate::Result<Vec<_>>>()?;

		Ok(ResolutionReport { installable, filtered: self.filtered, unresolved: self.unresolved })
	}
}

/// Files satisfying each framework dependency of `package`, or the first dependency nothing satisfies.
fn select_dependencies<'c, 'p>(package: &'p CatalogPackage, candidates: &'c [CandidateUpdate], family: DeviceFamily, os_version: PackedVersion) -> Result<Vec<&'c CandidateUpdate>, &'p FrameworkDependency> {
	let mut selected: Vec<&'c CandidateUpdate> = Vec::new();
	for dependency in &package.framework_dependencies {
		let eligible: Vec<&'c CandidateUpdate> = candidates.iter()
			.filter(|c| c.package_identity.eq_ignore_ascii_case(&dependency.package_identity))
			.filter(|c| c.version >= dependency.min_version)
			.filter(|c| c.applies_to(family, os_version))
			.collect();
		let Some(highest) = eligible.iter().map(|c| c.version).max() else {
			return Err(dependency);
		};
		for file in eligible.into_iter().filter(|c| c.version == highest) {
			if !selected.iter().any(|s| s.update_id == file.update_id && s.file_name == file.file_name) {
				selected.push(file);
			}
		}
	}
	Ok(selected)
}

/// Decides which files to install for `family` at `os_version`.
pub fn plan<'c>(packages: &[CatalogPackage], candidates: &'c [CandidateUpdate], family: DeviceFamily, os_version: PackedVersion) -> ResolutionPlan<'c> {
	let mut mains: Vec<&'c CandidateUpdate> = candidates.iter().filter(|c| !c.is_framework).collect();
	/* Stable, so equal versions keep sync order */
	mains.sort_by(|a, b| b.version.cmp(&a.version));

	let mut plan = ResolutionPlan::default();
	let mut not_applicable: Vec<PackedVersion> = Vec::new();
	for main in mains {
		if !main.applies_to(family, os_version) {
			log::debug!("{} {} does not apply to {} {}", main.file_name, main.version, family, os_version);
			not_applicable.push(main.version);
			continue;
		}

		let Some(package) = packages.iter().find(|p| p.is(&main.package_identity, main.version)) else {
			log::warn!("Catalog has no entry for {} {}, dependencies unknown", main.package_identity, main.version);
			plan.sets.push(PlannedSet { main, dependencies: None });
			continue;
		};

		match select_dependencies(package, candidates, family, os_version) {
			Ok(dependencies) => plan.sets.push(PlannedSet { main, dependencies: Some(dependencies) }),
			Err(dependency) => {
				log::debug!("{} {} needs {} >= {} which has no applicable file", main.package_identity, main.version, dependency.package_identity, dependency.min_version);
				let unresolved = UnresolvedVersion { version: main.version, dependency: dependency.package_identity.clone() };
				if !plan.unresolved.contains(&unresolved) {
					plan.unresolved.push(unresolved);
				}
			},
		}
	}

	/* A version is filtered only when none of its main files apply */
	for version in not_applicable {
		let has_applicable = plan.sets.iter().any(|s| s.main.version == version)
			|| plan.unresolved.iter().any(|u| u.version == version);
		if !has_applicable && !plan.filtered.contains(&version) {
			plan.filtered.push(version);
		}
	}
	plan
}

/// Plans the install sets and looks up the download URL of every chosen file.
///
/// Lookups run concurrently, one per distinct file.
pub async fn resolve(packages: &[CatalogPackage], candidates: &[CandidateUpdate], client: &SyncClient<'_>, params: &TargetParams, cancel: &CancellationToken) -> crate::Result<ResolutionReport> {
	let plan = plan(packages, candidates, params.device_family, params.os_version);
	let files = plan.files();
	log::trace!("Resolving {} file location(s)", files.len());

	let urls = futures::future::try_join_all(
		files.iter().map(|f| client.resolve_file_url(&f.update_id, &f.revision_number, &f.digest, params, cancel))
	).await?;
	let urls: HashMap<FileKey, String> = files.into_iter().map(file_key).zip(urls).collect();

	let report = plan.into_report(&urls)?;
	log::info!(
		"Resolved {} install set(s), {} filtered, {} with unresolved dependencies",
		report.installable.len(), report.filtered.len(), report.unresolved.len()
	);
	Ok(report)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::catalog::PlatformDependency;
	use crate::sync::TargetPlatform;

	const OS: PackedVersion = PackedVersion::new(10, 0, 20000, 0);

	fn v(s: &str) -> PackedVersion {
		PackedVersion::parse(s).unwrap()
	}

	fn file(identity: &str, version: &str, family: DeviceFamily, min_os: &str, is_framework: bool) -> CandidateUpdate {
		CandidateUpdate {
			update_id: format!("{}-{}-{:?}", identity, version, family),
			revision_number: "1".to_string(),
			digest: format!("digest-{}-{}-{:?}", identity, version, family),
			package_identity: identity.to_string(),
			version: v(version),
			file_name: format!("{}_{}_x64__8wekyb3d8bbwe.appx", identity, version),
			size: None,
			target_platforms: vec![TargetPlatform { family, min_version: v(min_os) }],
			is_framework,
		}
	}

	fn package(identity: &str, version: &str, dependencies: &[(&str, &str)]) -> CatalogPackage {
		CatalogPackage {
			package_identity: identity.to_string(),
			version: v(version),
			rank: 0,
			framework_dependencies: dependencies.iter().map(|(i, m)| FrameworkDependency { package_identity: i.to_string(), min_version: v(m) }).collect(),
			platform_dependencies: vec![PlatformDependency { family: DeviceFamily::Desktop, min_version: v("10.0.10000.0") }],
			wu_category_id: Some("cat".to_string()),
		}
	}

	#[test]
	fn highest_dependency_group_only() {
		let candidates = vec![
			file("Contoso.App", "2.0.0.0", DeviceFamily::Desktop, "10.0.10000.0", false),
			file("Runtime.X", "1.0.0.0", DeviceFamily::Desktop, "10.0.10000.0", true),
			file("Runtime.X", "1.1.0.0", DeviceFamily::Desktop, "10.0.10000.0", true),
		];
		let packages = vec![package("Contoso.App", "2.0.0.0", &[("Runtime.X", "1.0.0.0")])];
		let plan = plan(&packages, &candidates, DeviceFamily::Desktop, OS);
		assert_eq!(plan.sets.len(), 1);
		let deps = plan.sets[0].dependencies.as_ref().unwrap();
		assert_eq!(deps.len(), 1);
		assert_eq!(deps[0].version, v("1.1.0.0"));
	}

	#[test]
	fn all_files_of_highest_group_are_kept() {
		let mut arm = file("Runtime.X", "1.1.0.0", DeviceFamily::Desktop, "10.0.10000.0", true);
		arm.update_id = "arm".to_string();
		arm.file_name = "Runtime.X_1.1.0.0_arm__8wekyb3d8bbwe.appx".to_string();
		let candidates = vec![
			file("Contoso.App", "2.0.0.0", DeviceFamily::Desktop, "10.0.10000.0", false),
			file("Runtime.X", "1.1.0.0", DeviceFamily::Desktop, "10.0.10000.0", true),
			arm,
			file("Runtime.X", "1.0.0.0", DeviceFamily::Desktop, "10.0.10000.0", true),
		];
		let packages = vec![package("Contoso.App", "2.0.0.0", &[("Runtime.X", "1.0.0.0")])];
		let plan = plan(&packages, &candidates, DeviceFamily::Desktop, OS);
		let deps = plan.sets[0].dependencies.as_ref().unwrap();
		assert_eq!(deps.len(), 2);
		assert!(deps.iter().all(|d| d.version == v("1.1.0.0")));
	}

	#[test]
	fn unsatisfied_dependency_excludes_version() {
		let candidates = vec![
			file("Contoso.App", "2.0.0.0", DeviceFamily::Desktop, "10.0.10000.0", false),
			file("Runtime.X", "1.1.0.0", DeviceFamily::Xbox, "10.0.10000.0", true),
			file("Runtime.Y", "3.0.0.0", DeviceFamily::Desktop, "10.0.10000.0", true),
		];
		let packages = vec![package("Contoso.App", "2.0.0.0", &[("Runtime.Y", "1.0.0.0"), ("Runtime.X", "1.0.0.0")])];
		let plan = plan(&packages, &candidates, DeviceFamily::Desktop, OS);
		assert!(plan.sets.is_empty());
		assert_eq!(plan.unresolved, vec![UnresolvedVersion { version: v("2.0.0.0"), dependency: "Runtime.X".to_string() }]);
	}

	#[test]
	fn dependency_below_minimum_does_not_count() {
		let candidates = vec![
			file("Contoso.App", "2.0.0.0", DeviceFamily::Desktop, "10.0.10000.0", false),
			file("Runtime.X", "1.0.0.0", DeviceFamily::Desktop, "10.0.10000.0", true),
		];
		let packages = vec![package("Contoso.App", "2.0.0.0", &[("Runtime.X", "1.5.0.0")])];
		assert_eq!(plan(&packages, &candidates, DeviceFamily::Desktop, OS).unresolved.len(), 1);
	}

	#[test]
	fn only_applicable_version_is_installable() {
		let candidates = vec![
			file("Contoso.App", "3.0.0.0", DeviceFamily::Desktop, "10.0.22000.0", false),
			file("Contoso.App", "2.0.0.0", DeviceFamily::Desktop, "10.0.10000.0", false),
		];
		let packages = vec![package("Contoso.App", "3.0.0.0", &[]), package("Contoso.App", "2.0.0.0", &[])];
		let plan = plan(&packages, &candidates, DeviceFamily::Desktop, OS);
		assert_eq!(plan.sets.len(), 1);
		assert_eq!(plan.sets[0].main.version, v("2.0.0.0"));
		assert_eq!(plan.filtered, vec![v("3.0.0.0")]);
		assert!(plan.unresolved.is_empty());
	}

	#[test]
	fn universal_target_applies() {
		let candidates = vec![file("Contoso.App", "1.0.0.0", DeviceFamily::Universal, "10.0.10000.0", false)];
		let packages = vec![package("Contoso.App", "1.0.0.0", &[])];
		assert_eq!(plan(&packages, &candidates, DeviceFamily::Xbox, OS).sets.len(), 1);
	}

	#[test]
	fn missing_catalog_entry_keeps_version() {
		let candidates = vec![file("Contoso.App", "1.0.0.0", DeviceFamily::Desktop, "10.0.10000.0", false)];
		let plan = plan(&[], &candidates, DeviceFamily::Desktop, OS);
		assert_eq!(plan.sets.len(), 1);
		assert_eq!(plan.sets[0].dependencies, None);
	}

	#[test]
	fn catalog_identity_match_ignores_case() {
		let candidates = vec![file("contoso.app", "1.0.0.0", DeviceFamily::Desktop, "10.0.10000.0", false)];
		let packages = vec![package("Contoso.App", "1.0.0.0", &[])];
		assert_eq!(plan(&packages, &candidates, DeviceFamily::Desktop, OS).sets[0].dependencies, Some(vec![]));
	}

	#[test]
	fn descending_order_and_frameworks_are_never_main() {
		let candidates = vec![
			file("Contoso.App", "1.0.0.0", DeviceFamily::Desktop, "10.0.10000.0", false),
			file("Runtime.X", "9.0.0.0", DeviceFamily::Desktop, "10.0.10000.0", true),
			file("Contoso.App", "1.10.0.0", DeviceFamily::Desktop, "10.0.10000.0", false),
			file("Contoso.App", "1.9.0.0", DeviceFamily::Desktop, "10.0.10000.0", false),
		];
		let plan = plan(&[], &candidates, DeviceFamily::Desktop, OS);
		let versions: Vec<String> = plan.sets.iter().map(|s| s.main.version.to_string()).collect();
		assert_eq!(versions, vec!["1.10.0.0", "1.9.0.0", "1.0.0.0"]);
	}

	#[test]
	fn shared_dependency_files_are_listed_once() {
		let candidates = vec![
			file("Contoso.App", "2.0.0.0", DeviceFamily::Desktop, "10.0.10000.0", false),
			file("Contoso.App", "1.0.0.0", DeviceFamily::Desktop, "10.0.10000.0", false),
			file("Runtime.X", "1.0.0.0", DeviceFamily::Desktop, "10.0.10000.0", true),
		];
		let packages = vec![
			package("Contoso.App", "2.0.0.0", &[("Runtime.X", "1.0.0.0"), ("runtime.x", "1.0.0.0")]),
			package("Contoso.App", "1.0.0.0", &[("Runtime.X", "1.0.0.0")]),
		];
		let plan = plan(&packages, &candidates, DeviceFamily::Desktop, OS);
		assert_eq!(plan.sets[0].dependencies.as_ref().unwrap().len(), 1);
		assert_eq!(plan.files().len(), 3);
	}

	#[test]
	fn version_with_one_applicable_file_is_not_filtered() {
		let candidates = vec![
			file("Contoso.App", "2.0.0.0", DeviceFamily::Desktop, "10.0.10000.0", false),
			file("Contoso.App", "2.0.0.0", DeviceFamily::Xbox, "10.0.10000.0", false),
		];
		let plan = plan(&[], &candidates, DeviceFamily::Desktop, OS);
		assert_eq!(plan.sets.len(), 1);
		assert!(plan.filtered.is_empty());
	}

	#[test]
	fn filtered_versions_are_listed_once() {
		let candidates = vec![
			file("Contoso.App", "2.0.0.0", DeviceFamily::Mobile, "10.0.10000.0", false),
			file("Contoso.App", "2.0.0.0", DeviceFamily::Xbox, "10.0.10000.0", false),
		];
		assert_eq!(plan(&[], &candidates, DeviceFamily::Desktop, OS).filtered, vec![v("2.0.0.0")]);
	}

	#[test]
	fn unresolved_version_is_reported_once_per_dependency() {
		let mut arm = file("Contoso.App", "2.0.0.0", DeviceFamily::Desktop, "10.0.10000.0", false);
		arm.update_id = "arm".to_string();
		arm.file_name = "Contoso.App_2.0.0.0_arm64__8wekyb3d8bbwe.appx".to_string();
		let candidates = vec![file("Contoso.App", "2.0.0.0", DeviceFamily::Desktop, "10.0.10000.0", false), arm];
		let packages = vec![package("Contoso.App", "2.0.0.0", &[("Runtime.R", "1.0.0.0")])];
		let plan = plan(&packages, &candidates, DeviceFamily::Desktop, OS);
		assert!(plan.sets.is_empty());
		assert_eq!(plan.unresolved, vec![UnresolvedVersion { version: v("2.0.0.0"), dependency: "Runtime.R".to_string() }]);
	}

	#[test]
	fn empty_report_has_no_applicable_packages() {
		assert!(ResolutionReport::default().is_no_applicable_packages());
	}
}
