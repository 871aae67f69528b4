//! # Update service client
//!
//! Packages are delivered through the Windows Update FE3 service, a SOAP 1.2 API.
//! A session starts with a [`Cookie`]; every reply hands back a fresh one which must be
//! used for the next request.
//!
//! Syncing a category is incremental: each round reports the update ids already seen and the
//! service answers with ones it has not revealed yet. Once a round reveals nothing new the
//! sync is complete and the collected fragments are parsed into [`CandidateUpdate`]s.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::transport::Transport;
use crate::{DeviceFamily, Locale, PackedVersion, StoreListingsOptions};

mod soap;
mod update_info;

use soap::{children, text, wu_child, WU_NS};
use update_info::UpdateFragments;

/// Session token for the update service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
	pub data: String,
	pub expiration: String,
}

impl Cookie {
	fn from_xml(node: roxmltree::Node) -> crate::Result<Self> {
		Ok(Cookie {
			data: text(wu_child(node, "EncryptedData")?),
			expiration: text(wu_child(node, "Expiration")?),
		})
	}
}

/// The device the update service should answer for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetParams {
	pub device_family: DeviceFamily,
	pub os_version: PackedVersion,
	pub flight_ring: String,
	pub flighting_branch: String,
	pub current_branch: String,
	pub locale: Locale,
}

impl Default for TargetParams {
	fn default() -> Self {
		Self {
			device_family: DeviceFamily::Desktop,
			os_version: PackedVersion::new(10, 0, 26100, 0),
			flight_ring: "Retail".to_string(),
			flighting_branch: String::new(),
			current_branch: "ge_release".to_string(),
			locale: Locale::default(),
		}
	}
}

impl TargetParams {
	/// Any ring other than `Retail` opts into flights.
	pub fn flight_enabled(&self) -> bool {
		self.flight_ring != "Retail"
	}

	/// The `DeviceAttributes` string describing this device.
	pub fn device_attributes(&self) -> String {
		let tag = self.locale.tag();
		format!(
			"BranchReadinessLevel=CB;CurrentBranch={current_branch};OEMModel=Virtual Machine;FlightRing={flight_ring};AttrDataVer=21;\
			SystemManufacturer=Microsoft Corporation;InstallLanguage={tag};OSUILocale={tag};InstallationType={installation_type};\
			FlightingBranchName={flighting_branch};FirmwareVersion=Hyper-V UEFI Release v2.5;SystemProductName=Virtual Machine;\
			OSSkuId=48;FlightContent=Mainline;App=WU_STORE;OEMName_Uncleaned=Microsoft Corporation;AppVer=0.0.0.0;\
			OSArchitecture=AMD64;SystemSKU=None;UpdateManagementGroup=2;IsFlightingEnabled={flight_enabled};IsDeviceRetailDemo=0;\
			TelemetryLevel=3;OSVersion={os_version};DeviceFamily=Windows.{device_family};",
			current_branch = self.current_branch,
			flight_ring = self.flight_ring,
			tag = tag,
			installation_type = self.device_family.installation_type(),
			flighting_branch = self.flighting_branch,
			flight_enabled = u8::from(self.flight_enabled()),
			os_version = self.os_version,
			device_family = self.device_family,
		)
	}
}

/// A device family and the minimum OS version an update supports on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetPlatform {
	pub family: DeviceFamily,
	pub min_version: PackedVersion,
}

/// One downloadable file of an update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateUpdate {
	pub update_id: String,
	pub revision_number: String,
	pub digest: String,
	pub package_identity: String,
	pub version: PackedVersion,
	/// Installer identifier plus the original extension.
	pub file_name: String,
	pub size: Option<u64>,
	pub target_platforms: Vec<TargetPlatform>,
	pub is_framework: bool,
}

impl CandidateUpdate {
	/// True if some target platform covers `family` with a minimum no higher than `os_version`.
	pub fn applies_to(&self, family: DeviceFamily, os_version: PackedVersion) -> bool {
		self.target_platforms.iter().any(|p| p.family.covers(family) && p.min_version <= os_version)
	}
}

/// Everything a completed sync produced.
#[derive(Debug, Clone)]
pub struct SyncResult {
	pub updates: Vec<CandidateUpdate>,
	/// The last cookie handed out, valid for follow-up requests.
	pub cookie: Cookie,
}

/// Runs `request` unless `cancel` fires first.
pub(crate) async fn cancellable<T>(cancel: &CancellationToken, request: impl std::future::Future<Output = crate::Result<T>>) -> crate::Result<T> {
	if cancel.is_cancelled() {
		return Err(crate::Error::Cancelled);
	}
	tokio::select! {
		_ = cancel.cancelled() => Err(crate::Error::Cancelled),
		r = request => r,
	}
}

fn id_and_xml(node: roxmltree::Node) -> crate::Result<(String, String)> {
	Ok((text(wu_child(node, "ID")?), text(wu_child(node, "Xml")?)))
}

/// What one sync round returned.
struct SyncRound {
	cookie: Cookie,
	fragments: Vec<UpdateFragments>,
}

impl SyncRound {
	fn from_xml(body: roxmltree::Node) -> crate::Result<Self> {
		let result = wu_child(wu_child(body, "SyncUpdatesResponse")?, "SyncUpdatesResult")?;
		let cookie = Cookie::from_xml(wu_child(result, "NewCookie")?)?;

		let extended = match soap::find_child(result, Some(WU_NS), "ExtendedUpdateInfo") {
			Some(info) => children(wu_child(info, "Updates")?, Some(WU_NS), "Update")
				.map(id_and_xml)
				.collect::<crate::Result<Vec<_>>>()?,
			None => Vec::new(),
		};
		let published = match soap::find_child(result, Some(WU_NS), "NewUpdates") {
			Some(new) => children(new, Some(WU_NS), "UpdateInfo")
				.map(id_and_xml)
				.collect::<crate::Result<Vec<_>>>()?,
			None => Vec::new(),
		};

		let fragments = extended.into_iter()
			.map(|(id, extended)| {
				let published = published.iter().find(|(p, _)| *p == id).map(|(_, xml)| xml.clone());
				UpdateFragments { id, extended, published }
			})
			.collect();
		Ok(SyncRound { cookie, fragments })
	}
}

/// Accumulated sync progress: the current cookie and every id seen so far, in order.
struct SyncState {
	cookie: Cookie,
	seen: Vec<String>,
	seen_set: HashSet<String>,
	fragments: Vec<UpdateFragments>,
	rounds: usize,
}

impl SyncState {
	fn new(cookie: Cookie) -> Self {
		Self { cookie, seen: Vec::new(), seen_set: HashSet::new(), fragments: Vec::new(), rounds: 0 }
	}

	/// Folds a round in, returning how many ids it revealed for the first time.
	fn advance(&mut self, round: SyncRound) -> usize {
		self.rounds += 1;
		self.cookie = round.cookie;
		let mut revealed = 0;
		for fragment in round.fragments {
			if self.seen_set.insert(fragment.id.clone()) {
				self.seen.push(fragment.id.clone());
				self.fragments.push(fragment);
				revealed += 1;
			}
		}
		revealed
	}
}

/// Client for the FE3 update service.
pub struct SyncClient<'a> {
	transport: &'a dyn Transport,
	options: &'a StoreListingsOptions,
}

impl<'a> SyncClient<'a> {
	pub fn new(transport: &'a dyn Transport, options: &'a StoreListingsOptions) -> Self {
		Self { transport, options }
	}

	/// Starts a session.
	pub async fn acquire_cookie(&self, cancel: &CancellationToken) -> crate::Result<Cookie> {
		let url = self.options.fe3_url();
		log::trace!("Requesting update service cookie");
		let response = cancellable(cancel, self.transport.post_soap(url, soap::get_cookie())).await?;
		soap::read_body(response, url, |body| {
			Cookie::from_xml(wu_child(wu_child(body, "GetCookieResponse")?, "GetCookieResult")?)
		})
	}

	/// Syncs every update in `category_id` visible to the device in `params`.
	///
	/// Each round sends the cookie from the previous reply along with every id seen so far.
	/// Fails with [`crate::Error::ProtocolLoopExceeded`] if the service keeps revealing ids past
	/// the configured round limit.
	pub async fn sync_updates(&self, cookie: Cookie, category_id: &str, params: &TargetParams, cancel: &CancellationToken) -> crate::Result<SyncResult> {
		let url = self.options.fe3_url();
		let max_rounds = self.options.max_sync_rounds();
		let mut state = SyncState::new(cookie);

		loop {
			if state.rounds >= max_rounds {
				return Err(crate::Error::ProtocolLoopExceeded(max_rounds));
			}
			let body = soap::sync_updates(&state.cookie, category_id, params, &state.seen);
			let response = cancellable(cancel, self.transport.post_soap(url, body)).await?;
			let round = soap::read_body(response, url, SyncRound::from_xml)?;
			let revealed = state.advance(round);
			log::debug!("Sync round {} revealed {} update(s)", state.rounds, revealed);
			if revealed == 0 {
				break;
			}
		}

		let mut updates = Vec::new();
		for fragments in &state.fragments {
			updates.extend(fragments.candidates()?);
		}
		log::info!("Sync of {} finished after {} round(s) with {} candidate file(s)", category_id, state.rounds, updates.len());
		Ok(SyncResult { updates, cookie: state.cookie })
	}

	/// Looks up the download URL of the file with `digest` in an update revision.
	pub async fn resolve_file_url(&self, update_id: &str, revision_number: &str, digest: &str, params: &TargetParams, cancel: &CancellationToken) -> crate::Result<String> {
		let url = self.options.fe3_secured_url();
		log::trace!("Resolving file location of {} revision {}", update_id, revision_number);
		let body = soap::get_extended_update_info2(update_id, revision_number, params);
		let response = cancellable(cancel, self.transport.post_soap(url, body)).await?;
		soap::read_body(response, url, |body| {
			let result = wu_child(wu_child(body, "GetExtendedUpdateInfo2Response")?, "GetExtendedUpdateInfo2Result")?;
			for location in children(wu_child(result, "FileLocations")?, Some(WU_NS), "FileLocation") {
				if text(wu_child(location, "FileDigest")?) == digest {
					return Ok(text(wu_child(location, "Url")?));
				}
			}
			Err(crate::Error::NoMatchingLocation)
		})
	}
}
