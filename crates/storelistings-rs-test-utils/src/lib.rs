//! Various helpers for testing
//!
//! A scripted [`Transport`] standing in for the store and update services, and builders for
//! the documents those services return.

use std::sync::Mutex;

use storelistings_rs::transport::{Transport, TransportResponse};
use storelistings_rs::PackedVersion;

const SOAP_NS: &str = "http://www.w3.org/2003/05/soap-envelope";
const WU_NS: &str = "http://www.microsoft.com/SoftwareDistribution/Server/ClientWebService";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
	Get,
	PostSoap,
}

/// A request seen by [`ScriptedTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
	pub method: Method,
	pub url: String,
	pub body: Option<String>,
}

impl Request {
	/// Which update service operation a SOAP body invokes.
	pub fn soap_action(&self) -> Option<SoapAction> {
		let body = self.body.as_deref()?;
		[SoapAction::GetCookie, SoapAction::SyncUpdates, SoapAction::GetExtendedUpdateInfo2]
			.into_iter()
			.find(|a| body.contains(&format!("ClientWebService/{}</", a.name())))
	}

	/// The cookie data a SOAP body carries.
	pub fn cookie(&self) -> Option<&str> {
		let body = self.body.as_deref()?;
		let start = body.find("<EncryptedData>")? + "<EncryptedData>".len();
		let end = body[start..].find("</EncryptedData>")?;
		Some(&body[start..start + end])
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoapAction {
	GetCookie,
	SyncUpdates,
	GetExtendedUpdateInfo2,
}

impl SoapAction {
	fn name(&self) -> &'static str {
		match self {
			SoapAction::GetCookie => "GetCookie",
			SoapAction::SyncUpdates => "SyncUpdates",
			SoapAction::GetExtendedUpdateInfo2 => "GetExtendedUpdateInfo2",
		}
	}
}

type Handler = Box<dyn Fn(&Request) -> TransportResponse + Send + Sync>;

/// In-memory [`Transport`] answering every request through a closure and recording it.
pub struct ScriptedTransport {
	handler: Handler,
	requests: Mutex<Vec<Request>>,
}

impl ScriptedTransport {
	pub fn new(handler: impl Fn(&Request) -> TransportResponse + Send + Sync + 'static) -> Self {
		Self { handler: Box::new(handler), requests: Mutex::new(Vec::new()) }
	}

	/// Every request so far, in the order they were made.
	pub fn requests(&self) -> Vec<Request> {
		self.requests.lock().map(|r| r.clone()).unwrap_or_default()
	}

	pub fn requests_for(&self, action: SoapAction) -> Vec<Request> {
		self.requests().into_iter().filter(|r| r.soap_action() == Some(action)).collect()
	}

	fn answer(&self, request: Request) -> TransportResponse {
		let response = (self.handler)(&request);
		if let Ok(mut requests) = self.requests.lock() {
			requests.push(request);
		}
		response
	}
}

#[async_trait::async_trait]
impl Transport for ScriptedTransport {
	async fn get(&self, url: &str) -> storelistings_rs::Result<TransportResponse> {
		Ok(self.answer(Request { method: Method::Get, url: url.to_string(), body: None }))
	}

	async fn post_soap(&self, url: &str, body: String) -> storelistings_rs::Result<TransportResponse> {
		Ok(self.answer(Request { method: Method::PostSoap, url: url.to_string(), body: Some(body) }))
	}
}

/* Catalog documents */

/// One entry of a catalog product's package list.
pub fn catalog_package(version: &str, platforms: &[(&str, &str)], frameworks: &[(&str, &str)], category: Option<&str>) -> serde_json::Value {
	let packed = |v: &str| PackedVersion::parse(v).map(|v| v.pack()).unwrap_or_default();
	let mut package = serde_json::json!({
		"Version": packed(version).to_string(),
		"PackageRank": 30001,
		"PlatformDependencies": platforms.iter()
			.map(|(name, min)| serde_json::json!({ "PlatformName": name, "MinVersion": packed(min) }))
			.collect::<Vec<_>>(),
		"FrameworkDependencies": frameworks.iter()
			.map(|(identity, min)| serde_json::json!({ "PackageIdentity": identity, "MinVersion": packed(min) }))
			.collect::<Vec<_>>(),
	});
	if let Some(category) = category {
		package["FulfillmentData"] = serde_json::json!({ "WuCategoryId": category });
	}
	package
}

/// A catalog product document listing `packages`.
pub fn catalog_product(package_identity: &str, packages: Vec<serde_json::Value>) -> String {
	serde_json::json!({
		"Product": {
			"Properties": { "PackageIdentityName": package_identity },
			"DisplaySkuAvailabilities": [ { "Sku": { "Properties": { "Packages": packages } } } ]
		}
	}).to_string()
}

/* Update service documents */

fn escape(s: &str) -> String {
	s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;")
}

fn envelope(body: &str) -> String {
	format!(r#"<s:Envelope xmlns:s="{}" xmlns:a="http://www.w3.org/2005/08/addressing"><s:Body>{}</s:Body></s:Envelope>"#, SOAP_NS, body)
}

fn cookie_xml(data: &str) -> String {
	format!("<Expiration>2099-01-01T00:00:00Z</Expiration><EncryptedData>{}</EncryptedData>", data)
}

pub fn cookie_response(data: &str) -> String {
	envelope(&format!(r#"<GetCookieResponse xmlns="{}"><GetCookieResult>{}</GetCookieResult></GetCookieResponse>"#, WU_NS, cookie_xml(data)))
}

pub fn soap_fault(reason: &str) -> String {
	envelope(&format!(r#"<s:Fault><s:Code><s:Value>s:Receiver</s:Value></s:Code><s:Reason><s:Text xml:lang="en-US">{}</s:Text></s:Reason></s:Fault>"#, escape(reason)))
}

/// A file of an [`UpdateSpec`].
#[derive(Debug, Clone)]
pub struct FileSpec {
	pub file_name: String,
	pub identifier: String,
	pub digest: String,
}

/// Describes an update the fake service reveals during a sync.
#[derive(Debug, Clone)]
pub struct UpdateSpec {
	/// Id the sync reports, distinct from the update id.
	pub id: String,
	pub update_id: String,
	pub revision_number: String,
	pub package_identity: String,
	pub is_framework: bool,
	pub files: Vec<FileSpec>,
	/// Update service platform codes and minimum OS versions.
	pub platforms: Vec<(i64, String)>,
}

impl UpdateSpec {
	/// An x64 `.appx` for Desktop (code 3) from 10.0.10240.0, plus its blockmap `.cab`.
	pub fn new(id: &str, package_identity: &str, version: &str) -> Self {
		let identifier = format!("{}_{}_x64__8wekyb3d8bbwe", package_identity, version);
		Self {
			id: id.to_string(),
			update_id: format!("{}-{}", package_identity, version).to_lowercase(),
			revision_number: "1".to_string(),
			package_identity: package_identity.to_string(),
			is_framework: false,
			files: vec![
				FileSpec { file_name: format!("{}.appx", package_identity), identifier: identifier.clone(), digest: format!("{}=", identifier) },
				FileSpec { file_name: "blockmap.cab".to_string(), identifier, digest: "cab=".to_string() },
			],
			platforms: vec![(3, "10.0.10240.0".to_string())],
		}
	}

	pub fn framework(mut self) -> Self {
		self.is_framework = true;
		self
	}

	pub fn platforms(mut self, platforms: &[(i64, &str)]) -> Self {
		self.platforms = platforms.iter().map(|(code, min)| (*code, min.to_string())).collect();
		self
	}

	/// Digest of the first non-cab file.
	pub fn digest(&self) -> &str {
		&self.files[0].digest
	}

	pub fn extended_xml(&self) -> String {
		let files: String = self.files.iter()
			.map(|f| format!(
				r#"<File FileName="{}" Digest="{}" DigestAlgorithm="SHA1" Size="4096" Modified="2024-01-01T00:00:00Z" InstallerSpecificIdentifier="{}" />"#,
				f.file_name, f.digest, f.identifier
			))
			.collect();
		format!(
			r#"<ExtendedProperties DefaultPropertiesLanguage="en" Handler="http://schemas.microsoft.com/msus/2002/12/UpdateHandlers/WindowsAppx" CreationDate="2024-01-01T00:00:00Z" IsAppxFramework="{}" PackageIdentityName="{}" /><Files>{}</Files>"#,
			self.is_framework, self.package_identity, files
		)
	}

	pub fn published_xml(&self) -> String {
		let platforms: Vec<String> = self.platforms.iter()
			.map(|(code, min)| format!(
				r#"{{"platform.maxVersionTested":2814751249597971,"platform.minVersion":{},"platform.target":{}}}"#,
				PackedVersion::parse(min).map(|v| v.pack()).unwrap_or_default(), code
			))
			.collect();
		let blob = format!(r#"{{"blob.version":1688867040526336,"content.isMain":false,"content.packageId":"{}","content.targetPlatforms":[{}]}}"#, self.package_identity, platforms.join(","));
		format!(
			r#"<UpdateIdentity UpdateID="{}" RevisionNumber="{}" /><Properties UpdateType="Software" PackageRank="30001"><SecuredFragment /></Properties><ApplicabilityRules><Metadata><AppxPackageMetadata><AppxMetadata PackageType="Main" PackageMoniker="{}"><ApplicabilityBlob>{}</ApplicabilityBlob></AppxMetadata></AppxPackageMetadata></Metadata></ApplicabilityRules>"#,
			self.update_id, self.revision_number, self.package_identity, escape(&blob)
		)
	}
}

/// A `SyncUpdates` reply revealing `updates` and rotating the cookie to `cookie`.
pub fn sync_response(cookie: &str, updates: &[UpdateSpec]) -> String {
	let revealed = if updates.is_empty() {
		String::new()
	} else {
		let new: String = updates.iter()
			.map(|u| format!("<UpdateInfo><ID>{}</ID><Deployment><Action>Install</Action></Deployment><IsLeaf>true</IsLeaf><Xml>{}</Xml></UpdateInfo>", u.id, escape(&u.published_xml())))
			.collect();
		let extended: String = updates.iter()
			.map(|u| format!("<Update><ID>{}</ID><Xml>{}</Xml></Update>", u.id, escape(&u.extended_xml())))
			.collect();
		format!("<NewUpdates>{}</NewUpdates><ExtendedUpdateInfo><Updates>{}</Updates></ExtendedUpdateInfo>", new, extended)
	};
	envelope(&format!(
		r#"<SyncUpdatesResponse xmlns="{}"><SyncUpdatesResult>{}<Truncated>false</Truncated><NewCookie>{}</NewCookie></SyncUpdatesResult></SyncUpdatesResponse>"#,
		WU_NS, revealed, cookie_xml(cookie)
	))
}

/// A `GetExtendedUpdateInfo2` reply listing `(digest, url)` locations.
pub fn file_locations_response(locations: &[(&str, &str)]) -> String {
	let locations: String = locations.iter()
		.map(|(digest, url)| format!("<FileLocation><FileDigest>{}</FileDigest><Url>{}</Url></FileLocation>", digest, escape(url)))
		.collect();
	envelope(&format!(
		r#"<GetExtendedUpdateInfo2Response xmlns="{}"><GetExtendedUpdateInfo2Result><FileLocations>{}</FileLocations></GetExtendedUpdateInfo2Result></GetExtendedUpdateInfo2Response>"#,
		WU_NS, locations
	))
}

/// The update id requested by a `GetExtendedUpdateInfo2` body.
pub fn requested_update_id(body: &str) -> Option<&str> {
	let start = body.find("<UpdateID>")? + "<UpdateID>".len();
	let end = body[start..].find("</UpdateID>")?;
	Some(&body[start..start + end])
}
