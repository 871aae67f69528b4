//! HTTP plumbing shared by the catalog, product and update clients.
//!
//! Everything above this module talks to a [`Transport`] so tests can swap in a scripted one.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONNECTION, CONTENT_TYPE, USER_AGENT};

pub mod correlation_vector;
pub use correlation_vector::CorrelationVector;

const STORE_USER_AGENT: &str = "WindowsStore/22106.1401.2.0";
const UPDATE_USER_AGENT: &str = "Windows-Update-Agent/10.0.10011.16384 Client-Protocol/2.1";
const SOAP_CONTENT_TYPE: &str = "application/soap+xml; charset=utf-8";

/// Status and body of a finished request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
	pub status: u16,
	pub body: String,
}

impl TransportResponse {
	pub fn new(status: u16, body: impl Into<String>) -> Self {
		Self { status, body: body.into() }
	}

	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// `Err(Transport)` unless the status is 2xx.
	pub fn error_for_status(self, url: &str) -> crate::Result<Self> {
		if self.is_success() {
			Ok(self)
		} else {
			Err(crate::Error::Transport { status: self.status, url: url.to_string() })
		}
	}
}

#[async_trait::async_trait]
pub trait Transport: Send + Sync {
	/// GET a store JSON document.
	async fn get(&self, url: &str) -> crate::Result<TransportResponse>;
	/// POST a SOAP 1.2 envelope to the update service.
	async fn post_soap(&self, url: &str, body: String) -> crate::Result<TransportResponse>;
}

/// [`Transport`] backed by reqwest.
///
/// Store requests carry the headers the Store app sends, including a fresh `MS-CV` value
/// from the owned [`CorrelationVector`] on every request.
#[derive(Debug)]
pub struct ReqwestTransport {
	store: reqwest::Client,
	update: reqwest::Client,
	correlation_vector: CorrelationVector,
}

impl ReqwestTransport {
	pub fn new(options: &crate::StoreListingsOptions, correlation_vector: CorrelationVector) -> crate::Result<Self> {
		let mut store_headers = HeaderMap::new();
		store_headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
		store_headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US"));
		store_headers.insert(USER_AGENT, HeaderValue::from_static(STORE_USER_AGENT));
		store_headers.insert("osisgenuine", HeaderValue::from_static("True"));
		store_headers.insert("osissmode", HeaderValue::from_static("False"));

		let mut update_headers = HeaderMap::new();
		update_headers.insert(USER_AGENT, HeaderValue::from_static(UPDATE_USER_AGENT));
		update_headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));

		let store = reqwest::Client::builder()
			.default_headers(store_headers)
			.danger_accept_invalid_certs(options.accept_invalid_certs())
			.timeout(options.request_timeout())
			.build()?;
		let update = reqwest::Client::builder()
			.default_headers(update_headers)
			.danger_accept_invalid_certs(options.accept_invalid_certs())
			.timeout(options.request_timeout())
			.build()?;

		Ok(Self { store, update, correlation_vector })
	}

	pub fn correlation_vector(&self) -> &CorrelationVector {
		&self.correlation_vector
	}
}

#[async_trait::async_trait]
impl Transport for ReqwestTransport {
	async fn get(&self, url: &str) -> crate::Result<TransportResponse> {
		let cv = self.correlation_vector.increment();
		log::trace!("GET {} (MS-CV {})", url, cv);
		let response = self.store
			.get(url)
			.header("MS-CV", cv)
			.send()
			.await?;
		let status = response.status().as_u16();
		let body = response.text().await?;
		Ok(TransportResponse { status, body })
	}

	async fn post_soap(&self, url: &str, body: String) -> crate::Result<TransportResponse> {
		log::trace!("POST {} ({} bytes)", url, body.len());
		let response = self.update
			.post(url)
			.header(CONTENT_TYPE, SOAP_CONTENT_TYPE)
			.body(body)
			.send()
			.await?;
		let status = response.status().as_u16();
		let body = response.text().await?;
		Ok(TransportResponse { status, body })
	}
}
