/// Endpoints and limits shared by every client in the crate.
#[derive(Debug, Clone)]
pub struct StoreListingsOptions {
	catalog_url: String,
	storeedge_url: String,
	fe3_url: String,
	fe3_secured_url: String,
	max_sync_rounds: usize,
	include_neutral_languages: bool,
	accept_invalid_certs: bool,
	request_timeout: std::time::Duration,
}

impl Default for StoreListingsOptions {
	fn default() -> Self {
		Self {
			catalog_url: "https://displaycatalog.mp.microsoft.com/v7.0/products/".to_string(),
			storeedge_url: "https://storeedgefd.dsx.mp.microsoft.com/v9.0/".to_string(),
			fe3_url: "https://fe3cr.delivery.mp.microsoft.com/ClientWebService/client.asmx".to_string(),
			fe3_secured_url: "https://fe3cr.delivery.mp.microsoft.com/ClientWebService/client.asmx/secured".to_string(),
			max_sync_rounds: 200,
			include_neutral_languages: true,
			accept_invalid_certs: false,
			request_timeout: std::time::Duration::from_secs(30),
		}
	}
}

impl StoreListingsOptions {
	/// Base URL for catalog product lookups, the product id is appended.
	pub fn catalog_url(&self) -> &str {
		&self.catalog_url
	}
	pub fn set_catalog_url(&mut self, catalog_url: impl Into<String>) {
		self.catalog_url = catalog_url.into();
	}

	/// Base URL for the store-edge API, `products/` and `packageManifests/` hang off it.
	pub fn storeedge_url(&self) -> &str {
		&self.storeedge_url
	}
	pub fn set_storeedge_url(&mut self, storeedge_url: impl Into<String>) {
		self.storeedge_url = storeedge_url.into();
	}

	/// Update service endpoint for cookies and syncs.
	pub fn fe3_url(&self) -> &str {
		&self.fe3_url
	}
	pub fn set_fe3_url(&mut self, fe3_url: impl Into<String>) {
		self.fe3_url = fe3_url.into();
	}

	/// Update service endpoint for file locations.
	pub fn fe3_secured_url(&self) -> &str {
		&self.fe3_secured_url
	}
	pub fn set_fe3_secured_url(&mut self, fe3_secured_url: impl Into<String>) {
		self.fe3_secured_url = fe3_secured_url.into();
	}

	/// Upper bound on sync rounds before giving up with [`crate::Error::ProtocolLoopExceeded`].
	pub fn max_sync_rounds(&self) -> usize {
		self.max_sync_rounds
	}
	/// returns if the value is valid or not.
	pub fn set_max_sync_rounds(&mut self, max_sync_rounds: usize) -> bool {
		if max_sync_rounds > 0 {
			self.max_sync_rounds = max_sync_rounds;
			true
		} else {
			false
		}
	}

	pub fn include_neutral_languages(&self) -> bool {
		self.include_neutral_languages
	}
	pub fn set_include_neutral_languages(&mut self, include_neutral_languages: bool) {
		self.include_neutral_languages = include_neutral_languages;
	}

	pub fn accept_invalid_certs(&self) -> bool {
		self.accept_invalid_certs
	}
	pub fn set_accept_invalid_certs(&mut self, accept_invalid_certs: bool) {
		self.accept_invalid_certs = accept_invalid_certs;
	}

	pub fn request_timeout(&self) -> std::time::Duration {
		self.request_timeout
	}
	pub fn set_request_timeout(&mut self, request_timeout: std::time::Duration) {
		self.request_timeout = request_timeout;
	}

	/// Points every endpoint at `base`, used to aim the clients at a local server.
	pub fn with_base_url(mut self, base: &str) -> Self {
		let base = base.trim_end_matches('/');
		self.catalog_url = format!("{}/v7.0/products/", base);
		self.storeedge_url = format!("{}/v9.0/", base);
		self.fe3_url = format!("{}/ClientWebService/client.asmx", base);
		self.fe3_secured_url = format!("{}/ClientWebService/client.asmx/secured", base);
		self
	}
}
