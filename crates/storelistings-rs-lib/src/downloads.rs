//! End to end resolution of a product into download URLs.

use tokio_util::sync::CancellationToken;

use crate::catalog;
use crate::resolver::{self, ResolutionReport};
use crate::sync::{cancellable, SyncClient, TargetParams};
use crate::transport::Transport;
use crate::StoreListingsOptions;

/// Resolves every installable version of `product_id` for the device in `params`.
///
/// Returns an empty report without contacting the update service when no catalog package
/// supports the requested OS version.
pub async fn resolve_downloads(transport: &dyn Transport, options: &StoreListingsOptions, product_id: &str, params: &TargetParams, cancel: &CancellationToken) -> crate::Result<ResolutionReport> {
	let packages = cancellable(cancel, catalog::fetch_packages(transport, options, product_id, &params.locale)).await?;

	if !packages.iter().any(|p| p.supports_os(params.os_version)) {
		log::info!("No catalog package of {} supports OS {}", product_id, params.os_version);
		return Ok(ResolutionReport::default());
	}

	let category_id = packages.iter()
		.find_map(|p| p.wu_category_id.as_deref())
		.ok_or_else(|| crate::Error::Parse(format!("catalog lists no update category for {}", product_id)))?;

	let client = SyncClient::new(transport, options);
	let cookie = client.acquire_cookie(cancel).await?;
	log::info!("Acquired update service cookie, expires {}", cookie.expiration);

	let sync = client.sync_updates(cookie, category_id, params, cancel).await?;
	resolver::resolve(&packages, &sync.updates, &client, params, cancel).await
}
