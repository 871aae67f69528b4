use storelistings_rs::sync::SyncClient;
use storelistings_rs::transport::TransportResponse;
use storelistings_rs::{Error, StoreListingsOptions, TargetParams};
use storelistings_rs_test_utils::*;
use tokio_util::sync::CancellationToken;

fn locations_server() -> ScriptedTransport {
	ScriptedTransport::new(|_| TransportResponse::new(200, file_locations_response(&[
		("XYZ", "https://tlu.dl.delivery.mp.microsoft.com/filestreamingservice/files/xyz"),
		("DEF", "https://tlu.dl.delivery.mp.microsoft.com/filestreamingservice/files/def?P1=1&P2=2"),
	])))
}

#[tokio::test]
async fn unknown_digest_has_no_location() {
	let transport = locations_server();
	let options = StoreListingsOptions::default();
	let r = SyncClient::new(&transport, &options)
		.resolve_file_url("update", "1", "ABC", &TargetParams::default(), &CancellationToken::new())
		.await;
	assert!(matches!(r, Err(Error::NoMatchingLocation)));
}

#[tokio::test]
async fn matching_digest_picks_its_url() {
	let transport = locations_server();
	let options = StoreListingsOptions::default();
	let url = SyncClient::new(&transport, &options)
		.resolve_file_url("update", "1", "DEF", &TargetParams::default(), &CancellationToken::new())
		.await
		.unwrap();
	assert_eq!(url, "https://tlu.dl.delivery.mp.microsoft.com/filestreamingservice/files/def?P1=1&P2=2");

	let request = &transport.requests()[0];
	assert_eq!(request.url, options.fe3_secured_url());
	assert_eq!(request.soap_action(), Some(SoapAction::GetExtendedUpdateInfo2));
	assert_eq!(requested_update_id(request.body.as_deref().unwrap()), Some("update"));
}

#[tokio::test]
async fn cancelled_lookup_sends_nothing() {
	let transport = locations_server();
	let options = StoreListingsOptions::default();
	let cancel = CancellationToken::new();
	cancel.cancel();
	let r = SyncClient::new(&transport, &options)
		.resolve_file_url("update", "1", "DEF", &TargetParams::default(), &cancel)
		.await;
	assert!(matches!(r, Err(Error::Cancelled)));
	assert!(transport.requests().is_empty());
}
