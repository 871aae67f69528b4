use std::sync::atomic::{AtomicUsize, Ordering};

use storelistings_rs::sync::{Cookie, SyncClient};
use storelistings_rs::transport::TransportResponse;
use storelistings_rs::{DeviceFamily, Error, StoreListingsOptions, TargetParams};
use storelistings_rs_test_utils::*;
use tokio_util::sync::CancellationToken;

fn cookie(data: &str) -> Cookie {
	Cookie { data: data.to_string(), expiration: "2099-01-01T00:00:00Z".to_string() }
}

/// Reveals two updates, then one, then nothing, rotating the cookie each round.
fn three_round_server() -> ScriptedTransport {
	ScriptedTransport::new(|request| {
		let body = match request.cookie() {
			Some("cookie-0") => sync_response("cookie-1", &[
				UpdateSpec::new("101", "Contoso.App", "1.0.0.0"),
				UpdateSpec::new("102", "Contoso.App", "1.1.0.0"),
			]),
			Some("cookie-1") => sync_response("cookie-2", &[UpdateSpec::new("103", "Runtime.X", "1.0.0.0").framework()]),
			Some("cookie-2") => sync_response("cookie-3", &[]),
			_ => soap_fault("InvalidCookie"),
		};
		TransportResponse::new(200, body)
	})
}

#[tokio::test]
async fn sync_stops_when_nothing_new_is_revealed() {
	let transport = three_round_server();
	let options = StoreListingsOptions::default();
	let client = SyncClient::new(&transport, &options);

	let result = client.sync_updates(cookie("cookie-0"), "cat-1", &TargetParams::default(), &CancellationToken::new()).await.unwrap();

	assert_eq!(result.updates.len(), 3);
	assert_eq!(result.cookie.data, "cookie-3");
	let frameworks: Vec<&str> = result.updates.iter().filter(|u| u.is_framework).map(|u| u.package_identity.as_str()).collect();
	assert_eq!(frameworks, vec!["Runtime.X"]);

	let requests = transport.requests_for(SoapAction::SyncUpdates);
	assert_eq!(requests.len(), 3);
	let cookies: Vec<&str> = requests.iter().map(|r| r.cookie().unwrap()).collect();
	assert_eq!(cookies, vec!["cookie-0", "cookie-1", "cookie-2"]);
	assert!(requests.iter().all(|r| r.url == options.fe3_url()));
}

#[tokio::test]
async fn seen_ids_are_reported_back() {
	let transport = three_round_server();
	let options = StoreListingsOptions::default();
	SyncClient::new(&transport, &options)
		.sync_updates(cookie("cookie-0"), "cat-1", &TargetParams::default(), &CancellationToken::new())
		.await
		.unwrap();

	let bodies: Vec<String> = transport.requests_for(SoapAction::SyncUpdates).into_iter().map(|r| r.body.unwrap()).collect();
	assert!(!bodies[0].contains("<int>101</int>"));
	assert!(bodies[1].contains("<int>101</int>") && bodies[1].contains("<int>102</int>"));
	assert!(!bodies[1].contains("<int>103</int>"));
	assert!(bodies[2].contains("<int>103</int>"));
	assert!(bodies.iter().all(|b| b.contains("<Id>cat-1</Id>")));
}

#[tokio::test]
async fn sync_reports_the_requested_device_family() {
	let transport = three_round_server();
	let options = StoreListingsOptions::default();
	let params = TargetParams { device_family: DeviceFamily::Xbox, ..TargetParams::default() };
	SyncClient::new(&transport, &options)
		.sync_updates(cookie("cookie-0"), "cat-1", &params, &CancellationToken::new())
		.await
		.unwrap();

	let requests = transport.requests_for(SoapAction::SyncUpdates);
	assert!(requests.iter().all(|r| r.body.as_deref().unwrap().contains("DeviceFamily=Windows.Xbox;")));
}

#[tokio::test]
async fn repeated_ids_do_not_keep_the_sync_going() {
	let transport = ScriptedTransport::new(|_| TransportResponse::new(200, sync_response("cookie", &[UpdateSpec::new("101", "Contoso.App", "1.0.0.0")])));
	let options = StoreListingsOptions::default();
	let result = SyncClient::new(&transport, &options)
		.sync_updates(cookie("cookie"), "cat-1", &TargetParams::default(), &CancellationToken::new())
		.await
		.unwrap();

	assert_eq!(transport.requests().len(), 2);
	assert_eq!(result.updates.len(), 1);
}

#[tokio::test]
async fn endless_sync_hits_the_round_limit() {
	let round = AtomicUsize::new(0);
	let transport = ScriptedTransport::new(move |_| {
		let n = round.fetch_add(1, Ordering::SeqCst);
		TransportResponse::new(200, sync_response(&format!("cookie-{}", n + 1), &[UpdateSpec::new(&n.to_string(), "Contoso.App", "1.0.0.0")]))
	});
	let mut options = StoreListingsOptions::default();
	assert!(options.set_max_sync_rounds(5));

	let r = SyncClient::new(&transport, &options)
		.sync_updates(cookie("cookie-0"), "cat-1", &TargetParams::default(), &CancellationToken::new())
		.await;

	assert!(matches!(r, Err(Error::ProtocolLoopExceeded(5))));
	assert_eq!(transport.requests().len(), 5);
}

#[tokio::test]
async fn cancellation_stops_at_the_next_round() {
	let cancel = CancellationToken::new();
	let server_cancel = cancel.clone();
	let transport = ScriptedTransport::new(move |request| {
		if request.cookie() == Some("cookie-1") {
			server_cancel.cancel();
		}
		let next = match request.cookie() {
			Some("cookie-0") => "cookie-1",
			_ => "cookie-2",
		};
		TransportResponse::new(200, sync_response(next, &[UpdateSpec::new(next, "Contoso.App", "1.0.0.0")]))
	});
	let options = StoreListingsOptions::default();

	let r = SyncClient::new(&transport, &options)
		.sync_updates(cookie("cookie-0"), "cat-1", &TargetParams::default(), &cancel)
		.await;

	assert!(r.unwrap_err().is_cancelled());
	assert_eq!(transport.requests().len(), 2);
}

#[tokio::test]
async fn soap_fault_is_a_protocol_error() {
	let transport = three_round_server();
	let options = StoreListingsOptions::default();
	let r = SyncClient::new(&transport, &options)
		.sync_updates(cookie("stale"), "cat-1", &TargetParams::default(), &CancellationToken::new())
		.await;
	assert!(matches!(r, Err(Error::Protocol(m)) if m == "InvalidCookie"));
}

#[tokio::test]
async fn missing_cookie_is_a_parse_error() {
	let transport = ScriptedTransport::new(|_| {
		let body = sync_response("cookie-1", &[]).replace("NewCookie", "OldCookie");
		TransportResponse::new(200, body)
	});
	let options = StoreListingsOptions::default();
	let r = SyncClient::new(&transport, &options)
		.sync_updates(cookie("cookie-0"), "cat-1", &TargetParams::default(), &CancellationToken::new())
		.await;
	assert!(matches!(r, Err(Error::Parse(_))));
}

#[tokio::test]
async fn cookie_is_read_from_get_cookie_reply() {
	let transport = ScriptedTransport::new(|_| TransportResponse::new(200, cookie_response("fresh")));
	let options = StoreListingsOptions::default();
	let c = SyncClient::new(&transport, &options).acquire_cookie(&CancellationToken::new()).await.unwrap();
	assert_eq!(c, cookie("fresh"));
	assert_eq!(transport.requests()[0].soap_action(), Some(SoapAction::GetCookie));
}

#[tokio::test]
async fn server_error_status_is_a_transport_error() {
	let transport = ScriptedTransport::new(|_| TransportResponse::new(503, "Service Unavailable"));
	let options = StoreListingsOptions::default();
	let r = SyncClient::new(&transport, &options).acquire_cookie(&CancellationToken::new()).await;
	assert!(matches!(r, Err(Error::Transport { status: 503, .. })));
}
