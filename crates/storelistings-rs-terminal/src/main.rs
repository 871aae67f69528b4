use storelistings_rs::product::{self, InstallerType};
use storelistings_rs::resolver::ResolutionReport;
use storelistings_rs::transport::{CorrelationVector, ReqwestTransport};
use storelistings_rs::{Locale, PackedVersion, StoreListingsOptions, TargetParams};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
	let mut opts;

	/* Parse console input */
	let parsed_options = {
		let args: Vec<String> = std::env::args().collect();

		opts = getopts::Options::new();
		opts.optflag( "h", "help",           "Show help");
		opts.optflag( "",  "verbose",        "Increased verbosity");
		opts.optopt(  "d", "device-family",  "Device family (default Desktop)", "FAMILY");
		opts.optopt(  "m", "market",         "Store market/region (default US)", "MARKET");
		opts.optopt(  "l", "language",       "Listing language (default en)", "LANG");
		opts.optopt(  "r", "flight-ring",    "Flight ring, i.e. Retail, External, Internal (default Retail)", "RING");
		opts.optopt(  "b", "flight-branch",  "Flighting branch name, i.e. CanaryChannel, Dev, Beta", "BRANCH");
		opts.optopt(  "c", "current-branch", "Current OS branch, i.e. rs_prerelease, ge_release (default ge_release)", "BRANCH");
		opts.optopt(  "v", "os-version",     "Current OS version (default 10.0.26100.0)", "VERSION");
		opts.parsing_style(getopts::ParsingStyle::FloatingFrees);

		let parsed_options = match opts.parse(&args[1..]) {
			Ok(m)  => { m }
			Err(e) => { println!("Unable to parse options: {}", e); return }
		};

		if parsed_options.opt_present("h") || parsed_options.free.len() < 2 {
			eprintln!("{}", opts.usage("Usage: storelistings-rs-terminal (query|download) <product-id> [options]"));
			return;
		}

		parsed_options
	};

	let default_filter = if parsed_options.opt_present("verbose") { "debug" } else { "warn" };
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

	let params = match target_params(&parsed_options) {
		Ok(p) => p,
		Err(e) => { println!("{}", e); return },
	};

	let options = StoreListingsOptions::default();
	let transport = match ReqwestTransport::new(&options, CorrelationVector::new()) {
		Ok(t) => t,
		Err(e) => { log::error!("Failed to set up HTTP clients: {}", e); return },
	};

	let cancel = CancellationToken::new();
	{
		let cancel = cancel.clone();
		tokio::spawn(async move {
			if tokio::signal::ctrl_c().await.is_ok() {
				log::debug!("Ctrl-C received, cancelling");
				cancel.cancel();
			}
		});
	}

	let product_id = &parsed_options.free[1];
	match parsed_options.free[0].as_str() {
		"query" => query(&transport, &options, product_id, &params, &cancel).await,
		"download" => download(&transport, &options, product_id, &params, &cancel).await,
		other => println!("Unknown command `{}`.", other),
	}
}

fn target_params(parsed_options: &getopts::Matches) -> Result<TargetParams, Error> {
	let mut params = TargetParams::default();
	if let Some(family) = parsed_options.opt_str("d") {
		params.device_family = family.parse().map_err(|_| Error::InvalidArgument("device family", family))?;
	}
	if let Some(version) = parsed_options.opt_str("v") {
		params.os_version = PackedVersion::parse(&version).map_err(|_| Error::InvalidArgument("OS version", version))?;
	}
	params.locale = Locale::new(
		parsed_options.opt_str("l").unwrap_or_else(|| params.locale.language.clone()),
		parsed_options.opt_str("m").unwrap_or_else(|| params.locale.market.clone()),
	);
	if let Some(ring) = parsed_options.opt_str("r") {
		params.flight_ring = ring;
	}
	if let Some(branch) = parsed_options.opt_str("b") {
		params.flighting_branch = branch;
	}
	if let Some(branch) = parsed_options.opt_str("c") {
		params.current_branch = branch;
	}
	Ok(params)
}

fn write_error(error: &storelistings_rs::Error, action: &str) {
	if error.is_cancelled() {
		return;
	}
	println!("An error occurred while {}.", action);
	println!("{}", error);
}

fn write_field(name: &str, value: impl std::fmt::Display) {
	println!("{}: {}", name, value);
}

async fn query(transport: &ReqwestTransport, options: &StoreListingsOptions, product_id: &str, params: &TargetParams, cancel: &CancellationToken) {
	let product = tokio::select! {
		_ = cancel.cancelled() => return,
		r = product::query_product(transport, options, product_id, params.device_family, &params.locale) => r,
	};
	match product {
		Ok(product) => {
			write_field("Product ID", &product.product_id);
			write_field("Title", &product.title);
			if let Some(description) = &product.description {
				write_field("Description", description);
			}
			write_field("Publisher", &product.publisher_name);
			write_field("Installer Type", format!("{:?}", product.installer_type));
		},
		Err(e) => write_error(&e, "querying the product ID"),
	}
}

async fn download(transport: &ReqwestTransport, options: &StoreListingsOptions, product_id: &str, params: &TargetParams, cancel: &CancellationToken) {
	let product = tokio::select! {
		_ = cancel.cancelled() => return,
		r = product::query_product(transport, options, product_id, params.device_family, &params.locale) => r,
	};
	let product = match product {
		Ok(p) => p,
		Err(e) => { write_error(&e, "querying the product ID"); return },
	};

	match product.installer_type {
		InstallerType::Packaged => {
			match storelistings_rs::resolve_downloads(transport, options, product_id, params, cancel).await {
				Ok(report) => write_report(&report),
				Err(e) => write_error(&e, "resolving packages"),
			}
		},
		InstallerType::Unpackaged => {
			let installer = tokio::select! {
				_ = cancel.cancelled() => return,
				r = product::unpackaged_installer(transport, options, product_id, &params.locale) => r,
			};
			match installer {
				Ok(installer) => {
					println!("Installer URL:");
					println!("{}", installer.url);
					println!();
					println!("Installer silent switches:");
					println!("{}", installer.silent_switches);
				},
				Err(e) => write_error(&e, "getting unpackaged install"),
			}
		},
		InstallerType::Unknown => println!("The product has an unsupported installer type."),
	}
}

fn write_report(report: &ResolutionReport) {
	for set in &report.installable {
		println!();
		println!("{}", set.version);
		println!("Main package ({}):", set.main.file_name);
		println!("{}", set.main.url);
		println!();

		match &set.dependencies {
			Some(dependencies) => {
				println!("Dependencies:");
				println!();
				for dependency in dependencies {
					println!("{}", dependency.file_name);
					println!("{}", dependency.url);
				}
				println!();
			},
			None => println!("Failed to get dependencies for version {}", set.version),
		}
		println!();
	}

	for version in &report.filtered {
		println!("Version {} does not target your OS options.", version);
	}
	for unresolved in &report.unresolved {
		println!("Version {} skipped, no applicable package of {} was found.", unresolved.version, unresolved.dependency);
	}

	if report.is_no_applicable_packages() {
		println!("No applicable packages were found for your OS options.");
	}
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid {0}: {1}")]
	InvalidArgument(&'static str, String),
}
