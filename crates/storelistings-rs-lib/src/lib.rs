pub mod error;
pub use error::Result;
pub use error::Error;

pub mod version;
pub use version::PackedVersion;

pub mod device_family;
pub use device_family::DeviceFamily;
pub use device_family::Locale;

pub mod config;
pub use config::StoreListingsOptions;

pub mod transport;
mod json;

pub mod catalog;
pub mod product;
pub mod sync;
pub use sync::TargetParams;
pub mod resolver;

pub mod downloads;
pub use downloads::resolve_downloads;
