//! Library error type.

pub type Result<T> = std::result::Result<T, Error>;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
	#[error("reqwest error: {0}")]
	Reqwest(#[from] reqwest::Error),
	#[error("IO error: {0}")]
	IO(#[from] std::io::Error),
	#[error("JSON error: {0}")]
	SerdeJSON(#[from] serde_json::Error),
	#[error("XML error: {0}")]
	Xml(#[from] roxmltree::Error),
	/// The server answered with a non-success status and no structured explanation.
	#[error("request to {url} failed with HTTP status {status}")]
	Transport { status: u16, url: String },
	/// A document was missing a required field or had an unexpected shape.
	#[error("parsing error: {0}")]
	Parse(String),
	/// The catalog reported a failure with a message of its own.
	#[error("catalog error: {0}")]
	Catalog(String),
	/// The update service reported a logical failure inside an otherwise valid response.
	#[error("protocol error: {0}")]
	Protocol(String),
	#[error("no file location matched the requested digest")]
	NoMatchingLocation,
	#[error("sync did not settle after {0} rounds")]
	ProtocolLoopExceeded(usize),
	#[error("no installer found for the specified language and market")]
	NoInstaller,
	/// The caller asked for the operation to stop. Not a failure.
	#[error("operation cancelled")]
	Cancelled,
}

impl Error {
	/// Presentation layers should stay silent for cancelled operations.
	pub fn is_cancelled(&self) -> bool {
		matches!(self, Error::Cancelled)
	}
}

impl From<crate::version::VersionParseError> for Error {
	fn from(e: crate::version::VersionParseError) -> Self {
		Error::Parse(e.to_string())
	}
}
