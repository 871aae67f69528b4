//! Correlation vector header values (`MS-CV`).
//!
//! A vector is a 16 character random base followed by dot separated counters, e.g.
//! `a8Kd0sL2pQx7Zb4E.3`. Each outgoing catalog request takes the next value.

use std::sync::Mutex;

use rand::Rng;

const BASE64_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
const BASE_LENGTH: usize = 16;
const MAX_LENGTH: usize = 63;

#[derive(Debug)]
struct VectorState {
	base: String,
	current: u32,
}

#[derive(Debug)]
pub struct CorrelationVector {
	state: Mutex<VectorState>,
}

fn digits(n: u32) -> usize {
	n.to_string().len()
}

impl CorrelationVector {
	/// Seeds a fresh vector with a random base.
	pub fn new() -> Self {
		let mut rng = rand::thread_rng();
		let base = (0..BASE_LENGTH)
			.map(|_| BASE64_CHARSET[rng.gen_range(0..BASE64_CHARSET.len())] as char)
			.collect::<String>();
		Self::from_parts(base, 1)
	}

	fn from_parts(base: String, current: u32) -> Self {
		Self { state: Mutex::new(VectorState { base, current }) }
	}

	/// Resumes an existing vector such as one received from a caller.
	pub fn parse(value: &str) -> crate::Result<Self> {
		let invalid = || crate::Error::Parse(format!("invalid correlation vector `{}`", value));
		if value.len() > MAX_LENGTH || value.len() <= BASE_LENGTH {
			return Err(invalid());
		}
		let (base, rest) = value.split_at(BASE_LENGTH);
		if !base.bytes().all(|b| BASE64_CHARSET.contains(&b)) {
			return Err(invalid());
		}
		let rest = rest.strip_prefix('.').ok_or_else(invalid)?;
		if rest.split('.').any(|s| s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit())) {
			return Err(invalid());
		}
		let (prefix, last) = match rest.rsplit_once('.') {
			Some((prefix, last)) => (format!("{}.{}", base, prefix), last),
			None => (base.to_string(), rest),
		};
		let current = last.parse::<u32>().map_err(|_| invalid())?;
		Ok(Self::from_parts(prefix, current))
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, VectorState> {
		self.state.lock().unwrap_or_else(|e| e.into_inner())
	}

	pub fn value(&self) -> String {
		let state = self.lock();
		format!("{}.{}", state.base, state.current)
	}

	/// Advances the last counter and returns the new value.
	///
	/// Once the vector would exceed its maximum length the value stops changing.
	pub fn increment(&self) -> String {
		let mut state = self.lock();
		if let Some(next) = state.current.checked_add(1) {
			if state.base.len() + 1 + digits(next) <= MAX_LENGTH {
				state.current = next;
			}
		}
		format!("{}.{}", state.base, state.current)
	}

	/// Appends a new `.1` counter, returning the extended value.
	pub fn extend(&self) -> String {
		let mut state = self.lock();
		if state.base.len() + 1 + digits(state.current) + 2 <= MAX_LENGTH {
			state.base = format!("{}.{}", state.base, state.current);
			state.current = 1;
		}
		format!("{}.{}", state.base, state.current)
	}
}

impl Default for CorrelationVector {
	fn default() -> Self {
		Self::new()
	}
}
