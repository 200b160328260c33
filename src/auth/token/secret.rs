//! Token secret wrapper that keeps key material out of logs.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use sha2::{Digest, Sha256};
// self
use crate::_prelude::*;

/// Separator placed between the operator prefix and the random body of a secret.
pub const SECRET_PREFIX_SEPARATOR: char = '_';

/// Redacted token secret; the only place the presented key string lives.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a presented or store-issued secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Mints `<prefix>_<base64url(random bytes)>` from `byte_length` bytes of OS-seeded randomness.
	pub fn generate(prefix: &str, byte_length: usize) -> Self {
		let mut bytes = vec![0_u8; byte_length];

		rand::rng().fill_bytes(&mut bytes);

		Self(format!("{prefix}{SECRET_PREFIX_SEPARATOR}{}", URL_SAFE_NO_PAD.encode(&bytes)))
	}

	/// Returns the inner key string. Callers must avoid logging this value.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Base64 (no padding) SHA-256 digest used by stores that never retain the raw secret.
	pub fn digest(&self) -> String {
		let mut hasher = Sha256::new();

		hasher.update(self.0.as_bytes());

		URL_SAFE_NO_PAD.encode(hasher.finalize())
	}
}
impl AsRef<str> for TokenSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&"<redacted>").finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}
