//! Process-wide settings threaded into the issuer and the gate at construction.

// self
use crate::{
	_prelude::*,
	auth::{GuestId, IdentityPair, OwnerId, RateLimit, SECRET_PREFIX_SEPARATOR},
	document::DEFAULT_MEDIA_TYPE,
	error::ConfigError,
};

/// Smallest amount of random secret material a token may carry.
pub const MIN_TOKEN_BYTES: usize = 16;
/// Label used for both halves of the default identity pair.
pub const DEFAULT_IDENTITY_LABEL: &str = "anonymous";
/// Longest accepted token lifetime.
pub const MAX_TTL: Duration = Duration::days(365);
/// Longest accepted rate-limit window.
pub const MAX_RATE_WINDOW: Duration = Duration::days(1);

const DEFAULT_TTL: Duration = Duration::minutes(2);
const DEFAULT_RATE_LIMIT: RateLimit = RateLimit::new(5, Duration::milliseconds(3_000));
const DEFAULT_PREFIX: &str = "doc";

/// Fixed parameters applied to every issued token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuancePolicy {
	/// Lifetime of a token; `expires_at = issued_at + ttl`.
	pub ttl: Duration,
	/// Request ceiling per window.
	pub rate_limit: RateLimit,
	/// Operator-facing secret prefix.
	pub prefix: String,
	/// Random bytes of secret material.
	pub byte_length: usize,
}
impl IssuancePolicy {
	/// Checks every field against the supported ranges.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if !self.ttl.is_positive() {
			return Err(ConfigError::NonPositiveTtl);
		}
		if self.ttl > MAX_TTL {
			return Err(ConfigError::TtlTooLarge { max: MAX_TTL });
		}
		if !self.rate_limit.window.is_positive() {
			return Err(ConfigError::NonPositiveRateWindow);
		}
		if self.rate_limit.window > MAX_RATE_WINDOW {
			return Err(ConfigError::RateWindowTooLarge { max: MAX_RATE_WINDOW });
		}
		if self.rate_limit.max_requests == 0 {
			return Err(ConfigError::ZeroRateCeiling);
		}
		if self.byte_length < MIN_TOKEN_BYTES {
			return Err(ConfigError::TokenTooShort {
				min: MIN_TOKEN_BYTES,
				actual: self.byte_length,
			});
		}
		if self.prefix.is_empty()
			|| self.prefix.contains(SECRET_PREFIX_SEPARATOR)
			|| self.prefix.chars().any(char::is_whitespace)
		{
			return Err(ConfigError::InvalidPrefix { prefix: self.prefix.clone() });
		}

		Ok(())
	}
}
impl Default for IssuancePolicy {
	fn default() -> Self {
		Self {
			ttl: DEFAULT_TTL,
			rate_limit: DEFAULT_RATE_LIMIT,
			prefix: DEFAULT_PREFIX.into(),
			byte_length: MIN_TOKEN_BYTES,
		}
	}
}

/// Where the protected document lives and how its pages are labeled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentSettings {
	/// PDF file, or directory holding one file per page, when serving from disk.
	pub path: Option<PathBuf>,
	/// Media type reported for pages of a directory document. PDF pages are always PDFs.
	pub media_type: String,
}

/// Validated gate configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GateConfig {
	/// Token parameters.
	pub issuance: IssuancePolicy,
	/// Document location and media type.
	pub document: DocumentSettings,
	/// Identity used when a token request omits its labels.
	pub default_identity: IdentityPair,
}
impl GateConfig {
	/// Starts a builder seeded with the stock defaults.
	pub fn builder() -> GateConfigBuilder {
		GateConfigBuilder::default()
	}

	/// Fills in missing identity labels from [`GateConfig::default_identity`].
	pub fn identity_or_default(
		&self,
		owner: Option<OwnerId>,
		guest: Option<GuestId>,
	) -> IdentityPair {
		IdentityPair::new(
			owner.unwrap_or_else(|| self.default_identity.owner.clone()),
			guest.unwrap_or_else(|| self.default_identity.guest.clone()),
		)
	}
}

/// Builder for [`GateConfig`] values.
#[derive(Clone, Debug)]
pub struct GateConfigBuilder {
	/// Token parameters being assembled.
	pub issuance: IssuancePolicy,
	/// Optional document location.
	pub document_path: Option<PathBuf>,
	/// Page media type.
	pub media_type: String,
	/// Raw default owner label.
	pub default_owner: String,
	/// Raw default guest label.
	pub default_guest: String,
}
impl GateConfigBuilder {
	/// Overrides the token time-to-live.
	pub fn ttl(mut self, ttl: Duration) -> Self {
		self.issuance.ttl = ttl;

		self
	}

	/// Overrides the per-window ceiling.
	pub fn rate_limit(mut self, max_requests: u32, window: Duration) -> Self {
		self.issuance.rate_limit = RateLimit::new(max_requests, window);

		self
	}

	/// Overrides the secret prefix.
	pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
		self.issuance.prefix = prefix.into();

		self
	}

	/// Overrides the amount of random secret material.
	pub fn byte_length(mut self, byte_length: usize) -> Self {
		self.issuance.byte_length = byte_length;

		self
	}

	/// Serves pages from the PDF or page directory at `path`.
	pub fn document_path(mut self, path: impl Into<PathBuf>) -> Self {
		self.document_path = Some(path.into());

		self
	}

	/// Overrides the media type reported for pages.
	pub fn media_type(mut self, media_type: impl Into<String>) -> Self {
		self.media_type = media_type.into();

		self
	}

	/// Overrides the labels used when a token request omits them.
	pub fn default_identity(mut self, owner: impl Into<String>, guest: impl Into<String>) -> Self {
		self.default_owner = owner.into();
		self.default_guest = guest.into();

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<GateConfig, ConfigError> {
		self.issuance.validate()?;

		if self.media_type.trim().is_empty() {
			return Err(ConfigError::EmptyMediaType);
		}

		let invalid = |source| ConfigError::InvalidDefaultIdentity { source };
		let owner = OwnerId::new(&self.default_owner).map_err(invalid)?;
		let guest = GuestId::new(&self.default_guest).map_err(invalid)?;

		Ok(GateConfig {
			issuance: self.issuance,
			document: DocumentSettings { path: self.document_path, media_type: self.media_type },
			default_identity: IdentityPair::new(owner, guest),
		})
	}
}
impl Default for GateConfigBuilder {
	fn default() -> Self {
		Self {
			issuance: IssuancePolicy::default(),
			document_path: None,
			media_type: DEFAULT_MEDIA_TYPE.into(),
			default_owner: DEFAULT_IDENTITY_LABEL.into(),
			default_guest: DEFAULT_IDENTITY_LABEL.into(),
		}
	}
}
