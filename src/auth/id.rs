//! Owner and guest labels chosen by clients, and token ids chosen by the store.
//!
//! Labels only need to be safe to file a token under: non-empty, free of whitespace, and at most
//! [`LABEL_MAX_CHARS`] characters of any script. Token ids are echoed back to the store on
//! rotation, so they are held to the store's own alphabet: printable ASCII, no spaces, at most
//! [`TOKEN_ID_MAX_LEN`] bytes.

// self
use crate::_prelude::*;

/// Longest owner or guest label, in characters.
pub const LABEL_MAX_CHARS: usize = 128;
/// Longest token id, in bytes.
pub const TOKEN_ID_MAX_LEN: usize = 64;

/// Which identifier failed validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdKind {
	/// [`OwnerId`].
	Owner,
	/// [`GuestId`].
	Guest,
	/// [`TokenId`].
	Token,
}
impl Display for IdKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(match self {
			Self::Owner => "Owner",
			Self::Guest => "Guest",
			Self::Token => "Token",
		})
	}
}

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum IdentifierError {
	/// Nothing was supplied.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Identifier that was empty.
		kind: IdKind,
	},
	/// A label contains whitespace.
	#[error("{kind} identifier contains whitespace.")]
	ContainsWhitespace {
		/// Identifier that was rejected.
		kind: IdKind,
	},
	/// The identifier is longer than its limit.
	#[error("{kind} identifier exceeds {max} characters.")]
	TooLong {
		/// Identifier that was rejected.
		kind: IdKind,
		/// Limit for that identifier.
		max: usize,
	},
	/// A token id contains something other than printable ASCII.
	#[error("Token identifier contains {found:?}; only printable ASCII is allowed.")]
	NotPrintableAscii {
		/// First offending character.
		found: char,
	},
}

macro_rules! label_id {
	($name:ident, $kind:expr, $doc:literal) => {
		#[doc = $doc]
		#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(String);
		impl $name {
			/// Validates `value` as a label.
			pub fn new(value: impl Into<String>) -> Result<Self, IdentifierError> {
				let value = value.into();

				check_label($kind, &value)?;

				Ok(Self(value))
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
		impl TryFrom<String> for $name {
			type Error = IdentifierError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				Self::new(value)
			}
		}
		impl From<$name> for String {
			fn from(value: $name) -> Self {
				value.0
			}
		}
	};
}

label_id! { OwnerId, IdKind::Owner, "Label of the party a token is filed under." }
label_id! { GuestId, IdKind::Guest, "Label of the guest a token was issued to." }

/// Store-generated token identifier, handed to clients for their next rotation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TokenId(String);
impl TokenId {
	/// Validates `value` against the store's id alphabet.
	pub fn new(value: impl Into<String>) -> Result<Self, IdentifierError> {
		let value = value.into();

		if value.is_empty() {
			return Err(IdentifierError::Empty { kind: IdKind::Token });
		}
		if let Some(found) = value.chars().find(|c| !c.is_ascii_graphic()) {
			return Err(IdentifierError::NotPrintableAscii { found });
		}
		if value.len() > TOKEN_ID_MAX_LEN {
			return Err(IdentifierError::TooLong { kind: IdKind::Token, max: TOKEN_ID_MAX_LEN });
		}

		Ok(Self(value))
	}
}
impl AsRef<str> for TokenId {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl Display for TokenId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}
impl TryFrom<String> for TokenId {
	type Error = IdentifierError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		Self::new(value)
	}
}
impl From<TokenId> for String {
	fn from(value: TokenId) -> Self {
		value.0
	}
}

fn check_label(kind: IdKind, value: &str) -> Result<(), IdentifierError> {
	if value.is_empty() {
		return Err(IdentifierError::Empty { kind });
	}
	if value.chars().any(char::is_whitespace) {
		return Err(IdentifierError::ContainsWhitespace { kind });
	}
	if value.chars().count() > LABEL_MAX_CHARS {
		return Err(IdentifierError::TooLong { kind, max: LABEL_MAX_CHARS });
	}

	Ok(())
}
