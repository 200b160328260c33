//! Owner/guest identity pairs that tokens are scoped to.

// self
use crate::{
	_prelude::*,
	auth::{GuestId, OwnerId},
};

/// The `(owner, guest)` pair a token is issued for.
///
/// Pairs are opaque labels; nothing checks them for uniqueness. Rotation keeps at most one live
/// token per pair only as long as clients always hand back their previous token id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityPair {
	/// Owner label the store files the token under.
	pub owner: OwnerId,
	/// Guest label stored as token metadata.
	pub guest: GuestId,
}
impl IdentityPair {
	/// Creates a pair from already validated identifiers.
	pub fn new(owner: OwnerId, guest: GuestId) -> Self {
		Self { owner, guest }
	}

	/// Validates raw labels and builds a pair.
	pub fn parse(owner: impl Into<String>, guest: impl Into<String>) -> Result<Self> {
		Ok(Self::new(OwnerId::new(owner)?, GuestId::new(guest)?))
	}
}
impl Display for IdentityPair {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{}/{}", self.owner, self.guest)
	}
}
