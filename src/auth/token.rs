//! Token handles, secrets, and the limits attached to them at issuance.

pub mod identity;
pub mod rate;
pub mod record;
pub mod secret;
