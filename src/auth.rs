//! Auth-domain identifiers, identity pairs, and token models.

pub mod id;
pub mod token;

pub use id::*;
pub use token::{identity::*, rate::*, record::*, secret::*};
