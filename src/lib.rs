//! Time-boxed, rate-limited page access for documents: rotate short-lived tokens, classify every
//! presentation, and serve one page at a time behind a single gate.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod config;
pub mod document;
pub mod error;
pub mod gate;
pub mod issuer;
pub mod obs;
#[cfg(feature = "server")] pub mod server;
pub mod store;
pub mod validator;

mod _prelude {
	pub use std::{
		collections::HashMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		path::PathBuf,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(not(any(feature = "reqwest", feature = "server")))] use serde_json as _;
#[cfg(not(feature = "reqwest"))] use serde_path_to_error as _;
#[cfg(feature = "server")] use {clap as _, color_eyre as _, tracing_subscriber as _};
#[cfg(test)] use {color_eyre as _, httpmock as _, tower as _};
