//! Serves a PDF, or a directory of pages, behind rotating, rate-limited tokens.

// std
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
// crates.io
use clap::{Parser, ValueEnum};
use color_eyre::{Result, eyre::eyre};
use time::Duration;
use tracing_subscriber::EnvFilter;
// self
use page_gate::{
	auth::TokenSecret,
	config::GateConfig,
	document::{DEFAULT_MEDIA_TYPE, DirectorySource, PageSource, PdfSource},
	gate::ContentGate,
	issuer::TokenIssuer,
	server::{self, AppState},
	store::{MemoryStore, RemoteStore, TokenStore},
	validator::AccessValidator,
};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StoreKind {
	/// In-process store; tokens vanish on restart.
	Memory,
	/// Unkey-compatible key-management API.
	Remote,
}

#[derive(Debug, Parser)]
#[command(name = "page-gate", version, about)]
struct Args {
	/// Address to listen on.
	#[arg(long, env = "PAGE_GATE_LISTEN", default_value = "127.0.0.1:3000")]
	listen: SocketAddr,
	/// PDF file to slice pages out of, or a directory whose files, sorted by name, are the pages.
	#[arg(long, env = "PAGE_GATE_DOCUMENT")]
	document: PathBuf,
	/// Media type reported for pages of a directory document.
	#[arg(long, env = "PAGE_GATE_MEDIA_TYPE", default_value = DEFAULT_MEDIA_TYPE)]
	media_type: String,
	/// Token store backend.
	#[arg(long, env = "PAGE_GATE_STORE", value_enum, default_value = "memory")]
	store: StoreKind,
	/// Base URL of the remote store.
	#[arg(long, env = "PAGE_GATE_STORE_URL", default_value = RemoteStore::DEFAULT_BASE_URL)]
	store_url: String,
	/// Root key for the remote store.
	#[arg(long, env = "PAGE_GATE_ROOT_KEY", hide_env_values = true)]
	root_key: Option<String>,
	/// API the remote store files tokens under.
	#[arg(long, env = "PAGE_GATE_API_ID")]
	api_id: Option<String>,
	/// Token time-to-live in milliseconds.
	#[arg(long, env = "PAGE_GATE_TTL_MS", default_value_t = 120_000)]
	ttl_ms: i64,
	/// Requests allowed per rate window.
	#[arg(long, env = "PAGE_GATE_RATE_LIMIT", default_value_t = 5)]
	rate_limit: u32,
	/// Rate window length in milliseconds.
	#[arg(long, env = "PAGE_GATE_RATE_WINDOW_MS", default_value_t = 3_000)]
	rate_window_ms: i64,
	/// Random bytes of secret material per token.
	#[arg(long, env = "PAGE_GATE_TOKEN_BYTES", default_value_t = 16)]
	token_bytes: usize,
	/// Prefix of every token secret.
	#[arg(long, env = "PAGE_GATE_TOKEN_PREFIX", default_value = "doc")]
	token_prefix: String,
}
impl Args {
	fn config(&self) -> Result<GateConfig> {
		let config = GateConfig::builder()
			.ttl(Duration::milliseconds(self.ttl_ms))
			.rate_limit(self.rate_limit, Duration::milliseconds(self.rate_window_ms))
			.byte_length(self.token_bytes)
			.prefix(&self.token_prefix)
			.document_path(&self.document)
			.media_type(&self.media_type)
			.build()?;

		Ok(config)
	}

	fn store(&self) -> Result<Arc<dyn TokenStore>> {
		match self.store {
			StoreKind::Memory => Ok(Arc::new(MemoryStore::default())),
			StoreKind::Remote => {
				let root_key = self
					.root_key
					.clone()
					.ok_or_else(|| eyre!("PAGE_GATE_ROOT_KEY is required for the remote store"))?;
				let api_id = self
					.api_id
					.clone()
					.ok_or_else(|| eyre!("PAGE_GATE_API_ID is required for the remote store"))?;
				let store =
					RemoteStore::from_url_str(&self.store_url, TokenSecret::new(root_key), api_id)?;

				Ok(Arc::new(store))
			},
		}
	}

	async fn source(&self, media_type: &str) -> Result<Arc<dyn PageSource>> {
		let metadata = tokio::fs::metadata(&self.document).await.map_err(|e| {
			eyre!("document {} cannot be opened: {e}", self.document.display())
		})?;

		if metadata.is_dir() {
			Ok(Arc::new(DirectorySource::new(&self.document, media_type)))
		} else {
			Ok(Arc::new(PdfSource::new(&self.document)))
		}
	}
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;
	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
		)
		.init();

	let args = Args::parse();
	let config = Arc::new(args.config()?);
	let store = args.store()?;
	let source = args.source(&config.document.media_type).await?;
	let state = AppState {
		issuer: TokenIssuer::new(store.clone(), config.issuance.clone()),
		gate: ContentGate::new(AccessValidator::new(store), source),
		config,
	};
	let listener = tokio::net::TcpListener::bind(args.listen).await?;

	tracing::info!(listen = %args.listen, store = ?args.store, "page-gate listening.");

	axum::serve(listener, server::router(state))
		.with_graceful_shutdown(async {
			let _ = tokio::signal::ctrl_c().await;
		})
		.await?;

	Ok(())
}
