//! Page sources: documents made of independently extractable pages.
//!
//! A [`PageSource`] hands out a fresh [`Document`] per load; nothing is cached between gate
//! requests. Page indices are 0-based here. Translating the 1-based page numbers callers send
//! is the gate's job.
//!
//! File reads go through `tokio::fs`; PDF parsing and page slicing run on the blocking pool.

// std
use std::path::Path;
// crates.io
use lopdf::Document as PdfDocument;
// self
use crate::_prelude::*;

/// Media type used when none is configured.
pub const DEFAULT_MEDIA_TYPE: &str = "application/pdf";

/// Boxed future returned by [`PageSource::load_document`].
pub type DocumentFuture<'a, T> =
	Pin<Box<dyn Future<Output = Result<T, DocumentError>> + 'a + Send>>;

/// Provider of the single document the gate protects.
pub trait PageSource
where
	Self: Send + Sync,
{
	/// Loads a handle to the document.
	fn load_document(&self) -> DocumentFuture<'_, Document>;
}

/// Failures raised while loading a document or slicing a page out of it.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum DocumentError {
	/// Underlying storage could not be read.
	#[error("Failed to read {path}: {message}.")]
	Io {
		/// Path that failed.
		path: String,
		/// I/O error message.
		message: String,
	},
	/// The file is not a PDF the extractor can work with.
	#[error("{path} is not a usable PDF: {message}.")]
	Malformed {
		/// Path of the offending file.
		path: String,
		/// Parser or writer message.
		message: String,
	},
	/// Index is outside `[0, page_count)`.
	#[error("Page index {index} is outside a document of {page_count} pages.")]
	IndexOutOfBounds {
		/// Requested 0-based index.
		index: usize,
		/// Pages the document holds.
		page_count: usize,
	},
	/// The blocking task doing the work panicked or was cancelled.
	#[error("Page extraction task failed: {message}.")]
	Worker {
		/// Join error message.
		message: String,
	},
}

#[derive(Clone, Debug)]
enum Pages {
	Split(Vec<PageData>),
	Pdf { path: PathBuf, bytes: Arc<[u8]>, page_count: usize },
}

#[derive(Clone, Debug)]
enum PageData {
	Inline(Arc<[u8]>),
	File(PathBuf),
}

/// Loaded document handle.
#[derive(Clone, Debug)]
pub struct Document {
	media_type: String,
	pages: Pages,
}
impl Document {
	/// Media type of every page in the document.
	pub fn media_type(&self) -> &str {
		&self.media_type
	}

	/// Number of pages.
	pub fn page_count(&self) -> usize {
		match &self.pages {
			Pages::Split(pages) => pages.len(),
			Pages::Pdf { page_count, .. } => *page_count,
		}
	}

	/// Returns the bytes of the page at 0-based `index`.
	///
	/// For PDF documents this is a standalone single-page PDF.
	pub async fn extract_page(&self, index: usize) -> Result<Vec<u8>, DocumentError> {
		let page_count = self.page_count();

		if index >= page_count {
			return Err(DocumentError::IndexOutOfBounds { index, page_count });
		}

		match &self.pages {
			Pages::Split(pages) => match &pages[index] {
				PageData::Inline(bytes) => Ok(bytes.to_vec()),
				PageData::File(path) =>
					tokio::fs::read(path).await.map_err(|e| io_error(path, e)),
			},
			Pages::Pdf { path, bytes, .. } => {
				let (path, bytes) = (path.clone(), bytes.clone());

				blocking(move || single_page_pdf(&path, &bytes, index)).await
			},
		}
	}
}

/// Fixed in-memory document.
#[derive(Clone, Debug)]
pub struct MemorySource {
	document: Document,
}
impl MemorySource {
	/// Builds a document from already split pages.
	pub fn new<I, P>(media_type: impl Into<String>, pages: I) -> Self
	where
		I: IntoIterator<Item = P>,
		P: Into<Vec<u8>>,
	{
		let pages = pages.into_iter().map(|page| PageData::Inline(page.into().into())).collect();

		Self { document: Document { media_type: media_type.into(), pages: Pages::Split(pages) } }
	}
}
impl PageSource for MemorySource {
	fn load_document(&self) -> DocumentFuture<'_, Document> {
		let document = self.document.clone();

		Box::pin(async move { Ok(document) })
	}
}

/// Directory whose regular files, sorted by file name, are the pages of the document.
///
/// Hidden files (leading `.`) are skipped. The directory is listed again on every load, so
/// replacing pages on disk takes effect on the next request.
#[derive(Clone, Debug)]
pub struct DirectorySource {
	dir: PathBuf,
	media_type: String,
}
impl DirectorySource {
	/// Creates a source over `dir` serving pages as `media_type`.
	pub fn new(dir: impl Into<PathBuf>, media_type: impl Into<String>) -> Self {
		Self { dir: dir.into(), media_type: media_type.into() }
	}

	async fn list_pages(&self) -> Result<Vec<PageData>, DocumentError> {
		let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(|e| io_error(&self.dir, e))?;
		let mut files = Vec::new();

		while let Some(entry) = entries.next_entry().await.map_err(|e| io_error(&self.dir, e))? {
			let file_type = entry.file_type().await.map_err(|e| io_error(&entry.path(), e))?;
			let hidden = entry.file_name().to_string_lossy().starts_with('.');

			if file_type.is_file() && !hidden {
				files.push(entry.path());
			}
		}

		files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

		Ok(files.into_iter().map(PageData::File).collect())
	}
}
impl PageSource for DirectorySource {
	fn load_document(&self) -> DocumentFuture<'_, Document> {
		Box::pin(async move {
			let pages = self.list_pages().await?;

			Ok(Document { media_type: self.media_type.clone(), pages: Pages::Split(pages) })
		})
	}
}

/// A single PDF file; each extracted page is returned as its own one-page PDF.
///
/// The file is read and parsed again on every load, so replacing it on disk takes effect on the
/// next request.
#[derive(Clone, Debug)]
pub struct PdfSource {
	path: PathBuf,
}
impl PdfSource {
	/// Creates a source over the PDF at `path`.
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}
}
impl PageSource for PdfSource {
	fn load_document(&self) -> DocumentFuture<'_, Document> {
		Box::pin(async move {
			let bytes: Arc<[u8]> =
				tokio::fs::read(&self.path).await.map_err(|e| io_error(&self.path, e))?.into();
			let page_count = {
				let (path, bytes) = (self.path.clone(), bytes.clone());

				blocking(move || {
					PdfDocument::load_mem(&bytes)
						.map(|pdf| pdf.get_pages().len())
						.map_err(|e| malformed(&path, e))
				})
				.await?
			};

			Ok(Document {
				media_type: DEFAULT_MEDIA_TYPE.into(),
				pages: Pages::Pdf { path: self.path.clone(), bytes, page_count },
			})
		})
	}
}

// Keeps only the page at `index` and writes the result out as a new PDF.
fn single_page_pdf(path: &Path, bytes: &[u8], index: usize) -> Result<Vec<u8>, DocumentError> {
	let mut pdf = PdfDocument::load_mem(bytes).map_err(|e| malformed(path, e))?;
	let pages = pdf.get_pages();
	let keep = pages.keys().nth(index).copied().ok_or(DocumentError::IndexOutOfBounds {
		index,
		page_count: pages.len(),
	})?;
	let others = pages.keys().copied().filter(|number| *number != keep).collect::<Vec<_>>();

	pdf.delete_pages(&others);
	pdf.prune_objects();

	let mut out = Vec::new();

	pdf.save_to(&mut out).map_err(|e| malformed(path, e))?;

	Ok(out)
}

async fn blocking<T, F>(work: F) -> Result<T, DocumentError>
where
	T: 'static + Send,
	F: 'static + Send + FnOnce() -> Result<T, DocumentError>,
{
	tokio::task::spawn_blocking(work)
		.await
		.map_err(|e| DocumentError::Worker { message: e.to_string() })?
}

fn io_error(path: &Path, err: std::io::Error) -> DocumentError {
	DocumentError::Io { path: path.display().to_string(), message: err.to_string() }
}

fn malformed(path: &Path, err: impl Display) -> DocumentError {
	DocumentError::Malformed { path: path.display().to_string(), message: err.to_string() }
}
