use crate::extractor::{LopdfExtractor, PdfExtractor};
use crate::models::{PageText, ProcessedDocument, UploadedDocument};
use crate::IngestError;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;
use walkdir::WalkDir;

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone)]
pub struct SkippedDocument {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct IngestionReport {
    pub documents: Vec<ProcessedDocument>,
    pub page_count: usize,
    pub skipped: Vec<SkippedDocument>,
}

/// Collects page text from uploaded PDFs. Pages accumulate across calls
/// until [`DocumentProcessor::clear`].
pub struct DocumentProcessor<X = LopdfExtractor> {
    extractor: X,
    pages: Vec<PageText>,
    documents: Vec<ProcessedDocument>,
    scratch_dir: PathBuf,
}

impl Default for DocumentProcessor<LopdfExtractor> {
    fn default() -> Self {
        Self::new(LopdfExtractor)
    }
}

impl<X> DocumentProcessor<X>
where
    X: PdfExtractor,
{
    pub fn new(extractor: X) -> Self {
        Self {
            extractor,
            pages: Vec::new(),
            documents: Vec::new(),
            scratch_dir: std::env::temp_dir(),
        }
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    pub fn pages(&self) -> &[PageText] {
        &self.pages
    }

    pub fn documents(&self) -> &[ProcessedDocument] {
        &self.documents
    }

    pub fn clear(&mut self) {
        self.pages.clear();
        self.documents.clear();
    }

    pub fn ingest_documents(&mut self, uploads: &[UploadedDocument]) -> IngestionReport {
        let mut report = IngestionReport::default();

        for upload in uploads {
            match self.ingest_one(upload) {
                Ok((document, pages)) => {
                    debug!(name = %upload.name, pages = pages.len(), "document ingested");
                    report.page_count += pages.len();
                    report.documents.push(document.clone());
                    self.documents.push(document);
                    self.pages.extend(pages);
                }
                Err(error) => {
                    warn!(name = %upload.name, %error, "skipping document");
                    report.skipped.push(SkippedDocument {
                        name: upload.name.clone(),
                        reason: error.to_string(),
                    });
                }
            }
        }

        report
    }

    pub fn ingest_folder(&mut self, folder: &Path) -> Result<IngestionReport, IngestError> {
        let uploads = load_folder_uploads(folder)?;
        Ok(self.ingest_documents(&uploads))
    }

    fn ingest_one(
        &self,
        upload: &UploadedDocument,
    ) -> Result<(ProcessedDocument, Vec<PageText>), IngestError> {
        let scratch = ScratchFile::write(&self.scratch_dir, &upload.name, &upload.bytes)?;
        let pages = self
            .extractor
            .extract_pages(scratch.path())?
            .into_iter()
            .filter(|page| !page.text.trim().is_empty())
            .map(|page| PageText {
                document: upload.name.clone(),
                ..page
            })
            .collect::<Vec<_>>();

        if pages.is_empty() {
            return Err(IngestError::PdfParse(format!(
                "no readable page text in {}",
                upload.name
            )));
        }

        let checksum = digest_bytes(&upload.bytes);
        let document = ProcessedDocument {
            document_id: digest_bytes(format!("{}:{checksum}", upload.name).as_bytes()),
            name: upload.name.clone(),
            checksum,
            page_count: pages.len(),
            ingested_at: Utc::now(),
        };

        Ok((document, pages))
    }
}

pub fn load_folder_uploads(folder: &Path) -> Result<Vec<UploadedDocument>, IngestError> {
    let files = discover_pdf_files(folder);

    if files.is_empty() {
        return Err(IngestError::InvalidArgument(format!(
            "no pdf files found in {}",
            folder.display()
        )));
    }

    files
        .into_iter()
        .map(|path| {
            let name = path
                .file_name()
                .and_then(|name| name.to_str())
                .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?
                .to_string();
            let bytes = fs::read(&path)?;
            Ok(UploadedDocument::new(name, bytes))
        })
        .collect()
}

/// Upload bytes parked on disk under a unique name for the extractor.
/// Removed on drop.
struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    fn write(dir: &Path, original_name: &str, bytes: &[u8]) -> Result<Self, IngestError> {
        let original = Path::new(original_name);
        let stem = original
            .file_stem()
            .and_then(|stem| stem.to_str())
            .filter(|stem| !stem.is_empty())
            .ok_or_else(|| IngestError::MissingFileName(original_name.to_string()))?;
        let extension = original
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default();

        let path = dir.join(format!("{stem}_{}{extension}", Uuid::new_v4().simple()));
        fs::write(&path, bytes)?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Err(error) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), %error, "failed to remove scratch upload");
        }
    }
}
