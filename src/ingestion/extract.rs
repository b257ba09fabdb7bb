//! Format-specific text extraction
//!
//! | Source            | Extractor                                   |
//! |-------------------|---------------------------------------------|
//! | pasted text       | pass-through                                |
//! | plain text file   | charset decoding                            |
//! | HTML file, URL    | boilerplate stripping ([`super::page`])     |
//! | PDF               | `pdftotext`                                 |
//! | DOCX / PPTX       | OOXML part extraction via `unzip -p`        |
//! | audio / video     | gateway transcription + `ffprobe` duration  |

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::process::Command;
use tracing::{debug, warn};

use super::page::{extract_page_text, PageFetcher};
use super::sanitize::{sanitize_text, strip_tags};
use crate::error::Result;
use crate::gateway::{AiGateway, AudioInput, ProviderOptions};
use crate::models::{Content, SourceFormat, SourceKind};
use crate::utils::decode_text;
use crate::utils::error::IngestError;

/// Text obtained from a content source
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedText {
    pub text: String,
    /// Title discovered in the source (page title), if any
    pub title: Option<String>,
    /// Probed media duration for audio and video
    pub duration_secs: Option<f64>,
}

// ============================================================================
// External tool adapters
// ============================================================================

/// Extracts text from office documents and PDFs
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    async fn extract(&self, path: &Path, format: SourceFormat) -> std::result::Result<String, IngestError>;
}

/// Reads the duration of audio and video files
#[async_trait]
pub trait MediaProbe: Send + Sync {
    async fn duration_secs(&self, path: &Path) -> std::result::Result<f64, IngestError>;
}

async fn run_tool(program: &str, args: &[&str]) -> std::result::Result<Vec<u8>, IngestError> {
    let output = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| IngestError::tool(program, e.to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(IngestError::tool(
            program,
            format!("{}: {}", output.status, stderr.trim()),
        ));
    }
    Ok(output.stdout)
}

/// `pdftotext` for PDF, `unzip -p` for DOCX and PPTX parts
#[derive(Debug, Clone)]
pub struct CommandDocumentExtractor {
    pdftotext: String,
    unzip: String,
}

impl Default for CommandDocumentExtractor {
    fn default() -> Self {
        Self {
            pdftotext: "pdftotext".to_string(),
            unzip: "unzip".to_string(),
        }
    }
}

impl CommandDocumentExtractor {
    pub fn new(pdftotext: impl Into<String>, unzip: impl Into<String>) -> Self {
        Self {
            pdftotext: pdftotext.into(),
            unzip: unzip.into(),
        }
    }
}

/// Turn WordprocessingML / PresentationML into text, one paragraph per line
pub fn ooxml_to_text(xml: &str) -> String {
    let with_breaks = xml
        .replace("</w:p>", "\n")
        .replace("</a:p>", "\n")
        .replace("<w:br/>", "\n")
        .replace("<w:tab/>", " ");
    sanitize_text(&strip_tags(&with_breaks))
}

/// Number of a `ppt/slides/slideN.xml` entry
fn slide_number(entry: &str) -> Option<u32> {
    entry
        .strip_prefix("ppt/slides/slide")?
        .strip_suffix(".xml")?
        .parse()
        .ok()
}

/// Slide entries of an archive listing in presentation order
pub fn ordered_slides(listing: &str) -> Vec<&str> {
    let mut slides: Vec<(u32, &str)> = listing
        .lines()
        .map(str::trim)
        .filter_map(|entry| slide_number(entry).map(|n| (n, entry)))
        .collect();
    slides.sort_by_key(|(n, _)| *n);
    slides.into_iter().map(|(_, entry)| entry).collect()
}

#[async_trait]
impl DocumentExtractor for CommandDocumentExtractor {
    async fn extract(&self, path: &Path, format: SourceFormat) -> std::result::Result<String, IngestError> {
        let path_str = path.to_string_lossy();
        match format {
            SourceFormat::Pdf => {
                let stdout = run_tool(&self.pdftotext, &["-enc", "UTF-8", &path_str, "-"]).await?;
                Ok(sanitize_text(&decode_text(&stdout)))
            }
            SourceFormat::Docx => {
                let stdout = run_tool(&self.unzip, &["-p", &path_str, "word/document.xml"]).await?;
                Ok(ooxml_to_text(&decode_text(&stdout)))
            }
            SourceFormat::Pptx => {
                // `unzip -p` emits archive order, so each slide is read on its own
                let listing = run_tool(&self.unzip, &["-Z1", &path_str]).await?;
                let listing = decode_text(&listing);
                let mut xml = String::new();
                for entry in ordered_slides(&listing) {
                    let stdout = run_tool(&self.unzip, &["-p", &path_str, entry]).await?;
                    xml.push_str(&decode_text(&stdout));
                }
                Ok(ooxml_to_text(&xml))
            }
            other => Err(IngestError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// `ffprobe` duration lookup
#[derive(Debug, Clone)]
pub struct FfprobeMediaProbe {
    program: String,
}

impl Default for FfprobeMediaProbe {
    fn default() -> Self {
        Self {
            program: "ffprobe".to_string(),
        }
    }
}

impl FfprobeMediaProbe {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl MediaProbe for FfprobeMediaProbe {
    async fn duration_secs(&self, path: &Path) -> std::result::Result<f64, IngestError> {
        let path_str = path.to_string_lossy();
        let stdout = run_tool(
            &self.program,
            &[
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
                &path_str,
            ],
        )
        .await?;
        let text = String::from_utf8_lossy(&stdout);
        text.trim()
            .parse::<f64>()
            .map_err(|_| IngestError::tool(&self.program, format!("unparseable duration '{}'", text.trim())))
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// Picks the extractor for a content item and runs it
pub struct ContentExtractor {
    gateway: Arc<AiGateway>,
    pages: Arc<PageFetcher>,
    documents: Arc<dyn DocumentExtractor>,
    probe: Arc<dyn MediaProbe>,
    upload_root: Option<PathBuf>,
}

impl ContentExtractor {
    pub fn new(
        gateway: Arc<AiGateway>,
        pages: Arc<PageFetcher>,
        documents: Arc<dyn DocumentExtractor>,
        probe: Arc<dyn MediaProbe>,
    ) -> Self {
        Self {
            gateway,
            pages,
            documents,
            probe,
            upload_root: None,
        }
    }

    /// Resolve relative upload paths against this directory
    pub fn with_upload_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.upload_root = Some(root.into());
        self
    }

    fn upload_path(&self, location: &str) -> PathBuf {
        let path = PathBuf::from(location);
        match &self.upload_root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path,
        }
    }

    /// Obtain sanitized raw text for a content item.
    ///
    /// Empty output is an error. Media probing is soft: a failed probe
    /// leaves `duration_secs` empty.
    pub async fn extract(&self, content: &Content) -> Result<ExtractedText> {
        let extracted = match content.kind {
            SourceKind::Paste => ExtractedText {
                text: sanitize_text(content.raw_text.as_deref().unwrap_or_default()),
                ..Default::default()
            },
            SourceKind::Url => {
                let url = content
                    .location
                    .as_deref()
                    .ok_or(IngestError::UnsupportedFormat("url without location".into()))?;
                let page = self.pages.fetch(url).await?;
                ExtractedText {
                    text: page.text,
                    title: page.title,
                    duration_secs: None,
                }
            }
            SourceKind::Upload => {
                let location = content
                    .location
                    .as_deref()
                    .ok_or(IngestError::UnsupportedFormat("upload without path".into()))?;
                self.extract_file(content, &self.upload_path(location)).await?
            }
        };

        if extracted.text.trim().is_empty() {
            return Err(IngestError::EmptyText.into());
        }
        debug!(
            content_id = %content.id,
            format = %content.format,
            chars = extracted.text.len(),
            "Extracted text"
        );
        Ok(extracted)
    }

    async fn extract_file(&self, content: &Content, path: &Path) -> Result<ExtractedText> {
        match content.format {
            SourceFormat::PlainText => Ok(ExtractedText {
                text: sanitize_text(&decode_text(&read_file(path).await?)),
                ..Default::default()
            }),
            SourceFormat::Html => {
                let page = extract_page_text(&decode_text(&read_file(path).await?));
                Ok(ExtractedText {
                    text: page.text,
                    title: page.title,
                    duration_secs: None,
                })
            }
            SourceFormat::Pdf | SourceFormat::Docx | SourceFormat::Pptx => Ok(ExtractedText {
                text: self.documents.extract(path, content.format).await?,
                ..Default::default()
            }),
            SourceFormat::Audio | SourceFormat::Video => {
                let bytes = read_file(path).await?;
                let audio = AudioInput {
                    file_name: path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| "audio".to_string()),
                    mime_type: content
                        .mime_type
                        .clone()
                        .unwrap_or_else(|| default_media_mime(content.format).to_string()),
                    bytes: Bytes::from(bytes),
                };
                let transcript = self
                    .gateway
                    .transcribe(&audio, &ProviderOptions::default())
                    .await?;

                let duration_secs = match self.probe.duration_secs(path).await {
                    Ok(secs) => Some(secs),
                    Err(e) => {
                        warn!(content_id = %content.id, error = %e, "Media probe failed, duration left empty");
                        None
                    }
                };

                Ok(ExtractedText {
                    text: sanitize_text(&transcript),
                    title: None,
                    duration_secs,
                })
            }
        }
    }
}

fn default_media_mime(format: SourceFormat) -> &'static str {
    match format {
        SourceFormat::Video => "video/mp4",
        _ => "audio/mpeg",
    }
}

async fn read_file(path: &Path) -> std::result::Result<Vec<u8>, IngestError> {
    tokio::fs::read(path).await.map_err(|e| IngestError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}
