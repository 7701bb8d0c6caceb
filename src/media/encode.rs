/// File-to-data-URI encoding
///
/// Every upload ends up embedded in the store as `data:<mime>;base64,...`.
/// Reading and encoding run on tokio's blocking pool; a multi-file upload
/// is a join over one future per file.
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::future::join_all;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// A file chosen by the user
#[derive(Debug, Clone, PartialEq)]
pub enum FileSource {
    /// A file on disk
    Path(PathBuf),
    /// Contents already in memory (e.g. handed over by a UI layer)
    Memory { name: String, bytes: Vec<u8> },
}

impl FileSource {
    /// Display name: file name for paths, the given name otherwise
    pub fn name(&self) -> String {
        match self {
            FileSource::Path(path) => path
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string(),
            FileSource::Memory { name, .. } => name.clone(),
        }
    }

    async fn read(self) -> Result<(String, Vec<u8>)> {
        let name = self.name();
        match self {
            FileSource::Path(path) => {
                let bytes = tokio::fs::read(&path).await?;
                Ok((name, bytes))
            }
            FileSource::Memory { bytes, .. } => Ok((name, bytes)),
        }
    }
}

impl From<PathBuf> for FileSource {
    fn from(path: PathBuf) -> Self {
        FileSource::Path(path)
    }
}

/// Which kinds of file a form field accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaSlot {
    Image,
    AudioVideo,
    Any,
}

impl MediaSlot {
    pub fn accepts(self, mime: &str) -> bool {
        match self {
            MediaSlot::Image => mime.starts_with("image/"),
            MediaSlot::AudioVideo => mime.starts_with("audio/") || mime.starts_with("video/"),
            MediaSlot::Any => true,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            MediaSlot::Image => "an image",
            MediaSlot::AudioVideo => "an audio or video file",
            MediaSlot::Any => "any file",
        }
    }
}

/// An encoded upload
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFile {
    pub name: String,
    pub mime: String,
    pub data_uri: String,
}

/// A file left out of a batch because it did not fit the slot
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedFile {
    pub name: String,
    pub reason: String,
}

/// Result of encoding a multi-file upload
///
/// Accepted files keep their submission order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EncodedBatch {
    pub accepted: Vec<EncodedFile>,
    pub skipped: Vec<SkippedFile>,
}

impl EncodedBatch {
    /// Files processed, accepted or not
    pub fn processed(&self) -> usize {
        self.accepted.len() + self.skipped.len()
    }
}

/// Read one file and encode it as a data URI
pub async fn encode_file(source: FileSource) -> Result<EncodedFile> {
    let (name, bytes) = source.read().await?;

    tokio::task::spawn_blocking(move || {
        let mime = detect_mime(&name, &bytes);
        let data_uri = format!("data:{};base64,{}", mime, STANDARD.encode(&bytes));
        debug!("Encoded {} ({}, {} bytes)", name, mime, bytes.len());
        EncodedFile {
            name,
            mime,
            data_uri,
        }
    })
    .await
    .map_err(|e| Error::Io(std::io::Error::other(format!("Task join error: {}", e))))
}

/// Encode a single-file upload, rejecting it if `slot` does not accept it
pub async fn encode_for_slot(source: FileSource, slot: MediaSlot) -> Result<EncodedFile> {
    let file = encode_file(source).await?;
    if !slot.accepts(&file.mime) {
        return Err(Error::WrongFileType {
            file: file.name,
            expected: slot.describe().to_string(),
        });
    }
    Ok(file)
}

/// Encode every file of an upload and check each against `slot`
///
/// Files of the wrong type are skipped and reported; they still count as
/// processed. A read failure on any file fails the whole batch.
pub async fn encode_batch(sources: Vec<FileSource>, slot: MediaSlot) -> Result<EncodedBatch> {
    let results = join_all(sources.into_iter().map(encode_file)).await;

    let mut batch = EncodedBatch::default();
    for result in results {
        let file = result?;
        if slot.accepts(&file.mime) {
            batch.accepted.push(file);
        } else {
            warn!("⚠️  Skipping {}: {} is not {}", file.name, file.mime, slot.describe());
            batch.skipped.push(SkippedFile {
                reason: format!("{} is not {}", file.mime, slot.describe()),
                name: file.name,
            });
        }
    }

    debug!(
        "Encoded batch: {} processed, {} accepted",
        batch.processed(),
        batch.accepted.len()
    );
    Ok(batch)
}

/// Read a file as UTF-8 text, returning its name alongside
pub async fn read_text(source: FileSource) -> Result<(String, String)> {
    let (name, bytes) = source.read().await?;
    let text = String::from_utf8(bytes).map_err(|_| Error::WrongFileType {
        file: name.clone(),
        expected: "UTF-8 text".to_string(),
    })?;
    Ok((name, text))
}

/// Split a base64 data URI into its MIME type and decoded bytes
pub fn decode_data_uri(uri: &str) -> Result<(String, Vec<u8>)> {
    let invalid = || Error::InvalidReference(format!("not a base64 data URI: {:.32}", uri));

    let rest = uri.strip_prefix("data:").ok_or_else(invalid)?;
    let (header, payload) = rest.split_once(',').ok_or_else(invalid)?;
    let mime = header.strip_suffix(";base64").ok_or_else(invalid)?;
    let bytes = STANDARD.decode(payload.trim()).map_err(|_| invalid())?;

    Ok((mime.to_string(), bytes))
}

/// Sniff image content first, then fall back to the file extension
fn detect_mime(name: &str, bytes: &[u8]) -> String {
    if let Ok(format) = image::guess_format(bytes) {
        return format.to_mime_type().to_string();
    }

    let extension = Path::new(name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let mime = match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" | "oga" => "audio/ogg",
        "m4a" => "audio/mp4",
        "aac" => "audio/aac",
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "kml" => "application/vnd.google-earth.kml+xml",
        "kmz" => "application/vnd.google-earth.kmz",
        "geojson" => "application/geo+json",
        "pdf" => "application/pdf",
        "csv" => "text/csv",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    };
    mime.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Smallest valid PNG signature + IHDR start, enough for format sniffing
    const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];

    fn memory(name: &str, bytes: &[u8]) -> FileSource {
        FileSource::Memory {
            name: name.to_string(),
            bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn test_detect_mime() {
        assert_eq!(detect_mime("whatever.bin", PNG_HEADER), "image/png");
        assert_eq!(detect_mime("talk.MP3", b"ID3"), "audio/mpeg");
        assert_eq!(detect_mime("ward.kml", b"<kml/>"), "application/vnd.google-earth.kml+xml");
        assert_eq!(detect_mime("noext", b"??"), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_encode_and_decode() {
        let file = encode_file(memory("a.png", PNG_HEADER)).await.unwrap();
        assert!(file.data_uri.starts_with("data:image/png;base64,"));

        let (mime, bytes) = decode_data_uri(&file.data_uri).unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(bytes, PNG_HEADER);
    }

    #[tokio::test]
    async fn test_batch_skips_wrong_type_and_keeps_order() {
        let batch = encode_batch(
            vec![
                memory("1.png", PNG_HEADER),
                memory("notes.txt", b"hello"),
                memory("2.png", PNG_HEADER),
            ],
            MediaSlot::Image,
        )
        .await
        .unwrap();

        let names: Vec<_> = batch.accepted.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["1.png", "2.png"]);
        assert_eq!(batch.skipped.len(), 1);
        assert_eq!(batch.skipped[0].name, "notes.txt");
        assert_eq!(batch.processed(), 3);
    }

    #[tokio::test]
    async fn test_batch_read_failure_aborts() {
        let result = encode_batch(
            vec![
                memory("1.png", PNG_HEADER),
                FileSource::Path(PathBuf::from("/nonexistent/path.png")),
            ],
            MediaSlot::Image,
        )
        .await;
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn test_read_text_rejects_binary() {
        let result = read_text(memory("survey.csv", &[0xFF, 0xFE, 0x00])).await;
        assert!(matches!(result, Err(Error::WrongFileType { .. })));

        let (name, text) = read_text(memory("survey.csv", b"a,b\n1,2")).await.unwrap();
        assert_eq!(name, "survey.csv");
        assert_eq!(text, "a,b\n1,2");
    }

    #[test]
    fn test_decode_rejects_plain_urls() {
        assert!(decode_data_uri("https://example.com/map.kml").is_err());
        assert!(decode_data_uri("data:text/plain,hello").is_err());
    }

    #[test]
    fn test_slot_accepts() {
        assert!(MediaSlot::Image.accepts("image/jpeg"));
        assert!(!MediaSlot::Image.accepts("video/mp4"));
        assert!(MediaSlot::AudioVideo.accepts("video/mp4"));
        assert!(MediaSlot::AudioVideo.accepts("audio/ogg"));
        assert!(!MediaSlot::AudioVideo.accepts("image/png"));
        assert!(MediaSlot::Any.accepts("application/octet-stream"));
    }

    #[tokio::test]
    async fn test_encode_for_slot() {
        let kml = FileSource::Memory {
            name: "ward.kml".to_string(),
            bytes: b"<kml/>".to_vec(),
        };
        let file = encode_for_slot(kml.clone(), MediaSlot::Any).await.unwrap();
        assert_eq!(file.mime, "application/vnd.google-earth.kml+xml");

        assert!(matches!(
            encode_for_slot(kml, MediaSlot::AudioVideo).await,
            Err(Error::WrongFileType { .. })
        ));
    }
}
