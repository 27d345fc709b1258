//! Static document corpus: loading and chunking.
//!
//! Documents are ingested once from a source directory and are immutable
//! afterwards. Only structured-text formats are accepted; anything else is
//! a loader error rather than a silent skip.

mod chunker;

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::errors::RagError;

pub use chunker::{Chunk, Chunker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Text,
    Markdown,
    Json,
}

impl DocumentFormat {
    fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "txt" => Some(DocumentFormat::Text),
            "md" => Some(DocumentFormat::Markdown),
            "json" => Some(DocumentFormat::Json),
            _ => None,
        }
    }
}

/// An ingested source document. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub path: PathBuf,
    pub text: String,
    pub format: DocumentFormat,
}

/// Load every document in `dir`, sorted by file name so the corpus
/// fingerprint is stable across platforms.
pub fn load_dir(dir: &Path) -> Result<Vec<Document>, RagError> {
    let entries = fs::read_dir(dir).map_err(|e| {
        RagError::IndexBuild(format!("corpus dir {} unreadable: {}", dir.display(), e))
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect();
    paths.sort();

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        documents.push(load_file(&path)?);
    }

    if documents.is_empty() {
        return Err(RagError::IndexBuild(format!(
            "no documents found in {}",
            dir.display()
        )));
    }

    Ok(documents)
}

pub fn load_file(path: &Path) -> Result<Document, RagError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    let format = DocumentFormat::from_extension(&ext).ok_or_else(|| {
        RagError::IndexBuild(format!(
            "unsupported document type for corpus source: {}",
            path.display()
        ))
    })?;

    let text = fs::read_to_string(path)
        .map_err(|e| RagError::IndexBuild(format!("failed to read {}: {}", path.display(), e)))?;

    let id = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    Ok(Document {
        id,
        path: path.to_path_buf(),
        text,
        format,
    })
}

/// Content fingerprint over the ordered document texts, used for the
/// opt-in corpus staleness check in the index cache.
pub fn fingerprint(documents: &[Document]) -> String {
    let mut hasher = Sha256::new();
    for doc in documents {
        hasher.update(doc.id.as_bytes());
        hasher.update([0u8]);
        hasher.update(doc.text.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn loads_supported_formats_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.md"), "markdown body").unwrap();
        fs::write(dir.path().join("a.txt"), "plain body").unwrap();

        let docs = load_dir(dir.path()).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, "a.txt");
        assert_eq!(docs[0].format, DocumentFormat::Text);
        assert_eq!(docs[1].id, "b.md");
        assert_eq!(docs[1].format, DocumentFormat::Markdown);
    }

    #[test]
    fn unsupported_extension_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("scan.pdf"), "%PDF").unwrap();
        let err = load_dir(dir.path()).unwrap_err();
        assert!(err.to_string().contains("unsupported document type"));
    }

    #[test]
    fn empty_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_dir(dir.path()).is_err());
    }

    #[test]
    fn fingerprint_tracks_content() {
        let make = |text: &str| Document {
            id: "a.txt".into(),
            path: "a.txt".into(),
            text: text.into(),
            format: DocumentFormat::Text,
        };
        let a = fingerprint(&[make("hello")]);
        let b = fingerprint(&[make("hello")]);
        let c = fingerprint(&[make("changed")]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
