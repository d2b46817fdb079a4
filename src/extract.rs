//! Text extraction for fetched documents (PDF, DOCX, plain text, Markdown).
//!
//! Sources supply bytes and a file name; this module returns plain UTF-8
//! text. The format is chosen from the file extension, falling back to the
//! content type the source reported.
//!
//! PDF runs two strategies in fidelity order and keeps the first whose
//! trimmed output reaches `min_chars`:
//!
//! 1. `pdf-extract`: layout-aware, keeps column and table spacing.
//! 2. `lopdf`: plain page-by-page text operators.
//!
//! A strategy that errors (or panics on a malformed file) counts as one that
//! produced too little text.

use std::io::Read;
use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::debug;

use crate::config::ExtractConfig;
use crate::error::PipelineError;
use crate::models::SourceDocument;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_TEXT: &str = "text/plain";
pub const MIME_MARKDOWN: &str = "text/markdown";
pub const MIME_UNKNOWN: &str = "application/octet-stream";

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Text,
    Markdown,
}

impl DocumentFormat {
    pub fn from_filename(name: &str) -> Option<Self> {
        let ext = name.rsplit_once('.')?.1.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(DocumentFormat::Pdf),
            "docx" => Some(DocumentFormat::Docx),
            "txt" | "text" => Some(DocumentFormat::Text),
            "md" | "markdown" => Some(DocumentFormat::Markdown),
            _ => None,
        }
    }

    pub fn from_mime(content_type: &str) -> Option<Self> {
        // Ignore parameters such as "; charset=utf-8".
        let essence = content_type.split(';').next().unwrap_or("").trim();
        match essence {
            MIME_PDF => Some(DocumentFormat::Pdf),
            MIME_DOCX => Some(DocumentFormat::Docx),
            MIME_TEXT => Some(DocumentFormat::Text),
            MIME_MARKDOWN | "text/x-markdown" => Some(DocumentFormat::Markdown),
            _ => None,
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => MIME_PDF,
            DocumentFormat::Docx => MIME_DOCX,
            DocumentFormat::Text => MIME_TEXT,
            DocumentFormat::Markdown => MIME_MARKDOWN,
        }
    }
}

/// MIME tag for a file name, `application/octet-stream` when unsupported.
pub fn content_type_for(name: &str) -> &'static str {
    DocumentFormat::from_filename(name)
        .map(|f| f.mime())
        .unwrap_or(MIME_UNKNOWN)
}

pub fn is_supported(name: &str) -> bool {
    DocumentFormat::from_filename(name).is_some()
}

/// Extract plain text from `bytes`, choosing the format from `filename`.
pub fn extract_text(bytes: &[u8], filename: &str, min_chars: usize) -> Result<String, PipelineError> {
    let format = DocumentFormat::from_filename(filename)
        .ok_or_else(|| PipelineError::UnsupportedFormat(filename.to_string()))?;
    extract_format(bytes, filename, format, min_chars)
}

/// Extract a fetched document, honouring the configured size limit.
pub fn extract_document(doc: &SourceDocument, config: &ExtractConfig) -> Result<String, PipelineError> {
    if doc.bytes.len() as u64 > config.max_bytes {
        return Err(PipelineError::extraction_failed(
            &doc.name,
            format!(
                "document is {} bytes, limit is {}",
                doc.bytes.len(),
                config.max_bytes
            ),
        ));
    }
    let format = DocumentFormat::from_filename(&doc.name)
        .or_else(|| DocumentFormat::from_mime(&doc.content_type))
        .ok_or_else(|| PipelineError::UnsupportedFormat(doc.name.clone()))?;
    extract_format(&doc.bytes, &doc.name, format, config.min_chars)
}

fn extract_format(
    bytes: &[u8],
    name: &str,
    format: DocumentFormat,
    min_chars: usize,
) -> Result<String, PipelineError> {
    let text = match format {
        DocumentFormat::Pdf => return extract_pdf(bytes, name, min_chars),
        DocumentFormat::Docx => {
            extract_docx(bytes).map_err(|e| PipelineError::extraction_failed(name, e))?
        }
        DocumentFormat::Text | DocumentFormat::Markdown => decode_text(bytes),
    };
    if text.trim().is_empty() {
        return Err(PipelineError::extraction_failed(name, "no text content"));
    }
    Ok(text)
}

// ============ PDF ============

type PdfStrategy = fn(&[u8]) -> Result<String, String>;

const PDF_STRATEGIES: &[(&str, PdfStrategy)] = &[("layout", pdf_layout), ("pages", pdf_pages)];

fn extract_pdf(bytes: &[u8], name: &str, min_chars: usize) -> Result<String, PipelineError> {
    let mut attempts = Vec::new();
    for (label, strategy) in PDF_STRATEGIES {
        // pdf-extract and lopdf both panic on some malformed inputs.
        let outcome = catch_unwind(AssertUnwindSafe(|| strategy(bytes)))
            .unwrap_or_else(|_| Err("parser panicked".to_string()));
        match outcome {
            Ok(text) => {
                let len = text.trim().chars().count();
                if len >= min_chars {
                    debug!(document = name, strategy = label, chars = len, "pdf text extracted");
                    return Ok(text);
                }
                attempts.push(format!("{}: {} chars", label, len));
            }
            Err(e) => attempts.push(format!("{}: {}", label, e)),
        }
    }
    Err(PipelineError::extraction_failed(
        name,
        format!(
            "no strategy produced {} characters ({})",
            min_chars,
            attempts.join("; ")
        ),
    ))
}

fn pdf_layout(bytes: &[u8]) -> Result<String, String> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| e.to_string())
}

fn pdf_pages(bytes: &[u8]) -> Result<String, String> {
    let doc = lopdf::Document::load_mem(bytes).map_err(|e| e.to_string())?;
    let mut out = String::new();
    for page in doc.get_pages().keys() {
        // A page with unreadable content streams should not sink the others.
        if let Ok(text) = doc.extract_text(&[*page]) {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&text);
        }
    }
    Ok(out)
}

// ============ DOCX ============

fn extract_docx(bytes: &[u8]) -> Result<String, String> {
    let mut archive =
        zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| e.to_string())?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| "word/document.xml not found".to_string())?;
    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| e.to_string())?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err("word/document.xml exceeds size limit".to_string());
    }
    docx_paragraphs(&doc_xml)
}

/// Text of `<w:t>` runs, one line per `<w:p>` paragraph.
fn docx_paragraphs(xml: &[u8]) -> Result<String, String> {
    use quick_xml::events::Event;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(te)) if in_text => {
                out.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => out.push('\t'),
                b"br" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.to_string()),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

// ============ Plain text ============

/// UTF-8 (BOM stripped), falling back to Latin-1 byte mapping.
fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn docx_with_body(body: &str) -> Vec<u8> {
        let mut buf = std::io::Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buf);
            let options = zip::write::SimpleFileOptions::default();
            zip.start_file("word/document.xml", options).unwrap();
            let xml = format!(
                r#"<?xml version="1.0" encoding="UTF-8"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}</w:body></w:document>"#,
                body
            );
            zip.write_all(xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        buf.into_inner()
    }

    #[test]
    fn unsupported_extension_returns_error() {
        let err = extract_text(b"foo", "image.png", 10).unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedFormat(_)));
    }

    #[test]
    fn invalid_pdf_fails_every_strategy() {
        let err = extract_text(b"not a pdf", "broken.pdf", 10).unwrap_err();
        match err {
            PipelineError::ExtractionFailed { name, reason } => {
                assert_eq!(name, "broken.pdf");
                assert!(reason.contains("layout"));
                assert!(reason.contains("pages"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn invalid_zip_returns_error_for_docx() {
        let err = extract_text(b"not a zip", "report.docx", 10).unwrap_err();
        assert!(matches!(err, PipelineError::ExtractionFailed { .. }));
    }

    #[test]
    fn docx_paragraphs_become_lines() {
        let bytes = docx_with_body(
            "<w:p><w:r><w:t xml:space=\"preserve\">Hello </w:t></w:r><w:r><w:t>world</w:t></w:r></w:p><w:p><w:r><w:t>Second &amp; last</w:t></w:r></w:p>",
        );
        let text = extract_text(&bytes, "notes.DOCX", 100).unwrap();
        assert_eq!(text, "Hello world\nSecond & last\n");
    }

    #[test]
    fn empty_docx_is_extraction_failure() {
        let bytes = docx_with_body("<w:p></w:p>");
        let err = extract_text(&bytes, "empty.docx", 0).unwrap_err();
        assert!(matches!(err, PipelineError::ExtractionFailed { .. }));
    }

    #[test]
    fn text_falls_back_to_latin1() {
        let bytes = b"caf\xe9 cr\xe8me";
        let text = extract_text(bytes, "menu.txt", 100).unwrap();
        assert_eq!(text, "café crème");
    }

    #[test]
    fn utf8_bom_is_stripped() {
        let text = extract_text(b"\xEF\xBB\xBF# Title", "readme.md", 0).unwrap();
        assert_eq!(text, "# Title");
    }

    #[test]
    fn whitespace_only_text_is_extraction_failure() {
        let err = extract_text(b"  \n\t ", "blank.txt", 0).unwrap_err();
        assert!(matches!(err, PipelineError::ExtractionFailed { .. }));
    }

    #[test]
    fn extract_document_uses_content_type_without_extension() {
        let doc = SourceDocument {
            name: "notes".to_string(),
            source: "url:test".to_string(),
            content_type: "text/plain; charset=utf-8".to_string(),
            bytes: b"plain body".to_vec(),
        };
        let text = extract_document(&doc, &ExtractConfig::default()).unwrap();
        assert_eq!(text, "plain body");
    }

    #[test]
    fn extract_document_enforces_size_limit() {
        let doc = SourceDocument {
            name: "big.txt".to_string(),
            source: "fs:test".to_string(),
            content_type: MIME_TEXT.to_string(),
            bytes: vec![b'a'; 64],
        };
        let config = ExtractConfig {
            min_chars: 0,
            max_bytes: 10,
        };
        assert!(matches!(
            extract_document(&doc, &config),
            Err(PipelineError::ExtractionFailed { .. })
        ));
    }

    #[test]
    fn content_type_for_known_and_unknown() {
        assert_eq!(content_type_for("a/b/c.pdf"), MIME_PDF);
        assert_eq!(content_type_for("guide.markdown"), MIME_MARKDOWN);
        assert_eq!(content_type_for("archive.tar.gz"), MIME_UNKNOWN);
        assert_eq!(content_type_for("Makefile"), MIME_UNKNOWN);
    }
}
