//! Plain-text extraction for the document formats the folder loader accepts.
//!
//! Office formats are read straight out of their zip containers: docx
//! paragraphs from `word/document.xml`, xlsx rows from the worksheet parts
//! with shared strings resolved. PDF goes through `pdf-extract` when the
//! `pdf` feature is enabled.

use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use zip::ZipArchive;
use zip::result::ZipError;

use crate::error::{ExtractFailure, ExtractionError};
use crate::types::SourceDocument;

/// Turns the raw bytes of one file into text.
pub trait TextExtractor: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractFailure>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────────────────

/// Maps lower-case file extensions to extractors.
#[derive(Clone)]
pub struct ExtractorRegistry {
    by_extension: HashMap<String, Arc<dyn TextExtractor>>,
}

impl std::fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut exts: Vec<_> = self.by_extension.keys().collect();
        exts.sort();
        f.debug_struct("ExtractorRegistry")
            .field("extensions", &exts)
            .finish()
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::empty()
            .with("txt", PlainTextExtractor)
            .with("docx", DocxExtractor)
            .with("xlsx", XlsxExtractor)
            .with("pdf", PdfExtractor)
    }
}

impl ExtractorRegistry {
    pub fn empty() -> Self {
        Self {
            by_extension: HashMap::new(),
        }
    }

    /// Register (or replace) the extractor for an extension.
    pub fn with(mut self, extension: &str, extractor: impl TextExtractor + 'static) -> Self {
        self.by_extension
            .insert(extension.to_ascii_lowercase(), Arc::new(extractor));
        self
    }

    pub fn supports(&self, filename: &str) -> bool {
        self.lookup(filename).is_some()
    }

    fn lookup(&self, filename: &str) -> Option<&Arc<dyn TextExtractor>> {
        let ext = std::path::Path::new(filename)
            .extension()?
            .to_string_lossy()
            .to_ascii_lowercase();
        self.by_extension.get(&ext)
    }

    /// Extract text from a document.
    ///
    /// Returns `None` for extensions with no registered extractor.
    pub fn extract(&self, doc: &SourceDocument) -> Option<Result<String, ExtractionError>> {
        let extractor = self.lookup(&doc.filename)?;
        tracing::debug!(file = %doc.filename, extractor = extractor.name(), "Extracting text");
        Some(
            extractor
                .extract(&doc.bytes)
                .map_err(|e| ExtractionError::new(&doc.filename, e)),
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Extractors
// ─────────────────────────────────────────────────────────────────────────────

/// UTF-8 text files.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn name(&self) -> &'static str {
        "txt"
    }

    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractFailure> {
        let text = String::from_utf8(bytes.to_vec())?;
        Ok(text.strip_prefix('\u{feff}').map(str::to_string).unwrap_or(text))
    }
}

static DOCX_PARAGRAPH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<w:p[\s>].*?</w:p>").expect("valid paragraph regex"));
static DOCX_TEXT_RUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<w:t(?:\s[^>]*)?>(.*?)</w:t>").expect("valid text run regex")
});

/// Word documents: non-empty paragraphs, one per line.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocxExtractor;

impl TextExtractor for DocxExtractor {
    fn name(&self) -> &'static str {
        "docx"
    }

    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractFailure> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let xml = read_entry(&mut archive, "word/document.xml")?;

        let paragraphs: Vec<String> = DOCX_PARAGRAPH
            .find_iter(&xml)
            .map(|p| {
                DOCX_TEXT_RUN
                    .captures_iter(p.as_str())
                    .map(|c| unescape_xml(&c[1]))
                    .collect::<String>()
            })
            .filter(|p| !p.trim().is_empty())
            .collect();
        Ok(paragraphs.join("\n"))
    }
}

static XLSX_SHARED_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<si>(.*?)</si>").expect("valid shared string regex"));
static XLSX_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<t(?:\s[^>]*)?>(.*?)</t>").expect("valid text regex"));
static XLSX_ROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<row\b[^>]*?(?:/>|>(.*?)</row>)").expect("valid row regex")
});
static XLSX_CELL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<c\b([^>]*?)(?:/>|>(.*?)</c>)").expect("valid cell regex")
});
static XLSX_CELL_TYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bt="([^"]*)""#).expect("valid cell type regex"));
static XLSX_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<v>(.*?)</v>").expect("valid value regex"));
static XLSX_SHEET_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^xl/worksheets/sheet(\d+)\.xml$").expect("valid sheet name regex")
});

/// Excel workbooks: every non-blank row of every sheet, cells joined by `" | "`.
#[derive(Debug, Clone, Copy, Default)]
pub struct XlsxExtractor;

impl TextExtractor for XlsxExtractor {
    fn name(&self) -> &'static str {
        "xlsx"
    }

    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractFailure> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;

        let shared: Vec<String> = match read_entry(&mut archive, "xl/sharedStrings.xml") {
            Ok(xml) => XLSX_SHARED_ITEM
                .captures_iter(&xml)
                .map(|si| {
                    XLSX_TEXT
                        .captures_iter(&si[1])
                        .map(|t| unescape_xml(&t[1]))
                        .collect()
                })
                .collect(),
            Err(ExtractFailure::MissingEntry(_)) => Vec::new(),
            Err(e) => return Err(e),
        };

        let mut sheets: Vec<(u32, String)> = archive
            .file_names()
            .filter_map(|name| {
                let number = XLSX_SHEET_NAME.captures(name)?[1].parse().ok()?;
                Some((number, name.to_string()))
            })
            .collect();
        sheets.sort();

        let mut lines = Vec::new();
        for (_, name) in sheets {
            let xml = read_entry(&mut archive, &name)?;
            for row in XLSX_ROW.captures_iter(&xml) {
                let Some(body) = row.get(1) else { continue };
                let cells: Vec<String> = XLSX_CELL
                    .captures_iter(body.as_str())
                    .filter_map(|cell| {
                        let attrs = cell.get(1).map_or("", |m| m.as_str());
                        let inner = cell.get(2).map_or("", |m| m.as_str());
                        cell_text(attrs, inner, &shared)
                    })
                    .collect();
                let line = cells.join(" | ");
                if !line.trim().is_empty() {
                    lines.push(line);
                }
            }
        }
        Ok(lines.join("\n"))
    }
}

fn cell_text(attrs: &str, inner: &str, shared: &[String]) -> Option<String> {
    let cell_type = XLSX_CELL_TYPE.captures(attrs).map(|c| c[1].to_string());
    match cell_type.as_deref() {
        Some("inlineStr") => {
            let text: String = XLSX_TEXT
                .captures_iter(inner)
                .map(|t| unescape_xml(&t[1]))
                .collect();
            Some(text)
        }
        Some("s") => {
            let index: usize = XLSX_VALUE.captures(inner)?[1].trim().parse().ok()?;
            shared.get(index).cloned()
        }
        _ => XLSX_VALUE.captures(inner).map(|v| unescape_xml(&v[1])),
    }
}

/// PDF page text.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfExtractor;

impl TextExtractor for PdfExtractor {
    fn name(&self) -> &'static str {
        "pdf"
    }

    #[cfg(feature = "pdf")]
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractFailure> {
        use pdf_extract::extract_text_from_mem;

        extract_text_from_mem(bytes).map_err(|e| ExtractFailure::Pdf(e.to_string()))
    }

    #[cfg(not(feature = "pdf"))]
    fn extract(&self, _bytes: &[u8]) -> Result<String, ExtractFailure> {
        Err(ExtractFailure::Disabled("built without the `pdf` feature"))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn read_entry<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<String, ExtractFailure> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Err(ExtractFailure::MissingEntry(name.to_string())),
        Err(e) => return Err(e.into()),
    };
    let mut xml = String::new();
    entry.read_to_string(&mut xml)?;
    Ok(xml)
}

/// Decode the predefined XML entities and numeric character references.
fn unescape_xml(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let Some(semi) = tail.find(';') else {
            out.push_str(tail);
            return out;
        };
        let entity = &tail[1..semi];
        let decoded = match entity {
            "lt" => Some('<'),
            "gt" => Some('>'),
            "amp" => Some('&'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn zip_with(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buf);
            for (name, body) in entries {
                writer.start_file(*name, SimpleFileOptions::default()).unwrap();
                writer.write_all(body.as_bytes()).unwrap();
            }
            writer.finish().unwrap();
        }
        buf.into_inner()
    }

    #[test]
    fn test_plain_text_strips_bom() {
        let text = PlainTextExtractor.extract("\u{feff}hello".as_bytes()).unwrap();
        assert_eq!(text, "hello");
    }

    #[test]
    fn test_plain_text_rejects_invalid_utf8() {
        let err = PlainTextExtractor.extract(&[0xff, 0xfe, 0x00]).unwrap_err();
        assert!(matches!(err, ExtractFailure::Utf8(_)));
    }

    #[test]
    fn test_docx_paragraphs() {
        let xml = r#"<w:document><w:body>
            <w:p><w:r><w:t>Reset the </w:t></w:r><w:r><w:t xml:space="preserve">SFTP password</w:t></w:r></w:p>
            <w:p><w:pPr/></w:p>
            <w:p w:rsidR="00A1"><w:r><w:t>Ask the JO &amp; CC them</w:t></w:r></w:p>
        </w:body></w:document>"#;
        let bytes = zip_with(&[("word/document.xml", xml)]);
        let text = DocxExtractor.extract(&bytes).unwrap();
        assert_eq!(text, "Reset the SFTP password\nAsk the JO & CC them");
    }

    #[test]
    fn test_docx_missing_document_part() {
        let bytes = zip_with(&[("word/other.xml", "<x/>")]);
        let err = DocxExtractor.extract(&bytes).unwrap_err();
        assert!(matches!(err, ExtractFailure::MissingEntry(name) if name == "word/document.xml"));
    }

    #[test]
    fn test_docx_not_a_zip() {
        let err = DocxExtractor.extract(b"plain bytes").unwrap_err();
        assert!(matches!(err, ExtractFailure::Archive(_)));
    }

    #[test]
    fn test_xlsx_rows_across_sheets() {
        let shared = r#"<sst><si><t>Partner</t></si><si><t>Protocol</t></si><si><r><t>AB</t></r><r><t>C</t></r></si></sst>"#;
        let sheet1 = r#"<worksheet><sheetData>
            <row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c></row>
            <row r="2"><c r="A2" t="s"><v>2</v></c><c r="B2" t="inlineStr"><is><t>SFTP</t></is></c><c r="C2"/></row>
            <row r="3"/>
        </sheetData></worksheet>"#;
        let sheet2 = r#"<worksheet><sheetData><row r="1"><c r="A1"><v>550</v></c></row></sheetData></worksheet>"#;
        let bytes = zip_with(&[
            ("xl/sharedStrings.xml", shared),
            ("xl/worksheets/sheet2.xml", sheet2),
            ("xl/worksheets/sheet1.xml", sheet1),
        ]);
        let text = XlsxExtractor.extract(&bytes).unwrap();
        assert_eq!(text, "Partner | Protocol\nABC | SFTP\n550");
    }

    #[test]
    fn test_unescape_xml() {
        assert_eq!(unescape_xml("a &lt;b&gt; &#65;&#x42; &unknown; &"), "a <b> AB &unknown; &");
    }

    #[test]
    fn test_registry_dispatch() {
        let registry = ExtractorRegistry::default();
        assert!(registry.supports("guide.TXT"));
        assert!(registry.supports("sheet.xlsx"));
        assert!(!registry.supports("image.png"));
        assert!(!registry.supports("Makefile"));

        let doc = SourceDocument::new("notes.txt", b"hello world".to_vec());
        assert_eq!(registry.extract(&doc).unwrap().unwrap(), "hello world");
        assert!(registry.extract(&SourceDocument::new("a.png", vec![1])).is_none());

        let bad = SourceDocument::new("broken.docx", b"nope".to_vec());
        let err = registry.extract(&bad).unwrap().unwrap_err();
        assert_eq!(err.filename, "broken.docx");
    }

    #[test]
    fn test_pdf_garbage_is_an_error() {
        assert!(PdfExtractor.extract(b"not a pdf").is_err());
    }
}
