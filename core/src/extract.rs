use crate::error::ExtractionError;

/// Turns uploaded bytes into plain text. Format-specific extractors (PDF, OCR)
/// plug in here; the engine only sees the resulting text.
pub trait TextExtractor: Send + Sync {
    fn extract_text(&self, bytes: &[u8], content_type_hint: Option<&str>) -> Result<String, ExtractionError>;
}

const TEXT_EXTENSIONS: &[&str] = &["txt", "text", "md", "csv", "log"];

/// Handles `text/*` content types and plain-text file names; everything else is unsupported.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextExtractor;

impl PlainTextExtractor {
    fn is_text(hint: &str) -> bool {
        let hint = hint.trim().to_ascii_lowercase();
        let mime = hint.split(';').next().unwrap_or("").trim();
        if mime.starts_with("text/") || mime == "application/json" {
            return true;
        }
        hint.rsplit_once('.')
            .map(|(_, ext)| TEXT_EXTENSIONS.contains(&ext))
            .unwrap_or(false)
    }
}

impl TextExtractor for PlainTextExtractor {
    fn extract_text(&self, bytes: &[u8], content_type_hint: Option<&str>) -> Result<String, ExtractionError> {
        match content_type_hint {
            Some(hint) if !Self::is_text(hint) => Err(ExtractionError::Unsupported(hint.to_string())),
            _ => {
                if bytes.contains(&0) {
                    return Err(ExtractionError::Decode("binary content".into()));
                }
                let text = String::from_utf8_lossy(bytes).into_owned();
                if text.trim().is_empty() {
                    return Err(ExtractionError::Empty);
                }
                Ok(text)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_text_by_mime_or_extension() {
        let x = PlainTextExtractor;
        assert_eq!(x.extract_text(b"rib", Some("text/plain; charset=utf-8")).unwrap(), "rib");
        assert_eq!(x.extract_text(b"rib", Some("report.TXT")).unwrap(), "rib");
        assert_eq!(x.extract_text(b"rib", None).unwrap(), "rib");
    }

    #[test]
    fn pdf_is_unsupported() {
        let x = PlainTextExtractor;
        assert!(matches!(x.extract_text(b"%PDF-1.4", Some("application/pdf")), Err(ExtractionError::Unsupported(_))));
        assert!(matches!(x.extract_text(b"%PDF-1.4", Some("scan.pdf")), Err(ExtractionError::Unsupported(_))));
    }

    #[test]
    fn empty_and_binary_fail() {
        let x = PlainTextExtractor;
        assert!(matches!(x.extract_text(b"  \n", None), Err(ExtractionError::Empty)));
        assert!(matches!(x.extract_text(&[0x89, 0x00, 0x01], None), Err(ExtractionError::Decode(_))));
    }

    #[test]
    fn invalid_utf8_is_replaced_not_rejected() {
        let text = PlainTextExtractor.extract_text(&[b'o', b'k', 0xff], None).unwrap();
        assert!(text.starts_with("ok"));
    }
}
