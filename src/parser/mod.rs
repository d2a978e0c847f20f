//! Format detection, byte decoding and parse dispatch.
//!
//! Each format parser turns raw text into the shared
//! [`ParsedDocument`](crate::model::ParsedDocument) tuple:
//! generic node tree, flattened field settings, detected loops and
//! detected relations.

pub mod csv;
pub mod json;
pub mod xml;

use crate::error::{ParseError, ParseResult};
use crate::model::{DataFormat, ParsedDocument};

/// Detect the document format from the file extension, else by content
/// sniffing: leading `{`/`[` means JSON, leading `<` means XML, delimiter
/// characters mean CSV, default XML.
pub fn detect_format(file_name: &str, text: &str) -> DataFormat {
    let lower = file_name.to_lowercase();
    if lower.ends_with(".json") {
        return DataFormat::Json;
    }
    if lower.ends_with(".csv") {
        return DataFormat::Csv;
    }
    if lower.ends_with(".xml") {
        return DataFormat::Xml;
    }
    let trimmed = text.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return DataFormat::Json;
    }
    if trimmed.starts_with('<') {
        return DataFormat::Xml;
    }
    if trimmed.contains(';') || trimmed.contains(',') || trimmed.contains('\t') {
        return DataFormat::Csv;
    }
    DataFormat::Xml
}

/// Decode uploaded bytes to text, auto-detecting the encoding, then strip
/// BOM and NUL characters so downstream parsers see clean input.
pub fn decode_bytes(bytes: &[u8]) -> ParseResult<String> {
    let detected = chardet::detect(bytes).0;
    let text = match detected.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => String::from_utf8_lossy(bytes).to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => {
            encoding_rs::ISO_8859_15.decode(bytes).0.to_string()
        }
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.to_string(),
        other => encoding_rs::Encoding::for_label(other.as_bytes())
            .map(|enc| enc.decode(bytes).0.to_string())
            .ok_or_else(|| ParseError::Encoding(format!("Unsupported encoding: {}", other)))?,
    };
    Ok(normalize_text(&text))
}

/// Strip BOM and NUL characters.
pub fn normalize_text(text: &str) -> String {
    text.replace('\u{FEFF}', "").replace('\u{0000}', "")
}

/// Parse a document in the given format. For CSV, `delimiter` forces the
/// delimiter instead of auto-detecting it.
pub fn parse_document(
    text: &str,
    format: DataFormat,
    delimiter: Option<char>,
) -> ParseResult<ParsedDocument> {
    match format {
        DataFormat::Xml => xml::parse(text),
        DataFormat::Json => json::parse(text),
        DataFormat::Csv => csv::parse(text, delimiter),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_format_by_extension() {
        assert_eq!(detect_format("data.JSON", ""), DataFormat::Json);
        assert_eq!(detect_format("data.csv", ""), DataFormat::Csv);
        assert_eq!(detect_format("data.xml", ""), DataFormat::Xml);
    }

    #[test]
    fn test_detect_format_by_content() {
        assert_eq!(detect_format("upload", "  {\"a\": 1}"), DataFormat::Json);
        assert_eq!(detect_format("upload", "[1, 2]"), DataFormat::Json);
        assert_eq!(detect_format("upload", "<root/>"), DataFormat::Xml);
        assert_eq!(detect_format("upload", "a;b\n1;2"), DataFormat::Csv);
        assert_eq!(detect_format("upload", "plain"), DataFormat::Xml);
    }

    #[test]
    fn test_decode_utf8_strips_bom() {
        let bytes = "\u{FEFF}<root/>".as_bytes();
        let text = decode_bytes(bytes).unwrap();
        assert_eq!(text, "<root/>");
    }

    #[test]
    fn test_decode_latin1() {
        // "Société" in ISO-8859-1
        let bytes: &[u8] = &[0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9];
        let text = decode_bytes(bytes).unwrap();
        assert!(text.starts_with("Soci"));
    }
}
