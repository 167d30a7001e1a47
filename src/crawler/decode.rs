//! Charset handling for fetched payloads
//!
//! Decoding order: explicit charset (with BOM override) → UTF-8 → chardetng
//! guess. A declared charset that is unknown or does not match the bytes is a
//! decode failure; nothing is ever returned with replacement characters.

use crate::ParseError;
use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_8};

/// How far into a document the meta charset prescan looks
const META_PRESCAN_BYTES: usize = 4096;

/// Decoded text and the encoding that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub text: String,
    pub encoding: &'static str,
}

/// Decodes `bytes` using `charset` when given, otherwise UTF-8 with detection fallback
pub fn decode_bytes(bytes: &[u8], charset: Option<&str>) -> Result<Decoded, ParseError> {
    match charset {
        Some(label) => {
            let encoding = Encoding::for_label(label.trim().as_bytes()).ok_or_else(|| {
                ParseError::Decode {
                    charset: label.to_string(),
                    message: "unsupported charset".to_string(),
                }
            })?;
            decode_with(bytes, encoding)
        }
        None => decode_default(bytes),
    }
}

fn decode_default(bytes: &[u8]) -> Result<Decoded, ParseError> {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return decode_with(bytes, encoding);
    }

    if let Ok(decoded) = decode_with(bytes, UTF_8) {
        return Ok(decoded);
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let guessed = detector.guess(None, true);
    tracing::debug!("Payload is not UTF-8, detected {}", guessed.name());
    decode_with(bytes, guessed)
}

fn decode_with(bytes: &[u8], encoding: &'static Encoding) -> Result<Decoded, ParseError> {
    // `decode` honours a BOM over the requested encoding
    let (text, used, had_errors) = encoding.decode(bytes);
    if had_errors {
        return Err(ParseError::Decode {
            charset: used.name().to_string(),
            message: "malformed byte sequence".to_string(),
        });
    }
    Ok(Decoded {
        text: text.into_owned(),
        encoding: used.name(),
    })
}

/// Extracts the `charset` parameter from a Content-Type value
pub fn charset_from_content_type(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .skip(1)
        .filter_map(|param| {
            let (name, value) = param.split_once('=')?;
            if !name.trim().eq_ignore_ascii_case("charset") {
                return None;
            }
            let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
            (!value.is_empty()).then(|| value.to_string())
        })
        .next()
}

/// Finds a charset declared by the document's own `<meta>` tags
///
/// Handles both `<meta charset="...">` and
/// `<meta http-equiv="Content-Type" content="text/html; charset=...">`.
/// Only labels that `encoding_rs` knows are returned.
pub fn sniff_meta_charset(bytes: &[u8]) -> Option<String> {
    let head = &bytes[..bytes.len().min(META_PRESCAN_BYTES)];
    let lower = head.to_ascii_lowercase();

    let mut offset = 0;
    while let Some(pos) = find(&lower[offset..], b"<meta") {
        let tag_start = offset + pos;
        let tag_end = find(&lower[tag_start..], b">")
            .map(|end| tag_start + end)
            .unwrap_or(lower.len());
        let tag = &lower[tag_start..tag_end];

        if let Some(label) = charset_in_tag(tag) {
            if Encoding::for_label(label.as_bytes()).is_some() {
                return Some(label);
            }
        }

        offset = tag_end;
    }

    None
}

fn charset_in_tag(tag: &[u8]) -> Option<String> {
    let pos = find(tag, b"charset")?;
    let rest = &tag[pos + b"charset".len()..];
    let rest = trim_ascii_start(rest).strip_prefix(b"=")?;
    let rest = trim_ascii_start(rest);
    let rest = rest
        .strip_prefix(b"\"")
        .or_else(|| rest.strip_prefix(b"'"))
        .unwrap_or(rest);

    let end = rest
        .iter()
        .position(|b| matches!(b, b'"' | b'\'' | b';' | b'/' | b'>') || b.is_ascii_whitespace())
        .unwrap_or(rest.len());
    let label = std::str::from_utf8(&rest[..end]).ok()?;

    (!label.is_empty()).then(|| label.to_string())
}

fn trim_ascii_start(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    &bytes[start..]
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
