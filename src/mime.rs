//! Header word and transfer-encoding decoding
//!
//! Thin helpers over `mailparse` for the two decoding steps this crate
//! needs: RFC 2047 encoded words in filenames and subjects, and the
//! Content-Transfer-Encoding of a fetched body section.

use crate::errors::{AppError, AppResult};
use crate::structure::TransferEncoding;

/// Decode RFC 2047 encoded words into a display string
///
/// Values that `mailparse` cannot interpret are returned as-is.
pub fn decode_words(raw: &str) -> String {
    let line = format!("X-Value: {raw}");
    match mailparse::parse_header(line.as_bytes()) {
        Ok((header, _)) => header.get_value(),
        Err(_) => raw.to_owned(),
    }
}

/// Decode raw header bytes as reported in an IMAP envelope
pub fn decode_header_bytes(raw: &[u8]) -> String {
    decode_words(&String::from_utf8_lossy(raw))
}

/// Undo the transfer encoding of a fetched body section
///
/// Identity encodings are passed through untouched. Base64 and
/// quoted-printable go through `mailparse` by wrapping the section in a
/// minimal part header.
///
/// # Errors
///
/// - `Internal` if the section cannot be decoded
pub fn decode_transfer(encoding: &TransferEncoding, section: &[u8]) -> AppResult<Vec<u8>> {
    match encoding {
        TransferEncoding::Base64 | TransferEncoding::QuotedPrintable => {
            let mut wrapped =
                format!("Content-Transfer-Encoding: {encoding}\r\n\r\n").into_bytes();
            wrapped.extend_from_slice(section);
            let part = mailparse::parse_mail(&wrapped)
                .map_err(|e| AppError::Internal(format!("failed to parse body section: {e}")))?;
            part.get_body_raw()
                .map_err(|e| AppError::Internal(format!("failed decoding {encoding} section: {e}")))
        }
        _ => Ok(section.to_vec()),
    }
}

/// Reduce a filename to a safe single path component
///
/// Path separators, control characters and leading dots are replaced so
/// the result cannot escape the target directory.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|ch| {
            if ch.is_control() || matches!(ch, '/' | '\\' | ':' | '\0') {
                '_'
            } else {
                ch
            }
        })
        .collect();
    let trimmed = cleaned.trim().trim_start_matches('.');
    if trimmed.is_empty() {
        "attachment".to_owned()
    } else {
        trimmed.to_owned()
    }
}
