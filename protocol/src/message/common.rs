//! Framing shared by client and server messages.
//!
//! Both directions carry the same shape on the wire: `key=value` lines joined
//! with CRLF, ending in an empty line, the whole thing base64url encoded
//! without padding.

use std::collections::HashMap;

use super::error::CodecError;
use crate::crypto::{decode_b64, encode_b64};

const LINE_SEPARATOR: &str = "\r\n";

/// Decoded `key=value` pairs of one message.
pub(crate) type Fields = HashMap<String, String>;

/// Joins `key=value` lines with CRLF, appends the trailing empty line and
/// base64url encodes the result.
pub(crate) fn encode_fields<'a>(fields: impl IntoIterator<Item = (&'a str, String)>) -> String {
    let mut plaintext = String::new();
    for (key, value) in fields {
        plaintext.push_str(key);
        plaintext.push('=');
        plaintext.push_str(&value);
        plaintext.push_str(LINE_SEPARATOR);
    }
    encode_b64(plaintext.as_bytes())
}

/// Decodes a base64url message into its fields.
///
/// Lines are split on LF so both CRLF and bare LF clients are accepted; keys
/// and values are whitespace-trimmed, which also drops the CR. Blank lines
/// are skipped. Each line is split once, on the first `=`, so values may
/// themselves contain `=` (as `qry=/sqrl?nut=...` does).
pub(crate) fn decode_fields(raw: &str) -> Result<Fields, CodecError> {
    if raw.is_empty() {
        return Err(CodecError::EmptyInput);
    }

    let bytes = decode_b64(raw)?;
    let plaintext = String::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)?;

    let mut fields = Fields::new();
    for line in plaintext.split('\n') {
        if line.trim().is_empty() {
            continue;
        }

        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| CodecError::MalformedField(line.trim().to_string()))?;
        let key = key.trim().to_string();
        if fields.contains_key(&key) {
            return Err(CodecError::DuplicateKey(key));
        }
        fields.insert(key, value.trim().to_string());
    }

    Ok(fields)
}

/// Removes a field that must be present and non-empty.
pub(crate) fn take_required(fields: &mut Fields, key: &'static str) -> Result<String, CodecError> {
    fields
        .remove(key)
        .filter(|value| !value.is_empty())
        .ok_or(CodecError::MissingRequiredParameter(key))
}

/// Splits the `ver` field on commas.
pub(crate) fn parse_versions(raw: &str) -> Result<Vec<String>, CodecError> {
    if raw.is_empty() {
        return Err(CodecError::MissingRequiredParameter("ver"));
    }
    Ok(raw.split(',').map(str::to_string).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b64(s: &str) -> String {
        encode_b64(s.as_bytes())
    }

    #[test]
    fn test_encode_appends_trailing_crlf() {
        let encoded = encode_fields([("ver", "1".to_string()), ("cmd", "query".to_string())]);
        let decoded = decode_b64(&encoded).unwrap();
        assert_eq!(decoded, b"ver=1\r\ncmd=query\r\n");
    }

    #[test]
    fn test_decode_accepts_bare_lf_and_crlf() {
        let lf = decode_fields(&b64("ver=1\ncmd=query\n")).unwrap();
        let crlf = decode_fields(&b64("ver=1\r\ncmd=query\r\n")).unwrap();
        assert_eq!(lf, crlf);
        assert_eq!(lf["cmd"], "query");
    }

    #[test]
    fn test_decode_splits_on_first_equals_only() {
        let fields = decode_fields(&b64("qry=/sqrl?nut=abc\r\n")).unwrap();
        assert_eq!(fields["qry"], "/sqrl?nut=abc");
    }

    #[test]
    fn test_decode_rejects_empty_input() {
        assert_eq!(decode_fields(""), Err(CodecError::EmptyInput));
    }

    #[test]
    fn test_decode_rejects_bad_base64() {
        assert!(matches!(
            decode_fields("notbase64!!@!@£$"),
            Err(CodecError::Base64(_))
        ));
    }

    #[test]
    fn test_decode_rejects_field_without_equals() {
        assert_eq!(
            decode_fields(&b64("ver=1\r\ngarbage\r\n")),
            Err(CodecError::MalformedField("garbage".into()))
        );
    }

    #[test]
    fn test_decode_rejects_duplicate_keys() {
        assert_eq!(
            decode_fields(&b64("ver=1\nver=1\n")),
            Err(CodecError::DuplicateKey("ver".into()))
        );
    }

    #[test]
    fn test_decode_rejects_non_utf8() {
        let encoded = encode_b64(&[0x76, 0x3D, 0xFF, 0xFE]);
        assert_eq!(decode_fields(&encoded), Err(CodecError::InvalidUtf8));
    }

    #[test]
    fn test_parse_versions() {
        assert_eq!(parse_versions("1").unwrap(), vec!["1"]);
        assert_eq!(parse_versions("1,2").unwrap(), vec!["1", "2"]);
        assert!(parse_versions("").is_err());
    }
}
