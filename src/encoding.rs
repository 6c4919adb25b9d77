use encoding_rs::{Encoding, UTF_8};

/// Number of leading bytes searched for a `<meta>` charset declaration.
pub const META_PRESCAN_BYTES: usize = 1024;

/// Where the encoding of a body was determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingSource {
    ContentType,
    MetaTag,
    ByteOrderMark,
    Default,
}

#[derive(Debug, Clone)]
pub struct DecodedBody {
    pub text: String,
    pub encoding: &'static Encoding,
    pub source: EncodingSource,
}

/// Picks the body encoding: `Content-Type` charset, then a `<meta>` declaration
/// in the first [`META_PRESCAN_BYTES`], then a byte-order mark, then UTF-8.
pub fn detect_encoding(
    bytes: &[u8],
    content_type: Option<&str>,
) -> (&'static Encoding, EncodingSource) {
    if let Some(encoding) = content_type.and_then(|ct| encoding_for_label(charset_param(ct)?)) {
        return (encoding, EncodingSource::ContentType);
    }
    if let Some(encoding) = charset_from_meta(bytes) {
        return (encoding, EncodingSource::MetaTag);
    }
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return (encoding, EncodingSource::ByteOrderMark);
    }
    (UTF_8, EncodingSource::Default)
}

/// Detects the encoding and decodes, replacing malformed sequences.
pub fn decode_body(bytes: &[u8], content_type: Option<&str>) -> DecodedBody {
    let (encoding, source) = detect_encoding(bytes, content_type);
    let (text, had_errors) = encoding.decode_with_bom_removal(bytes);
    if had_errors {
        tracing::debug!(encoding = encoding.name(), "Body contained malformed sequences");
    }
    DecodedBody {
        text: text.into_owned(),
        encoding,
        source,
    }
}

fn encoding_for_label(label: &str) -> Option<&'static Encoding> {
    Encoding::for_label(label.as_bytes())
}

fn charset_from_meta(bytes: &[u8]) -> Option<&'static Encoding> {
    let head = &bytes[..bytes.len().min(META_PRESCAN_BYTES)];
    let text = String::from_utf8_lossy(head).to_ascii_lowercase();

    let mut rest = text.as_str();
    while let Some(start) = rest.find("<meta") {
        let tag = &rest[start + "<meta".len()..];
        let end = tag.find('>').unwrap_or(tag.len());
        if let Some(encoding) = charset_param(&tag[..end]).and_then(encoding_for_label) {
            // A page declaring UTF-16 in ASCII-compatible bytes is really UTF-8.
            return Some(encoding.output_encoding());
        }
        rest = &tag[end..];
    }
    None
}

/// Extracts the value of a `charset=` parameter from a header value or the
/// inside of a `<meta ...>` tag.
fn charset_param(s: &str) -> Option<&str> {
    let lower = s.to_ascii_lowercase();
    let idx = lower.find("charset")?;
    let after = s[idx + "charset".len()..].trim_start();
    let after = after.strip_prefix('=')?.trim_start();
    let after = after.trim_start_matches(['"', '\'']);
    let end = after
        .find(|c: char| matches!(c, '"' | '\'' | ';' | '/' | '>') || c.is_whitespace())
        .unwrap_or(after.len());
    let label = &after[..end];
    (!label.is_empty()).then_some(label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::{EUC_JP, SHIFT_JIS, UTF_16LE, WINDOWS_1252};

    #[test]
    fn header_charset_wins() {
        let body = b"<meta charset=\"euc-jp\"><title>x</title>";
        let (encoding, source) = detect_encoding(body, Some("text/html; charset=Shift_JIS"));
        assert_eq!(encoding, SHIFT_JIS);
        assert_eq!(source, EncodingSource::ContentType);
    }

    #[test]
    fn meta_charset_is_used_without_header_charset() {
        let body = b"<html><head><meta charset='euc-jp'></head></html>";
        let (encoding, source) = detect_encoding(body, Some("text/html"));
        assert_eq!(encoding, EUC_JP);
        assert_eq!(source, EncodingSource::MetaTag);
    }

    #[test]
    fn meta_http_equiv_content_type() {
        let body = br#"<META HTTP-EQUIV="Content-Type" CONTENT="text/html; charset=windows-1252">"#;
        let (encoding, source) = detect_encoding(body, None);
        assert_eq!(encoding, WINDOWS_1252);
        assert_eq!(source, EncodingSource::MetaTag);
    }

    #[test]
    fn meta_beyond_prescan_window_is_ignored() {
        let mut body = vec![b' '; META_PRESCAN_BYTES];
        body.extend_from_slice(b"<meta charset=\"shift_jis\">");
        let (encoding, source) = detect_encoding(&body, None);
        assert_eq!(encoding, UTF_8);
        assert_eq!(source, EncodingSource::Default);
    }

    #[test]
    fn bom_is_used_after_declarations() {
        let body = [0xFF, 0xFE, b'h', 0x00, b'i', 0x00];
        let (encoding, source) = detect_encoding(&body, None);
        assert_eq!(encoding, UTF_16LE);
        assert_eq!(source, EncodingSource::ByteOrderMark);
        assert_eq!(decode_body(&body, None).text, "hi");
    }

    #[test]
    fn unknown_label_falls_through() {
        let (encoding, source) = detect_encoding(b"plain", Some("text/html; charset=bogus"));
        assert_eq!(encoding, UTF_8);
        assert_eq!(source, EncodingSource::Default);
    }

    #[test]
    fn decodes_shift_jis_body() {
        let (bytes, _, _) = SHIFT_JIS.encode("<title>日本語のページ</title>");
        let decoded = decode_body(&bytes, Some("text/html; charset=shift_jis"));
        assert_eq!(decoded.text, "<title>日本語のページ</title>");
    }
}
