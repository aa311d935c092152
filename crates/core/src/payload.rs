use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Encode raw image bytes as a self-contained `data:<mime>;base64,...` URI.
pub fn encode_data_uri(mime: &str, bytes: &[u8]) -> String {
    let mime = if mime.is_empty() { "application/octet-stream" } else { mime };
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

/// Split a base64 data URI into `(mime, bytes)`.
pub fn decode_data_uri(uri: &str) -> Option<(String, Vec<u8>)> {
    let rest = uri.strip_prefix("data:")?;
    let (header, data) = rest.split_once(',')?;
    let mime = header.strip_suffix(";base64")?;
    let bytes = STANDARD.decode(data).ok()?;
    Some((mime.to_string(), bytes))
}

/// Guess a MIME type from a file extension (case-insensitive).
pub fn mime_for_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "tif" | "tiff" => "image/tiff",
        "bmp" => "image/bmp",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_known_value() {
        assert_eq!(
            encode_data_uri("image/png", b"hello"),
            "data:image/png;base64,aGVsbG8="
        );
    }

    #[test]
    fn test_decode_restores_bytes_and_mime() {
        let uri = encode_data_uri("image/jpeg", &[0xff, 0xd8, 0xff, 0x00]);
        let (mime, bytes) = decode_data_uri(&uri).unwrap();
        assert_eq!(mime, "image/jpeg");
        assert_eq!(bytes, vec![0xff, 0xd8, 0xff, 0x00]);
    }

    #[test]
    fn test_empty_mime_falls_back() {
        assert!(encode_data_uri("", b"x").starts_with("data:application/octet-stream;base64,"));
    }

    #[test]
    fn test_decode_rejects_non_data_uri() {
        assert!(decode_data_uri("https://example.com/a.png").is_none());
        assert!(decode_data_uri("data:image/png,plain").is_none());
        assert!(decode_data_uri("data:image/png;base64,***").is_none());
    }

    #[test]
    fn test_mime_for_extension() {
        assert_eq!(mime_for_extension("JPG"), "image/jpeg");
        assert_eq!(mime_for_extension("webp"), "image/webp");
        assert_eq!(mime_for_extension("cr2"), "application/octet-stream");
    }
}
