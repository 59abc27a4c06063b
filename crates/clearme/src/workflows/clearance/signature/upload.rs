use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

/// Largest accepted signature image (decoded), 5 MiB.
pub const MAX_SIGNATURE_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("signature image must be a base64 data URI")]
    Malformed,
    #[error("unsupported signature media type '{0}', expected an image")]
    UnsupportedType(String),
    #[error("signature image is {size} bytes, limit is {limit} bytes")]
    TooLarge { size: usize, limit: usize },
    #[error("signature image is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),
}

#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub media_type: mime::Mime,
    pub bytes: Vec<u8>,
}

/// Decode a `data:image/<subtype>;base64,<payload>` URI, enforcing type and size.
pub fn decode_data_uri(raw: &str) -> Result<DecodedImage, UploadError> {
    let rest = raw.trim().strip_prefix("data:").ok_or(UploadError::Malformed)?;
    let (header, payload) = rest.split_once(',').ok_or(UploadError::Malformed)?;

    let mut parts = header.split(';');
    let media = parts.next().unwrap_or_default().trim();
    if !parts.any(|part| part.trim().eq_ignore_ascii_case("base64")) {
        return Err(UploadError::Malformed);
    }
    let media_type = check_media_type(media)?;

    let payload = payload.trim();
    // Reject before decoding when the encoded length already rules the image out.
    let estimated = payload.len() / 4 * 3;
    if estimated > MAX_SIGNATURE_BYTES + 2 {
        return Err(UploadError::TooLarge {
            size: estimated,
            limit: MAX_SIGNATURE_BYTES,
        });
    }

    let bytes = STANDARD.decode(payload)?;
    check_size(bytes.len())?;
    Ok(DecodedImage { media_type, bytes })
}

pub fn check_media_type(raw: &str) -> Result<mime::Mime, UploadError> {
    let parsed: mime::Mime = raw
        .parse()
        .map_err(|_| UploadError::UnsupportedType(raw.to_string()))?;
    if parsed.type_() != mime::IMAGE {
        return Err(UploadError::UnsupportedType(raw.to_string()));
    }
    Ok(parsed)
}

pub fn check_size(size: usize) -> Result<(), UploadError> {
    if size > MAX_SIGNATURE_BYTES {
        return Err(UploadError::TooLarge {
            size,
            limit: MAX_SIGNATURE_BYTES,
        });
    }
    Ok(())
}

/// Build a data URI from raw bytes, used when an image is loaded from disk.
pub fn encode_data_uri(media_type: &mime::Mime, bytes: &[u8]) -> Result<String, UploadError> {
    if media_type.type_() != mime::IMAGE {
        return Err(UploadError::UnsupportedType(media_type.to_string()));
    }
    check_size(bytes.len())?;
    Ok(format!(
        "data:{};base64,{}",
        media_type.essence_str(),
        STANDARD.encode(bytes)
    ))
}
