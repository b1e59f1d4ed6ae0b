use thiserror::Error;

/// Failures specific to point cloud compression. Codec functions return `anyhow::Result`; the reason for a failure
/// can be recovered with `err.downcast_ref::<CompressionError>()`. I/O errors other than a premature end of the
/// stream are passed on as `std::io::Error`
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CompressionError {
    #[error("Invalid compression configuration: {0}")]
    InvalidConfig(String),
    #[error("Invalid frame header: {0}")]
    InvalidHeader(String),
    #[error("Compressed data ended while reading {0}")]
    Truncated(&'static str),
    #[error("Compressed data is corrupt: {0}")]
    CorruptStream(String),
    #[error("Frame {frame_id} is a P-frame, but there is no matching reference frame to decode it against")]
    MissingReferenceFrame { frame_id: u32 },
}

/// Maps an unexpected end of input to [CompressionError::Truncated] and passes every other I/O error on
pub(crate) fn map_read_error(err: std::io::Error, what: &'static str) -> anyhow::Error {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        CompressionError::Truncated(what).into()
    } else {
        err.into()
    }
}
