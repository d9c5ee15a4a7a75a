use crate::error::Error;

/// Block compressor applied to a finished archive. The whole buffer goes in,
/// the compressed bytes are written verbatim to the artifact.
pub trait Compressor: Send + Sync {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, Error>;

    /// Extension of the artifact, without the dot.
    fn extension(&self) -> &str;
}

/// Raw snappy block format.
#[derive(Debug, Default, Clone, Copy)]
pub struct SnappyCompressor;

impl Compressor for SnappyCompressor {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        snap::raw::Encoder::new()
            .compress_vec(data)
            .map_err(|e| Error::Compress(e.to_string()))
    }

    fn extension(&self) -> &str {
        "snappy"
    }
}
