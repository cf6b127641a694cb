use thiserror::Error;

/// Errors that can occur when parsing or rewriting TIFF files
#[derive(Debug, Error)]
pub enum TiffError {
    /// I/O error while reading or writing the file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid TIFF magic bytes (not II or MM)
    #[error("Invalid TIFF magic bytes: expected 0x4949 (II) or 0x4D4D (MM), got 0x{0:04X}")]
    InvalidMagic(u16),

    /// Invalid TIFF version number
    #[error("Invalid TIFF version: expected 42, got {0}")]
    InvalidVersion(u16),

    /// BigTIFF files (version 43) are rejected; only classic TIFF is rewritable
    #[error("BigTIFF is not supported")]
    BigTiff,

    /// File is too small to contain a valid TIFF header
    #[error("File too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// Invalid IFD offset (points outside the file)
    #[error("Invalid IFD offset: {0}")]
    InvalidIfdOffset(u64),

    /// Required tag is missing from the IFD
    #[error("Missing required tag: {0}")]
    MissingTag(&'static str),

    /// Tag has unexpected type or count
    #[error("Invalid tag value for {tag}: {message}")]
    InvalidTagValue { tag: &'static str, message: String },

    /// Unknown field type in an IFD entry
    #[error("Unknown field type: {0}")]
    UnknownFieldType(u16),

    /// IFD index out of range for this file
    #[error("IFD index {0} out of range")]
    IfdOutOfRange(usize),
}

/// Errors raised by the strip codec
#[derive(Debug, Error)]
pub enum CodecError {
    /// Requested compression cannot be encoded and no fallback applies
    #[error("Unsupported compression: {0}")]
    UnsupportedCompression(u16),

    /// Predictor value not in the TIFF predictor vocabulary
    #[error("Unknown predictor: {0}")]
    UnknownPredictor(u16),

    /// Predictor cannot be applied to this sample layout
    #[error("Predictor {predictor} not applicable: {message}")]
    PredictorMismatch { predictor: u16, message: String },

    /// Raster dimensions do not match the supplied buffer
    #[error("Raster size mismatch: expected {expected} bytes, got {actual}")]
    RasterSizeMismatch { expected: usize, actual: usize },

    /// LZW encoder failure
    #[error("LZW encoding failed: {0}")]
    Lzw(String),

    /// I/O error from the underlying encoder
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while rendering a pseudonym label
#[derive(Debug, Error)]
pub enum LabelError {
    /// Barcode symbology encoder failure
    #[error("{symbology} encoding failed: {message}")]
    Barcode {
        symbology: &'static str,
        message: String,
    },

    /// Font could not be loaded or contains no usable glyphs
    #[error("Font error: {0}")]
    Font(String),

    /// Schema contains no fields
    #[error("Schema has no fields to render")]
    EmptySchema,

    /// Field placed outside the schema grid
    #[error("Field at column {col}, row {row} is outside a {cols}x{rows} grid")]
    FieldOutOfGrid {
        col: usize,
        row: usize,
        cols: usize,
        rows: usize,
    },

    /// I/O error while loading font assets
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the escrow store
#[derive(Debug, Error)]
pub enum EscrowError {
    /// Blob name does not resolve to a file in the store
    #[error("Blob not found in store: {0}")]
    NotFound(String),

    /// Decryption rejected: wrong key or tampered ciphertext
    #[error("Blob authentication failed: key is invalid or data was tampered with")]
    InvalidKey,

    /// Blob plaintext is not the expected JSON document
    #[error("Malformed blob document: {0}")]
    Malformed(#[from] serde_json::Error),

    /// I/O error while reading or writing the store
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the identity registry
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Pseudonymous ID allocation exhausted its retry budget
    #[error("Could not allocate a unique pseudonymous ID for {kind} after {attempts} attempts")]
    AllocationExhausted { kind: &'static str, attempts: u32 },

    /// Pseudonymous lookup missed during de-pseudonymization
    #[error("{kind} with pseudonymous ID {pseudo_id} is not known to the registry")]
    UnknownPseudoId {
        kind: &'static str,
        pseudo_id: String,
    },

    /// Backing storage failure (load or persist)
    #[error("Registry storage error: {0}")]
    Storage(String),
}

/// Top-level error for pseudonymization and de-pseudonymization runs
#[derive(Debug, Error)]
pub enum PseudonymError {
    /// Manifest failed structural or path validation; all findings collected
    #[error("Input manifest is invalid: {}", .0.join("; "))]
    InputInvalid(Vec<String>),

    /// Slide vendor is recognized but not handled, or the file is BigTIFF
    #[error("Slide vendor is not supported: {0}")]
    VendorUnsupported(String),

    /// No label IFD was found in the slide
    #[error("Cannot find the label image in slide {0}")]
    NoLabel(String),

    /// Restore data disagrees with the current state of the file
    #[error("Inconsistent state: {0}")]
    Inconsistent(String),

    #[error(transparent)]
    Tiff(#[from] TiffError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Label(#[from] LabelError),

    #[error(transparent)]
    Escrow(#[from] EscrowError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
