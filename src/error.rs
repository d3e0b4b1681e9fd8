//! Error types shared by every layer of the stack

/// Packet boundary faults detected on a packetized (or continuous) stream
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FramingError {
    #[error("start of packet while a packet is still open")]
    StartWithoutEnd,

    #[error("unit without start of packet outside of a packet")]
    MissingStart,

    #[error("packet ended without an end marker")]
    MissingEnd,

    #[error("packet markers on a continuous stream")]
    MarkersOnContinuous,
}

/// Ready/valid handshake faults
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeError {
    #[error("producer retracted an offered unit before it was accepted")]
    Retracted,

    #[error("producer changed an offered unit before it was accepted")]
    Changed,
}

/// Stream protocol fault, delivered alongside the unit it concerns
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkFault {
    #[error(transparent)]
    Framing(#[from] FramingError),

    #[error(transparent)]
    Handshake(#[from] HandshakeError),
}

impl LinkFault {
    /// Error reported to the caller of the step, tagged with the link name
    pub fn into_error(self, link: impl Into<String>) -> SataError {
        let link = link.into();
        match self {
            LinkFault::Framing(error) => SataError::Framing { link, error },
            LinkFault::Handshake(error) => SataError::Handshake { link, error },
        }
    }
}

/// SATA stack error
#[derive(Debug, thiserror::Error)]
pub enum SataError {
    #[error("value {value:#x} does not fit field '{field}' ({width} bits)")]
    FieldOverflow {
        field: String,
        value: u64,
        width: u32,
    },

    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("duplicate field '{0}'")]
    DuplicateField(String),

    #[error("field '{0}' overlaps another field")]
    OverlappingField(String),

    #[error("field '{field}' lies outside the layout ({detail})")]
    FieldOutOfRange { field: String, detail: String },

    #[error("invalid data width {0}")]
    InvalidWidth(u32),

    #[error("FIS of {dwords} dwords exceeds the {max} dword maximum")]
    FisTooLarge { dwords: usize, max: usize },

    #[error("FIS truncated: {got} dwords, {need} required")]
    FisTruncated { got: usize, need: usize },

    #[error("unknown FIS type {0:#04x}")]
    UnknownFisType(u8),

    #[error("FIS type mismatch: expected {expected:#04x}, found {found:#04x}")]
    FisTypeMismatch { expected: u8, found: u8 },

    #[error("unknown ATA command {0:#04x}")]
    UnknownCommand(u8),

    #[error("command selectors {0:#05b} do not name exactly one command")]
    InvalidSelector(u8),

    #[error("framing error on '{link}': {error}")]
    Framing { link: String, error: FramingError },

    #[error("handshake error on '{link}': {error}")]
    Handshake { link: String, error: HandshakeError },

    #[error("endpoint descriptors do not match: {0}")]
    DescriptorMismatch(String),

    #[error("unknown endpoint '{0}'")]
    UnknownEndpoint(String),

    #[error("endpoint '{0}' is already connected")]
    AlreadyConnected(String),

    #[error("endpoint '{endpoint}' is not a {expected}")]
    WrongDirection { endpoint: String, expected: &'static str },

    #[error("no stage with index {0}")]
    UnknownStage(usize),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SataError>;
