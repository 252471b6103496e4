//! Codec errors

/// Errors raised while decoding or encoding terms
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EtfError {
    #[error("truncated input: needed {needed} bytes, {remaining} remaining")]
    TruncatedInput { needed: usize, remaining: usize },

    #[error("unknown term tag {0}")]
    UnknownTag(u8),

    #[error("bad format version {0}, expected 131")]
    BadVersion(u8),

    #[error("big integer with {0} digits does not fit in 64 bits")]
    BigIntTooLarge(u8),

    #[error("float is not finite")]
    NonFiniteFloat,

    #[error("{0} trailing bytes after term")]
    TrailingBytes(usize),

    #[error("terms nested deeper than {0} levels")]
    NestingTooDeep(usize),

    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// Result alias for codec operations
pub type EtfResult<T> = Result<T, EtfError>;
