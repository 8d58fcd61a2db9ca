use core::fmt;

/// The error type for decoding, encoding and declaring packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Error {
    /// An input buffer was shorter than the layout requires.
    ///
    /// The buffer may be shorter than the fixed part of a header or a variable length field may
    /// claim more bytes than remain. Decoding the outermost layer surfaces this error, for inner
    /// layers it only means the bytes stay undecoded.
    Truncated,

    /// The output would grow beyond the configured hard limit.
    CapacityExceeded,

    /// A registry already maps the discriminant to a different protocol.
    ConflictingRegistration,

    /// A value does not fit the field it was meant for.
    ///
    /// Integers larger than the field width, byte strings of the wrong length for a fixed field,
    /// or a length field that disagrees with the data it describes.
    InvalidFieldValue,

    /// The schema declares no field or bit field of the requested name.
    UnknownField,

    /// An incoming packet was recognized but was self-contradictory.
    ///
    /// Example: a header length smaller than the fixed part of the header.
    Malformed,

    /// A checksum can not be checked from a single layer.
    ///
    /// It includes a pseudo-header taken from enclosing layers. Verify the chain from its
    /// outermost layer instead.
    Unverifiable,

    /// A protocol declaration is inconsistent.
    ///
    /// See [`Schema::validate`] for the rules.
    ///
    /// [`Schema::validate`]: ../schema/struct.Schema.html#method.validate
    InvalidSchema,
}

/// The result type for the codec.
pub type Result<T> = core::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Truncated               => write!(f, "truncated packet"),
            Error::CapacityExceeded        => write!(f, "output capacity exceeded"),
            Error::ConflictingRegistration => write!(f, "conflicting protocol registration"),
            Error::InvalidFieldValue       => write!(f, "invalid field value"),
            Error::UnknownField            => write!(f, "unknown field"),
            Error::Malformed               => write!(f, "malformed packet"),
            Error::Unverifiable            => write!(f, "checksum needs enclosing layers"),
            Error::InvalidSchema           => write!(f, "invalid schema"),
        }
    }
}

impl std::error::Error for Error { }
