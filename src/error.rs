// SPDX-License-Identifier: MIT

//! Error type shared by the entropy source, the block cipher engine
//! and the DRBG.
//!
//! Callers of the DRBG only ever observe three outcomes: success,
//! invalid input, or a generic failure. [`Error::status`] collapses an
//! error into the integer status convention used by the C-style entry
//! points (`0`, `-2`, `-1`).
use alloc::string::{String, ToString};
use core::{
    fmt,
    fmt::{Debug, Display, Formatter},
};

/// Status returned on success.
pub const STATUS_OK: i32 = 0;
/// Status returned for any failure other than invalid input.
pub const STATUS_FAILURE: i32 = -1;
/// Status returned when the caller violated a documented precondition.
pub const STATUS_INVALID_INPUT: i32 = -2;

/// The category of an [`Error`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A caller precondition was violated. Detected before any
    /// hardware is touched.
    InvalidInput,
    /// More entropy was requested than the noise generator FIFO can
    /// ever hold.
    EntropyTooLarge,
    /// The accelerator reported a DMA fetch error.
    FetchError,
    /// The accelerator reported a DMA push error.
    PushError,
    /// Generic DRBG failure; the cause was logged where it happened.
    Failure,
    /// Failure reported by a foreign [`Entropy`](crate::entropy::Entropy)
    /// implementation.
    Other(String),
}

/// Error type for all fallible operations in this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
}

impl Error {
    /// Create a new error by wrapping an underlying entropy source
    /// error.
    ///
    /// # Example
    /// ```
    /// use cracen_drbg::error::Error;
    ///
    /// fn fill_bytes(bytes: &mut [u8]) -> Result<(), Error> {
    ///    getrandom::getrandom(bytes).map_err(Error::new)
    /// }
    /// ```
    pub fn new<E>(error: E) -> Self
    where
        E: Display + Debug,
    {
        Self {
            kind: ErrorKind::Other(error.to_string()),
        }
    }

    pub(crate) const fn invalid_input() -> Self {
        Self {
            kind: ErrorKind::InvalidInput,
        }
    }

    pub(crate) const fn failure() -> Self {
        Self {
            kind: ErrorKind::Failure,
        }
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn is_invalid_input(&self) -> bool {
        self.kind == ErrorKind::InvalidInput
    }

    /// Integer status for this error: `-2` for invalid input, `-1`
    /// for everything else.
    pub fn status(&self) -> i32 {
        match self.kind {
            ErrorKind::InvalidInput => STATUS_INVALID_INPUT,
            _ => STATUS_FAILURE,
        }
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self { kind }
    }
}

impl core::error::Error for Error {}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match &self.kind {
            ErrorKind::InvalidInput => write!(f, "invalid input"),
            ErrorKind::EntropyTooLarge => write!(f, "entropy request exceeds FIFO capacity"),
            ErrorKind::FetchError => write!(f, "cryptomaster fetch DMA error"),
            ErrorKind::PushError => write!(f, "cryptomaster push DMA error"),
            ErrorKind::Failure => write!(f, "drbg failure"),
            ErrorKind::Other(inner) => write!(f, "entropy error: {}", inner),
        }
    }
}

/// Collapse a result into the integer status convention.
///
/// ```
/// use cracen_drbg::error::{status, Error, ErrorKind, STATUS_OK};
///
/// assert_eq!(status(Ok(())), STATUS_OK);
/// assert_eq!(status(Err(Error::from(ErrorKind::InvalidInput))), -2);
/// assert_eq!(status(Err(Error::from(ErrorKind::FetchError))), -1);
/// ```
pub fn status(result: Result<(), Error>) -> i32 {
    match result {
        Ok(()) => STATUS_OK,
        Err(e) => e.status(),
    }
}
