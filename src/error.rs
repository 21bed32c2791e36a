// BRIGHTNESSD ERROR TYPES
// ONE TYPED ENUM FOR THE WHOLE SERVICE. REMOTE CALLERS SEE ONLY THE
// STABLE NEGATIVE CODE -- NOTHING ELSE CROSSES THE RPC BOUNDARY.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// No backlight device is bound to the controller.
    #[error("no backlight device bound")]
    NotAvailable,

    /// Operation requires a mode the controller is not in
    /// (user point while not in auto mode).
    #[error("not supported in the current mode")]
    NotSupported,

    #[error("device i/o failed: {0}")]
    IoFailure(String),

    #[error("out of memory")]
    OutOfMemory,

    /// Curve construction rejected its control points.
    #[error("invalid curve input: {0}")]
    InvalidInput(&'static str),

    /// The service loop is gone; no further commands are accepted.
    #[error("service stopped")]
    ServiceStopped,
}

impl Error {
    // ERRNO-STYLE CODES, STABLE ACROSS RELEASES
    pub fn code(&self) -> i32 {
        match self {
            Error::InvalidArgument(_) => -22,
            Error::NotAvailable => -19,
            Error::NotSupported => -38,
            Error::IoFailure(_) => -5,
            Error::OutOfMemory => -12,
            Error::InvalidInput(_) => -33,
            Error::ServiceStopped => -108,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::IoFailure(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable_and_negative() {
        assert_eq!(Error::InvalidArgument("x").code(), -22);
        assert_eq!(Error::NotAvailable.code(), -19);
        assert_eq!(Error::NotSupported.code(), -38);
        assert_eq!(Error::IoFailure(String::new()).code(), -5);
        assert_eq!(Error::OutOfMemory.code(), -12);
        assert_eq!(Error::InvalidInput("x").code(), -33);
        assert_eq!(Error::ServiceStopped.code(), -108);
    }

    #[test]
    fn io_error_maps_to_io_failure() {
        let err: Error = io::Error::new(io::ErrorKind::Other, "nope").into();
        assert_eq!(err.code(), -5);
    }
}
