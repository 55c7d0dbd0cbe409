use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::result::Result as StdResult;

/// Error type for the tracker's fallible setup paths.
///
/// Interception itself never returns errors to the host program; only
/// resolving the delegate library and installing the control surface can
/// fail, and delegate resolution failure is treated as fatal by the caller.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// The delegate library could not be opened by the dynamic loader.
    LibraryOpen { library: String, reason: String },
    /// A delegate symbol was missing from the library. Tracking is
    /// meaningless without the real implementation.
    SymbolResolution { symbol: String, reason: String },
    /// The control surface (self-pipe, listener thread, signal bindings or
    /// exit hook) could not be installed.
    ControlInstall(String),
}

/// A specialized `Result` type used by this crate's setup paths.
pub type Result<T> = StdResult<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::LibraryOpen { library, reason } => {
                write!(f, "failed to open {library}: {reason}")
            }
            Error::SymbolResolution { symbol, reason } => {
                write!(f, "failed to resolve symbol {symbol}: {reason}")
            }
            Error::ControlInstall(reason) => {
                write!(f, "failed to install control surface: {reason}")
            }
        }
    }
}

impl StdError for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::ControlInstall(err.to_string())
    }
}
