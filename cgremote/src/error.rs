use std::path::PathBuf;

/// Raw status code returned by every Quartz entry point.
pub type CGErrorCode = i32;

/// Alias kept from the event API, whose status type was always `CGError`.
pub type EventErr = CoreGraphicsError;

/// The "success" sentinel shared by all status codes.
pub const CG_ERROR_SUCCESS: CGErrorCode = 0;
pub const CG_EVENT_NO_ERR: CGErrorCode = CG_ERROR_SUCCESS;

#[derive(thiserror::Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum CoreGraphicsError {
    #[error("CGError::Success")]
    Success,
    #[error("CGError::Failure")]
    Failure,
    #[error("CGError::IllegalArgument")]
    IllegalArgument,
    #[error("CGError::InvalidConnection")]
    InvalidConnection,
    #[error("CGError::InvalidContext")]
    InvalidContext,
    #[error("CGError::CannotComplete")]
    CannotComplete,
    #[error("CGError::NotImplemented")]
    NotImplemented,
    #[error("CGError::RangeCheck")]
    RangeCheck,
    #[error("CGError::TypeCheck")]
    TypeCheck,
    #[error("CGError::InvalidOperation")]
    InvalidOperation,
    #[error("CGError::NoneAvailable")]
    NoneAvailable,
    #[error("CGError::Unknown {0}")]
    Unknown(i32),
}

impl From<CGErrorCode> for CoreGraphicsError {
    fn from(value: CGErrorCode) -> Self {
        match value {
            0 => Self::Success,
            1000 => Self::Failure,
            1001 => Self::IllegalArgument,
            1002 => Self::InvalidConnection,
            1003 => Self::InvalidContext,
            1004 => Self::CannotComplete,
            1006 => Self::NotImplemented,
            1007 => Self::RangeCheck,
            1008 => Self::TypeCheck,
            1010 => Self::InvalidOperation,
            1011 => Self::NoneAvailable,
            error => Self::Unknown(error),
        }
    }
}

#[cfg(target_os = "macos")]
impl From<objc2_core_graphics::CGError> for CoreGraphicsError {
    fn from(value: objc2_core_graphics::CGError) -> Self {
        Self::from(value.0)
    }
}

impl CoreGraphicsError {
    pub const fn code(self) -> CGErrorCode {
        match self {
            Self::Success => CG_ERROR_SUCCESS,
            Self::Failure => 1000,
            Self::IllegalArgument => 1001,
            Self::InvalidConnection => 1002,
            Self::InvalidContext => 1003,
            Self::CannotComplete => 1004,
            Self::NotImplemented => 1006,
            Self::RangeCheck => 1007,
            Self::TypeCheck => 1008,
            Self::InvalidOperation => 1010,
            Self::NoneAvailable => 1011,
            Self::Unknown(code) => code,
        }
    }

    /// Turn a raw status code into a `Result`, treating the success sentinel as `Ok`.
    pub fn check(code: CGErrorCode) -> Result<(), Self> {
        match Self::from(code) {
            Self::Success => Ok(()),
            error => Err(error),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigurationError {
    #[error("could not read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse configuration file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_sentinel_is_ok() {
        assert!(CoreGraphicsError::check(CG_EVENT_NO_ERR).is_ok());
        assert_eq!(CoreGraphicsError::from(0), CoreGraphicsError::Success);
    }

    #[test]
    fn test_known_codes_round_trip() {
        for code in [1000, 1001, 1002, 1003, 1004, 1006, 1007, 1008, 1010, 1011] {
            let error = CoreGraphicsError::from(code);
            assert_ne!(error, CoreGraphicsError::Success);
            assert!(!matches!(error, CoreGraphicsError::Unknown(_)));
            assert_eq!(error.code(), code);
        }
    }

    #[test]
    fn test_unknown_code_is_preserved() {
        assert_eq!(CoreGraphicsError::from(1005), CoreGraphicsError::Unknown(1005));
        assert_eq!(CoreGraphicsError::check(-1), Err(CoreGraphicsError::Unknown(-1)));
        assert_eq!(CoreGraphicsError::Unknown(-1).to_string(), "CGError::Unknown -1");
    }
}
