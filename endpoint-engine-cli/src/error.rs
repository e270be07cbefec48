//! Error codes and error reports written to stderr.

use crate::command::ParseError;
use endpoint_manager_rs::AudioError;
use serde::Serialize;

/// Stable numeric codes for command failures.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ParseError = -1,
    InvalidArgument = -2,
    DeviceNotFound = -3,
    BackendError = -4,
    NoDefaultDevice = -5,
    ShutDown = -6,
    InternalError = -99,
}

impl ErrorCode {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorCode::ParseError => "ParseError",
            ErrorCode::InvalidArgument => "InvalidArgument",
            ErrorCode::DeviceNotFound => "DeviceNotFound",
            ErrorCode::BackendError => "BackendError",
            ErrorCode::NoDefaultDevice => "NoDefaultDevice",
            ErrorCode::ShutDown => "ShutDown",
            ErrorCode::InternalError => "InternalError",
        }
    }
}

impl From<&AudioError> for ErrorCode {
    fn from(err: &AudioError) -> Self {
        match err {
            AudioError::DeviceNotFound { .. } => ErrorCode::DeviceNotFound,
            AudioError::InvalidArgument(_) => ErrorCode::InvalidArgument,
            AudioError::NoDefaultDevice { .. } => ErrorCode::NoDefaultDevice,
            AudioError::BackendUnavailable(_) | AudioError::StringConversion(_) => {
                ErrorCode::BackendError
            }
            AudioError::ShutDown => ErrorCode::ShutDown,
            AudioError::AlreadyAttached { .. } => ErrorCode::InternalError,
        }
    }
}

impl From<&ParseError> for ErrorCode {
    fn from(_: &ParseError) -> Self {
        ErrorCode::ParseError
    }
}

/// `{"error": {"code": -3, "kind": "DeviceNotFound", "message": "..."}}`
#[derive(Debug, Serialize)]
pub struct ErrorReport {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: i32,
    pub kind: &'static str,
    pub message: String,
}

impl ErrorReport {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                code: code as i32,
                kind: code.name(),
                message: message.into(),
            },
        }
    }
}

impl From<&AudioError> for ErrorReport {
    fn from(err: &AudioError) -> Self {
        ErrorReport::new(ErrorCode::from(err), err.to_string())
    }
}

impl From<&ParseError> for ErrorReport {
    fn from(err: &ParseError) -> Self {
        ErrorReport::new(ErrorCode::from(err), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_conversion() {
        let err = AudioError::DeviceNotFound {
            device_id: "test".to_string(),
        };
        assert_eq!(ErrorCode::from(&err), ErrorCode::DeviceNotFound);
        assert_eq!(
            ErrorCode::from(&AudioError::InvalidArgument("x".into())),
            ErrorCode::InvalidArgument
        );
        assert_eq!(
            ErrorCode::from(&AudioError::BackendUnavailable("x".into())),
            ErrorCode::BackendError
        );
    }

    #[test]
    fn test_error_report_json() {
        let report = ErrorReport::from(&AudioError::ShutDown);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["error"]["code"], -6);
        assert_eq!(json["error"]["kind"], "ShutDown");
        assert_eq!(json["error"]["message"], "Endpoint manager has been shut down");
    }
}
