//! Drive API error codes.

use serde::Deserialize;

use crate::error::DriveError;

/// Error body returned by the open API on non-2xx responses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

/// Drive API error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorCode {
    /// File or folder does not exist
    NotFound,
    /// A sibling with the same name exists
    AlreadyExist,
    /// Rate limited
    TooManyRequests,
    /// Access token is malformed or revoked
    AccessTokenInvalid,
    /// Access token lifetime ran out
    AccessTokenExpired,
    /// Refresh token rejected
    InvalidRefreshToken,
    /// Operation not allowed for this user
    PermissionDenied,
    /// Target sits in the recycle bin
    InRecycleBin,
    /// Drive storage is full
    QuotaExhausted,
    /// Request parameters rejected
    InvalidParameter,
    /// Unknown error
    Unknown,
}

impl From<&str> for ApiErrorCode {
    fn from(code: &str) -> Self {
        match code {
            "InvalidParameter.RefreshToken" | "RefreshTokenExpired" => {
                ApiErrorCode::InvalidRefreshToken
            }
            "AccessTokenInvalid" => ApiErrorCode::AccessTokenInvalid,
            "AccessTokenExpired" => ApiErrorCode::AccessTokenExpired,
            "TooManyRequests" => ApiErrorCode::TooManyRequests,
            "PermissionDenied" | "UserNotAllowedAccessDrive" => ApiErrorCode::PermissionDenied,
            "ForbiddenFileInTheRecycleBin" => ApiErrorCode::InRecycleBin,
            "QuotaExhausted.Drive" => ApiErrorCode::QuotaExhausted,
            c if c.starts_with("NotFound.") => ApiErrorCode::NotFound,
            c if c.starts_with("AlreadyExist.") => ApiErrorCode::AlreadyExist,
            c if c.starts_with("InvalidParameter") => ApiErrorCode::InvalidParameter,
            _ => ApiErrorCode::Unknown,
        }
    }
}

impl ApiErrorCode {
    /// Get human-readable description of the error.
    pub fn description(&self) -> &'static str {
        match self {
            ApiErrorCode::NotFound => "Resource does not exist",
            ApiErrorCode::AlreadyExist => "Resource already exists",
            ApiErrorCode::TooManyRequests => "Rate limit exceeded",
            ApiErrorCode::AccessTokenInvalid => "Access token invalid",
            ApiErrorCode::AccessTokenExpired => "Access token expired",
            ApiErrorCode::InvalidRefreshToken => "Refresh token rejected",
            ApiErrorCode::PermissionDenied => "Permission denied",
            ApiErrorCode::InRecycleBin => "File is in the recycle bin",
            ApiErrorCode::QuotaExhausted => "Drive quota exhausted",
            ApiErrorCode::InvalidParameter => "Invalid parameter",
            ApiErrorCode::Unknown => "Unknown error",
        }
    }

    /// Whether the error means the credentials are no longer usable.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            ApiErrorCode::AccessTokenInvalid
                | ApiErrorCode::AccessTokenExpired
                | ApiErrorCode::InvalidRefreshToken
        )
    }
}

/// Turn a non-2xx API response into a [`DriveError`].
///
/// Bodies that are not the usual `{code, message}` JSON keep their raw text as the
/// message.
pub fn classify(status: u16, path: &str, body: &[u8]) -> DriveError {
    let parsed: ErrorBody = serde_json::from_slice(body).unwrap_or_else(|_| ErrorBody {
        code: String::new(),
        message: String::from_utf8_lossy(body).into_owned(),
    });

    let code = ApiErrorCode::from(parsed.code.as_str());
    match code {
        ApiErrorCode::NotFound => DriveError::NotFound(path.to_string()),
        c if c.is_auth() => DriveError::Auth(format!("{}: {}", parsed.code, parsed.message)),
        _ => DriveError::Api {
            status,
            code: parsed.code,
            message: if parsed.message.is_empty() {
                code.description().to_string()
            } else {
                parsed.message
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_conversion() {
        assert_eq!(ApiErrorCode::from("NotFound.File"), ApiErrorCode::NotFound);
        assert_eq!(ApiErrorCode::from("NotFound.FileId"), ApiErrorCode::NotFound);
        assert_eq!(
            ApiErrorCode::from("AlreadyExist.File"),
            ApiErrorCode::AlreadyExist
        );
        assert_eq!(
            ApiErrorCode::from("InvalidParameter.RefreshToken"),
            ApiErrorCode::InvalidRefreshToken
        );
        assert_eq!(
            ApiErrorCode::from("InvalidParameter.Limit"),
            ApiErrorCode::InvalidParameter
        );
        assert_eq!(
            ApiErrorCode::from("TooManyRequests"),
            ApiErrorCode::TooManyRequests
        );
        assert_eq!(ApiErrorCode::from("Whatever"), ApiErrorCode::Unknown);
    }

    #[test]
    fn test_error_code_descriptions() {
        assert_eq!(ApiErrorCode::NotFound.description(), "Resource does not exist");
        assert_eq!(ApiErrorCode::AlreadyExist.description(), "Resource already exists");
        assert_eq!(ApiErrorCode::Unknown.description(), "Unknown error");
    }

    #[test]
    fn test_classify_not_found() {
        let err = classify(
            404,
            "/adrive/v1.0/openFile/get_by_path",
            br#"{"code":"NotFound.File","message":"The resource file cannot be found."}"#,
        );
        assert!(err.is_not_found());
    }

    #[test]
    fn test_classify_conflict() {
        let err = classify(
            409,
            "/adrive/v1.0/openFile/create",
            br#"{"code":"AlreadyExist.File","message":"exists"}"#,
        );
        assert!(err.is_conflict());
        assert_eq!(err.status(), Some(409));
    }

    #[test]
    fn test_classify_auth() {
        let err = classify(
            400,
            "/oauth/access_token",
            br#"{"code":"InvalidParameter.RefreshToken","message":"expired"}"#,
        );
        assert!(matches!(err, DriveError::Auth(_)));
    }

    #[test]
    fn test_classify_raw_body() {
        let err = classify(502, "/adrive/v1.0/openFile/list", b"bad gateway");
        match err {
            DriveError::Api {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 502);
                assert!(code.is_empty());
                assert_eq!(message, "bad gateway");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
