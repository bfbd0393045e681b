//! Provider error types.
//!
//! Listing failures are categorised so that the poll loop can decide how
//! loudly to report them:
//!
//! - **Transient** errors clear up on their own (throttling, 5xx, network
//!   trouble, timeouts). The next poll tick is the retry.
//! - **Terminal** errors need a human (expired or missing credentials,
//!   missing IAM permissions). Polling continues, but every failure is
//!   reported at error level.
//! - **Unknown** errors could not be categorised.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// The kind of provider error, categorised for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorKind {
    /// Expected to clear up by the next poll.
    ///
    /// Examples:
    /// - `RequestLimitExceeded`, `Throttling`
    /// - `InternalError`, `ServiceUnavailable`, `Unavailable`
    /// - Connection failures, DNS failures
    /// - The listing call exceeding its timeout
    Transient,

    /// Requires operator action.
    ///
    /// Examples:
    /// - `AuthFailure`, `UnauthorizedOperation`
    /// - `ExpiredToken`, `InvalidClientTokenId`, `SignatureDoesNotMatch`
    /// - No credentials configured
    Terminal,

    /// Could not be categorised.
    Unknown,
}

impl ProviderErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderErrorKind::Transient => "transient",
            ProviderErrorKind::Terminal => "terminal",
            ProviderErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed provider call.
#[derive(Debug, Error)]
pub struct ProviderError {
    /// The kind of error.
    pub kind: ProviderErrorKind,

    /// The provider's error code (e.g. `RequestLimitExceeded`), if known.
    pub code: Option<String>,

    /// A human-readable description.
    pub message: String,

    /// The underlying error, if any.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} provider error ({}): {}", self.kind, code, self.message),
            None => write!(f, "{} provider error: {}", self.kind, self.message),
        }
    }
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        ProviderError {
            kind,
            code: None,
            message: message.into(),
            source: None,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Transient, message)
    }

    pub fn terminal(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Terminal, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Unknown, message)
    }

    /// The listing call did not finish within `limit`.
    pub fn timeout(limit: Duration) -> Self {
        Self::transient(format!("provider call timed out after {:?}", limit))
    }

    /// Attaches the underlying error.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Categorises an AWS error from its code and message.
    ///
    /// The code decides when it is recognised; otherwise the message is
    /// checked for credential and network failures.
    pub fn from_aws(code: Option<&str>, message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = match code {
            Some(code) if is_throttling_code(code) || is_service_fault_code(code) => {
                ProviderErrorKind::Transient
            }
            Some(code) if is_auth_code(code) => ProviderErrorKind::Terminal,
            _ if is_credentials_message(&message) => ProviderErrorKind::Terminal,
            _ if is_network_message(&message) => ProviderErrorKind::Transient,
            _ => ProviderErrorKind::Unknown,
        };

        ProviderError {
            kind,
            code: code.map(str::to_string),
            message,
            source: None,
        }
    }

    /// Categorises the stderr of a failed AWS CLI invocation.
    ///
    /// The CLI reports service errors as
    /// `An error occurred (<Code>) when calling the <Op> operation: <msg>`.
    pub fn from_aws_cli_stderr(stderr: &str) -> Self {
        let stderr = stderr.trim();
        Self::from_aws(extract_error_code(stderr), stderr)
    }
}

/// Extracts `<Code>` from `An error occurred (<Code>) ...`.
fn extract_error_code(stderr: &str) -> Option<&str> {
    let start = stderr.find("An error occurred (")? + "An error occurred (".len();
    let rest = &stderr[start..];
    let end = rest.find(')')?;
    let code = &rest[..end];
    (!code.is_empty()).then_some(code)
}

fn is_throttling_code(code: &str) -> bool {
    matches!(
        code,
        "RequestLimitExceeded"
            | "Throttling"
            | "ThrottlingException"
            | "TooManyRequestsException"
            | "RequestThrottled"
            | "RequestThrottledException"
    )
}

fn is_service_fault_code(code: &str) -> bool {
    matches!(
        code,
        "InternalError" | "InternalFailure" | "ServiceUnavailable" | "Unavailable" | "RequestTimeout"
    )
}

fn is_auth_code(code: &str) -> bool {
    matches!(
        code,
        "AuthFailure"
            | "UnauthorizedOperation"
            | "InvalidClientTokenId"
            | "ExpiredToken"
            | "RequestExpired"
            | "SignatureDoesNotMatch"
            | "OptInRequired"
            | "Blocked"
            | "AccessDenied"
            | "AccessDeniedException"
    )
}

fn is_credentials_message(message: &str) -> bool {
    let message_lower = message.to_lowercase();
    message_lower.contains("unable to locate credentials")
        || message_lower.contains("token has expired")
        || message_lower.contains("the sso session")
}

fn is_network_message(message: &str) -> bool {
    let message_lower = message.to_lowercase();
    message_lower.contains("could not connect")
        || message_lower.contains("connect timeout")
        || message_lower.contains("read timeout")
        || message_lower.contains("timed out")
        || message_lower.contains("connection")
        || message_lower.contains("name resolution")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_code_from_cli_stderr() {
        let stderr = "\nAn error occurred (RequestLimitExceeded) when calling the DescribeVolumes operation: Request limit exceeded.\n";
        assert_eq!(extract_error_code(stderr.trim()), Some("RequestLimitExceeded"));
        assert_eq!(extract_error_code("something else"), None);
        assert_eq!(extract_error_code("An error occurred () oops"), None);
    }

    #[test]
    fn throttling_is_transient() {
        let err = ProviderError::from_aws_cli_stderr(
            "An error occurred (RequestLimitExceeded) when calling the DescribeVolumes operation: Request limit exceeded.",
        );
        assert_eq!(err.kind, ProviderErrorKind::Transient);
        assert_eq!(err.code.as_deref(), Some("RequestLimitExceeded"));
    }

    #[test]
    fn auth_failure_is_terminal() {
        let err = ProviderError::from_aws_cli_stderr(
            "An error occurred (AuthFailure) when calling the DescribeVolumes operation: AWS was not able to validate the provided access credentials",
        );
        assert_eq!(err.kind, ProviderErrorKind::Terminal);

        let err = ProviderError::from_aws_cli_stderr(
            "An error occurred (UnauthorizedOperation) when calling the DescribeVolumes operation: You are not authorized to perform this operation.",
        );
        assert_eq!(err.kind, ProviderErrorKind::Terminal);
    }

    #[test]
    fn missing_credentials_is_terminal() {
        let err = ProviderError::from_aws_cli_stderr(
            "Unable to locate credentials. You can configure credentials by running \"aws configure\".",
        );
        assert_eq!(err.kind, ProviderErrorKind::Terminal);
        assert_eq!(err.code, None);
    }

    #[test]
    fn network_failure_is_transient() {
        let err = ProviderError::from_aws_cli_stderr(
            "Could not connect to the endpoint URL: \"https://ec2.us-east-1.amazonaws.com/\"",
        );
        assert_eq!(err.kind, ProviderErrorKind::Transient);
    }

    #[test]
    fn unrecognised_is_unknown() {
        let err = ProviderError::from_aws_cli_stderr(
            "An error occurred (InvalidParameterValue) when calling the DescribeVolumes operation: bad filter",
        );
        assert_eq!(err.kind, ProviderErrorKind::Unknown);
    }

    #[test]
    fn timeout_is_transient() {
        let err = ProviderError::timeout(Duration::from_secs(10));
        assert_eq!(err.kind, ProviderErrorKind::Transient);
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn display_includes_code() {
        let err = ProviderError::from_aws(Some("Throttling"), "Rate exceeded");
        assert_eq!(
            err.to_string(),
            "transient provider error (Throttling): Rate exceeded"
        );
    }
}
