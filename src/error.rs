//! Classified errors for API calls and the sync core.

use thiserror::Error;

/// Error taxonomy for catalog operations.
///
/// Classification follows the HTTP status of the failed request. The core
/// never retries on its own; the caller decides messaging and navigation
/// (e.g. dropping to the login flow on `Auth`).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
  /// Malformed request payload (4xx without a more specific class).
  #[error("validation failed: {message}")]
  Validation { message: String },

  /// Missing, invalid or expired session. Raised before any network
  /// dispatch when no token is present, and on HTTP 401.
  #[error("not authenticated")]
  Auth,

  #[error("not found")]
  NotFound,

  /// HTTP 429. `retry_after` carries the server hint in seconds, if any.
  #[error("rate limited")]
  RateLimit { retry_after: Option<u64> },

  #[error("payload too large")]
  PayloadTooLarge,

  #[error("unprocessable entity: {message}")]
  Unprocessable { message: String },

  #[error("server error (status {status})")]
  Server { status: u16 },

  /// The request never reached the server.
  #[error("network error: {message}")]
  Network { message: String },

  /// A 2xx response whose body failed to decode.
  #[error("failed to decode response: {message}")]
  Decode { message: String },
}

impl ApiError {
  /// Classify a non-2xx response.
  pub fn from_status(status: u16, message: Option<String>, retry_after: Option<u64>) -> Self {
    let message = message.unwrap_or_else(|| format!("request failed with status {}", status));
    match status {
      401 => Self::Auth,
      404 => Self::NotFound,
      413 => Self::PayloadTooLarge,
      422 => Self::Unprocessable { message },
      429 => Self::RateLimit { retry_after },
      500..=599 => Self::Server { status },
      _ => Self::Validation { message },
    }
  }

  /// Whether the caller should drop to the login flow.
  pub fn is_auth(&self) -> bool {
    matches!(self, Self::Auth)
  }
}

impl From<reqwest::Error> for ApiError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_decode() {
      Self::Decode {
        message: err.to_string(),
      }
    } else {
      Self::Network {
        message: err.to_string(),
      }
    }
  }
}

impl From<serde_json::Error> for ApiError {
  fn from(err: serde_json::Error) -> Self {
    Self::Decode {
      message: err.to_string(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_status_classification() {
    assert_eq!(ApiError::from_status(401, None, None), ApiError::Auth);
    assert_eq!(ApiError::from_status(404, None, None), ApiError::NotFound);
    assert_eq!(
      ApiError::from_status(413, None, None),
      ApiError::PayloadTooLarge
    );
    assert_eq!(
      ApiError::from_status(429, None, Some(10)),
      ApiError::RateLimit {
        retry_after: Some(10)
      }
    );
    assert_eq!(
      ApiError::from_status(503, None, None),
      ApiError::Server { status: 503 }
    );
  }

  #[test]
  fn test_4xx_defaults_to_validation() {
    let err = ApiError::from_status(400, Some("price must be positive".into()), None);
    assert_eq!(
      err,
      ApiError::Validation {
        message: "price must be positive".into()
      }
    );
  }

  #[test]
  fn test_422_keeps_message() {
    let err = ApiError::from_status(422, Some("slug already taken".into()), None);
    assert_eq!(
      err,
      ApiError::Unprocessable {
        message: "slug already taken".into()
      }
    );
  }

  #[test]
  fn test_is_auth() {
    assert!(ApiError::from_status(401, None, None).is_auth());
    assert!(!ApiError::NotFound.is_auth());
  }
}
