//! Response classification

use reqwest::StatusCode;

/// What the pipeline does with a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Forwarded to the caller unchanged
    Success,
    /// 401: routed to the refresh coordinator
    AuthFailure,
    /// Any other non-2xx: surfaced with status and body
    OtherError,
}

/// 403 stays `OtherError`: the token was accepted but lacks permission,
/// and refreshing it would not help.
pub fn classify(status: StatusCode) -> Classification {
    if status.is_success() {
        Classification::Success
    } else if status == StatusCode::UNAUTHORIZED {
        Classification::AuthFailure
    } else {
        Classification::OtherError
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_statuses() {
        let cases = [
            (200, Classification::Success),
            (201, Classification::Success),
            (204, Classification::Success),
            (401, Classification::AuthFailure),
            (400, Classification::OtherError),
            (403, Classification::OtherError),
            (404, Classification::OtherError),
            (500, Classification::OtherError),
            (304, Classification::OtherError),
        ];
        for (code, expected) in cases {
            let status = StatusCode::from_u16(code).unwrap();
            assert_eq!(classify(status), expected, "status {}", code);
        }
    }
}
