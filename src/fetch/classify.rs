use crate::llm::ProviderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Transient,
    Fatal,
}

/// Decides whether a failed attempt is worth repeating.
pub trait Classify: Send + Sync {
    fn classify(&self, err: &ProviderError) -> Disposition;
}

impl<F> Classify for F
where
    F: Fn(&ProviderError) -> Disposition + Send + Sync,
{
    fn classify(&self, err: &ProviderError) -> Disposition {
        self(err)
    }
}

/// Default mapping: timeouts, connection failures, 408/425/429, 5xx and
/// undecodable bodies retry; every other status, content blocks and
/// unbuildable requests abort.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusClassifier;

impl Classify for StatusClassifier {
    fn classify(&self, err: &ProviderError) -> Disposition {
        match err {
            ProviderError::Timeout(_) | ProviderError::Connect(_) | ProviderError::Decode(_) => {
                Disposition::Transient
            }
            ProviderError::Status { status, .. } => match status {
                408 | 425 | 429 | 500..=599 => Disposition::Transient,
                _ => Disposition::Fatal,
            },
            ProviderError::Blocked(_) | ProviderError::InvalidRequest(_) => Disposition::Fatal,
        }
    }
}

/// Low-cardinality label for the `error.type` span field and error metric.
pub fn error_type(err: &ProviderError) -> &'static str {
    match err {
        ProviderError::Timeout(_) => "timeout",
        ProviderError::Connect(_) => "network_error",
        ProviderError::Status { status: 429, .. } => "rate_limit",
        ProviderError::Status {
            status: 401 | 403, ..
        } => "auth_error",
        ProviderError::Status { status: 500..=599, .. } => "server_error",
        ProviderError::Status { .. } => "invalid_request",
        ProviderError::Blocked(_) => "content_blocked",
        ProviderError::Decode(_) => "decode_error",
        ProviderError::InvalidRequest(_) => "invalid_request",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> ProviderError {
        ProviderError::Status {
            status: code,
            message: String::new(),
        }
    }

    #[test]
    fn test_status_classifier_categories() {
        let cases = vec![
            (ProviderError::Timeout("deadline".into()), Disposition::Transient),
            (ProviderError::Connect("reset".into()), Disposition::Transient),
            (ProviderError::Decode("eof".into()), Disposition::Transient),
            (status(408), Disposition::Transient),
            (status(425), Disposition::Transient),
            (status(429), Disposition::Transient),
            (status(500), Disposition::Transient),
            (status(502), Disposition::Transient),
            (status(503), Disposition::Transient),
            (status(504), Disposition::Transient),
            (status(400), Disposition::Fatal),
            (status(401), Disposition::Fatal),
            (status(403), Disposition::Fatal),
            (status(404), Disposition::Fatal),
            (status(422), Disposition::Fatal),
            (ProviderError::Blocked("SAFETY".into()), Disposition::Fatal),
            (ProviderError::InvalidRequest("bad header".into()), Disposition::Fatal),
        ];

        for (err, expected) in cases {
            assert_eq!(
                StatusClassifier.classify(&err),
                expected,
                "classify({err:?}) should be {expected:?}"
            );
        }
    }

    #[test]
    fn test_closure_classifier() {
        let everything_fatal = |_: &ProviderError| Disposition::Fatal;
        assert_eq!(everything_fatal.classify(&status(503)), Disposition::Fatal);
    }

    #[test]
    fn test_error_type_labels() {
        let cases = vec![
            (status(429), "rate_limit"),
            (ProviderError::Timeout("t".into()), "timeout"),
            (status(401), "auth_error"),
            (status(403), "auth_error"),
            (status(400), "invalid_request"),
            (status(503), "server_error"),
            (ProviderError::Connect("dns".into()), "network_error"),
            (ProviderError::Blocked("x".into()), "content_blocked"),
            (ProviderError::Decode("x".into()), "decode_error"),
        ];
        for (err, expected) in cases {
            assert_eq!(error_type(&err), expected, "error_type({err:?})");
        }
    }
}
