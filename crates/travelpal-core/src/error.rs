use thiserror::Error;

/// The two failure families the conversation collapses into one fallback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The endpoint could not be reached or the request never completed
    Transport,
    /// The endpoint answered, but not with a usable reply
    Response,
}

/// Failure talking to the assistant endpoint
#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("could not reach assistant endpoint: {0}")]
    Transport(String),

    #[error("assistant endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("assistant endpoint returned an unusable payload: {0}")]
    Malformed(String),

    #[error("assistant request was interrupted: {0}")]
    Interrupted(String),
}

impl EndpointError {
    pub fn kind(&self) -> FailureKind {
        match self {
            EndpointError::Transport(_) | EndpointError::Interrupted(_) => FailureKind::Transport,
            EndpointError::Status { .. } | EndpointError::Malformed(_) => FailureKind::Response,
        }
    }
}

impl From<reqwest::Error> for EndpointError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            EndpointError::Malformed(err.to_string())
        } else {
            EndpointError::Transport(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_groups_variants() {
        assert_eq!(EndpointError::Transport("dns".into()).kind(), FailureKind::Transport);
        assert_eq!(EndpointError::Interrupted("panic".into()).kind(), FailureKind::Transport);
        assert_eq!(
            EndpointError::Status { status: 500, body: String::new() }.kind(),
            FailureKind::Response
        );
        assert_eq!(EndpointError::Malformed("no field".into()).kind(), FailureKind::Response);
    }

    #[test]
    fn test_status_message_includes_code() {
        let err = EndpointError::Status { status: 503, body: "busy".into() };
        assert_eq!(err.to_string(), "assistant endpoint returned status 503: busy");
    }
}
