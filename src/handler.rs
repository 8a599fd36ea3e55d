//! Authorization decision seam.
//!
//! The mesh calls `HandleAuthorization` with an instance describing a
//! subject and an action; a handler answers with a [`CheckResult`] or an
//! error when no decision can be made. [`PlaceholderHandler`] is the only
//! handler shipped today and makes no decision at all.

use crate::proto::{CheckResult, HandleAuthorizationRequest};

/// Reasons a handler could not produce a decision.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The request was malformed or missing required attributes.
    #[error("invalid authorization request: {0}")]
    InvalidRequest(String),

    /// A backend needed for the decision is unreachable.
    #[error("authorization backend unavailable: {0}")]
    Unavailable(String),
}

/// A registrable handler for the `HandleAuthorization` procedure.
///
/// Returning `Ok(None)` means "no result"; it is sent to the mesh as an
/// empty `CheckResult`.
#[tonic::async_trait]
pub trait AuthorizationHandler: Send + Sync + 'static {
    /// Decides on a single authorization request.
    async fn handle_authorization(
        &self,
        request: HandleAuthorizationRequest,
    ) -> Result<Option<CheckResult>, HandlerError>;
}

/// Placeholder for the unimplemented authorization decision.
///
/// Returns no result and no error for every request.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlaceholderHandler;

#[tonic::async_trait]
impl AuthorizationHandler for PlaceholderHandler {
    async fn handle_authorization(
        &self,
        _request: HandleAuthorizationRequest,
    ) -> Result<Option<CheckResult>, HandlerError> {
        Ok(None)
    }
}

/// Builders for decision artifacts returned by real handlers.
pub mod check_result {
    use std::time::Duration;

    use crate::proto::{CheckResult, RpcStatus};

    /// google.rpc.Code OK.
    pub const CODE_OK: i32 = 0;
    /// google.rpc.Code PERMISSION_DENIED.
    pub const CODE_PERMISSION_DENIED: i32 = 7;

    /// An allow decision the mesh may cache for `valid_duration` or
    /// `valid_use_count` uses.
    pub fn allow(valid_duration: Duration, valid_use_count: i32) -> CheckResult {
        CheckResult {
            status: Some(RpcStatus {
                code: CODE_OK,
                message: String::new(),
                details: Vec::new(),
            }),
            valid_duration: Some(to_proto_duration(valid_duration)),
            valid_use_count,
        }
    }

    /// A deny decision carrying a human readable reason.
    pub fn deny(message: impl Into<String>) -> CheckResult {
        CheckResult {
            status: Some(RpcStatus {
                code: CODE_PERMISSION_DENIED,
                message: message.into(),
                details: Vec::new(),
            }),
            valid_duration: None,
            valid_use_count: 0,
        }
    }

    fn to_proto_duration(duration: Duration) -> prost_types::Duration {
        prost_types::Duration {
            seconds: i64::try_from(duration.as_secs()).unwrap_or(i64::MAX),
            nanos: i32::try_from(duration.subsec_nanos()).unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::proto::{ActionMsg, InstanceMsg, SubjectMsg};

    #[tokio::test]
    async fn placeholder_returns_nothing_for_empty_request() {
        let result = PlaceholderHandler
            .handle_authorization(HandleAuthorizationRequest::default())
            .await;

        assert!(matches!(result, Ok(None)));
    }

    #[tokio::test]
    async fn placeholder_ignores_request_contents() {
        let request = HandleAuthorizationRequest {
            instance: Some(InstanceMsg {
                name: "authz.instance.istio-system".to_string(),
                subject: Some(SubjectMsg {
                    user: "alice".to_string(),
                    groups: "admins".to_string(),
                    properties: Default::default(),
                }),
                action: Some(ActionMsg {
                    namespace: "default".to_string(),
                    service: "reviews".to_string(),
                    method: "GET".to_string(),
                    path: "/reviews/1".to_string(),
                    properties: Default::default(),
                }),
            }),
            adapter_config: None,
            dedup_id: "dedup-1".to_string(),
        };

        let result = PlaceholderHandler.handle_authorization(request).await;
        assert!(matches!(result, Ok(None)));
    }

    #[test]
    fn allow_carries_ok_status_and_validity() {
        let result = check_result::allow(Duration::from_millis(1500), 10);

        let status = result.status.expect("status set");
        assert_eq!(status.code, check_result::CODE_OK);
        let duration = result.valid_duration.expect("duration set");
        assert_eq!(duration.seconds, 1);
        assert_eq!(duration.nanos, 500_000_000);
        assert_eq!(result.valid_use_count, 10);
    }

    #[test]
    fn deny_carries_permission_denied() {
        let result = check_result::deny("user not in group");

        let status = result.status.expect("status set");
        assert_eq!(status.code, check_result::CODE_PERMISSION_DENIED);
        assert_eq!(status.message, "user not in group");
        assert!(result.valid_duration.is_none());
    }
}
