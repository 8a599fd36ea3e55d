use tonic::{Request, Response, Status};
use tracing::debug;

use crate::handler::{AuthorizationHandler, HandlerError};
use crate::proto::handle_authorization_service_server::HandleAuthorizationService;
use crate::proto::{CheckResult, HandleAuthorizationRequest};

/// gRPC service implementation for the mesh authorization template.
pub struct AuthorizationService<H: AuthorizationHandler> {
    handler: H,
}

impl<H: AuthorizationHandler> AuthorizationService<H> {
    /// Creates a new service that delegates decisions to `handler`.
    pub fn new(handler: H) -> Self {
        Self { handler }
    }
}

impl From<HandlerError> for Status {
    fn from(err: HandlerError) -> Self {
        match err {
            HandlerError::InvalidRequest(msg) => Status::invalid_argument(msg),
            HandlerError::Unavailable(msg) => Status::unavailable(msg),
        }
    }
}

#[tonic::async_trait]
impl<H: AuthorizationHandler> HandleAuthorizationService for AuthorizationService<H> {
    async fn handle_authorization(
        &self,
        request: Request<HandleAuthorizationRequest>,
    ) -> Result<Response<CheckResult>, Status> {
        let req = request.into_inner();

        debug!(
            instance = req.instance.as_ref().map_or("", |i| i.name.as_str()),
            dedup_id = %req.dedup_id,
            "HandleAuthorization"
        );

        let result = self.handler.handle_authorization(req).await?;

        // No result goes out as the empty message.
        Ok(Response::new(result.unwrap_or_default()))
    }
}
