use std::sync::Arc;
use std::time::Duration;

use mygrpcadapter::handler::check_result;
use mygrpcadapter::proto::handle_authorization_service_client::HandleAuthorizationServiceClient;
use mygrpcadapter::proto::{CheckResult, HandleAuthorizationRequest, InstanceMsg, SubjectMsg};
use mygrpcadapter::{AuthorizationHandler, AuthorizationServer, HandlerError};
use tokio::sync::{oneshot, Notify};
use tonic::{Code, Request};

mod common;

/// Allows requests from one user, rejects requests without a subject.
struct AllowUser(&'static str);

#[tonic::async_trait]
impl AuthorizationHandler for AllowUser {
    async fn handle_authorization(
        &self,
        request: HandleAuthorizationRequest,
    ) -> Result<Option<CheckResult>, HandlerError> {
        let subject = request
            .instance
            .and_then(|instance| instance.subject)
            .ok_or_else(|| HandlerError::InvalidRequest("missing subject".to_string()))?;

        if subject.user == self.0 {
            Ok(Some(check_result::allow(Duration::from_secs(60), 100)))
        } else {
            Ok(Some(check_result::deny(format!("{} is not allowed", subject.user))))
        }
    }
}

/// Signals when a call arrives, then holds it for a while.
struct Slow {
    started: Arc<Notify>,
}

#[tonic::async_trait]
impl AuthorizationHandler for Slow {
    async fn handle_authorization(
        &self,
        _request: HandleAuthorizationRequest,
    ) -> Result<Option<CheckResult>, HandlerError> {
        self.started.notify_one();
        tokio::time::sleep(Duration::from_millis(300)).await;
        Ok(Some(check_result::allow(Duration::from_secs(1), 1)))
    }
}

fn request_for(user: &str) -> HandleAuthorizationRequest {
    HandleAuthorizationRequest {
        instance: Some(InstanceMsg {
            name: "authz.instance.istio-system".to_string(),
            subject: Some(SubjectMsg {
                user: user.to_string(),
                ..Default::default()
            }),
            action: None,
        }),
        adapter_config: None,
        dedup_id: format!("dedup-{user}"),
    }
}

#[tokio::test]
async fn custom_handler_decisions_reach_the_client() {
    common::init_tracing();

    let server = AuthorizationServer::bind_with_handler("127.0.0.1:0", AllowUser("alice"))
        .await
        .unwrap();
    let (done_tx, done_rx) = oneshot::channel();
    let serving = server.clone();
    tokio::spawn(async move { serving.run(done_tx).await });
    common::wait_until_serving(&server).await;

    let mut client = HandleAuthorizationServiceClient::connect(common::endpoint(&server))
        .await
        .expect("Failed to connect to server");

    let allowed = client
        .handle_authorization(Request::new(request_for("alice")))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(allowed.status.unwrap().code, check_result::CODE_OK);
    assert_eq!(allowed.valid_use_count, 100);

    let denied = client
        .handle_authorization(Request::new(request_for("mallory")))
        .await
        .unwrap()
        .into_inner();
    let status = denied.status.unwrap();
    assert_eq!(status.code, check_result::CODE_PERMISSION_DENIED);
    assert_eq!(status.message, "mallory is not allowed");

    let err = client
        .handle_authorization(Request::new(HandleAuthorizationRequest::default()))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);

    drop(client);
    server.stop().await.unwrap();
    assert!(done_rx.await.unwrap().is_ok());
}

#[tokio::test]
async fn stop_waits_for_in_flight_calls() {
    common::init_tracing();

    let started = Arc::new(Notify::new());
    let handler = Slow {
        started: started.clone(),
    };
    let server = AuthorizationServer::bind_with_handler("127.0.0.1:0", handler)
        .await
        .unwrap();
    let (done_tx, done_rx) = oneshot::channel();
    let serving = server.clone();
    tokio::spawn(async move { serving.run(done_tx).await });
    common::wait_until_serving(&server).await;

    let mut client = HandleAuthorizationServiceClient::connect(common::endpoint(&server))
        .await
        .expect("Failed to connect to server");
    let call = tokio::spawn(async move {
        client
            .handle_authorization(Request::new(HandleAuthorizationRequest::default()))
            .await
    });

    started.notified().await;
    server.stop().await.unwrap();

    let response = call.await.unwrap().expect("in-flight call should complete");
    assert_eq!(response.into_inner().valid_use_count, 1);
    assert!(done_rx.await.unwrap().is_ok());
}
