//! Typed calls to the worker.

use std::sync::Arc;
use std::time::Duration;

use pacnotify_protocol::constants::WS_REQUEST_TIMEOUT;
use pacnotify_protocol::messages::{
    AddDatabaseRequest, AnswerRequest, InitRequest, InitializeEngineRequest, MethodResult,
    PackageListResponse, SyncResponse, SynchronizeRequest,
};
use pacnotify_protocol::{
    Answer, DatabaseSyncResult, EngineOptions, InitMode, MessageType, TransactionState,
};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::ClientError;
use crate::ws_client::WsClient;

/// One method per worker call.
///
/// Short calls use [`WS_REQUEST_TIMEOUT`]. Engine-bound calls
/// (`synchronize_databases`, `compute_package_list`, `perform_upgrade`)
/// wait for as long as the worker needs.
#[derive(Clone)]
pub struct WorkerProxy {
    client: Arc<WsClient>,
}

impl WorkerProxy {
    pub fn new(client: Arc<WsClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &WsClient {
        &self.client
    }

    async fn call<P: Serialize, R: DeserializeOwned>(
        &self,
        msg_type: MessageType,
        payload: Option<&P>,
        reply_type: MessageType,
        timeout: Option<Duration>,
    ) -> Result<R, ClientError> {
        let reply = self.client.request(msg_type, payload, timeout).await?;
        Ok(reply.expect_payload(reply_type)?)
    }

    async fn state<P: Serialize>(
        &self,
        msg_type: MessageType,
        payload: Option<&P>,
    ) -> Result<TransactionState, ClientError> {
        let result: MethodResult = self
            .call(
                msg_type,
                payload,
                MessageType::MethodResult,
                Some(WS_REQUEST_TIMEOUT),
            )
            .await?;
        Ok(result.state)
    }

    pub async fn init(&self, mode: InitMode) -> Result<TransactionState, ClientError> {
        self.state(MessageType::Init, Some(&InitRequest { mode }))
            .await
    }

    pub async fn initialize_engine(
        &self,
        options: &EngineOptions,
    ) -> Result<TransactionState, ClientError> {
        let req = InitializeEngineRequest {
            options: options.clone(),
        };
        self.state(MessageType::InitializeEngine, Some(&req)).await
    }

    pub async fn add_database(
        &self,
        req: &AddDatabaseRequest,
    ) -> Result<TransactionState, ClientError> {
        self.state(MessageType::AddDatabase, Some(req)).await
    }

    pub async fn synchronize(&self, force: bool) -> Result<Vec<DatabaseSyncResult>, ClientError> {
        let resp: SyncResponse = self
            .call(
                MessageType::SynchronizeDatabases,
                Some(&SynchronizeRequest { force }),
                MessageType::SyncResult,
                None,
            )
            .await?;
        Ok(resp.results)
    }

    pub async fn compute_package_list(&self) -> Result<PackageListResponse, ClientError> {
        self.call::<(), _>(
            MessageType::ComputePackageList,
            None,
            MessageType::PackageList,
            None,
        )
        .await
    }

    pub async fn perform_upgrade(&self) -> Result<TransactionState, ClientError> {
        let result: MethodResult = self
            .call::<(), _>(
                MessageType::PerformUpgrade,
                None,
                MessageType::MethodResult,
                None,
            )
            .await?;
        Ok(result.state)
    }

    pub async fn cancel_upgrade(&self) -> Result<TransactionState, ClientError> {
        self.state::<()>(MessageType::CancelUpgrade, None).await
    }

    pub async fn decline_upgrade(&self) -> Result<TransactionState, ClientError> {
        self.state::<()>(MessageType::DeclineUpgrade, None).await
    }

    pub async fn release_engine(&self) -> Result<TransactionState, ClientError> {
        self.state::<()>(MessageType::ReleaseEngine, None).await
    }

    pub async fn answer(&self, answer: Answer) -> Result<TransactionState, ClientError> {
        self.state(MessageType::Answer, Some(&AnswerRequest { answer }))
            .await
    }
}
