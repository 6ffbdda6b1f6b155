//! In-process coordinator and ingestion servers shared by the integration tests

#![allow(dead_code)]

use futures::{SinkExt, Stream, StreamExt};
use siphon_agent::IngestMessage;
use siphon_domain::{ContentRef, Task};
use siphon_grpc::conversions::task_to_proto;
use siphon_grpc::proto::{
    self, HeartbeatRequest, HeartbeatResponse, RegisterExecutorRequest, RegisterExecutorResponse,
};
use siphon_grpc::{CoordinatorService, CoordinatorServiceServer};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tonic::{Request, Response, Status, Streaming};

pub fn task(id: &str, extractor: &str, url: &str) -> Task {
    Task {
        id: id.to_string(),
        extractor: extractor.to_string(),
        namespace: "default".to_string(),
        content: ContentRef {
            id: format!("content-{id}"),
            storage_url: url.to_string(),
            mime: "text/plain".to_string(),
            labels: HashMap::new(),
        },
        input_params: None,
        output_index_mapping: HashMap::from([("out".to_string(), "table".to_string())]),
        extraction_policy: "policy".to_string(),
    }
}

/// Poll `check` until it holds or five seconds pass
pub async fn eventually(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Coordinator that answers every heartbeat with the same task list
#[derive(Clone, Default)]
pub struct MockCoordinator {
    pub registrations: Arc<Mutex<Vec<RegisterExecutorRequest>>>,
    pub heartbeats: Arc<Mutex<Vec<HeartbeatRequest>>>,
    pub tasks: Vec<proto::Task>,
    /// Heartbeat calls to reject before accepting one
    pub reject_heartbeats: Arc<AtomicUsize>,
    /// Registrations to leave unanswered before answering one
    pub stall_registrations: Arc<AtomicUsize>,
    /// Send the task list on the first response only
    pub deliver_once: bool,
    delivered: Arc<AtomicBool>,
}

impl MockCoordinator {
    pub fn with_tasks(tasks: &[Task]) -> Self {
        Self {
            tasks: tasks.iter().map(task_to_proto).collect(),
            ..Default::default()
        }
    }

    pub fn registrations(&self) -> usize {
        self.registrations.lock().unwrap().len()
    }

    /// Serve on an ephemeral port
    pub async fn spawn(&self) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let service = CoordinatorServiceServer::new(self.clone());
        tokio::spawn(
            tonic::transport::Server::builder()
                .add_service(service)
                .serve_with_incoming(TcpListenerStream::new(listener)),
        );
        addr
    }
}

#[tonic::async_trait]
impl CoordinatorService for MockCoordinator {
    async fn register_executor(
        &self,
        request: Request<RegisterExecutorRequest>,
    ) -> Result<Response<RegisterExecutorResponse>, Status> {
        let request = request.into_inner();
        let executor_id = request.executor_id.clone();
        self.registrations.lock().unwrap().push(request);
        let stalled = self
            .stall_registrations
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if stalled.is_ok() {
            std::future::pending::<()>().await;
        }
        Ok(Response::new(RegisterExecutorResponse { executor_id }))
    }

    type HeartbeatStream = Pin<Box<dyn Stream<Item = Result<HeartbeatResponse, Status>> + Send>>;

    async fn heartbeat(
        &self,
        request: Request<Streaming<HeartbeatRequest>>,
    ) -> Result<Response<Self::HeartbeatStream>, Status> {
        let rejected = self
            .reject_heartbeats
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if rejected.is_ok() {
            return Err(Status::unavailable("coordinator restarting"));
        }

        let mut inbound = request.into_inner();
        let heartbeats = Arc::clone(&self.heartbeats);
        let tasks = self.tasks.clone();
        let deliver_once = self.deliver_once;
        let delivered = Arc::clone(&self.delivered);
        let (tx, rx) = mpsc::channel(4);

        tokio::spawn(async move {
            while let Ok(Some(heartbeat)) = inbound.message().await {
                heartbeats.lock().unwrap().push(heartbeat.clone());
                let already = delivered.swap(true, Ordering::SeqCst);
                let response = HeartbeatResponse {
                    executor_id: heartbeat.executor_id,
                    tasks: if deliver_once && already { Vec::new() } else { tasks.clone() },
                };
                if tx.send(Ok(response)).await.is_err() {
                    break;
                }
            }
        });

        Ok(Response::new(Box::pin(ReceiverStream::new(rx))))
    }
}

/// How the ingestion server answers a report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Read the whole report, then send this text frame
    Ack(&'static str),
    /// Read the whole report, then close with code 1000
    CloseNormal,
    /// Read the first message, then drop the connection
    Drop,
    /// Read the whole report, then hold the connection open without answering
    Silent,
}

/// Ingestion server accepting `connections` reports
///
/// Returns the websocket URL and a handle yielding every report received.
pub async fn spawn_ingestion(connections: usize, reply: Reply) -> (String, JoinHandle<Vec<Vec<IngestMessage>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/write_content", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let mut reports = Vec::new();
        for _ in 0..connections {
            let (stream, _) = listener.accept().await.unwrap();
            let mut socket = tokio_tungstenite::accept_async(stream).await.unwrap();
            let mut received = Vec::new();

            while let Some(Ok(Message::Text(text))) = socket.next().await {
                let message: IngestMessage = serde_json::from_str(&text).unwrap();
                let finished = matches!(message, IngestMessage::FinishExtractedContentIngest { .. });
                received.push(message);
                if finished || reply == Reply::Drop {
                    break;
                }
            }

            match reply {
                Reply::Ack(text) => socket.send(Message::Text(text.to_string())).await.unwrap(),
                Reply::CloseNormal => {
                    let frame = CloseFrame {
                        code: CloseCode::Normal,
                        reason: "done".into(),
                    };
                    socket.close(Some(frame)).await.unwrap();
                }
                Reply::Drop => {
                    drop(socket);
                    reports.push(received);
                    continue;
                }
                Reply::Silent => {
                    // Keep reading so the client side stays connected
                    while let Some(Ok(message)) = socket.next().await {
                        if message.is_close() {
                            break;
                        }
                    }
                    reports.push(received);
                    continue;
                }
            }

            while let Some(Ok(_)) = socket.next().await {}
            reports.push(received);
        }
        reports
    });

    (url, handle)
}
