use std::sync::Arc;

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response};
use prometheus::{Encoder, TextEncoder};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::RuntimeConfig;
use crate::consensus::snow::Snow;
use crate::consensus_service::pb::consensus_service_server::ConsensusServiceServer;
use crate::consensus_service::ConsensusServiceSVC;
use crate::message_service::pb::message_service_server::MessageServiceServer;
use crate::message_service::MessageServiceSVC;
use crate::metrics;
use crate::p2p::message::MessageManager;
use crate::p2p::peer::PeerManager;
use crate::peer_service::pb::peer_service_server::PeerServiceServer;
use crate::peer_service::PeerServiceSVC;

/// One p2p node: peer directory, consensus engine, message manager and the
/// gRPC server exposing their inbound endpoints.
pub struct Node {
    config: RuntimeConfig,
    pub peer_manager: Arc<PeerManager>,
    pub consensus: Arc<Snow>,
    pub message_manager: Arc<MessageManager>,
    shutdown: Option<oneshot::Sender<()>>,
    server_task: Option<JoinHandle<()>>,
}

impl Node {
    pub fn new(config: RuntimeConfig) -> Self {
        let peer_manager = Arc::new(PeerManager::new(&config));
        let consensus = Arc::new(Snow::new(config.snow, peer_manager.clone()));
        let message_manager = Arc::new(MessageManager::new());
        Node {
            config,
            peer_manager,
            consensus,
            message_manager,
            shutdown: None,
            server_task: None,
        }
    }

    pub fn addr(&self) -> &str {
        &self.config.addr
    }

    /// Starts the gRPC server, the metrics endpoint and peer discovery.
    pub async fn start(&mut self) -> anyhow::Result<()> {
        self.start_grpc_server().await?;
        if !self.config.metrics_addr.is_empty() {
            self.start_metrics_server().await?;
        }
        self.peer_manager
            .clone()
            .start_discover_peers(&self.config.bootstrap)
            .await;
        Ok(())
    }

    /// Stops discovery, waits for the gossip task to exit, then shuts the
    /// gRPC server down and waits until it has stopped serving.
    pub async fn stop(&mut self) {
        self.peer_manager.stop_discover_peers().await;
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.server_task.take() {
            let _ = task.await;
        }
        log::info!("server stopped: {}", self.config.addr);
    }

    async fn start_grpc_server(&mut self) -> anyhow::Result<()> {
        let addr = self.config.addr.parse()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let peer_service = PeerServiceSVC::new(self.peer_manager.clone());
        let consensus_service = ConsensusServiceSVC::new(self.consensus.clone());
        let message_service = MessageServiceSVC::new(self.message_manager.clone());
        let grpc_server = tonic::transport::Server::builder()
            .add_service(PeerServiceServer::new(peer_service))
            .add_service(ConsensusServiceServer::new(consensus_service))
            .add_service(MessageServiceServer::new(message_service))
            .serve_with_shutdown(addr, async {
                let _ = shutdown_rx.await;
            });
        self.server_task = Some(tokio::spawn(async move {
            if let Err(e) = grpc_server.await {
                log::error!("grpc server error: {}", e);
            }
        }));
        self.shutdown = Some(shutdown_tx);
        log::info!("grpc server started on {}", addr);
        Ok(())
    }

    async fn start_metrics_server(&mut self) -> anyhow::Result<()> {
        let addr = self.config.metrics_addr.parse()?;
        let make_svc = make_service_fn(move |_| {
            let registry = metrics::REGISTRY_INSTANCE.clone();
            async move {
                Ok::<_, hyper::Error>(service_fn(move |_: Request<Body>| {
                    let registry = registry.clone();
                    async move {
                        let encoder = TextEncoder::new();
                        let metric_families = registry.gather();
                        let mut buffer = Vec::new();
                        encoder.encode(&metric_families, &mut buffer).unwrap();
                        Ok::<_, hyper::Error>(Response::new(Body::from(buffer)))
                    }
                }))
            }
        });
        metrics::init_registry();
        let server = hyper::Server::bind(&addr).serve(make_svc);
        tokio::spawn(async move {
            if let Err(e) = server.await {
                log::error!("metrics server error: {}", e);
            }
        });
        log::info!("metrics server started on {}", addr);
        Ok(())
    }
}
