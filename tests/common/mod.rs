//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};

use compute_router::autoscale::{FleetScaler, ScaleRequest};
use compute_router::cluster::{Cluster, ClusterSettings};
use compute_router::error::{Result, RouterError};
use compute_router::load_balancer::WorkloadClass;
use compute_router::net::Connector;
use compute_router::orchestrator::{Orchestrator, PodInfo, PodRole, PodSelector};

/// Start a backend that accepts connections and holds them open.
pub async fn start_mock_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    addr
}

/// Connector whose probes follow a script and whose dials go to the real
/// address unless the address is scripted down. Probes do no I/O.
#[derive(Default)]
pub struct ScriptedConnector {
    down: Mutex<HashSet<String>>,
    dials: AtomicUsize,
    probes: AtomicUsize,
}

impl ScriptedConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_down(&self, addr: &str, down: bool) {
        let mut set = self.down.lock().unwrap();
        if down {
            set.insert(addr.to_string());
        } else {
            set.remove(addr);
        }
    }

    fn is_down(&self, addr: &str) -> bool {
        self.down.lock().unwrap().contains(addr)
    }

    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, addr: &str) -> io::Result<TcpStream> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        if self.is_down(addr) {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "scripted down"));
        }
        TcpStream::connect(addr).await
    }

    async fn probe(&self, addr: &str) -> io::Result<()> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.is_down(addr) {
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, "scripted down"))
        } else {
            Ok(())
        }
    }
}

/// Orchestrator over a mutable pod list.
#[derive(Default)]
pub struct MockOrchestrator {
    pods: Mutex<Vec<PodInfo>>,
    lookups: AtomicUsize,
}

impl MockOrchestrator {
    pub fn new(pods: Vec<PodInfo>) -> Arc<Self> {
        Arc::new(Self {
            pods: Mutex::new(pods),
            lookups: AtomicUsize::new(0),
        })
    }

    pub fn set_pods(&self, pods: Vec<PodInfo>) {
        *self.pods.lock().unwrap() = pods;
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Orchestrator for MockOrchestrator {
    async fn list_pods(&self, _cluster: &str, namespace: &str, selector: PodSelector) -> Result<Vec<PodInfo>> {
        Ok(self
            .pods
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.namespace == namespace && p.matches(selector))
            .cloned()
            .collect())
    }

    async fn get_pod(&self, name: &str, namespace: &str) -> Result<Option<PodInfo>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .pods
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.name == name && p.namespace == namespace)
            .cloned())
    }
}

/// Records every scale request; optionally fails them.
#[derive(Default)]
pub struct RecordingScaler {
    requests: Mutex<Vec<ScaleRequest>>,
    fail: bool,
}

impl RecordingScaler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    pub fn requests(&self) -> Vec<ScaleRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl FleetScaler for RecordingScaler {
    async fn request_scale(&self, request: &ScaleRequest) -> Result<()> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail {
            return Err(RouterError::Scaler("scripted failure".into()));
        }
        Ok(())
    }
}

pub fn compute_pod(name: &str, class: WorkloadClass, ready: bool) -> PodInfo {
    PodInfo {
        name: name.into(),
        namespace: "prod".into(),
        peer_service: "db-peer".into(),
        role: PodRole::Compute,
        class: Some(class),
        ready,
        marked_for_deletion: false,
        cpu_request: Some("2".into()),
    }
}

pub fn proxy_pod(name: &str) -> PodInfo {
    PodInfo {
        name: name.into(),
        namespace: "prod".into(),
        peer_service: String::new(),
        role: PodRole::Proxy,
        class: None,
        ready: true,
        marked_for_deletion: false,
        cpu_request: None,
    }
}

pub fn settings() -> ClusterSettings {
    ClusterSettings {
        name: "orders".into(),
        namespace: "prod".into(),
        ..ClusterSettings::default()
    }
}

pub fn cluster(connector: Arc<ScriptedConnector>, orchestrator: Arc<MockOrchestrator>) -> Arc<Cluster> {
    cluster_with(settings(), connector, orchestrator)
}

pub fn cluster_with(
    settings: ClusterSettings,
    connector: Arc<ScriptedConnector>,
    orchestrator: Arc<MockOrchestrator>,
) -> Arc<Cluster> {
    Arc::new(Cluster::new(settings, connector, orchestrator))
}

/// Let spawned fire-and-forget tasks run.
pub async fn settle() {
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
}
