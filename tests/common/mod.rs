//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use gnmi_server::config::ServerConfig;
use gnmi_server::net::Listener;
use gnmi_server::proto::gnmi::{update_result::Operation, GetResponse, Notification, SetResponse, UpdateResult};
use gnmi_server::{
    delete_handler, read_handler, update_handler, DeleteHandler, GnmiClient, GrpcServer, ReadHandler,
    ServerError, Shutdown, TlsSecret, UpdateHandler,
};

/// A server running on an ephemeral loopback port.
pub struct TestServer {
    pub addr: SocketAddr,
    shutdown: Shutdown,
    handle: JoinHandle<Result<(), ServerError>>,
}

impl TestServer {
    pub fn client(&self) -> GnmiClient {
        GnmiClient::new(&self.addr.to_string()).unwrap()
    }

    /// Trigger shutdown and wait for the server to return.
    pub async fn stop(self) -> Result<(), ServerError> {
        self.shutdown.trigger();
        self.handle.await.unwrap()
    }
}

/// Plaintext config suitable for tests.
pub fn insecure_config() -> ServerConfig {
    ServerConfig {
        insecure: true,
        ..Default::default()
    }
}

/// Start `server` on 127.0.0.1 with an OS-assigned port.
pub async fn spawn_server(server: GrpcServer) -> TestServer {
    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let listener = Listener::from_tcp(tcp, 64).unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    let handle = tokio::spawn(server.run(listener, rx));

    TestServer { addr, shutdown, handle }
}

/// Records every handler invocation as `"<role>:<tag>"`.
#[derive(Clone, Default)]
pub struct Recorder {
    calls: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn push(&self, entry: String) {
        self.calls.lock().push(entry);
    }

    /// Read handler answering one notification stamped with `timestamp`.
    pub fn read(&self, tag: &str, timestamp: i64) -> ReadHandler {
        let recorder = self.clone();
        let tag = tag.to_string();
        read_handler(move |_ctx, _req| {
            recorder.push(format!("read:{}", tag));
            async move {
                Ok(GetResponse {
                    notification: vec![Notification {
                        timestamp,
                        ..Default::default()
                    }],
                })
            }
        })
    }

    pub fn update(&self, role: &str, op: Operation) -> UpdateHandler {
        let recorder = self.clone();
        let role = role.to_string();
        update_handler(move |_ctx, _prefix, update| {
            let path = update.path.map(|p| p.to_string()).unwrap_or_default();
            recorder.push(format!("{}:{}", role, path));
            async move {
                Ok(SetResponse {
                    response: vec![UpdateResult {
                        path: None,
                        op: op as i32,
                    }],
                    ..Default::default()
                })
            }
        })
    }

    pub fn delete(&self) -> DeleteHandler {
        let recorder = self.clone();
        delete_handler(move |_ctx, _prefix, path| {
            recorder.push(format!("delete:{}", path));
            async move {
                Ok(SetResponse {
                    response: vec![UpdateResult {
                        path: Some(path),
                        op: Operation::Delete as i32,
                    }],
                    ..Default::default()
                })
            }
        })
    }
}

/// A CA and a `localhost` leaf certificate it signed.
pub struct TestPki {
    pub ca_pem: String,
    pub cert_pem: String,
    pub key_pem: String,
    pub cert_der: Vec<u8>,
}

impl TestPki {
    pub fn generate() -> Self {
        use rcgen::{BasicConstraints, CertificateParams, IsCa, KeyPair};

        let ca_key = KeyPair::generate().unwrap();
        let mut ca_params = CertificateParams::new(Vec::<String>::new()).unwrap();
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let ca = ca_params.self_signed(&ca_key).unwrap();

        let leaf_key = KeyPair::generate().unwrap();
        let leaf_params = CertificateParams::new(vec!["localhost".to_string()]).unwrap();
        let leaf = leaf_params.signed_by(&leaf_key, &ca, &ca_key).unwrap();

        Self {
            ca_pem: ca.pem(),
            cert_pem: leaf.pem(),
            key_pem: leaf_key.serialize_pem(),
            cert_der: leaf.der().to_vec(),
        }
    }

    pub fn secret(&self) -> TlsSecret {
        TlsSecret {
            certificate: self.cert_pem.clone().into_bytes(),
            private_key: self.key_pem.clone().into_bytes(),
            ca: None,
        }
    }
}
