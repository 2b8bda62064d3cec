//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{json, Map, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use flowgate::auth::generate_credential;
use flowgate::cache::MemoryCache;
use flowgate::config::GatewayConfig;
use flowgate::lifecycle::Shutdown;
use flowgate::store::{Credential, MemoryStore};
use flowgate::workflow::{Graph, Link, Step, StepKind};
use flowgate::{ExternalServices, HttpServer};

pub const ORIGIN: &str = "http://localhost:3000";
pub const ADMIN_KEY: &str = "integration-admin-key";

/// A running gateway bound to an ephemeral port.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub store: MemoryStore,
    pub cache: MemoryCache,
    pub client: reqwest::Client,
    shutdown: Shutdown,
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Config accepting `ORIGIN`, with the admin API on and roomy budgets.
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.origin.allowed_origins = vec![ORIGIN.into()];
    config.rate_limit.ip_max_requests = 1_000;
    config.rate_limit.user_max_requests = 1_000;
    config.admin.enabled = true;
    config.admin.api_key = ADMIN_KEY.into();
    config
}

pub async fn start_gateway(config: GatewayConfig) -> TestGateway {
    let store = MemoryStore::new();
    let cache = MemoryCache::new();

    let server = HttpServer::new(
        config,
        ExternalServices {
            credentials: Arc::new(store.clone()),
            graphs: Arc::new(store.clone()),
            cache: Some(Arc::new(cache.clone())),
        },
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let (_, config_updates) = mpsc::unbounded_channel();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, config_updates, server_shutdown).await;
    });

    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap();

    TestGateway {
        addr,
        store,
        cache,
        client,
        shutdown,
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Seed a live credential plus membership; returns the raw secret.
    pub fn seed_credential(&self, id: &str, user_id: &str, tenant_id: &str) -> String {
        let (secret, hash) = generate_credential();
        self.store.insert_credential(Credential {
            id: id.into(),
            owner_user_id: user_id.into(),
            tenant_id: tenant_id.into(),
            secret_hash: hash,
            created_at: unix_now(),
            expires_at: unix_now() + 3_600,
            revoked_at: None,
            last_used_at: None,
            display_name: format!("{id} key"),
        });
        self.store.add_membership(tenant_id, user_id);
        secret
    }

    /// `entry → <id>:<capability> → exit` owned by `tenant_id`.
    pub fn seed_linear_graph(
        &self,
        graph_id: &str,
        tenant_id: &str,
        capability: &str,
        static_parameters: Value,
    ) {
        let static_parameters: Map<String, Value> = match static_parameters {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let step = |id: &str, kind: StepKind, capability: Option<&str>, params: Map<String, Value>| Step {
            id: id.into(),
            kind,
            capability: capability.map(str::to_string),
            static_parameters: params,
        };
        let link = |id: &str, from: &str, to: &str| Link {
            id: id.into(),
            source_step_id: from.into(),
            target_step_id: to.into(),
            source_port: None,
            target_port: None,
        };
        self.store.insert_graph(Graph {
            id: graph_id.into(),
            tenant_id: tenant_id.into(),
            name: format!("{graph_id} workflow"),
            description: String::new(),
            steps: vec![
                step("entry", StepKind::Entry, None, Map::new()),
                step("work", StepKind::Action, Some(capability), static_parameters),
                step("exit", StepKind::Exit, None, Map::new()),
            ],
            links: vec![link("l1", "entry", "work"), link("l2", "work", "exit")],
        });
    }

    /// A JSON-RPC POST carrying the allowed origin and `secret`.
    pub fn rpc(&self, secret: &str, method: &str, params: Value) -> reqwest::RequestBuilder {
        self.client
            .post(self.url("/rpc"))
            .header("origin", ORIGIN)
            .bearer_auth(secret)
            .json(&json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params }))
    }
}

/// Status, headers and decoded envelope.
pub async fn read(res: reqwest::Response) -> (u16, reqwest::header::HeaderMap, Value) {
    let status = res.status().as_u16();
    let headers = res.headers().clone();
    let body = res.json::<Value>().await.unwrap_or(Value::Null);
    (status, headers, body)
}
