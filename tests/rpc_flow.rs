//! End-to-end tests of the JSON-RPC pipeline against a live listener.

use serde_json::{json, Value};

mod common;

use common::{read, start_gateway, test_config, ADMIN_KEY, ORIGIN};

#[tokio::test]
async fn test_health() {
    let gw = start_gateway(test_config()).await;
    let (status, _, body) = read(gw.client.get(gw.url("/health")).send().await.unwrap()).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_foreign_origin_is_rejected_before_authentication() {
    let gw = start_gateway(test_config()).await;
    let secret = gw.seed_credential("cred-1", "alice", "t1");

    let res = gw
        .client
        .post(gw.url("/rpc"))
        .header("origin", "https://evil.example")
        .bearer_auth(&secret)
        .json(&json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" }))
        .send()
        .await
        .unwrap();
    let (status, headers, body) = read(res).await;

    assert_eq!(status, 403);
    assert_eq!(body["error"]["code"], -32000);
    assert!(headers.get("access-control-allow-origin").is_none());
    // rejected before the token was looked at
    assert!(gw.store.credential("cred-1").unwrap().last_used_at.is_none());
}

#[tokio::test]
async fn test_credential_failures_have_distinct_codes() {
    let gw = start_gateway(test_config()).await;

    let res = gw
        .client
        .post(gw.url("/rpc"))
        .header("origin", ORIGIN)
        .json(&json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" }))
        .send()
        .await
        .unwrap();
    let (status, _, body) = read(res).await;
    assert_eq!(status, 401);
    assert_eq!(body["error"]["code"], -32001);

    let (status, _, body) = read(gw.rpc("not-a-key", "ping", json!({})).send().await.unwrap()).await;
    assert_eq!(status, 401);
    assert_eq!(body["error"]["code"], -32002);

    let (unknown, _) = flowgate::auth::generate_credential();
    let (status, _, body) = read(gw.rpc(&unknown, "ping", json!({})).send().await.unwrap()).await;
    assert_eq!(status, 401);
    assert_eq!(body["error"]["code"], -32003);
    assert_eq!(body["error"]["message"], "Invalid credential");
}

#[tokio::test]
async fn test_workflow_execution_end_to_end() {
    let gw = start_gateway(test_config()).await;
    let secret = gw.seed_credential("cred-1", "alice", "t1");
    gw.seed_linear_graph(
        "greet",
        "t1",
        "text.template",
        json!({ "template": "Hello {{name}}" }),
    );

    let res = gw
        .rpc(
            &secret,
            "workflows/execute",
            json!({ "graph_id": "greet", "parameters": { "name": "Ada", "api_key": "leak" } }),
        )
        .send()
        .await
        .unwrap();
    let (status, headers, body) = read(res).await;

    assert_eq!(status, 200, "{body}");
    let result = &body["result"];
    assert_eq!(result["output"]["text"], "Hello Ada");
    assert_eq!(result["metadata"]["steps_executed"], 3);
    assert_eq!(
        result["metadata"]["execution_order"],
        json!(["entry", "work", "exit"])
    );
    assert_eq!(headers["access-control-allow-origin"], ORIGIN);
    assert!(headers.get("x-ratelimit-remaining").is_some());

    let session_id = headers["x-session-id"].to_str().unwrap().to_string();
    assert_eq!(session_id.len(), 64);

    // presenting the session keeps it
    let res = gw
        .rpc(&secret, "ping", json!({}))
        .header("x-session-id", &session_id)
        .send()
        .await
        .unwrap();
    let (status, headers, _) = read(res).await;
    assert_eq!(status, 200);
    assert_eq!(headers["x-session-id"], session_id.as_str());
}

#[tokio::test]
async fn test_credential_shaped_parameters_never_reach_capabilities() {
    let gw = start_gateway(test_config()).await;
    let secret = gw.seed_credential("cred-1", "alice", "t1");
    gw.seed_linear_graph("mirror", "t1", "echo", json!({ "mode": "static", "password": "hunter2" }));

    let res = gw
        .rpc(
            &secret,
            "workflows/execute",
            json!({ "graph_id": "mirror", "parameters": { "keep": 1, "Access-Token": "x", "nested": { "secret": "y" } } }),
        )
        .send()
        .await
        .unwrap();
    let (_, _, body) = read(res).await;
    let output = &body["result"]["output"];

    assert_eq!(output["keep"], 1);
    assert_eq!(output["mode"], "static");
    assert!(output.get("Access-Token").is_none());
    assert!(output.get("password").is_none());
    assert_eq!(output["nested"], json!({}));
    // the reserved key is consumed by the step, never passed on
    assert!(output.get("prior_outputs").is_none());
}

#[tokio::test]
async fn test_foreign_tenant_graph_is_not_found() {
    let gw = start_gateway(test_config()).await;
    let secret = gw.seed_credential("cred-1", "alice", "t1");
    gw.seed_linear_graph("theirs", "t2", "echo", json!({}));

    let res = gw
        .rpc(&secret, "workflows/execute", json!({ "graph_id": "theirs" }))
        .send()
        .await
        .unwrap();
    let (status, _, body) = read(res).await;
    assert_eq!(status, 200);
    assert_eq!(body["error"]["code"], -32014);

    let (_, _, body) = read(gw.rpc(&secret, "workflows/list", json!({})).send().await.unwrap()).await;
    assert_eq!(body["result"]["workflows"], json!([]));
}

#[tokio::test]
async fn test_ip_budget_returns_429_with_retry_after() {
    let mut config = test_config();
    config.rate_limit.ip_max_requests = 2;
    let gw = start_gateway(config).await;
    let secret = gw.seed_credential("cred-1", "alice", "t1");

    for _ in 0..2 {
        let res = gw.rpc(&secret, "ping", json!({})).send().await.unwrap();
        assert_eq!(res.status(), 200);
    }

    let (status, headers, body) = read(gw.rpc(&secret, "ping", json!({})).send().await.unwrap()).await;
    assert_eq!(status, 429);
    assert_eq!(body["error"]["code"], -32029);
    assert_eq!(headers["x-ratelimit-limit"], "2");
    assert_eq!(headers["x-ratelimit-remaining"], "0");
    let retry_after: u64 = headers["retry-after"].to_str().unwrap().parse().unwrap();
    assert!(retry_after > 0);
}

#[tokio::test]
async fn test_membership_loss_revokes_credential() {
    let gw = start_gateway(test_config()).await;
    let secret = gw.seed_credential("cred-1", "alice", "t1");

    let (status, headers, _) = read(gw.rpc(&secret, "ping", json!({})).send().await.unwrap()).await;
    assert_eq!(status, 200);
    let session_id = headers["x-session-id"].to_str().unwrap().to_string();

    gw.store.remove_membership("t1", "alice");

    let res = gw
        .rpc(&secret, "ping", json!({}))
        .header("x-session-id", &session_id)
        .send()
        .await
        .unwrap();
    let (status, _, body) = read(res).await;
    assert_eq!(status, 401);
    assert_eq!(body["error"]["code"], -32005);
    assert!(gw.store.credential("cred-1").unwrap().is_revoked());

    let (status, _, body) = read(gw.rpc(&secret, "ping", json!({})).send().await.unwrap()).await;
    assert_eq!(status, 401);
    assert_eq!(body["error"]["code"], -32003);

    // the revoked credential's session went with it
    gw.store.add_membership("t1", "alice");
    let other = gw.seed_credential("cred-2", "alice", "t1");
    let res = gw
        .rpc(&other, "ping", json!({}))
        .header("x-session-id", &session_id)
        .send()
        .await
        .unwrap();
    let (_, _, body) = read(res).await;
    assert_eq!(body["error"]["code"], -32006);
}

#[tokio::test]
async fn test_session_hijack_and_unknown_session() {
    let gw = start_gateway(test_config()).await;
    let alice = gw.seed_credential("cred-a", "alice", "t1");
    let mallory = gw.seed_credential("cred-m", "mallory", "t1");

    let (_, headers, _) = read(gw.rpc(&alice, "ping", json!({})).send().await.unwrap()).await;
    let session_id = headers["x-session-id"].to_str().unwrap().to_string();

    let res = gw
        .rpc(&mallory, "ping", json!({}))
        .header("x-session-id", &session_id)
        .send()
        .await
        .unwrap();
    let (status, headers, body) = read(res).await;
    assert_eq!(status, 403);
    assert_eq!(body["error"]["code"], -32007);
    assert!(headers.get("x-session-id").is_none());

    let res = gw
        .rpc(&alice, "ping", json!({}))
        .header("x-session-id", "0".repeat(64))
        .send()
        .await
        .unwrap();
    let (status, _, body) = read(res).await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], -32006);
}

#[tokio::test]
async fn test_logout_invalidates_session() {
    let gw = start_gateway(test_config()).await;
    let secret = gw.seed_credential("cred-1", "alice", "t1");

    let (_, headers, _) = read(gw.rpc(&secret, "ping", json!({})).send().await.unwrap()).await;
    let session_id = headers["x-session-id"].to_str().unwrap().to_string();

    let res = gw
        .client
        .delete(gw.url("/rpc"))
        .header("origin", ORIGIN)
        .header("x-session-id", &session_id)
        .bearer_auth(&secret)
        .send()
        .await
        .unwrap();
    let (status, _, body) = read(res).await;
    assert_eq!(status, 200);
    assert_eq!(body["result"]["logged_out"], true);

    let res = gw
        .rpc(&secret, "ping", json!({}))
        .header("x-session-id", &session_id)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);
}

#[tokio::test]
async fn test_preflight_reflects_single_origin() {
    let mut config = test_config();
    config
        .origin
        .allowed_origins
        .push("https://app.example.com".into());
    let gw = start_gateway(config).await;

    let res = gw
        .client
        .request(reqwest::Method::OPTIONS, gw.url("/rpc"))
        .header("origin", "https://app.example.com")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 204);
    let allowed: Vec<_> = res
        .headers()
        .get_all("access-control-allow-origin")
        .iter()
        .collect();
    assert_eq!(allowed.len(), 1);
    assert_eq!(allowed[0], "https://app.example.com");

    let res = gw
        .client
        .request(reqwest::Method::OPTIONS, gw.url("/rpc"))
        .header("origin", "https://evil.example")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 403);
    assert!(res.headers().get("access-control-allow-origin").is_none());
}

#[tokio::test]
async fn test_tools_call_refuses_credential_arguments() {
    let gw = start_gateway(test_config()).await;
    let secret = gw.seed_credential("cred-1", "alice", "t1");

    let res = gw
        .rpc(
            &secret,
            "tools/call",
            json!({ "name": "echo", "arguments": { "user": { "Password": "x" } } }),
        )
        .send()
        .await
        .unwrap();
    let (status, _, body) = read(res).await;
    assert_eq!(status, 200);
    assert_eq!(body["error"]["code"], -32013);
    assert_eq!(body["error"]["data"]["keys"], json!(["user.Password"]));

    let res = gw
        .rpc(
            &secret,
            "tools/call",
            json!({ "name": "math.sum", "arguments": { "values": [1, 2, 3.5] } }),
        )
        .send()
        .await
        .unwrap();
    let (_, _, body) = read(res).await;
    assert_eq!(body["result"]["output"]["sum"], 6.5);

    let res = gw
        .rpc(&secret, "tools/call", json!({ "name": "os.exec" }))
        .send()
        .await
        .unwrap();
    let (_, _, body) = read(res).await;
    assert_eq!(body["error"]["code"], -32011);
}

#[tokio::test]
async fn test_protocol_errors() {
    let gw = start_gateway(test_config()).await;
    let secret = gw.seed_credential("cred-1", "alice", "t1");

    let (status, _, body) = read(gw.rpc(&secret, "nope/missing", json!({})).send().await.unwrap()).await;
    assert_eq!(status, 200);
    assert_eq!(body["error"]["code"], -32601);

    let res = gw
        .client
        .post(gw.url("/rpc"))
        .header("origin", ORIGIN)
        .header("content-type", "application/json")
        .bearer_auth(&secret)
        .body("{oops")
        .send()
        .await
        .unwrap();
    let (status, _, body) = read(res).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], -32700);

    let (_, _, body) = read(gw.rpc(&secret, "workflows/execute", json!({ "parameters": {} })).send().await.unwrap()).await;
    assert_eq!(body["error"]["code"], -32602);

    let (_, _, body) = read(gw.rpc(&secret, "tools/list", json!({})).send().await.unwrap()).await;
    let tools: Vec<Value> = body["result"]["tools"].as_array().unwrap().clone();
    assert!(tools.iter().any(|t| t["name"] == "text.template"));
}

#[tokio::test]
async fn test_admin_endpoints_require_key() {
    let gw = start_gateway(test_config()).await;
    let secret = gw.seed_credential("cred-1", "alice", "t1");
    gw.rpc(&secret, "ping", json!({})).send().await.unwrap();

    let res = gw.client.get(gw.url("/admin/metrics")).send().await.unwrap();
    assert_eq!(res.status(), 401);
    let res = gw
        .client
        .get(gw.url("/admin/metrics"))
        .bearer_auth("wrong-key")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);

    let (status, _, body) = read(
        gw.client
            .get(gw.url("/admin/metrics"))
            .bearer_auth(ADMIN_KEY)
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["requests"], 1);
    assert_eq!(body["connected_credentials"], 1);

    let (status, _, body) = read(
        gw.client
            .get(gw.url("/admin/sessions?tenant_id=t1"))
            .bearer_auth(ADMIN_KEY)
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["sessions"].as_array().unwrap().len(), 1);

    let (status, _, body) = read(
        gw.client
            .post(gw.url("/admin/sessions/cleanup"))
            .bearer_auth(ADMIN_KEY)
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["removed"], 0);
}

#[tokio::test]
async fn test_undecodable_origin_is_rejected() {
    let gw = start_gateway(test_config()).await;
    let secret = gw.seed_credential("cred-1", "alice", "t1");

    let res = gw
        .client
        .post(gw.url("/rpc"))
        .header(
            "origin",
            reqwest::header::HeaderValue::from_bytes(b"http://localhost:3000\xff").unwrap(),
        )
        .bearer_auth(&secret)
        .json(&json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" }))
        .send()
        .await
        .unwrap();
    let (status, headers, body) = read(res).await;

    assert_eq!(status, 403);
    assert_eq!(body["error"]["code"], -32000);
    assert!(headers.get("access-control-allow-origin").is_none());
}

#[tokio::test]
async fn test_oversized_body_is_refused() {
    let mut config = test_config();
    config.security.max_body_size = 1_024;
    let gw = start_gateway(config).await;
    let secret = gw.seed_credential("cred-1", "alice", "t1");

    let padding = "x".repeat(8 * 1_024);
    let res = gw
        .rpc(&secret, "ping", json!({ "padding": padding }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 413);

    let res = gw.rpc(&secret, "ping", json!({})).send().await.unwrap();
    assert_eq!(res.status(), 200);
}
