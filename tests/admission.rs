//! End-to-end tests for body buffering and rollout routing through the proxy.

use canary_proxy::RolloutSplitter;
use reqwest::StatusCode;

mod common;

#[tokio::test]
async fn test_small_body_round_trip() {
    let backend = common::start_echo_backend("active").await;
    let (proxy, _shutdown) = common::start_proxy(common::proxy_config(backend.addr)).await;

    let res = common::client()
        .post(format!("http://{}/echo?x=1", proxy))
        .body("hello through the proxy")
        .send()
        .await
        .expect("Proxy unreachable");

    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().contains_key("x-request-id"));
    assert_eq!(res.text().await.unwrap(), "hello through the proxy");
}

#[tokio::test]
async fn test_spilled_request_is_replayed_and_cleaned_up() {
    let spill_dir = tempfile::tempdir().unwrap();
    let backend = common::start_echo_backend("active").await;

    let mut config = common::proxy_config(backend.addr);
    config.buffering.max_request_memory_bytes = 1024;
    config.buffering.spill_dir = Some(spill_dir.path().to_path_buf());
    let (proxy, _shutdown) = common::start_proxy(config).await;

    let body = common::payload(300_000);
    let res = common::client()
        .post(format!("http://{}/upload", proxy))
        .body(body.clone())
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.bytes().await.unwrap().as_ref(), body.as_slice());
    assert!(common::wait_until_empty(spill_dir.path()).await, "spill file leaked");
}

#[tokio::test]
async fn test_oversized_request_is_rejected() {
    let spill_dir = tempfile::tempdir().unwrap();
    let backend = common::start_echo_backend("active").await;

    let mut config = common::proxy_config(backend.addr);
    config.buffering.max_request_body_bytes = 1000;
    config.buffering.max_request_memory_bytes = 100;
    config.buffering.spill_dir = Some(spill_dir.path().to_path_buf());
    let (proxy, _shutdown) = common::start_proxy(config).await;

    let res = common::client()
        .post(format!("http://{}/upload", proxy))
        .body(common::payload(5000))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(backend.hits(), 0);
    assert!(common::wait_until_empty(spill_dir.path()).await);
}

#[tokio::test]
async fn test_request_at_ceiling_is_accepted() {
    let backend = common::start_echo_backend("active").await;

    let mut config = common::proxy_config(backend.addr);
    config.buffering.max_request_body_bytes = 1000;
    config.buffering.max_request_memory_bytes = 100;
    let (proxy, _shutdown) = common::start_proxy(config).await;

    let res = common::client()
        .post(format!("http://{}/upload", proxy))
        .body(common::payload(1000))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.bytes().await.unwrap().len(), 1000);
}

#[tokio::test]
async fn test_rollout_allowlist_and_default_group() {
    let active = common::start_echo_backend("active").await;
    let canary = common::start_echo_backend("canary").await;

    let mut config = common::proxy_config(active.addr);
    config.rollout.enabled = true;
    config.rollout.target = Some(canary.addr.to_string());
    config.rollout.percentage = 0;
    config.rollout.allowlist = vec!["vip-client".into()];
    let (proxy, _shutdown) = common::start_proxy(config).await;

    let client = common::client();
    let url = format!("http://{}/", proxy);

    let res = client.get(&url).send().await.unwrap();
    assert_eq!(res.headers()["x-backend"], "active");

    let res = client
        .get(&url)
        .header("cookie", "theme=dark; canary-rollout=vip-client")
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()["x-backend"], "canary");

    let res = client
        .get(&url)
        .header("cookie", "canary-rollout=someone-else")
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()["x-backend"], "active");

    assert_eq!(canary.hits(), 1);
    assert_eq!(active.hits(), 2);
}

#[tokio::test]
async fn test_rollout_split_is_sticky() {
    let active = common::start_echo_backend("active").await;
    let canary = common::start_echo_backend("canary").await;

    let mut config = common::proxy_config(active.addr);
    config.rollout.enabled = true;
    config.rollout.target = Some(canary.addr.to_string());
    config.rollout.percentage = 50;
    let splitter = RolloutSplitter::from_config(&config.rollout);
    let (proxy, _shutdown) = common::start_proxy(config).await;

    let client = common::client();
    for i in 0..20 {
        let id = format!("client-{i}");
        let expected = if splitter.decide(Some(id.as_str())) { "canary" } else { "active" };

        for _ in 0..2 {
            let res = client
                .get(format!("http://{}/page", proxy))
                .header("cookie", format!("canary-rollout={id}"))
                .send()
                .await
                .unwrap();
            assert_eq!(res.headers()["x-backend"], expected, "identifier {id}");
        }
    }
}

#[tokio::test]
async fn test_oversized_response_is_bad_gateway() {
    let backend = common::start_echo_backend("active").await;

    let mut config = common::proxy_config(backend.addr);
    config.buffering.buffer_responses = true;
    config.buffering.max_response_body_bytes = 1000;
    config.buffering.max_response_memory_bytes = 100;
    let (proxy, _shutdown) = common::start_proxy(config).await;

    let res = common::client()
        .post(format!("http://{}/echo", proxy))
        .body(common::payload(5000))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(backend.hits(), 1);
}

#[tokio::test]
async fn test_buffered_response_spills_and_replays() {
    let spill_dir = tempfile::tempdir().unwrap();
    let backend = common::start_echo_backend("active").await;

    let mut config = common::proxy_config(backend.addr);
    config.buffering.buffer_responses = true;
    config.buffering.max_response_memory_bytes = 100;
    config.buffering.spill_dir = Some(spill_dir.path().to_path_buf());
    let (proxy, _shutdown) = common::start_proxy(config).await;

    let body = common::payload(50_000);
    let res = common::client()
        .post(format!("http://{}/echo", proxy))
        .body(body.clone())
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.content_length(), Some(50_000));
    assert_eq!(res.bytes().await.unwrap().as_ref(), body.as_slice());
    assert!(common::wait_until_empty(spill_dir.path()).await, "spill file leaked");
}

#[tokio::test]
async fn test_unreachable_upstream_is_bad_gateway() {
    let unused = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = unused.local_addr().unwrap();
    drop(unused);

    let (proxy, _shutdown) = common::start_proxy(common::proxy_config(dead_addr)).await;

    let res = common::client()
        .get(format!("http://{}/", proxy))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_shutdown_stops_accepting() {
    let backend = common::start_echo_backend("active").await;
    let (proxy, shutdown) = common::start_proxy(common::proxy_config(backend.addr)).await;

    let res = common::client().get(format!("http://{}/", proxy)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    shutdown.trigger();
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    assert!(common::client().get(format!("http://{}/", proxy)).send().await.is_err());
}

#[tokio::test]
async fn test_head_keeps_upstream_length_when_buffering() {
    let backend = common::start_fixed_backend().await;

    let mut config = common::proxy_config(backend);
    config.buffering.buffer_responses = true;
    let (proxy, _shutdown) = common::start_proxy(config).await;

    let res = common::client()
        .head(format!("http://{}/", proxy))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-length"], "11");
}

#[tokio::test]
async fn test_no_content_has_no_length_when_buffering() {
    let backend = common::start_fixed_backend().await;

    let mut config = common::proxy_config(backend);
    config.buffering.buffer_responses = true;
    let (proxy, _shutdown) = common::start_proxy(config).await;

    let res = common::client()
        .get(format!("http://{}/nc", proxy))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert!(res.headers().get("content-length").is_none());
}

#[tokio::test]
async fn test_bodiless_request_forwarded_without_framing() {
    let backend = common::start_fixed_backend().await;
    let (proxy, _shutdown) = common::start_proxy(common::proxy_config(backend)).await;

    let client = common::client();
    let res = client.get(format!("http://{}/framing", proxy)).send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "none|none");

    let res = client
        .post(format!("http://{}/framing", proxy))
        .body("abc")
        .send()
        .await
        .unwrap();
    assert_eq!(res.text().await.unwrap(), "3|none");
}

#[tokio::test]
async fn test_up_answers_with_dead_upstream() {
    let unused = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = unused.local_addr().unwrap();
    drop(unused);

    let (proxy, _shutdown) = common::start_proxy(common::proxy_config(dead_addr)).await;

    let res = common::client()
        .get(format!("http://{}/up", proxy))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "OK");
}
