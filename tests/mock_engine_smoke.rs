#![cfg(feature = "engine-mock")]
use pql_bench::engine::config::parse_connect_kv;
use pql_bench::engine::{ConnectOptions, Engine, EngineBuilder};

#[tokio::test]
async fn echo_mock_smoke() {
    let e = EngineBuilder::connect(Engine::Mock, ConnectOptions::default()).await.expect("connect");
    e.health_check().await.expect("health");
    let out = e.query("Count(Bitmap(rowID=3))\nCount(Bitmap(rowID=4))\n").await.expect("query");
    assert_eq!(out, vec![3, 4]);
}

#[tokio::test]
async fn failing_mock_smoke() {
    let opts = parse_connect_kv(&["mode=fail".to_string(), "fail_on=Purge".to_string()]);
    let e = EngineBuilder::connect(Engine::Mock, opts).await.expect("connect");
    assert!(e.query("Purge(id=41)").await.is_err());
    assert_eq!(e.query("Store(id=41)").await.expect("store"), vec![41]);
}

#[tokio::test]
async fn unknown_mock_mode_is_rejected() {
    let opts = parse_connect_kv(&["mode=flaky".to_string()]);
    assert!(EngineBuilder::connect(Engine::Mock, opts).await.is_err());
}
