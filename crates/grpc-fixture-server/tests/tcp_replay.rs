//! End-to-end replay over TCP through `FixtureServer` and `FixtureClient`.

use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use grpc_fixture::{
    CorrelationRule, DumpedMessage, ExchangeTrieBuilder, FieldCorrelator, JsonCodec, Origin,
    RpcRecord, StatusCode, StreamReplayEngine,
};
use grpc_fixture_server::{ClientEvent, FixtureClient, FixtureServer};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

const CHAT: &str = "/pkg.Svc/Chat";
const GET_ACTION: &str = "/s12.tasks.v1.ActionsService/GetAction";

fn raw(origin: Origin, raw: &[u8]) -> DumpedMessage {
    DumpedMessage {
        message_origin: origin,
        raw_message: raw.to_vec(),
        message: None,
        timestamp: None,
    }
}

fn record(service: &str, method: &str, messages: Vec<DumpedMessage>) -> RpcRecord {
    RpcRecord {
        service: service.to_string(),
        method: method.to_string(),
        messages,
        error: None,
        metadata: HashMap::new(),
    }
}

fn fixture_engine() -> StreamReplayEngine {
    let codec = JsonCodec::new();
    let mut builder = ExchangeTrieBuilder::new(&codec);
    let records = vec![
        record(
            "pkg.Svc",
            "Chat",
            vec![
                raw(Origin::Client, b"hello"),
                raw(Origin::Server, b"hi"),
                raw(Origin::Server, b"how are you"),
                raw(Origin::Client, b"fine"),
                raw(Origin::Server, b"bye"),
            ],
        ),
        record(
            "pkg.Svc",
            "Chat",
            vec![
                raw(Origin::Client, b"hello"),
                raw(Origin::Server, b"hi"),
                raw(Origin::Server, b"how are you"),
                raw(Origin::Client, b"awful"),
                raw(Origin::Server, b"sorry"),
            ],
        ),
        record(
            "s12.tasks.v1.ActionsService",
            "GetAction",
            vec![
                DumpedMessage {
                    message: Some(json!({"actionId": "recorded-id"})),
                    ..raw(Origin::Client, b"")
                },
                DumpedMessage {
                    message: Some(json!({"action": {"task": {"taskId": "recorded-id"}}})),
                    ..raw(Origin::Server, b"")
                },
            ],
        ),
    ];
    for record in &records {
        builder.ingest(record).unwrap();
    }

    StreamReplayEngine::new(builder.build()).with_correlator(FieldCorrelator::new().with_rule(
        GET_ACTION,
        CorrelationRule::path_to_path("actionId", "action.task.taskId").unwrap(),
    ))
}

async fn start_server() -> SocketAddr {
    let server = FixtureServer::bind("127.0.0.1:0".parse().unwrap(), fixture_engine())
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    addr
}

async fn expect_message(client: &mut FixtureClient) -> Bytes {
    match client.recv().await.unwrap() {
        ClientEvent::Message(data) => data,
        ClientEvent::Status(status) => panic!("call ended early with {}", status),
    }
}

#[test_log::test(tokio::test)]
async fn test_chat_replays_over_tcp() {
    let addr = start_server().await;
    let mut client = FixtureClient::connect(addr, CHAT).await.unwrap();

    client.send(&b"hello"[..]).await.unwrap();
    assert_eq!(expect_message(&mut client).await, Bytes::from_static(b"hi"));
    assert_eq!(
        expect_message(&mut client).await,
        Bytes::from_static(b"how are you")
    );
    client.send(&b"fine"[..]).await.unwrap();

    let (messages, status) = client.finish().await.unwrap();
    assert_eq!(messages, vec![Bytes::from_static(b"bye")]);
    assert!(status.is_ok());
}

#[test_log::test(tokio::test)]
async fn test_unknown_method_gets_unavailable_status() {
    let addr = start_server().await;
    let client = FixtureClient::connect(addr, "/pkg.Svc/Nope").await.unwrap();

    let (messages, status) = client.finish().await.unwrap();
    assert!(messages.is_empty());
    assert_eq!(status.code, StatusCode::Unavailable);
    assert_eq!(
        status.message,
        "no saved responses found for method /pkg.Svc/Nope"
    );
}

#[test_log::test(tokio::test)]
async fn test_half_close_mid_exchange_ends_with_unknown() {
    let addr = start_server().await;
    let mut client = FixtureClient::connect(addr, CHAT).await.unwrap();

    client.send(&b"hello"[..]).await.unwrap();
    client.half_close().await.unwrap();

    let (messages, status) = client.finish().await.unwrap();
    assert_eq!(
        messages,
        vec![Bytes::from_static(b"hi"), Bytes::from_static(b"how are you")]
    );
    assert_eq!(status.code, StatusCode::Unknown);
}

#[test_log::test(tokio::test)]
async fn test_cancel_ends_with_cancelled() {
    let addr = start_server().await;
    let mut client = FixtureClient::connect(addr, CHAT).await.unwrap();
    client.cancel().await.unwrap();

    let (messages, status) = client.finish().await.unwrap();
    assert!(messages.is_empty());
    assert_eq!(status.code, StatusCode::Cancelled);
}

#[test_log::test(tokio::test)]
async fn test_parallel_clients_take_their_own_branch() {
    let addr = start_server().await;

    let mut tasks = Vec::new();
    for i in 0..8 {
        tasks.push(tokio::spawn(async move {
            let (answer, expected): (&'static [u8], &'static [u8]) = if i % 2 == 0 {
                (b"fine", b"bye")
            } else {
                (b"awful", b"sorry")
            };
            let mut client = FixtureClient::connect(addr, CHAT).await.unwrap();
            client.send(&b"hello"[..]).await.unwrap();
            expect_message(&mut client).await;
            expect_message(&mut client).await;
            client.send(answer).await.unwrap();
            let (messages, status) = client.finish().await.unwrap();
            (messages, status, expected)
        }));
    }

    for task in tasks {
        let (messages, status, expected) = task.await.unwrap();
        assert!(status.is_ok());
        assert_eq!(messages, vec![Bytes::from_static(expected)]);
    }
}

#[test_log::test(tokio::test)]
async fn test_correlated_id_reaches_the_client() {
    let addr = start_server().await;
    let mut client = FixtureClient::connect(addr, GET_ACTION).await.unwrap();

    client
        .send(serde_json::to_vec(&json!({"actionId": "live-7"})).unwrap())
        .await
        .unwrap();

    let (messages, status) = client.finish().await.unwrap();
    assert!(status.is_ok());
    let reply: Value = serde_json::from_slice(&messages[0]).unwrap();
    assert_eq!(reply, json!({"action": {"task": {"taskId": "live-7"}}}));
}
