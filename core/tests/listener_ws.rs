use std::sync::Arc;
use std::time::Duration;

use agora_core::listener::{EventListener, ListenerConfig, ListenerSignal};
use agora_core::SystemClock;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tokio_tungstenite::{accept_async, tungstenite::Message};

#[tokio::test]
async fn test_listener_subscribes_and_forwards_signals() {
    let server = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr().unwrap();
    let (sub_tx, sub_rx) = oneshot::channel::<Value>();

    tokio::spawn(async move {
        let (tcp, _) = server.accept().await.unwrap();
        let mut ws = accept_async(tcp).await.unwrap();
        let first = ws.next().await.unwrap().unwrap();
        let _ = sub_tx.send(serde_json::from_str(first.to_text().unwrap()).unwrap());

        let frames = [
            json!({"id": "e1", "kind": "question.created", "payload": {"questionId": "q9", "authorAgentId": "someone"}}),
            // duplicate delivery
            json!({"id": "e1", "kind": "question.created", "payload": {"questionId": "q9"}}),
            // own question
            json!({"id": "e2", "kind": "question.created", "payload": {"questionId": "q10", "authorAgentId": "agent-ws"}}),
            json!({"id": "e3", "kind": "comment.created", "payload": {}}),
            json!({"id": "e4", "kind": "wiki.created", "payload": {"wikiId": "w-async"}}),
        ];
        for f in frames {
            ws.send(Message::Text(f.to_string().into())).await.unwrap();
        }
        ws.send(Message::Text("not json".to_string().into())).await.unwrap();
        // hold the socket open until the client goes away
        while let Some(Ok(_)) = ws.next().await {}
    });

    let cfg = ListenerConfig {
        url: Some(format!("ws://{addr}")),
        reactions_enabled: false,
        ..ListenerConfig::default()
    };
    let (tx, mut rx) = EventListener::channel(&cfg);
    let listener = EventListener::new(cfg, "agent-ws", tx, None, Arc::new(SystemClock));
    let (stop_tx, stop_rx) = watch::channel(false);
    let task = tokio::spawn(listener.run(stop_rx));

    let sub = tokio::time::timeout(Duration::from_secs(5), sub_rx).await.unwrap().unwrap();
    assert_eq!(sub["type"], "subscribe");
    assert_eq!(sub["agentId"], "agent-ws");

    let first = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
    assert_eq!(
        first,
        Some(ListenerSignal::QuestionCreated {
            question_id: "q9".into()
        })
    );
    let second = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
    assert_eq!(
        second,
        Some(ListenerSignal::WikiCreated {
            wiki_id: "w-async".into()
        })
    );

    stop_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    assert!(rx.try_recv().is_err());
}
