use std::time::Duration;

use agora_core::identity::{verify_headers, AgentKey, HEADER_IDENTITY, HEADER_PAYMENT, HEADER_PUBLIC_KEY, HEADER_SIGNATURE};
use agora_core::market::Vote;
use agora_core::tools::schema::{ListArgs, PostAnswerArgs, QuestionRef, VoteArgs};
use agora_core::tools::ToolCall;
use agora_gateway::{GatewayError, HttpMarketplace, MarketplaceApi, Signer};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn market(server: &MockServer, signer: Option<Signer>) -> HttpMarketplace {
    HttpMarketplace::new(&server.uri(), Duration::from_secs(5), "agent-1", signer).unwrap()
}

fn answer(bid: u64) -> ToolCall {
    ToolCall::PostAnswer(PostAnswerArgs {
        question_id: "q1".into(),
        content: "Pin the future before polling it.".into(),
        bid_amount_cents: bid,
        idempotency_key: Some("answer-agent-1-q1".into()),
    })
}

fn header(req: &wiremock::Request, name: &str) -> String {
    req.headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

#[tokio::test]
async fn test_paid_answer_carries_verifiable_identity() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/questions/q1/answers"))
        .and(body_partial_json(json!({"content": "Pin the future before polling it.", "bidAmountCents": 20})))
        .and(header_exists(HEADER_SIGNATURE))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"answerId": "a-1", "paymentTxHash": "0x1"})))
        .expect(1)
        .mount(&server)
        .await;

    let key = AgentKey::random();
    let m = market(&server, Some(Signer::new(key.clone())));
    let out = m.execute(&answer(20)).await.unwrap();
    assert_eq!(out["answerId"], "a-1");

    let requests = server.received_requests().await.unwrap();
    let req = &requests[0];
    assert_eq!(header(req, HEADER_PUBLIC_KEY), key.public_key_hex());
    let envelope = verify_headers(
        &header(req, HEADER_IDENTITY),
        &header(req, HEADER_SIGNATURE),
        &header(req, HEADER_PUBLIC_KEY),
    )
    .unwrap();
    assert_eq!(envelope.agent_id, "agent-1");
    assert_eq!(envelope.target_id, "q1");
    assert_eq!(envelope.bid_amount_cents, 20);
    assert_eq!(header(req, "idempotency-key"), "answer-agent-1-q1");
}

#[tokio::test]
async fn test_payment_challenge_is_answered_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/questions/q1/answers"))
        .and(header_exists(HEADER_PAYMENT))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"answerId": "a-2"})))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/questions/q1/answers"))
        .respond_with(
            ResponseTemplate::new(402)
                .set_body_json(json!({"amountCents": 15, "payTo": "0xfeed", "nonce": "n-7"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let m = market(&server, Some(Signer::new(AgentKey::random())));
    let out = m.execute(&answer(20)).await.unwrap();
    assert_eq!(out["answerId"], "a-2");

    let requests = server.received_requests().await.unwrap();
    let payment = BASE64.decode(header(&requests[1], HEADER_PAYMENT)).unwrap();
    let payment: Value = serde_json::from_slice(&payment).unwrap();
    assert_eq!(payment["amountCents"], 15);
    assert_eq!(payment["payTo"], "0xfeed");
    assert_eq!(payment["nonce"], "n-7");
    assert_eq!(payment["actionId"].as_str().unwrap(), header(&requests[1], "x-agent-action-id"));
}

#[tokio::test]
async fn test_payment_above_bid_is_refused_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/questions/q1/answers"))
        .respond_with(
            ResponseTemplate::new(402)
                .set_body_json(json!({"amountCents": 500, "payTo": "0xfeed", "nonce": "n-8"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let m = market(&server, Some(Signer::new(AgentKey::random())));
    let err = m.execute(&answer(20)).await.unwrap_err();
    assert!(matches!(err, GatewayError::PaymentRejected(_)));
}

#[tokio::test]
async fn test_paid_write_without_key_is_not_sent() {
    let server = MockServer::start().await;
    let m = market(&server, None);
    let err = m.execute(&answer(20)).await.unwrap_err();
    assert!(matches!(err, GatewayError::Config(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_status_mapping() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/questions/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such question"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/questions/q1/answers"))
        .respond_with(ResponseTemplate::new(410).set_body_json(json!({"error": "answer window closed"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/posts/p1/reactions"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({"error": "duplicate reaction"})))
        .mount(&server)
        .await;

    let m = market(&server, Some(Signer::new(AgentKey::random())));
    let err = m
        .execute(&ToolCall::GetQuestion(QuestionRef { question_id: "missing".into() }))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::NotFound(_)));

    let err = m.execute(&answer(20)).await.unwrap_err();
    assert!(matches!(err, GatewayError::WindowClosed(_)));

    let vote = ToolCall::VotePost(VoteArgs {
        target_id: "p1".into(),
        vote: Vote::Up,
        idempotency_key: None,
    });
    let err = m.execute(&vote).await.unwrap_err();
    assert!(matches!(err, GatewayError::Status { status: 409, .. }));
}

#[tokio::test]
async fn test_unrelated_closed_conflict_is_not_window_closed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/questions/q1/answers"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({"error": "duplicate answer; thread closed for edits"})))
        .mount(&server)
        .await;

    let m = market(&server, Some(Signer::new(AgentKey::random())));
    let err = m.execute(&answer(20)).await.unwrap_err();
    assert!(matches!(err, GatewayError::Status { status: 409, .. }));
}

#[tokio::test]
async fn test_wrapped_list_is_unwrapped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/questions"))
        .and(query_param("status", "open"))
        .and(query_param("limit", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "questions": [{"id": "q1", "title": "Why is my borrow rejected?"}]
        })))
        .mount(&server)
        .await;

    let m = market(&server, None);
    let out = m
        .execute(&ToolCall::ListOpenQuestions(ListArgs { limit: 3 }))
        .await
        .unwrap();
    assert_eq!(out[0]["id"], "q1");
}
