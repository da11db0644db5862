//! Bootstrap, session and page server wired together the way the binary does.

use std::time::Duration;

use localchat::{ChatServer, EngineBootstrapper, Role};

use crate::helpers::{Reply, ScriptedEngine, factory_for, poll_page, settle, test_config};

#[tokio::test]
async fn reply_streams_into_page_after_bootstrap() {
    let engine = ScriptedEngine::new(vec![Reply::ok(&["Hel", "lo"])]);
    let prompts = engine.prompt_log();
    let config = test_config();

    let bootstrapper = EngineBootstrapper::with_factory(config.clone(), factory_for(engine));
    let mut status = bootstrapper.initialize();
    let server = ChatServer::start(&config, status.clone()).await.unwrap();
    assert!(settle(&mut status).await.is_ready());

    let response = reqwest::Client::new()
        .post(format!("http://{}/submit", server.addr()))
        .form(&[("message", "Hi")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);

    let page = poll_page(&format!("http://{}/", server.addr()), |b| {
        b.contains("<p>Hello</p>") && b.contains("data-streaming=\"false\"")
    })
    .await;
    assert!(page.contains("My name is WebLLM, how can I help you?"));
    assert!(page.contains("<p>Hi</p>"));
    assert!(page.contains("<p>Hello</p>"));

    // Greeting and the user turn only; never the empty placeholder.
    let prompts = prompts.lock().unwrap().clone();
    assert_eq!(prompts.len(), 1);
    let roles: Vec<Role> = prompts[0].iter().map(|t| t.role).collect();
    assert_eq!(roles, vec![Role::Assistant, Role::User]);
}

#[tokio::test]
async fn event_stream_sends_status_then_transcript() {
    let engine = ScriptedEngine::new(Vec::new());
    let config = test_config();
    let bootstrapper = EngineBootstrapper::with_factory(config.clone(), factory_for(engine));
    let mut status = bootstrapper.initialize();
    settle(&mut status).await;
    let server = ChatServer::start(&config, status).await.unwrap();

    let mut response = reqwest::get(format!("http://{}/events", server.addr()))
        .await
        .unwrap();
    assert!(
        response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream")
    );

    let mut received = String::new();
    let read = tokio::time::timeout(Duration::from_secs(5), async {
        while !received.contains("event: transcript") {
            match response.chunk().await.unwrap() {
                Some(chunk) => received.push_str(&String::from_utf8_lossy(&chunk)),
                None => break,
            }
        }
    })
    .await;
    assert!(read.is_ok(), "timed out reading events: {received}");

    let status_at = received.find("event: status").unwrap();
    let transcript_at = received.find("event: transcript").unwrap();
    assert!(status_at < transcript_at);
    assert!(received.contains("My name is WebLLM"));
}

#[tokio::test]
async fn page_follows_bootstrap_from_loading_to_ready() {
    let (tx, rx) = tokio::sync::watch::channel(localchat::EngineStatus::Loading);
    let server = ChatServer::start(&test_config(), rx).await.unwrap();
    let url = format!("http://{}/", server.addr());

    let loading = poll_page(&url, |_| true).await;
    assert!(loading.contains("status loading"));

    let engine: localchat::EngineHandle = std::sync::Arc::new(ScriptedEngine::new(Vec::new()));
    tx.send_replace(localchat::EngineStatus::Ready(engine));

    let ready = poll_page(&url, |b| !b.contains("status loading")).await;
    assert!(ready.contains("<section id=\"chat\">"));
    assert!(ready.contains("Type your message..."));
}
