//! Worker-hosted engine driven through the controller.

use std::sync::{Arc, Mutex};

use localchat::engine::worker::WORKER_THREAD_NAME;
use localchat::{
    AppConfig, ChatEngine, EngineBootstrapper, EngineError, EngineFactory, SubmitOutcome,
    TranscriptController, TranscriptSnapshot,
};

use crate::helpers::{Reply, ScriptedEngine, settle, test_config};

#[tokio::test]
async fn worker_mode_builds_engine_off_the_caller_thread() {
    let built_on: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    let seen = Arc::clone(&built_on);
    let factory: Arc<dyn EngineFactory> =
        Arc::new(move || -> Result<Box<dyn ChatEngine>, EngineError> {
            *seen.lock().unwrap() = std::thread::current().name().map(str::to_owned);
            Ok(Box::new(ScriptedEngine::new(vec![Reply::ok(&[
                "Bon", "jour",
            ])])))
        });

    let config = AppConfig {
        use_worker: true,
        ..test_config()
    };
    let bootstrapper = EngineBootstrapper::with_factory(config, factory);
    let mut status = bootstrapper.initialize();
    let status = settle(&mut status).await;
    let engine = status.handle().cloned().expect("engine ready");
    assert_eq!(engine.name(), "worker");
    assert_eq!(built_on.lock().unwrap().as_deref(), Some(WORKER_THREAD_NAME));

    let mut controller = TranscriptController::new(engine, "Hi");
    controller.set_input("Say hello in French");
    let mut renders = 0usize;
    let outcome = controller
        .submit(&mut |_: &TranscriptSnapshot| renders += 1)
        .await;

    assert_eq!(outcome, SubmitOutcome::Completed);
    assert_eq!(controller.transcript().last().unwrap().content, "Bonjour");
    // Placeholder, two fragments, completion.
    assert_eq!(renders, 4);
}

#[tokio::test]
async fn worker_mode_surfaces_stream_errors() {
    let factory: Arc<dyn EngineFactory> =
        Arc::new(|| -> Result<Box<dyn ChatEngine>, EngineError> {
            Ok(Box::new(ScriptedEngine::new(vec![Reply::failing(
                &["x"],
                EngineError::StreamError("kv cache exhausted".into()),
            )])))
        });
    let config = AppConfig {
        use_worker: true,
        ..test_config()
    };
    let bootstrapper = EngineBootstrapper::with_factory(config, factory);
    let status = settle(&mut bootstrapper.initialize()).await;
    let engine = status.handle().cloned().unwrap();

    let mut controller = TranscriptController::new(engine, "Hi");
    controller.set_input("go");
    let outcome = controller.submit(&mut |_: &TranscriptSnapshot| {}).await;
    assert_eq!(outcome, SubmitOutcome::Failed);
    assert_eq!(
        controller.transcript().last().unwrap().content,
        localchat::STREAM_FAILURE_NOTICE
    );
}

#[tokio::test]
async fn worker_and_in_context_yield_identical_fragments() {
    use futures_util::StreamExt;
    use localchat::engine::WorkerEngine;
    use localchat::{ChatTurn, Fragment};

    let script = || ScriptedEngine::new(vec![Reply::ok(&["The", " answer", " is", " 42."])]);
    let prompt = [ChatTurn::user("question")];

    let direct = script();
    let direct: Vec<Fragment> = direct
        .stream_completion(&prompt)
        .await
        .unwrap()
        .map(|item| item.unwrap())
        .collect()
        .await;

    let factory: Arc<dyn EngineFactory> =
        Arc::new(move || -> Result<Box<dyn ChatEngine>, EngineError> { Ok(Box::new(script())) });
    let worker = WorkerEngine::spawn(factory).unwrap();
    let bridged: Vec<Fragment> = worker
        .stream_completion(&prompt)
        .await
        .unwrap()
        .map(|item| item.unwrap())
        .collect()
        .await;

    assert_eq!(direct, bridged);
    assert_eq!(direct.len(), 4);
}
