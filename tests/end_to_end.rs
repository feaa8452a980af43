//! End-to-end request handling with the local backend

mod common;

use canvas_image_edit::{compose_prompt, AppState, BackendKind, ErrorKind, ServiceConfig};
use common::{decode_png, sample_png, StubCapability, TestFactory};
use std::sync::atomic::Ordering;

fn local_only_state(capability: std::sync::Arc<StubCapability>) -> (AppState, std::sync::Arc<TestFactory>) {
    let factory = TestFactory::new(capability);
    let config = ServiceConfig::builder().remote_enabled(false).build().unwrap();
    (AppState::with_factory(config, factory.clone()), factory)
}

#[tokio::test]
async fn test_make_it_blue_returns_transparent_png() {
    let capability = StubCapability::sticker();
    let (state, factory) = local_only_state(capability.clone());

    let outcome = state
        .handler()
        .handle("make it blue".to_string(), sample_png(8, 8))
        .await;

    assert!(outcome.response.success, "{}", outcome.response.message);
    assert_eq!(outcome.backend, Some(BackendKind::Local));
    let edited = decode_png(outcome.response.image_data.as_deref().unwrap());
    assert_eq!(edited.get_pixel(0, 0)[3], 0, "backdrop must be transparent");
    assert_eq!(edited.get_pixel(6, 6)[3], 255, "shape must stay opaque");

    assert_eq!(capability.prompts(), vec![compose_prompt("make it blue")]);
    assert_eq!(factory.remote_creations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_empty_instruction_is_rejected_without_invocation() {
    let capability = StubCapability::sticker();
    let (state, factory) = local_only_state(capability.clone());

    let outcome = state.handler().handle(String::new(), sample_png(8, 8)).await;

    assert!(!outcome.response.success);
    assert_eq!(outcome.kind, Some(ErrorKind::Validation));
    assert!(outcome.response.message.contains("instruction must not be empty"));
    assert!(outcome.response.image_data.is_none());
    assert_eq!(capability.calls(), 0);
    assert_eq!(factory.local_creations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_text_only_answer_is_reported_as_failure() {
    let capability = StubCapability::text_only();
    let (state, _factory) = local_only_state(capability.clone());

    let outcome = state
        .handler()
        .handle("make it blue".to_string(), sample_png(8, 8))
        .await;

    assert!(!outcome.response.success);
    assert_eq!(outcome.kind, Some(ErrorKind::Edit));
    assert!(outcome.response.message.contains("no image"));
    assert!(outcome.response.image_data.is_none());
    assert_eq!(capability.calls(), 1);
}

#[tokio::test]
async fn test_local_backend_is_built_once_across_requests() {
    let capability = StubCapability::sticker();
    let (state, factory) = local_only_state(capability.clone());

    for _ in 0..3 {
        let outcome = state
            .handler()
            .handle("add a hat".to_string(), sample_png(4, 4))
            .await;
        assert!(outcome.response.success);
    }

    assert_eq!(factory.local_creations.load(Ordering::SeqCst), 1);
    assert_eq!(capability.calls(), 3);
}
