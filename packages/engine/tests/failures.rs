mod support;

use std::sync::Arc;

use common::storage::ObjectStore;
use engine::{
    BlobRepository, DirectProcessor, ProcessError, ProcessOptions, VariantEngine, Variation,
};
use uuid::Uuid;

use support::{MockMode, MockTransform, TestEnv, config_for, test_env};

async fn setup(mode: MockMode) -> (VariantEngine, MockTransform, TestEnv) {
    let env = test_env().await;
    let mock = MockTransform::spawn(env.store_dir.clone(), mode).await;
    let config = config_for(&mock.endpoint);
    let engine = VariantEngine::new(
        BlobRepository::new(env.db.clone()),
        env.store.clone() as Arc<dyn ObjectStore>,
        Arc::new(DirectProcessor::new(&config).unwrap()),
        config,
    );
    (engine, mock, env)
}

async fn upload_image(engine: &VariantEngine, env: &TestEnv) -> Uuid {
    engine
        .repository()
        .create_and_upload(env.store.as_ref(), "a.jpg", "image/jpeg", "local", b"x")
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn gateway_timeout_surfaces_by_default() {
    let (engine, _mock, env) = setup(MockMode::GatewayTimeout).await;
    let blob_id = upload_image(&engine, &env).await;

    let options = ProcessOptions {
        wait: false,
        tolerate_timeout: false,
    };
    let result = engine
        .process(blob_id, &Variation::resize_to_limit(50, 50), &options)
        .await;
    assert!(matches!(result, Err(ProcessError::DispatchTimedOut)));
}

#[tokio::test]
async fn gateway_timeout_can_be_tolerated() {
    let (engine, mock, env) = setup(MockMode::GatewayTimeout).await;
    let blob_id = upload_image(&engine, &env).await;

    let options = ProcessOptions {
        wait: false,
        tolerate_timeout: true,
    };
    let record = engine
        .process(blob_id, &Variation::resize_to_limit(50, 50), &options)
        .await
        .unwrap();
    assert_eq!(mock.dispatch_count(), 1);

    // The record stands even though the outcome is unknown; nothing has
    // materialized yet.
    let output = engine.output_blob(&record).await.unwrap().unwrap();
    assert_eq!(output.byte_size, 0);
    assert!(
        !engine
            .processed(blob_id, &Variation::resize_to_limit(50, 50))
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn analyze_reconciles_out_of_band_completion() {
    let (engine, _mock, env) = setup(MockMode::GatewayTimeout).await;
    let blob_id = upload_image(&engine, &env).await;
    let variation = Variation::resize_to_limit(50, 50);

    let options = ProcessOptions {
        wait: false,
        tolerate_timeout: true,
    };
    let record = engine.process(blob_id, &variation, &options).await.unwrap();
    assert!(!engine.analyze(&record).await.unwrap());

    // The remote side finishes late and writes the object after all.
    let output = engine.output_blob(&record).await.unwrap().unwrap();
    std::fs::write(env.store_dir.join(&output.key), b"late bytes").unwrap();

    assert!(engine.analyze(&record).await.unwrap());
    assert!(engine.processed(blob_id, &variation).await.unwrap());
}

#[tokio::test]
async fn reprocess_dispatches_for_an_existing_record() {
    let (engine, mock, env) = setup(MockMode::Succeed).await;
    let blob_id = upload_image(&engine, &env).await;
    let variation = Variation::resize_to_limit(50, 50);

    let first = engine
        .process(blob_id, &variation, &ProcessOptions::default())
        .await
        .unwrap();
    assert_eq!(mock.dispatch_count(), 1);

    let again = engine
        .reprocess(blob_id, &variation, &ProcessOptions::default())
        .await
        .unwrap();
    assert_eq!(again.id, first.id);
    assert_eq!(mock.dispatch_count(), 2);
}

#[tokio::test]
async fn reprocess_without_a_record_is_an_error() {
    let (engine, mock, env) = setup(MockMode::Succeed).await;
    let blob_id = upload_image(&engine, &env).await;

    let result = engine
        .reprocess(
            blob_id,
            &Variation::resize_to_limit(50, 50),
            &ProcessOptions::default(),
        )
        .await;
    assert!(matches!(result, Err(ProcessError::RecordNotFound(_))));
    assert_eq!(mock.dispatch_count(), 0);
}

#[tokio::test]
async fn rejection_carries_status_and_body() {
    let (engine, _mock, env) = setup(MockMode::Reject(422, "unknown format")).await;
    let blob_id = upload_image(&engine, &env).await;

    let result = engine
        .process(
            blob_id,
            &Variation::resize_to_limit(50, 50),
            &ProcessOptions::default(),
        )
        .await;
    match result {
        Err(ProcessError::DispatchRejected { status, body }) => {
            assert_eq!(status, 422);
            assert_eq!(body, "unknown format");
        }
        other => panic!("expected DispatchRejected, got {other:?}"),
    }
}

#[tokio::test]
async fn invalid_variation_never_reaches_the_service() {
    let (engine, mock, env) = setup(MockMode::Succeed).await;
    let blob_id = upload_image(&engine, &env).await;

    let invalid = Variation::resize_to_limit(50, 50).quality(0);
    let result = engine
        .process(blob_id, &invalid, &ProcessOptions::default())
        .await;
    assert!(matches!(result, Err(ProcessError::InvalidVariation(_))));
    assert_eq!(mock.dispatch_count(), 0);

    // And no record was reserved for it.
    assert!(
        engine
            .repository()
            .find_variant_record(blob_id, &invalid.digest())
            .await
            .unwrap()
            .is_none()
    );
}
