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
        .create_and_upload(
            env.store.as_ref(),
            "photo.jpg",
            "image/jpeg",
            "local",
            b"source bytes",
        )
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn image_variant_end_to_end() {
    let (engine, mock, env) = setup(MockMode::Succeed).await;
    let blob_id = upload_image(&engine, &env).await;

    let variation = Variation::resize_to_limit(780, 780);
    let record = engine
        .process(blob_id, &variation, &ProcessOptions::default())
        .await
        .unwrap();

    let requests = mock.requests();
    assert_eq!(requests.len(), 1);
    let (path, payload) = &requests[0];
    assert_eq!(path, "image/variant");
    assert_eq!(payload["dimensions"], "780x780");
    assert_eq!(payload["rotation"], 0);
    assert_eq!(payload["format"], "png");

    let output = engine.output_blob(&record).await.unwrap().unwrap();
    assert_eq!(output.filename, "photo.png");
    assert_eq!(output.content_type, "image/png");
    assert_eq!(output.byte_size, 13);

    assert!(engine.processed(blob_id, &variation).await.unwrap());
}

#[tokio::test]
async fn repeated_requests_share_one_dispatch() {
    let (engine, mock, env) = setup(MockMode::Succeed).await;
    let blob_id = upload_image(&engine, &env).await;
    let variation = Variation::resize_to_limit(780, 780).rotation(90);

    let first = engine
        .process(blob_id, &variation, &ProcessOptions::default())
        .await
        .unwrap();
    let second = engine
        .process(blob_id, &variation, &ProcessOptions::default())
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(mock.dispatch_count(), 1);

    // A different parameter set is a different variant, dispatched anew.
    engine
        .process(
            blob_id,
            &Variation::resize_to_limit(100, 100),
            &ProcessOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(mock.dispatch_count(), 2);
}

#[tokio::test]
async fn concurrent_requests_collapse_to_one_dispatch() {
    let (engine, mock, env) = setup(MockMode::Succeed).await;
    let engine = Arc::new(engine);
    let blob_id = upload_image(&engine, &env).await;

    let options = ProcessOptions {
        wait: false,
        tolerate_timeout: false,
    };
    let mut handles = Vec::new();
    for _ in 0..4 {
        let engine = engine.clone();
        let options = options.clone();
        handles.push(tokio::spawn(async move {
            engine
                .process(blob_id, &Variation::resize_to_limit(780, 780), &options)
                .await
                .unwrap()
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().id);
    }
    ids.dedup();
    assert_eq!(ids.len(), 1, "all callers must converge on one record");
    assert_eq!(mock.dispatch_count(), 1, "only the winner dispatches");
}

#[tokio::test]
async fn waiting_adopter_tolerates_a_late_placeholder() {
    let (engine, mock, env) = setup(MockMode::Succeed).await;
    let blob_id = upload_image(&engine, &env).await;
    let variation = Variation::resize_to_limit(200, 200);

    // Take the reservation out from under the caller, as a concurrent
    // winner would, but attach the placeholder only after a delay.
    let (record, created) = engine
        .repository()
        .reserve_variant_record(blob_id, &variation.digest())
        .await
        .unwrap();
    assert!(created);

    let repo = engine.repository().clone();
    let store_dir = env.store_dir.clone();
    let record_id = record.id;
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let output = repo
            .create_placeholder_blob("photo.png", "image/png", "local")
            .await
            .unwrap();
        repo.attach("image", "variant_record", &record_id.to_string(), output.id)
            .await
            .unwrap();
        std::fs::write(store_dir.join(&output.key), b"derived bytes").unwrap();
    });

    // The adopter must ride out the not-yet-attached window, not error.
    let adopted = engine
        .process(blob_id, &variation, &ProcessOptions::default())
        .await
        .unwrap();
    assert_eq!(adopted.id, record.id);
    assert_eq!(mock.dispatch_count(), 0, "adopters never dispatch");
    assert!(engine.processed(blob_id, &variation).await.unwrap());
}

#[tokio::test]
async fn processed_reflects_persisted_state_only() {
    let (engine, _mock, env) = setup(MockMode::Succeed).await;
    let blob_id = upload_image(&engine, &env).await;
    let variation = Variation::resize_to_limit(320, 320);

    assert!(!engine.processed(blob_id, &variation).await.unwrap());

    engine
        .process(blob_id, &variation, &ProcessOptions::default())
        .await
        .unwrap();
    assert!(engine.processed(blob_id, &variation).await.unwrap());

    // Identity is the digest, not the request object.
    let same_again = Variation::resize_to_limit(320, 320);
    assert!(engine.processed(blob_id, &same_again).await.unwrap());
    let different = Variation::resize_to_limit(320, 320).format("jpg");
    assert!(!engine.processed(blob_id, &different).await.unwrap());
}

#[tokio::test]
async fn unknown_blob_is_record_not_found() {
    let (engine, _mock, _env) = setup(MockMode::Succeed).await;

    let result = engine
        .process(
            Uuid::now_v7(),
            &Variation::resize_to_limit(10, 10),
            &ProcessOptions::default(),
        )
        .await;
    assert!(matches!(result, Err(ProcessError::RecordNotFound(_))));
}

#[tokio::test]
async fn non_media_sources_are_rejected_before_dispatch() {
    let (engine, mock, env) = setup(MockMode::Succeed).await;
    let blob = engine
        .repository()
        .create_and_upload(
            env.store.as_ref(),
            "report.pdf",
            "application/pdf",
            "local",
            b"%PDF-",
        )
        .await
        .unwrap();

    let result = engine
        .process(
            blob.id,
            &Variation::resize_to_limit(780, 780),
            &ProcessOptions::default(),
        )
        .await;
    assert!(matches!(result, Err(ProcessError::UnsupportedSource(_))));
    assert_eq!(mock.dispatch_count(), 0);
}
