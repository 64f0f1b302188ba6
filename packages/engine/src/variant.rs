use std::sync::Arc;
use std::time::Duration;

use common::TransformConfig;
use common::storage::ObjectStore;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::entity::{blob, variant_record};
use crate::error::ProcessError;
use crate::kind::MediaKind;
use crate::processor::{
    TransformOutputs, TransformRequest, TransformSource, TransformTarget, VariantProcessor,
};
use crate::repository::BlobRepository;
use crate::urls::{EndpointResolver, UrlResolver};
use crate::variation::{Variation, filename_base};
use crate::waiter::await_populated;

/// Per-call processing knobs.
#[derive(Clone, Debug)]
pub struct ProcessOptions {
    /// Block until the output materializes. Default: true.
    pub wait: bool,
    /// Treat a gateway timeout from the remote service as acceptance and
    /// keep going. Default: false.
    pub tolerate_timeout: bool,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            wait: true,
            tolerate_timeout: false,
        }
    }
}

/// Orchestrates derived-media production.
///
/// One instance per process: resolves variation identity, reserves variant
/// records, prepares placeholder outputs, and hands fully addressed
/// requests to the configured backend.
pub struct VariantEngine {
    repo: BlobRepository,
    store: Arc<dyn ObjectStore>,
    processor: Arc<dyn VariantProcessor>,
    urls: UrlResolver,
    config: TransformConfig,
    endpoints: Option<Arc<dyn EndpointResolver>>,
}

impl VariantEngine {
    pub fn new(
        repo: BlobRepository,
        store: Arc<dyn ObjectStore>,
        processor: Arc<dyn VariantProcessor>,
        config: TransformConfig,
    ) -> Self {
        let urls = UrlResolver::new(store.clone(), config.clone());
        Self {
            repo,
            store,
            processor,
            urls,
            config,
            endpoints: None,
        }
    }

    /// Install the host application's per-owner endpoint override hook.
    pub fn with_endpoint_resolver(mut self, endpoints: Arc<dyn EndpointResolver>) -> Self {
        self.endpoints = Some(endpoints);
        self
    }

    pub fn repository(&self) -> &BlobRepository {
        &self.repo
    }

    pub(crate) fn processor(&self) -> &dyn VariantProcessor {
        self.processor.as_ref()
    }

    /// Produce (or adopt) the variant of `blob_id` described by `variation`.
    ///
    /// Exactly one caller per (blob, digest) pair dispatches; every other
    /// concurrent or later caller gets the same record back without side
    /// effects. With `wait` set, returns only after the output blob holds
    /// bytes.
    #[instrument(skip(self, variation, options), fields(%blob_id))]
    pub async fn process(
        &self,
        blob_id: Uuid,
        variation: &Variation,
        options: &ProcessOptions,
    ) -> Result<variant_record::Model, ProcessError> {
        let source = self.require_blob(blob_id).await?;
        let kind = MediaKind::from_content_type(&source.content_type)?;
        variation.validate()?;

        let digest = variation.digest();
        let (record, created) = self.repo.reserve_variant_record(source.id, &digest).await?;
        if !created {
            info!(digest, "variant already reserved; adopting");
            if options.wait {
                self.await_output(&record).await?;
            }
            return Ok(record);
        }

        let output = self
            .prepare_output(&record, variation, &source.service_name)
            .await?;
        let request = self
            .build_request(
                &source,
                kind,
                variation,
                TransformOutputs::Variant(self.target(&output.key).await?),
                options,
            )
            .await?;

        self.processor.dispatch(&request, options.wait).await?;
        if options.wait {
            self.await_analyzed(output).await?;
        }
        Ok(record)
    }

    /// Dispatch again for a variant that was already reserved, e.g. after
    /// a tolerated timeout left the outcome unknown or the output object
    /// was lost. Fails with `RecordNotFound` when nothing was reserved.
    #[instrument(skip(self, variation, options), fields(%blob_id))]
    pub async fn reprocess(
        &self,
        blob_id: Uuid,
        variation: &Variation,
        options: &ProcessOptions,
    ) -> Result<variant_record::Model, ProcessError> {
        let source = self.require_blob(blob_id).await?;
        let kind = MediaKind::from_content_type(&source.content_type)?;
        variation.validate()?;

        let digest = variation.digest();
        let record = self
            .repo
            .find_variant_record(blob_id, &digest)
            .await?
            .ok_or_else(|| {
                ProcessError::RecordNotFound(format!("variant record for digest {digest}"))
            })?;

        let output = match self.repo.output_blob(&record).await? {
            Some(output) => output,
            None => {
                self.prepare_output(&record, variation, &source.service_name)
                    .await?
            }
        };
        let request = self
            .build_request(
                &source,
                kind,
                variation,
                TransformOutputs::Variant(self.target(&output.key).await?),
                options,
            )
            .await?;

        self.processor.dispatch(&request, options.wait).await?;
        if options.wait {
            self.await_analyzed(output).await?;
        }
        Ok(record)
    }

    /// One-shot reconciliation: if the record's output bytes exist in
    /// storage but the row still says placeholder, populate it. Reports
    /// whether the output is materialized.
    pub async fn analyze(
        &self,
        record: &variant_record::Model,
    ) -> Result<bool, ProcessError> {
        let Some(output) = self.repo.output_blob(record).await? else {
            return Ok(false);
        };
        if output.byte_size > 0 {
            return Ok(true);
        }
        match self.store.byte_size(&output.key).await? {
            Some(size) if size > 0 => {
                self.repo.mark_analyzed(output, size as i64).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Whether the variant described by `variation` already exists with
    /// materialized bytes. Answered from persisted state alone.
    pub async fn processed(
        &self,
        blob_id: Uuid,
        variation: &Variation,
    ) -> Result<bool, ProcessError> {
        let Some(record) = self
            .repo
            .find_variant_record(blob_id, &variation.digest())
            .await?
        else {
            return Ok(false);
        };
        match self.repo.output_blob(&record).await? {
            Some(output) => Ok(output.byte_size > 0),
            None => Ok(false),
        }
    }

    /// The output blob for an existing variant, if it has one.
    pub async fn output_blob(
        &self,
        record: &variant_record::Model,
    ) -> Result<Option<blob::Model>, ProcessError> {
        self.repo.output_blob(record).await
    }

    pub(crate) async fn require_blob(&self, blob_id: Uuid) -> Result<blob::Model, ProcessError> {
        self.repo
            .blob(blob_id)
            .await?
            .ok_or_else(|| ProcessError::RecordNotFound(format!("blob {blob_id}")))
    }

    /// Create the placeholder output blob and hang it off the record.
    pub(crate) async fn prepare_output(
        &self,
        record: &variant_record::Model,
        variation: &Variation,
        service_name: &str,
    ) -> Result<blob::Model, ProcessError> {
        let source = self.require_blob(record.blob_id).await?;
        let filename = variation.output_filename(filename_base(&source.filename));
        let output = self
            .repo
            .create_placeholder_blob(&filename, &variation.content_type(), service_name)
            .await?;
        self.repo
            .attach("image", "variant_record", &record.id.to_string(), output.id)
            .await?;
        Ok(output)
    }

    pub(crate) async fn build_request(
        &self,
        source: &blob::Model,
        kind: MediaKind,
        variation: &Variation,
        outputs: TransformOutputs,
        options: &ProcessOptions,
    ) -> Result<TransformRequest, ProcessError> {
        let endpoint = self
            .urls
            .resolve_endpoint(&self.repo, source, self.endpoints.as_deref())
            .await?;
        Ok(TransformRequest {
            endpoint,
            kind,
            source: TransformSource {
                url: self.urls.read_url(&source.key).await?,
                key: source.key.clone(),
            },
            dimensions: variation.dimensions()?,
            rotation: variation.rotation_degrees(),
            format: variation.output_format().to_string(),
            quality: variation.output_quality(),
            outputs,
            tolerate_timeout: options.tolerate_timeout,
        })
    }

    pub(crate) async fn target(&self, key: &str) -> Result<TransformTarget, ProcessError> {
        Ok(TransformTarget {
            url: self.urls.write_url(key).await?,
            key: key.to_string(),
        })
    }

    /// Wait for `blob`'s bytes to land in storage, then record the size.
    pub(crate) async fn await_analyzed(
        &self,
        blob: blob::Model,
    ) -> Result<blob::Model, ProcessError> {
        let size = await_populated(
            self.store.as_ref(),
            &blob.key,
            Duration::from_millis(self.config.poll_interval_ms),
            self.config.max_polls,
        )
        .await?;
        self.repo.mark_analyzed(blob, size as i64).await
    }

    /// Wait for the record's output to exist and hold bytes.
    ///
    /// An adopting caller can observe the record before the winner has
    /// attached the placeholder, so the attachment itself is polled too;
    /// losers never surface that window as an error.
    pub(crate) async fn await_output(
        &self,
        record: &variant_record::Model,
    ) -> Result<(), ProcessError> {
        let interval = Duration::from_millis(self.config.poll_interval_ms);
        for _ in 0..self.config.max_polls {
            if let Some(output) = self.repo.output_blob(record).await? {
                if output.byte_size > 0 {
                    return Ok(());
                }
                self.await_analyzed(output).await?;
                return Ok(());
            }
            tokio::time::sleep(interval).await;
        }
        Err(ProcessError::DispatchTimedOut)
    }
}
