use tracing::{info, instrument};
use uuid::Uuid;

use crate::entity::{blob, variant_record};
use crate::error::ProcessError;
use crate::kind::MediaKind;
use crate::processor::TransformOutputs;
use crate::variant::{ProcessOptions, VariantEngine};
use crate::variation::{DEFAULT_FORMAT, Variation, filename_base};

/// Attachment name linking a video blob to its extracted preview frame.
const PREVIEW_IMAGE: &str = "preview_image";

/// Video previews.
///
/// A preview is a two-step derivation: a still frame extracted from the
/// video, attached back to the source blob as `preview_image`, and a
/// variant of that frame rendered to the requested parameters. Both outputs
/// come out of one dispatch; the variant record is reserved against the
/// frame blob, so later image-variant requests on the frame converge on the
/// same rows.
impl VariantEngine {
    /// Produce (or adopt) a preview of the video `blob_id`.
    #[instrument(skip(self, variation, options), fields(%blob_id))]
    pub async fn preview(
        &self,
        blob_id: Uuid,
        variation: &Variation,
        options: &ProcessOptions,
    ) -> Result<variant_record::Model, ProcessError> {
        let source = self.require_blob(blob_id).await?;
        if MediaKind::from_content_type(&source.content_type)? != MediaKind::Video {
            return Err(ProcessError::UnsupportedSource(format!(
                "previews require a video source, got {}",
                source.content_type
            )));
        }
        let variation = variation.default_to(&Variation::default().format(DEFAULT_FORMAT));
        variation.validate()?;

        let frame = self.ensure_preview_frame(&source).await?;
        let digest = variation.digest();
        let (record, created) = self
            .repository()
            .reserve_variant_record(frame.id, &digest)
            .await?;
        if !created {
            info!(digest, "preview already reserved; adopting");
            if options.wait {
                self.await_preview(&frame, &record).await?;
            }
            return Ok(record);
        }

        let output = self
            .prepare_output(&record, &variation, &source.service_name)
            .await?;
        let request = self
            .build_request(
                &source,
                MediaKind::Video,
                &variation,
                TransformOutputs::Preview {
                    image: self.target(&frame.key).await?,
                    variant: self.target(&output.key).await?,
                },
                options,
            )
            .await?;

        self.processor().dispatch(&request, options.wait).await?;
        if options.wait {
            self.await_analyzed(frame).await?;
            self.await_analyzed(output).await?;
        }
        Ok(record)
    }

    /// Whether both the preview frame and its variant exist with bytes.
    pub async fn preview_processed(
        &self,
        blob_id: Uuid,
        variation: &Variation,
    ) -> Result<bool, ProcessError> {
        let Some(frame) = self.preview_frame(blob_id).await? else {
            return Ok(false);
        };
        if frame.byte_size == 0 {
            return Ok(false);
        }
        let variation = variation.default_to(&Variation::default().format(DEFAULT_FORMAT));
        self.processed(frame.id, &variation).await
    }

    /// The extracted frame blob for a video, if one has been set up.
    pub async fn preview_frame(&self, blob_id: Uuid) -> Result<Option<blob::Model>, ProcessError> {
        let Some(att) = self
            .repository()
            .find_attachment("blob", &blob_id.to_string(), PREVIEW_IMAGE)
            .await?
        else {
            return Ok(None);
        };
        self.repository().blob(att.blob_id).await
    }

    /// Find or create the placeholder frame blob attached to the video.
    ///
    /// The attachment slot is reserved, not upserted: concurrent first-time
    /// previews must converge on one frame blob, so losers discard their
    /// candidate and adopt the winner's. Variant reservation then races on
    /// that single frame, keeping the whole chain at one record and one
    /// dispatch.
    async fn ensure_preview_frame(&self, source: &blob::Model) -> Result<blob::Model, ProcessError> {
        if let Some(frame) = self.preview_frame(source.id).await? {
            return Ok(frame);
        }
        let filename = format!("{}.{DEFAULT_FORMAT}", filename_base(&source.filename));
        let candidate = self
            .repository()
            .create_placeholder_blob(&filename, "image/png", &source.service_name)
            .await?;
        let (attachment, created) = self
            .repository()
            .reserve_attachment(PREVIEW_IMAGE, "blob", &source.id.to_string(), candidate.id)
            .await?;
        if created {
            return Ok(candidate);
        }

        self.repository().delete_blob(candidate.id).await?;
        self.repository()
            .blob(attachment.blob_id)
            .await?
            .ok_or_else(|| {
                ProcessError::Internal(format!(
                    "preview frame blob {} missing behind its attachment",
                    attachment.blob_id
                ))
            })
    }

    async fn await_preview(
        &self,
        frame: &blob::Model,
        record: &variant_record::Model,
    ) -> Result<(), ProcessError> {
        if frame.byte_size == 0 {
            self.await_analyzed(frame.clone()).await?;
        }
        self.await_output(record).await
    }
}
