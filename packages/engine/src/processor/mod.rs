mod assembly;
mod direct;

use async_trait::async_trait;

pub use assembly::AssemblyProcessor;
pub use direct::DirectProcessor;

use crate::error::ProcessError;
use crate::kind::MediaKind;

/// Where the remote service reads the source asset from.
#[derive(Clone, Debug)]
pub struct TransformSource {
    pub url: String,
    pub key: String,
}

/// Where the remote service writes one output to.
#[derive(Clone, Debug)]
pub struct TransformTarget {
    pub url: String,
    pub key: String,
}

/// What a single dispatch produces.
#[derive(Clone, Debug)]
pub enum TransformOutputs {
    /// One derived asset.
    Variant(TransformTarget),
    /// A video preview frame plus the variant rendered from it.
    Preview {
        image: TransformTarget,
        variant: TransformTarget,
    },
}

/// One fully resolved transformation request, ready for a backend.
#[derive(Clone, Debug)]
pub struct TransformRequest {
    pub endpoint: String,
    pub kind: MediaKind,
    pub source: TransformSource,
    pub dimensions: (u32, u32),
    pub rotation: i64,
    pub format: String,
    pub quality: Option<u8>,
    pub outputs: TransformOutputs,
    /// Treat a gateway timeout from the remote service as acceptance.
    pub tolerate_timeout: bool,
}

impl TransformRequest {
    /// Dimensions in the remote service's `WxH` wire form.
    pub fn dimensions_param(&self) -> String {
        format!("{}x{}", self.dimensions.0, self.dimensions.1)
    }

    /// Operation path under the service endpoint.
    pub fn dispatch_path(&self) -> &'static str {
        match self.outputs {
            TransformOutputs::Preview { .. } => "video/preview",
            TransformOutputs::Variant(_) => self.kind.variant_path(),
        }
    }
}

/// A transformation backend.
///
/// `wait = false` returns once the request is accepted; `wait = true`
/// returns only after the backend considers the work finished or failed.
/// Direct-HTTP backends have no completion signal of their own, so there
/// the caller still confirms output materialization separately.
#[async_trait]
pub trait VariantProcessor: Send + Sync {
    async fn dispatch(&self, request: &TransformRequest, wait: bool) -> Result<(), ProcessError>;
}
