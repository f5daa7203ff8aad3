// ABOUTME: Image creation from language build specs
// ABOUTME: Resolves the build description and reports build logs on success and failure

use std::sync::Arc;
use tracing::{error, info};

use crate::error::Result;
use crate::image_spec::ImageSpecBuilder;
use crate::providers::{BuildRequest, ContainerEngine};
use crate::types::{CreateImageResponse, ImageBuildSpec};

pub struct ImageBuilder {
    engine: Arc<dyn ContainerEngine>,
    spec_builder: ImageSpecBuilder,
}

impl ImageBuilder {
    pub fn new(engine: Arc<dyn ContainerEngine>, spec_builder: ImageSpecBuilder) -> Self {
        Self {
            engine,
            spec_builder,
        }
    }

    /// Build an image; failures come back as an unsuccessful response
    pub async fn create_image(&self, spec: &ImageBuildSpec) -> CreateImageResponse {
        match self.try_create_image(spec).await {
            Ok(response) => response,
            Err(e) => {
                error!("Image creation failed: {}", e);
                CreateImageResponse::failure(&e)
            }
        }
    }

    async fn try_create_image(&self, spec: &ImageBuildSpec) -> Result<CreateImageResponse> {
        let description = self.spec_builder.describe(spec).await?;
        info!(
            "Building {} for languages {:?}",
            description.tag, spec.languages
        );

        let output = self
            .engine
            .build_image(&BuildRequest {
                dockerfile: description.dockerfile,
                tag: description.tag,
                no_cache: true,
            })
            .await?;

        info!("Built image {} ({})", description.image_name, output.image_id);
        Ok(CreateImageResponse {
            success: true,
            image_id: Some(output.image_id.into_inner()),
            image_name: Some(description.image_name),
            build_logs: output.logs,
            error_message: None,
        })
    }
}
