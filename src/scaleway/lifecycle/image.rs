//! Image resolution helpers for the Scaleway controller.

use std::future::Future;

use scaleway_rs::{ScalewayImage, ScalewayListInstanceImagesBuilder};

use crate::resources::InstanceSpec;

use super::super::{ScalewayController, ScalewayControllerError};

impl ScalewayController {
    #[expect(
        clippy::excessive_nesting,
        reason = "organisation scoping requires nested builder updates before execution"
    )]
    pub(in crate::scaleway) async fn resolve_image_id(
        &self,
        spec: &InstanceSpec,
    ) -> Result<String, ScalewayControllerError> {
        self.resolve_image_id_with(
            spec,
            || async move {
                let mut scoped = ScalewayListInstanceImagesBuilder::new(self.api.clone(), &spec.zone)
                    .public(true)
                    .project(&self.credentials.project_id)
                    .name(&spec.image)
                    .arch(&spec.architecture);
                if let Some(org) = &self.credentials.organization_id {
                    scoped = scoped.organization(org);
                }
                scoped.run_async().await.map_err(ScalewayControllerError::from)
            },
            || async move {
                ScalewayListInstanceImagesBuilder::new(self.api.clone(), &spec.zone)
                    .public(true)
                    .name(&spec.image)
                    .arch(&spec.architecture)
                    .run_async()
                    .await
                    .map_err(ScalewayControllerError::from)
            },
        )
        .await
    }

    pub(in crate::scaleway) async fn resolve_image_id_with<FutA, FutB, FetchA, FetchB>(
        &self,
        spec: &InstanceSpec,
        project_fetch: FetchA,
        public_fetch: FetchB,
    ) -> Result<String, ScalewayControllerError>
    where
        FetchA: FnOnce() -> FutA,
        FetchB: FnOnce() -> FutB,
        FutA: Future<Output = Result<Vec<ScalewayImage>, ScalewayControllerError>>,
        FutB: Future<Output = Result<Vec<ScalewayImage>, ScalewayControllerError>>,
    {
        let project_images = Self::filter_images(project_fetch().await?, spec);
        let candidates = if project_images.is_empty() {
            Self::filter_images(public_fetch().await?, spec)
        } else {
            project_images
        };
        Self::select_image_id(candidates, spec)
    }

    pub(in crate::scaleway) fn select_image_id(
        mut candidates: Vec<ScalewayImage>,
        spec: &InstanceSpec,
    ) -> Result<String, ScalewayControllerError> {
        candidates.sort_by(|lhs, rhs| rhs.creation_date.cmp(&lhs.creation_date));
        candidates
            .into_iter()
            .next()
            .map(|image| image.id)
            .ok_or_else(|| ScalewayControllerError::ImageNotFound {
                label: spec.image.clone(),
                arch: spec.architecture.clone(),
                zone: spec.zone.clone(),
            })
    }

    pub(in crate::scaleway) fn filter_images(
        images: Vec<ScalewayImage>,
        spec: &InstanceSpec,
    ) -> Vec<ScalewayImage> {
        images
            .into_iter()
            .filter(|image| image.arch == spec.architecture)
            .filter(|image| image.state == "available")
            .collect()
    }
}
