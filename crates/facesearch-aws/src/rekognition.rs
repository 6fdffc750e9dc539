//! Face collection backed by Amazon Rekognition.

use aws_config::BehaviorVersion;
use aws_sdk_rekognition::config::http::HttpResponse;
use aws_sdk_rekognition::config::Region;
use aws_sdk_rekognition::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_rekognition::primitives::Blob;
use aws_sdk_rekognition::types::FaceMatch as RemoteMatch;
use aws_sdk_rekognition::types::{Attribute, Image, QualityFilter};
use aws_sdk_rekognition::Client;
use facesearch_core::{CollectionError, CollectionHandle, FaceCollection, FaceMatch};
use thiserror::Error;
use tokio::runtime::{Builder, Runtime};

const RESOURCE_NOT_FOUND: &str = "ResourceNotFoundException";
const INVALID_PARAMETER: &str = "InvalidParameterException";

/// Largest page requested from ListFaces and largest batch sent to DeleteFaces.
const PAGE_SIZE: usize = 4096;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("failed to start the client runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

/// Rekognition client plus the runtime that drives its futures.
pub struct RekognitionCollection {
    runtime: Runtime,
    client: Client,
}

impl RekognitionCollection {
    /// Build a client for `region`, with credentials from the default chain.
    pub fn connect(region: &str) -> Result<Self, ClientError> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let shared_config = runtime.block_on(
            aws_config::defaults(BehaviorVersion::latest())
                .region(Region::new(region.to_string()))
                .load(),
        );
        tracing::info!(region, "rekognition client ready");
        Ok(Self {
            runtime,
            client: Client::new(&shared_config),
        })
    }
}

impl FaceCollection for RekognitionCollection {
    fn index(
        &self,
        image: &[u8],
        collection: &CollectionHandle,
        external_id: &str,
        max_faces: u32,
    ) -> Result<usize, CollectionError> {
        let request = self
            .client
            .index_faces()
            .collection_id(collection.as_str())
            .image(image_blob(image))
            .external_image_id(external_id)
            .max_faces(clamp_i32(max_faces as usize))
            .quality_filter(QualityFilter::Medium)
            .detection_attributes(Attribute::All);

        let output = self
            .runtime
            .block_on(request.send())
            .map_err(|err| classify(err, collection))?;

        let unindexed = output.unindexed_faces().len();
        if unindexed > 0 {
            tracing::debug!(external_id, unindexed, "faces rejected by quality filter");
        }
        Ok(output.face_records().len())
    }

    fn search_faces_by_image(
        &self,
        image: &[u8],
        collection: &CollectionHandle,
        similarity_threshold: f32,
        max_faces: u32,
    ) -> Result<Vec<FaceMatch>, CollectionError> {
        let request = self
            .client
            .search_faces_by_image()
            .collection_id(collection.as_str())
            .image(image_blob(image))
            .face_match_threshold(similarity_threshold)
            .max_faces(clamp_i32(max_faces as usize));

        let output = self.runtime.block_on(request.send()).map_err(|err| {
            // Rekognition rejects a search image without any face as an
            // invalid parameter.
            if err.code() == Some(INVALID_PARAMETER) {
                CollectionError::NoFaceInImage
            } else {
                classify(err, collection)
            }
        })?;

        Ok(output.face_matches().iter().filter_map(to_face_match).collect())
    }

    fn list_faces(&self, collection: &CollectionHandle) -> Result<Vec<String>, CollectionError> {
        let mut face_ids = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let request = self
                .client
                .list_faces()
                .collection_id(collection.as_str())
                .max_results(clamp_i32(PAGE_SIZE))
                .set_next_token(next_token.take());

            let output = self
                .runtime
                .block_on(request.send())
                .map_err(|err| classify(err, collection))?;

            face_ids.extend(
                output
                    .faces()
                    .iter()
                    .filter_map(|face| face.face_id().map(str::to_string)),
            );
            match output.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                _ => break,
            }
        }
        tracing::debug!(collection = %collection, faces = face_ids.len(), "listed faces");
        Ok(face_ids)
    }

    fn delete_faces(
        &self,
        collection: &CollectionHandle,
        face_ids: &[String],
    ) -> Result<usize, CollectionError> {
        let mut deleted = 0;
        for batch in face_ids.chunks(PAGE_SIZE) {
            let request = self
                .client
                .delete_faces()
                .collection_id(collection.as_str())
                .set_face_ids(Some(batch.to_vec()));

            let output = self
                .runtime
                .block_on(request.send())
                .map_err(|err| classify(err, collection))?;
            deleted += output.deleted_faces().len();
        }
        Ok(deleted)
    }
}

fn image_blob(bytes: &[u8]) -> Image {
    Image::builder().bytes(Blob::new(bytes.to_vec())).build()
}

fn clamp_i32(value: usize) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

/// Map an SDK failure onto the collection error model.
fn classify<E>(err: SdkError<E, HttpResponse>, collection: &CollectionHandle) -> CollectionError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let status = err.raw_response().map(|response| response.status().as_u16());
    if err.code() == Some(RESOURCE_NOT_FOUND) {
        return CollectionError::NotFound {
            collection: collection.to_string(),
            status,
        };
    }
    let message = err
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| DisplayErrorContext(&err).to_string());
    tracing::warn!(code = ?err.code(), ?status, %message, "rekognition request failed");
    CollectionError::Service { status, message }
}

/// A remote match without an external id cannot be traced to a source image.
fn to_face_match(remote: &RemoteMatch) -> Option<FaceMatch> {
    let external_id = remote.face()?.external_image_id()?;
    Some(FaceMatch {
        external_id: external_id.to_string(),
        similarity: remote.similarity().unwrap_or(0.0),
    })
}
