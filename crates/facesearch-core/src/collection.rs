//! Remote face collection capability.
//!
//! Implementors supply the four raw remote operations; the provided
//! [`FaceCollection::search`] and [`FaceCollection::purge`] methods layer the
//! run semantics (result truncation, "no result" sentinel, purge status) on
//! top so every backend behaves the same.

use crate::types::{CollectionHandle, FaceMatch, ReturnMode};
use thiserror::Error;

/// Upper bound on candidates requested per search.
pub const SEARCH_MAX_FACES: u32 = 4096;

/// Status reported for a failed purge when the remote gave no status code.
pub const UNKNOWN_STATUS: u16 = 1;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollectionError {
    #[error("collection {collection} was not found")]
    NotFound {
        collection: String,
        status: Option<u16>,
    },
    #[error("no face detected in the submitted image")]
    NoFaceInImage,
    #[error("remote service error: {message}")]
    Service {
        status: Option<u16>,
        message: String,
    },
}

impl CollectionError {
    /// Status code returned by the remote service, when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::NotFound { status, .. } | Self::Service { status, .. } => *status,
            Self::NoFaceInImage => None,
        }
    }
}

/// Result of emptying a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeOutcome {
    /// The collection held no faces; nothing was deleted.
    AlreadyEmpty,
    Emptied { deleted: usize },
    NotFound { status: Option<u16> },
    Failed { status: Option<u16> },
}

impl PurgeOutcome {
    /// Status code for the purge: `0` on success, otherwise the remote's
    /// status code (or [`UNKNOWN_STATUS`]).
    pub fn status_code(&self) -> u16 {
        match self {
            Self::AlreadyEmpty | Self::Emptied { .. } => 0,
            Self::NotFound { status } | Self::Failed { status } => {
                status.unwrap_or(UNKNOWN_STATUS)
            }
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code() == 0
    }
}

/// A remote collection of indexed faces.
pub trait FaceCollection {
    /// Register up to `max_faces` faces found in `image` under `external_id`.
    ///
    /// Returns how many faces were registered; zero is not an error.
    fn index(
        &self,
        image: &[u8],
        collection: &CollectionHandle,
        external_id: &str,
        max_faces: u32,
    ) -> Result<usize, CollectionError>;

    /// Faces similar to the largest face in `image`, best first, as ranked
    /// by the remote service.
    fn search_faces_by_image(
        &self,
        image: &[u8],
        collection: &CollectionHandle,
        similarity_threshold: f32,
        max_faces: u32,
    ) -> Result<Vec<FaceMatch>, CollectionError>;

    /// Ids of every face stored in the collection.
    fn list_faces(&self, collection: &CollectionHandle) -> Result<Vec<String>, CollectionError>;

    /// Delete the given faces, returning how many were removed.
    fn delete_faces(
        &self,
        collection: &CollectionHandle,
        face_ids: &[String],
    ) -> Result<usize, CollectionError>;

    /// Search the collection for faces matching `image`.
    ///
    /// Returns `Ok(None)` when nothing reached the threshold. In
    /// [`ReturnMode::BestOnly`] only the top-ranked candidate is kept.
    fn search(
        &self,
        image: &[u8],
        collection: &CollectionHandle,
        return_mode: ReturnMode,
        similarity_threshold: f32,
    ) -> Result<Option<Vec<FaceMatch>>, CollectionError> {
        let mut matches =
            self.search_faces_by_image(image, collection, similarity_threshold, SEARCH_MAX_FACES)?;
        if matches.is_empty() {
            return Ok(None);
        }
        if return_mode == ReturnMode::BestOnly {
            matches.truncate(1);
        }
        Ok(Some(matches))
    }

    /// Remove every face from the collection.
    ///
    /// Remote failures are reported on the console and folded into the
    /// returned outcome; they never propagate.
    fn purge(&self, collection: &CollectionHandle) -> PurgeOutcome {
        let result = self.list_faces(collection).and_then(|face_ids| {
            if face_ids.is_empty() {
                println!("No faces to delete.");
                Ok(PurgeOutcome::AlreadyEmpty)
            } else {
                self.delete_faces(collection, &face_ids)
                    .map(|deleted| PurgeOutcome::Emptied { deleted })
            }
        });

        match result {
            Ok(outcome) => {
                tracing::info!(%collection, ?outcome, "collection purged");
                outcome
            }
            Err(CollectionError::NotFound { status, .. }) => {
                println!("The collection {collection} was not found");
                tracing::error!(%collection, ?status, "purge failed: collection not found");
                PurgeOutcome::NotFound { status }
            }
            Err(err) => {
                let message = match &err {
                    CollectionError::Service { message, .. } => message.clone(),
                    other => other.to_string(),
                };
                println!("Error other than Not Found occurred: {message}");
                tracing::error!(%collection, error = %err, "purge failed");
                PurgeOutcome::Failed {
                    status: err.status(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    /// Scripted collection recording the calls made against it.
    #[derive(Default)]
    struct Scripted {
        ranked: Vec<FaceMatch>,
        faces: RefCell<Vec<String>>,
        list_error: Option<CollectionError>,
        delete_calls: Cell<usize>,
        last_search: Cell<Option<(f32, u32)>>,
    }

    impl FaceCollection for Scripted {
        fn index(
            &self,
            _image: &[u8],
            _collection: &CollectionHandle,
            _external_id: &str,
            _max_faces: u32,
        ) -> Result<usize, CollectionError> {
            Ok(0)
        }

        fn search_faces_by_image(
            &self,
            _image: &[u8],
            _collection: &CollectionHandle,
            similarity_threshold: f32,
            max_faces: u32,
        ) -> Result<Vec<FaceMatch>, CollectionError> {
            self.last_search.set(Some((similarity_threshold, max_faces)));
            Ok(self.ranked.clone())
        }

        fn list_faces(&self, _collection: &CollectionHandle) -> Result<Vec<String>, CollectionError> {
            match &self.list_error {
                Some(err) => Err(err.clone()),
                None => Ok(self.faces.borrow().clone()),
            }
        }

        fn delete_faces(
            &self,
            _collection: &CollectionHandle,
            face_ids: &[String],
        ) -> Result<usize, CollectionError> {
            self.delete_calls.set(self.delete_calls.get() + 1);
            let mut faces = self.faces.borrow_mut();
            let before = faces.len();
            faces.retain(|id| !face_ids.contains(id));
            Ok(before - faces.len())
        }
    }

    fn handle() -> CollectionHandle {
        CollectionHandle::new("test-collection").unwrap()
    }

    fn candidate(id: &str, similarity: f32) -> FaceMatch {
        FaceMatch {
            external_id: id.to_string(),
            similarity,
        }
    }

    #[test]
    fn test_search_all_keeps_remote_order() {
        let remote = Scripted {
            ranked: vec![candidate("2", 99.1), candidate("1", 85.0), candidate("7", 81.3)],
            ..Default::default()
        };
        let matches = remote
            .search(b"img", &handle(), ReturnMode::All, 80.0)
            .unwrap()
            .unwrap();
        assert_eq!(matches, remote.ranked);
        assert_eq!(remote.last_search.get(), Some((80.0, SEARCH_MAX_FACES)));
    }

    #[test]
    fn test_search_best_only_takes_first() {
        let remote = Scripted {
            ranked: vec![candidate("2", 99.1), candidate("1", 99.5)],
            ..Default::default()
        };
        let matches = remote
            .search(b"img", &handle(), ReturnMode::BestOnly, 80.0)
            .unwrap()
            .unwrap();
        assert_eq!(matches, vec![candidate("2", 99.1)]);
    }

    #[test]
    fn test_search_without_matches_is_none() {
        let remote = Scripted::default();
        assert_eq!(remote.search(b"img", &handle(), ReturnMode::All, 80.0), Ok(None));
        assert_eq!(remote.search(b"img", &handle(), ReturnMode::BestOnly, 80.0), Ok(None));
    }

    #[test]
    fn test_purge_empty_collection_skips_delete() {
        let remote = Scripted::default();
        let outcome = remote.purge(&handle());
        assert_eq!(outcome, PurgeOutcome::AlreadyEmpty);
        assert_eq!(outcome.status_code(), 0);
        assert_eq!(remote.delete_calls.get(), 0);
    }

    #[test]
    fn test_purge_removes_every_face_in_one_call() {
        let remote = Scripted::default();
        remote
            .faces
            .borrow_mut()
            .extend(["f1", "f2", "f3"].map(String::from));

        let outcome = remote.purge(&handle());
        assert_eq!(outcome, PurgeOutcome::Emptied { deleted: 3 });
        assert!(outcome.is_success());
        assert_eq!(remote.delete_calls.get(), 1);
        assert!(remote.faces.borrow().is_empty());
    }

    #[test]
    fn test_purge_not_found_reports_remote_status() {
        let remote = Scripted {
            list_error: Some(CollectionError::NotFound {
                collection: "test-collection".into(),
                status: Some(400),
            }),
            ..Default::default()
        };
        let outcome = remote.purge(&handle());
        assert_eq!(outcome, PurgeOutcome::NotFound { status: Some(400) });
        assert_eq!(outcome.status_code(), 400);
    }

    #[test]
    fn test_purge_other_error_is_nonzero() {
        let remote = Scripted {
            list_error: Some(CollectionError::Service {
                status: None,
                message: "throttled".into(),
            }),
            ..Default::default()
        };
        let outcome = remote.purge(&handle());
        assert_eq!(outcome, PurgeOutcome::Failed { status: None });
        assert_eq!(outcome.status_code(), UNKNOWN_STATUS);
        assert!(!outcome.is_success());
    }
}
