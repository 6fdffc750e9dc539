//! facesearch-aws: Amazon Rekognition backend for the face collection.
//!
//! Wraps the async SDK client in a private single-threaded runtime so the
//! synchronous workflow in `facesearch-core` can drive it directly.

pub mod rekognition;

pub use rekognition::{ClientError, RekognitionCollection};
