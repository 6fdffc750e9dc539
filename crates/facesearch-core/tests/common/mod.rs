//! In-memory stand-in for the remote face collection.
//!
//! An image "contains a face" when its average colour is saturated; two faces
//! are similar when their average colours are close. Grey images hold no face.

#![allow(dead_code)]

use facesearch_core::{CollectionError, CollectionHandle, FaceCollection, FaceMatch};
use image::{Rgb, RgbImage};
use std::cell::{Cell, RefCell};
use std::path::Path;

pub const RED: [u8; 3] = [200, 40, 40];
pub const BLUE: [u8; 3] = [40, 40, 200];
pub const GREEN: [u8; 3] = [40, 200, 40];
pub const GREY: [u8; 3] = [128, 128, 128];

/// Write a solid-colour JPEG, creating parent folders.
pub fn write_photo(path: &Path, colour: [u8; 3]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    RgbImage::from_pixel(64, 48, Rgb(colour)).save(path).unwrap();
}

struct StoredFace {
    face_id: String,
    external_id: String,
    signature: [f32; 3],
}

#[derive(Default)]
pub struct InMemoryCollection {
    faces: RefCell<Vec<StoredFace>>,
    next_face: Cell<usize>,
    /// External ids in the order they were indexed.
    pub indexed_ids: RefCell<Vec<String>>,
    pub delete_calls: Cell<usize>,
    pub search_calls: Cell<usize>,
    /// Returned from every search when set.
    pub search_error: Option<CollectionError>,
    pub panic_on_search: bool,
    /// Returned from every face listing when set, so purges fail.
    pub list_error: Option<CollectionError>,
}

impl InMemoryCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_search(error: CollectionError) -> Self {
        Self {
            search_error: Some(error),
            ..Self::default()
        }
    }

    pub fn panicking_search() -> Self {
        Self {
            panic_on_search: true,
            ..Self::default()
        }
    }

    pub fn failing_purge(error: CollectionError) -> Self {
        Self {
            list_error: Some(error),
            ..Self::default()
        }
    }

    pub fn face_count(&self) -> usize {
        self.faces.borrow().len()
    }
}

fn signature(image: &[u8]) -> Option<[f32; 3]> {
    let decoded = image::load_from_memory(image).ok()?.to_rgb8();
    let pixels = (decoded.width() * decoded.height()) as f32;
    let mut sum = [0f32; 3];
    for pixel in decoded.pixels() {
        for (total, channel) in sum.iter_mut().zip(pixel.0) {
            *total += channel as f32;
        }
    }
    let mean = sum.map(|total| total / pixels);
    let spread = mean.iter().cloned().fold(f32::MIN, f32::max)
        - mean.iter().cloned().fold(f32::MAX, f32::min);
    (spread > 20.0).then_some(mean)
}

fn similarity(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    let distance = a
        .iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt();
    (100.0 - distance).max(0.0)
}

impl FaceCollection for InMemoryCollection {
    fn index(
        &self,
        image: &[u8],
        _collection: &CollectionHandle,
        external_id: &str,
        max_faces: u32,
    ) -> Result<usize, CollectionError> {
        self.indexed_ids.borrow_mut().push(external_id.to_string());
        let Some(signature) = signature(image) else {
            return Ok(0);
        };
        if max_faces == 0 {
            return Ok(0);
        }
        let id = self.next_face.get() + 1;
        self.next_face.set(id);
        self.faces.borrow_mut().push(StoredFace {
            face_id: format!("face-{id}"),
            external_id: external_id.to_string(),
            signature,
        });
        Ok(1)
    }

    fn search_faces_by_image(
        &self,
        image: &[u8],
        _collection: &CollectionHandle,
        similarity_threshold: f32,
        max_faces: u32,
    ) -> Result<Vec<FaceMatch>, CollectionError> {
        self.search_calls.set(self.search_calls.get() + 1);
        if self.panic_on_search {
            panic!("simulated crash during search");
        }
        if let Some(err) = &self.search_error {
            return Err(err.clone());
        }
        let probe = signature(image).ok_or(CollectionError::NoFaceInImage)?;

        let mut matches: Vec<FaceMatch> = self
            .faces
            .borrow()
            .iter()
            .map(|face| FaceMatch {
                external_id: face.external_id.clone(),
                similarity: similarity(&probe, &face.signature),
            })
            .filter(|candidate| candidate.similarity >= similarity_threshold)
            .collect();
        matches.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        matches.truncate(max_faces as usize);
        Ok(matches)
    }

    fn list_faces(&self, _collection: &CollectionHandle) -> Result<Vec<String>, CollectionError> {
        if let Some(err) = &self.list_error {
            return Err(err.clone());
        }
        Ok(self
            .faces
            .borrow()
            .iter()
            .map(|face| face.face_id.clone())
            .collect())
    }

    fn delete_faces(
        &self,
        _collection: &CollectionHandle,
        face_ids: &[String],
    ) -> Result<usize, CollectionError> {
        self.delete_calls.set(self.delete_calls.get() + 1);
        let mut faces = self.faces.borrow_mut();
        let before = faces.len();
        faces.retain(|face| !face_ids.contains(&face.face_id));
        Ok(before - faces.len())
    }
}
