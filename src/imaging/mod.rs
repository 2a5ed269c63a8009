pub mod features;
pub mod fetch;

use async_trait::async_trait;
use image::GrayImage;
use thiserror::Error;

pub use features::{OrientedPatchExtractor, DESCRIPTOR_LEN, MAX_DIMENSION};
pub use fetch::HttpImageFetcher;

pub type Raster = GrayImage;
pub type Descriptor = [f32; DESCRIPTOR_LEN];

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("failed to fetch image: {0}")]
    Fetch(String),
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("feature worker failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone, Default)]
pub struct DescriptorSet {
    pub descriptors: Vec<Descriptor>,
}

impl DescriptorSet {
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correspondence {
    pub query: usize,
    pub train: usize,
    pub distance: f32,
}

pub trait ImageCapability: Send + Sync {
    fn decode_and_normalize(&self, bytes: &[u8]) -> Result<Raster, ImageError>;

    fn extract_descriptors(&self, raster: &Raster) -> DescriptorSet;

    fn match_descriptors(
        &self,
        query: &DescriptorSet,
        train: &DescriptorSet,
        k: usize,
    ) -> Vec<Vec<Correspondence>>;
}

#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ImageError>;
}
