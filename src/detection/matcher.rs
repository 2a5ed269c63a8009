use std::sync::Arc;

use chrono::{DateTime, Utc};
use image::imageops;

use crate::{
    domain::{MatchResult, Post},
    imaging::{Correspondence, DescriptorSet, ImageCapability, ImageError, ImageFetcher},
};

/// Lowe's ratio: the nearest neighbour must beat the runner-up by this factor.
pub const RATIO_TEST: f32 = 0.7;
pub const SCORE_EPSILON: f64 = 1e-9;
pub const DATE_TOLERANCE_MS: i64 = 1_000;

pub fn passes_ratio_test(neighbours: &[Correspondence]) -> bool {
    match neighbours {
        [best, second, ..] => best.distance < RATIO_TEST * second.distance,
        _ => false,
    }
}

fn good_ratio(
    capability: &dyn ImageCapability,
    query: &DescriptorSet,
    train: &DescriptorSet,
) -> f64 {
    if query.is_empty() {
        return 0.0;
    }
    let good = capability
        .match_descriptors(query, train, 2)
        .iter()
        .filter(|neighbours| passes_ratio_test(neighbours))
        .count();
    good as f64 / query.len() as f64
}

pub fn similarity(
    capability: &dyn ImageCapability,
    original: &DescriptorSet,
    mirrored: &DescriptorSet,
    candidate: &DescriptorSet,
) -> f64 {
    let forward = good_ratio(capability, original, candidate);
    let flipped = good_ratio(capability, mirrored, candidate);
    forward.max(flipped).clamp(0.0, 1.0)
}

/// Best candidate seen so far. Ties go to the older post.
#[derive(Debug, Clone)]
pub struct RunningBest {
    index: Option<usize>,
    score: f64,
    created: DateTime<Utc>,
}

impl Default for RunningBest {
    fn default() -> Self {
        Self {
            index: None,
            score: 0.0,
            created: DateTime::<Utc>::MAX_UTC,
        }
    }
}

impl RunningBest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offer(&mut self, index: usize, score: f64, created: DateTime<Utc>) -> bool {
        let take = match self.index {
            None => true,
            Some(_) => {
                let diff = score - self.score;
                let older =
                    (self.created - created).num_milliseconds() > DATE_TOLERANCE_MS;
                diff > SCORE_EPSILON || (diff.abs() <= SCORE_EPSILON && older)
            }
        };
        if take {
            self.index = Some(index);
            self.score = score;
            self.created = created;
        }
        take
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn score(&self) -> f64 {
        self.score
    }
}

pub struct SimilarityMatcher {
    fetcher: Arc<dyn ImageFetcher>,
    capability: Arc<dyn ImageCapability>,
}

impl SimilarityMatcher {
    pub fn new(fetcher: Arc<dyn ImageFetcher>, capability: Arc<dyn ImageCapability>) -> Self {
        Self {
            fetcher,
            capability,
        }
    }

    pub async fn best_match(
        &self,
        reference: &Post,
        candidates: &[Post],
    ) -> Result<MatchResult, ImageError> {
        if candidates.is_empty() {
            return Ok(MatchResult::none());
        }

        let bytes = self.fetcher.fetch(&reference.url).await?;
        let capability = self.capability.clone();
        let reference_sets = Arc::new(
            blocking(move || {
                let raster = capability.decode_and_normalize(&bytes)?;
                let mirrored = imageops::flip_horizontal(&raster);
                Ok((
                    capability.extract_descriptors(&raster),
                    capability.extract_descriptors(&mirrored),
                ))
            })
            .await?,
        );

        let mut best = RunningBest::new();
        for (index, candidate) in candidates.iter().enumerate() {
            let bytes = self.fetcher.fetch(&candidate.url).await?;
            let capability = self.capability.clone();
            let sets = reference_sets.clone();
            let score = blocking(move || {
                let raster = capability.decode_and_normalize(&bytes)?;
                let train = capability.extract_descriptors(&raster);
                Ok(similarity(capability.as_ref(), &sets.0, &sets.1, &train))
            })
            .await?;

            tracing::debug!(
                target: "matcher",
                post = %reference.short_url(),
                candidate = %candidate.short_url(),
                score,
                "candidate compared"
            );
            best.offer(index, score, candidate.created);
        }

        Ok(MatchResult {
            candidate: best.index().map(|i| candidates[i].clone()),
            confidence: best.score().clamp(0.0, 1.0),
        })
    }
}

async fn blocking<T, F>(work: F) -> Result<T, ImageError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ImageError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| ImageError::Task(err.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        at, encode_png, image_post, textured_image, CountingCapability, FakeImageFetcher,
    };

    fn matcher_with(images: &[(&Post, Vec<u8>)]) -> (SimilarityMatcher, Arc<FakeImageFetcher>, Arc<CountingCapability>) {
        let fetcher = Arc::new(FakeImageFetcher::new());
        for (post, bytes) in images {
            fetcher.insert(&post.url, bytes.clone());
        }
        let capability = Arc::new(CountingCapability::new());
        let matcher = SimilarityMatcher::new(fetcher.clone(), capability.clone());
        (matcher, fetcher, capability)
    }

    #[tokio::test]
    async fn empty_candidate_list_never_touches_images() {
        let reference = image_post("ref", "cat", 100);
        let (matcher, fetcher, capability) = matcher_with(&[]);

        let result = matcher.best_match(&reference, &[]).await.unwrap();
        assert!(result.candidate.is_none());
        assert_eq!(result.confidence, 0.0);
        assert_eq!(fetcher.calls(), 0);
        assert_eq!(capability.calls(), 0);
    }

    #[tokio::test]
    async fn identical_and_mirrored_copies_score_high() {
        let reference = image_post("ref", "cat", 1_000);
        let copy = image_post("copy", "cat", 10);
        let mirror = image_post("mirror", "cat", 20);
        let other = image_post("other", "cat", 30);

        let texture = textured_image(11, 128);
        let flipped = imageops::flip_horizontal(&texture);
        let (matcher, _, _) = matcher_with(&[
            (&reference, encode_png(&texture)),
            (&copy, encode_png(&texture)),
            (&mirror, encode_png(&flipped)),
            (&other, encode_png(&textured_image(99, 128))),
        ]);

        let exact = matcher.best_match(&reference, &[copy.clone()]).await.unwrap();
        assert_eq!(exact.candidate.unwrap().id, "copy");
        assert!(exact.confidence > 0.9, "exact copy scored {}", exact.confidence);

        let flip = matcher.best_match(&reference, &[mirror.clone()]).await.unwrap();
        assert!(flip.confidence > 0.9, "mirrored copy scored {}", flip.confidence);

        let unrelated = matcher.best_match(&reference, &[other.clone()]).await.unwrap();
        assert!(unrelated.confidence < 0.25, "unrelated scored {}", unrelated.confidence);

        let mixed = matcher
            .best_match(&reference, &[other, copy])
            .await
            .unwrap();
        assert_eq!(mixed.candidate.unwrap().id, "copy");
    }

    #[tokio::test]
    async fn unreachable_image_is_an_error() {
        let reference = image_post("ref", "cat", 100);
        let candidate = image_post("gone", "cat", 10);
        let (matcher, _, _) = matcher_with(&[(&reference, encode_png(&textured_image(1, 64)))]);

        let err = matcher.best_match(&reference, &[candidate]).await.unwrap_err();
        assert!(matches!(err, ImageError::Fetch(_)));
    }

    #[test]
    fn ratio_test_needs_two_clearly_separated_neighbours() {
        let c = |distance| Correspondence {
            query: 0,
            train: 0,
            distance,
        };
        assert!(passes_ratio_test(&[c(0.1), c(1.0)]));
        assert!(!passes_ratio_test(&[c(0.7), c(1.0)]));
        assert!(!passes_ratio_test(&[c(0.0), c(0.0)]));
        assert!(!passes_ratio_test(&[c(0.1)]));
        assert!(!passes_ratio_test(&[]));
    }

    #[test]
    fn higher_score_wins_regardless_of_age() {
        let mut best = RunningBest::new();
        assert!(best.offer(0, 0.4, at(0)));
        assert!(best.offer(1, 0.5, at(1_000)));
        assert!(!best.offer(2, 0.45, at(-1_000)));
        assert_eq!(best.index(), Some(1));
    }

    #[test]
    fn tie_prefers_older_post_beyond_tolerance() {
        let mut best = RunningBest::new();
        best.offer(0, 0.5, at(100));
        assert!(best.offer(1, 0.5, at(50)));
        assert_eq!(best.index(), Some(1));
        assert!(!best.offer(2, 0.5, at(60)));
        assert_eq!(best.index(), Some(1));
    }

    #[test]
    fn tie_within_tolerance_keeps_first_encountered() {
        for _ in 0..5 {
            let mut best = RunningBest::new();
            best.offer(0, 0.5, at(100));
            assert!(!best.offer(1, 0.5, at(100)));
            assert!(!best.offer(2, 0.5 + 1e-12, at(99)));
            assert_eq!(best.index(), Some(0));
        }
    }
}
