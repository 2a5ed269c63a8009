use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
    domain::Post,
    platform::{PlatformClient, PlatformError},
};

static NON_QUERY_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9']+").expect("valid query regex"));

const SEARCH_PAGE: usize = 100;

pub fn normalize_title(title: &str) -> String {
    let ascii = deunicode::deunicode(title);
    NON_QUERY_CHARS.replace_all(&ascii, " ").trim().to_string()
}

#[derive(Debug, Clone, Copy)]
pub struct CandidateSearch {
    limit: usize,
}

impl CandidateSearch {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }

    /// Up to `limit` distinct single-image posts from the reference's own
    /// community, in relevance order, never including the reference itself.
    pub async fn candidates(
        &self,
        client: &dyn PlatformClient,
        reference: &Post,
    ) -> Result<Vec<Post>, PlatformError> {
        if self.limit == 0 {
            return Ok(Vec::new());
        }
        let query = normalize_title(&reference.title);
        if query.is_empty() {
            tracing::debug!(
                target: "search",
                post = %reference.short_url(),
                "title normalizes to an empty query"
            );
            return Ok(Vec::new());
        }

        let results = client
            .search(&reference.subreddit, &query, SEARCH_PAGE)
            .await?;
        let mut seen = HashSet::new();
        let candidates: Vec<Post> = results
            .into_iter()
            .filter(|post| post.id != reference.id)
            .filter(|post| post.is_single_image())
            .filter(|post| seen.insert(post.id.clone()))
            .take(self.limit)
            .collect();

        tracing::debug!(
            target: "search",
            post = %reference.short_url(),
            query = %query,
            found = candidates.len(),
            "candidate search finished"
        );
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{image_post, text_post, FakePlatform};

    #[test]
    fn normalize_transliterates_and_collapses() {
        assert_eq!(
            normalize_title("  Crème brûlée!!  «my cat's»   FIRST try :) "),
            "Creme brulee my cat's FIRST try"
        );
        assert_eq!(normalize_title("¿Qué?"), "Que");
        assert_eq!(normalize_title("!!!"), "");
    }

    #[test]
    fn normalize_is_idempotent() {
        for title in [
            "Crème brûlée » part 2",
            "ünïcödé/slashes\\and_underscores",
            "already normal",
            "  \t\n ",
            "It's 5 o'clock",
        ] {
            let once = normalize_title(title);
            assert_eq!(normalize_title(&once), once, "title {title:?}");
        }
    }

    #[tokio::test]
    async fn candidates_skip_self_non_images_and_duplicates() {
        let platform = FakePlatform::new();
        let reference = image_post("ref", "My cat, sleeping!", 500);
        platform.set_search_results(vec![
            reference.clone(),
            text_post("t1", "My cat sleeping"),
            image_post("a", "my cat sleeping", 100),
            image_post("a", "my cat sleeping", 100),
            image_post("b", "cat sleeping", 200),
            image_post("c", "sleeping cat", 300),
        ]);

        let found = CandidateSearch::new(2)
            .candidates(&platform, &reference)
            .await
            .unwrap();
        let ids: Vec<_> = found.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(
            platform.search_queries(),
            vec![("pics".to_string(), "My cat sleeping".to_string())]
        );
    }

    #[tokio::test]
    async fn empty_results_are_not_an_error() {
        let platform = FakePlatform::new();
        let reference = image_post("ref", "unique title", 0);
        let found = CandidateSearch::new(3)
            .candidates(&platform, &reference)
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn blank_query_skips_the_search() {
        let platform = FakePlatform::new();
        let reference = image_post("ref", "?!", 0);
        let found = CandidateSearch::new(3)
            .candidates(&platform, &reference)
            .await
            .unwrap();
        assert!(found.is_empty());
        assert_eq!(platform.search_calls(), 0);
    }
}
