use crate::vector::cosine_similarity;

/// A corpus entry scored against a query vector.
#[derive(Debug, Clone)]
pub struct ScoredMatch<I> {
    pub id: I,
    pub score: f64,
}

/// Rank a corpus against a query vector and return the top-k entries by
/// cosine similarity, most similar first.
///
/// When `exclude` names a corpus member (by identifier, not reference), that
/// entry is dropped from the ranking — relying on the query being its own top
/// match is not safe once vectors tie. Ties in score keep corpus order: the
/// sort is stable and input order is never otherwise disturbed. `k` is clamped
/// to the corpus size after exclusion. Scores are ranked at full precision;
/// rounding for presentation is the caller's concern.
pub fn rank_top_k<I: Clone + PartialEq>(
    query: &[f64],
    corpus: &[(I, &[f64])],
    k: usize,
    exclude: Option<&I>,
) -> Vec<ScoredMatch<I>> {
    let mut scored: Vec<ScoredMatch<I>> = corpus
        .iter()
        .filter(|(id, _)| exclude != Some(id))
        .map(|(id, vec)| ScoredMatch {
            id: id.clone(),
            score: cosine_similarity(query, vec),
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(k);
    scored
}
