//! Per-modality top-K ranking shared by every store implementation.

use super::{cosine_similarity, EvidenceHit, EvidenceRecord, Modality};
use crate::error::{GlimtError, Result};
use std::cmp::Ordering;

/// Query embeddings, one per modality space that the store contains.
#[derive(Debug, Clone, Default)]
pub struct QueryVectors {
    pub text: Option<Vec<f32>>,
    pub image: Option<Vec<f32>>,
}

impl QueryVectors {
    fn for_modality(&self, modality: Modality) -> Option<&[f32]> {
        match modality {
            Modality::Text => self.text.as_deref(),
            Modality::Image => self.image.as_deref(),
        }
    }
}

/// Rank `records` against the query and keep the top K of each modality.
///
/// `records` must be in insertion order. Each K is clamped to
/// `[1, available]`. NaN scores rank last. Records with an unknown modality
/// tag are appended unscored after the ranked hits.
pub fn rank_records(
    records: &[EvidenceRecord],
    query: &QueryVectors,
    text_k: usize,
    image_k: usize,
) -> Result<Vec<EvidenceHit>> {
    let mut images: Vec<(usize, f32)> = Vec::new();
    let mut texts: Vec<(usize, f32)> = Vec::new();
    let mut unclassified: Vec<usize> = Vec::new();

    for (idx, record) in records.iter().enumerate() {
        let Some(modality) = record.modality() else {
            unclassified.push(idx);
            continue;
        };

        let query_vector = query.for_modality(modality).ok_or_else(|| {
            GlimtError::Embedding(format!("No {} query embedding available", modality))
        })?;

        if record.embedding.len() != query_vector.len() {
            return Err(GlimtError::CorruptIndex {
                position: record.ordinal,
                reason: format!(
                    "{} embedding has {} dimensions, query has {}",
                    modality,
                    record.embedding.len(),
                    query_vector.len()
                ),
            });
        }

        let score = sanitize(cosine_similarity(query_vector, &record.embedding));
        match modality {
            Modality::Image => images.push((idx, score)),
            Modality::Text => texts.push((idx, score)),
        }
    }

    let by_rank = |a: &(usize, f32), b: &(usize, f32)| -> Ordering {
        b.1.total_cmp(&a.1)
            .then_with(|| records[a.0].ordinal.cmp(&records[b.0].ordinal))
    };

    images.sort_by(by_rank);
    images.truncate(clamp_k(image_k, images.len()));

    texts.sort_by(by_rank);
    texts.truncate(clamp_k(text_k, texts.len()));

    let mut ranked = images;
    ranked.extend(texts);
    ranked.sort_by(by_rank);

    let mut hits: Vec<EvidenceHit> = ranked
        .into_iter()
        .map(|(idx, score)| EvidenceHit {
            record: records[idx].clone(),
            score,
        })
        .collect();

    hits.extend(unclassified.into_iter().map(|idx| EvidenceHit {
        record: records[idx].clone(),
        score: f32::NEG_INFINITY,
    }));

    Ok(hits)
}

/// Clamp a requested K to `[1, available]`.
fn clamp_k(k: usize, available: usize) -> usize {
    k.max(1).min(available)
}

fn sanitize(score: f32) -> f32 {
    if score.is_nan() {
        f32::NEG_INFINITY
    } else {
        score
    }
}
