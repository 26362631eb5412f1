//! Exact nearest-neighbor index over embedding vectors.
//!
//! Corpora are single documents (hundreds to a few thousand chunks), so the
//! index is a flat matrix scanned exhaustively on every query. Results are
//! fully deterministic: ascending squared Euclidean distance, ties broken by
//! lowest position.

use std::cmp::Ordering;

use crate::error::IndexError;

/// A nearest-neighbor hit: position in insertion order and its distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    pub distance: f32,
}

impl Neighbor {
    fn rank_cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.position.cmp(&other.position))
    }
}

/// Flat, row-major store of equal-length vectors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorIndex {
    /// `None` until the first vector is stored.
    dimension: Option<usize>,
    data: Vec<f32>,
    len: usize,
}

impl VectorIndex {
    /// An index with no vectors. Every query against it returns nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a fresh index from `vectors`, assigning positions in order.
    pub fn build<V: AsRef<[f32]>>(vectors: &[V]) -> Result<Self, IndexError> {
        let Some(first) = vectors.first() else {
            return Ok(Self::empty());
        };
        let dimension = first.as_ref().len();
        if dimension == 0 {
            return Err(IndexError::InvalidArgument(
                "vectors must have at least one component".to_string(),
            ));
        }

        let mut data = Vec::with_capacity(dimension * vectors.len());
        for vector in vectors {
            let vector = vector.as_ref();
            if vector.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            data.extend_from_slice(vector);
        }

        Ok(Self {
            dimension: Some(dimension),
            data,
            len: vectors.len(),
        })
    }

    /// Rebuild an index from its flat representation, rejecting inconsistent input.
    pub fn from_flat(dimension: usize, data: Vec<f32>) -> Result<Self, IndexError> {
        if data.is_empty() {
            return Ok(Self::empty());
        }
        if dimension == 0 || data.len() % dimension != 0 {
            return Err(IndexError::InvalidArgument(format!(
                "{} values cannot form {}-d vectors",
                data.len(),
                dimension
            )));
        }
        let len = data.len() / dimension;
        Ok(Self {
            dimension: Some(dimension),
            data,
            len,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Row-major vector data.
    pub fn as_flat(&self) -> &[f32] {
        &self.data
    }

    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        let dim = self.dimension?;
        (position < self.len).then(|| &self.data[position * dim..(position + 1) * dim])
    }

    /// The `min(k, len)` nearest vectors to `query`, nearest first.
    pub fn query(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        if k == 0 {
            return Err(IndexError::InvalidArgument(
                "k must be at least 1".to_string(),
            ));
        }
        let Some(dim) = self.dimension else {
            return Ok(Vec::new());
        };
        if query.len() != dim {
            return Err(IndexError::DimensionMismatch {
                expected: dim,
                actual: query.len(),
            });
        }

        let mut scored: Vec<Neighbor> = self
            .data
            .chunks_exact(dim)
            .enumerate()
            .map(|(position, row)| Neighbor {
                position,
                distance: squared_euclidean(query, row),
            })
            .collect();

        let k = k.min(scored.len());
        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, Neighbor::rank_cmp);
            scored.truncate(k);
        }
        scored.sort_unstable_by(Neighbor::rank_cmp);
        Ok(scored)
    }
}

/// Squared Euclidean distance between equal-length vectors.
pub fn squared_euclidean(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentences() -> Vec<Vec<f32>> {
        vec![
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.0, 0.0, 1.0],
            vec![1.0, 1.0, 1.0],
        ]
    }

    #[test]
    fn test_exact_match_has_zero_distance() {
        let index = VectorIndex::build(&sentences()).unwrap();
        let hits = index.query(&[0.0, 0.0, 1.0], 1).unwrap();
        assert_eq!(
            hits,
            vec![Neighbor {
                position: 2,
                distance: 0.0
            }]
        );
    }

    #[test]
    fn test_results_ascend_without_duplicates() {
        let vectors: Vec<Vec<f32>> = (0..50)
            .map(|i| vec![(i * 7 % 13) as f32, (i % 5) as f32, i as f32 * 0.1])
            .collect();
        let index = VectorIndex::build(&vectors).unwrap();

        for k in 1..=vectors.len() {
            let hits = index.query(&[3.0, 2.0, 1.0], k).unwrap();
            assert_eq!(hits.len(), k);
            assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
            let mut positions: Vec<usize> = hits.iter().map(|h| h.position).collect();
            positions.sort_unstable();
            positions.dedup();
            assert_eq!(positions.len(), k);
        }
    }

    #[test]
    fn test_partial_selection_matches_full_sort() {
        let vectors: Vec<Vec<f32>> = (0..40).map(|i| vec![(i as f32).sin(), (i as f32).cos()]).collect();
        let index = VectorIndex::build(&vectors).unwrap();
        let full = index.query(&[0.3, -0.2], 40).unwrap();
        let top5 = index.query(&[0.3, -0.2], 5).unwrap();
        assert_eq!(&full[..5], top5.as_slice());
    }

    #[test]
    fn test_k_larger_than_index() {
        let index = VectorIndex::build(&sentences()).unwrap();
        assert_eq!(index.query(&[0.0, 0.0, 0.0], 10).unwrap().len(), 4);
    }

    #[test]
    fn test_ties_prefer_lowest_position() {
        let vectors: Vec<Vec<f32>> = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![-1.0, 0.0], vec![0.0, -1.0]];
        let index = VectorIndex::build(&vectors).unwrap();
        let hits = index.query(&[0.0, 0.0], 2).unwrap();
        assert_eq!(hits[0].position, 0);
        assert_eq!(hits[1].position, 1);
        assert_eq!(hits[0].distance, hits[1].distance);
    }

    #[test]
    fn test_empty_index_returns_nothing() {
        let index = VectorIndex::build::<Vec<f32>>(&[]).unwrap();
        assert!(index.is_empty());
        assert!(index.query(&[1.0, 2.0], 3).unwrap().is_empty());
        assert!(index.query(&[1.0], 1).unwrap().is_empty());
    }

    #[test]
    fn test_query_dimension_mismatch() {
        let index = VectorIndex::build(&sentences()).unwrap();
        assert_eq!(
            index.query(&[1.0, 0.0], 1),
            Err(IndexError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        );
    }

    #[test]
    fn test_build_rejects_mixed_dimensions() {
        let vectors: Vec<Vec<f32>> = vec![vec![1.0, 0.0, 0.0], vec![1.0, 0.0]];
        assert!(matches!(
            VectorIndex::build(&vectors),
            Err(IndexError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_zero_k_is_rejected() {
        let index = VectorIndex::build(&sentences()).unwrap();
        assert!(matches!(
            index.query(&[0.0, 0.0, 0.0], 0),
            Err(IndexError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_from_flat_validates_shape() {
        let index = VectorIndex::build(&sentences()).unwrap();
        let rebuilt = VectorIndex::from_flat(3, index.as_flat().to_vec()).unwrap();
        assert_eq!(rebuilt, index);
        assert_eq!(rebuilt.vector(3), Some(&[1.0, 1.0, 1.0][..]));
        assert!(VectorIndex::from_flat(3, vec![1.0; 7]).is_err());
        assert!(VectorIndex::from_flat(0, vec![1.0]).is_err());
    }

    #[test]
    fn test_squared_euclidean() {
        assert_eq!(squared_euclidean(&[0.0, 0.0], &[3.0, 4.0]), 25.0);
    }
}
