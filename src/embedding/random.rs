//! Deterministic fallback used when no embedding backend is configured.
//!
//! Vectors are unit length with pseudo-random components seeded by the BLAKE3
//! hash of the (truncated) input, so identical texts embed identically. They
//! carry no semantic meaning.

use super::provider::{truncate_input, EmbeddingError, EmbeddingProvider};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub struct RandomEmbeddingProvider {
    dimension: usize,
    max_input_chars: usize,
}

impl RandomEmbeddingProvider {
    pub fn new(dimension: usize, max_input_chars: usize) -> Self {
        Self {
            dimension,
            max_input_chars,
        }
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let seed = *blake3::hash(text.as_bytes()).as_bytes();
        let mut rng = StdRng::from_seed(seed);

        let mut vector: Vec<f32> = (0..self.dimension)
            .map(|_| rng.random_range(-1.0f32..1.0))
            .collect();

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            vector.iter_mut().for_each(|x| *x /= norm);
        } else if let Some(first) = vector.first_mut() {
            *first = 1.0;
        }
        vector
    }
}

impl EmbeddingProvider for RandomEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let text = truncate_input(text, self.max_input_chars);
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }
        Ok(self.vector_for(text))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "random"
    }

    fn is_random(&self) -> bool {
        true
    }
}
