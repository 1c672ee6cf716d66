// src/patterns/mod.rs — Error normalization and pattern clustering

pub mod clusterer;
pub mod normalizer;

pub use clusterer::{
    find_similar_errors, summarize_by_category, CategorySummary, ErrorClusterer, ErrorContext,
    ErrorPattern, FixOutcome, ProcessedError, SimilarError,
};
pub use normalizer::{normalize_error, ErrorCategory, NormalizedError};
