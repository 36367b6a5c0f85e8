//! Memoizing evaluator for partition expressions.

use std::collections::{HashMap, VecDeque};
use std::sync::{LazyLock, Mutex, PoisonError};

use log::trace;

use crate::expression::{ExpressionResult, PartitionExpression};
use crate::partition::PartitionStrategy;

/// Number of compiled expressions kept by [`ExpressionEngine::new`].
pub const DEFAULT_CACHE_CAPACITY: usize = 10;

/// Number of compiled expressions kept by the process-wide engine.
pub const SHARED_CACHE_CAPACITY: usize = 64;

static SHARED: LazyLock<Mutex<ExpressionEngine>> =
    LazyLock::new(|| Mutex::new(ExpressionEngine::with_capacity(SHARED_CACHE_CAPACITY)));

/// Evaluate `text` through the process-wide engine.
///
/// `PartitionStrategy::from_str`, and with it descriptor loading, goes
/// through here, so reopening the same dataset does not re-parse its strategy.
pub fn evaluate_shared(text: &str) -> ExpressionResult<PartitionStrategy> {
    SHARED
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .evaluate(text)
}

/// Evaluates expression text, remembering a bounded number of results.
///
/// Repeatedly loading descriptors for the same dataset re-evaluates the same
/// formula; the cache turns that into a lookup. Eviction is oldest-first.
/// Only successful evaluations are cached. A capacity of zero disables caching.
#[derive(Debug)]
pub struct ExpressionEngine {
    capacity: usize,
    entries: HashMap<String, PartitionStrategy>,
    order: VecDeque<String>,
}

impl Default for ExpressionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpressionEngine {
    /// Engine with [`DEFAULT_CACHE_CAPACITY`].
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    /// Engine caching at most `capacity` expressions.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    /// Parse and evaluate `text`, consulting the cache first.
    pub fn evaluate(&mut self, text: &str) -> ExpressionResult<PartitionStrategy> {
        if let Some(strategy) = self.entries.get(text) {
            trace!("partition expression cache hit: {text}");
            return Ok(strategy.clone());
        }

        let strategy = PartitionExpression::parse(text)?.evaluate()?;

        if self.capacity > 0 {
            while self.order.len() >= self.capacity {
                match self.order.pop_front() {
                    Some(oldest) => self.entries.remove(&oldest),
                    None => break,
                };
            }
            self.order.push_back(text.to_string());
            self.entries.insert(text.to_string(), strategy.clone());
        }

        Ok(strategy)
    }

    /// Number of cached expressions.
    pub fn cached(&self) -> usize {
        self.entries.len()
    }

    /// True if `text` is currently cached.
    pub fn is_cached(&self, text: &str) -> bool {
        self.entries.contains_key(text)
    }
}
