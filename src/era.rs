use std::sync::{LazyLock, Mutex};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::RunNumber;
use crate::error::DqmError;

static LETTERED_ERA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Run\d{4}[A-Z]$").expect("valid era regex"));

/// A data-taking era and the inclusive run range it covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Era {
    pub label: String,
    pub start_run: RunNumber,
    pub end_run: RunNumber,
}

impl Era {
    pub fn contains(&self, run: RunNumber) -> bool {
        self.start_run <= run && run <= self.end_run
    }

    /// Directory name used by the offline archive for this era.
    pub fn archive_label(&self) -> &str {
        normalize_era_label(&self.label)
    }
}

/// OMS names sub-eras `Run2022C` while the archive groups them under
/// `Run2022`; every other label passes through untouched.
pub fn normalize_era_label(label: &str) -> &str {
    if LETTERED_ERA.is_match(label) {
        &label[..label.len() - 1]
    } else {
        label
    }
}

/// Source of era records, queried with `start_run <= run <= end_run`.
pub trait EraSource: Send + Sync {
    fn covering_eras(&self, run: RunNumber) -> Result<Vec<Era>, DqmError>;
}

/// Append-only list of eras already resolved. Lookups scan in insertion
/// order and the first containing entry wins; ranges are trusted to be
/// disjoint as OMS reports them.
#[derive(Debug, Clone, Default)]
pub struct EraCache {
    entries: Vec<Era>,
}

impl EraCache {
    pub fn lookup(&self, run: RunNumber) -> Option<&Era> {
        self.entries.iter().find(|era| era.contains(run))
    }

    pub fn insert(&mut self, era: Era) {
        self.entries.push(era);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Era] {
        &self.entries
    }
}

pub struct EraResolver<S: EraSource> {
    source: S,
    cache: Mutex<EraCache>,
}

impl<S: EraSource> EraResolver<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            cache: Mutex::new(EraCache::default()),
        }
    }

    pub fn resolve(&self, run: RunNumber) -> Result<Era, DqmError> {
        if let Some(era) = self.cache().lookup(run) {
            debug!(%run, era = %era.label, "era cache hit");
            return Ok(era.clone());
        }

        let era = self
            .source
            .covering_eras(run)?
            .into_iter()
            .next()
            .ok_or(DqmError::EraNotFound(run.get()))?;
        debug!(%run, era = %era.label, start = %era.start_run, end = %era.end_run, "era resolved");
        self.cache().insert(era.clone());
        Ok(era)
    }

    pub fn cached(&self) -> EraCache {
        self.cache().clone()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    fn cache(&self) -> std::sync::MutexGuard<'_, EraCache> {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn era(label: &str, start: u32, end: u32) -> Era {
        Era {
            label: label.to_string(),
            start_run: RunNumber::new(start),
            end_run: RunNumber::new(end),
        }
    }

    #[test]
    fn normalize_strips_sub_era_letter() {
        assert_eq!(normalize_era_label("Run2022C"), "Run2022");
        assert_eq!(normalize_era_label("Run2022"), "Run2022");
        assert_eq!(normalize_era_label("StreamExpress2022"), "StreamExpress2022");
        assert_eq!(normalize_era_label("Run2022CD"), "Run2022CD");
        assert_eq!(normalize_era_label("Run2022c"), "Run2022c");
    }

    #[test]
    fn cache_is_first_match_in_insertion_order() {
        let mut cache = EraCache::default();
        cache.insert(era("Run2022C", 100, 200));
        cache.insert(era("Run2022D", 150, 300));
        assert_eq!(cache.lookup(RunNumber::new(160)).unwrap().label, "Run2022C");
        assert_eq!(cache.lookup(RunNumber::new(250)).unwrap().label, "Run2022D");
        assert!(cache.lookup(RunNumber::new(99)).is_none());
    }

    #[test]
    fn era_bounds_are_inclusive() {
        let era = era("Run2022E", 359022, 360331);
        assert!(era.contains(RunNumber::new(359022)));
        assert!(era.contains(RunNumber::new(360331)));
        assert!(!era.contains(RunNumber::new(360332)));
    }
}
