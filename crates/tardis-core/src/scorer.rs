use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tardis_types::{Datafile, Dataset, Experiment, Result};

use crate::catalog::Catalog;
use crate::config::ScoringConfig;

/// A local datafile and its migration priority. Higher migrates first.
#[derive(Debug, Clone)]
pub struct ScoredDatafile {
    pub datafile: Datafile,
    pub score: f64,
}

/// Which datafiles to score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreScope {
    All,
    Experiment(u64),
    Dataset(u64),
}

/// Pure scoring over records already in memory.
pub struct Scorer<'a> {
    config: &'a ScoringConfig,
    now: DateTime<Utc>,
}

impl<'a> Scorer<'a> {
    pub fn new(config: &'a ScoringConfig, now: DateTime<Utc>) -> Self {
        Self { config, now }
    }

    fn class_weight(&self, class: usize) -> f64 {
        let weights = &self.config.user_priority_weighting;
        weights
            .get(class)
            .or_else(|| weights.last())
            .copied()
            .unwrap_or(1.0)
    }

    /// Highest weight among the experiment's owners.
    pub fn experiment_score(&self, experiment: &Experiment) -> f64 {
        let default = self.class_weight(self.config.default_user_priority);
        experiment
            .owners
            .iter()
            .map(|owner| match self.config.user_priorities.get(owner) {
                Some(class) => self.class_weight(*class),
                None => default,
            })
            .reduce(f64::max)
            .unwrap_or(default)
    }

    /// Highest score among the dataset's experiments; 1.0 for an orphan.
    pub fn dataset_score(&self, dataset: &Dataset, experiments: &HashMap<u64, Experiment>) -> f64 {
        dataset
            .experiments
            .iter()
            .filter_map(|id| experiments.get(id))
            .map(|e| self.experiment_score(e))
            .reduce(f64::max)
            .unwrap_or(1.0)
    }

    /// Size and age bonus, scaled down for unverified files.
    pub fn datafile_base_score(&self, datafile: &Datafile) -> f64 {
        let cfg = self.config;
        let size = datafile.size.unwrap_or(0);
        let mut score = 1.0;
        if size > cfg.file_size_threshold {
            score += cfg.file_size_weighting * ((size + 1) as f64).log10();
        }
        let age_days = (self.now - datafile.created).num_seconds() as f64 / 86_400.0;
        if age_days > cfg.file_age_threshold as f64 {
            score += cfg.file_age_weighting * age_days;
        }
        if !datafile.verified {
            score *= cfg.unverified_weighting;
        }
        score
    }

    /// Score local datafiles, highest first. Non-local datafiles are left
    /// out; equal scores keep their input order.
    pub fn score(
        &self,
        datafiles: Vec<Datafile>,
        dataset_scores: &HashMap<u64, f64>,
    ) -> Vec<ScoredDatafile> {
        let mut scored: Vec<ScoredDatafile> = datafiles
            .into_iter()
            .filter(Datafile::is_local)
            .map(|datafile| {
                let dataset = dataset_scores.get(&datafile.dataset_id).copied().unwrap_or(1.0);
                let score = self.datafile_base_score(&datafile) * dataset;
                ScoredDatafile { datafile, score }
            })
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored
    }
}

/// Load the records for `scope` in bulk and score them.
pub fn score_scope(
    catalog: &dyn Catalog,
    config: &ScoringConfig,
    scope: ScoreScope,
    now: DateTime<Utc>,
) -> Result<Vec<ScoredDatafile>> {
    let scorer = Scorer::new(config, now);
    let experiments: HashMap<u64, Experiment> = catalog
        .experiments()?
        .into_iter()
        .map(|e| (e.id, e))
        .collect();

    let (datasets, datafiles) = match scope {
        ScoreScope::All => {
            let datafiles = catalog.datafiles()?;
            let mut datasets = Vec::new();
            let mut seen = std::collections::HashSet::new();
            for df in &datafiles {
                if seen.insert(df.dataset_id) {
                    if let Ok(ds) = catalog.dataset(df.dataset_id) {
                        datasets.push(ds);
                    }
                }
            }
            (datasets, datafiles)
        }
        ScoreScope::Experiment(id) => {
            catalog.experiment(id)?;
            (
                catalog.datasets_for_experiment(id)?,
                catalog.datafiles_for_experiment(id)?,
            )
        }
        ScoreScope::Dataset(id) => (vec![catalog.dataset(id)?], catalog.datafiles_for_dataset(id)?),
    };

    let dataset_scores: HashMap<u64, f64> = datasets
        .iter()
        .map(|ds| (ds.id, scorer.dataset_score(ds, &experiments)))
        .collect();
    Ok(scorer.score(datafiles, &dataset_scores))
}
