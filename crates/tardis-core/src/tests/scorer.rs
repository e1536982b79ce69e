use std::collections::HashMap;

use chrono::{Duration, Utc};
use tardis_types::Datafile;

use crate::config::ScoringConfig;
use crate::scorer::{ScoreScope, Scorer, score_scope};
use crate::testutil::{Fixture, REMOTE_BASE};

fn datafile(id: u64, size: u64, verified: bool) -> Datafile {
    let mut df = Datafile::new(id, 1, &format!("f{id}"), &format!("f{id}"));
    df.size = Some(size);
    df.verified = verified;
    df
}

fn scores(config: &ScoringConfig, files: Vec<Datafile>) -> Vec<(u64, f64)> {
    Scorer::new(config, Utc::now())
        .score(files, &HashMap::new())
        .into_iter()
        .map(|s| (s.datafile.id, s.score))
        .collect()
}

#[test]
fn larger_files_score_at_least_as_high() {
    let config = ScoringConfig::default();
    let sizes = [0u64, 1, 10, 1_000, 1_000_000, 10_000_000_000];
    let files = sizes.iter().enumerate().map(|(i, s)| datafile(i as u64, *s, true)).collect();
    let scored: HashMap<u64, f64> = scores(&config, files).into_iter().collect();
    for pair in (0..sizes.len() as u64).collect::<Vec<_>>().windows(2) {
        assert!(scored[&pair[0]] <= scored[&pair[1]]);
    }
}

#[test]
fn unverified_scores_strictly_lower() {
    let config = ScoringConfig::default();
    let scored: HashMap<u64, f64> =
        scores(&config, vec![datafile(1, 500, true), datafile(2, 500, false)]).into_iter().collect();
    assert!(scored[&2] < scored[&1]);
}

#[test]
fn remote_files_are_excluded() {
    let config = ScoringConfig::default();
    let mut remote = datafile(2, 500, true);
    remote.url = format!("{REMOTE_BASE}f2");
    let mut archived = datafile(3, 500, true);
    archived.protocol = "archive".into();
    let ids: Vec<u64> = scores(&config, vec![datafile(1, 5, true), remote, archived])
        .into_iter()
        .map(|(id, _)| id)
        .collect();
    assert_eq!(ids, vec![1]);
}

#[test]
fn ties_keep_input_order() {
    let config = ScoringConfig::default();
    let ids: Vec<u64> = scores(
        &config,
        vec![datafile(4, 100, true), datafile(9, 100, true), datafile(6, 100, true)],
    )
    .into_iter()
    .map(|(id, _)| id)
    .collect();
    assert_eq!(ids, vec![4, 9, 6]);
}

#[test]
fn older_files_gain_with_age_weighting() {
    let config = ScoringConfig {
        file_age_weighting: 1.0,
        ..ScoringConfig::default()
    };
    let mut old = datafile(1, 100, true);
    old.created = Utc::now() - Duration::days(30);
    let scored: HashMap<u64, f64> = scores(&config, vec![old, datafile(2, 100, true)]).into_iter().collect();
    assert!(scored[&1] > scored[&2]);
}

#[test]
fn owner_priority_scales_whole_experiment() {
    let fx = Fixture::new();
    fx.add_experiment(1, &["vip"]);
    fx.add_experiment(2, &["someone"]);
    fx.add_dataset(10, &[1]);
    fx.add_dataset(20, &[2]);
    fx.add_verified(100, 10, "a/small", b"x");
    fx.add_verified(200, 20, "b/bigger", &[0u8; 4096]);

    let mut config = ScoringConfig::default();
    config.user_priorities.insert("vip".into(), 0);
    let ranked: Vec<u64> = score_scope(fx.catalog(), &config, ScoreScope::All, Utc::now())
        .unwrap()
        .iter()
        .map(|s| s.datafile.id)
        .collect();
    assert_eq!(ranked, vec![100, 200]);

    let default_ranked: Vec<u64> =
        score_scope(fx.catalog(), &ScoringConfig::default(), ScoreScope::All, Utc::now())
            .unwrap()
            .iter()
            .map(|s| s.datafile.id)
            .collect();
    assert_eq!(default_ranked, vec![200, 100]);
}

#[test]
fn scopes_restrict_candidates() {
    let fx = Fixture::new();
    fx.add_experiment(1, &[]);
    fx.add_experiment(2, &[]);
    fx.add_dataset(10, &[1]);
    fx.add_dataset(11, &[1]);
    fx.add_dataset(20, &[2]);
    fx.add_datafile(1, 10, "a", b"a");
    fx.add_datafile(2, 11, "b", b"b");
    fx.add_datafile(3, 20, "c", b"c");
    let config = ScoringConfig::default();

    let ids = |scope| -> Vec<u64> {
        let mut ids: Vec<u64> = score_scope(fx.catalog(), &config, scope, Utc::now())
            .unwrap()
            .iter()
            .map(|s| s.datafile.id)
            .collect();
        ids.sort();
        ids
    };
    assert_eq!(ids(ScoreScope::Dataset(11)), vec![2]);
    assert_eq!(ids(ScoreScope::Experiment(1)), vec![1, 2]);
    assert_eq!(ids(ScoreScope::All), vec![1, 2, 3]);
    assert!(score_scope(fx.catalog(), &config, ScoreScope::Experiment(9), Utc::now()).is_err());
}
