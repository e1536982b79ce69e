use super::types::PathMapper;

pub(super) fn default_timeout_secs() -> u64 {
    300
}

pub(super) fn default_user_priority_weighting() -> Vec<f64> {
    vec![5.0, 2.0, 1.0, 0.5, 0.2]
}

pub(super) fn default_user_priority() -> usize {
    2
}

pub(super) fn default_file_size_weighting() -> f64 {
    1.0
}

pub(super) fn default_unverified_weighting() -> f64 {
    0.1
}

pub(super) fn default_path_mapper() -> PathMapper {
    PathMapper::Dataset
}
