use tardis_types::{Result, TardisError};

use crate::catalog::Catalog;

/// Resolve an id list or `--all` into experiment ids. Exactly one of the two
/// must be given.
pub fn select_experiments(catalog: &dyn Catalog, ids: &[u64], all: bool) -> Result<Vec<u64>> {
    match (ids.is_empty(), all) {
        (true, false) => Err(TardisError::Config(
            "give experiment ids or --all".into(),
        )),
        (false, true) => Err(TardisError::Config(
            "experiment ids and --all are mutually exclusive".into(),
        )),
        (true, true) => Ok(catalog.experiments()?.into_iter().map(|e| e.id).collect()),
        (false, false) => Ok(ids.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::JsonCatalog;
    use tardis_types::Experiment;

    #[test]
    fn all_lists_catalog_in_id_order() {
        let catalog = JsonCatalog::in_memory();
        catalog.save_experiment(&Experiment::new(7, "b", &[])).unwrap();
        catalog.save_experiment(&Experiment::new(3, "a", &[])).unwrap();
        assert_eq!(select_experiments(&catalog, &[], true).unwrap(), vec![3, 7]);
        assert_eq!(select_experiments(&catalog, &[9], false).unwrap(), vec![9]);
    }

    #[test]
    fn requires_exactly_one_selector() {
        let catalog = JsonCatalog::in_memory();
        assert!(select_experiments(&catalog, &[], false).is_err());
        assert!(select_experiments(&catalog, &[1], true).is_err());
    }
}
