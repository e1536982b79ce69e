use chrono::Utc;
use tardis_types::Result;

use crate::scorer::{ScoreScope, ScoredDatafile, score_scope};
use crate::session::Session;

/// Score local datafiles in `scope`, highest first, optionally truncated.
pub fn run(session: &Session, scope: ScoreScope, limit: Option<usize>) -> Result<Vec<ScoredDatafile>> {
    let mut scored = score_scope(&session.catalog, &session.config.scoring, scope, Utc::now())?;
    if let Some(limit) = limit {
        scored.truncate(limit);
    }
    Ok(scored)
}
