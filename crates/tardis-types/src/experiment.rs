use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub id: u64,
    pub title: String,
    /// Usernames of the experiment's owners; the first is the primary owner.
    #[serde(default)]
    pub owners: Vec<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Experiment {
    pub fn new(id: u64, title: &str, owners: &[&str]) -> Self {
        let now = Utc::now();
        Self {
            id,
            title: title.to_string(),
            owners: owners.iter().map(|s| s.to_string()).collect(),
            created: now,
            updated: now,
        }
    }

    pub fn primary_owner(&self) -> Option<&str> {
        self.owners.first().map(String::as_str)
    }
}

/// A group of datafiles, belonging to zero or more experiments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: u64,
    pub description: String,
    #[serde(default)]
    pub experiments: Vec<u64>,
    pub updated: DateTime<Utc>,
}

impl Dataset {
    pub fn new(id: u64, description: &str, experiments: &[u64]) -> Self {
        Self {
            id,
            description: description.to_string(),
            experiments: experiments.to_vec(),
            updated: Utc::now(),
        }
    }
}
