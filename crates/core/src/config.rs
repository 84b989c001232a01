//! Runtime configuration file format.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Archiver configuration, read from a JSON file next to the catalog.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Root directory of the object store. When set, content fetching is
    /// enabled; when absent, only headers are retrieved.
    #[serde(default)]
    pub objects_path: Option<PathBuf>,

    /// File on each server from which builds are discovered.
    #[serde(default = "default_deploy_history")]
    pub deploy_history: String,

    /// Allowed requests per second. A negative value means unlimited.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: f64,

    /// Base URLs of the deployment servers.
    #[serde(default)]
    pub servers: Vec<String>,

    /// Candidate file names fetched per build.
    #[serde(default)]
    pub build_files: Vec<String>,

    /// Filter rules applied when selecting files.
    #[serde(default)]
    pub filters: Vec<String>,
}

fn default_deploy_history() -> String {
    "DeployHistory.txt".to_string()
}

fn default_rate_limit() -> f64 {
    -1.0
}

impl Default for Config {
    fn default() -> Self {
        Self {
            objects_path: None,
            deploy_history: default_deploy_history(),
            rate_limit: default_rate_limit(),
            servers: Vec::new(),
            build_files: Vec::new(),
            filters: Vec::new(),
        }
    }
}
