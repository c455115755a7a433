use serde::Deserialize;

pub const BASE_URL: &str = "https://circleci.com/api/v2";
pub const SOURCE: &str = "CircleCI";

/// `[circleci]` section.
///
/// ```toml
/// [circleci]
/// token = "..."
///
/// [[circleci.jobs]]
/// project_slug = "gh/acme/api"
/// pipeline_id = "7f0c..."
/// workflow_id = "b1e2..."
/// workflow_name = "build-and-test"
/// job_number = 1042
/// job_started_at = "2026-03-01T10:00:00Z"
/// job_stopped_at = "2026-03-01T10:07:12Z"
/// vcs_revision = "9c1d2e3"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct CircleCiConfig {
    pub token: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Overrides the runner-wide interval
    #[serde(default)]
    pub interval_secs: Option<u64>,
    /// Overrides `[retry].transient_status_codes` for this source
    #[serde(default)]
    pub transient_status_codes: Option<Vec<u16>>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub jobs: Vec<JobContext>,
}

fn default_base_url() -> String {
    BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

/// Pipeline context of one finished job; copied onto each of its tests.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct JobContext {
    pub project_slug: String,
    pub pipeline_id: String,
    #[serde(default)]
    pub workflow_id: Option<String>,
    pub workflow_name: String,
    pub job_number: u64,
    #[serde(default)]
    pub job_started_at: Option<String>,
    #[serde(default)]
    pub job_stopped_at: Option<String>,
    #[serde(default)]
    pub vcs_revision: Option<String>,
}
