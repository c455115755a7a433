use serde::Deserialize;

pub const SOURCE: &str = "TestRails";
/// Largest page `get_cases` serves.
pub const MAX_PAGE_SIZE: u32 = 250;

/// `[testrails]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TestRailsConfig {
    /// e.g. `https://acme.testrail.io`
    pub instance_url: String,
    pub username: String,
    pub api_key: String,
    pub project_id: u64,
    /// Suites to read; every suite of the project when empty
    #[serde(default)]
    pub suite_ids: Vec<u64>,
    #[serde(default)]
    pub interval_secs: Option<u64>,
    #[serde(default)]
    pub transient_status_codes: Option<Vec<u16>>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl TestRailsConfig {
    pub fn base_url(&self) -> &str {
        self.instance_url.trim_end_matches('/')
    }
}
