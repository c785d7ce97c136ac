//! Source listing and health checks.
//!
//! Backs `corpus sources`: one row per configured source with its versions,
//! origin, trust tag, and whether it can currently be synced. A local
//! source is healthy when its directory exists; a git source is healthy
//! when a `git` binary is available.

use anyhow::Result;

use crate::config::Config;
use crate::models::TrustTag;

/// Health of one configured source.
#[derive(Debug, Clone)]
pub struct SourceStatus {
    pub id: String,
    pub versions: Vec<String>,
    pub origin: String,
    pub trust: TrustTag,
    pub healthy: bool,
    pub notes: Option<String>,
}

/// Check every configured source, in config order.
pub fn get_sources(config: &Config) -> Vec<SourceStatus> {
    let git_available = std::process::Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);

    config
        .sources
        .iter()
        .map(|source| {
            let (healthy, notes) = match &source.path {
                Some(path) if path.is_dir() => (true, None),
                Some(_) => (false, Some("directory does not exist".to_string())),
                None if git_available => (true, None),
                None => (false, Some("git binary not found".to_string())),
            };
            SourceStatus {
                id: source.id.clone(),
                versions: source.versions.clone(),
                origin: source.origin(),
                trust: source.trust,
                healthy,
                notes,
            }
        })
        .collect()
}

/// CLI entry point for `corpus sources`.
pub fn list_sources(config: &Config) -> Result<()> {
    let sources = get_sources(config);

    println!(
        "{:<20} {:<24} {:<10} {:<8} ORIGIN",
        "SOURCE", "VERSIONS", "TRUST", "HEALTHY"
    );
    for s in &sources {
        println!(
            "{:<20} {:<24} {:<10} {:<8} {}",
            s.id,
            s.versions.join(","),
            s.trust,
            s.healthy,
            s.origin
        );
        if let Some(notes) = &s.notes {
            println!("{:<20} {}", "", notes);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    #[test]
    fn test_local_source_health() {
        let tmp = tempfile::TempDir::new().unwrap();
        let toml = format!(
            r#"
[corpus]
output_root = "./out"

[[sources]]
id = "present"
category = "c"
tech = "t"
versions = ["1"]
path = "{}"

[[sources]]
id = "absent"
category = "c"
tech = "u"
versions = ["1", "2"]
path = "/no/such/docs"
source = "community"
"#,
            tmp.path().display()
        );
        let cfg = parse_config(&toml).unwrap();
        let statuses = get_sources(&cfg);

        assert_eq!(statuses.len(), 2);
        assert!(statuses[0].healthy);
        assert!(statuses[0].notes.is_none());
        assert!(!statuses[1].healthy);
        assert_eq!(statuses[1].versions, vec!["1", "2"]);
        assert_eq!(statuses[1].trust, TrustTag::Community);
    }
}
