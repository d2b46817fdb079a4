//! Source registry construction and health reporting.

use anyhow::Result;
use serde::Serialize;

use crate::config::Config;
use crate::connector_drive::DriveSource;
use crate::connector_fs::FilesystemSource;
use crate::connector_github::GithubSource;
use crate::connector_url::UrlSource;
use crate::traits::SourceRegistry;

/// Health of one configured source, as shown by `askdocs sources`.
#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    pub name: String,
    pub healthy: bool,
    pub notes: String,
}

/// Instantiate every source in `[sources.*]`.
pub fn build_registry(config: &Config) -> Result<SourceRegistry> {
    let mut registry = SourceRegistry::new();
    for (name, cfg) in &config.sources.filesystem {
        registry.register(Box::new(FilesystemSource::new(name, cfg)?));
    }
    for (name, cfg) in &config.sources.github {
        registry.register(Box::new(GithubSource::new(name, cfg)?));
    }
    for (name, cfg) in &config.sources.drive {
        registry.register(Box::new(DriveSource::new(name, cfg)?));
    }
    for (name, cfg) in &config.sources.url {
        registry.register(Box::new(UrlSource::new(name, cfg)?));
    }
    Ok(registry)
}

fn env_present(var: &str) -> bool {
    std::env::var(var).map(|v| !v.is_empty()).unwrap_or(false)
}

/// Cheap local checks only; nothing here touches the network.
pub fn get_sources(config: &Config) -> Vec<SourceStatus> {
    let mut out = Vec::new();

    for (name, fs) in &config.sources.filesystem {
        let healthy = fs.root.is_dir();
        out.push(SourceStatus {
            name: format!("filesystem:{}", name),
            healthy,
            notes: if healthy {
                fs.root.display().to_string()
            } else {
                format!("root does not exist: {}", fs.root.display())
            },
        });
    }

    for (name, gh) in &config.sources.github {
        let notes = if env_present(&gh.token_env) {
            format!("{} (authenticated)", gh.repo)
        } else {
            format!("{} (anonymous, {} not set)", gh.repo, gh.token_env)
        };
        out.push(SourceStatus {
            name: format!("github:{}", name),
            healthy: true,
            notes,
        });
    }

    for (name, drive) in &config.sources.drive {
        let healthy = env_present(&drive.token_env);
        out.push(SourceStatus {
            name: format!("drive:{}", name),
            healthy,
            notes: if healthy {
                format!("folder {}", drive.folder_id)
            } else {
                format!("{} not set", drive.token_env)
            },
        });
    }

    for (name, url) in &config.sources.url {
        let invalid: Vec<&str> = url
            .urls
            .iter()
            .filter(|u| reqwest::Url::parse(u).is_err())
            .map(|u| u.as_str())
            .collect();
        out.push(SourceStatus {
            name: format!("url:{}", name),
            healthy: invalid.is_empty() && !url.urls.is_empty(),
            notes: if url.urls.is_empty() {
                "no URLs configured".to_string()
            } else if invalid.is_empty() {
                format!("{} URL(s)", url.urls.len())
            } else {
                format!("invalid URL(s): {}", invalid.join(", "))
            },
        });
    }

    out
}

pub fn list_sources(config: &Config) {
    let sources = get_sources(config);
    if sources.is_empty() {
        println!("No sources configured. Add a [sources.<type>.<name>] table to the config.");
        return;
    }

    println!("{:<28} {:<8} NOTES", "SOURCE", "HEALTHY");
    for s in &sources {
        println!("{:<28} {:<8} {}", s.name, s.healthy, s.notes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    #[test]
    fn test_registry_labels_follow_config() {
        let config = parse_config(
            r#"
[sources.filesystem.notes]
root = "./notes"

[sources.github.courses]
repo = "acme/courses"

[sources.url.papers]
urls = ["https://example.com/a.pdf", "not a url"]
"#,
        )
        .unwrap();

        let registry = build_registry(&config).unwrap();
        assert_eq!(
            registry.labels(),
            vec!["filesystem:notes", "github:courses", "url:papers"]
        );

        let statuses = get_sources(&config);
        let papers = statuses.iter().find(|s| s.name == "url:papers").unwrap();
        assert!(!papers.healthy);
        assert!(papers.notes.contains("not a url"));
    }
}
