//! Domain-skills configuration documents
//!
//! Two remotely hosted plain-text resources feed the enhanced configuration:
//! the skills document (wrapped into the enhanced system prompt) and a
//! package manifest (installed into sandboxes that have no pre-built
//! template). Each is cached independently and falls back to an embedded copy.

pub mod cache;
pub mod fallback;

use std::time::Duration;

pub use cache::CachedResource;
pub use fallback::{FALLBACK_PACKAGES, FALLBACK_SKILLS_DOCUMENT};

/// Where the documents live and how long to keep them
#[derive(Debug, Clone)]
pub struct SkillsConfig {
    /// Skills document URL; the embedded copy is used when unset
    pub instructions_url: Option<String>,
    /// Package manifest URL; the embedded list is used when unset
    pub manifest_url: Option<String>,
    /// How long a fetched document stays fresh
    pub ttl: Duration,
}

impl Default for SkillsConfig {
    fn default() -> Self {
        Self {
            instructions_url: None,
            manifest_url: None,
            ttl: Duration::from_secs(300),
        }
    }
}

/// Read-mostly source of the skills document and package list
pub struct SkillsSource {
    instructions: CachedResource<String>,
    packages: CachedResource<Vec<String>>,
}

impl SkillsSource {
    pub fn new(config: SkillsConfig) -> Self {
        Self {
            instructions: CachedResource::new(
                "instructions",
                config.instructions_url,
                config.ttl,
                FALLBACK_SKILLS_DOCUMENT.to_string(),
                parse_document,
            ),
            packages: CachedResource::new(
                "manifest",
                config.manifest_url,
                config.ttl,
                FALLBACK_PACKAGES.iter().map(|p| p.to_string()).collect(),
                parse_manifest,
            ),
        }
    }

    /// A source that never touches the network
    pub fn fixed(document: impl Into<String>, packages: Vec<String>) -> Self {
        Self {
            instructions: CachedResource::new(
                "instructions",
                None,
                Duration::ZERO,
                document.into(),
                parse_document,
            ),
            packages: CachedResource::new("manifest", None, Duration::ZERO, packages, parse_manifest),
        }
    }

    pub async fn instructions(&self) -> String {
        self.instructions.get().await
    }

    pub async fn packages(&self) -> Vec<String> {
        self.packages.get().await
    }
}

fn parse_document(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// One package spec per line; `#` starts a comment
fn parse_manifest(text: &str) -> Option<Vec<String>> {
    let packages: Vec<String> = text
        .lines()
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    (!packages.is_empty()).then_some(packages)
}
