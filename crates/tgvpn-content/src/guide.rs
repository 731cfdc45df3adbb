//! Deployment guide and documentation index
//!
//! Maps providers and documentation sections to the content keys that
//! hold their scripts and snippets.

use serde::Serialize;

/// Setup difficulty shown next to each provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Difficulty {
    Easy,
    Medium,
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "Easy"),
            Difficulty::Medium => write!(f, "Medium"),
        }
    }
}

/// A script or snippet belonging to a guide
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub label: &'static str,
    pub key: &'static str,
}

/// A deployment target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeploymentProvider {
    pub id: &'static str,
    pub name: &'static str,
    pub difficulty: Difficulty,
    pub summary: &'static str,
    pub artifacts: &'static [Artifact],
}

/// A documentation page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DocSection {
    pub id: &'static str,
    pub title: &'static str,
    pub key: &'static str,
}

static PROVIDERS: &[DeploymentProvider] = &[
    DeploymentProvider {
        id: "aws",
        name: "AWS EC2",
        difficulty: Difficulty::Medium,
        summary: "Deploy the VPN server on an EC2 instance (open UDP 51820)",
        artifacts: &[Artifact {
            label: "Setup script",
            key: "deploy/aws/launch.sh",
        }],
    },
    DeploymentProvider {
        id: "digitalocean",
        name: "DigitalOcean",
        difficulty: Difficulty::Easy,
        summary: "One-command droplet setup with a systemd service",
        artifacts: &[Artifact {
            label: "Droplet setup",
            key: "deploy/digitalocean/setup.sh",
        }],
    },
    DeploymentProvider {
        id: "docker",
        name: "Docker",
        difficulty: Difficulty::Easy,
        summary: "Run the bot and WireGuard in a container",
        artifacts: &[
            Artifact {
                label: "docker-compose.yml",
                key: "deploy/docker/docker-compose.yml",
            },
            Artifact {
                label: "docker run",
                key: "deploy/docker/run.sh",
            },
        ],
    },
    DeploymentProvider {
        id: "telegram",
        name: "Telegram Bot",
        difficulty: Difficulty::Medium,
        summary: "Register the bot with @BotFather and configure the Web App",
        artifacts: &[
            Artifact {
                label: "Bot setup",
                key: "deploy/telegram/bot-setup.txt",
            },
            Artifact {
                label: "Web App manifest",
                key: "deploy/telegram/webapp.json",
            },
        ],
    },
];

static DOC_SECTIONS: &[DocSection] = &[
    DocSection {
        id: "overview",
        title: "Overview",
        key: "docs/overview.md",
    },
    DocSection {
        id: "api",
        title: "API",
        key: "docs/api.md",
    },
    DocSection {
        id: "configuration",
        title: "Configuration",
        key: "docs/configuration.env",
    },
    DocSection {
        id: "troubleshooting",
        title: "Troubleshooting",
        key: "docs/troubleshooting.sh",
    },
    DocSection {
        id: "security",
        title: "Security",
        key: "docs/security-firewall.sh",
    },
];

/// All deployment providers in display order
pub fn providers() -> &'static [DeploymentProvider] {
    PROVIDERS
}

/// Find a provider by id (case-insensitive)
pub fn provider(id: &str) -> Option<&'static DeploymentProvider> {
    PROVIDERS.iter().find(|p| p.id.eq_ignore_ascii_case(id))
}

/// All documentation sections in display order
pub fn doc_sections() -> &'static [DocSection] {
    DOC_SECTIONS
}

/// Find a documentation section by id (case-insensitive)
pub fn doc_section(id: &str) -> Option<&'static DocSection> {
    DOC_SECTIONS.iter().find(|s| s.id.eq_ignore_ascii_case(id))
}
