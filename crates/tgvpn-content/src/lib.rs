//! tgvpn content - deployment guides and documentation
//!
//! Scripts and configuration snippets for each deployment target, plus
//! the documentation pages, served by key from a `ContentStore`.
//!
//! The blobs ship embedded in the binary; a directory can be layered on
//! top to override or extend them without rebuilding.

mod guide;
mod store;

pub use guide::{
    doc_section, doc_sections, provider, providers, Artifact, DeploymentProvider, Difficulty,
    DocSection,
};
pub use store::{
    ContentError, ContentStore, DirContentStore, EmbeddedContentStore, LayeredContentStore,
};
