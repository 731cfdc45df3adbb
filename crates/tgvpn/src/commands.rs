//! Command handlers

use crate::host::HostMetrics;
use crate::render;
use anyhow::{anyhow, bail, Context as _, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tgvpn_content::{
    ContentStore, DirContentStore, EmbeddedContentStore, LayeredContentStore,
};
use tgvpn_core::{
    ConfigFormat, DashboardConfig, ServerCatalog, ServerDescriptor, SessionController,
    SessionState, SessionStats,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Everything a command needs
pub struct Context {
    config: DashboardConfig,
    catalog: Arc<ServerCatalog>,
    content: LayeredContentStore,
    json: bool,
}

impl Context {
    pub fn new(config_path: Option<&Path>, content_dir: Option<PathBuf>, json: bool) -> Result<Self> {
        let config = match config_path {
            Some(path) => DashboardConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => {
                debug!("No config given, using stock servers");
                DashboardConfig::default_config()
            }
        };

        let catalog = Arc::new(config.build_catalog().context("Failed to build server catalog")?);

        let mut content = LayeredContentStore::new();
        if let Some(dir) = content_dir {
            info!("Content overrides from {}", dir.display());
            content = content.with_layer(DirContentStore::new(dir));
        }
        let content = content.with_layer(EmbeddedContentStore::new());

        Ok(Self {
            config,
            catalog,
            content,
            json,
        })
    }

    fn controller(&self) -> Arc<SessionController> {
        let engine = Arc::new(self.config.engine.build());
        Arc::new(
            SessionController::new(self.catalog.clone(), engine)
                .with_timeout(self.config.connect_timeout()),
        )
    }

    fn print_json<T: Serialize>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}

#[derive(Serialize)]
struct ServerRow {
    #[serde(flatten)]
    server: ServerDescriptor,
    score: f64,
    recommended: bool,
}

fn server_rows(catalog: &ServerCatalog, ranked: bool) -> Vec<ServerRow> {
    let recommended = catalog.recommend().ok().map(|s| s.id);
    let servers = if ranked { catalog.ranked() } else { catalog.list() };

    servers
        .into_iter()
        .map(|server| ServerRow {
            score: catalog.score(&server),
            recommended: recommended.as_deref() == Some(server.id.as_str()),
            server,
        })
        .collect()
}

pub fn servers(ctx: &Context, ranked: bool) -> Result<()> {
    if ctx.json {
        return ctx.print_json(&server_rows(&ctx.catalog, ranked));
    }
    print!("{}", render::server_table(&ctx.catalog, ranked, None));
    Ok(())
}

pub fn recommend(ctx: &Context) -> Result<()> {
    let server = ctx.catalog.recommend()?;
    if ctx.json {
        return ctx.print_json(&ServerRow {
            score: ctx.catalog.score(&server),
            recommended: true,
            server,
        });
    }

    println!(
        "{} ({}) - {}ms, {}% load, score {:.1}",
        server.id,
        server.display_name,
        server.latency_ms,
        server.load_percent,
        ctx.catalog.score(&server)
    );
    Ok(())
}

/// Print every state change until the controller goes away
fn watch(ctx: &Context, controller: &SessionController) -> JoinHandle<()> {
    let mut events = controller.subscribe();
    let catalog = ctx.catalog.clone();
    let json = ctx.json;

    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(state) => print_state(&state, &catalog, json),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!("Status watcher skipped {} updates", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn print_state(state: &SessionState, catalog: &ServerCatalog, json: bool) {
    if json {
        match serde_json::to_string(state) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::error!("Failed to encode state: {}", e),
        }
    } else {
        println!("{}", render::session_line(state, catalog));
    }
}

async fn open_session(controller: &SessionController, id: Option<&str>) -> Result<SessionState> {
    let state = match id {
        Some(id) => controller.connect(id).await?,
        None => controller.connect_recommended().await?,
    };
    Ok(state)
}

/// Connect and hold the tunnel until Ctrl-C
pub async fn connect(ctx: &Context, id: Option<String>) -> Result<()> {
    let controller = ctx.controller();
    let watcher = watch(ctx, &controller);

    let result = async {
        open_session(&controller, id.as_deref()).await?;

        info!("Press Ctrl-C to disconnect");
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")?;

        controller.disconnect().await?;
        Ok::<_, anyhow::Error>(())
    }
    .await;

    let stats = controller.stats().await;
    drop(controller);
    watcher.await?;
    result?;
    report_usage(ctx, &stats)
}

/// Connect, hold for a while, then disconnect
pub async fn cycle(ctx: &Context, id: Option<String>, hold: Duration) -> Result<()> {
    let controller = ctx.controller();
    let watcher = watch(ctx, &controller);

    let result = async {
        open_session(&controller, id.as_deref()).await?;
        tokio::time::sleep(hold).await;
        controller.disconnect().await?;
        Ok::<_, anyhow::Error>(())
    }
    .await;

    let stats = controller.stats().await;
    drop(controller);
    watcher.await?;
    result?;
    report_usage(ctx, &stats)
}

fn report_usage(ctx: &Context, stats: &SessionStats) -> Result<()> {
    if ctx.json {
        return ctx.print_json(stats);
    }
    print!("{}", render::usage(stats));
    Ok(())
}

#[derive(Serialize)]
struct StatusReport<'a> {
    session: &'a SessionState,
    servers: Vec<ServerRow>,
    host: Option<HostMetrics>,
    network_load: Option<f64>,
}

pub async fn status(ctx: &Context) -> Result<()> {
    // Sessions end with the `connect`/`cycle` process; a new one starts disconnected
    let state = SessionState::new();
    let host = HostMetrics::sample().await;

    if ctx.json {
        return ctx.print_json(&StatusReport {
            session: &state,
            servers: server_rows(&ctx.catalog, true),
            host,
            network_load: ctx.catalog.mean_load(),
        });
    }

    print!("{}", render::dashboard(&state, &ctx.catalog, host.as_ref()));
    Ok(())
}

pub fn guide(ctx: &Context, provider: Option<String>) -> Result<()> {
    let Some(id) = provider else {
        if ctx.json {
            return ctx.print_json(&tgvpn_content::providers());
        }
        print!("{}", render::provider_list(tgvpn_content::providers()));
        return Ok(());
    };

    let provider = tgvpn_content::provider(&id)
        .ok_or_else(|| anyhow!("Unknown provider '{}' (try: aws, digitalocean, docker, telegram)", id))?;

    println!("{} [{}]\n{}\n", provider.name, provider.difficulty, provider.summary);
    for artifact in provider.artifacts {
        let blob = ctx.content.fetch(artifact.key)?;
        println!("── {} ({})", artifact.label, artifact.key);
        println!("{}\n", blob.trim_end());
    }
    Ok(())
}

pub fn docs(ctx: &Context, section: Option<String>) -> Result<()> {
    let Some(id) = section else {
        if ctx.json {
            return ctx.print_json(&tgvpn_content::doc_sections());
        }
        print!("{}", render::doc_list(tgvpn_content::doc_sections()));
        return Ok(());
    };

    let section = tgvpn_content::doc_section(&id)
        .ok_or_else(|| anyhow!("Unknown documentation section '{}'", id))?;
    println!("{}\n", section.title);
    println!("{}", ctx.content.fetch(section.key)?.trim_end());
    Ok(())
}

pub fn content(ctx: &Context, key: Option<String>) -> Result<()> {
    match key {
        Some(key) => print!("{}", ctx.content.fetch(&key)?),
        None if ctx.json => ctx.print_json(&ctx.content.keys())?,
        None => ctx.content.keys().iter().for_each(|k| println!("{}", k)),
    }
    Ok(())
}

/// Write the stock configuration to `path`
pub fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    let config = DashboardConfig::default_config();
    let body = match ConfigFormat::from_path(path)? {
        ConfigFormat::Toml => config.to_toml()?,
        ConfigFormat::Json => config.to_json()?,
    };

    std::fs::write(path, body).with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Wrote default config to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_server_rows_flag_recommended() {
        let catalog = DashboardConfig::default_config().build_catalog().unwrap();
        let rows = server_rows(&catalog, false);

        assert_eq!(rows.len(), 4);
        let flagged: Vec<_> = rows.iter().filter(|r| r.recommended).collect();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].server.id, "eu-west-1");
    }

    #[test]
    fn test_server_row_json_is_flat() {
        let catalog = DashboardConfig::default_config().build_catalog().unwrap();
        let rows = server_rows(&catalog, true);
        let value = serde_json::to_value(&rows[0]).unwrap();

        assert_eq!(value["id"], "eu-west-1");
        assert_eq!(value["recommended"], true);
    }

    #[test]
    fn test_init_config_round_trip() {
        let dir = TempDir::new().unwrap();

        for name in ["tgvpn.toml", "tgvpn.json"] {
            let path = dir.path().join(name);

            init_config(&path, false).unwrap();
            assert!(init_config(&path, false).is_err());
            init_config(&path, true).unwrap();

            let loaded = DashboardConfig::load(&path).unwrap();
            assert_eq!(loaded, DashboardConfig::default_config());
        }
    }

    #[test]
    fn test_init_config_rejects_unknown_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tgvpn.yaml");

        assert!(init_config(&path, false).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_context_with_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("servers.toml");
        std::fs::write(
            &path,
            r#"
[[servers]]
id = "lab-1"
name = "Lab"
latency_ms = 3
load_percent = 10
"#,
        )
        .unwrap();

        let ctx = Context::new(Some(&path), None, true).unwrap();
        assert_eq!(ctx.catalog.len(), 1);
        assert_eq!(ctx.catalog.recommend().unwrap().id, "lab-1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_with_simulated_engine() {
        let ctx = Context::new(None, None, true).unwrap();
        cycle(&ctx, Some("us-east-1".into()), Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_unknown_server() {
        let ctx = Context::new(None, None, false).unwrap();
        let err = cycle(&ctx, Some("ghost-1".into()), Duration::from_secs(1))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("ghost-1"));
    }
}
