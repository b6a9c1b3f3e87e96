use anyhow::{Context, bail};
use docsite_mcp::{Config, DocsiteServer, SiteSearch};
use rmcp::{ServiceExt, transport::stdio};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout is the MCP transport; logs go to stderr
    docsite_mcp::tracing::init();

    let config = Config::figment()
        .extract::<Config>()
        .context("Failed to read docsite configuration")?;
    if config.base_url.is_empty() {
        bail!(
            "No documentation site configured. Set base_url in {} or {}BASE_URL.",
            docsite_mcp::config::CONFIG_FILE,
            docsite_mcp::config::ENV_PREFIX
        );
    }

    let site = SiteSearch::from_config(config)?;
    tracing::info!("Starting docsite-mcp for {}", site.config().base_url);

    let server = DocsiteServer::new(Arc::new(site));
    let service = server.serve(stdio()).await.inspect_err(|e| {
        tracing::error!("Error serving MCP server: {:?}", e);
    })?;

    service.waiting().await?;

    Ok(())
}
