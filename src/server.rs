//! MCP server exposing documentation site search.

use crate::site::SiteSearch;
use crate::tools::search::{SearchRequest, handle_search};
use crate::tools::stats::handle_cache_stats;
use crate::tools::versions::handle_list_versions;
use rmcp::{
    ServerHandler,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::*,
    tool, tool_handler, tool_router,
};
use std::sync::Arc;

/// MCP server for one documentation site.
#[derive(Clone)]
pub struct DocsiteServer {
    /// Shared search state (resolver, index cache, in-flight builds)
    site: Arc<SiteSearch>,

    /// Tool router for handling MCP tool calls
    tool_router: ToolRouter<Self>,
}

impl std::fmt::Debug for DocsiteServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocsiteServer")
            .field("site", &self.site)
            .finish()
    }
}

#[tool_router]
impl DocsiteServer {
    pub fn new(site: Arc<SiteSearch>) -> Self {
        Self {
            site,
            tool_router: Self::tool_router(),
        }
    }

    pub const fn site(&self) -> &Arc<SiteSearch> {
        &self.site
    }

    #[tool(
        description = "Search the documentation site. Results are grouped by page, with matching sections listed under their page. Optionally pick a version or alias such as 'latest'."
    )]
    async fn search_docs(
        &self,
        Parameters(request): Parameters<SearchRequest>,
    ) -> std::result::Result<String, String> {
        handle_search(&self.site, request).await
    }

    #[tool(description = "List the documentation versions the site publishes, with their aliases.")]
    async fn list_versions(&self) -> std::result::Result<String, String> {
        Ok(handle_list_versions(&self.site).await)
    }

    #[tool(description = "Show search index cache usage: cached versions, memory, hit rate, and evictions.")]
    async fn cache_stats(&self) -> std::result::Result<String, String> {
        Ok(handle_cache_stats(&self.site).await)
    }
}

#[tool_handler]
impl ServerHandler for DocsiteServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::new(
            ServerCapabilities::builder()
                .enable_tools()
                .build(),
        )
        .with_protocol_version(ProtocolVersion::V_2024_11_05)
        .with_server_info(Implementation::from_build_env())
        .with_instructions(format!(
            "docsite-mcp: full-text search over the documentation at {}. \
             Use list_versions to see published versions, then search_docs with an optional version.",
            self.site.config().base_url
        ))
    }
}
