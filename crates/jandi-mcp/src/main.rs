//! MCP server exposing Jandi rooms, messages and comments as tools.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser};
use log::LevelFilter;
use rmcp::{
    ErrorData as McpError, ServerHandler, ServiceExt,
    handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    schemars::JsonSchema,
    serde::{Deserialize, Serialize},
    tool, tool_handler, tool_router,
    transport::io::stdio,
};

use rmcp::schemars;

use jandi_core::jandi::format;
use jandi_core::jandi::{Payload, find_dm_by_name};
use jandi_core::{AppConfig, AppPaths, CoreError, JandiClient, LogLevel, ToolsConfig};

fn main() -> anyhow::Result<()> {
    try_main()
}

#[tokio::main]
async fn try_main() -> Result<()> {
    let cli = Cli::parse();
    let paths = AppPaths::discover(cli.common.config.as_deref())?;
    let config = AppConfig::load(&paths, false)?;

    init_logging(&config, cli.common.verbose)?;
    log::debug!("loaded config from {}", paths.config_file.display());

    let client = Arc::new(JandiClient::from_config(&config)?);
    if cli.lazy {
        log::info!("deferring sign-in until the first tool call");
    } else {
        client
            .ensure_ready()
            .await
            .context("failed to authenticate with Jandi")?;
    }

    let server = McpServer::new(client, config.tools);
    let transport = stdio();

    log::info!("serving Jandi tools over stdio");
    let service = server
        .serve(transport)
        .await
        .map_err(|e| anyhow::anyhow!("MCP server error: {e}"))?;

    service.waiting().await?;

    Ok(())
}

#[derive(Debug, Parser)]
#[command(author, version, about = "MCP server for the Jandi team chat")]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,

    /// Skip signing in at startup; authenticate on the first tool call
    #[arg(long)]
    lazy: bool,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Override the config file path
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (stackable)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Log to stderr, or to the configured file; stdout carries the protocol.
fn init_logging(config: &AppConfig, verbose: u8) -> Result<()> {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(effective_log_level(config.logging.level, verbose));
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }

    if let Some(file) = &config.logging.file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file)
            .with_context(|| format!("failed to open log file {file}"))?;
        builder
            .target(env_logger::Target::Pipe(Box::new(file)))
            .write_style(env_logger::WriteStyle::Never);
    } else {
        builder.target(env_logger::Target::Stderr);
    }

    builder.try_init().or_else(|err| {
        if verbose > 0 {
            eprintln!("logger already initialized: {err}");
        }
        Ok(())
    })
}

const fn effective_log_level(level: LogLevel, verbose: u8) -> LevelFilter {
    let base = match level {
        LogLevel::Error => 0,
        LogLevel::Warn => 1,
        LogLevel::Info => 2,
        LogLevel::Debug => 3,
        LogLevel::Trace => 4,
    };
    match base + verbose as usize {
        0 => LevelFilter::Error,
        1 => LevelFilter::Warn,
        2 => LevelFilter::Info,
        3 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Parameters for `jandi_get_messages`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct GetMessagesParams {
    /// Room ID (topic, DM, or group DM)
    room_id: String,
    /// Number of messages to fetch
    #[serde(default)]
    count: Option<u32>,
    /// Pagination cursor; messages continue from this link id
    #[serde(default)]
    link_id: Option<String>,
}

/// Parameters for `jandi_get_comments`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct GetCommentsParams {
    /// Post (message) ID whose comments to fetch
    post_id: String,
    /// Number of comments to fetch
    #[serde(default)]
    count: Option<u32>,
}

/// Parameters for `jandi_find_dm_by_name`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
struct FindDmParams {
    /// Member name to search for (case-insensitive, partial match)
    name: String,
}

#[derive(Clone)]
struct McpServer {
    client: Arc<JandiClient>,
    tools: ToolsConfig,
    tool_router: ToolRouter<Self>,
}

impl McpServer {
    fn new(client: Arc<JandiClient>, tools: ToolsConfig) -> Self {
        Self {
            client,
            tools,
            tool_router: Self::tool_router(),
        }
    }

    async fn rooms_text(&self) -> Result<String, CoreError> {
        Ok(match self.client.get_rooms().await? {
            Payload::Recognized(rooms) if !rooms.is_empty() => format::format_rooms(&rooms),
            Payload::Recognized(_) => "No rooms found.".to_string(),
            Payload::Unrecognized(raw) => format::raw_response(&raw),
        })
    }

    async fn messages_content(
        &self,
        params: &GetMessagesParams,
    ) -> Result<Vec<Content>, CoreError> {
        let count = params.count.unwrap_or(self.tools.message_count);
        let records = match self
            .client
            .get_messages(&params.room_id, count, params.link_id.as_deref())
            .await?
        {
            Payload::Recognized(records) => records,
            Payload::Unrecognized(raw) => {
                return Ok(vec![Content::text(format::raw_response(&raw))]);
            }
        };

        let mut contents = vec![Content::text(format::format_messages(&records))];
        if self.tools.fetch_images {
            for url in format::image_urls(&records) {
                if let Some(image) = self.client.download_image(&url).await {
                    contents.push(Content::image(image.data, image.mime_type));
                }
            }
        }
        Ok(contents)
    }

    async fn comments_text(&self, params: &GetCommentsParams) -> Result<String, CoreError> {
        let count = params.count.unwrap_or(self.tools.comment_count);
        Ok(match self.client.get_comments(&params.post_id, count).await? {
            Payload::Recognized(comments) => format::format_comments(&comments),
            Payload::Unrecognized(raw) => format::raw_response(&raw),
        })
    }

    async fn find_dm_text(&self, params: &FindDmParams) -> Result<String, CoreError> {
        let (members, rooms) =
            tokio::try_join!(self.client.get_members(), self.client.get_rooms())?;

        let members = match members {
            Payload::Recognized(members) => members,
            Payload::Unrecognized(raw) => {
                log::warn!("team payload has no member list");
                return Ok(format::raw_response(&raw));
            }
        };
        let rooms = rooms.recognized();

        let matches = find_dm_by_name(&members, rooms, &params.name);
        Ok(format::format_dm_matches(&params.name, &matches))
    }
}

/// Turn a tool outcome into a result the client sees, never a protocol error.
fn tool_result(tool: &str, outcome: Result<Vec<Content>, CoreError>) -> CallToolResult {
    match outcome {
        Ok(contents) => CallToolResult::success(contents),
        Err(e) => {
            log::error!("{tool} failed: {e}");
            CallToolResult::error(vec![Content::text(format!("Error: {e}"))])
        }
    }
}

#[tool_router]
impl McpServer {
    /// List all rooms
    #[tool(
        description = "List all rooms (topics/channels, 1:1 DMs, group DMs) the account belongs to in the Jandi team"
    )]
    async fn jandi_get_rooms(&self) -> Result<CallToolResult, McpError> {
        let outcome = self.rooms_text().await.map(|text| vec![Content::text(text)]);
        Ok(tool_result("jandi_get_rooms", outcome))
    }

    /// Read messages of a room
    #[tool(
        description = "Get recent messages from a Jandi room (topic, DM, or group DM). Image attachments are returned inline"
    )]
    async fn jandi_get_messages(
        &self,
        Parameters(params): Parameters<GetMessagesParams>,
    ) -> Result<CallToolResult, McpError> {
        let outcome = self.messages_content(&params).await;
        Ok(tool_result("jandi_get_messages", outcome))
    }

    /// Read comments of a post
    #[tool(description = "Get the comments of a Jandi post (message)")]
    async fn jandi_get_comments(
        &self,
        Parameters(params): Parameters<GetCommentsParams>,
    ) -> Result<CallToolResult, McpError> {
        let outcome = self
            .comments_text(&params)
            .await
            .map(|text| vec![Content::text(text)]);
        Ok(tool_result("jandi_get_comments", outcome))
    }

    /// Find a member's DM room
    #[tool(
        description = "Find team members by name and the 1:1 DM room shared with each of them"
    )]
    async fn jandi_find_dm_by_name(
        &self,
        Parameters(params): Parameters<FindDmParams>,
    ) -> Result<CallToolResult, McpError> {
        let outcome = self
            .find_dm_text(&params)
            .await
            .map(|text| vec![Content::text(text)]);
        Ok(tool_result("jandi_find_dm_by_name", outcome))
    }
}

#[tool_handler]
impl ServerHandler for McpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Read-only access to the Jandi team chat: list rooms, read messages and comments, and find DM rooms by member name"
                    .to_string(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
