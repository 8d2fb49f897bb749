//! webserverctl - inspect and edit Nginx / Apache site configurations
//!
//! This is the command-line front end of the `webserver` crate.

use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use ariadne::{Color, Label, Report, ReportKind, Source};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use webserver::{open_vhost_with_config, Capability, EngineConfig, ServerType, VhostKind};
use webserver_core::config::{ConfigLoader, FormatStyle, IndentStyle};
use webserver_core::{
    BasicAuth, IncludeFile, Listen, Proxy, RateLimit, RealIp, Redirect, SslConfig, Upstream, Vhost,
    VhostPhp, VhostProxy, VhostRedirect,
};

/// Manage webserver virtual-host configurations
#[derive(Parser)]
#[command(name = "webserverctl")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Backend to use (nginx or apache); guessed from the file name otherwise
    #[arg(long, global = true)]
    server: Option<ServerType>,

    /// Engine configuration file (TOML or JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a configuration file and print its syntax tree as JSON
    Parse {
        file: PathBuf,

        /// Splice Include targets in (Apache)
        #[arg(long)]
        includes: bool,
    },

    /// Reformat a configuration file
    Fmt {
        file: PathBuf,

        /// Sort directives into canonical order
        #[arg(long)]
        sort: bool,

        /// Indent with tabs
        #[arg(long)]
        tabs: bool,

        /// Indent width
        #[arg(long)]
        indent: Option<usize>,

        /// Blank-line policy (Apache)
        #[arg(long, value_enum)]
        style: Option<StyleArg>,

        /// Rewrite the file instead of printing
        #[arg(short, long)]
        write: bool,
    },

    /// Print the directives at a dotted key such as `server.listen` (Nginx)
    Query { file: PathBuf, key: String },

    /// Summarize a site directory as JSON
    Show {
        config_dir: PathBuf,

        #[arg(long, default_value = "static")]
        kind: VhostKind,
    },

    /// Point a site back at its own document root
    Enable { config_dir: PathBuf },

    /// Point a site at the stop page
    Disable { config_dir: PathBuf },

    /// Check that a configuration file parses
    Validate {
        file: PathBuf,

        /// Splice Include targets in (Apache)
        #[arg(long)]
        includes: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StyleArg {
    Compact,
    Standard,
    Verbose,
}

impl From<StyleArg> for FormatStyle {
    fn from(style: StyleArg) -> Self {
        match style {
            StyleArg::Compact => FormatStyle::Compact,
            StyleArg::Standard => FormatStyle::Standard,
            StyleArg::Verbose => FormatStyle::Verbose,
        }
    }
}

#[derive(Serialize)]
struct SiteSummary {
    server: ServerType,
    kind: VhostKind,
    capabilities: Vec<Capability>,
    enable: bool,
    listen: Vec<Listen>,
    server_name: Vec<String>,
    index: Vec<String>,
    root: String,
    includes: Vec<IncludeFile>,
    access_log: String,
    error_log: String,
    ssl: Option<SslConfig>,
    rate_limit: Option<RateLimit>,
    basic_auth: Option<BasicAuth>,
    real_ip: Option<RealIp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    php: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    redirects: Option<Vec<Redirect>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    proxies: Option<Vec<Proxy>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    upstreams: Option<Vec<Upstream>>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if cli.verbose { "debug" } else { "info" }));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let engine = ConfigLoader::load_or_default(cli.config.as_deref()).context("loading engine configuration")?;

    match cli.command {
        Commands::Parse { file, includes } => {
            let json = match detect_server(cli.server, &file, &engine) {
                ServerType::Nginx => serde_json::to_string_pretty(&parse_nginx(&file)?)?,
                ServerType::Apache => serde_json::to_string_pretty(&parse_apache(&file, includes, &engine)?)?,
            };
            println!("{json}");
        }

        Commands::Fmt {
            file,
            sort,
            tabs,
            indent,
            style,
            write,
        } => {
            let output = match detect_server(cli.server, &file, &engine) {
                ServerType::Nginx => {
                    let mut block = parse_nginx(&file)?;
                    if sort {
                        webserver_nginx::order::sort_directives(&mut block.directives);
                    }
                    webserver_nginx::config::dump(&block)
                }
                ServerType::Apache => {
                    let config = parse_apache(&file, false, &engine)?;
                    let mut options = engine.export.clone();
                    options.sort_directives |= sort;
                    if tabs {
                        options.indent_style = IndentStyle::Tabs;
                    }
                    if let Some(size) = indent {
                        options.indent_size = size;
                    }
                    if let Some(style) = style {
                        options.format_style = style.into();
                    }
                    config.export_with_options(&options)
                }
            };

            if write {
                fs::write(&file, output).with_context(|| format!("writing {}", file.display()))?;
                tracing::info!("📝 Formatted {}", file.display());
            } else {
                print!("{output}");
            }
        }

        Commands::Query { file, key } => {
            if detect_server(cli.server, &file, &engine) != ServerType::Nginx {
                bail!("query addresses directives by dotted key and is only available for nginx files");
            }
            let content = read_source(&file)?;
            let parser = match webserver_nginx::Parser::parse(&content) {
                Ok(parser) => parser,
                Err(webserver_core::Error::Syntax { line, column, message }) => {
                    report_syntax_error(&file, &content, line, column, &message);
                    bail!("{} is not valid nginx configuration", file.display());
                }
                Err(e) => return Err(e.into()),
            };
            let found = parser.find(&key)?;
            println!("{}", serde_json::to_string_pretty(&found)?);
        }

        Commands::Show { config_dir, kind } => {
            let engine = engine_for(cli.server, engine);
            let vhost = open_vhost_with_config(kind, &config_dir, &engine)?;

            let summary = SiteSummary {
                server: engine.server,
                kind,
                capabilities: vhost.capabilities(),
                enable: vhost.enable(),
                listen: vhost.listen(),
                server_name: vhost.server_name(),
                index: vhost.index(),
                root: vhost.root(),
                includes: vhost.includes(),
                access_log: vhost.access_log(),
                error_log: vhost.error_log(),
                ssl: vhost.ssl_config(),
                rate_limit: vhost.rate_limit(),
                basic_auth: vhost.basic_auth(),
                real_ip: vhost.real_ip(),
                php: vhost.as_php().map(|php| php.php()),
                redirects: vhost.as_redirect().map(|r| r.redirects()).transpose()?,
                proxies: vhost.as_proxy().map(|p| p.proxies()).transpose()?,
                upstreams: vhost.as_proxy().map(|p| p.upstreams()).transpose()?,
            };
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        Commands::Enable { config_dir } => toggle_site(cli.server, engine, &config_dir, true)?,

        Commands::Disable { config_dir } => toggle_site(cli.server, engine, &config_dir, false)?,

        Commands::Validate { file, includes } => {
            tracing::info!("Validating config: {}", file.display());
            match detect_server(cli.server, &file, &engine) {
                ServerType::Nginx => {
                    parse_nginx(&file)?;
                }
                ServerType::Apache => {
                    parse_apache(&file, includes, &engine)?;
                }
            }
            println!("✅ Configuration '{}' is valid!", file.display());
        }
    }

    Ok(())
}

/// Explicit flag first, then the file name, then the engine default
fn detect_server(flag: Option<ServerType>, file: &Path, engine: &EngineConfig) -> ServerType {
    if let Some(server) = flag {
        return server;
    }
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if name.contains("httpd") || name.contains("apache") {
        ServerType::Apache
    } else if name.contains("nginx") {
        ServerType::Nginx
    } else {
        engine.server
    }
}

fn engine_for(flag: Option<ServerType>, mut engine: EngineConfig) -> EngineConfig {
    if let Some(server) = flag {
        engine.server = server;
    }
    engine
}

fn toggle_site(flag: Option<ServerType>, engine: EngineConfig, config_dir: &Path, enable: bool) -> anyhow::Result<()> {
    let engine = engine_for(flag, engine);
    let mut vhost = open_vhost_with_config(VhostKind::Static, config_dir, &engine)?;
    vhost.set_enable(enable)?;
    vhost.save()?;
    let state = if enable { "enabled" } else { "disabled" };
    println!("✅ Site {} {state} (root: {})", config_dir.display(), vhost.root());
    Ok(())
}

fn read_source(file: &Path) -> anyhow::Result<String> {
    fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))
}

fn parse_nginx(file: &Path) -> anyhow::Result<webserver_nginx::Block> {
    let content = read_source(file)?;
    match webserver_nginx::parse_str(&content) {
        Ok(block) => Ok(block),
        Err(e) => {
            let (line, column) = e.position();
            report_syntax_error(file, &content, line, column, &e.to_string());
            bail!("{} is not valid nginx configuration", file.display())
        }
    }
}

fn parse_apache(file: &Path, includes: bool, engine: &EngineConfig) -> anyhow::Result<webserver_apache::Config> {
    let content = read_source(file)?;
    let options = webserver_apache::ParseOptions {
        process_includes: includes,
        base_dir: file.parent().map(Path::to_path_buf).unwrap_or_default(),
        max_include_depth: engine.max_include_depth,
    };
    match webserver_apache::parse_file_with_options(file, &options) {
        Ok(config) => Ok(config),
        Err(e) => {
            match e.position() {
                Some((line, column)) => report_syntax_error(file, &content, line, column, &e.to_string()),
                None => tracing::error!("❌ {e}"),
            }
            bail!("{} is not valid apache configuration", file.display())
        }
    }
}

/// Byte range of the 1-based `line`/`column` position, clamped to the source
fn offset_range(content: &str, line: usize, column: usize) -> Range<usize> {
    let line_start: usize = content
        .split_inclusive('\n')
        .take(line.saturating_sub(1))
        .map(str::len)
        .sum();
    let start = (line_start + column.saturating_sub(1)).min(content.len());
    let end = content[start..]
        .char_indices()
        .nth(1)
        .map(|(i, _)| start + i)
        .unwrap_or(content.len());
    start..end
}

fn report_syntax_error(file: &Path, content: &str, line: usize, column: usize, message: &str) {
    let name = file.display().to_string();
    let range = offset_range(content, line, column);
    let printed = Report::build(ReportKind::Error, (name.as_str(), range.clone()))
        .with_message("configuration syntax error")
        .with_label(
            Label::new((name.as_str(), range))
                .with_message(message)
                .with_color(Color::Red),
        )
        .finish()
        .eprint((name.as_str(), Source::from(content)));
    if printed.is_err() {
        eprintln!("❌ {name}:{line}:{column}: {message}");
    }
}
