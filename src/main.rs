use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use sitesmith::bundle;
use sitesmith_capture::BrowserCapture;
use sitesmith_core::{Config, ModelSet, Orchestrator, Params, SiteBundle};

#[derive(Parser)]
#[command(name = "sitesmith")]
#[command(about = "Clone or enhance website frontends with an LLM pipeline")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file (built-in defaults when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Set a parameter (can be used multiple times)
    #[arg(short = 'P', long = "param", value_name = "KEY=VALUE", global = true)]
    params: Vec<String>,

    /// Verbose output (-v for info and progress, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Quiet mode (only errors)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Clone a page into a static bundle
    Clone {
        /// URL, bare domain or site name
        url: String,

        /// Output directory (overrides config)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Write a .zip archive instead of a directory
        #[arg(long)]
        zip: bool,
    },

    /// Enhance your site with parts of other sites
    Enhance {
        /// Your site
        #[arg(long)]
        site: String,

        /// Inspiration site (can be used multiple times)
        #[arg(short, long = "inspiration", required = true)]
        inspiration: Vec<String>,

        /// What to change
        #[arg(long)]
        query: String,

        /// Output directory (overrides config)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Write a .zip archive instead of a directory
        #[arg(long)]
        zip: bool,
    },

    /// Validate config without running
    Check,

    /// Run as an MCP server on stdio
    Serve,
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let params = Params::from_args(&cli.params)?;
    let config = match cli.config {
        Some(ref path) => Config::load_with_params(path, &params)?,
        None => Config::default_with_params(&params)?,
    };
    Ok(config)
}

fn print_config(config: &Config) {
    println!("Config valid: {}", config.name);
    println!("  Endpoint: {}", config.model.base_url);
    println!(
        "  Models: agent={} filter={} finalize={}",
        config.model.agent_model, config.model.filter_model, config.model.finalize_model
    );
    println!(
        "  API key: {}",
        if config.model.api_key.is_some() {
            "set"
        } else {
            "missing"
        }
    );
    println!(
        "  Budget: {} tokens/request, {} margin, {} chars/relevance chunk",
        config.budget.max_tokens_per_request,
        config.budget.safety_margin,
        config.budget.relevance_chunk_chars
    );
    println!("  Max turns: {}", config.agent.max_turns);
    println!(
        "  Output: {}{}",
        config.output.dir,
        if config.output.zip { " (zip)" } else { "" }
    );
    if !config.params.is_empty() {
        println!("  Parameters: {}", config.params.len());
        for (name, def) in &config.params {
            let req = if def.required { " (required)" } else { "" };
            let desc = def.description.as_deref().unwrap_or("");
            println!("    - {}{}: {}", name, req, desc);
        }
    }
}

fn report(path: &std::path::Path, out: &SiteBundle) {
    println!();
    println!("✓ Bundle written to {}", path.display());
    println!("  index.html: {} bytes", out.bundle.html.len());
    println!("  styles.css: {} bytes", out.bundle.css.len());
    println!("  script.js:  {} bytes", out.bundle.js.len());
    println!("  Assets: {}", out.assets.len());
}

async fn run(command: Command, orchestrator: Orchestrator, output_dir: PathBuf) -> anyhow::Result<()> {
    let zip_default = orchestrator.config().output.zip;
    match command {
        Command::Clone { url, out, zip } => {
            let url = orchestrator.resolve_url(&url).await?;
            println!("Cloning: {}", url);
            let site = orchestrator.clone_site(&url).await?;
            let dir = out.unwrap_or(output_dir);
            let path =
                bundle::deliver(&dir, &bundle::project_name(&url), &site, zip || zip_default)?;
            report(&path, &site);
        }
        Command::Enhance {
            site,
            inspiration,
            query,
            out,
            zip,
        } => {
            println!("Enhancing: {}", site);
            let enhanced = orchestrator
                .enhance_site(&inspiration, &site, &query)
                .await?;
            let dir = out.unwrap_or(output_dir);
            let path = bundle::deliver(
                &dir,
                &bundle::project_name(&site),
                &enhanced,
                zip || zip_default,
            )?;
            report(&path, &enhanced);
        }
        Command::Serve => sitesmith::mcp::run_server(Arc::new(orchestrator), output_dir).await?,
        Command::Check => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let level = if cli.quiet {
        Level::ERROR
    } else {
        match cli.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            _ => Level::DEBUG,
        }
    };

    // stdout carries the MCP protocol in serve mode
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    let config = load_config(&cli)?;

    if matches!(cli.command, Command::Check) {
        print_config(&config);
        return Ok(());
    }

    let models = ModelSet::from_config(&config.model)?;
    let capture = Arc::new(
        BrowserCapture::new(config.capture.clone()).map_err(sitesmith_core::Error::from)?,
    );
    let output_dir = PathBuf::from(&config.output.dir);
    let orchestrator = Orchestrator::new(models, capture.clone(), config);

    let result = run(cli.command, orchestrator, output_dir).await;
    capture.close().await;
    result
}
