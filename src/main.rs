use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{self, InitError, RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use comment_scout::config::{load_file_config, ExportFormat, ExportMode, Overrides};
use comment_scout::features::auth::Authenticator;
use comment_scout::features::pacing::Pacer;
use comment_scout::scraping::{BrowserSession, ChromiumPage};
use comment_scout::tools::profile::{extract_username, profile_url_for, ProfileCrawler};
use comment_scout::tools::{CommentBuffer, Exporter};
use comment_scout::{CommentExtractor, CrawlError, CrawlResult, CrawlerConfig, PostOutcome};

#[derive(Parser)]
#[command(
    name = "comment-scout",
    version,
    about = "Collect public comments from social-media posts into CSV/JSON"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl comments from posts or from the recent posts of profiles
    Crawl(CrawlArgs),
    /// Open a visible browser, wait for a manual login and save the session cookies
    SaveSession,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct InputArgs {
    /// Single post URL
    #[arg(long)]
    url: Option<String>,
    /// Profile URL to discover posts from
    #[arg(long)]
    profile: Option<String>,
    /// Profile username to discover posts from
    #[arg(long)]
    username: Option<String>,
    /// File with one post URL per line
    #[arg(long)]
    urls_file: Option<PathBuf>,
    /// File with one profile URL or username per line
    #[arg(long)]
    profiles_file: Option<PathBuf>,
}

#[derive(Args)]
struct CrawlArgs {
    #[command(flatten)]
    input: InputArgs,
    /// Maximum posts collected per profile
    #[arg(long)]
    max_posts: Option<usize>,
    /// Stop loading comments once this many are visible on a post
    #[arg(long)]
    max_comments: Option<usize>,
    /// Run the browser headless (true/false)
    #[arg(long)]
    headless: Option<bool>,
    /// single | per-post
    #[arg(long)]
    export_mode: Option<ExportMode>,
    /// csv | json | both | xlsx
    #[arg(long = "format")]
    format: Option<ExportFormat>,
    /// Export directory (default: <data_dir>/exports)
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

const LOG_FILE_PREFIX: &str = "crawler";
const LOG_RETENTION_DAYS: usize = 7;

/// What the crawl starts from.
enum Target {
    Posts(Vec<String>),
    Profiles(Vec<String>),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match resolve_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {}", e);
            return ExitCode::FAILURE;
        }
    };
    let _log_guard = init_tracing(&config.logs_dir());

    match run(cli, config).await {
        Ok(code) => code,
        Err(e) => {
            error!("❌ {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Console output plus a daily-rotated file under `logs_dir`, keeping a week
/// of files. The returned guard flushes the file writer on drop.
fn init_tracing(logs_dir: &Path) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        EnvFilter::new(level.to_lowercase())
    });

    let (file_layer, guard, file_error) = match log_file_appender(logs_dir) {
        Ok(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard), None)
        }
        Err(e) => (None, None, Some(e)),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
    if let Some(e) = file_error {
        warn!("File logging disabled ({}): {}", logs_dir.display(), e);
    }
    guard
}

fn log_file_appender(logs_dir: &Path) -> Result<RollingFileAppender, InitError> {
    rolling::Builder::new()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .max_log_files(LOG_RETENTION_DAYS)
        .build(logs_dir)
}

fn resolve_config(cli: &Cli) -> CrawlResult<CrawlerConfig> {
    let overrides = match &cli.command {
        Commands::Crawl(args) => crawl_overrides(args),
        Commands::SaveSession => Overrides {
            headless: Some(false),
            ..Default::default()
        },
    };
    let file = load_file_config()?;
    let config = CrawlerConfig::resolve(&file, &overrides)?;
    config.ensure_directories()?;
    Ok(config)
}

async fn run(cli: Cli, config: CrawlerConfig) -> CrawlResult<ExitCode> {
    let target = match &cli.command {
        Commands::Crawl(args) => Some(read_target(&args.input)?),
        Commands::SaveSession => None,
    };

    let session = BrowserSession::launch(&config).await?;
    let result = match session.new_page().await {
        Ok(page) => {
            let mut driver = ChromiumPage::new(page);
            match target {
                Some(target) => crawl(&config, &mut driver, target).await,
                None => Authenticator::new(&config, Pacer::from_config(&config))
                    .save_session(&mut driver)
                    .await
                    .map(|()| {
                        info!("✓ Session saved");
                        ExitCode::SUCCESS
                    }),
            }
        }
        Err(e) => Err(e),
    };
    session.close().await;
    result
}

fn crawl_overrides(args: &CrawlArgs) -> Overrides {
    Overrides {
        headless: args.headless,
        max_posts_per_profile: args.max_posts,
        max_comments_per_post: args.max_comments,
        export_mode: args.export_mode,
        export_format: args.format,
        export_dir: args.output_dir.clone(),
    }
}

fn read_target(input: &InputArgs) -> CrawlResult<Target> {
    if let Some(url) = &input.url {
        return Ok(Target::Posts(vec![url.clone()]));
    }
    if let Some(path) = &input.urls_file {
        return Ok(Target::Posts(read_list_file(path)?));
    }
    if let Some(profile) = input.profile.as_ref().or(input.username.as_ref()) {
        return Ok(Target::Profiles(vec![profile.clone()]));
    }
    if let Some(path) = &input.profiles_file {
        return Ok(Target::Profiles(read_list_file(path)?));
    }
    Err(CrawlError::Config("no crawl input given".into()))
}

/// One entry per line; blank lines and `#` comments are skipped.
fn read_list_file(path: &Path) -> CrawlResult<Vec<String>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        CrawlError::Config(format!("cannot read {}: {}", path.display(), e))
    })?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect())
}

async fn crawl(
    config: &CrawlerConfig,
    driver: &mut ChromiumPage,
    target: Target,
) -> CrawlResult<ExitCode> {
    let pacer = Pacer::from_config(config);
    Authenticator::new(config, pacer.clone()).login(driver).await?;

    let (post_urls, username) = match target {
        Target::Posts(urls) => (urls, None),
        Target::Profiles(profiles) => {
            let crawler = ProfileCrawler::new(config, pacer.clone());
            let mut seen = HashSet::new();
            let mut urls = Vec::new();
            for entry in &profiles {
                let profile_url = profile_url_for(entry, &config.base_url);
                match crawler
                    .collect_post_urls(driver, &profile_url, config.max_posts_per_profile)
                    .await
                {
                    Ok(found) => urls.extend(found.into_iter().filter(|u| seen.insert(u.clone()))),
                    Err(e) if e.is_post_scoped() => {
                        warn!("Skipping profile {}: {}", profile_url, e)
                    }
                    Err(e) => return Err(e),
                }
            }
            let username = match profiles.as_slice() {
                [single] => extract_username(&profile_url_for(single, &config.base_url)),
                _ => None,
            };
            (urls, username)
        }
    };

    if post_urls.is_empty() {
        error!("No posts found to crawl");
        return Ok(ExitCode::FAILURE);
    }
    info!("Crawling {} posts", post_urls.len());

    let extractor = CommentExtractor::new(config, pacer);
    let mut buffer = CommentBuffer::new();
    let crawl_result = tokio::select! {
        result = extractor.crawl_posts(driver, &post_urls, &mut buffer) => Some(result),
        _ = tokio::signal::ctrl_c() => {
            warn!("⚠️  Interrupted, exporting what was collected so far");
            None
        }
    };

    let files = Exporter::from_config(config).export(&buffer, username.as_deref())?;
    for path in &files {
        info!("Saved {}", path.display());
    }

    let stats = buffer.stats();
    info!(
        "📊 {} comments from {} posts by {} authors",
        stats.total_comments, stats.unique_posts, stats.unique_authors
    );

    match crawl_result {
        Some(Ok(outcomes)) => {
            let failed = outcomes
                .iter()
                .filter(|(_, o)| matches!(o, PostOutcome::Failed(_)))
                .count();
            let empty = outcomes
                .iter()
                .filter(|(_, o)| matches!(o, PostOutcome::Empty))
                .count();
            info!(
                "✓ Finished: {} posts, {} without comments, {} failed",
                outcomes.len(),
                empty,
                failed
            );
            Ok(ExitCode::SUCCESS)
        }
        Some(Err(e)) => Err(e),
        None => Ok(ExitCode::SUCCESS),
    }
}
