use std::fs::{self, File};
use std::path::PathBuf;
use std::{env, io};

use clap::{CommandFactory, Parser};
use clap_complete::{generate, Shell};
use mdir_crawler::{
    crawl_site, parse_details, CrawlerConfig, FetcherKind, HttpFetcher, OnError, RunMetrics,
};
use tokio::runtime;

/// Member directory crawler
#[derive(Debug, Parser)]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: SubCommand,
}

#[derive(Debug, clap::Subcommand)]
pub enum SubCommand {
    #[command(name = "crawl")]
    Crawl(CrawlArgs),
    #[command(name = "member")]
    Member(MemberArgs),
    #[command(hide = true)]
    Completion,
}

/// Crawl the configured directory listings into JSON files
#[derive(Debug, clap::Args)]
pub struct CrawlArgs {
    /// Path to the yaml (or json) crawler configuration
    #[arg(env = "MDIR_CONFIG", long, short)]
    pub config: PathBuf,
    /// Override the directory receiving `<type>_members.json` files
    #[arg(long, short)]
    pub data_dir: Option<PathBuf>,
    /// Override the number of workers spawned for every page
    #[arg(long)]
    pub num_workers: Option<usize>,
    /// Override crawler's user agent
    #[arg(long)]
    pub user_agent: Option<String>,
    /// Override how a member that can't be scraped is handled
    #[arg(value_enum, long)]
    pub on_member_error: Option<OnError>,
    /// Override the fetcher used to load pages
    #[arg(value_enum, long)]
    pub fetcher: Option<FetcherKind>,
    /// Override the deadline (in seconds) for all workers of a page to report
    #[arg(long)]
    pub page_timeout: Option<u64>,
    /// No SIGINT handling, an interrupted run leaves arrays unterminated
    #[arg(long)]
    pub no_sigint: bool,
    /// Only crawl targets of these types
    #[arg(long = "target", short)]
    pub targets: Vec<String>,
    /// When quiet no logs are outputted
    #[arg(long, short)]
    pub quiet: bool,
}

impl TryFrom<&CrawlArgs> for CrawlerConfig {
    type Error = anyhow::Error;

    fn try_from(args: &CrawlArgs) -> Result<Self, Self::Error> {
        let mut conf: CrawlerConfig = serde_yaml::from_reader(File::open(&args.config)?)?;
        if let Some(data_dir) = &args.data_dir {
            conf.data_dir = data_dir.clone();
        }
        if let Some(num_workers) = args.num_workers {
            conf.number_of_workers = Some(num_workers);
        }
        if let Some(user_agent) = &args.user_agent {
            conf.user_agent = user_agent.to_string();
        }
        if let Some(on_member_error) = args.on_member_error {
            conf.on_member_error = on_member_error;
        }
        if let Some(fetcher) = args.fetcher {
            conf.fetcher = fetcher;
        }
        if let Some(page_timeout) = args.page_timeout {
            conf.page_timeout_secs = Some(page_timeout);
        }
        if args.no_sigint {
            conf.handle_sigint = false;
        }
        if !args.targets.is_empty() {
            conf.targets
                .retain(|target| args.targets.contains(&target.member_type));
        }
        Ok(conf)
    }
}

pub fn crawl(args: CrawlArgs) -> anyhow::Result<()> {
    let conf: CrawlerConfig = (&args).try_into()?;
    let rt = runtime::Builder::new_multi_thread().enable_all().build()?;

    let metrics = match conf.fetcher {
        FetcherKind::Http => rt.block_on(crawl_site(&conf, HttpFetcher::new(&conf)))?,
        FetcherKind::Browser => crawl_with_browser(&rt, &conf)?,
    };

    println!("{}", metrics.format_report());
    Ok(())
}

#[cfg(feature = "browser")]
fn crawl_with_browser(rt: &runtime::Runtime, conf: &CrawlerConfig) -> anyhow::Result<RunMetrics> {
    let fetcher = mdir_crawler::BrowserFetcher::new(conf);
    rt.block_on(crawl_site(conf, fetcher))
}

#[cfg(not(feature = "browser"))]
fn crawl_with_browser(_rt: &runtime::Runtime, _conf: &CrawlerConfig) -> anyhow::Result<RunMetrics> {
    anyhow::bail!("Browser fetcher unavailable, rebuild with `--features browser`")
}

/// Parse a single member detail page and print it as json
#[derive(Debug, clap::Args)]
#[command(group = clap::ArgGroup::new("page").required(true))]
pub struct MemberArgs {
    /// A local html page to parse
    #[arg(group = "page", long)]
    pub file: Option<PathBuf>,
    /// A distant html page to parse
    #[arg(group = "page", long)]
    pub url: Option<String>,
    /// Custom user agent to download the page
    #[arg(long, conflicts_with = "file")]
    pub ua: Option<String>,
}

pub fn member(args: MemberArgs) -> anyhow::Result<()> {
    let page = if let Some(url) = args.url {
        let mut builder = reqwest::blocking::ClientBuilder::new();
        if let Some(ua) = args.ua {
            builder = builder.user_agent(ua);
        }
        let client = builder.build()?;
        log::info!("Opening URL {url}");
        client.get(&url).send()?.error_for_status()?.text()?
    } else if let Some(path) = args.file {
        fs::read_to_string(&path)?
    } else {
        anyhow::bail!("Missing `url` or `file`");
    };

    let details = parse_details(&page);
    println!("{}", serde_json::to_string_pretty(&details)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.cmd {
        SubCommand::Crawl(args) => {
            if !args.quiet {
                if env::var_os("RUST_LOG").is_none() {
                    env::set_var("RUST_LOG", "mdir_crawler=info,mdir=info");
                }
                env_logger::init();
            }
            crawl(args)
        }
        SubCommand::Member(args) => {
            if env::var_os("RUST_LOG").is_none() {
                env::set_var("RUST_LOG", "mdir_crawler=warn,mdir=warn");
            }
            env_logger::init();
            member(args)
        }
        SubCommand::Completion => {
            generate(Shell::Bash, &mut Args::command(), "mdir", &mut io::stdout());
            Ok(())
        }
    }
}
