//! cvewatch CLI
//!
//! Scan documents for topics of interest and track them as indicators.

use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

use cvewatch_core::{
    Indicator, IndicatorFactory, Mention, RegexTopic, Topic, CVE_PATTERN, CVE_TOPIC,
};
use cvewatch_store::{
    create_repository, SearchConfig, SearchRepository, SharedRepository, StorageBackend,
};

#[derive(Parser)]
#[command(name = "cvewatch")]
#[command(author, version, about = "cvewatch: track security indicators and the CVEs they mention", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    backend: BackendArgs,

    /// Verbosity level (0-3)
    #[arg(short, long, default_value = "1")]
    verbose: u8,
}

#[derive(Args)]
struct BackendArgs {
    /// Search index base URL; the in-memory store is used when unset
    #[arg(long, env = "CVEWATCH_SEARCH_URL", global = true)]
    search_url: Option<String>,

    /// Search index name
    #[arg(long, env = "CVEWATCH_INDEX", default_value = "indicators", global = true)]
    index: String,

    /// Request timeout in seconds
    #[arg(long, default_value = "30", global = true)]
    timeout: u64,
}

impl BackendArgs {
    fn search_config(&self, base_url: &str) -> SearchConfig {
        SearchConfig::default()
            .with_base_url(base_url)
            .with_index(&self.index)
            .with_timeout(self.timeout)
    }

    fn storage_backend(&self) -> StorageBackend {
        match &self.search_url {
            Some(url) => StorageBackend::Search(self.search_config(url)),
            None => StorageBackend::Memory,
        }
    }

    /// The in-memory store starts empty on every run, so commands reading
    /// what earlier runs stored need the search backend.
    fn require_search_url(&self, command: &str) -> Result<&str> {
        match &self.search_url {
            Some(url) => Ok(url),
            None => bail!(
                "`{}` needs a search backend (set CVEWATCH_SEARCH_URL or --search-url)",
                command
            ),
        }
    }

    fn persistent_backend(&self, command: &str) -> Result<StorageBackend> {
        let url = self.require_search_url(command)?;
        Ok(StorageBackend::Search(self.search_config(url)))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a document for topics and store it as an indicator
    Scan {
        /// File holding the document body (default: stdin)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Document title
        #[arg(short, long, default_value = "")]
        title: String,

        /// Canonical link of the document
        #[arg(short, long)]
        link: String,

        /// Originating system
        #[arg(long, default_value = "manual")]
        source: String,

        /// Originating system's identifier for the document
        #[arg(long, default_value = "")]
        source_id: String,

        /// Relevance score assigned by the source
        #[arg(long, default_value = "0")]
        score: i64,

        /// Tag to attach (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Reference link to attach (repeatable)
        #[arg(long = "reference")]
        references: Vec<String>,

        /// Topic as NAME=REGEX (repeatable, default: the CVE topic)
        #[arg(long = "topic", value_parser = parse_topic)]
        topics: Vec<(String, String)>,

        /// Print the stored record as JSON
        #[arg(long)]
        json: bool,
    },

    /// Look up a stored indicator
    Get {
        /// Indicator id
        #[arg(long, conflicts_with = "link", required_unless_present = "link")]
        id: Option<String>,

        /// Indicator link
        #[arg(long)]
        link: Option<String>,
    },

    /// List indicators mentioning a topic match
    Mentions {
        /// Topic name
        #[arg(long, default_value = CVE_TOPIC)]
        topic: String,

        /// Matched text, e.g. CVE-2021-44228
        #[arg(long)]
        mention: String,
    },

    /// Check the search backend is reachable and correctly mapped
    Status,

    /// Create the search index with the field mapping lookups rely on
    Init,
}

fn parse_topic(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, pattern)) if !name.is_empty() && !pattern.is_empty() => {
            Ok((name.to_string(), pattern.to_string()))
        }
        _ => Err(format!("expected NAME=REGEX, got {:?}", s)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = match cli.verbose {
        0 => Level::ERROR,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(io::stderr)
        .compact()
        .init();

    match cli.command {
        Commands::Scan {
            file,
            title,
            link,
            source,
            source_id,
            score,
            tags,
            references,
            topics,
            json,
        } => {
            let repo = create_repository(&cli.backend.storage_backend()).await?;
            let text = read_body(file)?;
            let topics = build_topics(&topics)?;

            let factory = IndicatorFactory::new(&source);
            let mut indicator = factory.new_indicator();
            indicator.title = title;
            indicator.body = text;
            indicator.link = link;
            indicator.source_id = source_id;
            indicator.score = score;
            for tag in &tags {
                indicator.add_tag(tag);
            }
            for reference in &references {
                indicator.add_reference(reference);
            }
            for topic in &topics {
                let added = indicator.scan(topic);
                debug!("Topic {} added {} mentions", topic.name(), added);
            }

            repo.add(indicator.clone()).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&indicator.to_record())?);
            } else {
                print_indicator(&indicator);
            }
        }
        Commands::Get { id, link } => {
            let repo = create_repository(&cli.backend.persistent_backend("get")?).await?;
            let found = match (id, link) {
                (Some(id), _) => Some(repo.get_by_id(&id).await?),
                (None, Some(link)) => repo.get_by_link(&link).await?,
                (None, None) => unreachable!("clap requires --id or --link"),
            };

            match found {
                Some(indicator) => print_indicator(&indicator),
                None => println!("No indicator found"),
            }
        }
        Commands::Mentions { topic, mention } => {
            let repo = create_repository(&cli.backend.persistent_backend("mentions")?).await?;
            list_mentions(&repo, &Mention::new(topic, mention)).await?;
        }
        Commands::Status => {
            check_status(&cli.backend).await?;
        }
        Commands::Init => {
            let url = cli.backend.require_search_url("init")?;
            SearchRepository::new(cli.backend.search_config(url))?
                .create_index()
                .await?;
            println!("✅ Created index {}", cli.backend.index);
        }
    }

    Ok(())
}

fn read_body(file: Option<PathBuf>) -> Result<String> {
    match file {
        Some(path) => fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read stdin")?;
            Ok(text)
        }
    }
}

fn build_topics(specs: &[(String, String)]) -> Result<Vec<RegexTopic>> {
    if specs.is_empty() {
        return Ok(vec![RegexTopic::new(CVE_TOPIC, CVE_PATTERN)?]);
    }
    specs
        .iter()
        .map(|(name, pattern)| RegexTopic::new(name, pattern).map_err(Into::into))
        .collect()
}

fn print_indicator(indicator: &Indicator) {
    println!("{}", indicator);
    println!("   Link: {}", indicator.link);
    println!("   Source: {} ({})", indicator.source, indicator.source_id);
    for mention in indicator.mentions() {
        println!("   - {}: {}", mention.topic_name, mention.mention);
    }
    if !indicator.tags().is_empty() {
        println!("   Tags: {}", indicator.tags().join(", "));
    }
}

async fn list_mentions(repo: &SharedRepository, mention: &Mention) -> Result<()> {
    let collection = repo.get_by_mention(mention).await?;

    if collection.is_empty() {
        println!("No indicators mention {}:{}", mention.topic_name, mention.mention);
        return Ok(());
    }

    for indicator in &collection {
        println!("{}", indicator);
    }
    println!(
        "\n{} indicators | cumulative score {} | average score {:.2}",
        collection.len(),
        collection.cumulative_score(),
        collection.average_score().unwrap_or_default()
    );
    Ok(())
}

async fn check_status(backend: &BackendArgs) -> Result<()> {
    let Some(url) = &backend.search_url else {
        println!("No search backend configured (set CVEWATCH_SEARCH_URL or --search-url)");
        return Ok(());
    };

    let repo = SearchRepository::new(backend.search_config(url))?;
    match repo.check_index().await {
        Ok(()) => println!("✅ Index {} is reachable at {}", backend.index, url),
        Err(e) => println!("❌ {}", e),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_topic() {
        assert_eq!(
            parse_topic(r"cve=(?i)cve-\d+-\d+").unwrap(),
            ("cve".to_string(), r"(?i)cve-\d+-\d+".to_string())
        );
        // only the first '=' splits
        assert_eq!(parse_topic("eq=a=b").unwrap().1, "a=b");
        assert!(parse_topic("cve").is_err());
        assert!(parse_topic("=x").is_err());
    }

    #[test]
    fn test_default_topic() {
        let topics = build_topics(&[]).unwrap();
        assert_eq!(topics.len(), 1);
        assert_eq!(topics[0].name(), CVE_TOPIC);
    }

    #[test]
    fn test_invalid_topic_fails() {
        assert!(build_topics(&[("bad".to_string(), "(".to_string())]).is_err());
    }

    fn backend_args(search_url: Option<&str>) -> BackendArgs {
        BackendArgs {
            search_url: search_url.map(str::to_string),
            index: "indicators".to_string(),
            timeout: 5,
        }
    }

    #[test]
    fn test_lookups_require_search_backend() {
        let err = backend_args(None).persistent_backend("get").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("`get`"));
        assert!(message.contains("--search-url"));

        // scan still works against the in-memory store
        assert!(matches!(
            backend_args(None).storage_backend(),
            StorageBackend::Memory
        ));
    }

    #[test]
    fn test_lookups_use_configured_search_backend() {
        let backend = backend_args(Some("http://search.local:9200"))
            .persistent_backend("mentions")
            .unwrap();
        match backend {
            StorageBackend::Search(config) => {
                assert_eq!(config.base_url, "http://search.local:9200");
                assert_eq!(config.index, "indicators");
                assert_eq!(config.timeout_secs, 5);
            }
            other => panic!("expected search backend, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();

        let cli = Cli::try_parse_from([
            "cvewatch",
            "scan",
            "--link",
            "https://example.com/a",
            "--topic",
            r"cve=(?i)cve-\d+-\d+",
            "--tag",
            "log4j",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Scan { ref tags, .. } if tags == &["log4j"]));
    }
}
