use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use wikiembed_core::client::{MediaWikiClient, MediaWikiClientConfig};
use wikiembed_core::config::{DEFAULT_CONFIG_FILE, EmbedConfig, load_config};
use wikiembed_core::excerpt::{KnownFacts, extract};
use wikiembed_core::output::{Card, RenderedOutput};
use wikiembed_core::resolve::{CancellationFlag, ResolutionState, TitleResolver};
use wikiembed_core::services::Services;
use wikiembed_core::wiki::WikiReference;

#[derive(Debug, Parser)]
#[command(
    name = "wikiembed",
    version,
    about = "Resolve wiki page references into rich preview cards"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Log debug output to stderr")]
    verbose: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Resolve a title, link or alias against a wiki")]
    Resolve(ResolveArgs),
    #[command(about = "Extract an excerpt from a saved page HTML file")]
    Extract(ExtractArgs),
}

#[derive(Debug, Args)]
struct ResolveArgs {
    #[arg(value_name = "TEXT")]
    text: String,
    #[arg(long, value_name = "BASE_URL", help = "Wiki to resolve against")]
    wiki: String,
    #[arg(long, help = "Use the elevated interwiki hop limit")]
    elevated: bool,
    #[arg(long, help = "Print the rendered output as JSON")]
    json: bool,
}

#[derive(Debug, Args)]
struct ExtractArgs {
    #[arg(value_name = "HTML_FILE")]
    html_file: PathBuf,
    #[arg(long, value_name = "SECTION", help = "Heading to excerpt instead of the lead")]
    fragment: Option<String>,
    #[arg(long, value_name = "URL", help = "Server used to absolutize relative links")]
    server: Option<String>,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    match cli.command {
        Some(Commands::Resolve(args)) => run_resolve(&config_path, args),
        Some(Commands::Extract(args)) => run_extract(&config_path, args),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load(config_path: &Path) -> Result<EmbedConfig> {
    load_config(config_path).with_context(|| format!("loading {}", config_path.display()))
}

fn run_resolve(config_path: &Path, args: ResolveArgs) -> Result<()> {
    let config = load(config_path)?;
    let services = Services::from_config(&config)?;
    let client = MediaWikiClient::new(MediaWikiClientConfig::from_config(&config))?;
    let wiki = match services.farms.wiki_for_base(&args.wiki, &services.directory) {
        Some(wiki) => wiki,
        None => WikiReference::from_base_url(&args.wiki)?,
    };

    let resolver = TitleResolver::new(
        &client,
        &services,
        config.excerpt,
        config.hops.limit(args.elevated),
        CancellationFlag::new(),
    );
    let output = resolver.resolve(&args.text, &wiki, ResolutionState::default());
    tracing::debug!(requests = client.request_count(), "resolution finished");

    if args.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_output(&output);
    }
    Ok(())
}

fn print_output(output: &RenderedOutput) {
    match output {
        RenderedOutput::Cancelled => println!("(cancelled)"),
        RenderedOutput::Reaction { reaction } => println!("reaction: {reaction:?}"),
        RenderedOutput::Message(message) => {
            println!("{}", message.content);
            if let Some(reaction) = message.reaction {
                println!("reaction: {reaction:?}");
            }
            if let Some(card) = &message.card {
                print_card(card);
            }
        }
    }
}

fn print_card(card: &Card) {
    println!();
    if let Some(author) = &card.author {
        println!("[{}]", author.name);
    }
    println!("# {}", card.title);
    println!("{}", card.url);
    if let Some(description) = &card.description {
        println!("\n{description}");
    }
    for field in &card.fields {
        println!("\n{}:\n{}", field.name, field.value);
    }
    if let Some(thumbnail) = &card.thumbnail {
        println!("\nthumbnail: {thumbnail}");
    }
    if let Some(image) = &card.image {
        println!("image: {image}");
    }
    if let Some(footer) = &card.footer {
        println!("\n-- {footer}");
    }
}

fn run_extract(config_path: &Path, args: ExtractArgs) -> Result<()> {
    let config = load(config_path)?;
    let html = fs::read_to_string(&args.html_file)
        .with_context(|| format!("failed to read {}", args.html_file.display()))?;
    let known = KnownFacts {
        server: args.server.unwrap_or_default(),
        ..KnownFacts::default()
    };
    let excerpt = extract(&html, &known, &config.excerpt, args.fragment.as_deref());
    println!("{}", serde_json::to_string_pretty(&excerpt)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_arguments_parse() {
        let cli = Cli::try_parse_from([
            "wikiembed",
            "--verbose",
            "resolve",
            "Creeper#Spawning",
            "--wiki",
            "https://minecraft.fandom.com/",
            "--elevated",
        ])
        .expect("parse");
        assert!(cli.verbose);
        match cli.command {
            Some(Commands::Resolve(args)) => {
                assert_eq!(args.text, "Creeper#Spawning");
                assert!(args.elevated);
                assert!(!args.json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn resolve_requires_a_wiki() {
        assert!(Cli::try_parse_from(["wikiembed", "resolve", "Foo"]).is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
