use anyhow::{Context, Result};
use cadence_core::{
    init_logging, AppDirs, BusMessage, Config, ExtractorKind, ExtractorRegistry, LocalBus,
    MediaType, MessageBus, PlaylistFileExtractor,
};
use cadence_player::{PlayOutcome, PlayRequest, Player};
use cadence_search::{select_best, SearchAggregator};
use catalog_provider::CatalogProvider;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;

#[derive(Debug, Parser)]
#[command(name = "cadence", version, about = "Voice-driven media search and playback")]
struct Cli {
    /// Use this directory for config and logs instead of the platform ones
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    /// Pretend a display surface is attached (allows video playback)
    #[arg(long, global = true)]
    gui: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Query the configured providers and show what came back
    Search(QueryArgs),
    /// Search, select and start playback of the best result
    Play(PlayArgs),
    /// Show directories and the effective configuration
    Config,
}

#[derive(Debug, Args, Clone)]
struct QueryArgs {
    /// What to look for
    #[arg(required = true)]
    phrase: Vec<String>,
    /// Kind of media to ask for
    #[arg(long, short = 't', default_value = "generic")]
    media_type: MediaType,
}

impl QueryArgs {
    fn phrase(&self) -> String {
        self.phrase.join(" ")
    }
}

#[derive(Debug, Args, Clone)]
struct PlayArgs {
    #[command(flatten)]
    query: QueryArgs,
    /// Force audio playback of every result
    #[arg(long, conflicts_with = "video_only")]
    audio_only: bool,
    /// Only consider results that play as video
    #[arg(long)]
    video_only: bool,
}

impl PlayArgs {
    fn request(&self) -> PlayRequest {
        let request = PlayRequest::new(self.query.phrase(), self.query.media_type);
        if self.audio_only {
            request.audio_only()
        } else if self.video_only {
            request.video_only()
        } else {
            request
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let dirs = match &cli.root {
        Some(root) => AppDirs::from_root(root),
        None => AppDirs::discover()?,
    };
    let config = Config::load_or_default(&dirs)?;
    let _logging = init_logging(&config.logging, &dirs)?;

    match &cli.command {
        Command::Config => print_config(&config, &dirs)?,
        Command::Search(args) => run_search(&config, cli.gui, args).await?,
        Command::Play(args) => run_play(&config, cli.gui, args).await?,
    }
    Ok(())
}

fn build_extractors() -> Arc<ExtractorRegistry> {
    Arc::new(ExtractorRegistry::new().with(ExtractorKind::PlaylistFile, Arc::new(PlaylistFileExtractor)))
}

fn spawn_providers(config: &Config, bus: &Arc<LocalBus>) -> Result<Vec<JoinHandle<()>>> {
    let mut handles = Vec::with_capacity(config.providers.len());
    for provider in &config.providers {
        let catalog = CatalogProvider::from_config(provider)
            .with_context(|| format!("failed to start provider '{}'", provider.id))?;
        handles.push(catalog.spawn(bus.clone()));
    }
    if handles.is_empty() {
        tracing::warn!("no providers configured, searches will come back empty");
    }
    Ok(handles)
}

async fn run_search(config: &Config, gui: bool, args: &QueryArgs) -> Result<()> {
    let bus = Arc::new(LocalBus::new(config.bus.capacity));
    let providers = spawn_providers(config, &bus)?;
    let mut aggregator = SearchAggregator::new(bus.clone(), config.search.clone(), build_extractors());
    aggregator.set_gui_available(gui);

    let phrase = args.phrase();
    let groups = aggregator.search(&phrase, args.media_type).await;
    if groups.is_empty() {
        println!("No results for \"{phrase}\"");
    }
    for group in &groups {
        println!("{} ({} results)", group.provider_id, group.results.len());
        for entry in &group.results {
            println!(
                "  [{:>3}] {} - {}",
                entry.match_confidence,
                entry.title,
                entry.uri.as_deref().unwrap_or("(playlist)")
            );
        }
    }
    let all: Vec<_> = groups.into_iter().flat_map(|g| g.results).collect();
    if let Some(best) = select_best(&all, config.playback.playback_mode) {
        println!("Selected: {} from {}", best.title, best.provider_id);
    }

    for handle in providers {
        handle.abort();
    }
    Ok(())
}

async fn run_play(config: &Config, gui: bool, args: &PlayArgs) -> Result<()> {
    let bus = Arc::new(LocalBus::new(config.bus.capacity));
    let providers = spawn_providers(config, &bus)?;
    let mut events = bus.subscribe();
    let mut player = Player::new(bus.clone(), config, build_extractors());
    player.set_gui_available(gui);

    match player.play(args.request()).await {
        PlayOutcome::Playing(entry) => {
            println!("Playing {} ({})", entry.title, entry.provider_id);
            while let Ok(message) = events.try_recv() {
                if let BusMessage::PlaybackStart { target, .. } = message {
                    println!("Playback target: {target:?}");
                }
            }
        }
        PlayOutcome::NoResults { phrase, media_type } => {
            println!("Can't play \"{phrase}\": nothing found for {media_type}");
        }
        PlayOutcome::MissingQuery => println!("What should I play?"),
        PlayOutcome::Resumed | PlayOutcome::NothingToResume => {}
    }

    player.shutdown();
    for handle in providers {
        handle.abort();
    }
    Ok(())
}

fn print_config(config: &Config, dirs: &AppDirs) -> Result<()> {
    println!("Config file: {}", Config::config_path(dirs).display());
    println!("Log directory: {}", dirs.log_dir().display());
    println!();
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_joins_phrase_words() {
        let cli = Cli::try_parse_from(["cadence", "search", "relax", "fm", "-t", "radio"]).unwrap();
        let Command::Search(args) = cli.command else {
            panic!("expected search");
        };
        assert_eq!(args.phrase(), "relax fm");
        assert_eq!(args.media_type, MediaType::Radio);
    }

    #[test]
    fn unknown_media_type_is_rejected() {
        let result = Cli::try_parse_from(["cadence", "search", "x", "--media-type", "hologram"]);
        assert!(result.is_err());
    }

    #[test]
    fn play_flags_shape_the_request() {
        let cli = Cli::try_parse_from(["cadence", "--gui", "play", "film", "--video-only"]).unwrap();
        assert!(cli.gui);
        let Command::Play(args) = cli.command else {
            panic!("expected play");
        };
        let request = args.request();
        assert!(request.video_only);
        assert!(!request.audio_only);
        assert_eq!(request.media_type, MediaType::Generic);
    }

    #[test]
    fn audio_and_video_only_conflict() {
        let result =
            Cli::try_parse_from(["cadence", "play", "film", "--audio-only", "--video-only"]);
        assert!(result.is_err());
    }

    #[test]
    fn play_file_extractor_is_registered() {
        assert!(build_extractors().get(ExtractorKind::PlaylistFile).is_some());
    }
}
