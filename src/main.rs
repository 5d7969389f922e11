use clap::{Parser, Subcommand};
use morsecast::app_core::AppCore;
use morsecast::config::BroadcastConfig;
use morsecast::encoder::encode;
use morsecast::output::{NullProvider, OutputProvider};
use morsecast::persistence::{JsonFileStore, Persistence, Volume};
use morsecast::phrase_store::UppercaseTranslator;
use morsecast::player::RodioProvider;
use morsecast::runtime::spawn_runtime;
use morsecast::scheduler::{symbol_plan, total_duration};
use morsecast::scroll_channel::TextSurface;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{Level, warn};

#[derive(Parser)]
#[command(name = "morsecast", about = "Live code-broadcast engine CLI")]
struct Cli {
    /// Config file (default: <data dir>/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory holding phrases and volume
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show broadcast status
    Status,
    /// Print the code string for some text
    Encode {
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// Print the tone schedule for some text
    Timing {
        #[arg(required = true)]
        text: Vec<String>,
        /// Unit length in milliseconds (overrides config)
        #[arg(short, long)]
        unit_ms: Option<u64>,
    },
    /// Add a phrase to the broadcast
    Submit {
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// List submitted phrases
    List,
    /// Show or set the master volume (0-100)
    Volume { value: Option<u8> },
    /// Broadcast configuration
    Config {
        #[command(subcommand)]
        action: ConfigCmd,
    },
    /// Run the broadcast. Lines typed on stdin are submitted as phrases;
    /// `/log` prints activity since the last `/log`.
    Play {
        /// Stop after this many seconds instead of at end of input
        #[arg(short, long)]
        seconds: Option<u64>,
        /// No audio device; tones are discarded
        #[arg(long)]
        mute: bool,
        /// Audio only
        #[arg(long)]
        no_scroll: bool,
    },
}

#[derive(Subcommand)]
enum ConfigCmd {
    /// Show current configuration
    Show,
    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_writer(std::io::stderr)
        .init();

    let data_dir = cli.data_dir.clone().unwrap_or_else(JsonFileStore::default_dir);
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| data_dir.join("config.json"));
    let config = BroadcastConfig::load_from(&config_path);

    match cli.command {
        Commands::Status => {
            println!("morsecast v{}", env!("CARGO_PKG_VERSION"));
            let core = build_core(&config, &data_dir, Box::new(NullProvider), false);
            let status = core.get_status();
            println!(
                "Phrases: {} (+{} system) | Volume: {}% | Unit: {} ms | Loop: {:.1}s",
                status.phrase_count,
                status.system_phrase_count,
                status.volume,
                config.audio.unit_ms,
                status.broadcast_secs
            );
            println!("Data: {}", data_dir.display());
        }
        Commands::Encode { text } => {
            let text = text.join(" ");
            let symbols = encode(&text);
            if symbols.is_empty() {
                eprintln!("Error: nothing in '{}' can be encoded", text);
                std::process::exit(1);
            }
            println!("{}", symbols);
        }
        Commands::Timing { text, unit_ms } => {
            let symbols = encode(&text.join(" "));
            let unit = Duration::from_millis(unit_ms.unwrap_or(config.audio.unit_ms).max(1));
            let plan = symbol_plan(symbols.as_slice(), unit);
            println!("{:<4} {:>8} {:>8}  {}", "#", "At (ms)", "Len (ms)", "Mark");
            println!("{}", "-".repeat(30));
            for (i, step) in plan.steps().iter().enumerate() {
                println!(
                    "{:<4} {:>8} {:>8}  {}",
                    i + 1,
                    step.offset.as_millis(),
                    step.step.duration.as_millis(),
                    step.step.symbol.as_char()
                );
            }
            println!(
                "Total: {} ms ({} tones)",
                total_duration(symbols.as_slice(), unit).as_millis(),
                plan.len()
            );
        }
        Commands::Submit { text } => {
            let mut core = build_core(&config, &data_dir, Box::new(NullProvider), false);
            match core.submit(Duration::ZERO, &text.join(" ")) {
                Ok(phrase) => println!("Added: {}  {}", phrase.translated_text, phrase.encoded_text),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::List => {
            let core = build_core(&config, &data_dir, Box::new(NullProvider), false);
            let phrases = core.get_phrases();
            println!("{:<4} {:<20} {:<40}", "#", "Text", "Code");
            println!("{}", "-".repeat(66));
            for p in &phrases {
                println!(
                    " {:<3} {:<20} {:<40}",
                    p.index + 1,
                    truncate(&p.translated_text, 19),
                    truncate(&p.encoded_text, 39)
                );
            }
            println!("{} phrase(s)", phrases.len());
        }
        Commands::Volume { value } => match value {
            Some(v) if v > 100 => {
                eprintln!("Error: volume must be 0-100");
                std::process::exit(1);
            }
            Some(v) => {
                let mut store = JsonFileStore::in_dir(&data_dir);
                match store.save_volume(Volume::new(v)) {
                    Ok(()) => println!("Volume set to {}", Volume::new(v)),
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        std::process::exit(1);
                    }
                }
            }
            None => {
                let store = JsonFileStore::in_dir(&data_dir);
                let volume = match store.load_volume() {
                    Ok(v) => v.unwrap_or_default(),
                    Err(e) => {
                        warn!("could not load volume: {}", e);
                        Volume::default()
                    }
                };
                println!("Volume: {}", volume);
            }
        },
        Commands::Config { action } => match action {
            ConfigCmd::Show => match serde_json::to_string_pretty(&config) {
                Ok(json) => {
                    println!("# {}", config_path.display());
                    println!("{}", json);
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            },
            ConfigCmd::Init { force } => {
                if config_path.exists() && !force {
                    eprintln!(
                        "Error: '{}' already exists (use --force to overwrite)",
                        config_path.display()
                    );
                    std::process::exit(1);
                }
                if let Err(e) = BroadcastConfig::default().save_to(&config_path) {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
                println!("Wrote {}", config_path.display());
            }
        },
        Commands::Play {
            seconds,
            mute,
            no_scroll,
        } => play(config, data_dir, seconds, mute, no_scroll),
    }
}

fn build_core(
    config: &BroadcastConfig,
    data_dir: &Path,
    output: Box<dyn OutputProvider>,
    print_scroll: bool,
) -> AppCore {
    let surface = TextSurface::new(
        if print_scroll {
            Box::new(std::io::stdout()) as Box<dyn std::io::Write>
        } else {
            Box::new(std::io::sink())
        },
        &config.scroll,
    );
    AppCore::new(
        config.clone(),
        Box::new(JsonFileStore::in_dir(data_dir)),
        Box::new(UppercaseTranslator),
        output,
        Box::new(surface),
    )
}

fn play(config: BroadcastConfig, data_dir: PathBuf, seconds: Option<u64>, mute: bool, no_scroll: bool) {
    let spawned = spawn_runtime(
        move || {
            let output: Box<dyn OutputProvider> = if mute {
                Box::new(NullProvider)
            } else {
                Box::new(RodioProvider)
            };
            build_core(&config, &data_dir, output, !no_scroll)
        },
        |event| eprintln!("[{}]", event),
    );
    let (handle, join) = match spawned {
        Ok(pair) => pair,
        Err(e) => {
            eprintln!("Error: could not start runtime: {}", e);
            std::process::exit(1);
        }
    };

    let started = handle
        .start_audio()
        .and_then(|()| if no_scroll { Ok(()) } else { handle.start_scroll() });
    if let Err(e) = started {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    match seconds {
        Some(secs) => std::thread::sleep(Duration::from_secs(secs)),
        None => {
            let stdin = std::io::stdin();
            let mut log_cursor = 0;
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(l) => l,
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        break;
                    }
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "/log" {
                    match handle.activity(log_cursor) {
                        Ok(entries) => {
                            for entry in &entries {
                                println!("{}", entry);
                            }
                            if let Some(last) = entries.last() {
                                log_cursor = last.seq + 1;
                            }
                        }
                        Err(e) => eprintln!("Error: {}", e),
                    }
                    continue;
                }
                match handle.submit(line) {
                    Ok(phrase) => eprintln!("Added: {}  {}", phrase.translated_text, phrase.encoded_text),
                    Err(e) => eprintln!("Error: {}", e),
                }
            }
        }
    }

    handle.shutdown();
    if join.join().is_err() {
        eprintln!("Error: runtime thread panicked");
        std::process::exit(1);
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", head)
    } else {
        s.to_string()
    }
}
