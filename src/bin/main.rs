use clap::{Parser, Subcommand};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use reparse_scheduler::config::{self, SchedulerConfig};
use reparse_scheduler::error::RenderError;
use reparse_scheduler::model::{BlockOutlineModel, OutlineNode, StyleSpan};
use reparse_scheduler::pipeline::{OutlineRenderer, PresentationRenderer};
use reparse_scheduler::UpdateSession;

/// Debounced incremental reparsing of build scripts
#[derive(Parser)]
#[command(name = "reparse-scheduler")]
#[command(version)]
#[command(about = "Debounced incremental reparsing of build scripts")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay an edit script against a document and print every published view
    Replay {
        /// Script with one command per line (edit, sleep, force, cursor, theme)
        script: PathBuf,

        /// File holding the initial document text (default: empty document)
        #[arg(long)]
        initial: Option<PathBuf>,

        /// Config file layered over the user config
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Inspect scheduler configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the default configuration as TOML
    Init,
    /// Print the effective configuration after layering
    Show {
        /// Config file layered over the user config
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

/// Prints published views to stdout.
struct StdoutRenderer;

impl PresentationRenderer<Arc<[StyleSpan]>> for StdoutRenderer {
    fn publish_styling(
        &self,
        range: Range<usize>,
        styling: Arc<[StyleSpan]>,
    ) -> Result<(), RenderError> {
        println!(
            "styling {}..{}: {} span(s)",
            range.start,
            range.end,
            styling.len()
        );
        Ok(())
    }
}

impl OutlineRenderer<Arc<[OutlineNode]>> for StdoutRenderer {
    fn publish_outline(
        &self,
        outline: Arc<[OutlineNode]>,
        cursor: Option<usize>,
    ) -> Result<(), RenderError> {
        let selected = cursor
            .and_then(|offset| OutlineNode::find_at(&outline, offset))
            .map(|node| node.name.as_str())
            .unwrap_or("-");
        println!(
            "outline: {} top-level block(s), selected {}",
            outline.len(),
            selected
        );
        Ok(())
    }
}

#[derive(Debug, PartialEq)]
enum ScriptCommand {
    Edit {
        offset: usize,
        removed: usize,
        text: String,
    },
    Sleep(Duration),
    Force,
    Cursor(usize),
    Theme,
}

fn parse_script_line(line: &str) -> Result<Option<ScriptCommand>, String> {
    let line = line.trim_start();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
    let number = |value: Option<&str>, what: &str| -> Result<usize, String> {
        value
            .ok_or_else(|| format!("missing {}", what))?
            .parse::<usize>()
            .map_err(|e| format!("invalid {}: {}", what, e))
    };

    let command = match word {
        "edit" => {
            let mut parts = rest.splitn(3, ' ');
            let offset = number(parts.next(), "offset")?;
            let removed = number(parts.next(), "removed length")?;
            let text = unescape(parts.next().unwrap_or(""));
            ScriptCommand::Edit {
                offset,
                removed,
                text,
            }
        }
        "sleep" => {
            let ms = number(Some(rest.trim()), "milliseconds")?;
            ScriptCommand::Sleep(Duration::from_millis(ms as u64))
        }
        "force" => ScriptCommand::Force,
        "cursor" => ScriptCommand::Cursor(number(Some(rest.trim()), "cursor offset")?),
        "theme" => ScriptCommand::Theme,
        other => return Err(format!("unknown command '{}'", other)),
    };
    Ok(Some(command))
}

/// Expand `\n`, `\t` and `\\` in inserted text.
fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn print_model(model: Option<Arc<BlockOutlineModel>>) {
    match model {
        Some(model) => println!(
            "model v{}: {} byte(s), {} block(s)",
            model.version(),
            model.text().len(),
            model.blocks().len()
        ),
        None => println!("model released"),
    }
}

fn replay(script: &Path, initial: Option<&Path>, config: SchedulerConfig) -> Result<(), String> {
    let script = std::fs::read_to_string(script)
        .map_err(|e| format!("Failed to read {}: {}", script.display(), e))?;
    let initial_text = match initial {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?,
        None => String::new(),
    };
    let model = BlockOutlineModel::parse(&initial_text)
        .map_err(|e| format!("Initial document does not parse: {}", e))?;

    let session = UpdateSession::new(config, initial_text, model, StdoutRenderer, StdoutRenderer)
        .map_err(|e| e.to_string())?;

    for (index, line) in script.lines().enumerate() {
        let command = parse_script_line(line).map_err(|e| format!("line {}: {}", index + 1, e))?;
        match command {
            None => {}
            Some(ScriptCommand::Edit {
                offset,
                removed,
                text,
            }) => session
                .on_edit(offset, removed, text)
                .map_err(|e| format!("line {}: {}", index + 1, e))?,
            Some(ScriptCommand::Sleep(duration)) => std::thread::sleep(duration),
            Some(ScriptCommand::Force) => print_model(session.force_update_and_get()),
            Some(ScriptCommand::Cursor(offset)) => {
                session.on_cursor_moved(offset);
            }
            Some(ScriptCommand::Theme) => {
                session.on_theme_changed();
            }
        }
    }

    print_model(session.force_update_and_get());
    let stats = session.stats();
    println!(
        "state {:?}: {} update(s), {} failed",
        session.pipeline_state(),
        stats.successful_updates,
        stats.failed_updates
    );
    session.dispose();
    Ok(())
}

fn load_config_or_exit(explicit: Option<&Path>) -> SchedulerConfig {
    match config::load_config(explicit) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Replay {
            script,
            initial,
            config,
        } => {
            let config = load_config_or_exit(config.as_deref());
            if let Err(e) = replay(&script, initial.as_deref(), config) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Config { action } => {
            let config = match action {
                ConfigAction::Init => SchedulerConfig::default(),
                ConfigAction::Show { config } => load_config_or_exit(config.as_deref()),
            };
            match config.to_toml_string() {
                Ok(text) => print!("{}", text),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }
        }
    }
}
