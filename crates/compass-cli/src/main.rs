use std::fs;
use std::io::{self, BufRead, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use compass_contracts::analysis::AnalysisState;
use compass_contracts::chat::{parse_intent, Intent, CHAT_HELP_COMMANDS};
use compass_contracts::events::EventWriter;
use compass_contracts::models::ModelRegistry;
use compass_contracts::reports::{
    read_summary, resolve_report_path, write_summary, DEFAULT_REPORT_FILE_NAME,
};
use compass_engine::{AnalysisClient, AnalysisSession, EngineConfig};
use serde_json::{Map, Value};
use uuid::Uuid;

const EXIT_ANALYSIS_FAILED: i32 = 2;
const SUMMARY_FILE_NAME: &str = "summary.json";

#[derive(Debug, Parser)]
#[command(
    name = "compass",
    version,
    about = "Streams a team-role analysis of a performance compass chart"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Analyze(AnalyzeArgs),
    Chat(ChatArgs),
    Export(ExportArgs),
}

#[derive(Debug, Clone, Default, Args)]
struct EngineArgs {
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    api_base: Option<String>,
    #[arg(long)]
    prompt_file: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct AnalyzeArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[command(flatten)]
    engine: EngineArgs,
    /// Do not echo the report while it streams.
    #[arg(long)]
    quiet: bool,
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[command(flatten)]
    engine: EngineArgs,
}

#[derive(Debug, Parser)]
struct ExportArgs {
    #[arg(long)]
    run: PathBuf,
    #[arg(long)]
    out: PathBuf,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("compass error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Analyze(args) => {
            let config = engine_config(&args.engine)?;
            run_analyze(args, config)
        }
        Command::Chat(args) => {
            let config = engine_config(&args.engine)?;
            run_chat(args, config)?;
            Ok(0)
        }
        Command::Export(args) => run_export(args),
    }
}

/// Environment first, then command-line overrides.
fn engine_config(args: &EngineArgs) -> Result<EngineConfig> {
    let mut config = EngineConfig::from_env()?;
    if let Some(model) = args.model.as_deref() {
        config = config.with_model(model);
    }
    if let Some(api_base) = args.api_base.as_deref() {
        config = config.with_api_base(api_base);
    }
    if let Some(prompt_file) = args.prompt_file.as_deref() {
        config = config.with_prompt_file(prompt_file)?;
    }
    Ok(config)
}

fn open_session(
    out: &Path,
    events: Option<&Path>,
    config: &EngineConfig,
) -> Result<AnalysisSession> {
    let client =
        AnalysisClient::from_config(config).context("failed to initialize the analysis client")?;
    if let Some(reason) = client.fallback_reason() {
        eprintln!("{reason} Using {}.", client.model().name);
    }
    fs::create_dir_all(out).with_context(|| format!("failed to create {}", out.display()))?;
    let events_path = events
        .map(Path::to_path_buf)
        .unwrap_or_else(|| out.join("events.jsonl"));
    let writer = EventWriter::new(events_path, Uuid::new_v4().to_string());
    Ok(AnalysisSession::new(client, writer))
}

fn exit_code_for(state: AnalysisState) -> i32 {
    match state {
        AnalysisState::Complete => 0,
        AnalysisState::Failed => EXIT_ANALYSIS_FAILED,
        AnalysisState::Idle | AnalysisState::Streaming => 1,
    }
}

fn run_analyze(args: AnalyzeArgs, config: EngineConfig) -> Result<i32> {
    let mut session = open_session(&args.out, args.events.as_deref(), &config)?;
    session.select_image_path(&args.image)?;
    if !args.quiet {
        eprintln!(
            "Analyzing {} with {}...",
            args.image.display(),
            session.client().model().name
        );
    }

    let quiet = args.quiet;
    let mut stdout = io::stdout();
    let state = session.analyze(|fragment, _| {
        if quiet {
            return;
        }
        if let Err(err) = write!(stdout, "{fragment}").and_then(|_| stdout.flush()) {
            eprintln!("compass: failed to echo report: {err}");
        }
    })?;
    if !args.quiet && !session.result().text().ends_with('\n') {
        println!();
    }

    let mut summary = session.summary();
    if let Some(path) = session.download(&args.out)? {
        summary.report_path = Some(path.to_string_lossy().to_string());
        eprintln!("Saved report to {}", path.display());
    }
    if let Some(err) = session.last_error() {
        eprintln!("{}", err.user_message());
    }
    let mut extra = Map::new();
    extra.insert(
        "events_path".to_string(),
        Value::String(session.events().path().to_string_lossy().to_string()),
    );
    write_summary(&args.out.join(SUMMARY_FILE_NAME), &summary, Some(&extra))?;
    Ok(exit_code_for(state))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChatFlow {
    Continue,
    Quit,
}

fn run_chat(args: ChatArgs, config: EngineConfig) -> Result<()> {
    let mut session = open_session(&args.out, args.events.as_deref(), &config)?;
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut line = String::new();

    println!("Performance compass chat. Type /help for commands.");
    loop {
        print!("> ");
        stdout.flush()?;

        line.clear();
        let read = match stdin.lock().read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let input = line.trim_end_matches(['\n', '\r']);
        if handle_chat_line(&mut session, &config, &args.out, input, &mut stdout)?
            == ChatFlow::Quit
        {
            break;
        }
    }
    Ok(())
}

fn handle_chat_line<W: Write>(
    session: &mut AnalysisSession,
    config: &EngineConfig,
    out_dir: &Path,
    input: &str,
    out: &mut W,
) -> Result<ChatFlow> {
    let intent = parse_intent(input);
    match intent.action.as_str() {
        "noop" => {}
        "help" => {
            writeln!(out, "Commands: {}", CHAT_HELP_COMMANDS.join(" "))?;
        }
        "quit" => return Ok(ChatFlow::Quit),
        "select_image" => match intent.arg("path") {
            Some(path) => select_image(session, Path::new(path), out)?,
            None => writeln!(out, "/image requires a path")?,
        },
        "input" => {
            let candidate = intent.input.as_deref().map(Path::new);
            match candidate {
                Some(path) if path.is_file() => select_image(session, path, out)?,
                _ => writeln!(out, "Not a command or an image path. Type /help for commands.")?,
            }
        }
        "analyze" => run_chat_analysis(session, out)?,
        "reset" => {
            session.reset();
            writeln!(out, "Image removed.")?;
        }
        "download" => {
            let target = intent
                .arg("path")
                .map(PathBuf::from)
                .unwrap_or_else(|| out_dir.to_path_buf());
            match session.download(&target)? {
                Some(path) => writeln!(out, "Saved report to {}", path.display())?,
                None => writeln!(out, "Nothing to download yet. Run /analyze first.")?,
            }
        }
        "status" => write_status(session, out)?,
        "show" => {
            let text = session.result().text();
            if text.is_empty() {
                writeln!(out, "(no analysis text yet)")?;
            } else {
                writeln!(out, "{text}")?;
            }
        }
        "set_model" => set_model(session, config, &intent, out)?,
        "unknown" => {
            let raw = Path::new(intent.raw.trim());
            if raw.is_file() {
                select_image(session, raw, out)?;
            } else {
                let command = intent.arg("command").unwrap_or_default();
                writeln!(out, "Unknown command: /{command}. Type /help for commands.")?;
            }
        }
        other => {
            writeln!(out, "Unsupported action: {other}")?;
        }
    }
    Ok(ChatFlow::Continue)
}

fn select_image<W: Write>(session: &mut AnalysisSession, path: &Path, out: &mut W) -> Result<()> {
    match session.select_image_path(path) {
        Ok(()) => {
            if let Some(asset) = session.asset() {
                writeln!(
                    out,
                    "Selected {} ({}). Run /analyze to start.",
                    asset.display_name(),
                    asset.mime_type()
                )?;
            }
        }
        Err(err) => writeln!(out, "{}", err.user_message())?,
    }
    Ok(())
}

fn run_chat_analysis<W: Write>(session: &mut AnalysisSession, out: &mut W) -> Result<()> {
    if session.asset().is_none() {
        writeln!(out, "Please select an image first (/image <path>).")?;
        return Ok(());
    }
    let mut echo_error = None;
    let state = session.analyze(|fragment, _| {
        if echo_error.is_some() {
            return;
        }
        if let Err(err) = write!(out, "{fragment}").and_then(|_| out.flush()) {
            echo_error = Some(err);
        }
    })?;
    if let Some(err) = echo_error {
        return Err(err.into());
    }
    if !session.result().text().is_empty() && !session.result().text().ends_with('\n') {
        writeln!(out)?;
    }
    match state {
        AnalysisState::Complete => writeln!(
            out,
            "Analysis complete ({} chars). Use /download to save it.",
            session.result().text().chars().count()
        )?,
        _ => {
            if let Some(err) = session.last_error() {
                writeln!(out, "{}", err.user_message())?;
            }
            writeln!(out, "Use /retry to try again.")?;
        }
    }
    Ok(())
}

fn write_status<W: Write>(session: &AnalysisSession, out: &mut W) -> Result<()> {
    let image = session
        .asset()
        .map(|asset| format!("{} ({})", asset.display_name(), asset.mime_type()))
        .unwrap_or_else(|| "none".to_string());
    let result = session.result();
    writeln!(out, "Image: {image}")?;
    writeln!(
        out,
        "Model: {} via {}",
        session.client().model().name,
        session.client().provider_name()
    )?;
    writeln!(
        out,
        "State: {} ({} chars, {} fragments)",
        result.state(),
        result.text().chars().count(),
        result.fragments()
    )?;
    if let Some(err) = session.last_error() {
        writeln!(out, "Last error: {}", err.user_message())?;
    }
    Ok(())
}

fn set_model<W: Write>(
    session: &mut AnalysisSession,
    config: &EngineConfig,
    intent: &Intent,
    out: &mut W,
) -> Result<()> {
    let Some(model) = intent.arg("model") else {
        let registry = ModelRegistry::default();
        let known: Vec<&str> = registry
            .list()
            .map(|model| model.name.as_str())
            .collect();
        writeln!(out, "Model: {}", session.client().model().name)?;
        writeln!(out, "Known models: {}", known.join(", "))?;
        return Ok(());
    };
    match AnalysisClient::from_config(&config.clone().with_model(model)) {
        Ok(client) => {
            if let Some(reason) = client.fallback_reason() {
                writeln!(out, "{reason}")?;
            }
            writeln!(out, "Model set to {}", client.model().name)?;
            session.set_client(client);
        }
        Err(err) => writeln!(out, "{}", err.user_message())?,
    }
    Ok(())
}

fn run_export(args: ExportArgs) -> Result<i32> {
    let path = export_report(&args.run, &args.out)?;
    println!("Exported to {}", path.display());
    Ok(0)
}

fn export_report(run_dir: &Path, target: &Path) -> Result<PathBuf> {
    let summary = read_summary(&run_dir.join(SUMMARY_FILE_NAME))?;
    if summary.state != AnalysisState::Complete {
        bail!(
            "run {} has no completed analysis (state: {})",
            run_dir.display(),
            summary.state
        );
    }
    let source = summary
        .report_path
        .as_deref()
        .map(PathBuf::from)
        .filter(|path| path.is_file())
        .unwrap_or_else(|| run_dir.join(DEFAULT_REPORT_FILE_NAME));
    let text = fs::read_to_string(&source)
        .with_context(|| format!("failed reading {}", source.display()))?;

    let destination = resolve_report_path(target);
    if let Some(parent) = destination.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(&destination, text)
        .with_context(|| format!("failed writing {}", destination.display()))?;
    Ok(destination)
}
