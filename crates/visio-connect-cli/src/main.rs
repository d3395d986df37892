//! vconnect - attach to running Visio documents from the command line

mod prompt;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;
use visio_connect::{BoundNames, ComBridge, Config, SelectionWatcher, Selector, Session};

use crate::prompt::ConsolePrompt;

#[derive(Parser)]
#[command(name = "vconnect")]
#[command(author, version, about = "Attach to running Visio documents over COM")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log bridge traffic and resolver decisions
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List open Visio documents in every running instance
    List,

    /// Resolve a document and show the handles bound for it
    Init {
        #[command(flatten)]
        selector: SelectorArgs,

        /// Suffix for holding several documents side by side (e.g. "1")
        #[arg(short, long, default_value = "")]
        suffix: String,
    },

    /// Write a Shape Data value into every shape you select
    Watch {
        #[command(flatten)]
        selector: SelectorArgs,

        /// Shape Data row name (without the "prop." prefix)
        #[arg(short, long, default_value = "")]
        field: String,

        /// Value to write
        #[arg(short = 'V', long, default_value = "")]
        value: String,
    },
}

#[derive(Args)]
struct SelectorArgs {
    /// Index into the list of open documents
    #[arg(short, long, conflicts_with_all = ["file", "new", "interactive"])]
    index: Option<usize>,

    /// Drawing to find among open documents or open
    #[arg(long, conflicts_with_all = ["new", "interactive"])]
    file: Option<PathBuf>,

    /// Create a new drawing
    #[arg(short, long, conflicts_with = "interactive")]
    new: bool,

    /// Template for --new
    #[arg(short, long, requires = "new")]
    template: Option<PathBuf>,

    /// Choose interactively
    #[arg(long)]
    interactive: bool,
}

impl SelectorArgs {
    fn selector(self) -> Result<Selector> {
        if self.interactive {
            Ok(Selector::Interactive)
        } else if let Some(index) = self.index {
            Ok(Selector::Index(index))
        } else if let Some(file) = self.file {
            Ok(Selector::File(file))
        } else if self.new {
            Ok(Selector::New {
                template: self.template,
            })
        } else {
            bail!(
                "no document selected\n\
                 Usage:\n  \
                 --index N                 an open document by index (see `vconnect list`)\n  \
                 --file path/to/file.vsdx  an open document by path, or open the file\n  \
                 --new [--template T]      a new drawing, optionally from a template\n  \
                 --interactive             choose from a menu"
            )
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config '{}'", path.display()))?,
        None => Config::default(),
    }
    .with_env_overrides();

    let bridge = ComBridge::start(&config.bridge).context("Failed to start the Visio COM bridge")?;
    let bridge = Arc::new(bridge);
    let mut session = Session::new(bridge.clone(), config.resolver.clone());

    let outcome = match cli.command {
        Commands::List => list(&session),
        Commands::Init { selector, suffix } => init(&mut session, selector.selector()?, &suffix),
        Commands::Watch {
            selector,
            field,
            value,
        } => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to start async runtime")?;
            runtime.block_on(watch(
                &mut session,
                selector.selector()?,
                field,
                value,
                &config,
            ))
        }
    };

    drop(session);
    match Arc::try_unwrap(bridge) {
        Ok(bridge) => bridge.shutdown().context("Failed to shut down the bridge")?,
        Err(_) => tracing::debug!("Bridge still referenced; leaving it to exit with us"),
    }
    outcome
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn list(session: &Session) -> Result<()> {
    let resolver = session.resolver();
    let enumeration = resolver
        .loaded_documents()
        .context("Failed to enumerate running objects")?;

    for (i, doc) in enumeration.documents.iter().enumerate() {
        println!("{i}: {}", doc.full_name);
    }
    for skipped in &enumeration.skipped {
        eprintln!("skipped {}: {}", skipped.display_name, skipped.reason);
    }
    resolver.release_documents(&enumeration.documents);
    Ok(())
}

fn init(session: &mut Session, selector: Selector, suffix: &str) -> Result<()> {
    let mut prompt = ConsolePrompt::stdin();
    let Some(resolved) = session.attach(suffix, &selector, &mut prompt)? else {
        eprintln!("No document selected.");
        return Ok(());
    };
    let document = resolved.document.clone();
    let names = BoundNames::for_suffix(suffix);

    println!("{}\t{}", names.app, resolved.application.raw());
    println!("{}\t{} ({})", names.doc, document.name, document.full_name);
    println!("{}\t{}", names.page, resolved.page.raw());
    println!("{}\t{}", names.window, resolved.window.raw());

    let constants = session.constants().context("Failed to load Visio constants")?;
    println!("{}\t{} entries", names.constants, constants.len());
    Ok(())
}

async fn watch(
    session: &mut Session,
    selector: Selector,
    field: String,
    value: String,
    config: &Config,
) -> Result<()> {
    let mut prompt = ConsolePrompt::stdin();
    let Some(resolved) = session.attach("", &selector, &mut prompt)? else {
        eprintln!("No document selected.");
        return Ok(());
    };
    let window = resolved.window;
    eprintln!("Watching the selection of '{}'.", resolved.document.name);
    drop(prompt);

    let mut watcher = SelectionWatcher::new(session.automation().clone(), window, &config.watcher);
    watcher.set_field(field);
    watcher.set_value(value);
    watcher.start()?;

    eprintln!("Commands: field <name> | value <text> | on | off | quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let line = line.trim();
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        match command {
            "field" => watcher.set_field(rest.trim()),
            "value" => watcher.set_value(rest),
            "on" => watcher.start()?,
            "off" => watcher.stop(),
            "quit" | "exit" => break,
            "" => {}
            other => eprintln!("Unknown command '{other}'"),
        }
    }

    watcher.close();
    Ok(())
}
