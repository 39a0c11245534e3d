use clap::{command, Parser};
use playground::{
    config::PlaygroundConfig,
    event::event_bus::{EventReceiver, EventType},
    playground::Playground,
    EventError, PlaygroundError,
};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "playground.json")]
    config: PathBuf,

    /// File loaded into the editor buffer; `:run` evaluates it
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// Enable debug mode
    #[arg(short, long)]
    verbose: bool,
}

const HELP: &str = "\
Commands:
  :run          evaluate the editor file (reloaded from disk)
  :edit <code>  replace the editor buffer with <code>
  :stop         interrupt the running evaluation
  :clear        clear the output history
  :quit         exit
Anything else is evaluated as REPL input. Ctrl+C interrupts.";

fn print_events(mut events: EventReceiver, json: bool) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(EventError::Lagged { count }) => {
                    debug!("Printer lagged by {} events", count);
                    continue;
                }
                Err(_) => break,
            };
            match event.event_type {
                EventType::EvalSuccess { value } => {
                    if json {
                        match serde_json::to_string(&value) {
                            Ok(line) => println!("{}", line),
                            Err(e) => eprintln!("Failed to encode result: {}", e),
                        }
                    } else {
                        println!("{}", value);
                    }
                }
                EventType::EvalError { diagnostics } => {
                    if json {
                        match serde_json::to_string(&diagnostics) {
                            Ok(line) => eprintln!("{}", line),
                            Err(e) => eprintln!("Failed to encode diagnostics: {}", e),
                        }
                    } else {
                        for diagnostic in diagnostics {
                            eprintln!("{}", diagnostic);
                        }
                    }
                }
                EventType::OutputAppended { .. } | EventType::OutputCleared => {}
            }
        }
    })
}

async fn load_editor(playground: &Playground, cli: &Cli) -> Result<(), PlaygroundError> {
    if let Some(path) = &cli.file {
        let code = std::fs::read_to_string(path).map_err(|e| {
            PlaygroundError::internal(format!("Failed to read {}: {}", path.display(), e))
        })?;
        playground.workspace().write().await.set_editor_value(code);
    }
    Ok(())
}

async fn run(cli: &Cli) -> Result<(), PlaygroundError> {
    let config = if cli.config.exists() {
        PlaygroundConfig::from_file(&cli.config)?
    } else {
        PlaygroundConfig::default()
    };
    info!("config loaded.");
    debug!("config: {:?}", config);

    let playground = Playground::with_source_interpreter(config)?;
    load_editor(&playground, cli).await?;
    let printer = print_events(playground.subscribe(), cli.json);
    playground.start().await?;
    let triggers = playground.triggers();

    println!("Playground started. Type :help for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => return Err(PlaygroundError::internal(format!("Failed to read input: {}", e))),
                };
                let command = line.trim();
                match command {
                    "" => {}
                    ":quit" | ":q" => break,
                    ":help" => println!("{}", HELP),
                    ":stop" => triggers.interrupt().await?,
                    ":clear" => triggers.clear_output().await?,
                    ":run" => {
                        load_editor(&playground, cli).await?;
                        triggers.eval_editor().await?;
                    }
                    _ => {
                        if let Some(code) = command.strip_prefix(":edit ") {
                            playground.workspace().write().await.set_editor_value(code);
                        } else {
                            playground.workspace().write().await.set_repl_value(line.as_str());
                            triggers.eval_repl().await?;
                        }
                    }
                }
            }
            result = tokio::signal::ctrl_c() => {
                result.map_err(|e| PlaygroundError::internal(format!("Failed to wait for Ctrl+C: {}", e)))?;
                println!("Interrupt requested.");
                triggers.interrupt().await?;
            }
        }
    }

    playground.shutdown().await?;
    printer.abort();
    println!("Playground stopped.");
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run(&cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
