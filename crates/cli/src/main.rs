use clap::{Parser, Subcommand};
use natter::agent::Progress;
use natter::app::{AppState, SubmitError};
use natter::llm::OllamaClient;
use natter::tools::BuiltinTools;
use natter::worker::TurnWorker;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "natter")]
#[command(about = "Natter CLI", long_about = None)]
struct Cli {
    /// Config file path (default: NATTER_CONFIG_PATH or ~/.natter/client_config.json)
    #[arg(long, short, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the data directory with a default config and an empty chat history.
    Init,

    /// Chat interactively with the selected model. Replies are saved to the chat history.
    Chat {
        /// Chat to continue (index from `natter sessions list`); default starts a new chat.
        #[arg(long, value_name = "N")]
        session: Option<usize>,

        /// Model to use (saved as the selected model).
        #[arg(long, short, value_name = "NAME")]
        model: Option<String>,
    },

    /// List models available on the Ollama server.
    Models,

    /// Manage saved chats.
    Sessions {
        #[command(subcommand)]
        action: SessionsAction,
    },

    /// Manage system-prompt profiles.
    Profiles {
        #[command(subcommand)]
        action: ProfilesAction,
    },

    /// Set the free-text tools flag; any non-blank value lets the model call the built-in tools.
    Tools {
        /// New value (omit or pass "" to disable).
        value: Option<String>,
    },
}

#[derive(Subcommand)]
enum SessionsAction {
    /// List chats with their titles.
    List,
    /// Print a chat's turns.
    Show { index: usize },
    /// Delete a chat.
    Delete { index: usize },
}

#[derive(Subcommand)]
enum ProfilesAction {
    /// List profiles; the selected one is marked with `*`.
    List,
    /// Add a profile.
    Add {
        name: String,
        /// Instruction text sent as the system message.
        prefix: String,
    },
    /// Edit a profile in place.
    Edit {
        index: usize,
        name: String,
        prefix: String,
    },
    /// Select the profile used for new turns.
    Select { index: usize },
    /// Remove a profile (the last one cannot be removed).
    Remove { index: usize },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let config = cli.config;

    let result = match cli.command {
        Some(Commands::Version) => {
            println!("natter {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(Commands::Init) => run_init(config),
        Some(Commands::Chat { session, model }) => run_chat(config, session, model).await,
        Some(Commands::Models) => run_models(config).await,
        Some(Commands::Sessions { action }) => run_sessions(config, action),
        Some(Commands::Profiles { action }) => run_profiles(config, action),
        Some(Commands::Tools { value }) => {
            let mut app = AppState::open(config);
            app.set_tools(value.as_deref().unwrap_or(""));
            println!(
                "tools {}",
                if app.config().tools_enabled() {
                    "enabled"
                } else {
                    "disabled"
                }
            );
            Ok(())
        }
        None => {
            println!("Run with --help for usage");
            Ok(())
        }
    };

    if let Err(e) = result {
        log::error!("{:#}", e);
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(natter::config::default_config_path);
    let dir = natter::init::init_data_dir(&path)?;
    println!("initialized data directory at {}", dir.display());
    Ok(())
}

fn client_for(app: &AppState) -> OllamaClient {
    OllamaClient::new(natter::config::resolve_host(app.config()))
}

/// Ask the server for its models. An unreachable server is logged and yields an empty list.
async fn discover_models(client: &OllamaClient) -> Vec<String> {
    match client.list_models().await {
        Ok(models) => models.into_iter().map(|m| m.name).collect(),
        Err(e) => {
            log::warn!("could not list models from {}: {}", client.base_url(), e);
            Vec::new()
        }
    }
}

async fn run_models(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let app = AppState::open(config_path);
    let client = client_for(&app);
    let models = client.list_models().await?;
    let selected = app.config().selected_model.clone();
    for m in models {
        let mark = if selected.as_deref() == Some(m.name.as_str()) {
            "*"
        } else {
            " "
        };
        println!("{} {}", mark, m.name);
    }
    Ok(())
}

fn run_sessions(config_path: Option<PathBuf>, action: SessionsAction) -> anyhow::Result<()> {
    let mut app = AppState::open(config_path);
    match action {
        SessionsAction::List => {
            for (i, s) in app.conversations().sessions().iter().enumerate() {
                println!("{:>3}  {}  ({} turns)", i, s.title, s.history.len());
            }
        }
        SessionsAction::Show { index } => {
            let session = app
                .conversations()
                .get(index)
                .ok_or_else(|| anyhow::anyhow!("no chat at index {}", index))?;
            println!("# {}", session.title);
            for turn in &session.history {
                println!("{}> {}", turn.role.as_str(), turn.content);
            }
        }
        SessionsAction::Delete { index } => {
            if !app.delete_session(index) {
                anyhow::bail!("no chat at index {}", index);
            }
            println!("deleted chat {}", index);
        }
    }
    Ok(())
}

fn run_profiles(config_path: Option<PathBuf>, action: ProfilesAction) -> anyhow::Result<()> {
    let mut app = AppState::open(config_path);
    match action {
        ProfilesAction::List => {
            let config = app.config();
            for (i, p) in config.profiles.iter().enumerate() {
                let mark = if i == config.selected_profile_idx { "*" } else { " " };
                println!("{} {:>2}  {}: {}", mark, i, p.name, p.prefix);
            }
        }
        ProfilesAction::Add { name, prefix } => {
            let idx = app.add_profile();
            app.update_profile(idx, &name, &prefix);
            println!("added profile {}", idx);
        }
        ProfilesAction::Edit {
            index,
            name,
            prefix,
        } => {
            if !app.update_profile(index, &name, &prefix) {
                anyhow::bail!("no profile at index {}", index);
            }
        }
        ProfilesAction::Select { index } => {
            if !app.select_profile(index) {
                anyhow::bail!("no profile at index {}", index);
            }
        }
        ProfilesAction::Remove { index } => {
            if !app.remove_profile(index) {
                anyhow::bail!("cannot remove profile {} (missing or last remaining)", index);
            }
        }
    }
    Ok(())
}

async fn run_chat(
    config_path: Option<PathBuf>,
    session: Option<usize>,
    model: Option<String>,
) -> anyhow::Result<()> {
    use std::io::{self, IsTerminal, Write};

    let mut app = AppState::open(config_path);
    if let Some(path) = app.config_path() {
        log::info!("using config {}", path.display());
    }
    let client = client_for(&app);
    app.set_models(discover_models(&client).await);
    if let Some(m) = model {
        app.set_model(&m);
    }
    match session {
        Some(idx) if !app.select_session(idx) => anyhow::bail!("no chat at index {}", idx),
        Some(_) => {}
        None => {
            app.create_session();
        }
    }

    match app.effective_model() {
        Some(m) => println!("model: {}", m),
        None => println!("no model available; pass --model or start the Ollama server"),
    }
    let profile = app
        .config()
        .selected_profile()
        .map(|p| p.name.clone())
        .unwrap_or_default();
    println!("profile: {}  (type /help for commands)", profile);

    let worker = TurnWorker::new(
        Arc::new(client),
        Arc::new(BuiltinTools::new()),
        tokio::runtime::Handle::current(),
    );
    let mut progress = worker.progress();
    let progress_task = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let p = progress.borrow_and_update().clone();
            if let Progress::Tool(name) = p {
                eprintln!("  Using tool <{}>", name);
            }
        }
    });

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let (dim, reset) = if stdout.is_terminal() {
        ("\x1b[2m", "\x1b[0m")
    } else {
        ("", "")
    };
    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("/exit") || input.eq_ignore_ascii_case("/quit") {
            break;
        }
        if input.eq_ignore_ascii_case("/new") {
            let idx = app.create_session();
            println!("started chat {}", idx);
            continue;
        }
        if input.eq_ignore_ascii_case("/help") {
            println!("available commands:\n\n/new - start a new chat\n/exit - leave (also /quit)");
            continue;
        }

        let job = match app.submit_user_message(input) {
            Ok(job) => job,
            Err(SubmitError::Empty) => continue,
            Err(e) => {
                eprintln!("chat error: {}", e);
                continue;
            }
        };
        println!("  Thinking...");
        let turn = worker.submit(job).wait().await;
        if let Some(think) = turn.think_content.as_deref().filter(|t| !t.is_empty()) {
            for l in think.lines() {
                println!("{}  ~ {}{}", dim, l, reset);
            }
        }
        println!("< {}", turn.content.trim());
        app.complete_turn(turn);
    }

    progress_task.abort();
    app.shutdown(None);
    Ok(())
}
