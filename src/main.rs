//! `workforce`: terminal front-end for the AI workforce.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ai_workforce::api::ApiClient;
use ai_workforce::auth::{AuthContext, AuthState, Gate, TokenIdentityProvider};
use ai_workforce::config::{parse_api_url, Config};
use ai_workforce::conversation::{ChatSession, SendOutcome, CONNECTIVITY_FAILURE_MESSAGE};
use ai_workforce::dashboard::Dashboard;
use ai_workforce::services::Services;
use ai_workforce::settings::SettingsStore;
use ai_workforce::store::{DocumentStore, FirestoreStore, MemoryStore};
use ai_workforce::types::{Agent, AgentRole, Task, TaskStatus, UserType};

#[derive(Parser)]
#[command(name = "workforce")]
#[command(about = "Chat with your executive secretary and manage your AI workforce")]
#[command(version)]
struct Cli {
    /// REST backend base URL
    #[arg(long, env = "WORKFORCE_API_URL")]
    api_url: Option<String>,

    /// Directory holding .workforce/settings.json
    #[arg(long, env = "WORKFORCE_HOME")]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with a Firebase ID token
    Login {
        #[arg(long, env = "WORKFORCE_ID_TOKEN", hide_env_values = true)]
        token: String,
    },

    /// Sign out and forget the saved token
    Logout,

    /// Show the signed-in user and their profile
    Whoami,

    /// Pick your role; seeds the matching starter agents
    Role {
        /// ceo, student, tutor, designer or content_creator
        user_type: UserType,
    },

    /// Show or save the backend URL used when no flag or env var is set
    Backend {
        url: Option<String>,

        /// Forget the saved URL
        #[arg(long, conflicts_with = "url")]
        clear: bool,
    },

    /// Manage agents
    Agents {
        #[command(subcommand)]
        command: AgentsCommand,
    },

    /// Inspect tasks
    Tasks {
        #[command(subcommand)]
        command: TasksCommand,
    },

    /// Agents and tasks at a glance
    Dashboard,

    /// Talk to the executive secretary (interactive without a message)
    Chat { message: Option<String> },
}

#[derive(Subcommand)]
enum AgentsCommand {
    /// List agents
    List {
        /// Only active agents
        #[arg(long)]
        active: bool,

        /// Only agents with this role
        #[arg(long)]
        role: Option<String>,
    },

    /// Activate or deactivate an agent
    Toggle {
        agent_id: String,

        #[command(flatten)]
        state: ToggleState,
    },
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct ToggleState {
    #[arg(long)]
    active: bool,

    #[arg(long)]
    inactive: bool,
}

#[derive(Subcommand)]
enum TasksCommand {
    /// List tasks
    List {
        /// pending, in_progress, completed or failed
        #[arg(long)]
        status: Option<TaskStatus>,

        /// Only tasks assigned to this agent
        #[arg(long)]
        agent: Option<String>,

        /// Newest N tasks
        #[arg(long)]
        recent: Option<usize>,
    },

    /// Count tasks per status
    Stats,
}

struct App {
    services: Services,
    auth: AuthContext,
    provider: Arc<TokenIdentityProvider>,
    settings: SettingsStore,
}

impl App {
    fn signed_in_uid(&self) -> Option<String> {
        self.auth.snapshot().user.map(|u| u.uid)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ai_workforce=info,workforce=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("Invalid configuration")?;
    let home = cli.home.clone().unwrap_or_else(|| config.home());
    let settings = SettingsStore::new(&home).await;

    let api_url = match (&cli.api_url, settings.get().await.api_url) {
        (Some(flag), _) => parse_api_url("--api-url", flag)?,
        (None, Some(saved)) => saved,
        (None, None) => config.api_url().to_string(),
    };
    tracing::debug!("Using backend {}", api_url);

    let api = ApiClient::with_timeout(&api_url, config.request_timeout);
    let services = match config.firestore() {
        Some(fs) => {
            tracing::debug!("Using Firestore project {}", fs.project_id);
            let store: Arc<dyn DocumentStore> = Arc::new(FirestoreStore::new(&fs));
            Services::new(api, store)
        }
        None => {
            let path = home.join(".workforce/store.json");
            tracing::debug!(
                "FIREBASE_PROJECT_ID not set, keeping profiles in {}",
                path.display()
            );
            let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::persistent(path));
            Services::offline(api, store)
        }
    };

    let provider = Arc::new(TokenIdentityProvider::new(settings.get().await.id_token));
    let auth = AuthContext::new(provider.clone(), services.firestore.clone());
    auth.start().await;
    auth.wait_loaded().await;

    let app = App {
        services,
        auth,
        provider,
        settings,
    };

    let result = run(&app, cli.command).await;
    app.auth.shutdown();
    result
}

async fn run(app: &App, command: Commands) -> Result<()> {
    match command {
        Commands::Login { token } => login(app, token).await,
        Commands::Logout => {
            app.auth.logout().await?;
            app.settings.set_id_token(None).await?;
            println!("Signed out.");
            Ok(())
        }
        Commands::Whoami => {
            print_session(&app.auth.snapshot());
            Ok(())
        }
        Commands::Role { user_type } => {
            if app.signed_in_uid().is_none() {
                bail!("Sign in first: workforce login --token <ID_TOKEN>");
            }
            app.auth.update_user_type(user_type).await?;
            println!("Role set to {}. Your starter agents are ready.", user_type);
            Ok(())
        }
        Commands::Backend { url, clear } => backend(app, url, clear).await,
        Commands::Agents { command } => agents(app, command).await,
        Commands::Tasks { command } => tasks(app, command).await,
        Commands::Dashboard => {
            let uid = app.signed_in_uid();
            let dashboard =
                Dashboard::load(&app.services.agents, &app.services.tasks, uid.as_deref()).await;
            print!("{}", dashboard);
            Ok(())
        }
        Commands::Chat { message } => chat(app, message).await,
    }
}

async fn login(app: &App, token: String) -> Result<()> {
    app.provider.stage_token(token).await;
    app.auth.sign_in_with_google().await?;
    app.settings
        .set_id_token(app.provider.current_token().await)
        .await
        .context("Failed to save session")?;

    let state = app.auth.snapshot();
    print_session(&state);
    if state.gate() == Gate::NeedsRole {
        println!("Next: pick your role with `workforce role <user-type>`.");
    }
    Ok(())
}

async fn backend(app: &App, url: Option<String>, clear: bool) -> Result<()> {
    if clear {
        app.settings.set_api_url(None).await?;
        println!("Saved backend cleared.");
        return Ok(());
    }
    match url {
        Some(url) => {
            let url = parse_api_url("url", &url)?;
            app.settings.set_api_url(Some(url.clone())).await?;
            println!("Saved backend: {}", url);
        }
        None => match app.settings.get().await.api_url {
            Some(url) => println!("{}", url),
            None => println!("No saved backend."),
        },
    }
    Ok(())
}

async fn agents(app: &App, command: AgentsCommand) -> Result<()> {
    let service = &app.services.agents;
    match command {
        AgentsCommand::List { active, role } => {
            let resp = match (active, role) {
                (true, role) => {
                    let mut resp = service.get_active_agents().await;
                    if let (Some(role), Some(agents)) = (role, resp.data.as_mut()) {
                        let role = AgentRole::from(role);
                        agents.retain(|a| a.role == role);
                    }
                    resp
                }
                (false, Some(role)) => service.get_agents_by_role(&AgentRole::from(role)).await,
                (false, None) => service.get_agents().await,
            };
            print_agents(&resp.into_result().context("Failed to fetch agents")?);
        }
        AgentsCommand::Toggle { agent_id, state } => {
            let agent = service
                .toggle_agent_status(&agent_id, state.active && !state.inactive)
                .await
                .into_result()
                .context("Failed to update agent")?;
            println!(
                "{} is now {}",
                agent.name,
                if agent.is_active { "active" } else { "inactive" }
            );
        }
    }
    Ok(())
}

async fn tasks(app: &App, command: TasksCommand) -> Result<()> {
    let uid = app.signed_in_uid();
    let service = app.services.tasks.for_user(uid.as_deref());
    match command {
        TasksCommand::List {
            status,
            agent,
            recent,
        } => {
            let resp = match (status, agent, recent) {
                (Some(status), _, _) => service.get_tasks_by_status(status).await,
                (None, Some(agent), _) => service.get_tasks_by_agent(&agent).await,
                (None, None, Some(n)) => service.get_recent_tasks(Some(n)).await,
                (None, None, None) => service.get_tasks(uid.as_deref()).await,
            };
            print_tasks(&resp.into_result().context("Failed to fetch tasks")?);
        }
        TasksCommand::Stats => {
            let stats = service
                .get_task_stats()
                .await
                .into_result()
                .context("Failed to fetch tasks")?;
            println!("total        {}", stats.total);
            println!("pending      {}", stats.pending);
            println!("in_progress  {}", stats.in_progress);
            println!("completed    {}", stats.completed);
            println!("failed       {}", stats.failed);
        }
    }
    Ok(())
}

async fn chat(app: &App, message: Option<String>) -> Result<()> {
    let tasks_changed = Arc::new(AtomicBool::new(false));
    let flag = tasks_changed.clone();
    let session = ChatSession::new(app.services.chat.clone()).on_task_created(Arc::new(move || {
        flag.store(true, Ordering::SeqCst);
    }));
    let user_id = app.auth.user_id();

    if let Some(message) = message {
        send_and_print(app, &session, &message, &user_id, &tasks_changed).await;
        return Ok(());
    }

    if let Some(greeting) = session.transcript().await.first() {
        println!(
            "{}: {}",
            greeting.agent_name.as_deref().unwrap_or_default(),
            greeting.text
        );
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("> ");
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if matches!(line, "exit" | "quit") {
            break;
        }
        send_and_print(app, &session, line, &user_id, &tasks_changed).await;
    }
    Ok(())
}

async fn send_and_print(
    app: &App,
    session: &ChatSession,
    message: &str,
    user_id: &str,
    tasks_changed: &AtomicBool,
) {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let outcome = session.send_with_cancel(message, user_id, &cancel).await;
    watcher.abort();

    match outcome {
        SendOutcome::Replied(reply) => {
            match &reply.action_taken {
                Some(action) => println!("{} [{}]: {}", reply.agent_name, action, reply.response),
                None => println!("{}: {}", reply.agent_name, reply.response),
            }
            if tasks_changed.swap(false, Ordering::SeqCst) {
                let uid = app.signed_in_uid();
                let recent = app
                    .services
                    .tasks
                    .for_user(uid.as_deref())
                    .get_recent_tasks(Some(5))
                    .await;
                if let Some(tasks) = recent.data {
                    println!("Recent tasks:");
                    print_tasks(&tasks);
                }
            }
        }
        SendOutcome::Failed(_) => println!("System: {}", CONNECTIVITY_FAILURE_MESSAGE),
        SendOutcome::Cancelled => println!("(cancelled)"),
        SendOutcome::Ignored => {}
    }
}

fn print_session(state: &AuthState) {
    let Some(user) = &state.user else {
        println!("Not signed in.");
        return;
    };
    println!("uid:    {}", user.uid);
    if let Some(email) = &user.email {
        println!("email:  {}", email);
    }
    if let Some(name) = &user.display_name {
        println!("name:   {}", name);
    }
    let role = state
        .profile
        .as_ref()
        .and_then(|p| p.user_type)
        .map(|t| t.to_string())
        .unwrap_or_else(|| "(not chosen)".to_string());
    println!("role:   {}", role);
    if let Some(last) = state.profile.as_ref().and_then(|p| p.last_login_at) {
        println!("login:  {}", last.format("%Y-%m-%d %H:%M UTC"));
    }
}

fn print_agents(agents: &[Agent]) {
    if agents.is_empty() {
        println!("No agents.");
        return;
    }
    println!("{:<24} {:<16} {:<8} NAME", "ID", "ROLE", "ACTIVE");
    for agent in agents {
        println!(
            "{:<24} {:<16} {:<8} {}",
            agent.id,
            agent.role.as_str(),
            if agent.is_active { "yes" } else { "no" },
            agent.name
        );
    }
}

fn print_tasks(tasks: &[Task]) {
    if tasks.is_empty() {
        println!("No tasks.");
        return;
    }
    println!("{:<24} {:<12} {:<22} DESCRIPTION", "ID", "STATUS", "AGENT");
    for task in tasks {
        println!(
            "{:<24} {:<12} {:<22} {}",
            task.id,
            task.status.as_str(),
            task.assigned_agent_id.as_deref().unwrap_or("-"),
            task.description
        );
    }
}
