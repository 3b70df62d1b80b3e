mod app;

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};

use engdash_api::{EntityClient, HttpExecutor};
use engdash_core::{
    config::{API_URL_ENV, Config},
    logging,
    nav::NavState,
    page::Page,
    session,
};
use engdash_entities::{EntityPage, PageConfig, kind};

use app::App;

/// engdash - terminal admin dashboard for goals, reminders, task types,
/// teams and users
#[derive(Parser, Debug)]
#[command(name = "engdash")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file (default: <config dir>/engdash/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// API base URL; wins over ENGDASH_API_URL and the config file
    #[arg(long)]
    api_url: Option<String>,

    /// Route to open on start, e.g. `goals/12` or `teams?q=platform`
    #[arg(long)]
    page: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => Config::default_path()?,
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?
        .with_overrides(std::env::var(API_URL_ENV).ok(), cli.api_url);

    let log_path = logging::init(&config.log)?;
    tracing::info!(
        api_url = %config.api_url,
        config = %config_path.display(),
        log = %log_path.display(),
        "starting engdash"
    );

    let initial = cli
        .page
        .as_deref()
        .map(str::parse::<NavState>)
        .transpose()
        .context("Invalid --page route")?;

    let conn = session::open_db()?;
    let env_token = std::env::var(session::TOKEN_ENV).ok();
    let token = session::resolve_token(&conn, env_token.clone())?;

    let pages = build_pages(&config, token)?;
    let mut app = App::new(pages, conn).with_env_token(env_token);
    if let Some(nav) = initial {
        app.navigate_to(nav);
    }

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    match &result {
        Ok(()) => tracing::info!(route = ?app.current_route(), "exiting"),
        Err(err) => {
            tracing::error!(error = ?err, "event loop failed");
            eprintln!("Error: {err:?}");
        }
    }

    Ok(())
}

/// One page per entity kind, each with its own request executor.
fn build_pages(config: &Config, token: Option<String>) -> Result<Vec<Box<dyn Page>>> {
    let timeout = Duration::from_secs(config.request_timeout_secs);
    let page_config = PageConfig {
        page_size: config.page_size,
        expand_all: config.expand_all,
    };

    kind::all()
        .into_iter()
        .map(|kind| {
            let client = EntityClient::new(&config.api_url, timeout, token.clone())
                .context("Failed to build HTTP client")?;
            let executor = HttpExecutor::spawn(client);
            let page: Box<dyn Page> = Box::new(EntityPage::new(kind, page_config, Box::new(executor)));
            Ok(page)
        })
        .collect()
}

fn run_app(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> Result<()> {
    const TICK_RATE: Duration = Duration::from_millis(50);

    loop {
        terminal.draw(|frame| {
            app.render(frame);
        })?;

        if app.should_quit {
            return Ok(());
        }

        // Poll with timeout so pages can drain finished requests
        if event::poll(TICK_RATE)? {
            let ev = event::read()?;
            app.handle_event(ev);
        }

        app.tick();
    }
}
