use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc::unbounded_channel;
use tracing::{error, info};
use tracing_error::ErrorLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

mod api;
mod auth;
mod columns;
mod config;
mod controller;
mod domain;
mod entities;
mod inputter;
mod model;
mod preset;
mod table;
#[cfg(test)]
mod testing;
mod ui;

use api::ApiClient;
use auth::{CredentialProvider, SessionFile, StaticCredentials};
use config::{TVConfig, expand_path};
use controller::Controller;
use domain::DieselError;
use model::{Model, Services, Status};
use ui::TableUI;

/// Terminal dashboard for the Sistema Diesel API.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Entity to open first (clientes, fornecedores, veiculos, servicos, ordens-servico)
    entity: Option<String>,

    /// Path of the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Base URL of the API proxy
    #[arg(long)]
    api: Option<String>,

    /// Company slug the data is scoped to
    #[arg(short, long)]
    empresa: Option<String>,

    /// Bearer token, overrides the stored session
    #[arg(long, requires = "user_id")]
    token: Option<String>,

    /// User id belonging to --token
    #[arg(long, requires = "token")]
    user_id: Option<i64>,

    /// Stored session file
    #[arg(long)]
    session: Option<String>,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    let result = run().await;
    ratatui::restore();
    match result {
        Err(e) => {
            error!("Exiting with error: {e}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
    }
}

fn init_tracing(config: &TVConfig) -> Result<(), DieselError> {
    if let Some(dir) = config.log_file.parent() {
        fs::create_dir_all(dir)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_file)?;
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| DieselError::Config(format!("invalid log_level: {e}")))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false),
        )
        .with(ErrorLayer::default())
        .init();
    Ok(())
}

fn apply_args(config: &mut TVConfig, args: &Args) -> Result<(), DieselError> {
    if let Some(api) = &args.api {
        config.api_base_url = api.clone();
    }
    if let Some(empresa) = &args.empresa {
        config.company_slug = empresa.clone();
    }
    if let Some(session) = &args.session {
        config.session_file = expand_path(session)?;
    }
    config.validate()
}

async fn run() -> Result<(), DieselError> {
    let args = Args::parse();
    let mut config = TVConfig::load(args.config.as_deref())?;
    apply_args(&mut config, &args)?;
    init_tracing(&config)?;
    info!("Starting diesel-tv for {}", config.company_slug);

    let entities = entities::catalogue();
    let entity = match &args.entity {
        Some(name) => entities
            .iter()
            .position(|e| e.name == name.as_str())
            .ok_or_else(|| DieselError::Config(format!("unknown entity {name:?}")))?,
        None => 0,
    };

    let credentials: Arc<dyn CredentialProvider> = match (&args.token, args.user_id) {
        (Some(token), Some(user_id)) => Arc::new(StaticCredentials::new(user_id, token.clone())),
        _ => Arc::new(SessionFile::new(config.session_file.clone())),
    };
    if !credentials.is_authenticated() {
        info!(
            "No session in {}, presets will not be loaded",
            config.session_file.display()
        );
    }
    let api = Arc::new(ApiClient::new(
        &config.api_base_url,
        &config.company_slug,
        Duration::from_secs(config.request_timeout_secs),
    )?);
    let services = Services {
        presets: api.clone(),
        entities: api,
        credentials,
    };

    let mut terminal = ratatui::init();
    let size = terminal.size()?;
    let (tx, mut rx) = unbounded_channel();
    let mut model = Model::init(
        &config,
        services,
        tx,
        entity,
        size.width as usize,
        size.height as usize,
    );
    let mut ui = TableUI::new();
    let controller = Controller::new(&config);

    while model.status != Status::QUITTING {
        // Render the current view
        terminal.draw(|f| ui.draw(&model, f))?;

        // Polling the terminal blocks for up to event_poll_time, keep the
        // worker's other tasks moving meanwhile
        let message = tokio::task::block_in_place(|| controller.handle_event(&model))?;
        model.update(message)?;

        // Apply finished background work
        while let Ok(message) = rx.try_recv() {
            model.update(Some(message))?;
        }
    }

    info!("Bye!");
    Ok(())
}
