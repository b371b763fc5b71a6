mod catalog;
mod config;
mod executor;
mod gamepad;
mod grid;
mod input;
mod manifest;
mod model;
mod sources;
mod state;
mod ui;

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use calloop::timer::{TimeoutAction, Timer};
use calloop::EventLoop;
use calloop_wayland_source::WaylandSource;
use clap::Parser;
use log::{error, info};
use wayland_client::{Connection, globals::registry_queue_init};
use crate::config::{load_config, load_launch_address};
use crate::gamepad::{Gamepad, PadMapping};
use crate::sources::games::GameDirSource;
use crate::state::Session;
use crate::ui::wayland::WaylandApp;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file to use instead of the per-user one
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding one sub-directory per game
    #[arg(short, long)]
    games: Option<PathBuf>,

    /// Log file, appended to
    #[arg(short, long)]
    log_file: Option<PathBuf>,
}

fn init_logging(path: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {}", path.display()))?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .format(|buf, record| writeln!(buf, "[{}]{}", record.level(), record.args()))
        .init();
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref())?;
    if let Some(games) = args.games {
        config.general.games_dir = games;
    }

    let log_path = args.log_file.unwrap_or_else(|| config.general.log_file.clone());
    init_logging(&log_path)?;
    info!("booth {} starting, games in {}", env!("CARGO_PKG_VERSION"), config.general.games_dir.display());

    let launch_args: Vec<String> = load_launch_address(&config.general.address_file).into_iter().collect();
    if let Some(address) = launch_args.first() {
        info!("Games will be started with {}", address);
    }

    let source = GameDirSource::new(
        &config.general.games_dir,
        config.general.manifest_name.as_str(),
        &config.general.skip_dirs,
    );
    let gamepad = Gamepad::new(&config.input.gamepad_device, PadMapping::from(&config.input));
    let frame = Duration::from_secs(1) / config.input.frame_rate;
    let theme = config.theme.clone();
    let session = Session::new(config, Box::new(source), launch_args);

    let mut event_loop: EventLoop<WaylandApp> = EventLoop::try_new()?;
    let conn = Connection::connect_to_env().context("connecting to the Wayland compositor")?;
    let (globals, event_queue) = registry_queue_init::<WaylandApp>(&conn)?;
    let qh = event_queue.handle();

    let mut app = WaylandApp::new(&conn, &globals, &qh, session, gamepad, &theme)?;
    app.screen.open();

    event_loop
        .handle()
        .insert_source(WaylandSource::new(conn.clone(), event_queue), |_, queue, app| {
            queue.dispatch_pending(app)
        })
        .map_err(|e| anyhow::anyhow!("inserting the Wayland source: {}", e.error))?;

    event_loop
        .handle()
        .insert_source(Timer::from_duration(frame), move |_, _, app: &mut WaylandApp| {
            app.tick();
            TimeoutAction::ToDuration(frame)
        })
        .map_err(|e| anyhow::anyhow!("inserting the frame timer: {}", e.error))?;

    while !app.should_exit {
        event_loop.dispatch(None, &mut app)?;
    }

    if let Some(e) = app.fatal.take() {
        error!("Fatal: {:#}", e);
        return Err(e);
    }
    info!("booth exiting");
    Ok(())
}
