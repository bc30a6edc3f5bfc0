mod console;
mod table;

use clap::Parser;
use log::{debug, info, warn};
use peer::directory::{Directory, FileDirectory};
use peer::transport::TcpConnector;
use peer::{Config, Coordinator};
use shared::{BallCommand, DoorCommand, DEFAULT_ROOT_NAME};
use std::error::Error;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use table::{Table, TableInputs};
use tokio::sync::mpsc;
use tokio::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Join as the game master instead of as a player
    #[arg(long)]
    master: bool,

    /// Directory shared by all peers on this host for name registration
    #[arg(short = 'd', long)]
    directory: Option<PathBuf>,

    /// Prefix players register under
    #[arg(short = 'r', long, default_value = DEFAULT_ROOT_NAME)]
    root_name: String,

    /// Address the RPC endpoint binds to
    #[arg(short = 'l', long, default_value = "127.0.0.1:0")]
    listen: SocketAddr,

    /// Check outbound connectivity before joining
    #[arg(long)]
    fail_fast: bool,

    /// Host the connectivity check connects to
    #[arg(long, default_value = "example.com:80")]
    preflight: String,

    /// Seconds a ball rests on the table before it is thrown on
    #[arg(long, default_value = "1.0")]
    pause: f32,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short = 'v', long)]
    verbose: bool,
}

impl Args {
    fn config(&self) -> Config {
        let defaults = Config::default();
        Config {
            root_name: self.root_name.clone(),
            directory_root: self
                .directory
                .clone()
                .unwrap_or(defaults.directory_root.clone()),
            listen_addr: self.listen,
            fail_fast: self.fail_fast,
            preflight_target: self.preflight.clone(),
            ..defaults
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let config = args.config();
    info!("Using directory {}", config.directory_root.display());
    let directory: Arc<dyn Directory> =
        Arc::new(FileDirectory::new(config.directory_root.clone()));
    let connector = Arc::new(TcpConnector::new(Arc::clone(&directory)));

    let mut coordinator = Coordinator::new(config, directory, connector);
    let doors = coordinator
        .take_door_commands()
        .ok_or("door channel already taken")?;

    if !coordinator.initialize(args.master).await? {
        coordinator.shutdown().await;
        return Err("not ready to play".into());
    }

    if args.master {
        run_master(coordinator, doors).await
    } else {
        let pause = Duration::from_secs_f32(args.pause.max(0.0));
        run_player(coordinator, doors, pause).await
    }
}

async fn run_player(
    mut coordinator: Coordinator,
    doors: mpsc::Receiver<DoorCommand>,
    pause: Duration,
) -> Result<(), Box<dyn Error>> {
    let inbound = coordinator
        .take_inbound()
        .ok_or("inbound channels already taken")?;
    let (inputs, mut exits) = TableInputs::split(inbound);
    let (ball_tx, ball_rx) = mpsc::channel::<BallCommand>(16);

    if let Err(e) = coordinator.run_prep(Some(ball_rx)).await {
        coordinator.shutdown().await;
        return Err(e.into());
    }

    let table = Table::new(coordinator.me(), pause);
    let table_handle = tokio::spawn(table.run(doors, inputs, ball_tx));

    let handle = coordinator.handle();
    let mut running = tokio::spawn(async move { coordinator.run().await });

    tokio::select! {
        result = &mut running => {
            result??;
            return Ok(());
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, leaving the game");
        }
        _ = exits.quit.recv() => {
            info!("Told to quit");
        }
        _ = exits.kick.recv() => {
            info!("Kicked out of the game");
        }
    }

    if let Err(e) = handle.no_new_balls_or_people().await {
        debug!("Drain skipped: {}", e);
    }
    if let Err(e) = handle.stop().await {
        debug!("Stop skipped: {}", e);
    }
    running.await??;
    if let Err(e) = table_handle.await {
        warn!("Table task panicked: {}", e);
    }
    Ok(())
}

async fn run_master(
    mut coordinator: Coordinator,
    mut doors: mpsc::Receiver<DoorCommand>,
) -> Result<(), Box<dyn Error>> {
    coordinator.run_prep(None).await?;

    // The master has no table, but the coordinator blocks on an unread door channel.
    tokio::spawn(async move {
        while let Some(command) = doors.recv().await {
            debug!("Master door {:?}", command);
        }
    });

    let handle = coordinator.handle();
    let mut running = tokio::spawn(async move { coordinator.run().await });

    tokio::select! {
        result = &mut running => {
            result??;
            return Ok(());
        }
        result = console::run(handle.clone()) => {
            if let Err(e) = result {
                warn!("Console stopped: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    if let Err(e) = handle.stop().await {
        debug!("Stop skipped: {}", e);
    }
    running.await??;
    Ok(())
}
