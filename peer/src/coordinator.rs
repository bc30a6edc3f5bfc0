//! The per-process peer coordinator
//!
//! A [`Coordinator`] owns the roster and the door state, and [`Coordinator::run`]
//! is the only place either is mutated. Everything else talks to the loop
//! through channels:
//!
//! - membership events queued by the [`Relay`] (inbound Recognize/Forget) and
//!   by the master's discovery poller,
//! - ball throw requests from the local simulation,
//! - stop and drain requests, each acknowledged once the loop has finished
//!   handling them,
//! - control-plane commands (broadcasts, fire-ball, list) with a one-shot
//!   reply.
//!
//! Door notifications go out over a bounded channel and the loop awaits each
//! send, so a consumer that stops reading stalls the coordinator. The
//! receiver from [`Coordinator::take_door_commands`] must be drained.
//!
//! Fatal errors end the loop: `run` performs the stop sequence and returns
//! the error for the caller to terminate on.

use crate::broadcast::{broadcast, Broadcast};
use crate::config::Config;
use crate::directory::Directory;
use crate::discovery::{discover_existing_peers, next_player_id, spawn_poller};
use crate::doors::Doors;
use crate::endpoint::Endpoint;
use crate::error::PeerError;
use crate::handoff::{fire_ball, throw_ball};
use crate::membership::{announce, withdraw};
use crate::relay::{Inbound, MembershipEvents, Relay};
use crate::roster::{Recognized, Roster};
use crate::transport::{Connector, PeerClient};
use log::{debug, error, info, warn};
use shared::{
    server_name, BallCommand, DoorCommand, MasterCommand, Peer, FIRE_BALL_SPACING_MS,
    FIRST_PLAYER_ID, MASTER_ID,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    NotRunning,
    Initializing,
    Running,
    Draining,
    Stopped,
}

/// Control-plane requests served by the event loop.
#[derive(Debug)]
enum Control {
    Broadcast(Broadcast, oneshot::Sender<usize>),
    FireBall(usize, oneshot::Sender<usize>),
    List(oneshot::Sender<Vec<Peer>>),
}

/// Cloneable way to talk to a running coordinator.
///
/// Every method waits for the loop to finish the request. If the loop has
/// ended, or ends while handling the request, [`PeerError::NotRunning`] is
/// returned.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    stop_tx: mpsc::Sender<oneshot::Sender<()>>,
    drain_tx: mpsc::Sender<oneshot::Sender<()>>,
    control_tx: mpsc::Sender<Control>,
}

async fn handshake(tx: &mpsc::Sender<oneshot::Sender<()>>) -> Result<(), PeerError> {
    let (ack_tx, ack_rx) = oneshot::channel();
    tx.send(ack_tx).await.map_err(|_| PeerError::NotRunning)?;
    ack_rx.await.map_err(|_| PeerError::NotRunning)
}

impl CoordinatorHandle {
    /// Halts the loop, unregisters and releases the endpoint.
    pub async fn stop(&self) -> Result<(), PeerError> {
        handshake(&self.stop_tx).await
    }

    /// Stops accepting inbound balls and people, and says goodbye to the roster.
    pub async fn no_new_balls_or_people(&self) -> Result<(), PeerError> {
        handshake(&self.drain_tx).await
    }

    async fn control<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Control,
    ) -> Result<T, PeerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.control_tx
            .send(build(reply_tx))
            .await
            .map_err(|_| PeerError::NotRunning)?;
        reply_rx.await.map_err(|_| PeerError::NotRunning)
    }

    async fn broadcast(&self, command: Broadcast) -> Result<usize, PeerError> {
        self.control(|reply| Control::Broadcast(command, reply)).await
    }

    pub async fn set_pause_duration(&self, seconds: f32) -> Result<usize, PeerError> {
        self.broadcast(Broadcast::SetPauseDuration(seconds)).await
    }

    pub async fn set_gravity(&self, gravity: f32) -> Result<usize, PeerError> {
        self.broadcast(Broadcast::SetGravity(gravity)).await
    }

    pub async fn do_master_command(&self, name: &str) -> Result<usize, PeerError> {
        self.broadcast(Broadcast::DoMasterCommand(MasterCommand::new(name)))
            .await
    }

    pub async fn kick(&self) -> Result<usize, PeerError> {
        self.broadcast(Broadcast::Kick).await
    }

    /// Tells the player with `id` to quit.
    pub async fn quit(&self, id: u32) -> Result<usize, PeerError> {
        self.broadcast(Broadcast::Quit(id)).await
    }

    /// Sends `count` rounds of fresh balls to every known player.
    pub async fn fire_ball(&self, count: usize) -> Result<usize, PeerError> {
        self.control(|reply| Control::FireBall(count, reply)).await
    }

    pub async fn list(&self) -> Result<Vec<Peer>, PeerError> {
        self.control(Control::List).await
    }
}

async fn next_ball_command(
    commands: &mut Option<mpsc::Receiver<BallCommand>>,
) -> Option<BallCommand> {
    match commands {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Checks outbound connectivity before joining.
async fn preflight(target: &str, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, TcpStream::connect(target)).await {
        Ok(Ok(_)) => {
            info!("Network up - able to reach {}", target);
            true
        }
        Ok(Err(e)) => {
            warn!("Something wrong with network: {}", e);
            false
        }
        Err(_) => {
            warn!("Something wrong with network: {} unreachable after {:?}", target, timeout);
            false
        }
    }
}

pub struct Coordinator {
    config: Config,
    directory: Arc<dyn Directory>,
    connector: Arc<dyn Connector>,
    lifecycle: Lifecycle,
    is_master: bool,
    myself: Peer,
    roster: Roster<PeerClient>,
    doors: Doors,
    initial_ids: Vec<u32>,

    relay: Arc<Relay>,
    events: MembershipEvents,
    inbound: Option<Inbound>,
    endpoint: Option<Endpoint>,
    registered_name: Option<String>,
    poller: Option<JoinHandle<()>>,

    ball_commands: Option<mpsc::Receiver<BallCommand>>,
    door_tx: Option<mpsc::Sender<DoorCommand>>,
    door_rx: Option<mpsc::Receiver<DoorCommand>>,
    stop_tx: mpsc::Sender<oneshot::Sender<()>>,
    stop_rx: mpsc::Receiver<oneshot::Sender<()>>,
    drain_tx: mpsc::Sender<oneshot::Sender<()>>,
    drain_rx: mpsc::Receiver<oneshot::Sender<()>>,
    control_tx: mpsc::Sender<Control>,
    control_rx: mpsc::Receiver<Control>,
}

impl Coordinator {
    pub fn new(
        config: Config,
        directory: Arc<dyn Directory>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let (relay, events, inbound) = Relay::new();
        let (door_tx, door_rx) = mpsc::channel(config.door_buffer.max(1));
        let (stop_tx, stop_rx) = mpsc::channel(1);
        let (drain_tx, drain_rx) = mpsc::channel(1);
        let (control_tx, control_rx) = mpsc::channel(16);

        Self {
            config,
            directory,
            connector,
            lifecycle: Lifecycle::NotRunning,
            is_master: false,
            myself: Peer::new(FIRST_PLAYER_ID),
            roster: Roster::new(),
            doors: Doors::new(),
            initial_ids: Vec::new(),
            relay: Arc::new(relay),
            events,
            inbound: Some(inbound),
            endpoint: None,
            registered_name: None,
            poller: None,
            ball_commands: None,
            door_tx: Some(door_tx),
            door_rx: Some(door_rx),
            stop_tx,
            stop_rx,
            drain_tx,
            drain_rx,
            control_tx,
            control_rx,
        }
    }

    /// The local peer. Meaningful once [`Coordinator::initialize`] has run.
    pub fn me(&self) -> Peer {
        self.myself
    }

    pub fn is_master(&self) -> bool {
        self.is_master
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn doors(&self) -> Doors {
        self.doors
    }

    pub fn roster_ids(&self) -> Vec<u32> {
        self.roster.ids()
    }

    pub fn relay(&self) -> Arc<Relay> {
        Arc::clone(&self.relay)
    }

    /// Address of the RPC endpoint, if one is serving.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.endpoint.as_ref().map(Endpoint::local_addr)
    }

    pub fn handle(&self) -> CoordinatorHandle {
        CoordinatorHandle {
            stop_tx: self.stop_tx.clone(),
            drain_tx: self.drain_tx.clone(),
            control_tx: self.control_tx.clone(),
        }
    }

    pub fn take_door_commands(&mut self) -> Option<mpsc::Receiver<DoorCommand>> {
        self.door_rx.take()
    }

    pub fn take_inbound(&mut self) -> Option<Inbound> {
        self.inbound.take()
    }

    /// Finds the existing players, picks the local id and, unless acting as
    /// master, starts the endpoint and registers it.
    ///
    /// Returns `Ok(false)` when the pre-flight check is enabled and fails.
    /// A registration failure is fatal.
    pub async fn initialize(&mut self, is_master: bool) -> Result<bool, PeerError> {
        self.lifecycle = Lifecycle::Initializing;
        if self.config.fail_fast
            && !preflight(&self.config.preflight_target, self.config.preflight_timeout).await
        {
            self.lifecycle = Lifecycle::NotRunning;
            return Ok(false);
        }
        self.is_master = is_master;

        self.initial_ids = discover_existing_peers(
            self.directory.as_ref(),
            &self.config.root_name,
            self.config.discovery_timeout,
        )
        .await;
        info!(
            "Found {} players matching {}",
            self.initial_ids.len(),
            self.config.lookup_pattern()
        );

        let my_id = if is_master {
            MASTER_ID
        } else {
            next_player_id(&self.initial_ids)?
        };
        self.myself = Peer::new(my_id);

        if is_master {
            info!("I am game master");
            return Ok(true);
        }
        info!("I am player {}", self.myself);

        let endpoint = Endpoint::serve(self.config.listen_addr, Arc::clone(&self.relay))
            .await
            .map_err(PeerError::Endpoint)?;
        let name = server_name(&self.config.root_name, my_id);
        info!("Calling myself {}", name);

        if let Err(source) = self.directory.register(&name, endpoint.local_addr()).await {
            endpoint.shutdown();
            return Err(PeerError::Registration { name, source });
        }
        self.endpoint = Some(endpoint);
        self.registered_name = Some(name);
        Ok(true)
    }

    /// Seeds the roster from discovery and, unless master, says hello to
    /// everyone found. Door state is not computed until [`Coordinator::run`].
    pub async fn run_prep(
        &mut self,
        ball_commands: Option<mpsc::Receiver<BallCommand>>,
    ) -> Result<(), PeerError> {
        info!("Final prep of coordinator");
        if self.is_master && ball_commands.is_some() {
            return Err(PeerError::MasterWithBalls);
        }
        self.ball_commands = ball_commands;

        for id in self.initial_ids.clone() {
            self.recognize(Peer::new(id)).await?;
        }
        info!("I see {} players", self.roster.len());

        if !self.is_master {
            announce(self.myself, &self.roster).await?;
        }
        self.lifecycle = Lifecycle::Running;
        Ok(())
    }

    /// Runs the event loop until a stop request is handled or a fatal error
    /// occurs.
    pub async fn run(&mut self) -> Result<(), PeerError> {
        if self.lifecycle == Lifecycle::Stopped {
            return Err(PeerError::NotRunning);
        }
        if self.lifecycle != Lifecycle::Draining {
            self.lifecycle = Lifecycle::Running;
        }
        info!("Starting coordinator loop as {}", self.myself);

        let result = self.run_loop().await;
        if let Err(e) = &result {
            error!("Coordinator failed: {}", e);
            self.stop().await;
        }
        result
    }

    async fn run_loop(&mut self) -> Result<(), PeerError> {
        self.check_doors().await?;

        if self.is_master {
            if let Some(interval) = self.config.poll_interval {
                let (recognize_tx, forget_tx) = self.relay.membership_senders();
                self.poller = Some(spawn_poller(
                    Arc::clone(&self.directory),
                    self.config.root_name.clone(),
                    interval,
                    self.config.discovery_timeout,
                    self.roster.ids(),
                    recognize_tx,
                    forget_tx,
                ));
            }
        }

        loop {
            tokio::select! {
                Some(ack) = self.stop_rx.recv() => {
                    self.stop().await;
                    let _ = ack.send(());
                    return Ok(());
                },

                Some(ack) = self.drain_rx.recv() => {
                    self.no_new_balls_or_people().await;
                    let _ = ack.send(());
                },

                Some(control) = self.control_rx.recv() => {
                    self.handle_control(control).await?;
                },

                command = next_ball_command(&mut self.ball_commands) => {
                    match command {
                        Some(command) => {
                            throw_ball(&self.roster, self.myself, &command).await?;
                        }
                        None => {
                            info!("Ball command channel closed");
                            self.ball_commands = None;
                        }
                    }
                },

                Some(peer) = self.events.recognize.recv() => {
                    self.recognize(peer).await?;
                },

                Some(peer) = self.events.forget.recv() => {
                    self.forget(peer).await?;
                },
            }
        }
    }

    fn is_running(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Running | Lifecycle::Draining)
    }

    async fn recognize(&mut self, peer: Peer) -> Result<(), PeerError> {
        if peer == self.myself {
            warn!("Asked to recognize myself ({}); ignoring", peer);
            return Ok(());
        }

        let name = server_name(&self.config.root_name, peer.id);
        let client = PeerClient::new(name.clone(), self.connector.connect(&name));
        match self.roster.recognize(peer, client) {
            Recognized::Inserted(_) => info!("{} recognizes {}", self.myself, peer),
            Recognized::Replaced(_) => warn!("{} already known; replaced its handle", peer),
        }

        if self.is_running() {
            self.check_doors().await
        } else {
            debug!("Not running, so not checking doors after recognizing {}", peer);
            Ok(())
        }
    }

    async fn forget(&mut self, peer: Peer) -> Result<(), PeerError> {
        if self.roster.forget(peer) {
            info!("{} forgetting {}", self.myself, peer);
        } else {
            info!("Asked to forget {}, but don't know them", peer);
        }
        self.check_doors().await
    }

    async fn check_doors(&mut self) -> Result<(), PeerError> {
        let changes = self.doors.reconcile(self.myself.id, &self.roster.ids());
        for command in changes {
            self.emit_door(command).await?;
        }
        debug!(
            "Current players: {}",
            self.roster
                .lineup(self.myself, self.doors.left(), self.doors.right())
        );
        Ok(())
    }

    async fn emit_door(&self, command: DoorCommand) -> Result<(), PeerError> {
        let door_tx = self.door_tx.as_ref().ok_or(PeerError::DoorChannelClosed)?;
        debug!("Sending door command {:?}", command);
        door_tx
            .send(command)
            .await
            .map_err(|_| PeerError::DoorChannelClosed)?;
        // The channel is buffered, so this only means the command is queued.
        debug!("Door command {:?} queued", command);
        Ok(())
    }

    async fn handle_control(&mut self, control: Control) -> Result<(), PeerError> {
        match control {
            Control::Broadcast(command, reply) => {
                let reached = broadcast(&self.roster, &command).await?;
                let _ = reply.send(reached);
            }
            Control::FireBall(count, reply) => {
                let spacing = Duration::from_millis(FIRE_BALL_SPACING_MS);
                let sent = fire_ball(&self.roster, count, spacing).await?;
                let _ = reply.send(sent);
            }
            Control::List(reply) => {
                for member in self.roster.iter() {
                    info!("{} at {}", member.peer, member.handle.name());
                }
                let _ = reply.send(self.roster.peers());
            }
        }
        Ok(())
    }

    async fn no_new_balls_or_people(&mut self) {
        if self.lifecycle != Lifecycle::Running {
            debug!("Already {:?}; not draining again", self.lifecycle);
            return;
        }
        info!("No new balls or people");
        self.relay.stop_accepting();
        let failures = withdraw(self.myself, &self.roster).await;
        if failures > 0 {
            warn!("{} players could not be told goodbye", failures);
        }
        self.lifecycle = Lifecycle::Draining;
    }

    async fn stop(&mut self) {
        info!("Stopping coordinator");
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
        if let Some(name) = self.registered_name.take() {
            if let Err(e) = self.directory.unregister(&name).await {
                warn!("Failed to unregister {}: {}", name, e);
            }
        }
        if let Some(endpoint) = self.endpoint.take() {
            endpoint.shutdown();
        }
        debug!("Closing door command channel");
        self.door_tx = None;
        self.lifecycle = Lifecycle::Stopped;
    }

    /// Releases everything without a running loop. Use [`CoordinatorHandle::stop`]
    /// once [`Coordinator::run`] has started.
    pub async fn shutdown(mut self) {
        self.stop().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::MemoryDirectory;
    use crate::testing::{RecordingConnector, ROOT};
    use shared::{Ball, Direction, DoorState, Request, Vec2};
    use tokio_test::{assert_err, assert_ok};

    fn config() -> Config {
        Config {
            root_name: ROOT.to_string(),
            poll_interval: None,
            ..Config::default()
        }
    }

    async fn directory_with(ids: &[u32]) -> MemoryDirectory {
        let directory = MemoryDirectory::new();
        for id in ids {
            directory
                .register(&server_name(ROOT, *id), "127.0.0.1:9".parse().unwrap())
                .await
                .unwrap();
        }
        directory
    }

    fn coordinator(directory: &MemoryDirectory, connector: &RecordingConnector) -> Coordinator {
        Coordinator::new(
            config(),
            Arc::new(directory.clone()),
            Arc::new(connector.clone()),
        )
    }

    fn spawn_run(
        mut coordinator: Coordinator,
    ) -> JoinHandle<(Coordinator, Result<(), PeerError>)> {
        tokio::spawn(async move {
            let result = coordinator.run().await;
            (coordinator, result)
        })
    }

    /// The loop serves its channels in no fixed order, so wait for queued
    /// membership events to land before asserting on the roster.
    async fn wait_for_members(handle: &CoordinatorHandle, count: usize) -> Vec<Peer> {
        loop {
            let peers = handle.list().await.unwrap();
            if peers.len() == count {
                return peers;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    async fn wait_for_calls(connector: &RecordingConnector, count: usize) {
        while connector.calls().len() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    async fn drain_doors(mut rx: mpsc::Receiver<DoorCommand>) -> Vec<DoorCommand> {
        let mut seen = Vec::new();
        while let Some(command) = rx.recv().await {
            seen.push(command);
        }
        seen
    }

    #[tokio::test]
    async fn test_initialize_picks_next_id_and_registers() {
        let directory = directory_with(&[1, 3]).await;
        let connector = RecordingConnector::new();
        let mut coordinator = coordinator(&directory, &connector);

        assert!(coordinator.initialize(false).await.unwrap());

        assert_eq!(coordinator.me(), Peer::new(4));
        assert_eq!(coordinator.lifecycle(), Lifecycle::Initializing);
        let addr = coordinator.local_addr().unwrap();
        assert_eq!(
            directory.resolve(&server_name(ROOT, 4)).await.unwrap(),
            Some(addr)
        );
        coordinator.shutdown().await;
        assert_eq!(directory.resolve(&server_name(ROOT, 4)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_first_player_gets_first_id() {
        let directory = MemoryDirectory::new();
        let mut coordinator = coordinator(&directory, &RecordingConnector::new());
        assert!(coordinator.initialize(false).await.unwrap());
        assert_eq!(coordinator.me(), Peer::new(FIRST_PLAYER_ID));
        coordinator.shutdown().await;
    }

    #[tokio::test]
    async fn test_stray_name_does_not_pick_id() {
        let directory = directory_with(&[2]).await;
        directory
            .register("test/player4294967295", "127.0.0.1:9".parse().unwrap())
            .await
            .unwrap();
        let mut coordinator = coordinator(&directory, &RecordingConnector::new());

        assert!(coordinator.initialize(false).await.unwrap());
        assert_eq!(coordinator.me(), Peer::new(3));
        coordinator.shutdown().await;
    }

    #[tokio::test]
    async fn test_no_player_id_left_is_fatal() {
        let directory = directory_with(&[MASTER_ID - 1]).await;
        let mut coordinator = coordinator(&directory, &RecordingConnector::new());

        let err = assert_err!(coordinator.initialize(false).await);
        assert!(matches!(err, PeerError::IdsExhausted(id) if id == MASTER_ID - 1));
        assert!(err.is_fatal());
        assert_eq!(directory.len().await, 1);
    }

    #[tokio::test]
    async fn test_master_does_not_register() {
        let directory = directory_with(&[2]).await;
        let mut coordinator = coordinator(&directory, &RecordingConnector::new());

        assert!(coordinator.initialize(true).await.unwrap());

        assert_eq!(coordinator.me(), Peer::new(MASTER_ID));
        assert!(coordinator.is_master());
        assert!(coordinator.local_addr().is_none());
        assert_eq!(directory.len().await, 1);
    }

    #[tokio::test]
    async fn test_failed_preflight_is_not_ready() {
        let directory = MemoryDirectory::new();
        let mut coordinator = Coordinator::new(
            Config {
                fail_fast: true,
                preflight_target: "127.0.0.1:1".to_string(),
                preflight_timeout: Duration::from_secs(2),
                ..config()
            },
            Arc::new(directory.clone()),
            Arc::new(RecordingConnector::new()),
        );

        assert!(!coordinator.initialize(false).await.unwrap());
        assert_eq!(coordinator.lifecycle(), Lifecycle::NotRunning);
        assert_eq!(directory.len().await, 0);
    }

    #[tokio::test]
    async fn test_master_with_ball_channel_is_fatal() {
        let directory = MemoryDirectory::new();
        let mut coordinator = coordinator(&directory, &RecordingConnector::new());
        coordinator.initialize(true).await.unwrap();

        let (_tx, rx) = mpsc::channel(1);
        let err = assert_err!(coordinator.run_prep(Some(rx)).await);
        assert!(matches!(err, PeerError::MasterWithBalls));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_deferred_doors_computed_once_on_run() {
        let directory = directory_with(&[1, 3]).await;
        let connector = RecordingConnector::new();
        let mut coordinator = coordinator(&directory, &connector);
        let door_rx = coordinator.take_door_commands().unwrap();

        coordinator.initialize(false).await.unwrap();
        coordinator.run_prep(None).await.unwrap();

        assert_eq!(coordinator.roster_ids(), vec![1, 3]);
        assert_eq!(coordinator.doors(), Doors::new());
        assert_eq!(connector.methods_to(1), vec!["Recognize"]);
        assert_eq!(connector.methods_to(3), vec!["Recognize"]);

        let handle = coordinator.handle();
        let running = spawn_run(coordinator);
        assert_ok!(handle.stop().await);

        let doors = drain_doors(door_rx).await;
        assert_eq!(
            doors,
            vec![DoorCommand::new(DoorState::Open, Direction::Left)]
        );
        let (coordinator, result) = running.await.unwrap();
        assert_ok!(result);
        assert_eq!(coordinator.lifecycle(), Lifecycle::Stopped);
    }

    #[tokio::test]
    async fn test_announce_failure_aborts_prep() {
        let directory = directory_with(&[1, 2]).await;
        let connector = RecordingConnector::new();
        connector.make_unreachable(2);
        let mut coordinator = coordinator(&directory, &connector);

        coordinator.initialize(false).await.unwrap();
        let err = assert_err!(coordinator.run_prep(None).await);
        assert!(err.is_fatal());
        coordinator.shutdown().await;
    }

    #[tokio::test]
    async fn test_recognize_of_own_id_is_ignored() {
        let directory = MemoryDirectory::new();
        let connector = RecordingConnector::new();
        let mut coordinator = coordinator(&directory, &connector);
        let mut door_rx = coordinator.take_door_commands().unwrap();
        coordinator.initialize(false).await.unwrap();
        coordinator.run_prep(None).await.unwrap();

        let relay = coordinator.relay();
        let handle = coordinator.handle();
        let running = spawn_run(coordinator);

        relay.handle(Request::Recognize { peer: Peer::new(1) });
        relay.handle(Request::Recognize { peer: Peer::new(2) });
        assert_eq!(
            door_rx.recv().await,
            Some(DoorCommand::new(DoorState::Open, Direction::Right))
        );
        assert_eq!(wait_for_members(&handle, 1).await, vec![Peer::new(2)]);

        handle.stop().await.unwrap();
        assert_eq!(door_rx.recv().await, None);
        assert_ok!(running.await.unwrap().1);
    }

    #[tokio::test]
    async fn test_inbound_recognize_then_forget() {
        let directory = MemoryDirectory::new();
        let connector = RecordingConnector::new();
        let mut coordinator = coordinator(&directory, &connector);
        let mut door_rx = coordinator.take_door_commands().unwrap();
        coordinator.initialize(false).await.unwrap();
        coordinator.run_prep(None).await.unwrap();

        let relay = coordinator.relay();
        let handle = coordinator.handle();
        let running = spawn_run(coordinator);

        relay.handle(Request::Recognize { peer: Peer::new(5) });
        assert_eq!(
            door_rx.recv().await,
            Some(DoorCommand::new(DoorState::Open, Direction::Right))
        );
        assert_eq!(handle.list().await.unwrap(), vec![Peer::new(5)]);

        relay.handle(Request::Forget { peer: Peer::new(5) });
        assert_eq!(
            door_rx.recv().await,
            Some(DoorCommand::new(DoorState::Closed, Direction::Right))
        );

        handle.stop().await.unwrap();
        assert_eq!(door_rx.recv().await, None);
        let (coordinator, _) = running.await.unwrap();
        assert!(coordinator.roster_ids().is_empty());
        assert_eq!(coordinator.doors(), Doors::new());
    }

    #[tokio::test]
    async fn test_throw_without_neighbor_is_fatal() {
        let directory = MemoryDirectory::new();
        let connector = RecordingConnector::new();
        let mut coordinator = coordinator(&directory, &connector);
        tokio::spawn(drain_doors(coordinator.take_door_commands().unwrap()));

        coordinator.initialize(false).await.unwrap();
        let (ball_tx, ball_rx) = mpsc::channel(4);
        coordinator.run_prep(Some(ball_rx)).await.unwrap();
        let running = spawn_run(coordinator);

        let ball = Ball::new(Peer::new(1), Vec2::new(0.0, 0.5), Vec2::new(-1.0, 0.0));
        ball_tx
            .send(BallCommand::new(Direction::Left, ball))
            .await
            .unwrap();

        let (coordinator, result) = running.await.unwrap();
        assert!(matches!(result, Err(PeerError::NoNeighbor(Direction::Left))));
        assert_eq!(coordinator.lifecycle(), Lifecycle::Stopped);
        assert!(connector.calls().is_empty());
        assert_eq!(directory.len().await, 0);
    }

    #[tokio::test]
    async fn test_throw_to_neighbor() {
        let directory = directory_with(&[3]).await;
        let connector = RecordingConnector::new();
        let mut coordinator = coordinator(&directory, &connector);
        tokio::spawn(drain_doors(coordinator.take_door_commands().unwrap()));

        coordinator.initialize(false).await.unwrap();
        let (ball_tx, ball_rx) = mpsc::channel(4);
        coordinator.run_prep(Some(ball_rx)).await.unwrap();
        let handle = coordinator.handle();
        let running = spawn_run(coordinator);

        let ball = Ball::new(Peer::new(4), Vec2::new(0.0, 0.5), Vec2::new(-1.0, 0.0));
        ball_tx
            .send(BallCommand::new(Direction::Left, ball))
            .await
            .unwrap();
        wait_for_calls(&connector, 2).await;

        assert_eq!(connector.methods_to(3), vec!["Recognize", "Accept"]);
        handle.stop().await.unwrap();
        assert_ok!(running.await.unwrap().1);
    }

    #[tokio::test]
    async fn test_broadcasts_through_handle() {
        let directory = MemoryDirectory::new();
        let connector = RecordingConnector::new();
        let mut coordinator = coordinator(&directory, &connector);
        tokio::spawn(drain_doors(coordinator.take_door_commands().unwrap()));
        coordinator.initialize(true).await.unwrap();
        coordinator.run_prep(None).await.unwrap();

        let relay = coordinator.relay();
        let handle = coordinator.handle();
        let running = spawn_run(coordinator);

        relay.handle(Request::Recognize { peer: Peer::new(1) });
        relay.handle(Request::Recognize { peer: Peer::new(2) });
        wait_for_members(&handle, 2).await;

        assert_eq!(handle.set_gravity(3.0).await.unwrap(), 2);
        assert_eq!(handle.set_pause_duration(0.2).await.unwrap(), 2);
        assert_eq!(handle.do_master_command("reset").await.unwrap(), 2);
        assert_eq!(handle.quit(2).await.unwrap(), 1);

        assert_eq!(
            connector.methods_to(2),
            vec!["SetGravity", "SetPauseDuration", "DoMasterCommand", "Quit"]
        );

        handle.stop().await.unwrap();
        assert_ok!(running.await.unwrap().1);
    }

    #[tokio::test]
    async fn test_broadcast_failure_ends_loop() {
        let directory = MemoryDirectory::new();
        let connector = RecordingConnector::new();
        connector.make_unreachable(1);
        let mut coordinator = coordinator(&directory, &connector);
        tokio::spawn(drain_doors(coordinator.take_door_commands().unwrap()));
        coordinator.initialize(true).await.unwrap();
        coordinator.run_prep(None).await.unwrap();

        let relay = coordinator.relay();
        let handle = coordinator.handle();
        let running = spawn_run(coordinator);
        relay.handle(Request::Recognize { peer: Peer::new(1) });
        wait_for_members(&handle, 1).await;

        let err = assert_err!(handle.kick().await);
        assert!(matches!(err, PeerError::NotRunning));

        let (_, result) = running.await.unwrap();
        let err = result.unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, PeerError::Rpc { method: "Kick", .. }));
    }

    #[tokio::test]
    async fn test_drain_says_goodbye_and_stops_accepting() {
        let directory = directory_with(&[1, 2]).await;
        let connector = RecordingConnector::new();
        connector.make_unreachable(1);
        let mut coordinator = coordinator(&directory, &connector);
        tokio::spawn(drain_doors(coordinator.take_door_commands().unwrap()));
        coordinator.initialize(false).await.unwrap();

        // Player 1 is unreachable, so announce to a roster of just player 2.
        coordinator.initial_ids = vec![2];
        coordinator.run_prep(None).await.unwrap();
        let relay = coordinator.relay();
        let handle = coordinator.handle();
        let running = spawn_run(coordinator);

        relay.handle(Request::Recognize { peer: Peer::new(1) });
        wait_for_members(&handle, 2).await;

        handle.no_new_balls_or_people().await.unwrap();
        assert!(!relay.is_accepting());
        assert_eq!(connector.methods_to(2), vec!["Recognize", "Forget"]);

        handle.no_new_balls_or_people().await.unwrap();
        assert_eq!(connector.methods_to(2), vec!["Recognize", "Forget"]);

        relay.handle(Request::Recognize { peer: Peer::new(7) });
        let peers = handle.list().await.unwrap();
        assert_eq!(peers, vec![Peer::new(1), Peer::new(2)]);

        handle.stop().await.unwrap();
        let (coordinator, result) = running.await.unwrap();
        assert_ok!(result);
        assert_eq!(coordinator.lifecycle(), Lifecycle::Stopped);
        assert_eq!(directory.resolve(&server_name(ROOT, 3)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_forget_while_draining_closes_door() {
        let directory = MemoryDirectory::new();
        let connector = RecordingConnector::new();
        let mut coordinator = coordinator(&directory, &connector);
        let mut door_rx = coordinator.take_door_commands().unwrap();
        coordinator.initialize(false).await.unwrap();
        coordinator.run_prep(None).await.unwrap();

        let relay = coordinator.relay();
        let handle = coordinator.handle();
        let running = spawn_run(coordinator);

        relay.handle(Request::Recognize { peer: Peer::new(2) });
        assert_eq!(
            door_rx.recv().await,
            Some(DoorCommand::new(DoorState::Open, Direction::Right))
        );

        handle.no_new_balls_or_people().await.unwrap();
        relay.handle(Request::Forget { peer: Peer::new(2) });
        assert_eq!(
            door_rx.recv().await,
            Some(DoorCommand::new(DoorState::Closed, Direction::Right))
        );
        assert!(handle.list().await.unwrap().is_empty());

        handle.stop().await.unwrap();
        let (coordinator, result) = running.await.unwrap();
        assert_ok!(result);
        assert_eq!(coordinator.doors(), Doors::new());
    }

    #[tokio::test]
    async fn test_handle_after_stop_is_not_running() {
        let directory = MemoryDirectory::new();
        let mut coordinator = coordinator(&directory, &RecordingConnector::new());
        tokio::spawn(drain_doors(coordinator.take_door_commands().unwrap()));
        coordinator.initialize(true).await.unwrap();
        coordinator.run_prep(None).await.unwrap();
        let handle = coordinator.handle();
        let running = spawn_run(coordinator);

        handle.stop().await.unwrap();
        let (coordinator, _) = running.await.unwrap();
        drop(coordinator);

        assert!(matches!(handle.list().await, Err(PeerError::NotRunning)));
        assert!(matches!(handle.stop().await, Err(PeerError::NotRunning)));
    }
}
