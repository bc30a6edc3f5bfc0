//! Headless stand-in for a player's table
//!
//! Holds every ball that lands here for the pause duration, then sends it
//! out through the door its velocity points at. A ball heading for a closed
//! door bounces; with both doors closed it stays on the table.

use log::{debug, info, warn};
use peer::relay::Inbound;
use shared::{Ball, BallCommand, Direction, DoorCommand, DoorState, MasterCommand, Peer};
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};

const TICK: Duration = Duration::from_millis(50);

/// The parts of [`Inbound`] a table consumes.
pub struct TableInputs {
    pub balls: mpsc::UnboundedReceiver<Ball>,
    pub master_commands: mpsc::UnboundedReceiver<MasterCommand>,
    pub pause_durations: mpsc::UnboundedReceiver<f32>,
    pub gravity: mpsc::UnboundedReceiver<f32>,
}

/// Requests to leave the game: a quit or a kick.
pub struct Exits {
    pub quit: mpsc::UnboundedReceiver<()>,
    pub kick: mpsc::UnboundedReceiver<()>,
}

impl TableInputs {
    /// Splits off the quit and kick channels, which the caller watches itself.
    pub fn split(inbound: Inbound) -> (Self, Exits) {
        let Inbound {
            balls,
            master_commands,
            pause_durations,
            gravity,
            quit,
            kick,
        } = inbound;
        let inputs = TableInputs {
            balls,
            master_commands,
            pause_durations,
            gravity,
        };
        (inputs, Exits { quit, kick })
    }
}

#[derive(Debug)]
struct Held {
    release_at: Instant,
    ball: Ball,
}

#[derive(Debug)]
pub struct Table {
    me: Peer,
    left: DoorState,
    right: DoorState,
    pause: Duration,
    gravity: f32,
    held: Vec<Held>,
}

impl Table {
    pub fn new(me: Peer, pause: Duration) -> Self {
        Self {
            me,
            left: DoorState::Closed,
            right: DoorState::Closed,
            pause,
            gravity: 0.0,
            held: Vec::new(),
        }
    }

    pub fn door(&self, side: Direction) -> DoorState {
        match side {
            Direction::Left => self.left,
            Direction::Right => self.right,
        }
    }

    pub fn held(&self) -> usize {
        self.held.len()
    }

    pub fn apply_door(&mut self, command: DoorCommand) {
        info!(
            "{} door {:?} -> {:?}",
            command.side,
            self.door(command.side),
            command.state
        );
        match command.side {
            Direction::Left => self.left = command.state,
            Direction::Right => self.right = command.state,
        }
    }

    pub fn set_pause(&mut self, seconds: f32) {
        if !seconds.is_finite() || seconds < 0.0 {
            warn!("Ignoring pause duration {}", seconds);
            return;
        }
        info!("Pause duration now {:.2}s", seconds);
        self.pause = Duration::from_secs_f32(seconds);
    }

    pub fn set_gravity(&mut self, gravity: f32) {
        info!("Gravity now {:.2}", gravity);
        self.gravity = gravity;
    }

    pub fn catch(&mut self, ball: Ball, now: Instant) {
        debug!("{} caught a ball from {}", self.me, ball.owner);
        self.held.push(Held {
            release_at: now + self.pause,
            ball,
        });
    }

    /// Side a ball leaves through, bouncing it off a closed door. `None` if
    /// both doors are closed.
    fn exit_side(&self, ball: &mut Ball) -> Option<Direction> {
        let heading = if ball.velocity.x < 0.0 {
            Direction::Left
        } else {
            Direction::Right
        };
        if self.door(heading) == DoorState::Open {
            return Some(heading);
        }
        let bounced = heading.opposite();
        if self.door(bounced) == DoorState::Open {
            debug!("Ball bounced off the {} door", heading);
            ball.velocity.x = -ball.velocity.x;
            return Some(bounced);
        }
        None
    }

    /// Throws for every ball whose pause has elapsed. Balls with nowhere to
    /// go are held for another pause.
    pub fn release_due(&mut self, now: Instant) -> Vec<BallCommand> {
        let (due, waiting): (Vec<Held>, Vec<Held>) = std::mem::take(&mut self.held)
            .into_iter()
            .partition(|held| held.release_at <= now);
        self.held = waiting;

        let mut throws = Vec::new();
        for Held { mut ball, .. } in due {
            ball.velocity.y -= self.gravity * self.pause.as_secs_f32();
            match self.exit_side(&mut ball) {
                Some(side) => throws.push(BallCommand::new(side, ball)),
                None => self.held.push(Held {
                    release_at: now + self.pause,
                    ball,
                }),
            }
        }
        throws
    }

    /// Runs until the door channel closes, which happens once the
    /// coordinator stops.
    pub async fn run(
        mut self,
        mut doors: mpsc::Receiver<DoorCommand>,
        mut inputs: TableInputs,
        throws: mpsc::Sender<BallCommand>,
    ) {
        let mut ticker = interval(TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                command = doors.recv() => match command {
                    Some(command) => self.apply_door(command),
                    None => {
                        info!(
                            "Door channel closed; table done with {} balls held",
                            self.held.len()
                        );
                        return;
                    }
                },

                Some(ball) = inputs.balls.recv() => self.catch(ball, Instant::now()),

                Some(seconds) = inputs.pause_durations.recv() => self.set_pause(seconds),

                Some(gravity) = inputs.gravity.recv() => self.set_gravity(gravity),

                Some(command) = inputs.master_commands.recv() => {
                    info!("Master says {}", command.name);
                },

                _ = ticker.tick() => {
                    for command in self.release_due(Instant::now()) {
                        if throws.send(command).await.is_err() {
                            warn!("Coordinator no longer takes balls");
                            return;
                        }
                    }
                },
            }
        }
    }
}
