use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel id taken by a master, which never joins the lineup.
pub const MASTER_ID: u32 = 999;
/// Id taken by the first player when nobody else is registered.
pub const FIRST_PLAYER_ID: u32 = 1;
pub const DEFAULT_ROOT_NAME: &str = "volley/player";
/// Width of the zero-padded numeric suffix in a registered name.
pub const NAME_SUFFIX_WIDTH: usize = 4;
pub const DISCOVERY_TIMEOUT_SECS: u64 = 60;
pub const FIRE_BALL_SPACING_MS: u64 = 100;
/// Horizontal launch position for balls fired by a master.
pub const LAUNCH_X: f32 = 0.5;

/// Builds the directory name a player with `id` registers under.
pub fn server_name(root_name: &str, id: u32) -> String {
    format!("{}{:0width$}", root_name, id, width = NAME_SUFFIX_WIDTH)
}

/// Requests understood by every peer's endpoint.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Request {
    Recognize { peer: Peer },
    Forget { peer: Peer },
    Accept { ball: WireBall },
    Quit,
    DoMasterCommand { command: MasterCommand },
    SetPauseDuration { seconds: f32 },
    SetGravity { gravity: f32 },
    Kick,
}

impl Request {
    pub fn method(&self) -> &'static str {
        match self {
            Request::Recognize { .. } => "Recognize",
            Request::Forget { .. } => "Forget",
            Request::Accept { .. } => "Accept",
            Request::Quit => "Quit",
            Request::DoMasterCommand { .. } => "DoMasterCommand",
            Request::SetPauseDuration { .. } => "SetPauseDuration",
            Request::SetGravity { .. } => "SetGravity",
            Request::Kick => "Kick",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Response {
    Ok,
    Rejected { reason: String },
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Peer {
    pub id: u32,
}

impl Peer {
    pub fn new(id: u32) -> Self {
        Self { id }
    }

    pub fn is_master(&self) -> bool {
        self.id == MASTER_ID
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.id)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }
}

/// A ball as held by the local simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct Ball {
    pub owner: Peer,
    pub position: Vec2,
    pub velocity: Vec2,
}

impl Ball {
    pub fn new(owner: Peer, position: Vec2, velocity: Vec2) -> Self {
        Self {
            owner,
            position,
            velocity,
        }
    }

    pub fn to_wire(&self) -> WireBall {
        WireBall {
            owner: self.owner,
            x: self.position.x,
            y: self.position.y,
            dx: self.velocity.x,
            dy: self.velocity.y,
        }
    }
}

/// Flattened ball carried by the Accept request.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct WireBall {
    pub owner: Peer,
    pub x: f32,
    pub y: f32,
    pub dx: f32,
    pub dy: f32,
}

impl From<WireBall> for Ball {
    fn from(wire: WireBall) -> Self {
        Ball::new(
            wire.owner,
            Vec2::new(wire.x, wire.y),
            Vec2::new(wire.dx, wire.dy),
        )
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct MasterCommand {
    pub name: String,
}

impl MasterCommand {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Left,
    Right,
}

impl Direction {
    pub fn opposite(self) -> Direction {
        match self {
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Left => write!(f, "left"),
            Direction::Right => write!(f, "right"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DoorState {
    Open,
    Closed,
}

/// Notification that the door on `side` is now `state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DoorCommand {
    pub state: DoorState,
    pub side: Direction,
}

impl DoorCommand {
    pub fn new(state: DoorState, side: Direction) -> Self {
        Self { state, side }
    }
}

/// Request from the simulation to hand a ball to a neighbor.
#[derive(Debug, Clone, PartialEq)]
pub struct BallCommand {
    pub direction: Direction,
    pub ball: Ball,
}

impl BallCommand {
    pub fn new(direction: Direction, ball: Ball) -> Self {
        Self { direction, ball }
    }
}
