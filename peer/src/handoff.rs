//! Routing outgoing balls to the adjacent peer

use crate::error::PeerError;
use crate::roster::{Member, Roster};
use crate::transport::PeerClient;
use log::{debug, info};
use rand::Rng;
use shared::{Ball, BallCommand, Direction, Peer, Vec2, LAUNCH_X};
use std::time::Duration;

/// Picks the neighbor of `myself` on `direction`. Having no neighbor there
/// means the simulation and the coordinator disagree about the doors.
pub fn route<H>(
    roster: &Roster<H>,
    myself: Peer,
    direction: Direction,
) -> Result<&Member<H>, PeerError> {
    let k = roster.insertion_index(myself);
    let target = match direction {
        Direction::Left => k.checked_sub(1).and_then(|i| roster.get(i)),
        Direction::Right => roster.get(k),
    };
    target.ok_or(PeerError::NoNeighbor(direction))
}

/// Hands `command.ball` to the neighbor on `command.direction`.
pub async fn throw_ball(
    roster: &Roster<PeerClient>,
    myself: Peer,
    command: &BallCommand,
) -> Result<Peer, PeerError> {
    let target = route(roster, myself, command.direction)?;
    debug!(
        "Throwing ball {} to {} via {}",
        command.direction,
        target.peer,
        target.handle.name()
    );
    target
        .handle
        .accept(command.ball.to_wire())
        .await
        .map_err(|e| PeerError::rpc("Accept", target.peer, e))?;
    debug!("Ball throw {} done", command.direction);
    Ok(target.peer)
}

/// A ball at the launch point heading in a random unit direction.
pub fn make_ball<R: Rng>(owner: Peer, rng: &mut R) -> Ball {
    let mut dx: f32 = rng.gen_range(0.01..1.0);
    let dy: f32 = rng.gen_range(0.01..1.0);
    if rng.gen_bool(0.5) {
        dx = -dx;
    }
    let mag = (dx * dx + dy * dy).sqrt();
    Ball::new(owner, Vec2::new(LAUNCH_X, 0.0), Vec2::new(dx / mag, dy / mag))
}

/// Sends `count` rounds of fresh balls to every roster member, pausing
/// `spacing` before each send. Returns the number of balls sent.
pub async fn fire_ball(
    roster: &Roster<PeerClient>,
    count: usize,
    spacing: Duration,
) -> Result<usize, PeerError> {
    let mut sent = 0;
    for _ in 0..count {
        for member in roster.iter() {
            tokio::time::sleep(spacing).await;
            let ball = make_ball(member.peer, &mut rand::thread_rng());
            info!("Firing ball to {}", member.peer);
            member
                .handle
                .accept(ball.to_wire())
                .await
                .map_err(|e| PeerError::rpc("Accept", member.peer, e))?;
            sent += 1;
        }
    }
    Ok(sent)
}
