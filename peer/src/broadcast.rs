//! Control-plane commands fanned out to the roster

use crate::error::PeerError;
use crate::roster::Roster;
use crate::transport::PeerClient;
use log::info;
use shared::MasterCommand;

#[derive(Debug, Clone, PartialEq)]
pub enum Broadcast {
    SetPauseDuration(f32),
    SetGravity(f32),
    DoMasterCommand(MasterCommand),
    Kick,
    /// Only reaches members with this id.
    Quit(u32),
}

impl Broadcast {
    pub fn method(&self) -> &'static str {
        match self {
            Broadcast::SetPauseDuration(_) => "SetPauseDuration",
            Broadcast::SetGravity(_) => "SetGravity",
            Broadcast::DoMasterCommand(_) => "DoMasterCommand",
            Broadcast::Kick => "Kick",
            Broadcast::Quit(_) => "Quit",
        }
    }
}

/// Sends `command` to its targets. Any failure aborts the fan-out.
/// Returns the number of peers reached.
pub async fn broadcast(
    roster: &Roster<PeerClient>,
    command: &Broadcast,
) -> Result<usize, PeerError> {
    let mut reached = 0;
    for member in roster.iter() {
        let client = &member.handle;
        let result = match command {
            Broadcast::SetPauseDuration(seconds) => {
                info!("Setting pause duration of {} to {:.2}", member.peer, seconds);
                client.set_pause_duration(*seconds).await
            }
            Broadcast::SetGravity(gravity) => {
                info!("Setting gravity of {} to {:.2}", member.peer, gravity);
                client.set_gravity(*gravity).await
            }
            Broadcast::DoMasterCommand(master_command) => {
                info!("Commanding {} to {}", member.peer, master_command.name);
                client.do_master_command(master_command.clone()).await
            }
            Broadcast::Kick => {
                info!("Kicking {}", member.peer);
                client.kick().await
            }
            Broadcast::Quit(id) if member.peer.id == *id => {
                info!("Killing {}", member.peer);
                client.quit().await
            }
            Broadcast::Quit(_) => continue,
        };
        result.map_err(|e| PeerError::rpc(command.method(), member.peer, e))?;
        reached += 1;
    }
    Ok(reached)
}
