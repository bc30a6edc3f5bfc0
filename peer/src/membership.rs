//! Announcing and withdrawing the local peer
//!
//! Announcing is strict: a peer that cannot be reached at startup means the
//! directory and the live set disagree, so the first failure aborts.
//! Withdrawing is best-effort so shutdown never hangs on one dead peer.

use crate::error::PeerError;
use crate::roster::Roster;
use crate::transport::PeerClient;
use log::{debug, info, warn};
use shared::Peer;

/// Asks every roster member to recognize `myself`.
pub async fn announce(myself: Peer, roster: &Roster<PeerClient>) -> Result<(), PeerError> {
    info!("{} saying hello to {} other players", myself, roster.len());
    for member in roster.iter() {
        debug!("Asking {} to recognize {}", member.peer, myself);
        member
            .handle
            .recognize(myself)
            .await
            .map_err(|e| PeerError::rpc("Recognize", member.peer, e))?;
    }
    debug!("{} done saying hello", myself);
    Ok(())
}

/// Asks every roster member to forget `myself`. Returns how many calls failed.
pub async fn withdraw(myself: Peer, roster: &Roster<PeerClient>) -> usize {
    info!("{} saying goodbye to {} other players", myself, roster.len());
    let mut failures = 0;
    for member in roster.iter() {
        debug!("Asking {} to forget {}", member.peer, myself);
        if let Err(e) = member.handle.forget(myself).await {
            let err = PeerError::rpc("Forget", member.peer, e);
            warn!("{}; continuing", err);
            failures += 1;
        }
    }
    failures
}
