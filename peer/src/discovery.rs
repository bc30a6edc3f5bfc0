//! Finding the peers that are already registered

use crate::directory::Directory;
use crate::error::PeerError;
use log::{debug, info, warn};
use shared::{Peer, FIRST_PLAYER_ID, MASTER_ID, NAME_SUFFIX_WIDTH};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Extracts the id from a name registered under `root_name`. The suffix
/// must be exactly [`NAME_SUFFIX_WIDTH`] digits.
pub fn parse_peer_id(root_name: &str, name: &str) -> Result<u32, PeerError> {
    name.strip_prefix(root_name)
        .filter(|suffix| {
            suffix.len() == NAME_SUFFIX_WIDTH && suffix.bytes().all(|b| b.is_ascii_digit())
        })
        .and_then(|suffix| suffix.parse().ok())
        .ok_or_else(|| PeerError::MalformedName(name.to_string()))
}

/// Id a new player takes given the sorted ids already registered. Player
/// ids stay below [`MASTER_ID`].
pub fn next_player_id(existing: &[u32]) -> Result<u32, PeerError> {
    match existing.last() {
        None => Ok(FIRST_PLAYER_ID),
        Some(&max) => max
            .checked_add(1)
            .filter(|id| *id < MASTER_ID)
            .ok_or(PeerError::IdsExhausted(max)),
    }
}

/// Sorted ids of every registered player, or `None` if the lookup failed
/// or timed out. Malformed names are skipped.
pub async fn lookup_peer_ids(
    directory: &dyn Directory,
    root_name: &str,
    timeout: Duration,
) -> Option<Vec<u32>> {
    let pattern = format!("{}*", root_name);
    debug!("Looking up {}", pattern);

    let names = match tokio::time::timeout(timeout, directory.lookup(&pattern)).await {
        Ok(Ok(names)) => names,
        Ok(Err(e)) => {
            warn!("{}", PeerError::Lookup(e));
            return None;
        }
        Err(_) => {
            warn!("Lookup of {} timed out after {:?}", pattern, timeout);
            return None;
        }
    };

    let ids: BTreeSet<u32> = names
        .iter()
        .filter_map(|name| match parse_peer_id(root_name, name) {
            Ok(id) => {
                debug!("Found player {}", name);
                Some(id)
            }
            Err(e) => {
                warn!("Skipping: {}", e);
                None
            }
        })
        .collect();
    Some(ids.into_iter().collect())
}

/// Like [`lookup_peer_ids`], but a failed lookup counts as nobody there.
pub async fn discover_existing_peers(
    directory: &dyn Directory,
    root_name: &str,
    timeout: Duration,
) -> Vec<u32> {
    lookup_peer_ids(directory, root_name, timeout)
        .await
        .unwrap_or_default()
}

/// Re-reads the directory every `interval`, turning appearances and
/// disappearances into membership events. Used by a master, which has no
/// endpoint for others to announce themselves to.
pub fn spawn_poller(
    directory: Arc<dyn Directory>,
    root_name: String,
    interval: Duration,
    timeout: Duration,
    initial: Vec<u32>,
    recognize_tx: mpsc::UnboundedSender<Peer>,
    forget_tx: mpsc::UnboundedSender<Peer>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut known: BTreeSet<u32> = initial.into_iter().collect();
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let current: BTreeSet<u32> =
                match lookup_peer_ids(directory.as_ref(), &root_name, timeout).await {
                    Some(ids) => ids.into_iter().collect(),
                    None => {
                        debug!("Keeping {} known players until the next poll", known.len());
                        continue;
                    }
                };

            for id in current.difference(&known) {
                info!("Discovered p{}", id);
                if recognize_tx.send(Peer::new(*id)).is_err() {
                    return;
                }
            }
            for id in known.difference(&current) {
                info!("p{} left the directory", id);
                if forget_tx.send(Peer::new(*id)).is_err() {
                    return;
                }
            }
            known = current;
        }
    })
}
