//! Server-side handling of inbound requests
//!
//! The relay never touches coordinator state. Membership requests are queued
//! for the coordinator's event loop; everything else is queued for the local
//! simulation through [`Inbound`].

use log::{debug, info, warn};
use shared::{Ball, MasterCommand, Peer, Request, Response};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

/// Receiving ends handed to the coordinator's event loop.
#[derive(Debug)]
pub struct MembershipEvents {
    pub recognize: mpsc::UnboundedReceiver<Peer>,
    pub forget: mpsc::UnboundedReceiver<Peer>,
}

/// Receiving ends handed to the local simulation.
#[derive(Debug)]
pub struct Inbound {
    pub balls: mpsc::UnboundedReceiver<Ball>,
    pub master_commands: mpsc::UnboundedReceiver<MasterCommand>,
    pub pause_durations: mpsc::UnboundedReceiver<f32>,
    pub gravity: mpsc::UnboundedReceiver<f32>,
    pub quit: mpsc::UnboundedReceiver<()>,
    pub kick: mpsc::UnboundedReceiver<()>,
}

#[derive(Debug)]
pub struct Relay {
    accepting: AtomicBool,
    recognize_tx: mpsc::UnboundedSender<Peer>,
    forget_tx: mpsc::UnboundedSender<Peer>,
    balls_tx: mpsc::UnboundedSender<Ball>,
    master_tx: mpsc::UnboundedSender<MasterCommand>,
    pause_tx: mpsc::UnboundedSender<f32>,
    gravity_tx: mpsc::UnboundedSender<f32>,
    quit_tx: mpsc::UnboundedSender<()>,
    kick_tx: mpsc::UnboundedSender<()>,
}

impl Relay {
    pub fn new() -> (Self, MembershipEvents, Inbound) {
        let (recognize_tx, recognize) = mpsc::unbounded_channel();
        let (forget_tx, forget) = mpsc::unbounded_channel();
        let (balls_tx, balls) = mpsc::unbounded_channel();
        let (master_tx, master_commands) = mpsc::unbounded_channel();
        let (pause_tx, pause_durations) = mpsc::unbounded_channel();
        let (gravity_tx, gravity) = mpsc::unbounded_channel();
        let (quit_tx, quit) = mpsc::unbounded_channel();
        let (kick_tx, kick) = mpsc::unbounded_channel();

        let relay = Relay {
            accepting: AtomicBool::new(true),
            recognize_tx,
            forget_tx,
            balls_tx,
            master_tx,
            pause_tx,
            gravity_tx,
            quit_tx,
            kick_tx,
        };

        let events = MembershipEvents { recognize, forget };
        let inbound = Inbound {
            balls,
            master_commands,
            pause_durations,
            gravity,
            quit,
            kick,
        };

        (relay, events, inbound)
    }

    /// Senders the coordinator uses to feed its own loop (discovery polling).
    pub fn membership_senders(
        &self,
    ) -> (mpsc::UnboundedSender<Peer>, mpsc::UnboundedSender<Peer>) {
        (self.recognize_tx.clone(), self.forget_tx.clone())
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Drops future Recognize and Accept payloads. Forget still goes through
    /// so departed neighbors are removed while draining.
    pub fn stop_accepting(&self) {
        info!("Relay no longer accepting balls or people");
        self.accepting.store(false, Ordering::SeqCst);
    }

    pub fn handle(&self, request: Request) -> Response {
        let method = request.method();
        debug!("Relay handling {}", method);

        let delivered = match request {
            Request::Recognize { peer } if self.is_accepting() => {
                self.recognize_tx.send(peer).is_ok()
            }
            Request::Accept { ball } if self.is_accepting() => {
                self.balls_tx.send(Ball::from(ball)).is_ok()
            }
            Request::Recognize { .. } | Request::Accept { .. } => {
                debug!("Dropping {} while not accepting", method);
                true
            }
            Request::Forget { peer } => self.forget_tx.send(peer).is_ok(),
            Request::Quit => self.quit_tx.send(()).is_ok(),
            Request::Kick => self.kick_tx.send(()).is_ok(),
            Request::DoMasterCommand { command } => self.master_tx.send(command).is_ok(),
            Request::SetPauseDuration { seconds } => self.pause_tx.send(seconds).is_ok(),
            Request::SetGravity { gravity } => self.gravity_tx.send(gravity).is_ok(),
        };

        if delivered {
            Response::Ok
        } else {
            warn!("No local consumer for {}", method);
            Response::Rejected {
                reason: format!("{} has no local consumer", method),
            }
        }
    }
}
