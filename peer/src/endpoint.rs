//! TCP endpoint that receives requests from other peers

use crate::relay::Relay;
use crate::transport::{read_frame, write_frame};
use log::{debug, info, warn};
use shared::Request;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinHandle, JoinSet};

pub struct Endpoint {
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl Endpoint {
    /// Binds `addr` and starts serving requests into `relay`.
    pub async fn serve(addr: SocketAddr, relay: Arc<Relay>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Endpoint listening on {}", local_addr);

        // Connection tasks live in the set, so aborting this task ends them too.
        let task = tokio::spawn(async move {
            let mut connections = JoinSet::new();
            loop {
                tokio::select! {
                    accepted = listener.accept() => match accepted {
                        Ok((stream, remote)) => {
                            connections.spawn(Self::serve_connection(
                                stream,
                                remote,
                                Arc::clone(&relay),
                            ));
                        }
                        Err(e) => {
                            warn!("Error accepting connection: {}", e);
                            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                        }
                    },

                    Some(_) = connections.join_next(), if !connections.is_empty() => {},
                }
            }
        });

        Ok(Endpoint { local_addr, task })
    }

    async fn serve_connection(mut stream: TcpStream, remote: SocketAddr, relay: Arc<Relay>) {
        loop {
            let request = match read_frame::<_, Request>(&mut stream).await {
                Ok(request) => request,
                Err(e) => {
                    debug!("Connection from {} closed: {}", remote, e);
                    return;
                }
            };

            let response = relay.handle(request);
            if let Err(e) = write_frame(&mut stream, &response).await {
                warn!("Failed to answer {}: {}", remote, e);
                return;
            }
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting connections and drops the open ones.
    pub fn shutdown(self) {
        info!("Endpoint on {} shutting down", self.local_addr);
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        self.task.abort();
    }
}
