//! Point-to-point calls between peers
//!
//! Each call is one length-prefixed `bincode` frame carrying a [`Request`],
//! answered by one [`Response`] frame. Names are resolved through the
//! directory on every call, so a peer that re-registers at a new address is
//! reached without any cached state. Calls carry no timeout and are never
//! retried.

use crate::directory::Directory;
use crate::error::RpcError;
use async_trait::async_trait;
use bincode::{deserialize, serialize};
use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use shared::{MasterCommand, Peer, Request, Response, WireBall};
use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

/// Largest frame either side will accept.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<(), RpcError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let data = serialize(message)?;
    if data.len() > MAX_FRAME_LEN {
        return Err(RpcError::FrameTooLarge(data.len()));
    }
    writer.write_u32(data.len() as u32).await?;
    writer.write_all(&data).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_frame<R, T>(reader: &mut R) -> Result<T, RpcError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let len = reader.read_u32().await? as usize;
    if len > MAX_FRAME_LEN {
        return Err(RpcError::FrameTooLarge(len));
    }
    let mut buffer = vec![0u8; len];
    reader.read_exact(&mut buffer).await?;
    Ok(deserialize(&buffer)?)
}

/// Something that can deliver a request to one remote peer.
#[async_trait]
pub trait RemoteHandle: Send + Sync {
    async fn call(&self, request: Request) -> Result<(), RpcError>;
}

/// Produces handles for named peers.
pub trait Connector: Send + Sync {
    fn connect(&self, name: &str) -> Arc<dyn RemoteHandle>;
}

/// Typed client for one peer's endpoint.
#[derive(Clone)]
pub struct PeerClient {
    name: String,
    handle: Arc<dyn RemoteHandle>,
}

impl fmt::Debug for PeerClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerClient")
            .field("name", &self.name)
            .finish()
    }
}

impl PeerClient {
    pub fn new(name: impl Into<String>, handle: Arc<dyn RemoteHandle>) -> Self {
        Self {
            name: name.into(),
            handle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn recognize(&self, peer: Peer) -> Result<(), RpcError> {
        self.handle.call(Request::Recognize { peer }).await
    }

    pub async fn forget(&self, peer: Peer) -> Result<(), RpcError> {
        self.handle.call(Request::Forget { peer }).await
    }

    pub async fn accept(&self, ball: WireBall) -> Result<(), RpcError> {
        self.handle.call(Request::Accept { ball }).await
    }

    pub async fn quit(&self) -> Result<(), RpcError> {
        self.handle.call(Request::Quit).await
    }

    pub async fn do_master_command(&self, command: MasterCommand) -> Result<(), RpcError> {
        self.handle.call(Request::DoMasterCommand { command }).await
    }

    pub async fn set_pause_duration(&self, seconds: f32) -> Result<(), RpcError> {
        self.handle
            .call(Request::SetPauseDuration { seconds })
            .await
    }

    pub async fn set_gravity(&self, gravity: f32) -> Result<(), RpcError> {
        self.handle.call(Request::SetGravity { gravity }).await
    }

    pub async fn kick(&self) -> Result<(), RpcError> {
        self.handle.call(Request::Kick).await
    }
}

/// Connects to peers over TCP, resolving names through a directory.
#[derive(Clone)]
pub struct TcpConnector {
    directory: Arc<dyn Directory>,
}

impl TcpConnector {
    pub fn new(directory: Arc<dyn Directory>) -> Self {
        Self { directory }
    }
}

impl Connector for TcpConnector {
    fn connect(&self, name: &str) -> Arc<dyn RemoteHandle> {
        Arc::new(TcpHandle {
            name: name.to_string(),
            directory: Arc::clone(&self.directory),
        })
    }
}

struct TcpHandle {
    name: String,
    directory: Arc<dyn Directory>,
}

#[async_trait]
impl RemoteHandle for TcpHandle {
    async fn call(&self, request: Request) -> Result<(), RpcError> {
        let addr = self
            .directory
            .resolve(&self.name)
            .await
            .map_err(|e| RpcError::Unresolved(format!("{} ({})", self.name, e)))?
            .ok_or_else(|| RpcError::Unresolved(self.name.clone()))?;

        debug!("Calling {} on {} at {}", request.method(), self.name, addr);
        let mut stream = TcpStream::connect(addr).await?;
        write_frame(&mut stream, &request).await?;

        match read_frame::<_, Response>(&mut stream).await? {
            Response::Ok => Ok(()),
            Response::Rejected { reason } => Err(RpcError::Rejected(reason)),
        }
    }
}
