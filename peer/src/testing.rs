//! Recording transport shared by the unit tests

use crate::error::RpcError;
use crate::transport::{Connector, PeerClient, RemoteHandle};
use async_trait::async_trait;
use shared::{server_name, Request};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

pub const ROOT: &str = "test/player";

#[derive(Clone, Default)]
pub struct RecordingConnector {
    calls: Arc<Mutex<Vec<(String, Request)>>>,
    unreachable: Arc<Mutex<HashSet<String>>>,
}

impl RecordingConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call to the player with `id` fail.
    pub fn make_unreachable(&self, id: u32) {
        self.unreachable
            .lock()
            .unwrap()
            .insert(server_name(ROOT, id));
    }

    pub fn calls(&self) -> Vec<(String, Request)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn methods_to(&self, id: u32) -> Vec<&'static str> {
        let name = server_name(ROOT, id);
        self.calls()
            .into_iter()
            .filter(|(to, _)| *to == name)
            .map(|(_, request)| request.method())
            .collect()
    }

    pub fn client(&self, id: u32) -> PeerClient {
        let name = server_name(ROOT, id);
        PeerClient::new(name.clone(), self.connect(&name))
    }
}

impl Connector for RecordingConnector {
    fn connect(&self, name: &str) -> Arc<dyn RemoteHandle> {
        Arc::new(RecordingHandle {
            name: name.to_string(),
            connector: self.clone(),
        })
    }
}

struct RecordingHandle {
    name: String,
    connector: RecordingConnector,
}

#[async_trait]
impl RemoteHandle for RecordingHandle {
    async fn call(&self, request: Request) -> Result<(), RpcError> {
        if self
            .connector
            .unreachable
            .lock()
            .unwrap()
            .contains(&self.name)
        {
            return Err(RpcError::Unresolved(self.name.clone()));
        }
        self.connector
            .calls
            .lock()
            .unwrap()
            .push((self.name.clone(), request));
        Ok(())
    }
}
