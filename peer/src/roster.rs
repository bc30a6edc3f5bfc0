//! Sorted view of every other known peer
//!
//! Members are kept strictly ascending by id. The member just before the
//! local peer's insertion point is its left neighbor and the member at the
//! insertion point is its right neighbor.

use shared::{DoorState, Peer};

#[derive(Debug, Clone)]
pub struct Member<H> {
    pub peer: Peer,
    pub handle: H,
}

/// What [`Roster::recognize`] did with a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recognized {
    Inserted(usize),
    /// The id was already present; its handle was swapped.
    Replaced(usize),
}

#[derive(Debug, Clone)]
pub struct Roster<H> {
    members: Vec<Member<H>>,
}

impl<H> Default for Roster<H> {
    fn default() -> Self {
        Self {
            members: Vec::new(),
        }
    }
}

impl<H> Roster<H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Index at which `peer` would be inserted: every member before it has a
    /// smaller id.
    pub fn insertion_index(&self, peer: Peer) -> usize {
        self.members
            .partition_point(|member| member.peer.id <= peer.id)
    }

    pub fn position(&self, peer: Peer) -> Option<usize> {
        self.members
            .binary_search_by_key(&peer.id, |member| member.peer.id)
            .ok()
    }

    pub fn recognize(&mut self, peer: Peer, handle: H) -> Recognized {
        if let Some(index) = self.position(peer) {
            self.members[index].handle = handle;
            return Recognized::Replaced(index);
        }
        let index = self.insertion_index(peer);
        self.members.insert(index, Member { peer, handle });
        Recognized::Inserted(index)
    }

    /// Removes `peer`, returning whether it was present.
    pub fn forget(&mut self, peer: Peer) -> bool {
        match self.position(peer) {
            Some(index) => {
                self.members.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, index: usize) -> Option<&Member<H>> {
        self.members.get(index)
    }

    pub fn members(&self) -> &[Member<H>] {
        &self.members
    }

    pub fn iter(&self) -> impl Iterator<Item = &Member<H>> {
        self.members.iter()
    }

    pub fn peers(&self) -> Vec<Peer> {
        self.members.iter().map(|member| member.peer).collect()
    }

    pub fn ids(&self) -> Vec<u32> {
        self.members.iter().map(|member| member.peer.id).collect()
    }

    /// Renders the lineup with the local peer in place, e.g. `p1 _p5] p9`.
    /// `_` marks an open door, `[` and `]` closed ones.
    pub fn lineup(&self, myself: Peer, left: DoorState, right: DoorState) -> String {
        let k = self.insertion_index(myself);
        let mut out = String::new();
        for member in &self.members[..k] {
            out.push_str(&format!("{} ", member.peer));
        }
        out.push(if left == DoorState::Open { '_' } else { '[' });
        out.push_str(&myself.to_string());
        out.push(if right == DoorState::Open { '_' } else { ']' });
        for member in &self.members[k..] {
            out.push_str(&format!(" {}", member.peer));
        }
        out
    }
}
