use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_PLAYER_GROUPS: usize = 10;

/// Text messages waiting to be written to one socket.
pub type Outbox = mpsc::UnboundedSender<String>;

/// Players partitioned into groups of balanced size.
pub struct GroupDispatcher {
    groups: Vec<HashMap<Uuid, Outbox>>,
}

impl GroupDispatcher {
    pub fn new(num_groups: usize) -> Self {
        GroupDispatcher {
            groups: (0..num_groups.max(1)).map(|_| HashMap::new()).collect(),
        }
    }

    pub fn num_groups(&self) -> usize {
        self.groups.len()
    }

    /// Adds a player to the smallest group, the first one on ties.
    pub fn assign(&mut self, id: Uuid, outbox: Outbox) -> usize {
        let mut index = 0;
        for (i, group) in self.groups.iter().enumerate() {
            if group.len() < self.groups[index].len() {
                index = i;
            }
        }
        self.groups[index].insert(id, outbox);
        debug!("player {id} assigned to group {index}");
        index
    }

    /// Removes a player. Returns the group it was in.
    pub fn release(&mut self, id: &Uuid) -> Option<usize> {
        for (index, group) in self.groups.iter_mut().enumerate() {
            if group.remove(id).is_some() {
                return Some(index);
            }
        }
        None
    }

    pub fn group_of(&self, id: &Uuid) -> Option<usize> {
        self.groups.iter().position(|group| group.contains_key(id))
    }

    /// Sends to the members of one group. Returns how many were reached.
    pub fn notify(&self, group: usize, payload: &str) -> usize {
        let Some(members) = self.groups.get(group) else {
            return 0;
        };
        members
            .values()
            .filter(|outbox| outbox.send(payload.to_string()).is_ok())
            .count()
    }

    pub fn broadcast(&self, payload: &str) -> usize {
        (0..self.groups.len())
            .map(|group| self.notify(group, payload))
            .sum()
    }

    pub fn send_to(&self, id: &Uuid, payload: &str) -> bool {
        self.groups
            .iter()
            .find_map(|group| group.get(id))
            .is_some_and(|outbox| outbox.send(payload.to_string()).is_ok())
    }

    pub fn group_sizes(&self) -> Vec<usize> {
        self.groups.iter().map(HashMap::len).collect()
    }

    pub fn len(&self) -> usize {
        self.groups.iter().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
