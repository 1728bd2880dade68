//! Server behaviour independent of the socket layer.
//!
//! Every connection is identified by a `Uuid` and reached through its
//! [`Outbox`]. The transport forwards incoming text and binary frames to the
//! matching `*_message` method.

use std::collections::HashMap;

use bytes::Bytes;
use grainfield_core::{Message, Param, ParamValue, ParameterStore};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::error::HubError;
use crate::groups::{GroupDispatcher, Outbox};
use crate::segment::SegmentRing;
use crate::store::{SegmentStore, encode_wav};

pub struct Hub {
    params: RwLock<ParameterStore>,
    controllers: RwLock<HashMap<Uuid, Outbox>>,
    recorder: Mutex<Option<Uuid>>,
    ring: Mutex<SegmentRing>,
    players: RwLock<GroupDispatcher>,
    store: SegmentStore,
    sample_rate: u32,
}

fn snapshot(params: &ParameterStore) -> Vec<String> {
    params
        .iter()
        .map(|(param, value)| Message::Param(param, value).to_json())
        .collect()
}

impl Hub {
    pub fn new(config: &ServerConfig) -> Self {
        let hop = config.sample_rate as usize;
        Hub {
            params: RwLock::new(ParameterStore::new()),
            controllers: RwLock::new(HashMap::new()),
            recorder: Mutex::new(None),
            ring: Mutex::new(SegmentRing::new(
                config.num_buffers,
                hop,
                config.player_groups,
            )),
            players: RwLock::new(GroupDispatcher::new(config.player_groups)),
            store: SegmentStore::new(config.record_dir.clone(), config.player_groups),
            sample_rate: config.sample_rate,
        }
    }

    pub fn store(&self) -> &SegmentStore {
        &self.store
    }

    pub async fn params(&self) -> ParameterStore {
        self.params.read().await.clone()
    }

    pub async fn is_frozen(&self) -> bool {
        self.ring.lock().await.is_frozen()
    }

    pub async fn group_sizes(&self) -> Vec<usize> {
        self.players.read().await.group_sizes()
    }

    pub async fn controller_count(&self) -> usize {
        self.controllers.read().await.len()
    }

    pub async fn segment(&self, slot: usize) -> Option<Bytes> {
        self.store.get(slot).await
    }

    pub async fn connect_controller(&self, id: Uuid, outbox: Outbox) {
        // registered under the lock so no update falls between snapshot and registration
        let mut controllers = self.controllers.write().await;
        for text in snapshot(&*self.params.read().await) {
            let _ = outbox.send(text);
        }
        controllers.insert(id, outbox);
        drop(controllers);
        info!("controller {id} connected");
    }

    pub async fn disconnect_controller(&self, id: &Uuid) {
        if self.controllers.write().await.remove(id).is_some() {
            info!("controller {id} disconnected");
        }
    }

    /// Stores a parameter update and passes it on to every other
    /// controller and to every player.
    pub async fn controller_message(&self, id: &Uuid, text: &str) -> Result<(), HubError> {
        let (param, value) = match Message::parse(text)? {
            Message::Param(param, value) => (param, value),
            other => {
                debug!("controller {id}: ignoring '{}'", other.selector());
                return Ok(());
            }
        };

        let value = self.params.write().await.insert(param, value)?;
        let text = Message::Param(param, value).to_json();
        debug!("controller {id}: {param} = {value:?}");

        for (other, outbox) in self.controllers.read().await.iter() {
            if other != id {
                let _ = outbox.send(text.clone());
            }
        }
        self.players.read().await.broadcast(&text);

        match (param, value) {
            (Param::Freeze, ParamValue::Flag(frozen)) => {
                self.ring.lock().await.set_frozen(frozen);
                info!("recording {}", if frozen { "frozen" } else { "resumed" });
            }
            (Param::End, ParamValue::Flag(ended)) => {
                // recording runs while the session is ended
                self.ring.lock().await.set_frozen(!ended);
                info!(
                    "session {}, recording {}",
                    if ended { "ended" } else { "open" },
                    if ended { "resumed" } else { "frozen" }
                );
            }
            _ => {}
        }
        Ok(())
    }

    /// Accepts the first recorder only. The candidate is told either way.
    pub async fn connect_recorder(&self, id: Uuid, outbox: &Outbox) -> Result<(), HubError> {
        let mut recorder = self.recorder.lock().await;
        if recorder.is_some() {
            let _ = outbox.send(Message::RecorderOk(false).to_json());
            warn!("recorder {id} rejected: another recorder is connected");
            return Err(HubError::RecorderBusy);
        }
        *recorder = Some(id);
        let _ = outbox.send(Message::RecorderOk(true).to_json());
        info!("recorder {id} connected");
        Ok(())
    }

    pub async fn disconnect_recorder(&self, id: &Uuid) {
        let mut recorder = self.recorder.lock().await;
        if recorder.as_ref() == Some(id) {
            *recorder = None;
            info!("recorder {id} disconnected");
        }
    }

    pub async fn recorder_message(&self, id: &Uuid, text: &str) -> Result<(), HubError> {
        if self.recorder.lock().await.as_ref() != Some(id) {
            return Ok(());
        }
        match Message::parse(text)? {
            Message::InitStream => {
                self.ring.lock().await.reset();
                info!("recorder {id}: stream initialized");
            }
            other => debug!("recorder {id}: ignoring '{}'", other.selector()),
        }
        Ok(())
    }

    /// Appends raw audio and publishes every segment it completes.
    /// Returns how many segments were published.
    ///
    /// A segment that cannot be written to disk is still served from memory
    /// and announced.
    pub async fn audio_frame(&self, chunk: &[u8]) -> usize {
        let completed = self.ring.lock().await.append(chunk);
        let count = completed.len();

        for segment in completed {
            let wav = match encode_wav(&segment.samples, self.sample_rate) {
                Ok(wav) => wav,
                Err(e) => {
                    error!("failed to encode segment {}: {e}", segment.sequence);
                    continue;
                }
            };
            if let Err(e) = self.store.put(segment.slot, wav).await {
                error!("failed to write segment {}: {e}", segment.sequence);
            }

            let text = Message::UpdateBuffer {
                slot: segment.slot,
                sequence: segment.sequence,
            }
            .to_json();
            let reached = self.players.read().await.notify(segment.slot, &text);
            debug!(
                "segment {} stored in slot {}, {} players notified",
                segment.sequence, segment.slot, reached
            );
        }
        count
    }

    /// Puts a player into the smallest group and tells it which one.
    pub async fn connect_player(&self, id: Uuid, outbox: Outbox) -> usize {
        let mut players = self.players.write().await;
        let group = players.assign(id, outbox.clone());
        // queued before any segment announcement can reach the player
        let _ = outbox.send(Message::PlayerGroup(group).to_json());
        drop(players);
        info!("player {id} connected to group {group}");
        group
    }

    pub async fn disconnect_player(&self, id: &Uuid) {
        if let Some(group) = self.players.write().await.release(id) {
            info!("player {id} left group {group}");
        }
    }

    pub async fn player_message(&self, id: &Uuid, text: &str) -> Result<(), HubError> {
        match Message::parse(text)? {
            Message::GetParams => {
                let messages = snapshot(&*self.params.read().await);
                let players = self.players.read().await;
                for text in messages {
                    players.send_to(id, &text);
                }
            }
            other => debug!("player {id}: ignoring '{}'", other.selector()),
        }
        Ok(())
    }
}
