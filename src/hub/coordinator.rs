//! Hub coordinator
//!
//! A single task owns the registry of connected agents. Registration,
//! departure, generic broadcasts and canvas edits all arrive as commands on
//! one bounded intake and are handled strictly in arrival order, so the
//! registry needs no lock and every agent sees lifecycle notices in the
//! order they happened. Canvas edits are applied here too: a joining
//! agent's snapshot is therefore exact with respect to the pixel updates
//! queued after it.
//!
//! Fan-out never waits on a slow agent. A full queue gets the agent evicted
//! and its departure announced to everyone else.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info, warn};

use super::agent::AgentHandle;
use super::canvas::Canvas;
use crate::config::HubConfig;
use crate::error::{HubError, Result};
use crate::models::{CanvasEdit, ClientId, Frame, Message};

enum Command {
    Register(AgentHandle),
    Unregister(ClientId),
    Broadcast(Frame),
    Edit { edit: CanvasEdit, author: ClientId },
    Shutdown,
}

/// Which registered agents a fan-out reaches
#[derive(Clone, Copy)]
enum Target<'a> {
    All,
    AllExcept(&'a ClientId),
    Only(&'a ClientId),
}

impl Target<'_> {
    fn includes(&self, id: &ClientId) -> bool {
        match self {
            Target::All => true,
            Target::AllExcept(skip) => *skip != id,
            Target::Only(only) => *only == id,
        }
    }
}

struct Registration {
    /// Join order, used to keep the roster stable
    seq: u64,
    queue: mpsc::Sender<Frame>,
}

/// The coordinator task's state
pub struct Hub {
    registry: HashMap<ClientId, Registration>,
    next_seq: u64,
    canvas: Arc<Canvas>,
    commands: mpsc::Receiver<Command>,
    roster: Arc<ArcSwap<Vec<ClientId>>>,
}

/// Cloneable handle used by connections and HTTP handlers to reach the hub
#[derive(Clone)]
pub struct HubHandle {
    commands: mpsc::Sender<Command>,
    canvas: Arc<Canvas>,
    roster: Arc<ArcSwap<Vec<ClientId>>>,
}

impl Hub {
    /// Create a hub and its handle; the hub does nothing until `run` is awaited
    pub fn new(config: &HubConfig, canvas: Arc<Canvas>) -> (Self, HubHandle) {
        let (tx, rx) = mpsc::channel(config.control_capacity);
        let roster = Arc::new(ArcSwap::from_pointee(Vec::new()));

        let hub = Self {
            registry: HashMap::new(),
            next_seq: 0,
            canvas: canvas.clone(),
            commands: rx,
            roster: roster.clone(),
        };
        let handle = HubHandle {
            commands: tx,
            canvas,
            roster,
        };

        (hub, handle)
    }

    /// Process commands until shutdown or until every handle is dropped
    pub async fn run(mut self) {
        info!("Hub started");

        while let Some(command) = self.commands.recv().await {
            match command {
                Command::Register(agent) => self.register(agent),
                Command::Unregister(id) => self.unregister(&id),
                Command::Broadcast(frame) => {
                    let evicted = self.fan_out(&frame, Target::All);
                    self.settle(evicted);
                }
                Command::Edit { edit, author } => self.apply_edit(edit, &author),
                Command::Shutdown => {
                    // Refuse anything queued behind the shutdown request
                    self.commands.close();
                    break;
                }
            }
        }

        let remaining = self.registry.len();
        self.registry.clear();
        self.publish_roster();
        info!("Hub stopped, closed {} remaining connections", remaining);
    }

    fn register(&mut self, agent: AgentHandle) {
        let (id, queue) = agent.into_parts();
        let seq = self.next_seq;
        self.next_seq += 1;

        if self.registry.insert(id.clone(), Registration { seq, queue }).is_some() {
            warn!(client_id = %id, "Replaced an existing registration");
        }
        let roster = self.publish_roster();
        info!(client_id = %id, "Client connected. Total clients: {}", roster.len());

        let mut evicted = self.deliver(&Message::canvas_state(self.canvas.snapshot()), Target::Only(&id));
        evicted.extend(self.deliver(&Message::user_joined(id.clone()), Target::AllExcept(&id)));
        evicted.extend(self.deliver(&Message::user_list(self.roster_ids()), Target::All));
        self.settle(evicted);
    }

    fn unregister(&mut self, id: &ClientId) {
        if self.registry.remove(id).is_none() {
            debug!(client_id = %id, "Ignoring unregister for unknown client");
            return;
        }
        let roster = self.publish_roster();
        info!(client_id = %id, "Client disconnected. Total clients: {}", roster.len());

        let mut evicted = self.deliver(&Message::user_left(id.clone()), Target::All);
        evicted.extend(self.deliver(&Message::user_list(roster), Target::All));
        self.settle(evicted);
    }

    fn apply_edit(&mut self, edit: CanvasEdit, author: &ClientId) {
        let message = match edit {
            CanvasEdit::Paint { point, color } => {
                if !self.canvas.set_pixel(point, &color) {
                    debug!(client_id = %author, "Ignoring out of bounds pixel {}", point);
                    return;
                }
                Message::pixel_update(point, color, author.clone())
            }
            CanvasEdit::Clear => {
                self.canvas.clear();
                info!(client_id = %author, "Canvas cleared");
                Message::canvas_clear()
            }
        };

        let evicted = self.deliver(&message, Target::All);
        self.settle(evicted);
    }

    /// Encode and fan out one message
    fn deliver(&mut self, message: &Message, target: Target<'_>) -> Vec<ClientId> {
        match message.encode() {
            Ok(frame) => self.fan_out(&frame, target),
            Err(e) => {
                error!("Failed to encode {} message: {}", message.kind(), e);
                Vec::new()
            }
        }
    }

    /// Offer `frame` to every targeted queue without waiting
    ///
    /// Agents whose queue is full or already closed are removed after the
    /// pass; dropping their sender closes the queue. Returns the evicted ids.
    fn fan_out(&mut self, frame: &Frame, target: Target<'_>) -> Vec<ClientId> {
        let mut failed = Vec::new();

        for (id, registration) in &self.registry {
            if !target.includes(id) {
                continue;
            }
            match registration.queue.try_send(frame.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(client_id = %id, "Outbound queue full, evicting slow client");
                    failed.push(id.clone());
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(client_id = %id, "Outbound queue already closed");
                    failed.push(id.clone());
                }
            }
        }

        if !failed.is_empty() {
            for id in &failed {
                self.registry.remove(id);
            }
            self.publish_roster();
        }

        failed
    }

    /// Announce evicted agents until a round evicts nobody
    fn settle(&mut self, mut evicted: Vec<ClientId>) {
        while !evicted.is_empty() {
            let departed = std::mem::take(&mut evicted);
            for id in departed {
                info!(client_id = %id, "Client evicted. Total clients: {}", self.registry.len());
                evicted.extend(self.deliver(&Message::user_left(id), Target::All));
            }
            evicted.extend(self.deliver(&Message::user_list(self.roster_ids()), Target::All));
        }
    }

    /// Registered ids in join order
    fn roster_ids(&self) -> Vec<ClientId> {
        let mut entries: Vec<(u64, &ClientId)> = self
            .registry
            .iter()
            .map(|(id, registration)| (registration.seq, id))
            .collect();
        entries.sort_unstable_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, id)| id.clone()).collect()
    }

    /// Recompute the roster and make it visible to readers
    fn publish_roster(&self) -> Vec<ClientId> {
        let roster = self.roster_ids();
        self.roster.store(Arc::new(roster.clone()));
        roster
    }
}

impl HubHandle {
    /// Add an agent; waits for intake capacity rather than dropping it
    pub async fn register(&self, agent: AgentHandle) -> Result<()> {
        self.commands
            .send(Command::Register(agent))
            .await
            .map_err(|_| HubError::HubClosed)
    }

    /// Remove an agent; a no-op if it is already gone
    pub async fn unregister(&self, id: ClientId) -> Result<()> {
        self.commands
            .send(Command::Unregister(id))
            .await
            .map_err(|_| HubError::HubClosed)
    }

    /// Queue a pre-encoded frame for every agent without waiting
    pub fn broadcast(&self, frame: Frame) -> Result<()> {
        self.try_submit(Command::Broadcast(frame))
    }

    /// Queue a canvas edit without waiting
    pub fn edit_canvas(&self, edit: CanvasEdit, author: ClientId) -> Result<()> {
        self.try_submit(Command::Edit { edit, author })
    }

    fn try_submit(&self, command: Command) -> Result<()> {
        self.commands.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) => HubError::Saturated,
            TrySendError::Closed(_) => HubError::HubClosed,
        })
    }

    /// Ask the hub to close every connection and stop
    pub async fn shutdown(&self) -> Result<()> {
        self.commands
            .send(Command::Shutdown)
            .await
            .map_err(|_| HubError::HubClosed)
    }

    /// Whether the hub still accepts commands
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    /// Number of registered agents
    pub fn client_count(&self) -> usize {
        self.roster.load().len()
    }

    /// Registered ids in join order
    pub fn roster(&self) -> Vec<ClientId> {
        self.roster.load().as_ref().clone()
    }

    /// The canvas edits are applied to
    pub fn canvas(&self) -> &Arc<Canvas> {
        &self.canvas
    }
}
