use std::collections::HashMap;
use std::sync::mpsc;
use std::thread;

use crate::client::{EntityClient, WriteMode, WriteOutcome};
use crate::entity::Entity;
use crate::error::ApiError;

/// Independent request lanes of a page. A new request on a lane
/// supersedes whatever is in flight on that lane only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    List,
    Detail,
    Write,
}

/// Identifies one issued request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    pub slot: Slot,
    pub generation: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    FetchList { collection: String },
    FetchOne { collection: String, id: String },
    Write { collection: String, mode: WriteMode },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    List(Vec<Entity>),
    One(Entity),
    Written(WriteOutcome),
}

/// A finished request as delivered back to the UI thread.
#[derive(Debug)]
pub struct Completion {
    pub ticket: Ticket,
    pub result: Result<Response, ApiError>,
}

/// Hands out tickets and decides which completions are still wanted.
#[derive(Debug, Default)]
pub struct RequestTracker {
    current: HashMap<Slot, u64>,
    in_flight: HashMap<Slot, bool>,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bump the generation of `slot` and return the new ticket.
    pub fn issue(&mut self, slot: Slot) -> Ticket {
        let generation = self.current.entry(slot).or_insert(0);
        *generation += 1;
        self.in_flight.insert(slot, true);
        Ticket {
            slot,
            generation: *generation,
        }
    }

    pub fn is_current(&self, ticket: &Ticket) -> bool {
        self.current.get(&ticket.slot) == Some(&ticket.generation)
    }

    /// Accept `ticket` if it is the newest on its slot; a stale ticket is
    /// rejected and leaves the slot busy.
    pub fn complete(&mut self, ticket: &Ticket) -> bool {
        if !self.is_current(ticket) {
            tracing::debug!(
                slot = ?ticket.slot,
                generation = ticket.generation,
                current = self.current.get(&ticket.slot).copied().unwrap_or(0),
                "discarding superseded response"
            );
            return false;
        }
        self.in_flight.insert(ticket.slot, false);
        true
    }

    /// Forget whatever is in flight on `slot`; its response will be
    /// discarded when it arrives.
    pub fn cancel(&mut self, slot: Slot) {
        if let Some(generation) = self.current.get_mut(&slot) {
            *generation += 1;
        }
        self.in_flight.insert(slot, false);
    }

    pub fn is_busy(&self, slot: Slot) -> bool {
        self.in_flight.get(&slot).copied().unwrap_or(false)
    }

    pub fn any_busy(&self) -> bool {
        self.in_flight.values().any(|busy| *busy)
    }
}

/// Where pages send their requests. Implemented by [`HttpExecutor`];
/// tests substitute an in-memory backend.
pub trait EntityBackend {
    /// Queue `request` (non-blocking).
    fn submit(&mut self, ticket: Ticket, request: Request) -> Result<(), ApiError>;

    /// Next finished request, if any (non-blocking).
    fn try_recv(&mut self) -> Option<Completion>;

    /// Token to send with subsequent requests.
    fn set_token(&mut self, token: Option<String>) -> Result<(), ApiError>;
}

enum Command {
    Run(Ticket, Request),
    SetToken(Option<String>),
}

/// Background thread running requests on a tokio runtime, talking to
/// the UI thread over channels.
pub struct HttpExecutor {
    sender: mpsc::Sender<Command>,
    receiver: mpsc::Receiver<Completion>,
}

impl HttpExecutor {
    /// Spawn the executor thread. Requests run one at a time in
    /// submission order.
    pub fn spawn(client: EntityClient) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel::<Command>();
        let (result_tx, result_rx) = mpsc::channel::<Completion>();

        thread::spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    // Dropping cmd_rx makes every submit fail with ExecutorGone.
                    tracing::error!(error = %e, "failed to start request runtime");
                    return;
                }
            };

            let mut client = client;
            rt.block_on(async move {
                while let Ok(cmd) = cmd_rx.recv() {
                    match cmd {
                        Command::SetToken(token) => client.set_token(token),
                        Command::Run(ticket, request) => {
                            let result = execute(&client, request).await;
                            if result_tx.send(Completion { ticket, result }).is_err() {
                                break; // UI side dropped the receiver
                            }
                        }
                    }
                }
            });
        });

        Self {
            sender: cmd_tx,
            receiver: result_rx,
        }
    }
}

impl EntityBackend for HttpExecutor {
    fn submit(&mut self, ticket: Ticket, request: Request) -> Result<(), ApiError> {
        self.sender
            .send(Command::Run(ticket, request))
            .map_err(|_| ApiError::ExecutorGone)
    }

    fn try_recv(&mut self) -> Option<Completion> {
        self.receiver.try_recv().ok()
    }

    fn set_token(&mut self, token: Option<String>) -> Result<(), ApiError> {
        self.sender
            .send(Command::SetToken(token))
            .map_err(|_| ApiError::ExecutorGone)
    }
}

async fn execute(client: &EntityClient, request: Request) -> Result<Response, ApiError> {
    match request {
        Request::FetchList { collection } => {
            client.fetch_entities(&collection).await.map(Response::List)
        }
        Request::FetchOne { collection, id } => {
            client.fetch_entity(&collection, &id).await.map(Response::One)
        }
        Request::Write { collection, mode } => {
            let outcome = client.write_entity(&collection, mode).await?;
            match &outcome {
                WriteOutcome::Saved(entity) => {
                    tracing::info!(%collection, id = ?entity.id, "saved entity");
                }
                WriteOutcome::Deleted(existed) => {
                    tracing::info!(%collection, existed, "deleted entity");
                }
            }
            Ok(Response::Written(outcome))
        }
    }
}
