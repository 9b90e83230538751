//! Routing/broadcast layer: assigns sessions to execution units, forwards
//! authenticated commands, and fans unit events out to connected sockets.

use std::sync::{
    Arc, Mutex, MutexGuard,
    atomic::{AtomicUsize, Ordering},
};

use axum::extract::ws::Message;
use dashmap::DashMap;
use rand::Rng;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dto::ws::{ClientCommand, ServerEvent},
    engine::{
        protocol::{CommandOrigin, WorkerCommand, WorkerEvent},
        registry::MatchRegistry,
        worker,
    },
    error::ServiceError,
    state::Backends,
};

const JOIN_CODE_LENGTH: usize = 6;
// Uppercase alphanumerics minus the lookalikes (I/O/0/1).
const JOIN_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Handle used to push messages to a connected duel client.
#[derive(Clone)]
pub struct ClientConnection {
    /// Transport handle identifying the socket.
    pub socket_id: Uuid,
    /// Authenticated participant identity.
    pub user_id: Uuid,
    /// Account name presented during the handshake.
    pub username: String,
    /// Writer channel of the socket.
    pub tx: mpsc::UnboundedSender<Message>,
}

struct WorkerHandle {
    id: usize,
    tx: mpsc::UnboundedSender<WorkerCommand>,
    load: AtomicUsize,
}

impl WorkerHandle {
    fn is_alive(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// The routing/broadcast layer.
#[derive(Clone)]
pub struct Master {
    inner: Arc<MasterInner>,
}

struct MasterInner {
    config: Arc<AppConfig>,
    backends: Arc<Backends>,
    workers: Vec<WorkerHandle>,
    registry: Mutex<MatchRegistry>,
    connections: DashMap<Uuid, ClientConnection>,
}

impl Master {
    /// Spawn the configured number of execution units and the event pump.
    pub fn new(config: Arc<AppConfig>, backends: Arc<Backends>) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let workers = (0..config.worker_count())
            .map(|id| {
                let (tx, _task) = worker::spawn(id, config.clone(), backends.clone(), event_tx.clone());
                WorkerHandle {
                    id,
                    tx,
                    load: AtomicUsize::new(0),
                }
            })
            .collect();

        let inner = Arc::new(MasterInner {
            config,
            backends,
            workers,
            registry: Mutex::new(MatchRegistry::new()),
            connections: DashMap::new(),
        });

        tokio::spawn(run_event_pump(inner.clone(), event_rx));

        Self { inner }
    }

    /// Register an authenticated connection so events can reach it.
    pub fn register_connection(&self, connection: ClientConnection) {
        info!(
            socket_id = %connection.socket_id,
            user_id = %connection.user_id,
            username = %connection.username,
            "client connected"
        );
        self.inner
            .connections
            .insert(connection.socket_id, connection);
    }

    /// Drop a connection and tell the owning unit the participant went away.
    pub fn remove_connection(&self, socket_id: Uuid) {
        let Some((_, connection)) = self.inner.connections.remove(&socket_id) else {
            return;
        };
        info!(%socket_id, user_id = %connection.user_id, "client disconnected");

        let target = {
            let registry = self.inner.registry();
            registry
                .match_of_participant(connection.user_id)
                .and_then(|match_id| {
                    registry.owner_of(match_id).map(|worker| (match_id, worker))
                })
        };
        if let Some((match_id, worker)) = target {
            let _ = self.inner.workers[worker].tx.send(
                WorkerCommand::ParticipantDisconnected {
                    match_id,
                    user_id: connection.user_id,
                    socket: socket_id,
                },
            );
        }
    }

    /// Forward an authenticated command to the unit owning its match,
    /// assigning an owner first when the match is not routed yet. Failures
    /// are delivered back to the originating socket as `match_error` events.
    pub async fn dispatch(&self, origin: CommandOrigin, command: ClientCommand) {
        if let Err(err) = self.route_command(origin, command).await {
            debug!(socket_id = %origin.socket, error = %err, "command not routed");
            self.inner.deliver(
                origin.socket,
                &ServerEvent::MatchError {
                    error: err.to_string(),
                    code: err.code().to_string(),
                },
            );
        }
    }

    async fn route_command(
        &self,
        origin: CommandOrigin,
        command: ClientCommand,
    ) -> Result<(), ServiceError> {
        match command {
            ClientCommand::Authenticate { .. } => Err(ServiceError::InvalidState(
                "connection is already authenticated".into(),
            )),
            ClientCommand::CreateMatch {
                quiz_id,
                participant_info,
            } => {
                let match_id = Uuid::new_v4();
                let (worker, join_code) = {
                    let mut registry = self.inner.registry();
                    let worker = self.inner.pick_worker()?;
                    let join_code = generate_join_code(&registry);
                    registry.assign(match_id, worker, Some(join_code.clone()));
                    self.inner.workers[worker].load.fetch_add(1, Ordering::Relaxed);
                    (worker, join_code)
                };
                self.forward(
                    worker,
                    match_id,
                    WorkerCommand::CreateMatch {
                        match_id,
                        join_code,
                        quiz_id,
                        origin,
                        username: participant_info.username,
                    },
                )
            }
            ClientCommand::JoinMatch {
                match_id,
                join_code,
                participant_info,
            } => {
                let match_id = match (match_id, join_code) {
                    (Some(id), _) => id,
                    (None, Some(code)) => self.resolve_join_code(&code).await?,
                    (None, None) => {
                        return Err(ServiceError::InvalidInput(
                            "either match_id or join_code is required".into(),
                        ));
                    }
                };
                let worker = self.route_to_owner(match_id)?;
                self.forward(
                    worker,
                    match_id,
                    WorkerCommand::JoinMatch {
                        match_id,
                        origin,
                        username: participant_info.username,
                    },
                )
            }
            ClientCommand::ConnectToMatch { match_id } => {
                let worker = self.route_to_owner(match_id)?;
                self.forward(worker, match_id, WorkerCommand::ConnectToMatch { match_id, origin })
            }
            ClientCommand::PlayerReady => {
                let (match_id, worker) = self.route_for_participant(origin.user_id)?;
                self.forward(worker, match_id, WorkerCommand::PlayerReady { match_id, origin })
            }
            ClientCommand::SubmitAnswer {
                question_id,
                selected_options,
                time_spent,
            } => {
                let (match_id, worker) = self.route_for_participant(origin.user_id)?;
                self.forward(
                    worker,
                    match_id,
                    WorkerCommand::SubmitAnswer {
                        match_id,
                        origin,
                        question_id,
                        selected_options,
                        time_spent,
                    },
                )
            }
        }
    }

    /// Owner of a routed match, or a fresh assignment for an unrouted one
    /// (the assigned unit rehydrates the session from the durable store).
    fn route_to_owner(&self, match_id: Uuid) -> Result<usize, ServiceError> {
        let mut registry = self.inner.registry();
        if let Some(worker) = registry.owner_of(match_id) {
            if !self.inner.workers[worker].is_alive() {
                return Err(ServiceError::WorkerUnavailable(format!(
                    "execution unit {worker} is not responding"
                )));
            }
            return Ok(worker);
        }

        let worker = self.inner.pick_worker()?;
        registry.assign(match_id, worker, None);
        self.inner.workers[worker].load.fetch_add(1, Ordering::Relaxed);
        Ok(worker)
    }

    fn route_for_participant(&self, user_id: Uuid) -> Result<(Uuid, usize), ServiceError> {
        let registry = self.inner.registry();
        let match_id = registry
            .match_of_participant(user_id)
            .ok_or_else(|| ServiceError::NotFound("you are not in a match".into()))?;
        let worker = registry
            .owner_of(match_id)
            .ok_or_else(|| ServiceError::NotFound(format!("session `{match_id}` not found")))?;
        if !self.inner.workers[worker].is_alive() {
            return Err(ServiceError::WorkerUnavailable(format!(
                "execution unit {worker} is not responding"
            )));
        }
        Ok((match_id, worker))
    }

    async fn resolve_join_code(&self, code: &str) -> Result<Uuid, ServiceError> {
        let cached = {
            let registry = self.inner.registry();
            registry.resolve_code(code)
        };
        if let Some(match_id) = cached {
            return Ok(match_id);
        }

        // Another process may have issued the code; the durable store is the
        // cross-process source of truth.
        let store = self.inner.backends.require_session_store().await?;
        store
            .find_join_code(code.to_owned())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("unknown join code `{code}`")))
    }

    fn forward(
        &self,
        worker: usize,
        match_id: Uuid,
        command: WorkerCommand,
    ) -> Result<(), ServiceError> {
        if self.inner.workers[worker].tx.send(command).is_err() {
            // The unit died with commands in flight. Drop the route so the
            // next command reassigns and rehydrates from the durable store.
            warn!(worker, %match_id, "execution unit channel closed; dropping route");
            let mut registry = self.inner.registry();
            registry.remove_match(match_id);
            return Err(ServiceError::WorkerUnavailable(format!(
                "execution unit {worker} is gone; please retry"
            )));
        }
        Ok(())
    }
}

impl MasterInner {
    fn registry(&self) -> MutexGuard<'_, MatchRegistry> {
        self.registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Least-loaded live unit with spare capacity. Callers hold the registry
    /// lock so the pick and the load increment stay atomic.
    fn pick_worker(&self) -> Result<usize, ServiceError> {
        let capacity = self.config.worker_capacity();
        let mut best: Option<(usize, usize)> = None;
        for handle in &self.workers {
            if !handle.is_alive() {
                continue;
            }
            let load = handle.load.load(Ordering::Relaxed);
            if load >= capacity {
                continue;
            }
            if best.map(|(_, best_load)| load < best_load).unwrap_or(true) {
                best = Some((handle.id, load));
            }
        }

        match best {
            Some((id, _)) => Ok(id),
            None if self.workers.iter().any(WorkerHandle::is_alive) => Err(
                ServiceError::Capacity("all execution units are at capacity".into()),
            ),
            None => Err(ServiceError::WorkerUnavailable(
                "no execution unit is available".into(),
            )),
        }
    }

    fn deliver(&self, socket: Uuid, event: &ServerEvent) {
        match serde_json::to_string(event) {
            Ok(payload) => self.deliver_raw(socket, &payload),
            Err(err) => warn!(%socket, error = %err, "failed to serialize outbound event"),
        }
    }

    fn deliver_raw(&self, socket: Uuid, payload: &str) {
        let Some(connection) = self.connections.get(&socket) else {
            debug!(%socket, "dropping event for unknown socket");
            return;
        };
        if connection
            .tx
            .send(Message::Text(payload.to_owned().into()))
            .is_err()
        {
            warn!(%socket, "connection writer closed; dropping event");
        }
    }
}

async fn run_event_pump(
    inner: Arc<MasterInner>,
    mut events: mpsc::UnboundedReceiver<WorkerEvent>,
) {
    while let Some(event) = events.recv().await {
        match event {
            WorkerEvent::Emit { socket, event } => inner.deliver(socket, &event),
            WorkerEvent::Broadcast {
                match_id,
                exclude,
                event,
            } => {
                let sockets = {
                    let registry = inner.registry();
                    registry.sockets_for(match_id, &exclude)
                };
                match serde_json::to_string(&event) {
                    Ok(payload) => {
                        for socket in sockets {
                            inner.deliver_raw(socket, &payload);
                        }
                    }
                    Err(err) => {
                        warn!(%match_id, error = %err, "failed to serialize broadcast event")
                    }
                }
            }
            WorkerEvent::Bind {
                match_id,
                user_id,
                socket,
                join_code,
            } => {
                let mut registry = inner.registry();
                registry.bind(match_id, user_id, socket, join_code);
            }
            WorkerEvent::Unbind { match_id, user_id } => {
                let mut registry = inner.registry();
                registry.unbind(match_id, user_id);
            }
            WorkerEvent::Closed { match_id } => {
                let route = {
                    let mut registry = inner.registry();
                    registry.remove_match(match_id)
                };
                if let Some(route) = route {
                    let load = &inner.workers[route.worker].load;
                    let _ = load.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |value| {
                        value.checked_sub(1)
                    });
                }
            }
        }
    }
}

/// Generate a join code not currently indexed by the registry.
fn generate_join_code(registry: &MatchRegistry) -> String {
    let mut rng = rand::rng();
    loop {
        let code: String = (0..JOIN_CODE_LENGTH)
            .map(|_| {
                let index = rng.random_range(0..JOIN_CODE_ALPHABET.len());
                JOIN_CODE_ALPHABET[index] as char
            })
            .collect();
        if !registry.code_in_use(&code) {
            return code;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_codes_use_the_restricted_alphabet() {
        let registry = MatchRegistry::new();
        let code = generate_join_code(&registry);
        assert_eq!(code.len(), JOIN_CODE_LENGTH);
        assert!(
            code.bytes()
                .all(|byte| JOIN_CODE_ALPHABET.contains(&byte))
        );
    }
}
