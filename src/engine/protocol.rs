//! Closed command/event contract between the routing layer and execution units.

use uuid::Uuid;

use crate::dto::ws::ServerEvent;

/// Identity of the connection a command arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandOrigin {
    /// Transport handle the reply (or error) should target.
    pub socket: Uuid,
    /// Authenticated participant identity.
    pub user_id: Uuid,
}

/// Commands forwarded from the routing layer into an execution unit.
///
/// Timer and delay variants are produced by the unit itself, looped through
/// its own command channel so they serialize with client commands.
#[derive(Debug, Clone)]
pub enum WorkerCommand {
    /// Originate a fresh session. Identity is assigned by the routing layer
    /// so ownership is registered before the unit ever sees the command.
    CreateMatch {
        /// Pre-assigned match identifier.
        match_id: Uuid,
        /// Pre-assigned shareable join code.
        join_code: String,
        /// Quiz to resolve questions from.
        quiz_id: Uuid,
        /// Originating connection.
        origin: CommandOrigin,
        /// Creator's display name.
        username: String,
    },
    /// Join an existing session.
    JoinMatch {
        /// Target match.
        match_id: Uuid,
        /// Originating connection.
        origin: CommandOrigin,
        /// Joiner's display name.
        username: String,
    },
    /// Reconnect a known participant to their session.
    ConnectToMatch {
        /// Target match.
        match_id: Uuid,
        /// Originating connection.
        origin: CommandOrigin,
    },
    /// Flag a participant as ready.
    PlayerReady {
        /// Target match.
        match_id: Uuid,
        /// Originating connection.
        origin: CommandOrigin,
    },
    /// Submit an answer for the current question.
    SubmitAnswer {
        /// Target match.
        match_id: Uuid,
        /// Originating connection.
        origin: CommandOrigin,
        /// Question the client believes is current; advisory only.
        question_id: Uuid,
        /// Selected option ids.
        selected_options: Vec<Uuid>,
        /// Seconds spent answering.
        time_spent: f64,
    },
    /// A participant's socket closed; clear their transport handle.
    ParticipantDisconnected {
        /// Target match.
        match_id: Uuid,
        /// Disconnected participant.
        user_id: Uuid,
        /// The socket that closed, to ignore stale notifications after a
        /// reconnect already replaced the handle.
        socket: Uuid,
    },
    /// Deferred auto-start trigger; re-validated at fire time.
    StartDelayElapsed {
        /// Target match.
        match_id: Uuid,
    },
    /// A per-question timeout fired.
    QuestionTimedOut {
        /// Target match.
        match_id: Uuid,
        /// Index the timer was armed for.
        question_index: usize,
    },
    /// Grace period after completion elapsed; drop the session everywhere.
    PurgeSession {
        /// Target match.
        match_id: Uuid,
    },
}

impl WorkerCommand {
    /// Match the command refers to.
    pub fn match_id(&self) -> Uuid {
        match self {
            WorkerCommand::CreateMatch { match_id, .. }
            | WorkerCommand::JoinMatch { match_id, .. }
            | WorkerCommand::ConnectToMatch { match_id, .. }
            | WorkerCommand::PlayerReady { match_id, .. }
            | WorkerCommand::SubmitAnswer { match_id, .. }
            | WorkerCommand::ParticipantDisconnected { match_id, .. }
            | WorkerCommand::StartDelayElapsed { match_id }
            | WorkerCommand::QuestionTimedOut { match_id, .. }
            | WorkerCommand::PurgeSession { match_id } => *match_id,
        }
    }

    /// Socket to report a failure to, when the command has a client origin.
    pub fn origin_socket(&self) -> Option<Uuid> {
        match self {
            WorkerCommand::CreateMatch { origin, .. }
            | WorkerCommand::JoinMatch { origin, .. }
            | WorkerCommand::ConnectToMatch { origin, .. }
            | WorkerCommand::PlayerReady { origin, .. }
            | WorkerCommand::SubmitAnswer { origin, .. } => Some(origin.socket),
            _ => None,
        }
    }
}

/// Events emitted by an execution unit for the routing layer to act on.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// Deliver an event to one named transport handle.
    Emit {
        /// Target socket.
        socket: Uuid,
        /// Payload.
        event: ServerEvent,
    },
    /// Deliver an event to every transport handle of a match, minus exclusions.
    Broadcast {
        /// Target match.
        match_id: Uuid,
        /// Sockets to skip.
        exclude: Vec<Uuid>,
        /// Payload.
        event: ServerEvent,
    },
    /// A participant's transport handle is now attached to a match.
    Bind {
        /// Match the participant belongs to.
        match_id: Uuid,
        /// Participant identity.
        user_id: Uuid,
        /// Attached socket.
        socket: Uuid,
        /// Join code to index, when known.
        join_code: Option<String>,
    },
    /// A participant's transport handle detached.
    Unbind {
        /// Match the participant belongs to.
        match_id: Uuid,
        /// Participant identity.
        user_id: Uuid,
    },
    /// The session is gone from this unit; routing entries can be dropped.
    Closed {
        /// Match that ended or was never found.
        match_id: Uuid,
    },
}
