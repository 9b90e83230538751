//! Routing table mapping matches to owning units and connected sockets.
//!
//! One backing collection with two lookup indices (join code and participant
//! id), always updated together so the views can never diverge.

use std::collections::HashMap;

use uuid::Uuid;

/// Routing entry for one match.
#[derive(Debug, Clone)]
pub struct MatchRoute {
    /// Execution unit owning the match.
    pub worker: usize,
    /// Shareable code indexed for this match, if known.
    pub join_code: Option<String>,
    /// Connected transport handles keyed by participant id.
    pub sockets: HashMap<Uuid, Uuid>,
}

/// The master-side routing table.
#[derive(Debug, Default)]
pub struct MatchRegistry {
    routes: HashMap<Uuid, MatchRoute>,
    codes: HashMap<String, Uuid>,
    participants: HashMap<Uuid, Uuid>,
}

impl MatchRegistry {
    /// Build an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Unit owning a match, if routed.
    pub fn owner_of(&self, match_id: Uuid) -> Option<usize> {
        self.routes.get(&match_id).map(|route| route.worker)
    }

    /// Resolve a join code to its match.
    pub fn resolve_code(&self, code: &str) -> Option<Uuid> {
        self.codes.get(code).copied()
    }

    /// Match a participant currently belongs to.
    pub fn match_of_participant(&self, user_id: Uuid) -> Option<Uuid> {
        self.participants.get(&user_id).copied()
    }

    /// Whether a join code is already indexed.
    pub fn code_in_use(&self, code: &str) -> bool {
        self.codes.contains_key(code)
    }

    /// Number of routed matches.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether no match is routed.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Register ownership of a match. Idempotent for an existing route.
    pub fn assign(&mut self, match_id: Uuid, worker: usize, join_code: Option<String>) {
        let route = self.routes.entry(match_id).or_insert_with(|| MatchRoute {
            worker,
            join_code: None,
            sockets: HashMap::new(),
        });
        if let Some(code) = join_code {
            route.join_code = Some(code.clone());
            self.codes.insert(code, match_id);
        }
    }

    /// Attach a participant's transport handle to a match.
    pub fn bind(
        &mut self,
        match_id: Uuid,
        user_id: Uuid,
        socket: Uuid,
        join_code: Option<String>,
    ) {
        let Some(route) = self.routes.get_mut(&match_id) else {
            return;
        };
        route.sockets.insert(user_id, socket);
        self.participants.insert(user_id, match_id);
        if let Some(code) = join_code {
            route.join_code = Some(code.clone());
            self.codes.insert(code, match_id);
        }
    }

    /// Detach a participant's transport handle.
    pub fn unbind(&mut self, match_id: Uuid, user_id: Uuid) {
        if let Some(route) = self.routes.get_mut(&match_id) {
            route.sockets.remove(&user_id);
        }
        if self.participants.get(&user_id) == Some(&match_id) {
            self.participants.remove(&user_id);
        }
    }

    /// Drop a match and both of its indices in one step.
    pub fn remove_match(&mut self, match_id: Uuid) -> Option<MatchRoute> {
        let route = self.routes.remove(&match_id)?;
        if let Some(code) = route.join_code.as_deref() {
            if self.codes.get(code) == Some(&match_id) {
                self.codes.remove(code);
            }
        }
        self.participants
            .retain(|_, routed_match| *routed_match != match_id);
        Some(route)
    }

    /// Connected sockets of a match, minus an exclusion list.
    pub fn sockets_for(&self, match_id: Uuid, exclude: &[Uuid]) -> Vec<Uuid> {
        self.routes
            .get(&match_id)
            .map(|route| {
                route
                    .sockets
                    .values()
                    .copied()
                    .filter(|socket| !exclude.contains(socket))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_stay_consistent_through_the_lifecycle() {
        let mut registry = MatchRegistry::new();
        let match_id = Uuid::new_v4();
        let user = Uuid::new_v4();
        let socket = Uuid::new_v4();

        registry.assign(match_id, 2, Some("AB12CD".into()));
        assert_eq!(registry.owner_of(match_id), Some(2));
        assert_eq!(registry.resolve_code("AB12CD"), Some(match_id));

        registry.bind(match_id, user, socket, None);
        assert_eq!(registry.match_of_participant(user), Some(match_id));
        assert_eq!(registry.sockets_for(match_id, &[]), vec![socket]);

        registry.remove_match(match_id);
        assert!(registry.is_empty());
        assert_eq!(registry.resolve_code("AB12CD"), None);
        assert_eq!(registry.match_of_participant(user), None);
    }

    #[test]
    fn unbind_clears_only_the_given_participant() {
        let mut registry = MatchRegistry::new();
        let match_id = Uuid::new_v4();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let (alice_socket, bob_socket) = (Uuid::new_v4(), Uuid::new_v4());

        registry.assign(match_id, 0, None);
        registry.bind(match_id, alice, alice_socket, None);
        registry.bind(match_id, bob, bob_socket, None);

        registry.unbind(match_id, alice);
        assert_eq!(registry.match_of_participant(alice), None);
        assert_eq!(registry.match_of_participant(bob), Some(match_id));
        assert_eq!(registry.sockets_for(match_id, &[]), vec![bob_socket]);
    }

    #[test]
    fn sockets_for_honors_the_exclusion_list() {
        let mut registry = MatchRegistry::new();
        let match_id = Uuid::new_v4();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let (alice_socket, bob_socket) = (Uuid::new_v4(), Uuid::new_v4());

        registry.assign(match_id, 0, None);
        registry.bind(match_id, alice, alice_socket, None);
        registry.bind(match_id, bob, bob_socket, None);

        let sockets = registry.sockets_for(match_id, &[alice_socket]);
        assert_eq!(sockets, vec![bob_socket]);
    }

    #[test]
    fn rebinding_replaces_the_socket_for_a_participant() {
        let mut registry = MatchRegistry::new();
        let match_id = Uuid::new_v4();
        let user = Uuid::new_v4();

        registry.assign(match_id, 0, None);
        registry.bind(match_id, user, Uuid::new_v4(), None);
        let fresh = Uuid::new_v4();
        registry.bind(match_id, user, fresh, None);

        assert_eq!(registry.sockets_for(match_id, &[]), vec![fresh]);
    }
}
