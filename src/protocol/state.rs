use tracing::{debug, info};

use crate::core::{Result, Role, SyncConfig, Tick};
use crate::store::{SettingsStore, WaypointStore};
use super::message::{Message, SyncKind, WaypointSubtype};
use super::payload::{command_message, setting_message, waypoint_message, Command};

/// Handshake progress of one end of the link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No handshake in progress
    Disconnected,
    /// Sent a sync request, waiting for the answer
    SyncSent,
    /// Answered a peer's sync request, waiting for its answer
    SyncReceived,
    /// Handshake complete; on-connection actions have fired
    Connected,
}

/// What the caller must do after feeding a sync message to the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncOutcome {
    /// Sync message to send back, if any
    pub reply: Option<SyncKind>,
    /// True exactly once per transition into [`ConnectionState::Connected`]
    pub connected: bool,
}

/// Messages one side sends once a connection is established
#[derive(Debug, Clone, Default)]
pub struct ConnectionUpload {
    /// Sent as soon as the connection completes
    pub immediate: Vec<Message>,
    /// Held back until the peer has confirmed every immediate message
    pub deferred: Vec<Message>,
}

/// Information about the current handshake state
#[derive(Debug, Clone)]
pub struct StateInfo {
    /// Current state type
    pub state_type: &'static str,
    /// Local role
    pub role: Role,
    /// Ticks spent in the current state
    pub time_in_state: Tick,
    /// Completed handshakes since creation
    pub connections: u32,
}

/// Connection handshake state machine
///
/// Either side may initiate. A handshake is REQUEST, RESPOND, then a closing
/// RESPOND from the initiator. The side answering a request cannot know its
/// RESPOND arrived, so it only connects on the closing one.
#[derive(Debug)]
pub struct SyncCoordinator {
    role: Role,
    state: ConnectionState,
    entered_at: Tick,
    config: SyncConfig,
    connections: u32,
}

impl SyncCoordinator {
    /// Creates a new coordinator in the disconnected state
    pub fn new(role: Role, config: SyncConfig) -> Self {
        SyncCoordinator {
            role,
            state: ConnectionState::Disconnected,
            entered_at: 0,
            config,
            connections: 0,
        }
    }

    /// Local role
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current handshake state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Returns true once the handshake has completed
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Gets information about the current state
    pub fn get_state_info(&self, now: Tick) -> StateInfo {
        let state_type = match self.state {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::SyncSent => "SyncSent",
            ConnectionState::SyncReceived => "SyncReceived",
            ConnectionState::Connected => "Connected",
        };
        StateInfo {
            state_type,
            role: self.role,
            time_in_state: now.saturating_sub(self.entered_at),
            connections: self.connections,
        }
    }

    /// Initiates the handshake; returns the sync message to send, if any
    ///
    /// Already connected links are left alone, and a handshake in progress is
    /// not restarted.
    pub fn connect(&mut self, now: Tick) -> Option<SyncKind> {
        match self.state {
            ConnectionState::Disconnected => {
                self.transition(ConnectionState::SyncSent, now);
                Some(SyncKind::Request)
            }
            _ => None,
        }
    }

    /// Handles a received sync message
    pub fn handle_sync(&mut self, kind: SyncKind, now: Tick) -> SyncOutcome {
        use ConnectionState::*;

        match (self.state, kind) {
            (Disconnected, SyncKind::Request) | (SyncSent, SyncKind::Request) => {
                self.transition(SyncReceived, now);
                SyncOutcome { reply: Some(SyncKind::Respond), connected: false }
            }
            (SyncReceived, SyncKind::Request) => {
                // Our answer was lost; answer again
                SyncOutcome { reply: Some(SyncKind::Respond), connected: false }
            }
            (Connected, SyncKind::Request) => {
                info!(role = ?self.role, "Peer restarted its handshake");
                self.transition(SyncReceived, now);
                SyncOutcome { reply: Some(SyncKind::Respond), connected: false }
            }
            (Disconnected, SyncKind::Respond) => {
                // Peer thinks a handshake is in progress; start one properly
                self.transition(SyncSent, now);
                SyncOutcome { reply: Some(SyncKind::Request), connected: false }
            }
            (SyncSent, SyncKind::Respond) => {
                self.enter_connected(now);
                SyncOutcome { reply: Some(SyncKind::Respond), connected: true }
            }
            (SyncReceived, SyncKind::Respond) => {
                self.enter_connected(now);
                SyncOutcome { reply: None, connected: true }
            }
            (Connected, SyncKind::Respond) => {
                debug!("Ignoring duplicate sync respond");
                SyncOutcome::default()
            }
        }
    }

    /// Restarts a half-open handshake that has waited too long
    pub fn poll(&mut self, now: Tick) -> Option<SyncKind> {
        match self.state {
            ConnectionState::SyncSent | ConnectionState::SyncReceived
                if now.saturating_sub(self.entered_at) >= self.config.sync_timeout =>
            {
                debug!(state = ?self.state, "Handshake timed out, re-sending request");
                self.transition(ConnectionState::SyncSent, now);
                Some(SyncKind::Request)
            }
            _ => None,
        }
    }

    /// Forces the disconnected state after the transport was lost
    pub fn reset(&mut self, now: Tick) {
        if self.state != ConnectionState::Disconnected {
            info!(role = ?self.role, "Link lost, handshake reset");
        }
        self.transition(ConnectionState::Disconnected, now);
    }

    /// Messages this role uploads when a connection is established
    ///
    /// The dashboard replaces the drone's route: CLEAR_WAYPOINTS first, then
    /// one ADD per waypoint once the clear is confirmed. The drone sends its
    /// settings table.
    pub fn on_connection_messages(
        &self,
        waypoints: &dyn WaypointStore,
        settings: &dyn SettingsStore,
    ) -> Result<ConnectionUpload> {
        match self.role {
            Role::Dashboard => Ok(ConnectionUpload {
                immediate: vec![command_message(&Command::ClearWaypoints)?],
                deferred: waypoints
                    .list()
                    .iter()
                    .map(|wp| waypoint_message(WaypointSubtype::Add, wp))
                    .collect::<Result<_>>()?,
            }),
            Role::Drone => Ok(ConnectionUpload {
                immediate: settings
                    .list()
                    .iter()
                    .map(setting_message)
                    .collect::<Result<_>>()?,
                deferred: Vec::new(),
            }),
        }
    }

    fn enter_connected(&mut self, now: Tick) {
        self.connections += 1;
        info!(role = ?self.role, connections = self.connections, "Link connected");
        self.transition(ConnectionState::Connected, now);
    }

    fn transition(&mut self, state: ConnectionState, now: Tick) {
        if self.state != state {
            debug!(from = ?self.state, to = ?state, "Handshake state change");
        }
        self.state = state;
        self.entered_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Setting, Waypoint};
    use crate::protocol::message::{DataSubtype, Subtype, WordSubtype};
    use crate::protocol::payload::decode_command;
    use crate::store::{SettingsTable, WaypointList};

    fn coordinator(role: Role) -> SyncCoordinator {
        SyncCoordinator::new(role, SyncConfig { sync_timeout: 100, auto_connect: true })
    }

    /// Delivers sync messages back and forth until both sides go quiet
    fn exchange(
        a: &mut SyncCoordinator,
        b: &mut SyncCoordinator,
        first: SyncKind,
    ) -> (u32, u32, usize) {
        let mut to_b = Some(first);
        let mut to_a = None;
        let (mut a_connected, mut b_connected, mut messages) = (0, 0, 1);
        for _ in 0..10 {
            if let Some(kind) = to_b.take() {
                let out = b.handle_sync(kind, 0);
                b_connected += out.connected as u32;
                to_a = out.reply;
                messages += out.reply.is_some() as usize;
            }
            if let Some(kind) = to_a.take() {
                let out = a.handle_sync(kind, 0);
                a_connected += out.connected as u32;
                to_b = out.reply;
                messages += out.reply.is_some() as usize;
            }
            if to_a.is_none() && to_b.is_none() {
                break;
            }
        }
        (a_connected, b_connected, messages)
    }

    #[test]
    fn test_connection_flow() {
        for initiator in [Role::Dashboard, Role::Drone] {
            let mut a = coordinator(initiator);
            let mut b = coordinator(initiator.peer());

            let request = a.connect(0).unwrap();
            assert_eq!(request, SyncKind::Request);
            assert_eq!(a.state(), ConnectionState::SyncSent);

            let (a_conn, b_conn, messages) = exchange(&mut a, &mut b, request);
            assert!(a.is_connected() && b.is_connected());
            assert_eq!((a_conn, b_conn), (1, 1));
            // request, respond, closing respond
            assert_eq!(messages, 3);
        }
    }

    #[test]
    fn test_simultaneous_open() {
        let mut a = coordinator(Role::Dashboard);
        let mut b = coordinator(Role::Drone);
        let ra = a.connect(0).unwrap();
        let rb = b.connect(0).unwrap();

        // Both requests cross on the wire
        let out_b = b.handle_sync(ra, 0);
        let out_a = a.handle_sync(rb, 0);
        assert_eq!(out_a.reply, Some(SyncKind::Respond));
        assert_eq!(out_b.reply, Some(SyncKind::Respond));

        let done_a = a.handle_sync(SyncKind::Respond, 0);
        let done_b = b.handle_sync(SyncKind::Respond, 0);
        assert!(done_a.connected && done_b.connected);
        assert_eq!(done_a.reply, None);
        assert_eq!(done_b.reply, None);
    }

    #[test]
    fn test_connected_fires_once() {
        let mut c = coordinator(Role::Drone);
        c.connect(0);
        assert!(c.handle_sync(SyncKind::Respond, 0).connected);
        assert!(!c.handle_sync(SyncKind::Respond, 0).connected);
        assert_eq!(c.get_state_info(0).connections, 1);
    }

    #[test]
    fn test_connect_is_idempotent() {
        let mut c = coordinator(Role::Dashboard);
        assert!(c.connect(0).is_some());
        assert!(c.connect(5).is_none());
        c.handle_sync(SyncKind::Respond, 10);
        assert!(c.connect(20).is_none());
    }

    #[test]
    fn test_reset_requires_full_handshake() {
        let mut c = coordinator(Role::Dashboard);
        c.connect(0);
        c.handle_sync(SyncKind::Respond, 0);
        assert!(c.is_connected());

        c.reset(50);
        assert_eq!(c.state(), ConnectionState::Disconnected);
        assert_eq!(c.connect(60), Some(SyncKind::Request));
        assert!(c.handle_sync(SyncKind::Respond, 70).connected);
        assert_eq!(c.get_state_info(70).connections, 2);
    }

    #[test]
    fn test_peer_restart_renegotiates() {
        let mut c = coordinator(Role::Drone);
        c.connect(0);
        c.handle_sync(SyncKind::Respond, 0);

        let out = c.handle_sync(SyncKind::Request, 10);
        assert_eq!(out.reply, Some(SyncKind::Respond));
        assert_eq!(c.state(), ConnectionState::SyncReceived);
        assert!(c.handle_sync(SyncKind::Respond, 20).connected);
    }

    #[test]
    fn test_unsolicited_respond_starts_handshake() {
        let mut c = coordinator(Role::Dashboard);
        let out = c.handle_sync(SyncKind::Respond, 0);
        assert_eq!(out.reply, Some(SyncKind::Request));
        assert_eq!(c.state(), ConnectionState::SyncSent);
    }

    #[test]
    fn test_half_open_timeout() {
        let mut c = coordinator(Role::Drone);
        c.handle_sync(SyncKind::Request, 0);
        assert_eq!(c.state(), ConnectionState::SyncReceived);

        assert_eq!(c.poll(99), None);
        assert_eq!(c.poll(100), Some(SyncKind::Request));
        assert_eq!(c.state(), ConnectionState::SyncSent);
        assert_eq!(c.poll(150), None);
        assert_eq!(c.poll(200), Some(SyncKind::Request));
    }

    #[test]
    fn test_state_info() {
        let mut c = coordinator(Role::Dashboard);
        let info = c.get_state_info(10);
        assert_eq!(info.state_type, "Disconnected");
        assert_eq!(info.role, Role::Dashboard);

        c.connect(10);
        let info = c.get_state_info(25);
        assert_eq!(info.state_type, "SyncSent");
        assert_eq!(info.time_in_state, 15);
    }

    #[test]
    fn test_on_connection_messages_by_role() {
        let mut waypoints = WaypointList::new();
        waypoints.add(Waypoint::new(0, 1.0, 2.0, 10)).unwrap();
        waypoints.add(Waypoint::new(1, 1.5, 2.5, 20)).unwrap();
        let mut settings = SettingsTable::new();
        settings.update(Setting::new(0, 0.5)).unwrap();

        let dashboard = coordinator(Role::Dashboard);
        let upload = dashboard.on_connection_messages(&waypoints, &settings).unwrap();
        assert_eq!(upload.immediate.len(), 1);
        assert_eq!(upload.immediate[0].subtype(), Subtype::Word(WordSubtype::Command));
        assert_eq!(
            decode_command(upload.immediate[0].payload()).unwrap(),
            Command::ClearWaypoints
        );
        assert_eq!(upload.deferred.len(), 2);
        assert!(upload
            .deferred
            .iter()
            .all(|m| m.subtype() == Subtype::Waypoint(WaypointSubtype::Add)));

        let drone = coordinator(Role::Drone);
        let upload = drone.on_connection_messages(&waypoints, &settings).unwrap();
        assert_eq!(upload.immediate.len(), 1);
        assert_eq!(upload.immediate[0].subtype(), Subtype::Data(DataSubtype::Setting));
        assert!(upload.deferred.is_empty());
    }

    #[test]
    fn test_empty_route_still_clears_peer() {
        let dashboard = coordinator(Role::Dashboard);
        let upload = dashboard
            .on_connection_messages(&WaypointList::new(), &SettingsTable::new())
            .unwrap();
        assert_eq!(upload.immediate.len(), 1);
        assert!(upload.deferred.is_empty());
    }
}
