//! One end of the drone link
//!
//! [`Link`] ties the frame codec, the reliability manager and the handshake
//! coordinator to the application stores. It is driven entirely by the
//! caller: feed it received bytes, poll it with the current tick, and write
//! out whatever it queued.

use std::collections::HashSet;

use bytes::{Bytes, BytesMut};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::{FramingConfig, LinkConfig, Result, Role, Setting, Tick, Waypoint};
use crate::protocol::codec::{CodecStats, Frame, FrameCodec};
use crate::protocol::message::{
    DataSubtype, Message, StringSubtype, Subtype, SyncKind, WaypointSubtype, WordSubtype,
};
use crate::protocol::payload::{
    decode_command, decode_confirmation, decode_setting, decode_sync, decode_telemetry,
    decode_text, decode_waypoint, sync_message, Command, Telemetry,
};
use crate::protocol::reliability::{DeliveryFailure, ReliabilityManager};
use crate::protocol::state::{ConnectionState, SyncCoordinator};
use crate::store::{SettingsStore, WaypointStore};
use super::Transport;

/// Something the application should know about
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum LinkEvent {
    /// Handshake completed
    Connected,
    /// Transport lost while a handshake was in progress or complete
    Disconnected,
    /// Peer confirmed one of our messages
    Confirmed(u16),
    /// Peer stored a waypoint in our route
    WaypointAdded(Waypoint),
    /// Peer changed a waypoint in our route
    WaypointAltered(Waypoint),
    /// Peer removed a waypoint from our route
    WaypointDeleted(u8),
    /// Peer dropped our whole route
    WaypointsCleared,
    /// Peer changed a setting
    SettingUpdated(Setting),
    /// Telemetry sample from the peer
    Telemetry(Telemetry),
    /// Operator command for the application
    Command(Command),
    /// Error report from the peer
    Error(String),
    /// State report from the peer
    State(String),
    /// A message was never confirmed
    DeliveryFailed(DeliveryFailure),
    /// A valid frame did not name a known message
    DecodeFailed { label: u8, reason: String },
    /// A message arrived but could not be applied
    ApplyFailed { subtype: Subtype, reason: String },
}

/// On-connection messages held until earlier ones are confirmed
#[derive(Debug)]
struct DeferredUpload {
    awaiting: HashSet<u16>,
    messages: Vec<Message>,
}

/// Polling-driven link endpoint
pub struct Link<W, S> {
    framing: FramingConfig,
    codec: FrameCodec,
    reliability: ReliabilityManager,
    sync: SyncCoordinator,
    waypoints: W,
    settings: S,
    outgoing: BytesMut,
    deferred: Option<DeferredUpload>,
    auto_connect: bool,
}

impl<W: WaypointStore, S: SettingsStore> Link<W, S> {
    /// Creates a link endpoint over the given stores
    pub fn new(config: &LinkConfig, waypoints: W, settings: S) -> Result<Self> {
        config.validate()?;
        Ok(Link {
            framing: config.framing.clone(),
            codec: FrameCodec::new(&config.framing)?,
            reliability: ReliabilityManager::new(config.reliability.clone()),
            sync: SyncCoordinator::new(config.role, config.sync.clone()),
            waypoints,
            settings,
            outgoing: BytesMut::new(),
            deferred: None,
            auto_connect: config.sync.auto_connect,
        })
    }

    /// Local role
    pub fn role(&self) -> Role {
        self.sync.role()
    }

    /// Handshake state
    pub fn state(&self) -> ConnectionState {
        self.sync.state()
    }

    /// Returns true once the handshake has completed
    pub fn is_connected(&self) -> bool {
        self.sync.is_connected()
    }

    /// Route store
    pub fn waypoints(&self) -> &W {
        &self.waypoints
    }

    /// Mutable route store, for local edits
    pub fn waypoints_mut(&mut self) -> &mut W {
        &mut self.waypoints
    }

    /// Settings store
    pub fn settings(&self) -> &S {
        &self.settings
    }

    /// Mutable settings store, for local edits
    pub fn settings_mut(&mut self) -> &mut S {
        &mut self.settings
    }

    /// Confirmation tracker
    pub fn reliability(&self) -> &ReliabilityManager {
        &self.reliability
    }

    /// Frame delimiters in use
    pub fn framing(&self) -> &FramingConfig {
        &self.framing
    }

    /// Decoder counters
    pub fn codec_stats(&self) -> CodecStats {
        self.codec.stats()
    }

    /// Frames `message` for transmission and tracks it if it needs confirmation
    ///
    /// A [`Message`] is length-checked when it is built, so framing it
    /// cannot fail.
    pub fn send(&mut self, message: &Message, now: Tick) {
        let frame = self.codec.frame(message).freeze();
        if self.reliability.register(message, frame.clone(), now) {
            debug!(subtype = ?message.subtype(), checksum = message.checksum(), "Awaiting confirmation");
        }
        self.outgoing.extend_from_slice(&frame);
    }

    /// Starts the handshake unless one is already running
    pub fn connect(&mut self, now: Tick) {
        if let Some(kind) = self.sync.connect(now) {
            self.send(&sync_message(kind), now);
        }
    }

    /// Feeds received bytes through the decoder and handles every frame
    pub fn receive(&mut self, bytes: &[u8], now: Tick) -> Vec<LinkEvent> {
        let mut events = Vec::new();
        for frame in self.codec.decode_all(bytes) {
            self.process_frame(frame, now, &mut events);
        }
        events
    }

    /// Handles a frame decoded outside this link
    pub fn handle_frame(&mut self, frame: Frame, now: Tick) -> Vec<LinkEvent> {
        let mut events = Vec::new();
        self.process_frame(frame, now, &mut events);
        events
    }

    /// Runs timers: retransmissions, handshake timeouts and auto-connect
    pub fn poll(&mut self, now: Tick) -> Vec<LinkEvent> {
        let mut events = Vec::new();

        let outcome = self.reliability.poll(now);
        for frame in outcome.retransmit {
            self.outgoing.extend_from_slice(&frame);
        }
        for failure in &outcome.failed {
            let gated = self
                .deferred
                .as_ref()
                .map_or(false, |upload| upload.awaiting.contains(&failure.checksum));
            if gated {
                warn!(checksum = failure.checksum, "Upload abandoned, its first part was never confirmed");
                self.deferred = None;
            }
        }
        events.extend(outcome.failed.into_iter().map(LinkEvent::DeliveryFailed));

        let request = match self.sync.poll(now) {
            Some(kind) => Some(kind),
            None if self.auto_connect => self.sync.connect(now),
            None => None,
        };
        if let Some(kind) = request {
            self.send(&sync_message(kind), now);
        }
        events
    }

    /// Takes every byte queued for transmission
    pub fn take_outgoing(&mut self) -> Bytes {
        self.outgoing.split().freeze()
    }

    /// Returns true if bytes are waiting to be written
    pub fn has_outgoing(&self) -> bool {
        !self.outgoing.is_empty()
    }

    /// Resets the link after the transport went away
    pub fn transport_lost(&mut self, now: Tick) -> Vec<LinkEvent> {
        let was_active = self.sync.state() != ConnectionState::Disconnected;
        self.sync.reset(now);
        self.reliability.clear();
        self.codec.reset();
        self.outgoing.clear();
        self.deferred = None;
        if was_active {
            vec![LinkEvent::Disconnected]
        } else {
            Vec::new()
        }
    }

    /// One polling cycle over a non-blocking transport
    ///
    /// Reads until the transport has nothing more, runs timers and writes
    /// out everything queued. A transport error resets the link before it
    /// is returned.
    pub fn service<T: Transport>(&mut self, transport: &mut T, now: Tick) -> Result<Vec<LinkEvent>> {
        let mut received = Vec::new();
        loop {
            match transport.read_byte() {
                Ok(Some(byte)) => received.push(byte),
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Transport read failed");
                    self.transport_lost(now);
                    return Err(e);
                }
            }
        }

        let mut events = self.receive(&received, now);
        events.extend(self.poll(now));

        if self.has_outgoing() {
            let bytes = self.take_outgoing();
            if let Err(e) = transport.write(&bytes) {
                warn!(error = %e, "Transport write failed");
                self.transport_lost(now);
                return Err(e);
            }
        }
        Ok(events)
    }

    fn process_frame(&mut self, frame: Frame, now: Tick, events: &mut Vec<LinkEvent>) {
        let message = match frame.message() {
            Ok(message) => message,
            Err(e) => {
                debug!(label = frame.label.pack(), error = %e, "Undecodable frame");
                events.push(LinkEvent::DecodeFailed {
                    label: frame.label.pack(),
                    reason: e.to_string(),
                });
                return;
            }
        };

        // Confirm only after a successful apply
        let subtype = message.subtype();
        let ack = self.reliability.acknowledgment_for(subtype, frame.checksum);
        if ack.is_some() && self.reliability.recently_applied(frame.checksum, now) {
            debug!(subtype = ?subtype, checksum = frame.checksum, "Already applied, confirming again");
        } else if let Err(e) = self.dispatch(&message, now, events) {
            warn!(subtype = ?subtype, error = %e, "Failed to apply message");
            events.push(LinkEvent::ApplyFailed {
                subtype,
                reason: e.to_string(),
            });
            return;
        }

        if let Some(ack) = ack {
            self.reliability.mark_applied(frame.checksum, now);
            self.send(&ack, now);
        }
    }

    fn dispatch(&mut self, message: &Message, now: Tick, events: &mut Vec<LinkEvent>) -> Result<()> {
        let payload = message.payload();
        match message.subtype() {
            Subtype::Word(WordSubtype::Confirmation) => {
                let checksum = decode_confirmation(payload)?;
                if self.reliability.confirm(checksum) {
                    events.push(LinkEvent::Confirmed(checksum));
                    self.release_deferred(checksum, now);
                }
            }
            Subtype::Word(WordSubtype::Sync) => {
                let kind = decode_sync(payload)?;
                self.handle_sync(kind, now, events)?;
            }
            Subtype::Word(WordSubtype::Command) => match decode_command(payload)? {
                Command::ClearWaypoints => {
                    self.waypoints.clear();
                    events.push(LinkEvent::WaypointsCleared);
                }
                Command::DeleteWaypoint(index) => {
                    self.waypoints.delete(index)?;
                    events.push(LinkEvent::WaypointDeleted(index));
                }
                command => events.push(LinkEvent::Command(command)),
            },
            Subtype::Waypoint(WaypointSubtype::Add) => {
                let waypoint = decode_waypoint(payload)?;
                self.waypoints.add(waypoint)?;
                events.push(LinkEvent::WaypointAdded(waypoint));
            }
            Subtype::Waypoint(WaypointSubtype::Alter) => {
                let waypoint = decode_waypoint(payload)?;
                self.waypoints.alter(waypoint)?;
                events.push(LinkEvent::WaypointAltered(waypoint));
            }
            Subtype::Data(DataSubtype::Setting) => {
                let setting = decode_setting(payload)?;
                self.settings.update(setting)?;
                events.push(LinkEvent::SettingUpdated(setting));
            }
            Subtype::Data(DataSubtype::Telemetry) => {
                events.push(LinkEvent::Telemetry(decode_telemetry(payload)?));
            }
            Subtype::String(StringSubtype::Error) => {
                events.push(LinkEvent::Error(decode_text(payload)?));
            }
            Subtype::String(StringSubtype::State) => {
                events.push(LinkEvent::State(decode_text(payload)?));
            }
        }
        Ok(())
    }

    fn handle_sync(&mut self, kind: SyncKind, now: Tick, events: &mut Vec<LinkEvent>) -> Result<()> {
        let outcome = self.sync.handle_sync(kind, now);
        if let Some(reply) = outcome.reply {
            self.send(&sync_message(reply), now);
        }
        if !outcome.connected {
            return Ok(());
        }

        events.push(LinkEvent::Connected);
        // The peer may repeat messages from an earlier connection
        self.reliability.forget_applied();
        self.deferred = None;

        let upload = self
            .sync
            .on_connection_messages(&self.waypoints, &self.settings)?;
        info!(
            role = ?self.role(),
            immediate = upload.immediate.len(),
            deferred = upload.deferred.len(),
            "Uploading state to peer"
        );

        let mut awaiting = HashSet::new();
        for message in &upload.immediate {
            self.send(message, now);
            if self.reliability.is_pending(message.checksum()) {
                awaiting.insert(message.checksum());
            }
        }
        if awaiting.is_empty() {
            for message in &upload.deferred {
                self.send(message, now);
            }
        } else if !upload.deferred.is_empty() {
            self.deferred = Some(DeferredUpload {
                awaiting,
                messages: upload.deferred,
            });
        }
        Ok(())
    }

    /// Sends the held-back upload once its last gating message is confirmed
    fn release_deferred(&mut self, checksum: u16, now: Tick) {
        let ready = match self.deferred.as_mut() {
            Some(upload) => upload.awaiting.remove(&checksum) && upload.awaiting.is_empty(),
            None => false,
        };
        if !ready {
            return;
        }
        if let Some(upload) = self.deferred.take() {
            debug!(count = upload.messages.len(), "Sending deferred upload");
            for message in &upload.messages {
                self.send(message, now);
            }
        }
    }
}
