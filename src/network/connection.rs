use std::time::Duration;

use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::codec::FramedRead;
use tracing::{debug, info, warn};

use crate::core::{Error, Result};
use crate::protocol::codec::FrameCodec;
use crate::protocol::message::Message;
use crate::store::{SettingsStore, WaypointStore};
use crate::util::duration_to_ticks;
use super::link::{Link, LinkEvent};

const CHANNEL_CAPACITY: usize = 100;

/// Requests the application can make of a running driver
#[derive(Debug)]
pub enum LinkCommand {
    /// Send a message, tracking it for confirmation if needed
    Send(Message),
    /// Start the handshake
    Connect,
}

/// Handle for queuing messages on a running driver
#[derive(Clone)]
pub struct LinkHandle {
    command_tx: mpsc::Sender<LinkCommand>,
}

impl LinkHandle {
    /// Queues a message for transmission
    pub async fn send(&self, message: Message) -> Result<()> {
        self.command(LinkCommand::Send(message)).await
    }

    /// Asks the driver to start the handshake
    pub async fn connect(&self) -> Result<()> {
        self.command(LinkCommand::Connect).await
    }

    async fn command(&self, command: LinkCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|e| Error::invalid_state(format!("Link driver stopped: {}", e)))
    }
}

/// Drives a [`Link`] over an async byte stream
///
/// The driver owns the link for its whole run. It ends when the stream
/// reaches end of file or every [`LinkHandle`] has been dropped, and hands
/// the link back so its stores can be inspected.
pub struct LinkDriver<T, W, S> {
    link: Link<W, S>,
    stream: T,
    poll_interval: Duration,
    command_rx: mpsc::Receiver<LinkCommand>,
    event_tx: mpsc::Sender<LinkEvent>,
}

impl<T, W, S> LinkDriver<T, W, S>
where
    T: AsyncRead + AsyncWrite + Unpin,
    W: WaypointStore,
    S: SettingsStore,
{
    /// Creates a driver together with its command handle and event stream
    pub fn new(
        link: Link<W, S>,
        stream: T,
        poll_interval: Duration,
    ) -> (Self, LinkHandle, mpsc::Receiver<LinkEvent>) {
        let (command_tx, command_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let driver = LinkDriver {
            link,
            stream,
            poll_interval,
            command_rx,
            event_tx,
        };
        (driver, LinkHandle { command_tx }, event_rx)
    }

    /// Runs until the stream closes or all handles are dropped
    pub async fn run(self) -> Result<Link<W, S>> {
        let LinkDriver {
            mut link,
            stream,
            poll_interval,
            mut command_rx,
            event_tx,
        } = self;

        let (reader, mut writer) = tokio::io::split(stream);
        let mut frames = FramedRead::new(reader, FrameCodec::new(link.framing())?);
        let started = Instant::now();
        let now = || duration_to_ticks(started.elapsed());

        let mut ticker = interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(role = ?link.role(), "Link driver started");
        loop {
            let events = tokio::select! {
                frame = frames.next() => match frame {
                    Some(Ok(frame)) => link.handle_frame(frame, now()),
                    Some(Err(e)) => {
                        warn!(error = %e, "Link read failed");
                        let events = link.transport_lost(now());
                        emit(&event_tx, events).await;
                        return Err(e);
                    }
                    None => {
                        info!("Link stream closed");
                        let events = link.transport_lost(now());
                        emit(&event_tx, events).await;
                        return Ok(link);
                    }
                },
                _ = ticker.tick() => link.poll(now()),
                command = command_rx.recv() => match command {
                    Some(LinkCommand::Send(message)) => {
                        link.send(&message, now());
                        Vec::new()
                    }
                    Some(LinkCommand::Connect) => {
                        link.connect(now());
                        Vec::new()
                    }
                    None => {
                        debug!("All link handles dropped, stopping driver");
                        flush(&mut link, &mut writer).await?;
                        return Ok(link);
                    }
                },
            };

            if let Err(e) = flush(&mut link, &mut writer).await {
                warn!(error = %e, "Link write failed");
                let mut lost = link.transport_lost(now());
                lost.splice(0..0, events);
                emit(&event_tx, lost).await;
                return Err(e);
            }
            emit(&event_tx, events).await;
        }
    }
}

async fn emit(event_tx: &mpsc::Sender<LinkEvent>, events: Vec<LinkEvent>) {
    for event in events {
        if event_tx.send(event).await.is_err() {
            debug!("Event receiver dropped");
            return;
        }
    }
}

async fn flush<W, S, O>(link: &mut Link<W, S>, writer: &mut O) -> Result<()>
where
    W: WaypointStore,
    S: SettingsStore,
    O: AsyncWrite + Unpin,
{
    if link.has_outgoing() {
        let bytes = link.take_outgoing();
        writer.write_all(&bytes).await?;
        writer.flush().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{LinkConfig, Role, Setting};
    use crate::protocol::payload::{command_message, Command};
    use crate::store::{SettingsTable, WaypointList};
    use tokio::time::timeout;

    fn driver<T: AsyncRead + AsyncWrite + Unpin>(
        role: Role,
        stream: T,
        waypoints: WaypointList,
        settings: SettingsTable,
        auto_connect: bool,
    ) -> (
        LinkDriver<T, WaypointList, SettingsTable>,
        LinkHandle,
        mpsc::Receiver<LinkEvent>,
    ) {
        let mut config = LinkConfig::new(role);
        config.sync.auto_connect = auto_connect;
        let link = Link::new(&config, waypoints, settings).unwrap();
        LinkDriver::new(link, stream, Duration::from_millis(5))
    }

    fn count(seen: &[LinkEvent], pred: impl Fn(&LinkEvent) -> bool) -> usize {
        seen.iter().filter(|e| pred(*e)).count()
    }

    async fn wait_for(
        events: &mut mpsc::Receiver<LinkEvent>,
        mut done: impl FnMut(&[LinkEvent]) -> bool,
    ) -> Vec<LinkEvent> {
        let mut seen = Vec::new();
        timeout(Duration::from_secs(5), async {
            while !done(&seen) {
                match events.recv().await {
                    Some(event) => seen.push(event),
                    None => break,
                }
            }
        })
        .await
        .expect("timed out waiting for link events");
        seen
    }

    #[tokio::test]
    async fn test_drivers_connect_and_sync() {
        let (a, b) = tokio::io::duplex(1024);

        let mut route = WaypointList::new();
        route.push(47.0, 8.0, 100).unwrap();
        route.push(47.5, 8.5, 120).unwrap();
        let settings: SettingsTable = [Setting::new(1, 0.5), Setting::new(2, 4.0)]
            .into_iter()
            .collect();

        let (dash, dash_handle, mut dash_events) =
            driver(Role::Dashboard, a, route.clone(), SettingsTable::new(), true);
        let (drone, drone_handle, mut drone_events) =
            driver(Role::Drone, b, WaypointList::new(), settings.clone(), true);

        let dash_task = tokio::spawn(dash.run());
        let drone_task = tokio::spawn(drone.run());

        // Route received, settings upload confirmed
        let seen = wait_for(&mut drone_events, |seen| {
            count(seen, |e| matches!(e, LinkEvent::WaypointAdded(_))) == 2
                && count(seen, |e| matches!(e, LinkEvent::Confirmed(_))) == 2
        })
        .await;
        assert_eq!(count(&seen, |e| *e == LinkEvent::Connected), 1);

        // Settings received, clear and route upload confirmed
        let seen = wait_for(&mut dash_events, |seen| {
            count(seen, |e| matches!(e, LinkEvent::SettingUpdated(_))) == 2
                && count(seen, |e| matches!(e, LinkEvent::Confirmed(_))) == 3
        })
        .await;
        assert_eq!(count(&seen, |e| *e == LinkEvent::Connected), 1);

        let target = command_message(&Command::Target(1)).unwrap();
        let checksum = target.checksum();
        tokio_test::assert_ok!(dash_handle.send(target).await);
        wait_for(&mut drone_events, |seen| {
            seen.contains(&LinkEvent::Command(Command::Target(1)))
        })
        .await;
        wait_for(&mut dash_events, |seen| {
            seen.contains(&LinkEvent::Confirmed(checksum))
        })
        .await;

        drop(dash_handle);
        drop(drone_handle);
        let dash_link = dash_task.await.unwrap().unwrap();
        let drone_link = drone_task.await.unwrap().unwrap();

        assert_eq!(drone_link.waypoints(), &route);
        assert_eq!(dash_link.settings(), &settings);
        assert_eq!(dash_link.reliability().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_driver_stops_on_eof() {
        let (a, b) = tokio::io::duplex(64);
        let (dash, _handle, _events) =
            driver(Role::Dashboard, a, WaypointList::new(), SettingsTable::new(), false);
        drop(b);

        let result = timeout(Duration::from_secs(5), dash.run())
            .await
            .expect("driver did not stop");
        let link = tokio_test::assert_ok!(result);
        assert!(!link.is_connected());
    }

    #[tokio::test]
    async fn test_handle_reports_stopped_driver() {
        let (a, _b) = tokio::io::duplex(64);
        let (dash, handle, _events) =
            driver(Role::Dashboard, a, WaypointList::new(), SettingsTable::new(), false);
        drop(dash);
        tokio_test::assert_err!(handle.connect().await);
    }
}
