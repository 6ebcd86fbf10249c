//! Runs a dashboard and a drone against each other over an in-process pipe
//! and prints what each side sees.

use std::time::Duration;

use drone_link::core::{LinkConfig, Role, Setting};
use drone_link::network::{Link, LinkDriver, LinkEvent};
use drone_link::protocol::payload::{command_message, Command};
use drone_link::store::{SettingsTable, WaypointList};
use drone_link::util::{init_logging, ticks_to_duration};
use tokio::sync::mpsc;

async fn print_events(name: &'static str, mut events: mpsc::Receiver<LinkEvent>) {
    while let Some(event) = events.recv().await {
        println!("[{}] {:?}", name, event);
    }
}

#[tokio::main]
async fn main() -> drone_link::Result<()> {
    init_logging("info")?;

    let (dash_io, drone_io) = tokio::io::duplex(256);

    let mut route = WaypointList::new();
    route.push(47.3769, 8.5417, 120)?;
    route.push(47.3800, 8.5450, 150)?;
    route.push(47.3820, 8.5400, 100)?;
    let settings: SettingsTable = [
        Setting::new(0, 0.8),
        Setting::new(1, 0.05),
        Setting::new(2, 0.2),
    ]
    .into_iter()
    .collect();

    let dash_config = LinkConfig::new(Role::Dashboard);
    let poll = ticks_to_duration(dash_config.poll_interval_ms);
    let dash_link = Link::new(&dash_config, route, SettingsTable::new())?;
    let (dash, dash_handle, dash_events) = LinkDriver::new(dash_link, dash_io, poll);

    let drone_config = LinkConfig::new(Role::Drone);
    let drone_link = Link::new(&drone_config, WaypointList::new(), settings)?;
    let (drone, drone_handle, drone_events) = LinkDriver::new(drone_link, drone_io, poll);

    tokio::spawn(print_events("dashboard", dash_events));
    tokio::spawn(print_events("drone", drone_events));
    let dash_task = tokio::spawn(dash.run());
    let drone_task = tokio::spawn(drone.run());

    tokio::time::sleep(Duration::from_millis(500)).await;
    dash_handle.send(command_message(&Command::Target(1))?).await?;
    tokio::time::sleep(Duration::from_millis(500)).await;

    drop(dash_handle);
    drop(drone_handle);
    for task in [dash_task, drone_task] {
        match task.await {
            Ok(Ok(link)) => println!("{:?} stopped, route has {} waypoints", link.role(), link.waypoints().len()),
            Ok(Err(e)) => eprintln!("Link failed: {}", e),
            Err(e) => eprintln!("Task failed: {}", e),
        }
    }
    Ok(())
}
