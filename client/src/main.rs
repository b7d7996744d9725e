//! Headless tracking client.
//!
//! Signs in with `RIDESYNC_USER_ID` / `RIDESYNC_TOKEN` (and optionally
//! `RIDESYNC_ROLE`), then logs every entitlement, ride, vehicle, and
//! connection change until Ctrl-C. Variables may also come from a `.env`
//! file in the working directory.

use anyhow::{Context, Result};
use ridesync_client::types::{UserProfile, UserRole};
use ridesync_client::{TrackerClient, TrackerConfig, TrackerState, telemetry};
use std::time::Duration;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    let _ = dotenvy::dotenv();

    telemetry::init_tracing().context("failed to install tracing subscriber")?;

    let user_id = std::env::var("RIDESYNC_USER_ID").context("RIDESYNC_USER_ID is not set")?;
    let token = std::env::var("RIDESYNC_TOKEN").context("RIDESYNC_TOKEN is not set")?;
    let role = match std::env::var("RIDESYNC_ROLE") {
        Ok(role) => role.parse::<UserRole>().map_err(anyhow::Error::msg)?,
        Err(_) => UserRole::Passenger,
    };

    let config = TrackerConfig::from_env();
    tracing::info!(api = %config.api_base_url, socket = %config.socket_url, "Starting ridesync");

    let client = TrackerClient::from_config(config)
        .await
        .context("failed to build client")?;

    let entitlement = client
        .start_session(UserProfile::new(user_id, role), token, false)
        .await
        .context("failed to start session")?;
    tracing::info!(entitlement = entitlement.kind().as_str(), "Signed in");

    let mut states = client.subscribe();
    let mut connection = client.connection_status();
    let mut last = states.borrow().clone();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = states.borrow_and_update().clone();
                log_changes(&last, &current);
                last = current;
            }
            changed = connection.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = *connection.borrow_and_update();
                tracing::info!(?status, "Connection");
            }
        }
    }

    client
        .shutdown(SHUTDOWN_TIMEOUT)
        .await
        .context("shutdown did not complete")?;
    Ok(())
}

fn log_changes(previous: &TrackerState, current: &TrackerState) {
    if previous.entitlement != current.entitlement {
        tracing::info!(entitlement = current.entitlement.kind().as_str(), "Entitlement changed");
    }

    if previous.ride != current.ride {
        let ride = &current.ride;
        tracing::info!(
            ride_id = ?ride.id,
            status = %ride.status,
            driver = ?ride.assigned_driver_id,
            location = ?ride.vehicle_snapshot.as_ref().and_then(|v| v.coordinates),
            "Ride"
        );
    }

    if previous.vehicles.vehicles != current.vehicles.vehicles {
        tracing::info!(
            count = current.vehicles.vehicles.len(),
            source = current.vehicles.source.map(|s| s.as_str()),
            "Nearby vehicles"
        );
    }
}
