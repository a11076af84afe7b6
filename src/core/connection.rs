//! Connection state cache.
//!
//! Hot paths (decoration rendering, status bars) call
//! [`ConnectionCache::cached_connection`], which never suspends. Everything else
//! calls [`ConnectionCache::check_connection`], which refreshes at most once per
//! TTL and collapses concurrent refreshes into one `org display` call. Failures are
//! cached for the same TTL as successes so a broken setup is not hammered.

use crate::core::{
    clock::{is_fresh, SharedClock},
    error::{ErrorKind, SyncError, SyncFailure},
    gateway::{parse_cli_result, CommandGateway},
    query::{CommandBuilder, OrgDisplay},
    single_flight::SingleFlight,
};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionState {
    pub connected: bool,
    /// Username (or alias) of the connected org
    pub identity: Option<String>,
    pub last_checked: Option<DateTime<Utc>>,
    pub error: Option<SyncFailure>,
}

impl ConnectionState {
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    pub fn remediation_hint(&self) -> Option<&'static str> {
        self.error_kind().and_then(|kind| kind.remediation_hint())
    }
}

pub struct ConnectionCache {
    gateway: Arc<dyn CommandGateway>,
    commands: CommandBuilder,
    clock: SharedClock,
    ttl: Duration,
    timeout: std::time::Duration,
    state: RwLock<ConnectionState>,
    flight: SingleFlight<(), ConnectionState>,
}

impl ConnectionCache {
    pub fn new(
        gateway: Arc<dyn CommandGateway>,
        commands: CommandBuilder,
        clock: SharedClock,
        ttl: Duration,
        timeout: std::time::Duration,
    ) -> Self {
        Self {
            gateway,
            commands,
            clock,
            ttl,
            timeout,
            state: RwLock::new(ConnectionState::default()),
            flight: SingleFlight::new(),
        }
    }

    /// Last known state, possibly stale, without suspending
    pub fn cached_connection(&self) -> ConnectionState {
        self.state.read().clone()
    }

    /// Current state, refreshing through the gateway when the TTL has elapsed
    pub async fn check_connection(&self) -> ConnectionState {
        let now = self.clock.now();
        {
            let state = self.state.read();
            if let Some(checked) = state.last_checked {
                if is_fresh(checked, now, self.ttl) {
                    return state.clone();
                }
            }
        }

        let gateway = self.gateway.clone();
        let command = self.commands.org_display();
        let clock = self.clock.clone();
        let timeout = self.timeout;

        let fresh = self
            .flight
            .run((), move || async move {
                let outcome = match gateway.execute(&command, timeout).await {
                    Ok(raw) => interpret_org_display(&raw),
                    Err(err) => Err(err),
                };
                let checked_at = clock.now();
                match outcome {
                    Ok(identity) => ConnectionState {
                        connected: true,
                        identity: Some(identity),
                        last_checked: Some(checked_at),
                        error: None,
                    },
                    Err(err) => {
                        log::warn!("Org connection check failed: {err}");
                        ConnectionState {
                            connected: false,
                            identity: None,
                            last_checked: Some(checked_at),
                            error: Some(SyncFailure::from(&err)),
                        }
                    }
                }
            })
            .await;

        *self.state.write() = fresh.clone();
        fresh
    }

    /// Drop the cached state so the next check goes to the org
    pub fn invalidate(&self) {
        *self.state.write() = ConnectionState::default();
        self.flight.clear();
    }

    pub fn clear(&self) {
        self.invalidate();
    }
}

fn interpret_org_display(raw: &str) -> Result<String, SyncError> {
    let display: OrgDisplay = parse_cli_result(raw)?;
    if let Some(status) = display.connected_status.as_deref() {
        let normalized = status.to_lowercase();
        if normalized != "connected" && normalized != "active" {
            let lower = normalized.replace(' ', "");
            return Err(
                if lower.contains("expired") || lower.contains("refreshtoken") {
                    SyncError::auth_expired(status)
                } else {
                    SyncError::not_connected(status)
                },
            );
        }
    }
    display
        .username
        .or(display.alias)
        .ok_or_else(|| SyncError::not_connected("org display returned no username"))
}
