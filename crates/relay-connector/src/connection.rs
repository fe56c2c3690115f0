//! `ConnectorConnection` (C9): the connector's half of the hub session
//! lifecycle.
//!
//! Two deliberate departures from a naive port of a `Dispose`-under-lock,
//! recurse-on-failure client:
//!
//! - Lifecycle is an explicit state machine (`ConnectionState`) with a
//!   single-shot `CancellationToken` for `stop()`, not a blocking dispose
//!   call re-entering async teardown while holding a lock.
//! - Reconnection is an iterative loop with exponential backoff bounded by
//!   the tenant's configured min/max reconnect delay, not unbounded
//!   recursion on a fixed delay.
//!
//! `state` is guarded by a plain `std::sync::Mutex` and nothing is ever
//! awaited while it's held - the lock protects the enum, not the session.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use relay_proto::{TenantConfig, TenantId};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::broker_client::BrokerPublisher;
use crate::hub_client::HubSession;
use crate::target::TargetHandler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    Connected { connection_id: String },
    Reconnecting { connection_id: String },
    Reconnected { connection_id: String },
    Disconnected { connection_id: String },
}

/// Fixed dial targets and identity; distinct from `TenantConfig`, which can
/// change mid-session via `Configure`.
#[derive(Debug, Clone)]
pub struct ConnectionTarget {
    pub hub_dealer_endpoint: String,
    pub broker_pub_endpoint: String,
    pub tenant_id: TenantId,
    pub binary_size_threshold: u64,
}

/// Drives one connector's hub session to `Connected` and keeps it there,
/// reconnecting with backoff on transport failure, until `stop()` is
/// called. Subscribers observe `Connected`/`Reconnecting`/`Reconnected`/
/// `Disconnected` transitions over a broadcast channel.
pub struct ConnectorConnection {
    state: Mutex<ConnectionState>,
    events: broadcast::Sender<ConnectionEvent>,
    close: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectorConnection {
    pub fn new() -> Arc<Self> {
        let (events, _rx) = broadcast::channel(64);
        Arc::new(Self {
            state: Mutex::new(ConnectionState::Disconnected),
            events,
            close: CancellationToken::new(),
            task: Mutex::new(None),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    fn set_state(&self, new_state: ConnectionState) {
        *self.state.lock().unwrap() = new_state;
    }

    /// Starts the background session loop. Idempotent: a second call while
    /// already running is a no-op. Takes `Arc<Self>` by value since the
    /// spawned task needs an owned, `'static` handle; callers that still
    /// need the connection afterward (to `subscribe()` or `stop()`) pass a
    /// clone, e.g. `connection.clone().start(...)`.
    pub fn start(
        self: Arc<Self>,
        target: ConnectionTarget,
        tenant_config: Arc<Mutex<TenantConfig>>,
        handler: Arc<dyn TargetHandler>,
        body_store: Arc<dyn relay_bodystore::BodyStore>,
    ) {
        let mut task_guard = self.task.lock().unwrap();
        if task_guard.is_some() {
            return;
        }
        let this = self.clone();
        let close = self.close.clone();
        *task_guard = Some(tokio::spawn(async move {
            this.run(target, tenant_config, handler, body_store, close).await;
        }));
    }

    /// Signals the background loop to stop at its next checkpoint. Returns
    /// immediately; does not block on hub/broker teardown.
    pub fn stop(&self) {
        self.close.cancel();
    }

    async fn run(
        self: Arc<Self>,
        target: ConnectionTarget,
        tenant_config: Arc<Mutex<TenantConfig>>,
        handler: Arc<dyn TargetHandler>,
        body_store: Arc<dyn relay_bodystore::BodyStore>,
        close: CancellationToken,
    ) {
        let mut attempt: u32 = 0;
        let mut first_attempt = true;
        let mut last_connection_id = String::new();

        while !close.is_cancelled() {
            let connection_id = Uuid::new_v4().to_string();
            last_connection_id = connection_id.clone();

            if first_attempt {
                self.set_state(ConnectionState::Connecting);
            } else {
                self.set_state(ConnectionState::Reconnecting);
                let _ = self.events.send(ConnectionEvent::Reconnecting {
                    connection_id: connection_id.clone(),
                });
            }

            let dial = async {
                let session = HubSession::connect(&target.hub_dealer_endpoint, &target.tenant_id, target.binary_size_threshold)
                    .await?;
                let broker = BrokerPublisher::connect(&target.broker_pub_endpoint).await?;
                anyhow::Ok((session, broker))
            };

            let dialed = tokio::select! {
                biased;
                _ = close.cancelled() => break,
                result = dial => result,
            };

            let (mut session, broker) = match dialed {
                Ok(pair) => pair,
                Err(err) => {
                    warn!(error = %err, attempt, "hub session dial failed");
                    attempt += 1;
                    let delay = backoff_delay(&tenant_config, attempt);
                    tokio::select! {
                        _ = close.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                    continue;
                }
            };

            self.set_state(ConnectionState::Connected);
            let event = if first_attempt {
                ConnectionEvent::Connected { connection_id: connection_id.clone() }
            } else {
                ConnectionEvent::Reconnected { connection_id: connection_id.clone() }
            };
            let _ = self.events.send(event);
            info!(connection_id = %connection_id, tenant = %target.tenant_id, "hub session established");
            attempt = 0;
            first_attempt = false;

            let result = crate::hub_client::run_session(
                &mut session,
                &broker,
                tenant_config.clone(),
                target.binary_size_threshold,
                handler.clone(),
                body_store.clone(),
                close.clone(),
            )
            .await;

            if close.is_cancelled() {
                break;
            }

            match result {
                Ok(()) => info!(connection_id = %connection_id, "hub session loop exited cleanly"),
                Err(err) => warn!(connection_id = %connection_id, error = %err, "hub session loop failed, reconnecting"),
            }
        }

        self.set_state(ConnectionState::Disconnected);
        let _ = self.events.send(ConnectionEvent::Disconnected {
            connection_id: last_connection_id,
        });
        info!("connector connection stopped");
    }
}

/// Exponential backoff from the tenant's minimum reconnect delay, doubling
/// per attempt, capped at its configured maximum.
fn backoff_delay(tenant_config: &Arc<Mutex<TenantConfig>>, attempt: u32) -> Duration {
    let (min, max) = {
        let cfg = tenant_config.lock().unwrap();
        (cfg.reconnect_minimum_delay(), cfg.reconnect_maximum_delay())
    };
    let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
    min.saturating_mul(factor).min(max).max(min)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_until_capped() {
        let cfg = Arc::new(Mutex::new(TenantConfig {
            keep_alive_interval_ms: 30_000,
            reconnect_minimum_delay_ms: 100,
            reconnect_maximum_delay_ms: 1_000,
            enable_tracing: None,
        }));
        assert_eq!(backoff_delay(&cfg, 0), Duration::from_millis(100));
        assert_eq!(backoff_delay(&cfg, 1), Duration::from_millis(200));
        assert_eq!(backoff_delay(&cfg, 2), Duration::from_millis(400));
        assert_eq!(backoff_delay(&cfg, 10), Duration::from_millis(1_000));
    }

    #[test]
    fn new_connection_starts_disconnected() {
        let conn = ConnectorConnection::new();
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn stop_before_start_is_a_safe_no_op() {
        let conn = ConnectorConnection::new();
        conn.stop();
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }
}
