//! Driver process supervision and WebSocket URL discovery.
//!
//! A launcher spawns a WebDriver driver binary (geckodriver, chromedriver,
//! …), waits for its HTTP status endpoint to report ready, and negotiates
//! a WebDriver Classic session whose capabilities carry the
//! `webSocketUrl` the transport connects to.
//!
//! The transport has no dependency on any of this: it consumes a
//! WebSocket URL string, wherever it came from.

// ============================================================================
// Imports
// ============================================================================

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::process::{Child, Command};
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

use super::builder::LauncherBuilder;
use super::port;

// ============================================================================
// Constants
// ============================================================================

/// Delay between readiness polls.
const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// Launcher
// ============================================================================

/// Validated launcher configuration.
///
/// # Example
///
/// ```no_run
/// use bidi_webdriver::{Launcher, Transport, Connection};
/// use serde_json::json;
///
/// # async fn example() -> bidi_webdriver::Result<()> {
/// let driver = Launcher::builder()
///     .binary("/usr/bin/geckodriver")
///     .build()?
///     .launch()
///     .await?;
///
/// let session = driver.new_session(json!({})).await?;
///
/// let transport = Transport::new(None, Connection::new());
/// transport.connect(&session.websocket_url).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Launcher {
    binary: PathBuf,
    args: Vec<String>,
    port: u16,
    ready_timeout: Duration,
    shutdown_grace: Duration,
}

impl Launcher {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> LauncherBuilder {
        LauncherBuilder::new()
    }

    /// Configured host port; 0 means a free port is acquired at launch.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    pub(crate) fn from_parts(
        binary: PathBuf,
        args: Vec<String>,
        port: u16,
        ready_timeout: Duration,
        shutdown_grace: Duration,
    ) -> Self {
        Self {
            binary,
            args,
            port,
            ready_timeout,
            shutdown_grace,
        }
    }

    /// Spawns the driver and waits until it reports ready.
    ///
    /// Port acquisition and the spawn happen under a process-wide lock to
    /// narrow the window in which another local binder could steal the
    /// port.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] if no free port could be acquired
    /// - [`Error::ProcessLaunchFailed`] if the binary does not spawn
    /// - [`Error::ReadyTimeout`] if `GET /status` never reports ready
    pub async fn launch(self) -> Result<DriverProcess> {
        let (child, port) = {
            let _guard = port::spawn_lock();
            let port = if self.port == 0 {
                port::free_port()?
            } else {
                self.port
            };
            (self.spawn_driver(port)?, port)
        };

        info!(port, binary = %self.binary.display(), "Driver process spawned");

        let mut process = DriverProcess {
            child,
            port,
            base_url: format!("http://127.0.0.1:{port}"),
            http: reqwest::Client::builder().build()?,
            shutdown_grace: self.shutdown_grace,
        };

        if let Err(e) = process.wait_ready(self.ready_timeout).await {
            warn!(error = %e, "Driver never became ready; killing it");
            let _ = process.child.kill().await;
            return Err(e);
        }

        Ok(process)
    }

    /// Spawns the driver process listening on `port`.
    fn spawn_driver(&self, port: u16) -> Result<Child> {
        let mut cmd = Command::new(&self.binary);

        cmd.arg(format!("--port={port}"));
        cmd.args(&self.args);

        // Suppress stdio; the driver's own logging goes to its log flags.
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        cmd.spawn().map_err(Error::process_launch_failed)
    }
}

// ============================================================================
// DriverProcess
// ============================================================================

/// A running driver process with its HTTP endpoint.
pub struct DriverProcess {
    child: Child,
    port: u16,
    base_url: String,
    http: reqwest::Client,
    shutdown_grace: Duration,
}

/// Decoded `GET /status` payload.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct DriverStatus {
    /// Whether the driver accepts new sessions.
    pub ready: bool,
    /// Implementation-defined status message.
    #[serde(default)]
    pub message: String,
}

/// A WebDriver Classic session granting a BiDi WebSocket endpoint.
#[derive(Debug, Clone)]
pub struct DriverSession {
    /// Driver-assigned session id.
    pub session_id: String,
    /// The WebSocket URL the transport should connect to.
    pub websocket_url: String,
}

impl DriverProcess {
    /// Port the driver is listening on.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Base HTTP URL of the driver, e.g. `http://127.0.0.1:4444`.
    #[inline]
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Queries `GET /status`.
    ///
    /// # Errors
    ///
    /// - [`Error::Http`] if the request fails
    /// - [`Error::SessionSetup`] if the payload has an unexpected shape
    pub async fn status(&self) -> Result<DriverStatus> {
        let body: Value = self
            .http
            .get(format!("{}/status", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        serde_json::from_value(body["value"].clone())
            .map_err(|e| Error::session_setup(format!("malformed status payload: {e}")))
    }

    /// Creates a session via `POST /session`, requesting a BiDi socket.
    ///
    /// `always_match` is merged into the capabilities request;
    /// `webSocketUrl: true` is always added.
    ///
    /// # Errors
    ///
    /// - [`Error::Http`] if the request fails
    /// - [`Error::SessionSetup`] if the driver refuses the session or does
    ///   not grant a `webSocketUrl`
    pub async fn new_session(&self, always_match: Value) -> Result<DriverSession> {
        let mut always_match = match always_match {
            Value::Object(map) => map,
            Value::Null => serde_json::Map::new(),
            other => {
                return Err(Error::session_setup(format!(
                    "alwaysMatch must be an object, got {other}"
                )));
            }
        };
        always_match.insert("webSocketUrl".to_owned(), json!(true));

        let response = self
            .http
            .post(format!("{}/session", self.base_url))
            .json(&json!({"capabilities": {"alwaysMatch": always_match}}))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::session_setup(format!(
                "driver refused session ({status}): {body}"
            )));
        }

        let body: Value = response.json().await?;

        let session_id = body["value"]["sessionId"]
            .as_str()
            .ok_or_else(|| Error::session_setup("response carries no sessionId"))?
            .to_owned();
        let websocket_url = body["value"]["capabilities"]["webSocketUrl"]
            .as_str()
            .ok_or_else(|| Error::session_setup("driver did not grant webSocketUrl"))?
            .to_owned();

        info!(%session_id, %websocket_url, "Session created");

        Ok(DriverSession {
            session_id,
            websocket_url,
        })
    }

    /// Quits the browser via `DELETE /session/{id}`.
    ///
    /// # Errors
    ///
    /// - [`Error::Http`] if the request fails or the driver rejects it
    pub async fn end_session(&self, session_id: &str) -> Result<()> {
        self.http
            .delete(format!("{}/session/{session_id}", self.base_url))
            .send()
            .await?
            .error_for_status()?;

        debug!(session_id, "Session ended");
        Ok(())
    }

    /// Terminates the launcher.
    ///
    /// Tries `GET /shutdown` first; drivers without that endpoint are
    /// force-killed once the grace period expires.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the process cannot be waited on or killed.
    pub async fn shutdown(mut self) -> Result<()> {
        // Best effort; not every driver exposes the endpoint.
        let _ = self
            .http
            .get(format!("{}/shutdown", self.base_url))
            .send()
            .await;

        match timeout(self.shutdown_grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!(%status, "Driver exited");
                Ok(())
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                warn!(
                    grace_ms = self.shutdown_grace.as_millis() as u64,
                    "Driver ignored shutdown; killing"
                );
                self.child.kill().await?;
                Ok(())
            }
        }
    }

    /// Polls `GET /status` until the driver reports ready.
    async fn wait_ready(&mut self, ready_timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + ready_timeout;

        loop {
            // A connection error just means the driver is still booting.
            if let Ok(status) = self.status().await
                && status.ready
            {
                debug!(message = %status.message, "Driver ready");
                return Ok(());
            }

            if Instant::now() >= deadline {
                return Err(Error::ready_timeout(ready_timeout.as_millis() as u64));
            }
            sleep(STATUS_POLL_INTERVAL).await;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
