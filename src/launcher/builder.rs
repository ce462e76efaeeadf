//! Builder pattern for launcher configuration.
//!
//! Provides a fluent API for configuring and creating [`Launcher`]
//! instances.
//!
//! # Example
//!
//! ```no_run
//! use bidi_webdriver::Launcher;
//!
//! # fn example() -> bidi_webdriver::Result<()> {
//! let launcher = Launcher::builder()
//!     .binary("/usr/bin/geckodriver")
//!     .arg("--log")
//!     .arg("error")
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

use super::core::Launcher;

// ============================================================================
// Constants
// ============================================================================

/// Default deadline for the driver to report ready.
const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(30);

/// Default grace period before a driver is force-killed on shutdown.
const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

// ============================================================================
// LauncherBuilder
// ============================================================================

/// Builder for configuring a [`Launcher`] instance.
///
/// Use [`Launcher::builder()`] to create a new builder.
#[derive(Debug, Default, Clone)]
pub struct LauncherBuilder {
    /// Path to the driver binary.
    binary: Option<PathBuf>,
    /// Extra arguments passed to the driver.
    args: Vec<String>,
    /// Host port; 0 means acquire a free one.
    port: u16,
    /// Readiness deadline.
    ready_timeout: Option<Duration>,
    /// Shutdown grace period.
    shutdown_grace: Option<Duration>,
}

impl LauncherBuilder {
    /// Creates a new launcher builder with no configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the path to the driver binary executable.
    #[inline]
    #[must_use]
    pub fn binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.binary = Some(path.into());
        self
    }

    /// Appends one extra argument for the driver command line.
    #[inline]
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Pins the driver to a specific port instead of acquiring a free one.
    #[inline]
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets how long to wait for `GET /status` to report ready.
    #[inline]
    #[must_use]
    pub fn ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = Some(timeout);
        self
    }

    /// Sets the grace period before force-killing the driver on shutdown.
    #[inline]
    #[must_use]
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = Some(grace);
        self
    }

    /// Builds the launcher with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the binary was not set
    /// - [`Error::DriverNotFound`] if the binary path does not exist
    pub fn build(self) -> Result<Launcher> {
        let binary = self.binary.ok_or_else(|| {
            Error::config(
                "Driver binary path is required. Use .binary() to set it.\n\
                 Example: Launcher::builder().binary(\"/usr/bin/geckodriver\")",
            )
        })?;

        if !binary.exists() {
            return Err(Error::driver_not_found(binary));
        }

        Ok(Launcher::from_parts(
            binary,
            self.args,
            self.port,
            self.ready_timeout.unwrap_or(DEFAULT_READY_TIMEOUT),
            self.shutdown_grace.unwrap_or(DEFAULT_SHUTDOWN_GRACE),
        ))
    }
}

// ============================================================================
// Tests
// ============================================================================
