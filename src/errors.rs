use thiserror::Error;

use crate::driver::DriverFault;

/// Error taxonomy for selector lookups, with process exit codes
#[derive(Debug, Error)]
pub enum LocprobeError {
    /// Element absent (exit code 2)
    #[error("No element found matching selector: {0}")]
    NotFound(String),
    /// Element detached from the DOM after a retry (exit code 2)
    #[error("Stale element reference: {0}")]
    StaleReference(String),
    /// Frame path segment missing (exit code 3)
    #[error("Frame path could not be resolved: {0}")]
    FrameResolution(String),
    /// Browser or session level failure (exit code 4)
    #[error("WebDriver failure: {0}")]
    Driver(String),
    /// Bounded wait exceeded (exit code 5)
    #[error("Operation timed out: {0}")]
    Timeout(String),
    /// Selector rejected by the browser as malformed (exit code 1)
    #[error("Invalid selector: {0}")]
    InvalidSelector(String),
    /// Invalid settings or configuration file (exit code 1)
    #[error("Configuration error: {0}")]
    Config(String),
    /// Generic error (exit code 1)
    #[error("{0}")]
    Other(anyhow::Error),
}

impl LocprobeError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            LocprobeError::NotFound(_) | LocprobeError::StaleReference(_) => 2,
            LocprobeError::FrameResolution(_) => 3,
            LocprobeError::Driver(_) => 4,
            LocprobeError::Timeout(_) => 5,
            LocprobeError::InvalidSelector(_)
            | LocprobeError::Config(_)
            | LocprobeError::Other(_) => 1,
        }
    }

    /// Whether the browser session itself is in doubt
    pub fn is_driver_level(&self) -> bool {
        matches!(self, LocprobeError::Driver(_))
    }
}

impl From<DriverFault> for LocprobeError {
    fn from(fault: DriverFault) -> Self {
        match fault {
            DriverFault::NotFound(msg) => LocprobeError::NotFound(msg),
            DriverFault::StaleReference(msg) => LocprobeError::StaleReference(msg),
            DriverFault::NoSuchFrame(msg) => LocprobeError::FrameResolution(msg),
            DriverFault::Timeout(msg) => LocprobeError::Timeout(msg),
            DriverFault::InvalidSelector(msg) => LocprobeError::InvalidSelector(msg),
            DriverFault::Script(msg) => {
                LocprobeError::Other(anyhow::anyhow!("script error: {}", msg))
            }
            DriverFault::NoSuchWindow(msg) | DriverFault::Session(msg) => {
                LocprobeError::Driver(msg)
            }
        }
    }
}

impl From<anyhow::Error> for LocprobeError {
    fn from(err: anyhow::Error) -> Self {
        // Try to detect specific error types from the error message
        let msg = err.to_string();
        let lower = msg.to_lowercase();

        if lower.contains("no element found") || lower.contains("no such element") {
            LocprobeError::NotFound(msg)
        } else if lower.contains("stale element") {
            LocprobeError::StaleReference(msg)
        } else if lower.contains("no such frame") || lower.contains("frame path") {
            LocprobeError::FrameResolution(msg)
        } else if lower.contains("timeout") || lower.contains("timed out") {
            LocprobeError::Timeout(msg)
        } else if lower.contains("webdriver")
            || lower.contains("geckodriver")
            || lower.contains("chromedriver")
            || lower.contains("no such window")
        {
            LocprobeError::Driver(msg)
        } else {
            LocprobeError::Other(err)
        }
    }
}

#[cfg(test)]
#[path = "errors_test.rs"]
mod errors_test;
