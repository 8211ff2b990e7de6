//! Application error type.
//!
//! Every fallible operation returns `AppError`, which carries the process exit code
//! alongside a human-readable message:
//!
//! - `2`: configuration or I/O problem (bad parameters, unreadable files)
//! - `3`: not enough data to work with (empty tables, degenerate time ranges)
//! - `4`: numerical failure (invalid covariance, non-finite integrals)
//!
//! Cache misses are deliberately *not* errors; see `sfh::reconstruct`.

/// Exit code for configuration and I/O errors.
pub const EXIT_CONFIG: u8 = 2;
/// Exit code for insufficient data.
pub const EXIT_DATA: u8 = 3;
/// Exit code for numerical validity errors.
pub const EXIT_NUMERIC: u8 = 4;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(EXIT_CONFIG, message)
    }

    pub fn data(message: impl Into<String>) -> Self {
        Self::new(EXIT_DATA, message)
    }

    pub fn numeric(message: impl Into<String>) -> Self {
        Self::new(EXIT_NUMERIC, message)
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
