use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use crate::workflows::agreement::{AgreementError, ContextError, MailerError};
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Startup(ContextError),
    Mailer(MailerError),
    Agreement(AgreementError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Startup(err) => write!(f, "startup error: {}", err),
            AppError::Mailer(err) => write!(f, "mailer error: {}", err),
            AppError::Agreement(err) => write!(f, "agreement error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Startup(err) => Some(err),
            AppError::Mailer(err) => Some(err),
            AppError::Agreement(err) => Some(err),
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<ContextError> for AppError {
    fn from(value: ContextError) -> Self {
        Self::Startup(value)
    }
}

impl From<MailerError> for AppError {
    fn from(value: MailerError) -> Self {
        Self::Mailer(value)
    }
}

impl From<AgreementError> for AppError {
    fn from(value: AgreementError) -> Self {
        Self::Agreement(value)
    }
}
