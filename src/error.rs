use crate::status::ErrorCode;
use std::fmt;
use std::io;

#[derive(Debug)]
pub enum BackupError {
    Config(String),
    Connect(String),
    NoSession,
    Listing(String),
    Transfer(String),
    Rejected(u16),
    Delete(String),
    Cleanup(String),
    Artifact(io::Error),
    Protocol(String),
    Io(io::Error),
    Serialization(String),
}

impl BackupError {
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            BackupError::Config(_) => Some(ErrorCode::InvalidConfig),
            BackupError::Connect(_) => Some(ErrorCode::ConnectFailed),
            BackupError::Transfer(_) | BackupError::Rejected(_) | BackupError::Artifact(_) => {
                Some(ErrorCode::TransferFailed)
            }
            BackupError::Cleanup(_) => Some(ErrorCode::CleanupFailed),
            _ => None,
        }
    }
}

impl fmt::Display for BackupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupError::Config(msg) => write!(f, "Configuration error: {}", msg),
            BackupError::Connect(msg) => write!(f, "Can't connect to remote store ({})", msg),
            BackupError::NoSession => write!(f, "No remote session established"),
            BackupError::Listing(msg) => write!(f, "Listing error: {}", msg),
            BackupError::Transfer(msg) => write!(f, "Transfer error: {}", msg),
            BackupError::Rejected(code) => {
                write!(f, "Transfer rejected by remote store (Status code: {})", code)
            }
            BackupError::Delete(msg) => write!(f, "Delete error: {}", msg),
            BackupError::Cleanup(msg) => write!(f, "Cleanup error: {}", msg),
            BackupError::Artifact(err) => write!(f, "Backup archive unreadable: {}", err),
            BackupError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            BackupError::Io(err) => write!(f, "IO error: {}", err),
            BackupError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for BackupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BackupError::Io(err) | BackupError::Artifact(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for BackupError {
    fn from(err: io::Error) -> Self {
        BackupError::Io(err)
    }
}

impl From<toml::de::Error> for BackupError {
    fn from(err: toml::de::Error) -> Self {
        BackupError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for BackupError {
    fn from(err: serde_json::Error) -> Self {
        BackupError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for BackupError {
    fn from(err: reqwest::Error) -> Self {
        BackupError::Transfer(err.to_string())
    }
}

impl From<quick_xml::Error> for BackupError {
    fn from(err: quick_xml::Error) -> Self {
        BackupError::Protocol(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_follow_taxonomy() {
        let code = |e: BackupError| e.error_code().map(ErrorCode::code);
        assert_eq!(code(BackupError::Config("x".into())), Some(2));
        assert_eq!(code(BackupError::Connect("x".into())), Some(3));
        assert_eq!(code(BackupError::Rejected(500)), Some(4));
        assert_eq!(code(BackupError::Cleanup("x".into())), Some(6));
        assert_eq!(code(BackupError::NoSession), None);
    }

    #[test]
    fn test_rejected_message_carries_status() {
        let msg = BackupError::Rejected(507).to_string();
        assert!(msg.contains("507"));
    }
}
