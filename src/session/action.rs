//! Session roles requested by peers

use std::fmt;
use std::str::FromStr;

use crate::registry::RegistryError;

/// Prefix of the ingest subscription action; the stream path follows it
const INGEST_ACTION_PREFIX: &str = "pull from ingest:";

/// Role a session plays, fixed at creation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SessionAction {
    /// Receive audio+video, capture the first video track and feed the relay
    PublishAndRelay,
    /// Send the shared relay track
    SubscribeFromRelay,
    /// Send the playback file, paced by its time base
    SubscribeFromFile,
    /// Send the live ingest stream published at this path
    SubscribeFromIngest(String),
}

impl SessionAction {
    /// Whether this role receives media from the peer
    pub fn is_publisher(&self) -> bool {
        matches!(self, SessionAction::PublishAndRelay)
    }

    /// Wire form carried in `askToConnect`
    pub fn as_wire(&self) -> String {
        match self {
            SessionAction::PublishAndRelay => "push to file and stream".to_string(),
            SessionAction::SubscribeFromRelay => "pull from stream".to_string(),
            SessionAction::SubscribeFromFile => "pull from file".to_string(),
            SessionAction::SubscribeFromIngest(path) => format!("{}{}", INGEST_ACTION_PREFIX, path),
        }
    }
}

impl FromStr for SessionAction {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "push to file and stream" | "publish-and-relay" => Ok(SessionAction::PublishAndRelay),
            "pull from stream" | "subscribe-from-relay" => Ok(SessionAction::SubscribeFromRelay),
            "pull from file" | "subscribe-from-file" => Ok(SessionAction::SubscribeFromFile),
            _ => {
                let path = s
                    .strip_prefix(INGEST_ACTION_PREFIX)
                    .or_else(|| s.strip_prefix("subscribe-from-ingest:"))
                    .map(str::trim)
                    .filter(|path| !path.is_empty())
                    .ok_or_else(|| RegistryError::UnknownAction(s.to_string()))?;
                Ok(SessionAction::SubscribeFromIngest(path.to_string()))
            }
        }
    }
}

impl fmt::Display for SessionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionAction::PublishAndRelay => write!(f, "publish-and-relay"),
            SessionAction::SubscribeFromRelay => write!(f, "subscribe-from-relay"),
            SessionAction::SubscribeFromFile => write!(f, "subscribe-from-file"),
            SessionAction::SubscribeFromIngest(path) => write!(f, "subscribe-from-ingest:{}", path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wire_actions() {
        assert_eq!(
            "push to file and stream".parse::<SessionAction>().unwrap(),
            SessionAction::PublishAndRelay
        );
        assert_eq!(
            "pull from stream".parse::<SessionAction>().unwrap(),
            SessionAction::SubscribeFromRelay
        );
        assert_eq!(
            "pull from file".parse::<SessionAction>().unwrap(),
            SessionAction::SubscribeFromFile
        );
        assert_eq!(
            "pull from ingest:cam/1".parse::<SessionAction>().unwrap(),
            SessionAction::SubscribeFromIngest("cam/1".into())
        );
    }

    #[test]
    fn test_parse_role_names() {
        for action in [
            SessionAction::PublishAndRelay,
            SessionAction::SubscribeFromRelay,
            SessionAction::SubscribeFromFile,
            SessionAction::SubscribeFromIngest("live".into()),
        ] {
            assert_eq!(action.to_string().parse::<SessionAction>().unwrap(), action);
            assert_eq!(action.as_wire().parse::<SessionAction>().unwrap(), action);
        }
    }

    #[test]
    fn test_unknown_action() {
        let err = "dance".parse::<SessionAction>().unwrap_err();
        assert!(matches!(err, RegistryError::UnknownAction(ref a) if a == "dance"));

        // Ingest action needs a path
        assert!("pull from ingest:".parse::<SessionAction>().is_err());
    }

    #[test]
    fn test_is_publisher() {
        assert!(SessionAction::PublishAndRelay.is_publisher());
        assert!(!SessionAction::SubscribeFromFile.is_publisher());
    }
}
