//! Per-user session state: the conversation log plus at most one live
//! database connection.
pub mod conversation;
pub mod registry;

pub use conversation::{ConversationSession, ConversationTurn};
pub use registry::{SessionRegistry, SharedSession};

use tracing::info;

use crate::database::{DatabaseConnection, DatabaseTarget};
use crate::error::Result;

#[derive(Debug, Default)]
pub struct AssistantSession {
    conversation: ConversationSession,
    connection: Option<DatabaseConnection>,
}

impl AssistantSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connection(connection: DatabaseConnection) -> Self {
        Self {
            conversation: ConversationSession::new(),
            connection: Some(connection),
        }
    }

    /// Open `target` and replace the current connection. On failure the
    /// previous connection is kept.
    pub async fn connect(&mut self, target: &DatabaseTarget) -> Result<()> {
        let connection = DatabaseConnection::connect(target).await?;
        info!("Session {} connected to {}", self.conversation.id(), target);
        self.connection = Some(connection);
        Ok(())
    }

    pub fn disconnect(&mut self) {
        if self.connection.take().is_some() {
            info!("Session {} disconnected", self.conversation.id());
        }
    }

    pub fn connection(&self) -> Option<&DatabaseConnection> {
        self.connection.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn conversation(&self) -> &ConversationSession {
        &self.conversation
    }

    pub fn conversation_mut(&mut self) -> &mut ConversationSession {
        &mut self.conversation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AssistantError;

    #[tokio::test]
    async fn test_connect_replaces_connection() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = AssistantSession::new();
        assert!(!session.is_connected());

        session.connect(&DatabaseTarget::InMemory).await.unwrap();
        assert_eq!(session.connection().unwrap().target(), &DatabaseTarget::InMemory);

        let file = DatabaseTarget::Sqlite { path: dir.path().join("playground.db") };
        session.connect(&file).await.unwrap();
        assert_eq!(session.connection().unwrap().target(), &file);

        session.disconnect();
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_failed_connect_keeps_previous_connection() {
        let mut session = AssistantSession::new();
        session.connect(&DatabaseTarget::InMemory).await.unwrap();

        let unsupported = DatabaseTarget::network("oracle", "localhost", 1521, "scott", "tiger", "orcl").unwrap();
        let err = session.connect(&unsupported).await.unwrap_err();
        assert!(matches!(err, AssistantError::Configuration(_)));
        assert_eq!(session.connection().unwrap().target(), &DatabaseTarget::InMemory);
    }
}
