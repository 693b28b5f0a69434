use room_runtime::{MessageError, ObjectId, PeerId, PluginError, SlotError};

/// Errors raised by the object plugins.
#[derive(Debug, thiserror::Error)]
pub enum ObjectError {
    /// The object does not exist, or was deleted
    #[error("unknown object: {0}")]
    UnknownObject(ObjectId),
    /// A spawn received from a peer without an id has no shared identity
    #[error("object spawn from {0} carries no id")]
    MissingSpawnId(PeerId),
    #[error("object {0} cannot be placed relative to itself")]
    SelfPlacement(ObjectId),
    /// A bulk load request could not be parsed
    #[error("invalid object load request: {0}")]
    InvalidLoadRequest(#[from] serde_json::Error),
    #[error(transparent)]
    Message(#[from] MessageError),
    #[error(transparent)]
    Slot(#[from] SlotError),
}

impl From<ObjectError> for PluginError {
    fn from(error: ObjectError) -> Self {
        match error {
            ObjectError::Message(e) => PluginError::Message(e),
            ObjectError::Slot(e) => PluginError::Slot(e),
            other => PluginError::ExecutionError(other.to_string()),
        }
    }
}
