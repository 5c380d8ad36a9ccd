//! Serialization collaborator used on the controller side.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::core::{CodecError, Task};

/// Turns tasks into start messages and completion payloads into results.
///
/// Called once per outbound dispatch and once per successful completion.
pub trait TaskCodec<T: Task>: Send + Sync + 'static {
    /// Serialize a task for its start message.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] when the task cannot be encoded.
    fn serialize(&self, task: &T) -> Result<String, CodecError>;

    /// Decode the body of a `TC::` message sent by a worker of `worker_type`.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] when the payload cannot be decoded.
    fn deserialize(&self, payload: &str, worker_type: &str) -> Result<T::Output, CodecError>;
}

/// JSON codec over `serde_json`.
pub struct JsonCodec<T> {
    _task: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    /// Create a codec.
    #[must_use]
    pub const fn new() -> Self {
        Self { _task: PhantomData }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonCodec<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> TaskCodec<T> for JsonCodec<T>
where
    T: Task + Serialize,
    T::Output: DeserializeOwned,
{
    fn serialize(&self, task: &T) -> Result<String, CodecError> {
        Ok(serde_json::to_string(task)?)
    }

    fn deserialize(&self, payload: &str, _worker_type: &str) -> Result<T::Output, CodecError> {
        Ok(serde_json::from_str(payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{TaskContext, TaskError};
    use serde::Deserialize;

    #[derive(Serialize, Deserialize)]
    struct Square {
        value: i64,
    }

    impl Task for Square {
        type Output = i64;

        fn execute(&mut self, _ctx: &TaskContext<'_>) -> Result<i64, TaskError> {
            Ok(self.value * self.value)
        }
    }

    #[test]
    fn test_json_codec_serializes_task_state() {
        let codec = JsonCodec::<Square>::new();
        let text = codec.serialize(&Square { value: 3 }).unwrap();
        assert_eq!(text, r#"{"value":3}"#);
        assert_eq!(codec.deserialize("9", "Square").unwrap(), 9);
    }

    #[test]
    fn test_json_codec_rejects_garbage() {
        let codec = JsonCodec::<Square>::new();
        let err = codec.deserialize("not json", "Square").unwrap_err();
        assert!(matches!(err, CodecError::Json(_)));
    }
}
