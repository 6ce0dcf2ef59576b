use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::StreamError;

/// What kind of consumption surface a call resolves to. `PushQueue` and
/// `PullSequence` both mark the target streamable; everything else is a
/// single document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Document,
    PushQueue,
    PullSequence,
}

/// Conversion target resolved once per call, in place of any runtime
/// type introspection.
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    pub name: &'static str,
    pub container: ContainerKind,
    /// Whether a null streamed element is acceptable to the caller.
    pub nullable_elements: bool,
}

impl TypeDescriptor {
    pub fn document<T: ?Sized>() -> Self {
        Self {
            name: std::any::type_name::<T>(),
            container: ContainerKind::Document,
            nullable_elements: false,
        }
    }

    pub fn push_queue<T: ?Sized>() -> Self {
        Self {
            name: std::any::type_name::<T>(),
            container: ContainerKind::PushQueue,
            nullable_elements: false,
        }
    }

    pub fn pull_sequence<T: ?Sized>() -> Self {
        Self {
            name: std::any::type_name::<T>(),
            container: ContainerKind::PullSequence,
            nullable_elements: false,
        }
    }

    /// Accept null elements (e.g. when the element type is an `Option`).
    pub fn nullable(mut self) -> Self {
        self.nullable_elements = true;
        self
    }

    pub fn is_streamed(&self) -> bool {
        !matches!(self.container, ContainerKind::Document)
    }
}

/// Convert one detector-bounded JSON value into the caller's type.
///
/// A null element in a streamed sequence is a hard error unless the
/// descriptor explicitly allows it.
pub fn decode_item<T: DeserializeOwned>(
    value: Value,
    descriptor: &TypeDescriptor,
) -> Result<T, StreamError> {
    if value.is_null() && descriptor.is_streamed() && !descriptor.nullable_elements {
        return Err(StreamError::NullStreamItem);
    }
    serde_json::from_value(value).map_err(StreamError::from)
}

/// Convert one typed item to its JSON text.
pub fn encode_item<T: Serialize + ?Sized>(item: &T) -> Result<String, StreamError> {
    serde_json::to_string(item).map_err(StreamError::from)
}
