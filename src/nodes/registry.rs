//! Tag-based node kind registry
//!
//! Maps kind tags to factories so graphs can be assembled from
//! configuration data. Built-in kinds are pre-registered; applications add
//! their own with [`register_node`]. Boundary kinds (publishers and
//! subscribers) are created directly on a network because they carry
//! per-instance handles.

use std::collections::HashMap;
use std::sync::Mutex;

use lazy_static::lazy_static;
use tracing::debug;

use crate::runtime::errors::ConfigError;
use crate::runtime::node::NodeKind;

use super::{AudioStream, Constant, PassThrough, Scale};

type NodeFactory = Box<dyn Fn() -> Box<dyn NodeKind> + Send>;

lazy_static! {
    static ref REGISTRY: Mutex<HashMap<String, NodeFactory>> = Mutex::new(builtins());
}

fn builtins() -> HashMap<String, NodeFactory> {
    let mut map: HashMap<String, NodeFactory> = HashMap::new();
    map.insert(
        "pass_through".to_string(),
        Box::new(|| Box::new(PassThrough::new())),
    );
    map.insert(
        "constant".to_string(),
        Box::new(|| Box::new(Constant::new())),
    );
    map.insert("scale".to_string(), Box::new(|| Box::new(Scale::new())));
    map.insert(
        "audio_stream".to_string(),
        Box::new(|| Box::new(AudioStream::new())),
    );
    map
}

/// Register a kind factory under a tag, replacing any previous one.
pub fn register_node(
    tag: impl Into<String>,
    factory: impl Fn() -> Box<dyn NodeKind> + Send + 'static,
) {
    let tag = tag.into();
    debug!(tag = %tag, "register node kind");
    let mut registry = REGISTRY.lock().unwrap_or_else(|e| e.into_inner());
    registry.insert(tag, Box::new(factory));
}

/// Instantiate a kind by tag.
pub fn create_node(tag: &str) -> Result<Box<dyn NodeKind>, ConfigError> {
    let registry = REGISTRY.lock().unwrap_or_else(|e| e.into_inner());
    match registry.get(tag) {
        Some(factory) => Ok(factory()),
        None => Err(ConfigError::UnknownKind(tag.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_kinds_resolve() {
        for tag in ["pass_through", "constant", "scale", "audio_stream"] {
            assert_eq!(create_node(tag).unwrap().kind(), tag);
        }
    }

    #[test]
    fn test_unknown_tag_fails() {
        assert!(matches!(
            create_node("no_such_kind"),
            Err(ConfigError::UnknownKind(_))
        ));
    }

    #[test]
    fn test_registered_kind_resolves() {
        register_node("relabel", || Box::new(PassThrough::new()));
        assert_eq!(create_node("relabel").unwrap().kind(), "pass_through");
    }
}
