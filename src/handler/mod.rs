//! Pluggable per-message handlers
//!
//! A handler sees every inbound message of one session before the session
//! counts it. Handlers are looked up by name once at startup and a fresh
//! instance is built for every session, so implementations need not be
//! thread-safe beyond `Send`.

pub mod builtin;

pub use builtin::{LogHandler, PayloadSizeHandler, SequenceHandler};

use crate::errors::{Result, SwarmError};
use crate::message::TopicMessage;

use std::collections::BTreeMap;
use std::sync::Arc;

/// Side-effecting hook invoked once per inbound message
pub trait MessageHandler: Send {
    fn handle(&mut self, message: &TopicMessage) -> Result<()>;
}

/// Builds one handler instance per session
pub type HandlerFactory = Arc<dyn Fn() -> Box<dyn MessageHandler> + Send + Sync>;

/// Name to factory lookup for message handlers
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    factories: BTreeMap<String, HandlerFactory>,
}

impl HandlerRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with `log`, `sequence` and `payload-size`
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(LogHandler::NAME, || Box::new(LogHandler::default()));
        registry.register(SequenceHandler::NAME, || Box::new(SequenceHandler::default()));
        registry.register(PayloadSizeHandler::NAME, || {
            Box::new(PayloadSizeHandler::default())
        });
        registry
    }

    /// Add or replace a handler under `name`
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn MessageHandler> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Look up a handler factory; blank or missing names mean no handler
    pub fn resolve(&self, name: Option<&str>) -> Result<Option<HandlerFactory>> {
        let name = match name.map(str::trim) {
            None | Some("") => return Ok(None),
            Some(name) => name,
        };
        match self.factories.get(name) {
            Some(factory) => Ok(Some(Arc::clone(factory))),
            None => Err(SwarmError::config(format!(
                "Unknown message handler '{}' (available: {})",
                name,
                self.names().join(", ")
            ))),
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_builtins_resolve() {
        let registry = HandlerRegistry::with_builtins();
        assert_eq!(registry.names(), vec!["log", "payload-size", "sequence"]);
        for name in ["log", "sequence", "payload-size"] {
            assert!(registry.resolve(Some(name)).unwrap().is_some());
        }
    }

    #[test]
    fn test_blank_name_means_no_handler() {
        let registry = HandlerRegistry::with_builtins();
        assert!(registry.resolve(None).unwrap().is_none());
        assert!(registry.resolve(Some("  ")).unwrap().is_none());
    }

    #[test]
    fn test_unknown_name_is_configuration_error() {
        let registry = HandlerRegistry::with_builtins();
        match registry.resolve(Some("com.example.Missing")) {
            Err(SwarmError::Configuration(msg)) => assert!(msg.contains("com.example.Missing")),
            other => panic!("unexpected result: {:?}", other.map(|f| f.is_some())),
        }
    }

    #[test]
    fn test_factory_builds_fresh_instance_each_call() {
        struct Counting;
        impl MessageHandler for Counting {
            fn handle(&mut self, _message: &TopicMessage) -> Result<()> {
                Ok(())
            }
        }

        let built = Arc::new(AtomicUsize::new(0));
        let mut registry = HandlerRegistry::new();
        let counter = Arc::clone(&built);
        registry.register("counting", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::new(Counting)
        });

        let factory = registry.resolve(Some("counting")).unwrap().unwrap();
        let _a = factory();
        let _b = factory();
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }
}
