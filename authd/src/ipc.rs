//! Abstract IPC bus contract (§6): the shape the daemon announces new
//! tokens over and serves peer queries through. No D-Bus wire binding is
//! implemented here — that transport is an explicit external collaborator
//! (§1); this module only specifies the trait and an in-process test
//! double used by the daemon's own tests and available to integrators.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::AuthdError;

/// A signal subscriber: invoked with the signal's payload bytes.
pub type SignalHandler = Box<dyn Fn(&[u8]) + Send>;

/// A method handler: receives the call payload, returns a reply or an
/// error.
pub type MethodHandler = Box<dyn Fn(&[u8]) -> Result<Vec<u8>, AuthdError> + Send>;

/// Transport-agnostic bus contract the daemon is wired against.
pub trait IpcBus: Send {
    /// Register `handler` to run on every `emit_signal` for
    /// `(interface, name)`, in registration order.
    fn register_signal_handler(&self, interface: &str, name: &str, handler: SignalHandler);

    /// Broadcast `payload` to every handler registered for
    /// `(interface, name)`.
    fn emit_signal(&self, interface: &str, name: &str, payload: &[u8]);

    /// Invoke the handler registered for `(interface, method)`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthdError::Programming`] if no handler is registered.
    fn call_method(
        &self,
        interface: &str,
        method: &str,
        payload: &[u8],
    ) -> Result<Vec<u8>, AuthdError>;

    /// Register `handler` to serve calls to `(interface, method)`.
    fn method_handler(&self, interface: &str, method: &str, handler: MethodHandler);
}

type Key = (String, String);

#[derive(Default)]
struct Inner {
    signals: Mutex<HashMap<Key, Vec<SignalHandler>>>,
    methods: Mutex<HashMap<Key, MethodHandler>>,
}

/// In-process [`IpcBus`] test double, backed by shared state so clones
/// refer to the same bus.
#[derive(Clone, Default)]
pub struct InMemoryIpcBus(Arc<Inner>);

impl IpcBus for InMemoryIpcBus {
    fn register_signal_handler(&self, interface: &str, name: &str, handler: SignalHandler) {
        self.0
            .signals
            .lock()
            .expect("signal registry lock poisoned")
            .entry((interface.to_owned(), name.to_owned()))
            .or_default()
            .push(handler);
    }

    fn emit_signal(&self, interface: &str, name: &str, payload: &[u8]) {
        let signals = self.0.signals.lock().expect("signal registry lock poisoned");
        if let Some(handlers) = signals.get(&(interface.to_owned(), name.to_owned())) {
            for handler in handlers {
                handler(payload);
            }
        }
    }

    fn call_method(
        &self,
        interface: &str,
        method: &str,
        payload: &[u8],
    ) -> Result<Vec<u8>, AuthdError> {
        let methods = self.0.methods.lock().expect("method registry lock poisoned");
        let handler = methods
            .get(&(interface.to_owned(), method.to_owned()))
            .ok_or_else(|| AuthdError::Programming {
                reason: format!("no method handler registered for {interface}.{method}"),
            })?;
        handler(payload)
    }

    fn method_handler(&self, interface: &str, method: &str, handler: MethodHandler) {
        self.0
            .methods
            .lock()
            .expect("method registry lock poisoned")
            .insert((interface.to_owned(), method.to_owned()), handler);
    }
}
