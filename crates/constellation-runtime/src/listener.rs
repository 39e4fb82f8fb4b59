//! Pluggable execution lifecycle hooks (`spec.md` §4.9, §9: "lifecycle
//! callbacks must not be on the critical path... failures logged but never
//! surfaced"). Dispatch is fire-and-forget: each callback is spawned on its
//! own `tokio` task and its result, if any, is discarded.

use std::sync::Arc;

use constellation_core::id::ModuleNodeId;
use uuid::Uuid;

use crate::signature::DataSignature;

/// Lifecycle hooks a runtime caller may install. Every method has a no-op
/// default so implementors only override what they need.
pub trait ExecutionListener: Send + Sync + 'static {
    fn on_execution_start(&self, _execution_id: Uuid) {}
    fn on_execution_complete(&self, _signature: &DataSignature) {}
    fn on_execution_cancelled(&self, _execution_id: Uuid) {}
    fn on_module_start(&self, _execution_id: Uuid, _module: ModuleNodeId, _display_name: &str) {}
    fn on_module_complete(&self, _execution_id: Uuid, _module: ModuleNodeId, _latency_ms: u64) {}
    fn on_module_failed(&self, _execution_id: Uuid, _module: ModuleNodeId, _cause: &str) {}
}

/// Dispatches lifecycle events to zero or more listeners without blocking
/// the caller. Each listener is invoked synchronously inside its own
/// detached task; a panicking listener is swallowed by `tokio`'s task
/// boundary and never reaches the execution it described.
#[derive(Clone, Default)]
pub struct ListenerFanout {
    listeners: Vec<Arc<dyn ExecutionListener>>,
}

impl ListenerFanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, listener: Arc<dyn ExecutionListener>) {
        self.listeners.push(listener);
    }

    pub fn notify_execution_start(&self, execution_id: Uuid) {
        for listener in self.listeners.clone() {
            tokio::spawn(async move { listener.on_execution_start(execution_id) });
        }
    }

    pub fn notify_execution_complete(&self, signature: DataSignature) {
        let signature = Arc::new(signature);
        for listener in self.listeners.clone() {
            let signature = Arc::clone(&signature);
            tokio::spawn(async move { listener.on_execution_complete(&signature) });
        }
    }

    pub fn notify_execution_cancelled(&self, execution_id: Uuid) {
        for listener in self.listeners.clone() {
            tokio::spawn(async move { listener.on_execution_cancelled(execution_id) });
        }
    }

    pub fn notify_module_start(&self, execution_id: Uuid, module: ModuleNodeId, display_name: String) {
        for listener in self.listeners.clone() {
            let display_name = display_name.clone();
            tokio::spawn(
                async move { listener.on_module_start(execution_id, module, &display_name) },
            );
        }
    }

    pub fn notify_module_complete(&self, execution_id: Uuid, module: ModuleNodeId, latency_ms: u64) {
        for listener in self.listeners.clone() {
            tokio::spawn(async move { listener.on_module_complete(execution_id, module, latency_ms) });
        }
    }

    pub fn notify_module_failed(&self, execution_id: Uuid, module: ModuleNodeId, cause: String) {
        for listener in self.listeners.clone() {
            let cause = cause.clone();
            tokio::spawn(async move { listener.on_module_failed(execution_id, module, &cause) });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Flag(Arc<AtomicBool>);
    impl ExecutionListener for Flag {
        fn on_execution_start(&self, _execution_id: Uuid) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn fanout_reaches_registered_listener() {
        let flag = Arc::new(AtomicBool::new(false));
        let mut fanout = ListenerFanout::new();
        fanout.register(Arc::new(Flag(Arc::clone(&flag))));
        fanout.notify_execution_start(Uuid::new_v4());
        // Fire-and-forget dispatch: give the spawned task a chance to run.
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        assert!(flag.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn empty_fanout_does_not_panic() {
        let fanout = ListenerFanout::new();
        fanout.notify_execution_start(Uuid::new_v4());
        fanout.notify_execution_cancelled(Uuid::new_v4());
    }
}
