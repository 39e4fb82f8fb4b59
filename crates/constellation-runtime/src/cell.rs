//! Single-assignment cells: the one-shot, multi-reader synchronization
//! primitive allocated for every data node during an execution (`spec.md`
//! §4.9, §9 design note: "An idiomatic implementation uses a one-shot
//! channel or a sync primitive per cell; senders complete once, receivers
//! await").
//!
//! A plain `tokio::sync::oneshot` channel has exactly one receiver, but a
//! data node may feed more than one dependent fiber (fan-out), so a cell is
//! built on `tokio::sync::watch` instead: the initial value is `None`, a
//! single `write` transitions it to `Some(value)`, and every dependent
//! fiber holds its own subscriber. `write` called twice is an internal
//! invariant violation, not a race to resolve -- the DAG's dependency order
//! guarantees each producer runs at most once.

use constellation_core::types::CValue;
use tokio::sync::watch;

use crate::error::RuntimeError;

/// A single-assignment, multi-reader cell holding one data node's value.
#[derive(Clone)]
pub struct Cell {
    tx: std::sync::Arc<watch::Sender<Option<CValue>>>,
    rx: watch::Receiver<Option<CValue>>,
}

impl Cell {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(None);
        Cell { tx: std::sync::Arc::new(tx), rx }
    }

    /// Writes `value` into the cell. Fails with `RuntimeError::DoubleWrite`
    /// if the cell already holds a value -- callers pass the data node's id
    /// only for that error message, never for synchronization.
    pub fn write(&self, id: constellation_core::id::DataId, value: CValue) -> Result<(), RuntimeError> {
        let mut wrote_twice = false;
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                wrote_twice = true;
                false
            } else {
                *current = Some(value);
                true
            }
        });
        if wrote_twice {
            return Err(RuntimeError::DoubleWrite { id });
        }
        Ok(())
    }

    /// Returns the current value without waiting, or `None` if unwritten.
    pub fn peek(&self) -> Option<CValue> {
        self.rx.borrow().clone()
    }

    /// Awaits the cell's value. Never returns `None`; a cell whose sender is
    /// dropped before a write (execution torn down mid-flight) resolves
    /// this future as cancelled via the caller's own timeout/select, not
    /// via an `Option` here.
    pub async fn await_value(&self) -> CValue {
        let mut rx = self.rx.clone();
        loop {
            if let Some(value) = rx.borrow().clone() {
                return value;
            }
            if rx.changed().await.is_err() {
                // Sender dropped with no value ever written; park forever so
                // the caller's own timeout governs cancellation rather than
                // this future resolving to a bogus placeholder value.
                std::future::pending::<()>().await;
            }
        }
    }

    pub fn is_written(&self) -> bool {
        self.rx.borrow().is_some()
    }
}

impl Default for Cell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use constellation_core::id::DataId;
    use constellation_core::types::CValue;

    #[test]
    fn fresh_cell_is_unwritten() {
        let cell = Cell::new();
        assert!(!cell.is_written());
        assert!(cell.peek().is_none());
    }

    #[test]
    fn write_then_peek_returns_value() {
        let cell = Cell::new();
        cell.write(DataId::new_v4(), CValue::Int(7)).unwrap();
        assert!(cell.is_written());
        assert!(matches!(cell.peek(), Some(CValue::Int(7))));
    }

    #[test]
    fn second_write_is_double_write_error() {
        let cell = Cell::new();
        let id = DataId::new_v4();
        cell.write(id, CValue::Int(1)).unwrap();
        let err = cell.write(id, CValue::Int(2)).unwrap_err();
        assert!(matches!(err, RuntimeError::DoubleWrite { .. }));
        // The original value is preserved, not overwritten.
        assert!(matches!(cell.peek(), Some(CValue::Int(1))));
    }

    #[tokio::test]
    async fn await_value_unblocks_after_write() {
        let cell = Cell::new();
        let waiter = cell.clone();
        let handle = tokio::spawn(async move { waiter.await_value().await });
        tokio::task::yield_now().await;
        cell.write(DataId::new_v4(), CValue::Bool(true)).unwrap();
        let value = handle.await.unwrap();
        assert!(matches!(value, CValue::Bool(true)));
    }

    #[tokio::test]
    async fn multiple_readers_observe_same_write() {
        let cell = Cell::new();
        let a = cell.clone();
        let b = cell.clone();
        cell.write(DataId::new_v4(), CValue::Int(42)).unwrap();
        assert!(matches!(a.await_value().await, CValue::Int(42)));
        assert!(matches!(b.await_value().await, CValue::Int(42)));
    }
}
