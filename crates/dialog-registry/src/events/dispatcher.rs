//! Ordered observer list and dispatch
//!
//! Observers are appended at load time and never removed; they run in
//! registration order. An observer that fails, or panics, is logged and the
//! remaining observers still run. Observers never run with a bucket lock held.

use std::fmt;
use std::ops::BitOr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::{debug, error};

use crate::dialog::{DialogEvent, DialogState};
use crate::introspection::DialogSnapshot;

/// Set of lifecycle points an observer subscribes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackTypes(u8);

impl CallbackTypes {
    pub const CREATED: CallbackTypes = CallbackTypes(1 << 0);
    pub const STATE_CHANGED: CallbackTypes = CallbackTypes(1 << 1);
    pub const DESTROYED: CallbackTypes = CallbackTypes(1 << 2);
    pub const INTROSPECT: CallbackTypes = CallbackTypes(1 << 3);
    pub const ALL: CallbackTypes = CallbackTypes(0b1111);

    pub fn intersects(self, other: CallbackTypes) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for CallbackTypes {
    type Output = CallbackTypes;

    fn bitor(self, rhs: CallbackTypes) -> CallbackTypes {
        CallbackTypes(self.0 | rhs.0)
    }
}

/// What happened to the dialog
#[derive(Debug)]
pub enum DialogNotification<'a> {
    Created,
    StateChanged {
        old: DialogState,
        new: DialogState,
        event: DialogEvent,
    },
    Destroyed,
    /// Observers may add entries describing their own per-dialog state
    Introspect { context: &'a mut Map<String, Value> },
}

impl DialogNotification<'_> {
    pub fn callback_type(&self) -> CallbackTypes {
        match self {
            DialogNotification::Created => CallbackTypes::CREATED,
            DialogNotification::StateChanged { .. } => CallbackTypes::STATE_CHANGED,
            DialogNotification::Destroyed => CallbackTypes::DESTROYED,
            DialogNotification::Introspect { .. } => CallbackTypes::INTROSPECT,
        }
    }
}

/// A lifecycle observer
pub trait DialogObserver: Send + Sync {
    fn on_dialog_event(
        &self,
        dialog: &DialogSnapshot,
        notification: &mut DialogNotification<'_>,
    ) -> anyhow::Result<()>;
}

impl<F> DialogObserver for F
where
    F: Fn(&DialogSnapshot, &mut DialogNotification<'_>) -> anyhow::Result<()> + Send + Sync,
{
    fn on_dialog_event(
        &self,
        dialog: &DialogSnapshot,
        notification: &mut DialogNotification<'_>,
    ) -> anyhow::Result<()> {
        self(dialog, notification)
    }
}

/// An observer together with the lifecycle points it wants
#[derive(Clone)]
pub struct RegisteredObserver {
    types: CallbackTypes,
    observer: Arc<dyn DialogObserver>,
}

impl RegisteredObserver {
    pub fn new(types: CallbackTypes, observer: Arc<dyn DialogObserver>) -> Self {
        Self { types, observer }
    }

    pub fn types(&self) -> CallbackTypes {
        self.types
    }
}

impl fmt::Debug for RegisteredObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredObserver")
            .field("types", &self.types)
            .field("observer", &"Arc<dyn DialogObserver>")
            .finish()
    }
}

/// Process-wide observer list
#[derive(Default)]
pub struct CallbackDispatcher {
    observers: RwLock<Vec<RegisteredObserver>>,
}

impl CallbackDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an observer
    pub fn register(&self, types: CallbackTypes, observer: Arc<dyn DialogObserver>) {
        self.observers.write().push(RegisteredObserver::new(types, observer));
    }

    /// Append a closure observer
    pub fn register_fn<F>(&self, types: CallbackTypes, observer: F)
    where
        F: Fn(&DialogSnapshot, &mut DialogNotification<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(types, Arc::new(observer));
    }

    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    /// Whether any global observer subscribes to one of `types`
    pub fn wants(&self, types: CallbackTypes) -> bool {
        self.observers.read().iter().any(|o| o.types.intersects(types))
    }

    /// Run the global observers, then `local` (per-dialog) ones.
    pub fn dispatch(
        &self,
        local: &[RegisteredObserver],
        dialog: &DialogSnapshot,
        notification: &mut DialogNotification<'_>,
    ) {
        // observers may register further observers; never call out with the list locked
        let global: Vec<RegisteredObserver> = self.observers.read().clone();
        run_observers(&global, dialog, notification);
        run_observers(local, dialog, notification);
    }
}

impl fmt::Debug for CallbackDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackDispatcher")
            .field("observers", &self.len())
            .finish()
    }
}

/// Run every observer of `list` that subscribes to `notification`.
pub fn run_observers(
    list: &[RegisteredObserver],
    dialog: &DialogSnapshot,
    notification: &mut DialogNotification<'_>,
) {
    let kind = notification.callback_type();

    for entry in list.iter().filter(|o| o.types.intersects(kind)) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            entry.observer.on_dialog_event(dialog, notification)
        }));

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(
                    dialog = %dialog.hash,
                    callid = %dialog.callid,
                    kind = ?kind,
                    "dialog observer failed: {:#}", e
                );
            }
            Err(_) => {
                error!(
                    dialog = %dialog.hash,
                    callid = %dialog.callid,
                    kind = ?kind,
                    "dialog observer panicked"
                );
            }
        }
    }

    debug!(dialog = %dialog.hash, kind = ?kind, "dialog callbacks done");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialog::{DialogCell, DialogIdentity, DialogKey};
    use parking_lot::Mutex;

    fn snapshot() -> DialogSnapshot {
        let cell = DialogCell::new(
            DialogKey::new(0, 1),
            DialogIdentity::new("abc", "sip:a@x", "sip:b@x", "t1"),
            60,
        );
        DialogSnapshot::from_cell(&cell)
    }

    #[test]
    fn test_registration_order_and_filtering() {
        let dispatcher = CallbackDispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second"] {
            let seen = seen.clone();
            dispatcher.register_fn(CallbackTypes::CREATED, move |_, _| {
                seen.lock().push(name);
                Ok(())
            });
        }
        let seen_destroy = seen.clone();
        dispatcher.register_fn(CallbackTypes::DESTROYED, move |_, _| {
            seen_destroy.lock().push("destroy");
            Ok(())
        });

        dispatcher.dispatch(&[], &snapshot(), &mut DialogNotification::Created);
        assert_eq!(*seen.lock(), vec!["first", "second"]);
        assert!(dispatcher.wants(CallbackTypes::DESTROYED));
        assert!(!dispatcher.wants(CallbackTypes::INTROSPECT));
    }

    #[test]
    fn test_failing_observers_do_not_stop_the_rest() {
        let dispatcher = CallbackDispatcher::new();
        let calls = Arc::new(Mutex::new(0));

        dispatcher.register_fn(CallbackTypes::ALL, |_, _| Err(anyhow::anyhow!("store down")));
        dispatcher.register_fn(CallbackTypes::ALL, |_, _| panic!("observer bug"));
        let counter = calls.clone();
        dispatcher.register_fn(CallbackTypes::ALL, move |_, _| {
            *counter.lock() += 1;
            Ok(())
        });

        dispatcher.dispatch(&[], &snapshot(), &mut DialogNotification::Destroyed);
        assert_eq!(*calls.lock(), 1);
    }

    #[test]
    fn test_introspection_context() {
        let dispatcher = CallbackDispatcher::new();
        dispatcher.register_fn(CallbackTypes::INTROSPECT, |dlg, note| {
            if let DialogNotification::Introspect { context } = note {
                context.insert("owner".to_string(), Value::from(dlg.callid.clone()));
            }
            Ok(())
        });

        let mut context = Map::new();
        dispatcher.dispatch(
            &[],
            &snapshot(),
            &mut DialogNotification::Introspect { context: &mut context },
        );
        assert_eq!(context["owner"], "abc");
    }
}
