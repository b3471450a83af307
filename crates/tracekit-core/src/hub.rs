// SPDX-License-Identifier: MIT OR Apache-2.0
//! Hubs: per-task handles to the capture APIs.
//!
//! A hub owns a non-empty stack of (client, scope) layers. The process-wide
//! default hub always exists; each thread can additionally bind its own
//! current hub with [`Hub::run`], which is how task-scoped hubs are modeled
//! in a runtime without an ambient per-task context value. Framework
//! adapters clone the current hub per request and bind it for the request's
//! lifetime.

use std::any::Any;
use std::cell::RefCell;
use std::error::Error;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use tracekit_types::{Breadcrumb, CheckIn, Event, EventId, EventType, Exception, Level};

use crate::client::Client;
use crate::exception::exceptions_from_error;
use crate::options::DEFAULT_MAX_ERROR_DEPTH;
use crate::scope::{EventHint, Scope};
use crate::span::{Span, TransactionContext, start_transaction};

static MAIN_HUB: OnceLock<Arc<Hub>> = OnceLock::new();

thread_local! {
    static CURRENT_HUB: RefCell<Option<Arc<Hub>>> = const { RefCell::new(None) };
}

#[derive(Clone)]
struct Layer {
    client: Option<Arc<Client>>,
    scope: Arc<Scope>,
}

/// Per-task handle carrying a stack of scopes and the bound client.
pub struct Hub {
    stack: Mutex<Vec<Layer>>,
    last_event_id: Mutex<Option<EventId>>,
}

impl Hub {
    /// A hub with a single layer.
    #[must_use]
    pub fn new(client: Option<Arc<Client>>, scope: Arc<Scope>) -> Arc<Hub> {
        Arc::new(Hub {
            stack: Mutex::new(vec![Layer { client, scope }]),
            last_event_id: Mutex::new(None),
        })
    }

    /// The process-wide default hub. Exists from first use; carries no
    /// client until one is bound.
    #[must_use]
    pub fn main() -> Arc<Hub> {
        Arc::clone(MAIN_HUB.get_or_init(|| Hub::new(None, Arc::new(Scope::new()))))
    }

    /// The hub for the current call site: the thread-bound hub when inside
    /// [`Hub::run`], the process default otherwise.
    #[must_use]
    pub fn current() -> Arc<Hub> {
        CURRENT_HUB
            .with(|current| current.borrow().clone())
            .unwrap_or_else(Hub::main)
    }

    /// Bind `hub` as the current hub for the duration of `f`, restoring the
    /// previous binding afterwards (on panic too).
    pub fn run<R>(hub: Arc<Hub>, f: impl FnOnce() -> R) -> R {
        struct Rebind(Option<Arc<Hub>>);
        impl Drop for Rebind {
            fn drop(&mut self) {
                CURRENT_HUB.with(|current| *current.borrow_mut() = self.0.take());
            }
        }
        let previous = CURRENT_HUB.with(|current| current.borrow_mut().replace(hub));
        let _rebind = Rebind(previous);
        f()
    }

    fn top(&self) -> Layer {
        self.stack
            .lock()
            .expect("hub lock poisoned")
            .last()
            .expect("hub stack never empty")
            .clone()
    }

    /// The client bound to the top layer, if any.
    #[must_use]
    pub fn client(&self) -> Option<Arc<Client>> {
        self.top().client
    }

    /// Deep-copy the top layer into a new single-layer hub. The scope is
    /// cloned, the client shared.
    #[must_use]
    pub fn clone_hub(&self) -> Arc<Hub> {
        let layer = self.top();
        Hub::new(layer.client, Arc::new((*layer.scope).clone()))
    }

    /// Swap the top layer's client.
    pub fn bind_client(&self, client: Option<Arc<Client>>) {
        let mut stack = self.stack.lock().expect("hub lock poisoned");
        let layer = stack.last_mut().expect("hub stack never empty");
        layer.client = client;
    }

    // -- scope management -------------------------------------------------

    /// Clone the current scope and push it.
    pub fn push_scope(&self) {
        let mut stack = self.stack.lock().expect("hub lock poisoned");
        let top = stack.last().expect("hub stack never empty");
        let layer = Layer {
            client: top.client.clone(),
            scope: Arc::new((*top.scope).clone()),
        };
        stack.push(layer);
    }

    /// Discard the top scope. The base layer is never popped.
    pub fn pop_scope(&self) {
        let mut stack = self.stack.lock().expect("hub lock poisoned");
        if stack.len() > 1 {
            stack.pop();
        } else {
            tracing::debug!("pop_scope on a hub with a single layer is a no-op");
        }
    }

    /// Run `f` against a temporary scope clone; the scope is popped again
    /// when `f` returns or panics.
    pub fn with_scope<R>(&self, f: impl FnOnce(&Scope) -> R) -> R {
        struct PopGuard<'a>(&'a Hub);
        impl Drop for PopGuard<'_> {
            fn drop(&mut self) {
                self.0.pop_scope();
            }
        }
        self.push_scope();
        let _guard = PopGuard(self);
        let scope = self.top().scope;
        f(&scope)
    }

    /// Mutate the current scope in place.
    pub fn configure_scope<R>(&self, f: impl FnOnce(&Scope) -> R) -> R {
        let scope = self.top().scope;
        f(&scope)
    }

    // -- capture ----------------------------------------------------------

    /// Capture a pre-built event through the bound client.
    pub fn capture_event(&self, event: Event) -> Option<EventId> {
        self.capture_event_with_hint(event, &EventHint::default())
    }

    /// Capture a pre-built event with an explicit hint.
    pub fn capture_event_with_hint(&self, mut event: Event, hint: &EventHint) -> Option<EventId> {
        let layer = self.top();
        let client = layer.client?;
        if event.event_id.is_nil() {
            event.event_id = EventId::new();
        }
        let id = client.capture_event(Some(event), hint, Some(&layer.scope));
        if let Some(id) = id {
            *self.last_event_id.lock().expect("hub lock poisoned") = Some(id);
        }
        id
    }

    /// Capture a message at the given level. An empty message is a usage
    /// error and produces a surrogate event describing the misuse.
    pub fn capture_message(&self, message: &str, level: Level) -> Option<EventId> {
        let event = if message.is_empty() {
            usage_error("capture_message called with an empty message")
        } else {
            Event::from_message(message, level)
        };
        self.capture_event(event)
    }

    /// Capture an error and its cause chain as an exception event.
    pub fn capture_error(&self, error: &(dyn Error + 'static)) -> Option<EventId> {
        let depth = self
            .client()
            .map_or(DEFAULT_MAX_ERROR_DEPTH, |client| client.options().error_depth());
        let mut event = Event::new();
        event.level = Some(Level::Error);
        event.exception = exceptions_from_error(error, depth);
        self.capture_event(event)
    }

    /// Capture a monitor check-in.
    pub fn capture_check_in(&self, check_in: CheckIn) -> Option<EventId> {
        let event = Event {
            ty: EventType::CheckIn,
            check_in: Some(check_in),
            ..Event::default()
        };
        self.capture_event(event)
    }

    // -- breadcrumbs ------------------------------------------------------

    /// Record a breadcrumb on the current scope, honoring the client's
    /// breadcrumb limit and `before_breadcrumb` hook.
    pub fn add_breadcrumb(&self, breadcrumb: Breadcrumb) {
        let layer = self.top();
        let Some(client) = layer.client else {
            return;
        };
        let Some(limit) = client.options().breadcrumb_limit() else {
            return;
        };
        let breadcrumb = match &client.options().before_breadcrumb {
            Some(callback) => match callback(breadcrumb) {
                Some(breadcrumb) => breadcrumb,
                None => return,
            },
            None => breadcrumb,
        };
        layer.scope.add_breadcrumb(breadcrumb, limit);
    }

    // -- panics -----------------------------------------------------------

    /// Run `f`, capturing any panic as an event. The panic is not resumed;
    /// the captured event id (if any) is returned in the error position.
    pub fn recover<R>(&self, f: impl FnOnce() -> R) -> Result<R, Option<EventId>> {
        match std::panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(value) => Ok(value),
            Err(payload) => Err(self.capture_panic_payload(payload.as_ref())),
        }
    }

    /// Capture a recovered panic payload: strings become fatal message
    /// events, anything else a fatal event carrying the rendered payload
    /// shape. A trait object exposes no type name, so the type id is the
    /// best stable discriminator between different non-string payloads.
    pub fn capture_panic_payload(&self, payload: &(dyn Any + Send)) -> Option<EventId> {
        let mut event = Event::new();
        event.level = Some(Level::Fatal);
        if let Some(message) = payload.downcast_ref::<&str>() {
            event.message = (*message).to_owned();
        } else if let Some(message) = payload.downcast_ref::<String>() {
            event.message.clone_from(message);
        } else {
            event.message = format!(
                "panic with non-string payload of type {:?}",
                payload.type_id()
            );
        }
        self.capture_event(event)
    }

    // -- tracing ----------------------------------------------------------

    /// Start a transaction and bind it to the current scope.
    #[must_use]
    pub fn start_transaction(&self, ctx: TransactionContext) -> Arc<Span> {
        let layer = self.top();
        let span = start_transaction(layer.client, Some(Arc::clone(&layer.scope)), ctx);
        layer.scope.set_span(Some(Arc::clone(&span)));
        span
    }

    // -- misc -------------------------------------------------------------

    /// Id of the last event successfully handed to the client.
    #[must_use]
    pub fn last_event_id(&self) -> Option<EventId> {
        *self.last_event_id.lock().expect("hub lock poisoned")
    }

    /// Flush the bound client.
    #[must_use]
    pub fn flush(&self, timeout: Duration) -> bool {
        match self.client() {
            Some(client) => client.flush(timeout),
            None => true,
        }
    }
}

fn usage_error(message: &str) -> Event {
    let mut event = Event::new();
    event.level = Some(Level::Error);
    event.exception.push(Exception {
        ty: "UsageError".into(),
        value: message.into(),
        ..Exception::default()
    });
    event
}
