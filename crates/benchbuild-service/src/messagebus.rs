//! Command dispatch.
//!
//! Each [`CommandKind`] maps to exactly one [`CommandHandler`]. A dispatch
//! runs the handler against a fresh [`UnitOfWork`], commits on success or
//! rolls back on failure, then broadcasts the committed events to every
//! event handler subscribed to their kind.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info};

use benchbuild_core::{Command, CommandKind, CommandStatus, DispatchId, Event, EventKind};

use crate::error::DispatchError;
use crate::uow::UnitOfWork;

/// Handles one kind of command.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// The command kind this handler is registered for.
    fn kind(&self) -> CommandKind;

    /// Execute the command. Returns the identifiers of the artifacts it
    /// produced (image tags, container ids, archive paths).
    async fn handle(
        &self,
        command: &Command,
        uow: &mut UnitOfWork,
    ) -> Result<Vec<String>, DispatchError>;
}

/// Callback for committed events.
pub type EventHandler = Box<dyn Fn(&Event) + Send + Sync>;

/// Routes commands to their handlers and events to their subscribers.
#[derive(Default)]
pub struct MessageBus {
    handlers: HashMap<CommandKind, Arc<dyn CommandHandler>>,
    event_handlers: HashMap<EventKind, Vec<EventHandler>>,
    dispatched: AtomicUsize,
}

impl MessageBus {
    /// Create a bus with no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for its command kind.
    pub fn register<H>(&mut self, handler: H) -> Result<(), DispatchError>
    where
        H: CommandHandler + 'static,
    {
        let kind = handler.kind();
        if self.handlers.contains_key(&kind) {
            return Err(DispatchError::DuplicateHandler(kind));
        }
        self.handlers.insert(kind, Arc::new(handler));
        Ok(())
    }

    /// Add an event handler. Any number may subscribe to the same kind.
    pub fn subscribe<F>(&mut self, kind: EventKind, handler: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.event_handlers
            .entry(kind)
            .or_default()
            .push(Box::new(handler));
    }

    /// Returns true if a handler is registered for `kind`.
    pub fn handles(&self, kind: CommandKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Number of commands handed to [`handle`](Self::handle) so far.
    pub fn dispatched(&self) -> usize {
        self.dispatched.load(Ordering::SeqCst)
    }

    /// Dispatch `command` within `uow`.
    ///
    /// The unit of work is consumed: it belongs to this dispatch only.
    pub async fn handle(
        &self,
        command: Command,
        mut uow: UnitOfWork,
    ) -> Result<Vec<String>, DispatchError> {
        let dispatch_id = DispatchId::generate();
        let kind = command.kind();
        let mut status = CommandStatus::Submitted;
        self.dispatched.fetch_add(1, Ordering::SeqCst);
        debug!(dispatch_id = %dispatch_id, command = %kind, "Command submitted");

        let handler = self
            .handlers
            .get(&kind)
            .ok_or(DispatchError::NoHandler(kind))?;

        match handler.handle(&command, &mut uow).await {
            Ok(artifacts) => {
                advance(&mut status, CommandStatus::Handled, &dispatch_id);
                uow.commit();
                advance(&mut status, CommandStatus::Committed, &dispatch_id);

                for event in uow.collect_new_events() {
                    self.publish(&event);
                }

                info!(
                    dispatch_id = %dispatch_id,
                    command = %kind,
                    artifacts = artifacts.len(),
                    "Command committed"
                );
                Ok(artifacts)
            }
            Err(e) => {
                uow.rollback();
                advance(&mut status, CommandStatus::Failed, &dispatch_id);
                error!(dispatch_id = %dispatch_id, command = %kind, error = %e, "Command failed");
                Err(e)
            }
        }
    }

    fn publish(&self, event: &Event) {
        let Some(handlers) = self.event_handlers.get(&event.kind()) else {
            return;
        };
        for handler in handlers {
            handler(event);
        }
    }
}

fn advance(status: &mut CommandStatus, next: CommandStatus, dispatch_id: &DispatchId) {
    debug_assert!(
        status.can_transition_to(next),
        "illegal transition {:?} -> {:?}",
        status,
        next
    );
    debug!(dispatch_id = %dispatch_id, from = ?status, to = ?next, "Command status");
    *status = next;
}
