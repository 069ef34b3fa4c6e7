//! Entity creation contexts and the stack that nests them.
//!
//! Every `table(...)` call in a script pushes an [`EntityCreationContext`]
//! naming the active entity type and the positional attribute schema used by
//! `row(...)`. The context collects the entities created while it is active
//! and is popped when the `table` block returns.
//!
//! ```text
//! table(User, {"name"}, function()     push  [User]
//!   row("alice")                       peek  [User] <- alice
//!   table(Order, {"total"}, function() push  [User, Order]
//!     row(10)                          peek  [User, Order] <- 10
//!   end)                               pop   [User]
//! end)                                 pop   []
//! ```
//!
//! [`ContextFrame`] pairs the push with a pop on every exit path, so the
//! stack stays balanced when a block fails.

use crate::entity::{Entity, EntityType};
use parking_lot::Mutex;
use std::sync::Arc;

/// The active entity type, attribute schema and results of one `table` block.
#[derive(Debug, Clone)]
pub struct EntityCreationContext {
    entity_type: Arc<EntityType>,
    attributes: Vec<String>,
    created: Vec<Entity>,
}

impl EntityCreationContext {
    /// Creates a context with no entities yet.
    pub fn new(entity_type: Arc<EntityType>, attributes: Vec<String>) -> Self {
        Self { entity_type, attributes, created: Vec::new() }
    }

    /// Returns the entity type rows are created as.
    pub fn entity_type(&self) -> &Arc<EntityType> {
        &self.entity_type
    }

    /// Returns the positional attribute names for `row` values.
    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    /// Returns the entities created in this context so far.
    pub fn created(&self) -> &[Entity] {
        &self.created
    }

    /// Records a persisted entity.
    pub fn push_created(&mut self, entity: Entity) {
        self.created.push(entity);
    }

    /// Consumes the context, returning its entities in creation order.
    pub fn into_created(self) -> Vec<Entity> {
        self.created
    }
}

/// Last-in-first-out stack of [`EntityCreationContext`]s.
#[derive(Debug, Default)]
pub struct ContextStack {
    frames: Vec<EntityCreationContext>,
}

impl ContextStack {
    /// Creates an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a new context for `entity_type`.
    pub fn push(&mut self, entity_type: Arc<EntityType>, attributes: Vec<String>) {
        self.frames.push(EntityCreationContext::new(entity_type, attributes));
    }

    /// Removes and returns the active context.
    pub fn pop(&mut self) -> Option<EntityCreationContext> {
        self.frames.pop()
    }

    /// Returns the active context.
    pub fn peek(&self) -> Option<&EntityCreationContext> {
        self.frames.last()
    }

    /// Returns the active context mutably.
    pub fn peek_mut(&mut self) -> Option<&mut EntityCreationContext> {
        self.frames.last_mut()
    }

    /// Number of open contexts.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Returns true if no context is open.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// A pushed context that is popped exactly once.
///
/// [`finish`](Self::finish) pops the frame and hands back its context; if
/// the frame is dropped unfinished (the block failed or panicked) the pop
/// still happens.
#[must_use = "dropping the frame pops the context immediately"]
pub struct ContextFrame {
    stack: Arc<Mutex<ContextStack>>,
    depth: usize,
    finished: bool,
}

impl ContextFrame {
    /// Pushes a context onto the shared stack.
    pub fn enter(
        stack: &Arc<Mutex<ContextStack>>,
        entity_type: Arc<EntityType>,
        attributes: Vec<String>,
    ) -> Self {
        let depth = {
            let mut guard = stack.lock();
            guard.push(entity_type, attributes);
            guard.depth()
        };
        Self { stack: Arc::clone(stack), depth, finished: false }
    }

    /// Pops the frame, returning its context.
    pub fn finish(mut self) -> Option<EntityCreationContext> {
        self.finished = true;
        self.pop()
    }

    fn pop(&self) -> Option<EntityCreationContext> {
        let mut stack = self.stack.lock();
        if stack.depth() != self.depth {
            log::warn!(
                "Entity context stack depth is {} while closing frame opened at depth {}",
                stack.depth(),
                self.depth
            );
        }
        stack.pop()
    }
}

impl Drop for ContextFrame {
    fn drop(&mut self) {
        if !self.finished {
            self.pop();
        }
    }
}
