//! Scoped text arena for transient SQL.
//!
//! Every statement the engine builds is written into one reusable buffer.
//! An [`ArenaScope`] records the buffer length when it is opened and
//! truncates back to that checkpoint when dropped, so all SQL text built
//! during one operation is discarded in O(1) on success and on every early
//! return. Scopes nest: an inner scope writes after its parent's text and
//! rolls back to where it started.

use std::fmt;

/// Default initial capacity: 1 MiB.
pub const DEFAULT_ARENA_CAPACITY: usize = 1024 * 1024;

/// A growable bump buffer for SQL text.
#[derive(Debug)]
pub struct SqlArena {
    buf: String,
    /// Largest `buf.len()` ever reached.
    high_water: usize,
}

impl Default for SqlArena {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_ARENA_CAPACITY)
    }
}

impl SqlArena {
    pub fn with_capacity(capacity: usize) -> Self {
        SqlArena {
            buf: String::with_capacity(capacity),
            high_water: 0,
        }
    }

    /// Bytes currently held by open scopes.
    pub fn used(&self) -> usize {
        self.buf.len()
    }

    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    pub fn high_water(&self) -> usize {
        self.high_water
    }

    /// Open a temporary region. Everything written through the returned
    /// guard is released when it drops.
    pub fn scope(&mut self) -> ArenaScope<'_> {
        let checkpoint = self.buf.len();
        ArenaScope {
            arena: self,
            checkpoint,
        }
    }
}

/// RAII checkpoint into a [`SqlArena`].
pub struct ArenaScope<'a> {
    arena: &'a mut SqlArena,
    checkpoint: usize,
}

impl ArenaScope<'_> {
    pub fn push(&mut self, s: &str) {
        self.arena.buf.push_str(s);
        self.bump();
    }

    pub fn push_char(&mut self, c: char) {
        self.arena.buf.push(c);
        self.bump();
    }

    /// Text written since this scope was opened.
    pub fn as_str(&self) -> &str {
        &self.arena.buf[self.checkpoint..]
    }

    pub fn len(&self) -> usize {
        self.arena.buf.len() - self.checkpoint
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Roll back to the checkpoint but keep the scope open.
    pub fn clear(&mut self) {
        self.arena.buf.truncate(self.checkpoint);
    }

    /// Open a nested region after the current text.
    pub fn scope(&mut self) -> ArenaScope<'_> {
        self.arena.scope()
    }

    fn bump(&mut self) {
        if self.arena.buf.len() > self.arena.high_water {
            self.arena.high_water = self.arena.buf.len();
        }
    }
}

impl Drop for ArenaScope<'_> {
    fn drop(&mut self) {
        self.arena.buf.truncate(self.checkpoint);
    }
}

impl fmt::Debug for ArenaScope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArenaScope")
            .field("checkpoint", &self.checkpoint)
            .field("text", &self.as_str())
            .finish()
    }
}
