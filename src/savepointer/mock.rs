use super::Savepointer;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Name used when a statement refers to a savepoint the mock never created.
pub const UNKNOWN_SAVEPOINT_NAME: &str = "UNKNOWN_SAVEPOINT_NAME";

#[derive(Debug, Default)]
struct State {
    num: usize,
    names: HashMap<String, String>,
    statements: Vec<String>,
}

/// A recording [`Savepointer`] for tests.
///
/// Generated savepoint names are replaced by `sp_1`, `sp_2`, ... in creation
/// order so that statement sequences are predictable. Every statement handed
/// out is recorded; clones share the recording.
///
/// ```
/// use sqlx_atomic::savepointer::{MockSavepointer, Savepointer};
///
/// let sp = MockSavepointer::new(true);
/// assert_eq!(sp.create("x"), "SAVEPOINT sp_1;");
/// assert_eq!(sp.release("x"), "RELEASE sp_1;");
/// assert_eq!(sp.statements(), vec!["SAVEPOINT sp_1;", "RELEASE sp_1;"]);
/// ```
#[derive(Debug, Clone)]
pub struct MockSavepointer {
    state: Arc<Mutex<State>>,
    release: bool,
}

impl MockSavepointer {
    /// Creates a mock. With `release = false` it behaves like a dialect that
    /// cannot release savepoints.
    pub fn new(release: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            release,
        }
    }

    /// Returns every statement emitted so far, in order.
    pub fn statements(&self) -> Vec<String> {
        self.state.lock().statements.clone()
    }

    /// Forgets recorded statements and restarts numbering.
    pub fn reset(&self) {
        *self.state.lock() = State::default();
    }

    fn emit(&self, state: &mut State, stmt: String) -> String {
        tracing::trace!(statement = %stmt, release = self.release, "mock savepoint statement");
        state.statements.push(stmt.clone());
        stmt
    }
}

impl Default for MockSavepointer {
    fn default() -> Self {
        Self::new(true)
    }
}

fn mapped(state: &State, name: &str) -> String {
    state
        .names
        .get(name)
        .cloned()
        .unwrap_or_else(|| UNKNOWN_SAVEPOINT_NAME.to_string())
}

impl Savepointer for MockSavepointer {
    fn create(&self, name: &str) -> String {
        let mut state = self.state.lock();
        state.num += 1;
        let mapped_name = format!("sp_{}", state.num);
        state.names.insert(name.to_string(), mapped_name.clone());
        self.emit(&mut state, format!("SAVEPOINT {mapped_name};"))
    }

    fn rollback(&self, name: &str) -> String {
        let mut state = self.state.lock();
        let mapped_name = mapped(&state, name);
        self.emit(&mut state, format!("ROLLBACK TO {mapped_name};"))
    }

    fn release(&self, name: &str) -> String {
        if !self.release {
            return String::new();
        }
        let mut state = self.state.lock();
        let mapped_name = mapped(&state, name);
        self.emit(&mut state, format!("RELEASE {mapped_name};"))
    }
}
