//! ObservationScope for begin/complete logging around a pipeline stage
//!
//! - Logs `{name}_BEGIN` on creation
//! - Logs `{name}_COMPLETE` on `complete()`
//! - Logs `{name}_FAILED` on `fail()` / `fail_fatal()`
//! - Logs `{name}_INCOMPLETE` if dropped without either

use std::cell::Cell;
use std::time::Instant;

use super::logger::Logger;

/// A scope that logs stage begin and end, with elapsed milliseconds.
///
/// ```ignore
/// let scope = ObservationScope::with_fields("RESTORE_REPLAY", &[("dbpath", path)]);
/// // ... replay ...
/// scope.complete_with_fields(&[("applied", "2")]);
/// ```
pub struct ObservationScope<'a> {
    name: &'a str,
    completed: Cell<bool>,
    fields: Vec<(&'a str, String)>,
    started: Instant,
}

impl<'a> ObservationScope<'a> {
    /// Create a new observation scope
    pub fn new(name: &'a str) -> Self {
        Self::with_fields(name, &[])
    }

    /// Create a new observation scope with fields carried on every line
    pub fn with_fields(name: &'a str, fields: &[(&'a str, &str)]) -> Self {
        Logger::info(&format!("{}_BEGIN", name), fields);

        Self {
            name,
            completed: Cell::new(false),
            fields: fields.iter().map(|(k, v)| (*k, v.to_string())).collect(),
            started: Instant::now(),
        }
    }

    fn elapsed_ms(&self) -> String {
        self.started.elapsed().as_millis().to_string()
    }

    fn all_fields<'b>(&'b self, elapsed: &'b str, extra: &[(&'b str, &'b str)]) -> Vec<(&'b str, &'b str)> {
        let mut all: Vec<(&str, &str)> = self.fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
        all.push(("elapsed_ms", elapsed));
        all.extend(extra.iter().copied());
        all
    }

    /// Mark the scope as successfully completed
    pub fn complete(self) {
        self.complete_with_fields(&[]);
    }

    /// Mark the scope as successfully completed with additional fields
    pub fn complete_with_fields(self, extra: &[(&str, &str)]) {
        self.completed.set(true);
        let elapsed = self.elapsed_ms();
        Logger::info(
            &format!("{}_COMPLETE", self.name),
            &self.all_fields(&elapsed, extra),
        );
    }

    /// Mark the scope as failed (ERROR)
    pub fn fail(self, reason: &str) {
        self.completed.set(true);
        let elapsed = self.elapsed_ms();
        Logger::error(
            &format!("{}_FAILED", self.name),
            &self.all_fields(&elapsed, &[("reason", reason)]),
        );
    }

    /// Mark the scope as failed (FATAL)
    pub fn fail_fatal(self, reason: &str) {
        self.completed.set(true);
        let elapsed = self.elapsed_ms();
        Logger::fatal(
            &format!("{}_FAILED", self.name),
            &self.all_fields(&elapsed, &[("reason", reason)]),
        );
    }

    /// Check if the scope has been completed or failed
    pub fn is_completed(&self) -> bool {
        self.completed.get()
    }
}

impl Drop for ObservationScope<'_> {
    fn drop(&mut self) {
        if !self.completed.get() {
            Logger::warn(
                &format!("{}_INCOMPLETE", self.name),
                &[("reason", "scope dropped without completion")],
            );
        }
    }
}
