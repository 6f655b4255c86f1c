//! JSON output for the CLI
//!
//! Every command ends with exactly one response object on stdout:
//! `{"status": "ok", "data": ...}` or
//! `{"status": "error", "code": ..., "message": ...}`. Log lines share
//! stdout, so readers pick the line carrying `status`.

use std::io::{self, Write};

use serde_json::{json, Value};

use super::errors::CliResult;

/// Write a success response to stdout
pub fn write_response(data: Value) -> CliResult<()> {
    emit(&json!({ "status": "ok", "data": data }))
}

/// Write an error response to stdout
pub fn write_error(code: &str, message: &str) -> CliResult<()> {
    emit(&json!({ "status": "error", "code": code, "message": message }))
}

fn emit(response: &Value) -> CliResult<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, response)?;
    writeln!(stdout)?;
    stdout.flush()?;
    Ok(())
}
