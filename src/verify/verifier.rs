//! Post-restore verifier
//!
//! Checks a restored node against what the restore promised:
//! - minValid is the `{term: -1, ts: (0,1)}` sentinel
//! - a stable checkpoint exists at the expected timestamp
//! - a read one tick below stable fails with SnapshotTooOld, a read at
//!   stable succeeds, for every namespace
//! - the replica-set term is the expected one
//! - the namespaces and their contents match a source fingerprint
//!
//! Each check is independent; `verify` runs them all and reports every
//! failure rather than stopping at the first.

use std::collections::BTreeSet;

use super::errors::{VerifyError, VerifyResult};
use super::fingerprint::DataFingerprint;
use super::node::RestoredNode;
use crate::observability::{log_event_with_fields, Event};
use crate::timestamp::Timestamp;

/// What the restored node is expected to look like
#[derive(Debug, Clone, Default)]
pub struct Expectations {
    /// Expected stable recovery timestamp
    pub stable_timestamp: Option<Timestamp>,
    /// Expected replica-set term
    pub config_term: Option<i64>,
    /// Expected namespace set
    pub namespaces: Option<BTreeSet<String>>,
    /// Expected content, compared by digest
    pub fingerprint: Option<DataFingerprint>,
}

impl Expectations {
    /// Expect the stable checkpoint at `ts`
    pub fn stable_at(mut self, ts: Timestamp) -> Self {
        self.stable_timestamp = Some(ts);
        self
    }

    /// Expect replica-set term `term`
    pub fn config_term(mut self, term: i64) -> Self {
        self.config_term = Some(term);
        self
    }

    /// Expect exactly `namespaces`
    pub fn namespaces<I, S>(mut self, namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.namespaces = Some(namespaces.into_iter().map(Into::into).collect());
        self
    }

    /// Expect content matching `fingerprint`
    pub fn fingerprint(mut self, fingerprint: DataFingerprint) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }
}

/// Result of one check
#[derive(Debug)]
pub struct CheckOutcome {
    /// Check name
    pub name: &'static str,
    /// Failure, if the check failed
    pub error: Option<VerifyError>,
}

/// Results of a full verification
#[derive(Debug, Default)]
pub struct VerifyReport {
    /// Stable timestamp found on the node
    pub stable_timestamp: Option<Timestamp>,
    /// Checks in the order they ran
    pub checks: Vec<CheckOutcome>,
}

impl VerifyReport {
    /// True if every check passed
    pub fn is_success(&self) -> bool {
        self.checks.iter().all(|c| c.error.is_none())
    }

    /// Failed checks
    pub fn failures(&self) -> impl Iterator<Item = &CheckOutcome> {
        self.checks.iter().filter(|c| c.error.is_some())
    }

    /// First failure as an error
    pub fn into_result(self) -> VerifyResult<()> {
        match self.checks.into_iter().find_map(|c| c.error) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Verifier over one restored node
pub struct RestoreVerifier<'a, N: RestoredNode + ?Sized> {
    node: &'a N,
}

impl<'a, N: RestoredNode + ?Sized> RestoreVerifier<'a, N> {
    /// Verifier for `node`
    pub fn new(node: &'a N) -> Self {
        Self { node }
    }

    /// minValid must be the restore sentinel
    pub fn check_min_valid(&self) -> VerifyResult<()> {
        let min_valid = self.node.min_valid();
        if !min_valid.is_sentinel() {
            return Err(VerifyError::min_valid(format!(
                "minValid is {{term: {}, ts: {}}}, not the restore sentinel",
                min_valid.term, min_valid.timestamp
            )));
        }
        Ok(())
    }

    /// A stable checkpoint must exist, at `expected` when given
    pub fn check_stable_timestamp(&self, expected: Option<Timestamp>) -> VerifyResult<Timestamp> {
        let stable = self
            .node
            .last_stable_recovery_timestamp()
            .ok_or_else(|| VerifyError::stable_timestamp("Node has no stable checkpoint"))?;
        match expected {
            Some(expected) if expected != stable => Err(VerifyError::stable_timestamp(format!(
                "Stable timestamp is {}, expected {}",
                stable, expected
            ))),
            _ => Ok(stable),
        }
    }

    /// No history below `stable`; reads at `stable` succeed
    pub fn check_snapshot_boundary(&self, stable: Timestamp) -> VerifyResult<()> {
        let below = stable.prev_tick().ok_or_else(|| {
            VerifyError::snapshot_boundary("Stable timestamp is null; no boundary to check")
        })?;
        for namespace in self.node.namespaces() {
            match self.node.read_at(&namespace, below) {
                Err(e) if e.is_snapshot_too_old() => {}
                Err(e) => {
                    return Err(VerifyError::storage(
                        format!("Read of {} at {} failed unexpectedly", namespace, below),
                        e,
                    ))
                }
                Ok(_) => {
                    return Err(VerifyError::snapshot_boundary(format!(
                        "Read of {} at {} succeeded below stable timestamp {}",
                        namespace, below, stable
                    )))
                }
            }
            self.node.read_at(&namespace, stable).map_err(|e| {
                VerifyError::snapshot_boundary(format!(
                    "Read of {} at stable timestamp {} failed: {}",
                    namespace, stable, e
                ))
            })?;
        }
        Ok(())
    }

    /// Replica-set term must be `expected`
    pub fn check_config_term(&self, expected: i64) -> VerifyResult<()> {
        let actual = self.node.replset_config().term;
        if actual != expected {
            return Err(VerifyError::config_term(expected, actual));
        }
        Ok(())
    }

    /// Catalog must hold exactly `expected`
    pub fn check_namespaces(&self, expected: &BTreeSet<String>) -> VerifyResult<()> {
        let actual: BTreeSet<String> = self.node.namespaces().into_iter().collect();
        if &actual != expected {
            let missing: Vec<&String> = expected.difference(&actual).collect();
            let extra: Vec<&String> = actual.difference(expected).collect();
            return Err(VerifyError::data_mismatch(format!(
                "Namespace set differs: missing {:?}, unexpected {:?}",
                missing, extra
            )));
        }
        Ok(())
    }

    /// Content at `stable` must match `expected` digest for digest
    pub fn check_fingerprint(&self, stable: Timestamp, expected: &DataFingerprint) -> VerifyResult<()> {
        let actual = DataFingerprint::capture(self.node, stable)?;
        let differing = expected.differences(&actual);
        if !differing.is_empty() {
            return Err(VerifyError::data_mismatch(format!(
                "Content differs from source in {}",
                differing.join(", ")
            )));
        }
        Ok(())
    }

    /// Run every check `expectations` calls for
    pub fn verify(&self, expectations: &Expectations) -> VerifyReport {
        let mut report = VerifyReport::default();

        let min_valid = self.check_min_valid();
        record(&mut report, "min_valid", min_valid);

        let stable = self.check_stable_timestamp(expectations.stable_timestamp);
        let found = match &stable {
            Ok(ts) => Some(*ts),
            Err(_) => self.node.last_stable_recovery_timestamp(),
        };
        record(&mut report, "stable_timestamp", stable.map(|_| ()));
        report.stable_timestamp = found;

        if let Some(stable) = found {
            let boundary = self.check_snapshot_boundary(stable);
            record(&mut report, "snapshot_boundary", boundary);
        }
        if let Some(term) = expectations.config_term {
            let result = self.check_config_term(term);
            record(&mut report, "config_term", result);
        }
        if let Some(namespaces) = &expectations.namespaces {
            let result = self.check_namespaces(namespaces);
            record(&mut report, "namespaces", result);
        }
        if let (Some(fingerprint), Some(stable)) = (&expectations.fingerprint, found) {
            let result = self.check_fingerprint(stable, fingerprint);
            record(&mut report, "fingerprint", result);
        }

        report
    }
}

fn record(report: &mut VerifyReport, name: &'static str, result: VerifyResult<()>) {
    match &result {
        Ok(()) => log_event_with_fields(Event::VerifyPassed, &[("check", name)]),
        Err(e) => log_event_with_fields(
            Event::VerifyFailed,
            &[("check", name), ("code", e.code().as_str()), ("error", e.message())],
        ),
    }
    report.checks.push(CheckOutcome {
        name,
        error: result.err(),
    });
}
