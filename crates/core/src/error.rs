//! Error taxonomy.
//!
//! Not-found and ownership mismatches are not errors: they select the create
//! path or a skip. Everything here is either a hard validation failure or a
//! transient failure collected into an [`ErrorList`] for the pass.

use std::fmt;
use std::time::Duration;

use crate::object::{ObjectRef, Verb};

/// Failures reported by an object store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(ObjectRef),
    #[error("{0} already exists")]
    AlreadyExists(ObjectRef),
    #[error("conflict on {verb} {target}: {message}")]
    Conflict { verb: Verb, target: ObjectRef, message: String },
    #[error("failed to {verb} {target}: {message}")]
    Backend { verb: Verb, target: ObjectRef, message: String },
}

impl StoreError {
    pub fn backend(verb: Verb, target: &ObjectRef, message: impl fmt::Display) -> Self {
        StoreError::Backend { verb, target: target.clone(), message: message.to_string() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Failures of one unit of reconciliation work.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("the {field} of {what} is empty for operator {operator}")]
    Validation { operator: String, what: &'static str, field: &'static str },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("timed out after {waited:?} waiting to {action} {target}")]
    Timeout { action: &'static str, target: ObjectRef, waited: Duration },
    #[error("failed to get {what} {key}: {source}")]
    Lookup {
        what: &'static str,
        key: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("{what} {key} not found")]
    Missing { what: &'static str, key: String },
    #[error("failed to parse template examples of operator {operator}: {source}")]
    Templates {
        operator: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("installation of operator {operator} in namespace {namespace} failed")]
    InstallFailed { operator: String, namespace: String },
    #[error("deletion of {target} aborted: {message}")]
    Task { target: ObjectRef, message: String },
}

impl ReconcileError {
    pub fn validation(operator: &str, what: &'static str, field: &'static str) -> Self {
        ReconcileError::Validation { operator: operator.to_string(), what, field }
    }
}

/// Independent failures of one pass, reported together.
#[derive(Debug, Default)]
pub struct ErrorList {
    errors: Vec<ReconcileError>,
}

impl ErrorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: impl Into<ReconcileError>) {
        self.errors.push(err.into());
    }

    pub fn append(&mut self, mut other: ErrorList) {
        self.errors.append(&mut other.errors);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ReconcileError> {
        self.errors.iter()
    }

    /// `Ok(())` when nothing was collected.
    pub fn into_result(self) -> Result<(), ErrorList> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    /// Split results into successes and the collected failures.
    pub fn fold<T, I>(results: I) -> (Vec<T>, ErrorList)
    where
        I: IntoIterator<Item = Result<T, ReconcileError>>,
    {
        let mut ok = Vec::new();
        let mut errs = ErrorList::new();
        for r in results {
            match r {
                Ok(v) => ok.push(v),
                Err(e) => errs.push(e),
            }
        }
        (ok, errs)
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.len() {
            0 => f.write_str("no errors"),
            1 => write!(f, "{}", self.errors[0]),
            n => {
                write!(f, "{} errors occurred:", n)?;
                for e in &self.errors {
                    write!(f, "\n\t* {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ErrorList {}

impl From<ReconcileError> for ErrorList {
    fn from(err: ReconcileError) -> Self {
        Self { errors: vec![err] }
    }
}

impl From<StoreError> for ErrorList {
    fn from(err: StoreError) -> Self {
        Self { errors: vec![err.into()] }
    }
}

impl FromIterator<ReconcileError> for ErrorList {
    fn from_iter<I: IntoIterator<Item = ReconcileError>>(iter: I) -> Self {
        Self { errors: iter.into_iter().collect() }
    }
}

impl Extend<ReconcileError> for ErrorList {
    fn extend<I: IntoIterator<Item = ReconcileError>>(&mut self, iter: I) {
        self.errors.extend(iter);
    }
}

impl IntoIterator for ErrorList {
    type Item = ReconcileError;
    type IntoIter = std::vec::IntoIter<ReconcileError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}
