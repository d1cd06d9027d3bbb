//! Shared status record: the only mutable state touched from fan-out tasks.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use operand_core::status::{OperandCrMember, OperatorPhase, RequestStatus, ServicePhase};

/// Status behind one lock. Never hold the guard across an await.
#[derive(Clone, Default)]
pub struct StatusHandle {
    inner: Arc<Mutex<RequestStatus>>,
}

impl StatusHandle {
    pub fn new(status: RequestStatus) -> Self {
        Self { inner: Arc::new(Mutex::new(status)) }
    }

    fn lock(&self) -> MutexGuard<'_, RequestStatus> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read-modify-write under the lock.
    pub fn with<R>(&self, f: impl FnOnce(&mut RequestStatus) -> R) -> R {
        f(&mut self.lock())
    }

    pub fn set_member(&self, operand: &str, operator: Option<OperatorPhase>, service: Option<ServicePhase>) {
        self.with(|s| s.set_member_status(operand, operator, service));
    }

    pub fn add_cr(&self, operand: &str, cr: OperandCrMember) {
        self.with(|s| s.set_member_cr(operand, cr));
    }

    pub fn snapshot(&self) -> RequestStatus {
        self.lock().clone()
    }
}
