//! Operand core types: request/registry/config model, ownership labels,
//! layered spec merge, status record and the error taxonomy shared by the
//! store adapter and the reconciler.

#![forbid(unsafe_code)]

pub mod error;
pub mod labels;
pub mod merge;
pub mod model;
pub mod naming;
pub mod object;
pub mod status;

pub use error::{ErrorList, ReconcileError, StoreError};
pub use object::{ObjectRef, Verb};

pub mod prelude {
    pub use super::error::{ErrorList, ReconcileError, StoreError};
    pub use super::labels::{check_labels, ensure_annotations, ensure_labels, is_owned, is_retained};
    pub use super::merge::{merge_layers, merge_spec};
    pub use super::model::{
        ConfigResource, ConfigService, InstallMode, InstallPhase, InstallStatus, Operand, OperandConfig,
        OperandRegistry, OperandRequest, RegistryKey, RegistryOperator, RequestEntry,
    };
    pub use super::naming::{content_hash, derive_instance_name};
    pub use super::object::{ObjectRef, Verb};
    pub use super::status::{ClusterPhase, MemberStatus, OperandCrMember, OperatorPhase, RequestStatus, ServicePhase};
}
