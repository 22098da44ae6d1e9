//! Machine API resource definitions
//!
//! Typed views of the `machine.openshift.io/v1beta1` resources the Windows
//! machine controller reads, plus the label, annotation and secret names it
//! shares with the node configurator.

pub mod machine;
pub mod machine_set;
pub mod well_known;

pub use machine::*;
pub use machine_set::*;
pub use well_known::*;
