//! Mesos v1 protobuf messages for the call side of the scheduler API.
//!
//! Only the subset skua sends is carried: the scheduler `Call` envelope and
//! the common messages it references. Events arrive as JSON (see
//! `crate::events`) and need no protobuf mirror. The structs follow
//! prost-build output conventions so a move to generated code stays a
//! drop-in swap.

pub mod mesos;
pub mod scheduler;
