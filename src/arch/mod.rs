//! # Architecture Abstraction Layer
//!
//! [`Port`](crate::port::Port) implementations and exception handlers.
//! Currently implements the Cortex-M4 port; extensible to other
//! architectures by adding sibling modules.

pub mod cortex_m4;
