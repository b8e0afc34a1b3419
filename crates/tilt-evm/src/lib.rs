//! # tilt-evm
//!
//! The Tilt virtual machine: a stack-based, gas-metered interpreter for
//! contract bytecode executing against a [`tilt_state::StateDb`].
//!
//! The machine is built from small parts: a 1024-deep operand stack of
//! 256-bit words, a byte-addressable linear memory that grows in 32-byte
//! words, a 256-entry jump table pairing every opcode with its gas and
//! stack requirements, and a re-entrant call environment with
//! snapshot/rollback semantics.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod analysis;
mod contract;
mod error;
mod evm;
pub mod gas;
mod instructions;
mod interpreter;
mod memory;
mod opcode;
mod precompiles;
pub mod runtime;
mod stack;
mod table;

pub use contract::Contract;
pub use error::{VmError, VmResult};
pub use evm::{
    create_address, CallResult, Context, CreateResult, GetHashFn, TiltVm, Tracer, VmConfig,
};
pub use memory::Memory;
pub use opcode::Opcode;
pub use precompiles::{precompiled, PrecompiledContract};
pub use stack::Stack;
pub use table::{ExecutionFn, GasFn, JumpTable, MemorySizeFn, Operation};
