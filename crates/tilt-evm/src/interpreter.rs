//! The interpreter main loop:
//! fetch, validate stack, size memory, charge gas, execute.

use crate::contract::Contract;
use crate::error::{VmError, VmResult};
use crate::evm::TiltVm;
use crate::gas::to_word_size;
use crate::memory::Memory;
use crate::opcode::Opcode;
use crate::precompiles::{self, precompiled};
use crate::stack::Stack;
use std::sync::atomic::Ordering;
use tilt_crypto::keccak256;
use tilt_primitives::U512;

impl TiltVm<'_> {
    /// Run `contract`'s code with the given input. Returns the halting
    /// opcode's return bytes, or `None` for STOP/SUICIDE and for a
    /// cooperative abort.
    pub fn run(&mut self, contract: &mut Contract, input: &[u8]) -> VmResult<Option<Vec<u8>>> {
        self.depth += 1;
        let result = self.run_frame(contract, input);
        self.depth -= 1;
        result
    }

    fn run_frame(&mut self, contract: &mut Contract, input: &[u8]) -> VmResult<Option<Vec<u8>>> {
        // Precompiled contracts bypass the interpreter entirely
        if let Some(code_addr) = contract.code_addr {
            if let Some(p) = precompiled(&code_addr) {
                return precompiles::run_precompiled(p, input, contract).map(Some);
            }
        }

        // Don't bother executing if there's no code
        if contract.code.is_empty() {
            return Ok(None);
        }

        if contract.code_hash.is_zero() {
            contract.code_hash = keccak256(&contract.code);
        }
        contract.input = input.to_vec();

        tracing::debug!(code_hash = %contract.code_hash, depth = self.depth, "running contract");

        let mut memory = Memory::new();
        let mut stack = Stack::new();
        let mut pc: u64 = 0;

        // The loop runs until an explicit halt, an error, or until the
        // abort flag is raised by another thread
        while !self.abort.load(Ordering::Acquire) {
            let op_byte = contract.get_op(pc);
            let operation = self.table.entry(op_byte);

            if !operation.valid {
                return Err(VmError::InvalidOpcode(op_byte));
            }

            // Stack bounds are validated before any side effect
            if stack.len() < operation.min_stack {
                return Err(VmError::StackUnderflow);
            }
            if stack.len() > operation.max_stack {
                return Err(VmError::StackOverflow);
            }

            // Memory is expanded in 32-byte words; the word count is also
            // what the gas formula runs on
            let mut memory_size: u64 = 0;
            if let Some(memory_size_fn) = operation.memory_size {
                let requested = memory_size_fn(&stack)?;
                if requested > U512::from(u64::MAX) {
                    return Err(VmError::GasUintOverflow);
                }
                memory_size = to_word_size(requested.low_u64())
                    .checked_mul(32)
                    .ok_or(VmError::GasUintOverflow)?;
            }

            let mut cost = 0;
            if !self.vm_config.disable_gas_metering {
                cost = (operation.gas)(
                    &self.gas_table,
                    self,
                    contract,
                    &stack,
                    &memory,
                    memory_size,
                )?;
                if !contract.use_gas(cost) {
                    return Err(VmError::OutOfGas);
                }
            }
            if memory_size > 0 {
                memory.resize(memory_size);
            }

            if self.vm_config.debug {
                let (gas, depth) = (contract.gas, self.depth);
                if let Some(tracer) = self.vm_config.tracer.as_mut() {
                    if let Some(op) = Opcode::from_byte(op_byte) {
                        tracer.capture_state(pc, op, gas, cost, depth);
                    }
                }
            }

            // from_byte cannot fail here: the entry was marked valid
            let Some(op) = Opcode::from_byte(op_byte) else {
                return Err(VmError::InvalidOpcode(op_byte));
            };
            let res = (operation.execute)(op, &mut pc, self, contract, &mut memory, &mut stack)?;

            if operation.halts {
                return Ok(res);
            }
            if !operation.jumps {
                pc += 1;
            }
        }
        Ok(None)
    }
}
