//! The 256-entry jump table: every opcode paired with its execution
//! function, gas function, stack bounds and memory sizing as plain data.

use crate::contract::Contract;
use crate::error::VmResult;
use crate::evm::TiltVm;
use crate::gas::{self, STACK_LIMIT};
use crate::instructions as instr;
use crate::memory::Memory;
use crate::opcode::Opcode;
use crate::stack::Stack;
use tilt_primitives::{U256, U512};
use tilt_types::GasTable;

/// Execution function: runs the opcode, optionally producing halting
/// return bytes
pub type ExecutionFn = fn(
    Opcode,
    &mut u64,
    &mut TiltVm<'_>,
    &mut Contract,
    &mut Memory,
    &mut Stack,
) -> VmResult<Option<Vec<u8>>>;

/// Gas function: full cost of the instruction, including memory expansion
pub type GasFn =
    fn(&GasTable, &TiltVm<'_>, &Contract, &Stack, &Memory, u64) -> VmResult<u64>;

/// Memory-size function: byte extent the opcode will touch
pub type MemorySizeFn = fn(&Stack) -> VmResult<U512>;

/// One jump-table entry
#[derive(Clone, Copy)]
pub struct Operation {
    /// The operation itself
    pub execute: ExecutionFn,
    /// Cost of the operation given current machine state
    pub gas: GasFn,
    /// Minimum stack depth required
    pub min_stack: usize,
    /// Maximum stack depth allowed before the operation runs
    pub max_stack: usize,
    /// Memory extent touched, when the operation addresses memory
    pub memory_size: Option<MemorySizeFn>,
    /// Whether the opcode exists at all
    pub valid: bool,
    /// Operation ends execution (STOP, RETURN, SUICIDE)
    pub halts: bool,
    /// Operation sets the program counter itself (JUMP, JUMPI)
    pub jumps: bool,
    /// Operation writes to state
    pub writes: bool,
    /// Operation returns data to the caller
    pub returns: bool,
}

const fn max_stack(pops: usize, push: usize) -> usize {
    STACK_LIMIT + pops - push
}

fn entry(execute: ExecutionFn, gas: GasFn, pops: usize, push: usize) -> Operation {
    Operation {
        execute,
        gas,
        min_stack: pops,
        max_stack: max_stack(pops, push),
        memory_size: None,
        valid: true,
        halts: false,
        jumps: false,
        writes: false,
        returns: false,
    }
}

// Memory-size functions. Sizes are computed in 512 bits so that huge
// offsets surface as gas-uint-overflow instead of wrapping.

fn calc_mem_size(offset: U256, len: U256) -> U512 {
    if len.is_zero() {
        U512::zero()
    } else {
        U512::from(offset) + U512::from(len)
    }
}

fn mem_sha3(stack: &Stack) -> VmResult<U512> {
    Ok(calc_mem_size(stack.back(0)?, stack.back(1)?))
}

fn mem_calldata_copy(stack: &Stack) -> VmResult<U512> {
    Ok(calc_mem_size(stack.back(0)?, stack.back(2)?))
}

fn mem_ext_code_copy(stack: &Stack) -> VmResult<U512> {
    Ok(calc_mem_size(stack.back(1)?, stack.back(3)?))
}

fn mem_mload(stack: &Stack) -> VmResult<U512> {
    Ok(calc_mem_size(stack.back(0)?, U256::from(32u64)))
}

fn mem_mstore(stack: &Stack) -> VmResult<U512> {
    Ok(calc_mem_size(stack.back(0)?, U256::from(32u64)))
}

fn mem_mstore8(stack: &Stack) -> VmResult<U512> {
    Ok(calc_mem_size(stack.back(0)?, U256::one()))
}

fn mem_return(stack: &Stack) -> VmResult<U512> {
    Ok(calc_mem_size(stack.back(0)?, stack.back(1)?))
}

fn mem_log(stack: &Stack) -> VmResult<U512> {
    Ok(calc_mem_size(stack.back(0)?, stack.back(1)?))
}

fn mem_create(stack: &Stack) -> VmResult<U512> {
    Ok(calc_mem_size(stack.back(1)?, stack.back(2)?))
}

fn mem_call(stack: &Stack) -> VmResult<U512> {
    let input = calc_mem_size(stack.back(3)?, stack.back(4)?);
    let output = calc_mem_size(stack.back(5)?, stack.back(6)?);
    Ok(input.max(output))
}

fn mem_delegate_call(stack: &Stack) -> VmResult<U512> {
    let input = calc_mem_size(stack.back(2)?, stack.back(3)?);
    let output = calc_mem_size(stack.back(4)?, stack.back(5)?);
    Ok(input.max(output))
}

/// The instruction table, indexed by opcode byte
#[derive(Clone)]
pub struct JumpTable(Box<[Operation; 256]>);

impl Default for JumpTable {
    fn default() -> Self {
        Self::new()
    }
}

impl JumpTable {
    /// Entry for a raw opcode byte
    pub fn entry(&self, byte: u8) -> Operation {
        self.0[byte as usize]
    }

    /// Build the default instruction table
    pub fn new() -> Self {
        let invalid = Operation {
            execute: instr::op_invalid,
            gas: gas::gas_zero,
            min_stack: 0,
            max_stack: 0,
            memory_size: None,
            valid: false,
            halts: false,
            jumps: false,
            writes: false,
            returns: false,
        };
        let mut t = [invalid; 256];

        t[Opcode::STOP as usize] = Operation {
            halts: true,
            ..entry(instr::op_stop, gas::gas_zero, 0, 0)
        };
        t[Opcode::ADD as usize] = entry(instr::op_add, gas::gas_fastest_step, 2, 1);
        t[Opcode::MUL as usize] = entry(instr::op_mul, gas::gas_fast_step, 2, 1);
        t[Opcode::SUB as usize] = entry(instr::op_sub, gas::gas_fastest_step, 2, 1);
        t[Opcode::DIV as usize] = entry(instr::op_div, gas::gas_fast_step, 2, 1);
        t[Opcode::SDIV as usize] = entry(instr::op_sdiv, gas::gas_fast_step, 2, 1);
        t[Opcode::MOD as usize] = entry(instr::op_mod, gas::gas_fast_step, 2, 1);
        t[Opcode::SMOD as usize] = entry(instr::op_smod, gas::gas_fast_step, 2, 1);
        t[Opcode::ADDMOD as usize] = entry(instr::op_addmod, gas::gas_mid_step, 3, 1);
        t[Opcode::MULMOD as usize] = entry(instr::op_mulmod, gas::gas_mid_step, 3, 1);
        t[Opcode::EXP as usize] = entry(instr::op_exp, gas::gas_exp, 2, 1);
        t[Opcode::SIGNEXTEND as usize] =
            entry(instr::op_signextend, gas::gas_fast_step, 2, 1);

        t[Opcode::LT as usize] = entry(instr::op_lt, gas::gas_fastest_step, 2, 1);
        t[Opcode::GT as usize] = entry(instr::op_gt, gas::gas_fastest_step, 2, 1);
        t[Opcode::SLT as usize] = entry(instr::op_slt, gas::gas_fastest_step, 2, 1);
        t[Opcode::SGT as usize] = entry(instr::op_sgt, gas::gas_fastest_step, 2, 1);
        t[Opcode::EQ as usize] = entry(instr::op_eq, gas::gas_fastest_step, 2, 1);
        t[Opcode::ISZERO as usize] = entry(instr::op_iszero, gas::gas_fastest_step, 1, 1);
        t[Opcode::AND as usize] = entry(instr::op_and, gas::gas_fastest_step, 2, 1);
        t[Opcode::OR as usize] = entry(instr::op_or, gas::gas_fastest_step, 2, 1);
        t[Opcode::XOR as usize] = entry(instr::op_xor, gas::gas_fastest_step, 2, 1);
        t[Opcode::NOT as usize] = entry(instr::op_not, gas::gas_fastest_step, 1, 1);
        t[Opcode::BYTE as usize] = entry(instr::op_byte, gas::gas_fastest_step, 2, 1);

        t[Opcode::SHA3 as usize] = Operation {
            memory_size: Some(mem_sha3),
            ..entry(instr::op_sha3, gas::gas_sha3, 2, 1)
        };

        t[Opcode::ADDRESS as usize] = entry(instr::op_address, gas::gas_quick_step, 0, 1);
        t[Opcode::BALANCE as usize] = entry(instr::op_balance, gas::gas_balance, 1, 1);
        t[Opcode::ORIGIN as usize] = entry(instr::op_origin, gas::gas_quick_step, 0, 1);
        t[Opcode::CALLER as usize] = entry(instr::op_caller, gas::gas_quick_step, 0, 1);
        t[Opcode::CALLVALUE as usize] =
            entry(instr::op_call_value, gas::gas_quick_step, 0, 1);
        t[Opcode::CALLDATALOAD as usize] =
            entry(instr::op_calldata_load, gas::gas_fastest_step, 1, 1);
        t[Opcode::CALLDATASIZE as usize] =
            entry(instr::op_calldata_size, gas::gas_quick_step, 0, 1);
        t[Opcode::CALLDATACOPY as usize] = Operation {
            memory_size: Some(mem_calldata_copy),
            ..entry(instr::op_calldata_copy, gas::gas_calldata_copy, 3, 0)
        };
        t[Opcode::CODESIZE as usize] = entry(instr::op_code_size, gas::gas_quick_step, 0, 1);
        t[Opcode::CODECOPY as usize] = Operation {
            memory_size: Some(mem_calldata_copy),
            ..entry(instr::op_code_copy, gas::gas_calldata_copy, 3, 0)
        };
        t[Opcode::GASPRICE as usize] = entry(instr::op_gas_price, gas::gas_quick_step, 0, 1);
        t[Opcode::EXTCODESIZE as usize] =
            entry(instr::op_ext_code_size, gas::gas_ext_code_size, 1, 1);
        t[Opcode::EXTCODECOPY as usize] = Operation {
            memory_size: Some(mem_ext_code_copy),
            ..entry(instr::op_ext_code_copy, gas::gas_ext_code_copy, 4, 0)
        };

        t[Opcode::BLOCKHASH as usize] = entry(instr::op_blockhash, gas::gas_ext_step, 1, 1);
        t[Opcode::COINBASE as usize] = entry(instr::op_coinbase, gas::gas_quick_step, 0, 1);
        t[Opcode::TIMESTAMP as usize] = entry(instr::op_timestamp, gas::gas_quick_step, 0, 1);
        t[Opcode::NUMBER as usize] = entry(instr::op_number, gas::gas_quick_step, 0, 1);
        t[Opcode::DIFFICULTY as usize] =
            entry(instr::op_difficulty, gas::gas_quick_step, 0, 1);
        t[Opcode::GASLIMIT as usize] = entry(instr::op_gas_limit, gas::gas_quick_step, 0, 1);

        t[Opcode::POP as usize] = entry(instr::op_pop, gas::gas_quick_step, 1, 0);
        t[Opcode::MLOAD as usize] = Operation {
            memory_size: Some(mem_mload),
            ..entry(instr::op_mload, gas::gas_mem_fastest, 1, 1)
        };
        t[Opcode::MSTORE as usize] = Operation {
            memory_size: Some(mem_mstore),
            ..entry(instr::op_mstore, gas::gas_mem_fastest, 2, 0)
        };
        t[Opcode::MSTORE8 as usize] = Operation {
            memory_size: Some(mem_mstore8),
            ..entry(instr::op_mstore8, gas::gas_mem_fastest, 2, 0)
        };
        t[Opcode::SLOAD as usize] = entry(instr::op_sload, gas::gas_sload, 1, 1);
        t[Opcode::SSTORE as usize] = Operation {
            writes: true,
            ..entry(instr::op_sstore, gas::gas_sstore, 2, 0)
        };
        t[Opcode::JUMP as usize] = Operation {
            jumps: true,
            ..entry(instr::op_jump, gas::gas_mid_step, 1, 0)
        };
        t[Opcode::JUMPI as usize] = Operation {
            jumps: true,
            ..entry(instr::op_jumpi, gas::gas_slow_step, 2, 0)
        };
        t[Opcode::PC as usize] = entry(instr::op_pc, gas::gas_quick_step, 0, 1);
        t[Opcode::MSIZE as usize] = entry(instr::op_msize, gas::gas_quick_step, 0, 1);
        t[Opcode::GAS as usize] = entry(instr::op_gas, gas::gas_quick_step, 0, 1);
        t[Opcode::JUMPDEST as usize] = entry(instr::op_jumpdest, gas::gas_jumpdest, 0, 0);

        for i in 0..32 {
            t[Opcode::PUSH1 as usize + i] = entry(instr::op_push, gas::gas_fastest_step, 0, 1);
        }
        for i in 0..16 {
            let n = i + 1;
            t[Opcode::DUP1 as usize + i] = entry(instr::op_dup, gas::gas_fastest_step, n, n + 1);
            t[Opcode::SWAP1 as usize + i] =
                entry(instr::op_swap, gas::gas_fastest_step, n + 1, n + 1);
        }

        let log_gas: [GasFn; 5] = [
            gas::gas_log0,
            gas::gas_log1,
            gas::gas_log2,
            gas::gas_log3,
            gas::gas_log4,
        ];
        for (i, &log_gas_fn) in log_gas.iter().enumerate() {
            t[Opcode::LOG0 as usize + i] = Operation {
                memory_size: Some(mem_log),
                writes: true,
                ..entry(instr::op_log, log_gas_fn, i + 2, 0)
            };
        }

        t[Opcode::CREATE as usize] = Operation {
            memory_size: Some(mem_create),
            writes: true,
            returns: true,
            ..entry(instr::op_create, gas::gas_create, 3, 1)
        };
        t[Opcode::CALL as usize] = Operation {
            memory_size: Some(mem_call),
            returns: true,
            ..entry(instr::op_call, gas::gas_call, 7, 1)
        };
        t[Opcode::CALLCODE as usize] = Operation {
            memory_size: Some(mem_call),
            returns: true,
            ..entry(instr::op_call_code, gas::gas_call_code, 7, 1)
        };
        t[Opcode::RETURN as usize] = Operation {
            memory_size: Some(mem_return),
            halts: true,
            returns: true,
            ..entry(instr::op_return, gas::gas_return, 2, 0)
        };
        t[Opcode::DELEGATECALL as usize] = Operation {
            memory_size: Some(mem_delegate_call),
            returns: true,
            ..entry(instr::op_delegate_call, gas::gas_delegate_call, 6, 1)
        };
        t[Opcode::SUICIDE as usize] = Operation {
            halts: true,
            writes: true,
            ..entry(instr::op_suicide, gas::gas_suicide, 1, 0)
        };

        JumpTable(Box::new(t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_entries_are_marked() {
        let table = JumpTable::new();
        assert!(!table.entry(0x0C).valid);
        assert!(!table.entry(0x21).valid);
        assert!(!table.entry(0xFE).valid);
        assert!(table.entry(Opcode::ADD as u8).valid);
    }

    #[test]
    fn test_halting_and_jumping_flags() {
        let table = JumpTable::new();
        assert!(table.entry(Opcode::STOP as u8).halts);
        assert!(table.entry(Opcode::RETURN as u8).halts);
        assert!(table.entry(Opcode::SUICIDE as u8).halts);
        assert!(table.entry(Opcode::JUMP as u8).jumps);
        assert!(table.entry(Opcode::JUMPI as u8).jumps);
        assert!(!table.entry(Opcode::ADD as u8).halts);
    }

    #[test]
    fn test_stack_bounds() {
        let table = JumpTable::new();
        let add = table.entry(Opcode::ADD as u8);
        assert_eq!(add.min_stack, 2);

        let push = table.entry(Opcode::PUSH1 as u8);
        assert_eq!(push.min_stack, 0);
        assert_eq!(push.max_stack, STACK_LIMIT - 1);

        let dup16 = table.entry(Opcode::DUP16 as u8);
        assert_eq!(dup16.min_stack, 16);
        assert_eq!(dup16.max_stack, STACK_LIMIT - 1);

        let swap16 = table.entry(Opcode::SWAP16 as u8);
        assert_eq!(swap16.min_stack, 17);
        assert_eq!(swap16.max_stack, STACK_LIMIT);

        let call = table.entry(Opcode::CALL as u8);
        assert_eq!(call.min_stack, 7);
    }

    #[test]
    fn test_memory_size_functions_attached() {
        let table = JumpTable::new();
        assert!(table.entry(Opcode::SHA3 as u8).memory_size.is_some());
        assert!(table.entry(Opcode::MSTORE as u8).memory_size.is_some());
        assert!(table.entry(Opcode::RETURN as u8).memory_size.is_some());
        assert!(table.entry(Opcode::CALL as u8).memory_size.is_some());
        assert!(table.entry(Opcode::ADD as u8).memory_size.is_none());
        assert!(table.entry(Opcode::SLOAD as u8).memory_size.is_none());
    }

    #[test]
    fn test_mem_call_takes_wider_extent() {
        let mut stack = Stack::new();
        // ret_size, ret_off, in_size, in_off, value, addr, gas
        for v in [64u64, 32, 8, 0, 0, 0, 100] {
            stack.push(U256::from(v)).unwrap();
        }
        let size = mem_call(&stack).unwrap();
        assert_eq!(size, U512::from(96u64)); // ret_off 32 + ret_size 64
    }

    #[test]
    fn test_calc_mem_size_zero_len_ignores_offset() {
        assert_eq!(calc_mem_size(U256::MAX, U256::zero()), U512::zero());
        // A huge offset with a non-zero length is not lost to wrapping
        let huge = calc_mem_size(U256::MAX, U256::one());
        assert!(huge > U512::from(u64::MAX));
    }
}
