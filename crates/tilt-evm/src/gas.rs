//! Gas schedule: cost constants, the memory expansion formula and the
//! dynamic cost functions referenced by the jump table.

use crate::contract::Contract;
use crate::error::{VmError, VmResult};
use crate::evm::TiltVm;
use crate::memory::Memory;
use crate::stack::Stack;
use tilt_primitives::{Address, U256};
use tilt_types::GasTable;

/// Quick-step tier (2)
pub const GAS_QUICK_STEP: u64 = 2;
/// Fastest-step tier (3)
pub const GAS_FASTEST_STEP: u64 = 3;
/// Fast-step tier (5)
pub const GAS_FAST_STEP: u64 = 5;
/// Mid-step tier (8)
pub const GAS_MID_STEP: u64 = 8;
/// Slow-step tier (10)
pub const GAS_SLOW_STEP: u64 = 10;
/// Ext-step tier (20)
pub const GAS_EXT_STEP: u64 = 20;

/// EXP base cost
pub const EXP_GAS: u64 = 10;
/// JUMPDEST cost
pub const JUMPDEST_GAS: u64 = 1;
/// SSTORE zero to non-zero
pub const SSTORE_SET_GAS: u64 = 20000;
/// SSTORE non-zero to non-zero
pub const SSTORE_RESET_GAS: u64 = 5000;
/// SSTORE non-zero to zero
pub const SSTORE_CLEAR_GAS: u64 = 5000;
/// LOG base cost
pub const LOG_GAS: u64 = 375;
/// Per-topic LOG cost
pub const LOG_TOPIC_GAS: u64 = 375;
/// Per-byte LOG data cost
pub const LOG_DATA_GAS: u64 = 8;
/// SHA3 base cost
pub const SHA3_GAS: u64 = 30;
/// SHA3 per-word cost
pub const SHA3_WORD_GAS: u64 = 6;
/// COPY per-word cost
pub const COPY_GAS: u64 = 3;
/// Linear memory cost per word
pub const MEMORY_GAS: u64 = 3;
/// Divisor of the quadratic memory term
pub const QUAD_COEFF_DIV: u64 = 512;
/// CREATE base cost
pub const CREATE_GAS: u64 = 32000;
/// Per-byte cost of persisting created code
pub const CREATE_DATA_GAS: u64 = 200;
/// Surcharge for transferring value with a call
pub const CALL_VALUE_TRANSFER_GAS: u64 = 9000;
/// Surcharge for calling into a fresh account
pub const CALL_NEW_ACCOUNT_GAS: u64 = 25000;
/// Gas handed to the callee for free when value is transferred
pub const CALL_STIPEND: u64 = 2300;

/// Maximum depth of the call/create stack
pub const CALL_CREATE_DEPTH: usize = 1024;
/// Maximum operand stack depth
pub const STACK_LIMIT: usize = 1024;
/// Maximum byte size of created contract code
pub const MAX_CODE_SIZE: usize = 24576;

/// ECRECOVER precompile cost
pub const ECRECOVER_GAS: u64 = 3000;
/// SHA256 precompile base cost
pub const SHA256_BASE_GAS: u64 = 60;
/// SHA256 precompile per-word cost
pub const SHA256_WORD_GAS: u64 = 12;
/// RIPEMD160 precompile base cost
pub const RIPEMD160_BASE_GAS: u64 = 600;
/// RIPEMD160 precompile per-word cost
pub const RIPEMD160_WORD_GAS: u64 = 120;
/// Identity precompile base cost
pub const IDENTITY_BASE_GAS: u64 = 15;
/// Identity precompile per-word cost
pub const IDENTITY_WORD_GAS: u64 = 3;

/// Words needed to hold `size` bytes
pub fn to_word_size(size: u64) -> u64 {
    if size > u64::MAX - 31 {
        return u64::MAX / 32 + 1;
    }
    (size + 31) / 32
}

/// Closed-form total cost of a memory of `size` bytes:
/// `3*w + w*w/512` with `w = ceil(size/32)`
fn memory_total_cost(size: u64) -> VmResult<u64> {
    let words = to_word_size(size);
    let linear = words.checked_mul(MEMORY_GAS).ok_or(VmError::GasUintOverflow)?;
    let quad = words
        .checked_mul(words)
        .ok_or(VmError::GasUintOverflow)?
        / QUAD_COEFF_DIV;
    linear.checked_add(quad).ok_or(VmError::GasUintOverflow)
}

/// Cost of expanding `memory` to `new_size` bytes; zero when no expansion
/// happens. The cost is the difference of the closed form at the new and
/// old high-water marks.
pub fn memory_gas_cost(memory: &Memory, new_size: u64) -> VmResult<u64> {
    if new_size == 0 {
        return Ok(0);
    }
    let old_size = memory.len() as u64;
    if new_size <= old_size {
        return Ok(0);
    }
    Ok(memory_total_cost(new_size)? - memory_total_cost(old_size)?)
}

fn copy_words_gas(len: U256) -> VmResult<u64> {
    if len.bits() > 64 {
        return Err(VmError::GasUintOverflow);
    }
    to_word_size(len.low_u64())
        .checked_mul(COPY_GAS)
        .ok_or(VmError::GasUintOverflow)
}

fn add(a: u64, b: u64) -> VmResult<u64> {
    a.checked_add(b).ok_or(VmError::GasUintOverflow)
}

// Constant-cost functions shared by the table entries.

pub(crate) fn gas_zero(
    _gt: &GasTable,
    _env: &TiltVm<'_>,
    _contract: &Contract,
    _stack: &Stack,
    _mem: &Memory,
    _memory_size: u64,
) -> VmResult<u64> {
    Ok(0)
}

pub(crate) fn gas_quick_step(
    _gt: &GasTable,
    _env: &TiltVm<'_>,
    _contract: &Contract,
    _stack: &Stack,
    _mem: &Memory,
    _memory_size: u64,
) -> VmResult<u64> {
    Ok(GAS_QUICK_STEP)
}

pub(crate) fn gas_fastest_step(
    _gt: &GasTable,
    _env: &TiltVm<'_>,
    _contract: &Contract,
    _stack: &Stack,
    _mem: &Memory,
    _memory_size: u64,
) -> VmResult<u64> {
    Ok(GAS_FASTEST_STEP)
}

pub(crate) fn gas_fast_step(
    _gt: &GasTable,
    _env: &TiltVm<'_>,
    _contract: &Contract,
    _stack: &Stack,
    _mem: &Memory,
    _memory_size: u64,
) -> VmResult<u64> {
    Ok(GAS_FAST_STEP)
}

pub(crate) fn gas_mid_step(
    _gt: &GasTable,
    _env: &TiltVm<'_>,
    _contract: &Contract,
    _stack: &Stack,
    _mem: &Memory,
    _memory_size: u64,
) -> VmResult<u64> {
    Ok(GAS_MID_STEP)
}

pub(crate) fn gas_slow_step(
    _gt: &GasTable,
    _env: &TiltVm<'_>,
    _contract: &Contract,
    _stack: &Stack,
    _mem: &Memory,
    _memory_size: u64,
) -> VmResult<u64> {
    Ok(GAS_SLOW_STEP)
}

pub(crate) fn gas_ext_step(
    _gt: &GasTable,
    _env: &TiltVm<'_>,
    _contract: &Contract,
    _stack: &Stack,
    _mem: &Memory,
    _memory_size: u64,
) -> VmResult<u64> {
    Ok(GAS_EXT_STEP)
}

pub(crate) fn gas_jumpdest(
    _gt: &GasTable,
    _env: &TiltVm<'_>,
    _contract: &Contract,
    _stack: &Stack,
    _mem: &Memory,
    _memory_size: u64,
) -> VmResult<u64> {
    Ok(JUMPDEST_GAS)
}

// Table-driven costs.

pub(crate) fn gas_balance(
    gt: &GasTable,
    _env: &TiltVm<'_>,
    _contract: &Contract,
    _stack: &Stack,
    _mem: &Memory,
    _memory_size: u64,
) -> VmResult<u64> {
    Ok(gt.balance)
}

pub(crate) fn gas_sload(
    gt: &GasTable,
    _env: &TiltVm<'_>,
    _contract: &Contract,
    _stack: &Stack,
    _mem: &Memory,
    _memory_size: u64,
) -> VmResult<u64> {
    Ok(gt.sload)
}

pub(crate) fn gas_ext_code_size(
    gt: &GasTable,
    _env: &TiltVm<'_>,
    _contract: &Contract,
    _stack: &Stack,
    _mem: &Memory,
    _memory_size: u64,
) -> VmResult<u64> {
    Ok(gt.ext_code_size)
}

// Dynamic costs.

pub(crate) fn gas_exp(
    gt: &GasTable,
    _env: &TiltVm<'_>,
    _contract: &Contract,
    stack: &Stack,
    _mem: &Memory,
    _memory_size: u64,
) -> VmResult<u64> {
    let exponent = stack.back(1)?;
    let byte_size = (exponent.bits() as u64 + 7) / 8;
    add(EXP_GAS, gt.exp_byte.checked_mul(byte_size).ok_or(VmError::GasUintOverflow)?)
}

pub(crate) fn gas_sha3(
    _gt: &GasTable,
    _env: &TiltVm<'_>,
    _contract: &Contract,
    stack: &Stack,
    mem: &Memory,
    memory_size: u64,
) -> VmResult<u64> {
    let len = stack.back(1)?;
    if len.bits() > 64 {
        return Err(VmError::GasUintOverflow);
    }
    let words = to_word_size(len.low_u64())
        .checked_mul(SHA3_WORD_GAS)
        .ok_or(VmError::GasUintOverflow)?;
    add(add(SHA3_GAS, words)?, memory_gas_cost(mem, memory_size)?)
}

pub(crate) fn gas_calldata_copy(
    _gt: &GasTable,
    _env: &TiltVm<'_>,
    _contract: &Contract,
    stack: &Stack,
    mem: &Memory,
    memory_size: u64,
) -> VmResult<u64> {
    let copy = copy_words_gas(stack.back(2)?)?;
    add(add(GAS_FASTEST_STEP, copy)?, memory_gas_cost(mem, memory_size)?)
}

pub(crate) fn gas_ext_code_copy(
    gt: &GasTable,
    _env: &TiltVm<'_>,
    _contract: &Contract,
    stack: &Stack,
    mem: &Memory,
    memory_size: u64,
) -> VmResult<u64> {
    let copy = copy_words_gas(stack.back(3)?)?;
    add(add(gt.ext_code_copy, copy)?, memory_gas_cost(mem, memory_size)?)
}

pub(crate) fn gas_mem_fastest(
    _gt: &GasTable,
    _env: &TiltVm<'_>,
    _contract: &Contract,
    _stack: &Stack,
    mem: &Memory,
    memory_size: u64,
) -> VmResult<u64> {
    add(GAS_FASTEST_STEP, memory_gas_cost(mem, memory_size)?)
}

pub(crate) fn gas_return(
    _gt: &GasTable,
    _env: &TiltVm<'_>,
    _contract: &Contract,
    _stack: &Stack,
    mem: &Memory,
    memory_size: u64,
) -> VmResult<u64> {
    memory_gas_cost(mem, memory_size)
}

pub(crate) fn gas_sstore(
    _gt: &GasTable,
    env: &TiltVm<'_>,
    contract: &Contract,
    stack: &Stack,
    _mem: &Memory,
    _memory_size: u64,
) -> VmResult<u64> {
    let slot = tilt_primitives::H256::from_word(stack.back(0)?);
    let new_value = stack.back(1)?;
    let current = env.state.get_state(&contract.address(), &slot);

    if current.is_zero() && !new_value.is_zero() {
        Ok(SSTORE_SET_GAS)
    } else if !current.is_zero() && new_value.is_zero() {
        Ok(SSTORE_CLEAR_GAS)
    } else {
        Ok(SSTORE_RESET_GAS)
    }
}

fn gas_log_n(topics: u64, stack: &Stack, mem: &Memory, memory_size: u64) -> VmResult<u64> {
    let len = stack.back(1)?;
    if len.bits() > 64 {
        return Err(VmError::GasUintOverflow);
    }
    let data = len
        .low_u64()
        .checked_mul(LOG_DATA_GAS)
        .ok_or(VmError::GasUintOverflow)?;
    let mut gas = add(LOG_GAS, topics * LOG_TOPIC_GAS)?;
    gas = add(gas, data)?;
    add(gas, memory_gas_cost(mem, memory_size)?)
}

pub(crate) fn gas_log0(
    _gt: &GasTable,
    _env: &TiltVm<'_>,
    _contract: &Contract,
    stack: &Stack,
    mem: &Memory,
    memory_size: u64,
) -> VmResult<u64> {
    gas_log_n(0, stack, mem, memory_size)
}

pub(crate) fn gas_log1(
    _gt: &GasTable,
    _env: &TiltVm<'_>,
    _contract: &Contract,
    stack: &Stack,
    mem: &Memory,
    memory_size: u64,
) -> VmResult<u64> {
    gas_log_n(1, stack, mem, memory_size)
}

pub(crate) fn gas_log2(
    _gt: &GasTable,
    _env: &TiltVm<'_>,
    _contract: &Contract,
    stack: &Stack,
    mem: &Memory,
    memory_size: u64,
) -> VmResult<u64> {
    gas_log_n(2, stack, mem, memory_size)
}

pub(crate) fn gas_log3(
    _gt: &GasTable,
    _env: &TiltVm<'_>,
    _contract: &Contract,
    stack: &Stack,
    mem: &Memory,
    memory_size: u64,
) -> VmResult<u64> {
    gas_log_n(3, stack, mem, memory_size)
}

pub(crate) fn gas_log4(
    _gt: &GasTable,
    _env: &TiltVm<'_>,
    _contract: &Contract,
    stack: &Stack,
    mem: &Memory,
    memory_size: u64,
) -> VmResult<u64> {
    gas_log_n(4, stack, mem, memory_size)
}

pub(crate) fn gas_create(
    _gt: &GasTable,
    _env: &TiltVm<'_>,
    _contract: &Contract,
    _stack: &Stack,
    mem: &Memory,
    memory_size: u64,
) -> VmResult<u64> {
    add(CREATE_GAS, memory_gas_cost(mem, memory_size)?)
}

fn requested_call_gas(requested: U256) -> VmResult<u64> {
    if requested.bits() > 64 {
        return Err(VmError::GasUintOverflow);
    }
    Ok(requested.low_u64())
}

pub(crate) fn gas_call(
    gt: &GasTable,
    env: &TiltVm<'_>,
    _contract: &Contract,
    stack: &Stack,
    mem: &Memory,
    memory_size: u64,
) -> VmResult<u64> {
    let mut gas = gt.calls;
    let address = Address::from_word(stack.back(1)?);
    let transfers_value = !stack.back(2)?.is_zero();

    if !env.state.exist(&address) {
        gas = add(gas, CALL_NEW_ACCOUNT_GAS)?;
    }
    if transfers_value {
        gas = add(gas, CALL_VALUE_TRANSFER_GAS)?;
    }
    gas = add(gas, memory_gas_cost(mem, memory_size)?)?;
    // The requested gas is charged up front and forwarded to the callee
    add(gas, requested_call_gas(stack.back(0)?)?)
}

pub(crate) fn gas_call_code(
    gt: &GasTable,
    _env: &TiltVm<'_>,
    _contract: &Contract,
    stack: &Stack,
    mem: &Memory,
    memory_size: u64,
) -> VmResult<u64> {
    let mut gas = gt.calls;
    if !stack.back(2)?.is_zero() {
        gas = add(gas, CALL_VALUE_TRANSFER_GAS)?;
    }
    gas = add(gas, memory_gas_cost(mem, memory_size)?)?;
    add(gas, requested_call_gas(stack.back(0)?)?)
}

pub(crate) fn gas_delegate_call(
    gt: &GasTable,
    _env: &TiltVm<'_>,
    _contract: &Contract,
    stack: &Stack,
    mem: &Memory,
    memory_size: u64,
) -> VmResult<u64> {
    let gas = add(gt.calls, memory_gas_cost(mem, memory_size)?)?;
    add(gas, requested_call_gas(stack.back(0)?)?)
}

pub(crate) fn gas_suicide(
    gt: &GasTable,
    env: &TiltVm<'_>,
    _contract: &Contract,
    stack: &Stack,
    _mem: &Memory,
    _memory_size: u64,
) -> VmResult<u64> {
    let mut gas = gt.suicide;
    if let Some(create_by_suicide) = gt.create_by_suicide {
        let beneficiary = Address::from_word(stack.back(0)?);
        if !env.state.exist(&beneficiary) {
            gas = add(gas, create_by_suicide)?;
        }
    }
    Ok(gas)
}
