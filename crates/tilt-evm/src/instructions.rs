//! Per-opcode execution functions referenced by the jump table

use crate::contract::Contract;
use crate::error::{VmError, VmResult};
use crate::evm::TiltVm;
use crate::gas::CALL_STIPEND;
use crate::memory::Memory;
use crate::opcode::Opcode;
use crate::stack::Stack;
use tilt_crypto::keccak256;
use tilt_primitives::{uint, Address, H256, U256};
use tilt_state::Log;

/// Execution outcome: `Some(bytes)` only for the halting RETURN
pub(crate) type ExecResult = VmResult<Option<Vec<u8>>>;

/// Slice `size` bytes of `data` starting at `offset`, right-padded with
/// zeros; overflow safe
fn get_data(data: &[u8], offset: U256, size: u64) -> Vec<u8> {
    let len = data.len() as u64;
    let start = if offset > U256::from(len) {
        len
    } else {
        offset.low_u64()
    };
    let end = start.saturating_add(size).min(len);
    let mut out = data[start as usize..end as usize].to_vec();
    out.resize(size as usize, 0);
    out
}

fn bool_word(value: bool) -> U256 {
    if value {
        U256::one()
    } else {
        U256::zero()
    }
}

pub(crate) fn op_invalid(
    op: Opcode,
    _pc: &mut u64,
    _env: &mut TiltVm<'_>,
    _contract: &mut Contract,
    _memory: &mut Memory,
    _stack: &mut Stack,
) -> ExecResult {
    Err(VmError::InvalidOpcode(op as u8))
}

pub(crate) fn op_stop(
    _op: Opcode,
    _pc: &mut u64,
    _env: &mut TiltVm<'_>,
    _contract: &mut Contract,
    _memory: &mut Memory,
    _stack: &mut Stack,
) -> ExecResult {
    Ok(None)
}

pub(crate) fn op_add(
    _op: Opcode,
    _pc: &mut u64,
    _env: &mut TiltVm<'_>,
    _contract: &mut Contract,
    _memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    let (x, y) = (stack.pop()?, stack.pop()?);
    stack.push(uint::add(x, y))?;
    Ok(None)
}

pub(crate) fn op_sub(
    _op: Opcode,
    _pc: &mut u64,
    _env: &mut TiltVm<'_>,
    _contract: &mut Contract,
    _memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    let (x, y) = (stack.pop()?, stack.pop()?);
    stack.push(uint::sub(x, y))?;
    Ok(None)
}

pub(crate) fn op_mul(
    _op: Opcode,
    _pc: &mut u64,
    _env: &mut TiltVm<'_>,
    _contract: &mut Contract,
    _memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    let (x, y) = (stack.pop()?, stack.pop()?);
    stack.push(uint::mul(x, y))?;
    Ok(None)
}

pub(crate) fn op_div(
    _op: Opcode,
    _pc: &mut u64,
    _env: &mut TiltVm<'_>,
    _contract: &mut Contract,
    _memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    let (x, y) = (stack.pop()?, stack.pop()?);
    stack.push(uint::div(x, y))?;
    Ok(None)
}

pub(crate) fn op_sdiv(
    _op: Opcode,
    _pc: &mut u64,
    _env: &mut TiltVm<'_>,
    _contract: &mut Contract,
    _memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    let (x, y) = (stack.pop()?, stack.pop()?);
    stack.push(uint::sdiv(x, y))?;
    Ok(None)
}

pub(crate) fn op_mod(
    _op: Opcode,
    _pc: &mut u64,
    _env: &mut TiltVm<'_>,
    _contract: &mut Contract,
    _memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    let (x, y) = (stack.pop()?, stack.pop()?);
    stack.push(uint::rem(x, y))?;
    Ok(None)
}

pub(crate) fn op_smod(
    _op: Opcode,
    _pc: &mut u64,
    _env: &mut TiltVm<'_>,
    _contract: &mut Contract,
    _memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    let (x, y) = (stack.pop()?, stack.pop()?);
    stack.push(uint::srem(x, y))?;
    Ok(None)
}

pub(crate) fn op_addmod(
    _op: Opcode,
    _pc: &mut u64,
    _env: &mut TiltVm<'_>,
    _contract: &mut Contract,
    _memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    let (x, y, z) = (stack.pop()?, stack.pop()?, stack.pop()?);
    stack.push(uint::addmod(x, y, z))?;
    Ok(None)
}

pub(crate) fn op_mulmod(
    _op: Opcode,
    _pc: &mut u64,
    _env: &mut TiltVm<'_>,
    _contract: &mut Contract,
    _memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    let (x, y, z) = (stack.pop()?, stack.pop()?, stack.pop()?);
    stack.push(uint::mulmod(x, y, z))?;
    Ok(None)
}

pub(crate) fn op_exp(
    _op: Opcode,
    _pc: &mut u64,
    _env: &mut TiltVm<'_>,
    _contract: &mut Contract,
    _memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    let (base, exponent) = (stack.pop()?, stack.pop()?);
    stack.push(uint::exp(base, exponent))?;
    Ok(None)
}

pub(crate) fn op_signextend(
    _op: Opcode,
    _pc: &mut u64,
    _env: &mut TiltVm<'_>,
    _contract: &mut Contract,
    _memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    let (back, num) = (stack.pop()?, stack.pop()?);
    stack.push(uint::signextend(back, num))?;
    Ok(None)
}

pub(crate) fn op_lt(
    _op: Opcode,
    _pc: &mut u64,
    _env: &mut TiltVm<'_>,
    _contract: &mut Contract,
    _memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    let (x, y) = (stack.pop()?, stack.pop()?);
    stack.push(bool_word(x < y))?;
    Ok(None)
}

pub(crate) fn op_gt(
    _op: Opcode,
    _pc: &mut u64,
    _env: &mut TiltVm<'_>,
    _contract: &mut Contract,
    _memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    let (x, y) = (stack.pop()?, stack.pop()?);
    stack.push(bool_word(x > y))?;
    Ok(None)
}

pub(crate) fn op_slt(
    _op: Opcode,
    _pc: &mut u64,
    _env: &mut TiltVm<'_>,
    _contract: &mut Contract,
    _memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    let (x, y) = (stack.pop()?, stack.pop()?);
    stack.push(bool_word(uint::slt(x, y)))?;
    Ok(None)
}

pub(crate) fn op_sgt(
    _op: Opcode,
    _pc: &mut u64,
    _env: &mut TiltVm<'_>,
    _contract: &mut Contract,
    _memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    let (x, y) = (stack.pop()?, stack.pop()?);
    stack.push(bool_word(uint::sgt(x, y)))?;
    Ok(None)
}

pub(crate) fn op_eq(
    _op: Opcode,
    _pc: &mut u64,
    _env: &mut TiltVm<'_>,
    _contract: &mut Contract,
    _memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    let (x, y) = (stack.pop()?, stack.pop()?);
    stack.push(bool_word(x == y))?;
    Ok(None)
}

pub(crate) fn op_iszero(
    _op: Opcode,
    _pc: &mut u64,
    _env: &mut TiltVm<'_>,
    _contract: &mut Contract,
    _memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    let x = stack.pop()?;
    stack.push(bool_word(x.is_zero()))?;
    Ok(None)
}

pub(crate) fn op_and(
    _op: Opcode,
    _pc: &mut u64,
    _env: &mut TiltVm<'_>,
    _contract: &mut Contract,
    _memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    let (x, y) = (stack.pop()?, stack.pop()?);
    stack.push(x & y)?;
    Ok(None)
}

pub(crate) fn op_or(
    _op: Opcode,
    _pc: &mut u64,
    _env: &mut TiltVm<'_>,
    _contract: &mut Contract,
    _memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    let (x, y) = (stack.pop()?, stack.pop()?);
    stack.push(x | y)?;
    Ok(None)
}

pub(crate) fn op_xor(
    _op: Opcode,
    _pc: &mut u64,
    _env: &mut TiltVm<'_>,
    _contract: &mut Contract,
    _memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    let (x, y) = (stack.pop()?, stack.pop()?);
    stack.push(x ^ y)?;
    Ok(None)
}

pub(crate) fn op_not(
    _op: Opcode,
    _pc: &mut u64,
    _env: &mut TiltVm<'_>,
    _contract: &mut Contract,
    _memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    let x = stack.pop()?;
    stack.push(!x)?;
    Ok(None)
}

pub(crate) fn op_byte(
    _op: Opcode,
    _pc: &mut u64,
    _env: &mut TiltVm<'_>,
    _contract: &mut Contract,
    _memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    let (th, val) = (stack.pop()?, stack.pop()?);
    stack.push(uint::byte(th, val))?;
    Ok(None)
}

pub(crate) fn op_sha3(
    _op: Opcode,
    _pc: &mut u64,
    env: &mut TiltVm<'_>,
    _contract: &mut Contract,
    memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    let (offset, size) = (stack.pop()?, stack.pop()?);
    let data = memory.get(offset.low_u64(), size.low_u64());
    let hash = keccak256(&data);

    if env.vm_config.enable_preimage_recording {
        env.state.add_preimage(hash, data);
    }

    stack.push(hash.to_word())?;
    Ok(None)
}

pub(crate) fn op_address(
    _op: Opcode,
    _pc: &mut u64,
    _env: &mut TiltVm<'_>,
    contract: &mut Contract,
    _memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    stack.push(contract.address().to_word())?;
    Ok(None)
}

pub(crate) fn op_balance(
    _op: Opcode,
    _pc: &mut u64,
    env: &mut TiltVm<'_>,
    _contract: &mut Contract,
    _memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    let addr = Address::from_word(stack.pop()?);
    stack.push(env.state.get_balance(&addr))?;
    Ok(None)
}

pub(crate) fn op_origin(
    _op: Opcode,
    _pc: &mut u64,
    env: &mut TiltVm<'_>,
    _contract: &mut Contract,
    _memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    stack.push(env.context.origin.to_word())?;
    Ok(None)
}

pub(crate) fn op_caller(
    _op: Opcode,
    _pc: &mut u64,
    _env: &mut TiltVm<'_>,
    contract: &mut Contract,
    _memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    stack.push(contract.caller().to_word())?;
    Ok(None)
}

pub(crate) fn op_call_value(
    _op: Opcode,
    _pc: &mut u64,
    _env: &mut TiltVm<'_>,
    contract: &mut Contract,
    _memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    stack.push(contract.call_value())?;
    Ok(None)
}

pub(crate) fn op_calldata_load(
    _op: Opcode,
    _pc: &mut u64,
    _env: &mut TiltVm<'_>,
    contract: &mut Contract,
    _memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    let offset = stack.pop()?;
    let word = get_data(&contract.input, offset, 32);
    stack.push(U256::from_big_endian(&word))?;
    Ok(None)
}

pub(crate) fn op_calldata_size(
    _op: Opcode,
    _pc: &mut u64,
    _env: &mut TiltVm<'_>,
    contract: &mut Contract,
    _memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    stack.push(U256::from(contract.input.len() as u64))?;
    Ok(None)
}

pub(crate) fn op_calldata_copy(
    _op: Opcode,
    _pc: &mut u64,
    _env: &mut TiltVm<'_>,
    contract: &mut Contract,
    memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    let (mem_off, data_off, len) = (stack.pop()?, stack.pop()?, stack.pop()?);
    let data = get_data(&contract.input, data_off, len.low_u64());
    memory.set(mem_off.low_u64(), &data);
    Ok(None)
}

pub(crate) fn op_code_size(
    _op: Opcode,
    _pc: &mut u64,
    _env: &mut TiltVm<'_>,
    contract: &mut Contract,
    _memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    stack.push(U256::from(contract.code.len() as u64))?;
    Ok(None)
}

pub(crate) fn op_code_copy(
    _op: Opcode,
    _pc: &mut u64,
    _env: &mut TiltVm<'_>,
    contract: &mut Contract,
    memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    let (mem_off, code_off, len) = (stack.pop()?, stack.pop()?, stack.pop()?);
    let data = get_data(&contract.code, code_off, len.low_u64());
    memory.set(mem_off.low_u64(), &data);
    Ok(None)
}

pub(crate) fn op_ext_code_size(
    _op: Opcode,
    _pc: &mut u64,
    env: &mut TiltVm<'_>,
    _contract: &mut Contract,
    _memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    let addr = Address::from_word(stack.pop()?);
    stack.push(U256::from(env.state.get_code_size(&addr) as u64))?;
    Ok(None)
}

pub(crate) fn op_ext_code_copy(
    _op: Opcode,
    _pc: &mut u64,
    env: &mut TiltVm<'_>,
    _contract: &mut Contract,
    memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    let addr = Address::from_word(stack.pop()?);
    let (mem_off, code_off, len) = (stack.pop()?, stack.pop()?, stack.pop()?);
    let code = env.state.get_code(&addr);
    let data = get_data(&code, code_off, len.low_u64());
    memory.set(mem_off.low_u64(), &data);
    Ok(None)
}

pub(crate) fn op_gas_price(
    _op: Opcode,
    _pc: &mut u64,
    env: &mut TiltVm<'_>,
    _contract: &mut Contract,
    _memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    stack.push(env.context.gas_price)?;
    Ok(None)
}

pub(crate) fn op_blockhash(
    _op: Opcode,
    _pc: &mut u64,
    env: &mut TiltVm<'_>,
    _contract: &mut Contract,
    _memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    let num = stack.pop()?;
    let block_number = env.context.block_number;

    // Only the 256 most recent ancestors are visible
    let in_window = num < U256::from(block_number)
        && (block_number < 257 || num > U256::from(block_number - 257));
    if in_window {
        let hash = (env.context.get_hash)(num.low_u64());
        stack.push(hash.to_word())?;
    } else {
        stack.push(U256::zero())?;
    }
    Ok(None)
}

pub(crate) fn op_coinbase(
    _op: Opcode,
    _pc: &mut u64,
    env: &mut TiltVm<'_>,
    _contract: &mut Contract,
    _memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    stack.push(env.context.coinbase.to_word())?;
    Ok(None)
}

pub(crate) fn op_timestamp(
    _op: Opcode,
    _pc: &mut u64,
    env: &mut TiltVm<'_>,
    _contract: &mut Contract,
    _memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    stack.push(U256::from(env.context.time))?;
    Ok(None)
}

pub(crate) fn op_number(
    _op: Opcode,
    _pc: &mut u64,
    env: &mut TiltVm<'_>,
    _contract: &mut Contract,
    _memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    stack.push(U256::from(env.context.block_number))?;
    Ok(None)
}

pub(crate) fn op_difficulty(
    _op: Opcode,
    _pc: &mut u64,
    env: &mut TiltVm<'_>,
    _contract: &mut Contract,
    _memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    stack.push(env.context.difficulty)?;
    Ok(None)
}

pub(crate) fn op_gas_limit(
    _op: Opcode,
    _pc: &mut u64,
    env: &mut TiltVm<'_>,
    _contract: &mut Contract,
    _memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    stack.push(U256::from(env.context.gas_limit))?;
    Ok(None)
}

pub(crate) fn op_pop(
    _op: Opcode,
    _pc: &mut u64,
    _env: &mut TiltVm<'_>,
    _contract: &mut Contract,
    _memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    stack.pop()?;
    Ok(None)
}

pub(crate) fn op_mload(
    _op: Opcode,
    _pc: &mut u64,
    _env: &mut TiltVm<'_>,
    _contract: &mut Contract,
    memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    let offset = stack.pop()?;
    let word = memory.get(offset.low_u64(), 32);
    stack.push(U256::from_big_endian(&word))?;
    Ok(None)
}

pub(crate) fn op_mstore(
    _op: Opcode,
    _pc: &mut u64,
    _env: &mut TiltVm<'_>,
    _contract: &mut Contract,
    memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    let (offset, value) = (stack.pop()?, stack.pop()?);
    memory.set_word(offset.low_u64(), value);
    Ok(None)
}

pub(crate) fn op_mstore8(
    _op: Opcode,
    _pc: &mut u64,
    _env: &mut TiltVm<'_>,
    _contract: &mut Contract,
    memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    let (offset, value) = (stack.pop()?, stack.pop()?);
    memory.set_byte(offset.low_u64(), (value.low_u64() & 0xFF) as u8);
    Ok(None)
}

pub(crate) fn op_sload(
    _op: Opcode,
    _pc: &mut u64,
    env: &mut TiltVm<'_>,
    contract: &mut Contract,
    _memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    let slot = H256::from_word(stack.pop()?);
    let value = env.state.get_state(&contract.address(), &slot);
    stack.push(value.to_word())?;
    Ok(None)
}

pub(crate) fn op_sstore(
    _op: Opcode,
    _pc: &mut u64,
    env: &mut TiltVm<'_>,
    contract: &mut Contract,
    _memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    let slot = H256::from_word(stack.pop()?);
    let value = stack.pop()?;
    env.state
        .set_state(contract.address(), slot, H256::from_word(value));
    Ok(None)
}

pub(crate) fn op_jump(
    _op: Opcode,
    pc: &mut u64,
    env: &mut TiltVm<'_>,
    contract: &mut Contract,
    _memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    let pos = stack.pop()?;
    if !env.jumpdests.has(contract.code_hash, &contract.code, pos) {
        return Err(VmError::InvalidJump(pos.low_u64()));
    }
    *pc = pos.low_u64();
    Ok(None)
}

pub(crate) fn op_jumpi(
    _op: Opcode,
    pc: &mut u64,
    env: &mut TiltVm<'_>,
    contract: &mut Contract,
    _memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    let (pos, cond) = (stack.pop()?, stack.pop()?);
    if !cond.is_zero() {
        if !env.jumpdests.has(contract.code_hash, &contract.code, pos) {
            return Err(VmError::InvalidJump(pos.low_u64()));
        }
        *pc = pos.low_u64();
    } else {
        *pc += 1;
    }
    Ok(None)
}

pub(crate) fn op_jumpdest(
    _op: Opcode,
    _pc: &mut u64,
    _env: &mut TiltVm<'_>,
    _contract: &mut Contract,
    _memory: &mut Memory,
    _stack: &mut Stack,
) -> ExecResult {
    Ok(None)
}

pub(crate) fn op_pc(
    _op: Opcode,
    pc: &mut u64,
    _env: &mut TiltVm<'_>,
    _contract: &mut Contract,
    _memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    stack.push(U256::from(*pc))?;
    Ok(None)
}

pub(crate) fn op_msize(
    _op: Opcode,
    _pc: &mut u64,
    _env: &mut TiltVm<'_>,
    _contract: &mut Contract,
    memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    stack.push(U256::from(memory.len() as u64))?;
    Ok(None)
}

pub(crate) fn op_gas(
    _op: Opcode,
    _pc: &mut u64,
    _env: &mut TiltVm<'_>,
    contract: &mut Contract,
    _memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    stack.push(U256::from(contract.gas))?;
    Ok(None)
}

pub(crate) fn op_push(
    op: Opcode,
    pc: &mut u64,
    _env: &mut TiltVm<'_>,
    contract: &mut Contract,
    _memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    let size = op.push_size() as u64;
    let bytes = get_data(&contract.code, U256::from(*pc + 1), size);
    stack.push(U256::from_big_endian(&bytes))?;
    *pc += size;
    Ok(None)
}

pub(crate) fn op_dup(
    op: Opcode,
    _pc: &mut u64,
    _env: &mut TiltVm<'_>,
    _contract: &mut Contract,
    _memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    stack.dup(op.dup_depth())?;
    Ok(None)
}

pub(crate) fn op_swap(
    op: Opcode,
    _pc: &mut u64,
    _env: &mut TiltVm<'_>,
    _contract: &mut Contract,
    _memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    stack.swap(op.swap_depth())?;
    Ok(None)
}

pub(crate) fn op_log(
    op: Opcode,
    _pc: &mut u64,
    env: &mut TiltVm<'_>,
    contract: &mut Contract,
    memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    let (mem_off, mem_len) = (stack.pop()?, stack.pop()?);
    let mut topics = Vec::with_capacity(op.log_topics());
    for _ in 0..op.log_topics() {
        topics.push(H256::from_word(stack.pop()?));
    }
    let data = memory.get(mem_off.low_u64(), mem_len.low_u64());
    env.state.add_log(Log {
        address: contract.address(),
        topics,
        data,
        block_number: env.context.block_number,
    });
    Ok(None)
}

pub(crate) fn op_create(
    _op: Opcode,
    _pc: &mut u64,
    env: &mut TiltVm<'_>,
    contract: &mut Contract,
    memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    let (value, offset, size) = (stack.pop()?, stack.pop()?, stack.pop()?);
    let input = memory.get(offset.low_u64(), size.low_u64());

    // All but one 64th of the remaining gas goes to the init code
    let mut gas = contract.gas;
    gas -= gas / 64;
    contract.use_gas(gas);

    let result = env.create(contract.address(), &input, gas, value);
    match result.err {
        None => stack.push(result.address.to_word())?,
        // Every failure pushes zero, code-store-out-of-gas included; the
        // account it could not pay for still exists in the state
        Some(_) => stack.push(U256::zero())?,
    }
    contract.gas += result.gas_left;
    Ok(None)
}

pub(crate) fn op_call(
    _op: Opcode,
    _pc: &mut u64,
    env: &mut TiltVm<'_>,
    contract: &mut Contract,
    memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    let mut gas = stack.pop()?.low_u64();
    let (addr, value) = (stack.pop()?, stack.pop()?);
    let (in_off, in_size) = (stack.pop()?, stack.pop()?);
    let (ret_off, ret_size) = (stack.pop()?, stack.pop()?);

    let address = Address::from_word(addr);
    let args = memory.get(in_off.low_u64(), in_size.low_u64());

    if !value.is_zero() {
        gas += CALL_STIPEND;
    }

    let result = env.call(contract.address(), address, &args, gas, value);
    if result.err.is_some() {
        stack.push(U256::zero())?;
    } else {
        stack.push(U256::one())?;
        let n = result.ret.len().min(ret_size.low_u64() as usize);
        memory.set(ret_off.low_u64(), &result.ret[..n]);
    }
    contract.gas += result.gas_left;
    Ok(None)
}

pub(crate) fn op_call_code(
    _op: Opcode,
    _pc: &mut u64,
    env: &mut TiltVm<'_>,
    contract: &mut Contract,
    memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    let mut gas = stack.pop()?.low_u64();
    let (addr, value) = (stack.pop()?, stack.pop()?);
    let (in_off, in_size) = (stack.pop()?, stack.pop()?);
    let (ret_off, ret_size) = (stack.pop()?, stack.pop()?);

    let address = Address::from_word(addr);
    let args = memory.get(in_off.low_u64(), in_size.low_u64());

    if !value.is_zero() {
        gas += CALL_STIPEND;
    }

    let result = env.call_code(contract.address(), address, &args, gas, value);
    if result.err.is_some() {
        stack.push(U256::zero())?;
    } else {
        stack.push(U256::one())?;
        let n = result.ret.len().min(ret_size.low_u64() as usize);
        memory.set(ret_off.low_u64(), &result.ret[..n]);
    }
    contract.gas += result.gas_left;
    Ok(None)
}

pub(crate) fn op_delegate_call(
    _op: Opcode,
    _pc: &mut u64,
    env: &mut TiltVm<'_>,
    contract: &mut Contract,
    memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    let gas = stack.pop()?.low_u64();
    let addr = stack.pop()?;
    let (in_off, in_size) = (stack.pop()?, stack.pop()?);
    let (out_off, out_size) = (stack.pop()?, stack.pop()?);

    let address = Address::from_word(addr);
    let args = memory.get(in_off.low_u64(), in_size.low_u64());

    let result = env.delegate_call(contract, address, &args, gas);
    if result.err.is_some() {
        stack.push(U256::zero())?;
    } else {
        stack.push(U256::one())?;
        let n = result.ret.len().min(out_size.low_u64() as usize);
        memory.set(out_off.low_u64(), &result.ret[..n]);
    }
    contract.gas += result.gas_left;
    Ok(None)
}

pub(crate) fn op_return(
    _op: Opcode,
    _pc: &mut u64,
    _env: &mut TiltVm<'_>,
    _contract: &mut Contract,
    memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    let (offset, size) = (stack.pop()?, stack.pop()?);
    let ret = memory.get_ptr(offset.low_u64(), size.low_u64()).to_vec();
    Ok(Some(ret))
}

pub(crate) fn op_suicide(
    _op: Opcode,
    _pc: &mut u64,
    env: &mut TiltVm<'_>,
    contract: &mut Contract,
    _memory: &mut Memory,
    stack: &mut Stack,
) -> ExecResult {
    let beneficiary = Address::from_word(stack.pop()?);
    let balance = env.state.get_balance(&contract.address());
    env.state.add_balance(beneficiary, balance);
    env.state.suicide(&contract.address());
    Ok(None)
}
