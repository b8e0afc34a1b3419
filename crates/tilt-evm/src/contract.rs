//! Contract call frame

use crate::opcode::Opcode;
use tilt_primitives::{Address, H256, U256};

/// An execution frame: immutable code, input, caller, value and the gas
/// counter that pays for the frame's instructions.
#[derive(Clone, Debug)]
pub struct Contract {
    /// Address whose context produced this frame
    caller_address: Address,
    /// Address executing (storage/self context)
    self_address: Address,

    /// Code being executed
    pub code: Vec<u8>,
    /// Hash of the code, keying the jumpdest analysis
    pub code_hash: H256,
    /// Address the code was loaded from; None for raw CREATE init code
    pub code_addr: Option<Address>,
    /// Call input bytes
    pub input: Vec<u8>,

    /// Remaining gas
    pub gas: u64,
    /// Value passed along with the call
    pub value: U256,

    delegate_call: bool,
    delegate_caller: Address,
    delegate_value: U256,
}

impl Contract {
    /// Build a frame for `self_address` running with `caller`'s authority
    pub fn new(caller: Address, self_address: Address, value: U256, gas: u64) -> Self {
        Self {
            caller_address: caller,
            self_address,
            code: Vec::new(),
            code_hash: H256::ZERO,
            code_addr: None,
            input: Vec::new(),
            gas,
            value,
            delegate_call: false,
            delegate_caller: caller,
            delegate_value: value,
        }
    }

    /// Mark the frame as a delegate: CALLER and CALLVALUE report the
    /// parent frame's caller and value while foreign code runs in our
    /// storage context
    pub fn as_delegate(mut self, parent_caller: Address, parent_value: U256) -> Self {
        self.delegate_call = true;
        self.delegate_caller = parent_caller;
        self.delegate_value = parent_value;
        self
    }

    /// Install the code to execute and remember where it came from
    pub fn set_call_code(&mut self, addr: Option<Address>, hash: H256, code: Vec<u8>) {
        self.code = code;
        self.code_hash = hash;
        self.code_addr = addr;
    }

    /// Caller visible to the running code
    pub fn caller(&self) -> Address {
        if self.delegate_call {
            self.delegate_caller
        } else {
            self.caller_address
        }
    }

    /// Value visible to the running code
    pub fn call_value(&self) -> U256 {
        if self.delegate_call {
            self.delegate_value
        } else {
            self.value
        }
    }

    /// The executing (storage) address
    pub fn address(&self) -> Address {
        self.self_address
    }

    /// Deduct `amount` if enough gas remains; returns whether the charge
    /// succeeded, leaving the counter untouched on failure
    pub fn use_gas(&mut self, amount: u64) -> bool {
        if self.gas < amount {
            return false;
        }
        self.gas -= amount;
        true
    }

    /// Opcode at `pc`; out-of-range reads act as STOP
    pub fn get_op(&self, pc: u64) -> u8 {
        self.get_byte(pc)
    }

    /// Raw code byte at `pc`, zero past the end
    pub fn get_byte(&self, pc: u64) -> u8 {
        if (pc as usize) < self.code.len() {
            self.code[pc as usize]
        } else {
            Opcode::STOP as u8
        }
    }
}
