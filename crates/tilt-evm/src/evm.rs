//! The virtual machine environment: call and create entry points with
//! snapshot/rollback semantics, depth limiting and balance transfer.

use crate::analysis::Destinations;
use crate::contract::Contract;
use crate::error::VmError;
use crate::gas::{CALL_CREATE_DEPTH, CREATE_DATA_GAS, MAX_CODE_SIZE};
use crate::opcode::Opcode;
use crate::precompiles::precompiled;
use crate::table::JumpTable;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tilt_crypto::keccak256;
use tilt_primitives::{Address, H256, U256};
use tilt_state::StateDb;
use tilt_types::{ChainConfig, GasTable};

/// Returns the hash of the `n`th block, for BLOCKHASH
pub type GetHashFn = Box<dyn Fn(u64) -> H256>;

/// Auxiliary blockchain information the opcodes read. Once provided it is
/// not modified.
pub struct Context {
    /// Transaction origin, for ORIGIN
    pub origin: Address,
    /// Transaction gas price, for GASPRICE
    pub gas_price: U256,
    /// Block beneficiary, for COINBASE
    pub coinbase: Address,
    /// Block gas limit, for GASLIMIT
    pub gas_limit: u64,
    /// Block number, for NUMBER and the BLOCKHASH window
    pub block_number: u64,
    /// Block timestamp, for TIMESTAMP
    pub time: u64,
    /// Block difficulty, for DIFFICULTY
    pub difficulty: U256,
    /// Block hash lookup, for BLOCKHASH
    pub get_hash: GetHashFn,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            origin: Address::ZERO,
            gas_price: U256::zero(),
            coinbase: Address::ZERO,
            gas_limit: 0,
            block_number: 0,
            time: 0,
            difficulty: U256::zero(),
            get_hash: Box::new(|_| H256::ZERO),
        }
    }
}

/// Hook capturing per-instruction state before execution
pub trait Tracer {
    /// Called once per instruction with the pre-execution view
    fn capture_state(&mut self, pc: u64, op: Opcode, gas: u64, cost: u64, depth: usize);
}

/// Configuration options for the interpreter
#[derive(Default)]
pub struct VmConfig {
    /// Enable the tracer hook
    pub debug: bool,
    /// Per-instruction tracer, active when `debug` is set
    pub tracer: Option<Box<dyn Tracer>>,
    /// Turn nested call, callcode, delegatecall and create into no-ops
    pub no_recursion: bool,
    /// Skip all gas charging
    pub disable_gas_metering: bool,
    /// Record SHA3 preimages into the state
    pub enable_preimage_recording: bool,
}

/// Outcome of a call-family entry point. `gas_left` is meaningful in both
/// the success and the failure case: guard failures leave the full gas
/// with the caller while execution failures consume the frame.
#[derive(Debug)]
pub struct CallResult {
    /// Bytes returned by the callee
    pub ret: Vec<u8>,
    /// Gas remaining to refund into the calling frame
    pub gas_left: u64,
    /// Error, if the frame failed
    pub err: Option<VmError>,
}

/// Outcome of a contract creation
#[derive(Debug)]
pub struct CreateResult {
    /// Deployed code bytes (cleared on failure)
    pub ret: Vec<u8>,
    /// The deterministic new-contract address
    pub address: Address,
    /// Gas remaining to refund into the calling frame
    pub gas_left: u64,
    /// Error, if creation failed
    pub err: Option<VmError>,
}

/// The virtual machine. A single instance drives one transaction; nested
/// calls re-enter the same interpreter with a shared depth counter. Not
/// thread safe, but [`TiltVm::cancel_handle`] may be triggered from
/// another thread to abort cooperatively.
pub struct TiltVm<'a> {
    /// Blockchain context for the environment opcodes
    pub context: Context,
    /// The state every mutation flows through
    pub state: &'a mut dyn StateDb,

    pub(crate) chain_config: ChainConfig,
    pub(crate) vm_config: VmConfig,
    pub(crate) gas_table: GasTable,
    pub(crate) table: JumpTable,
    pub(crate) jumpdests: Destinations,
    pub(crate) depth: usize,
    pub(crate) abort: Arc<AtomicBool>,
}

impl<'a> TiltVm<'a> {
    /// Build a VM over `state` for one transaction
    pub fn new(
        context: Context,
        state: &'a mut dyn StateDb,
        chain_config: ChainConfig,
        vm_config: VmConfig,
    ) -> Self {
        let gas_table = chain_config.gas_table(context.block_number);
        Self {
            context,
            state,
            chain_config,
            vm_config,
            gas_table,
            table: JumpTable::new(),
            jumpdests: Destinations::new(),
            depth: 0,
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Abort any running operation at the next instruction boundary. Safe
    /// to call multiple times.
    pub fn cancel(&self) {
        self.abort.store(true, Ordering::Release);
    }

    /// Shareable handle for cancelling from another thread
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.abort.clone()
    }

    /// The chain configuration in force
    pub fn chain_config(&self) -> &ChainConfig {
        &self.chain_config
    }

    /// Current call depth
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub(crate) fn can_transfer(&self, from: &Address, value: U256) -> bool {
        self.state.get_balance(from) >= value
    }

    pub(crate) fn transfer(&mut self, from: Address, to: Address, value: U256) {
        self.state.sub_balance(from, value);
        self.state.add_balance(to, value);
    }

    /// Execute the contract at `addr` with the given input, transferring
    /// `value` from `caller`. Creates the target account when absent and
    /// funded; reverts all state changes and consumes the frame's gas on
    /// execution error.
    pub fn call(
        &mut self,
        caller: Address,
        addr: Address,
        input: &[u8],
        gas: u64,
        value: U256,
    ) -> CallResult {
        if self.vm_config.no_recursion && self.depth > 0 {
            return CallResult {
                ret: Vec::new(),
                gas_left: gas,
                err: None,
            };
        }
        if self.depth > CALL_CREATE_DEPTH {
            return CallResult {
                ret: Vec::new(),
                gas_left: gas,
                err: Some(VmError::CallDepthExceeded),
            };
        }
        if !self.can_transfer(&caller, value) {
            return CallResult {
                ret: Vec::new(),
                gas_left: gas,
                err: Some(VmError::InsufficientBalance),
            };
        }

        let snapshot = self.state.snapshot();
        if !self.state.exist(&addr) {
            if precompiled(&addr).is_none() && value.is_zero() {
                // Calling an absent, unfunded, non-precompiled account is
                // a plain no-op
                return CallResult {
                    ret: Vec::new(),
                    gas_left: gas,
                    err: None,
                };
            }
            self.state.create_account(addr);
        }
        self.transfer(caller, addr, value);

        let mut contract = Contract::new(caller, addr, value, gas);
        let code_hash = self.state.get_code_hash(&addr);
        let code = self.state.get_code(&addr);
        contract.set_call_code(Some(addr), code_hash, code);

        match self.run(&mut contract, input) {
            Ok(ret) => CallResult {
                ret: ret.unwrap_or_default(),
                gas_left: contract.gas,
                err: None,
            },
            Err(err) => {
                contract.use_gas(contract.gas);
                self.state.revert_to_snapshot(snapshot);
                CallResult {
                    ret: Vec::new(),
                    gas_left: 0,
                    err: Some(err),
                }
            }
        }
    }

    /// Like [`TiltVm::call`], but executes `addr`'s code in the caller's
    /// own storage context. Does not create accounts.
    pub fn call_code(
        &mut self,
        caller: Address,
        addr: Address,
        input: &[u8],
        gas: u64,
        value: U256,
    ) -> CallResult {
        if self.vm_config.no_recursion && self.depth > 0 {
            return CallResult {
                ret: Vec::new(),
                gas_left: gas,
                err: None,
            };
        }
        if self.depth > CALL_CREATE_DEPTH {
            return CallResult {
                ret: Vec::new(),
                gas_left: gas,
                err: Some(VmError::CallDepthExceeded),
            };
        }
        if !self.can_transfer(&caller, value) {
            return CallResult {
                ret: Vec::new(),
                gas_left: gas,
                err: Some(VmError::InsufficientBalance),
            };
        }

        let snapshot = self.state.snapshot();
        let mut contract = Contract::new(caller, caller, value, gas);
        let code_hash = self.state.get_code_hash(&addr);
        let code = self.state.get_code(&addr);
        contract.set_call_code(Some(addr), code_hash, code);

        match self.run(&mut contract, input) {
            Ok(ret) => CallResult {
                ret: ret.unwrap_or_default(),
                gas_left: contract.gas,
                err: None,
            },
            Err(err) => {
                contract.use_gas(contract.gas);
                self.state.revert_to_snapshot(snapshot);
                CallResult {
                    ret: Vec::new(),
                    gas_left: 0,
                    err: Some(err),
                }
            }
        }
    }

    /// Like [`TiltVm::call_code`], but the frame is marked delegate: no
    /// value moves, and CALLER/CALLVALUE report the parent frame's caller
    /// and value.
    pub fn delegate_call(
        &mut self,
        parent: &Contract,
        addr: Address,
        input: &[u8],
        gas: u64,
    ) -> CallResult {
        if self.vm_config.no_recursion && self.depth > 0 {
            return CallResult {
                ret: Vec::new(),
                gas_left: gas,
                err: None,
            };
        }
        if self.depth > CALL_CREATE_DEPTH {
            return CallResult {
                ret: Vec::new(),
                gas_left: gas,
                err: Some(VmError::CallDepthExceeded),
            };
        }

        let snapshot = self.state.snapshot();
        let mut contract = Contract::new(parent.address(), parent.address(), parent.call_value(), gas)
            .as_delegate(parent.caller(), parent.call_value());
        let code_hash = self.state.get_code_hash(&addr);
        let code = self.state.get_code(&addr);
        contract.set_call_code(Some(addr), code_hash, code);

        match self.run(&mut contract, input) {
            Ok(ret) => CallResult {
                ret: ret.unwrap_or_default(),
                gas_left: contract.gas,
                err: None,
            },
            Err(err) => {
                contract.use_gas(contract.gas);
                self.state.revert_to_snapshot(snapshot);
                CallResult {
                    ret: Vec::new(),
                    gas_left: 0,
                    err: Some(err),
                }
            }
        }
    }

    /// Create a new contract: run `code` as init bytecode and persist its
    /// return value as the deployed code at `keccak(rlp(caller, nonce))`.
    pub fn create(&mut self, caller: Address, code: &[u8], gas: u64, value: U256) -> CreateResult {
        if self.vm_config.no_recursion && self.depth > 0 {
            return CreateResult {
                ret: Vec::new(),
                address: Address::ZERO,
                gas_left: gas,
                err: None,
            };
        }
        if self.depth > CALL_CREATE_DEPTH {
            return CreateResult {
                ret: Vec::new(),
                address: Address::ZERO,
                gas_left: gas,
                err: Some(VmError::CallDepthExceeded),
            };
        }
        if !self.can_transfer(&caller, value) {
            return CreateResult {
                ret: Vec::new(),
                address: Address::ZERO,
                gas_left: gas,
                err: Some(VmError::InsufficientBalance),
            };
        }

        // The caller's nonce bump survives any revert below
        let nonce = self.state.get_nonce(&caller);
        self.state.set_nonce(caller, nonce + 1);

        let snapshot = self.state.snapshot();
        let address = create_address(&caller, nonce);
        self.state.create_account(address);
        self.state.set_nonce(address, 1);
        self.transfer(caller, address, value);

        let mut contract = Contract::new(caller, address, value, gas);
        contract.set_call_code(None, keccak256(code), code.to_vec());

        let ret = match self.run(&mut contract, &[]) {
            Ok(ret) => ret.unwrap_or_default(),
            Err(err) => {
                contract.use_gas(contract.gas);
                self.state.revert_to_snapshot(snapshot);
                return CreateResult {
                    ret: Vec::new(),
                    address,
                    gas_left: 0,
                    err: Some(err),
                };
            }
        };

        if ret.len() > MAX_CODE_SIZE {
            contract.use_gas(contract.gas);
            self.state.revert_to_snapshot(snapshot);
            return CreateResult {
                ret: Vec::new(),
                address,
                gas_left: 0,
                err: Some(VmError::MaxCodeSizeExceeded),
            };
        }

        let create_data_gas = ret.len() as u64 * CREATE_DATA_GAS;
        if contract.use_gas(create_data_gas) {
            self.state.set_code(address, ret.clone());
            CreateResult {
                ret,
                address,
                gas_left: contract.gas,
                err: None,
            }
        } else {
            // The code cannot be paid for: the return bytes are dropped
            // and nothing is stored, but unlike every other creation
            // failure the snapshot is NOT reverted, so the fresh account,
            // its nonce and the value transfer all stay in place and the
            // remaining gas is handed back
            CreateResult {
                ret: Vec::new(),
                address,
                gas_left: contract.gas,
                err: Some(VmError::CodeStoreOutOfGas),
            }
        }
    }
}

/// Deterministic new-contract address: low 160 bits of
/// `keccak(rlp(caller, nonce))`
pub fn create_address(caller: &Address, nonce: u64) -> Address {
    let mut s = rlp::RlpStream::new_list(2);
    s.append(caller);
    s.append(&nonce);
    let hash = keccak256(&s.out());
    Address::from_word(hash.to_word())
}
