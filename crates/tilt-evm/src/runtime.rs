//! Standalone execution helpers: run bytecode against a fresh in-memory
//! state without assembling a full node.

use crate::error::VmError;
use crate::evm::{Context, GetHashFn, TiltVm, VmConfig};
use tilt_crypto::keccak256;
use tilt_primitives::{Address, U256};
use tilt_state::MemoryState;
use tilt_types::ChainConfig;

/// Configuration for a standalone execution
pub struct Config {
    /// Chain configuration; defaults to chain id 1
    pub chain_config: ChainConfig,
    /// Block difficulty
    pub difficulty: U256,
    /// Transaction origin
    pub origin: Address,
    /// Block beneficiary
    pub coinbase: Address,
    /// Block number
    pub block_number: u64,
    /// Block timestamp; zero means "now"
    pub time: u64,
    /// Gas budget; zero means unlimited
    pub gas_limit: u64,
    /// Transaction gas price
    pub gas_price: U256,
    /// Value passed to the executed frame
    pub value: U256,
    /// Interpreter options
    pub vm_config: VmConfig,
    /// Block hash lookup; defaults to hashing the block number's decimal
    /// string
    pub get_hash: Option<GetHashFn>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chain_config: ChainConfig::default(),
            difficulty: U256::zero(),
            origin: Address::ZERO,
            coinbase: Address::ZERO,
            block_number: 0,
            time: 0,
            gas_limit: 0,
            gas_price: U256::zero(),
            value: U256::zero(),
            vm_config: VmConfig::default(),
            get_hash: None,
        }
    }
}

fn set_defaults(cfg: &mut Config) {
    if cfg.gas_limit == 0 {
        cfg.gas_limit = u64::MAX;
    }
    if cfg.time == 0 {
        cfg.time = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
    }
}

fn new_env<'a>(cfg: &mut Config, state: &'a mut MemoryState) -> TiltVm<'a> {
    let get_hash = cfg
        .get_hash
        .take()
        .unwrap_or_else(|| Box::new(|n: u64| keccak256(n.to_string().as_bytes())));
    let context = Context {
        origin: cfg.origin,
        gas_price: cfg.gas_price,
        coinbase: cfg.coinbase,
        gas_limit: cfg.gas_limit,
        block_number: cfg.block_number,
        time: cfg.time,
        difficulty: cfg.difficulty,
        get_hash,
    };
    TiltVm::new(
        context,
        state,
        cfg.chain_config.clone(),
        std::mem::take(&mut cfg.vm_config),
    )
}

/// The fixed address standalone code executes at
pub fn contract_address() -> Address {
    let mut bytes = [0u8; 20];
    bytes[12..].copy_from_slice(b"contract");
    Address::from_bytes(bytes)
}

/// Execute `code` with `input` as call data against a temporary state.
/// Returns the output, the state after execution, and the error if the
/// frame failed.
pub fn execute(code: &[u8], input: &[u8], mut cfg: Config) -> (Vec<u8>, MemoryState, Option<VmError>) {
    set_defaults(&mut cfg);

    let mut state = MemoryState::new();
    let address = contract_address();
    {
        use tilt_state::StateDb;
        state.create_account(address);
        state.set_code(address, code.to_vec());
    }

    let origin = cfg.origin;
    let (gas_limit, value) = (cfg.gas_limit, cfg.value);
    let result = {
        let mut env = new_env(&mut cfg, &mut state);
        env.call(origin, address, input, gas_limit, value)
    };
    (result.ret, state, result.err)
}

/// Deploy `input` as init code against a temporary state, returning the
/// deployed code and the created address
pub fn create(input: &[u8], mut cfg: Config) -> (Vec<u8>, Address, Option<VmError>) {
    set_defaults(&mut cfg);

    let mut state = MemoryState::new();
    let origin = cfg.origin;
    let (gas_limit, value) = (cfg.gas_limit, cfg.value);
    let result = {
        let mut env = new_env(&mut cfg, &mut state);
        env.create(origin, input, gas_limit, value)
    };
    (result.ret, result.address, result.err)
}

/// Call the contract already installed at `address` in `state`
pub fn call(
    address: Address,
    input: &[u8],
    state: &mut MemoryState,
    mut cfg: Config,
) -> (Vec<u8>, Option<VmError>) {
    set_defaults(&mut cfg);

    let origin = cfg.origin;
    let (gas_limit, value) = (cfg.gas_limit, cfg.value);
    let result = {
        let mut env = new_env(&mut cfg, state);
        env.call(origin, address, input, gas_limit, value)
    };
    (result.ret, result.err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_returns_stored_word() {
        // PUSH1 8, PUSH1 0, MSTORE, PUSH1 32, PUSH1 0, RETURN
        let code = [0x60, 0x08, 0x60, 0x00, 0x52, 0x60, 0x20, 0x60, 0x00, 0xF3];
        let (ret, _state, err) = execute(&code, &[], Config::default());
        assert!(err.is_none());
        assert_eq!(ret.len(), 32);
        assert_eq!(ret[31], 8);
    }

    #[test]
    fn test_execute_surfaces_errors() {
        // JUMP to nowhere
        let code = [0x60, 0x05, 0x56];
        let (_ret, _state, err) = execute(&code, &[], Config::default());
        assert_eq!(err, Some(VmError::InvalidJump(5)));
    }

    #[test]
    fn test_create_deploys_code() {
        // Init code returning one STOP byte:
        // PUSH1 0x00, PUSH1 0, MSTORE8, PUSH1 1, PUSH1 0, RETURN
        let init = [0x60, 0x00, 0x60, 0x00, 0x53, 0x60, 0x01, 0x60, 0x00, 0xF3];
        let (code, address, err) = create(&init, Config::default());
        assert!(err.is_none());
        assert_eq!(code, vec![0x00]);
        assert_ne!(address, Address::ZERO);
    }

    #[test]
    fn test_call_uses_existing_state() {
        use tilt_state::StateDb;
        let mut state = MemoryState::new();
        let address = Address::from_bytes([0x33; 20]);
        state.create_account(address);
        // ADDRESS, PUSH1 0, MSTORE, PUSH1 32, PUSH1 0, RETURN
        state.set_code(
            address,
            vec![0x30, 0x60, 0x00, 0x52, 0x60, 0x20, 0x60, 0x00, 0xF3],
        );

        let (ret, err) = call(address, &[], &mut state, Config::default());
        assert!(err.is_none());
        assert_eq!(&ret[12..], address.as_bytes());
    }
}
