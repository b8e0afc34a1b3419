//! End-to-end interpreter and call-graph tests

use tilt_evm::{Context, TiltVm, VmConfig, VmError};
use tilt_primitives::{Address, H256, U256};
use tilt_state::{MemoryState, StateDb};
use tilt_types::ChainConfig;

const CALLER: Address = Address::from_bytes([0xCA; 20]);
const TARGET: Address = Address::from_bytes([0xC0; 20]);

fn funded_state() -> MemoryState {
    let mut state = MemoryState::new();
    state.add_balance(CALLER, U256::from(1_000_000_000u64));
    state
}

fn install(state: &mut MemoryState, address: Address, code: Vec<u8>) {
    state.create_account(address);
    state.set_code(address, code);
}

fn vm(state: &mut MemoryState) -> TiltVm<'_> {
    TiltVm::new(
        Context::default(),
        state,
        ChainConfig::default(),
        VmConfig::default(),
    )
}

fn vm_unmetered(state: &mut MemoryState) -> TiltVm<'_> {
    TiltVm::new(
        Context::default(),
        state,
        ChainConfig::default(),
        VmConfig {
            disable_gas_metering: true,
            ..Default::default()
        },
    )
}

/// PUSH1 3, PUSH1 5, ADD, stored and returned as one word
#[test]
fn add_and_return_with_exact_gas() {
    let mut state = funded_state();
    install(
        &mut state,
        TARGET,
        vec![
            0x60, 0x03, // PUSH1 3
            0x60, 0x05, // PUSH1 5
            0x01, // ADD
            0x60, 0x00, // PUSH1 0
            0x52, // MSTORE
            0x60, 0x20, // PUSH1 32
            0x60, 0x00, // PUSH1 0
            0xF3, // RETURN
        ],
    );

    let mut env = vm(&mut state);
    let result = env.call(CALLER, TARGET, &[], 100_000, U256::zero());
    assert!(result.err.is_none());
    assert_eq!(result.ret.len(), 32);
    assert_eq!(result.ret[31], 0x08);
    assert!(result.ret[..31].iter().all(|&b| b == 0));

    // 5 pushes + ADD at 3 each, MSTORE 3, plus one word of memory
    // expansion (3); RETURN itself is free and the memory is already
    // sized
    assert_eq!(100_000 - result.gas_left, 5 * 3 + 3 + 3 + 3);
}

#[test]
fn create_with_empty_return() {
    let mut state = funded_state();
    let mut env = vm(&mut state);

    // Init code: STOP (deploys empty code)
    let result = env.create(CALLER, &[0x00], 100_000, U256::zero());
    assert!(result.err.is_none());
    assert!(result.ret.is_empty());
    assert_eq!(result.address, tilt_evm::create_address(&CALLER, 0));

    assert_eq!(state.get_nonce(&CALLER), 1);
    assert_eq!(state.get_nonce(&result.address), 1);
    assert!(state.get_code(&result.address).is_empty());
}

#[test]
fn create_transfers_value() {
    let mut state = funded_state();
    let mut env = vm(&mut state);
    let result = env.create(CALLER, &[0x00], 100_000, U256::from(777u64));
    assert!(result.err.is_none());
    assert_eq!(state.get_balance(&result.address), U256::from(777u64));
    assert_eq!(
        state.get_balance(&CALLER),
        U256::from(1_000_000_000u64 - 777)
    );
}

#[test]
fn create_insufficient_balance_preserves_gas() {
    let mut state = MemoryState::new();
    let mut env = vm(&mut state);
    let result = env.create(CALLER, &[0x00], 100_000, U256::one());
    assert_eq!(result.err, Some(VmError::InsufficientBalance));
    assert_eq!(result.gas_left, 100_000);
}

#[test]
fn create_code_store_out_of_gas_keeps_state_and_gas() {
    let mut state = funded_state();
    let mut env = vm(&mut state);

    // Init returns 32 zero bytes; storing costs 32 * 200 = 6400 which the
    // remaining budget cannot pay
    let init = [0x60, 0x20, 0x60, 0x00, 0xF3];
    let result = env.create(CALLER, &init, 100, U256::from(333u64));

    assert_eq!(result.err, Some(VmError::CodeStoreOutOfGas));
    assert!(result.ret.is_empty());
    assert_ne!(result.address, Address::ZERO);
    // Execution cost 9 was charged, the storage cost was not
    assert_eq!(result.gas_left, 91);
    // Unlike other creation failures there is no rollback: the account
    // stays in place with its nonce and the transferred value, just
    // without code
    assert!(state.exist(&result.address));
    assert_eq!(state.get_nonce(&result.address), 1);
    assert_eq!(state.get_balance(&result.address), U256::from(333u64));
    assert!(state.get_code(&result.address).is_empty());
    assert_eq!(state.get_nonce(&CALLER), 1);
}

#[test]
fn create_code_store_out_of_gas_pushes_zero() {
    // The outer contract copies its trailing 5 init bytes to memory and
    // CREATEs them, then returns whatever CREATE left on the stack
    let code = vec![
        0x60, 0x05, // PUSH1 5 (copy size)
        0x60, 0x16, // PUSH1 22 (init offset in code)
        0x60, 0x00, // PUSH1 0 (memory offset)
        0x39, // CODECOPY
        0x60, 0x05, // PUSH1 5 (init size)
        0x60, 0x00, // PUSH1 0 (init offset)
        0x60, 0x00, // PUSH1 0 (value)
        0xF0, // CREATE
        0x60, 0x00, // PUSH1 0
        0x52, // MSTORE
        0x60, 0x20, 0x60, 0x00, 0xF3, // RETURN 32 bytes
        // Init code: returns 32 zero bytes the creator cannot pay to store
        0x60, 0x20, 0x60, 0x00, 0xF3,
    ];

    let mut state = funded_state();
    install(&mut state, TARGET, code);
    let mut env = vm(&mut state);

    // 27 gas of setup plus the 32000 CREATE charge leaves 100 for the
    // init frame (99 after the one-64th withholding): enough to run, far
    // too little to store the code
    let result = env.call(CALLER, TARGET, &[], 32_127, U256::zero());
    assert!(result.err.is_none());
    assert_eq!(
        result.ret,
        vec![0u8; 32],
        "a code-store failure must push zero, not the address"
    );

    // The created-but-codeless account is still there
    let created = tilt_evm::create_address(&TARGET, 0);
    assert!(state.exist(&created));
    assert_eq!(state.get_nonce(&created), 1);
    assert!(state.get_code(&created).is_empty());
}

#[test]
fn create_max_code_size_exceeded() {
    let mut state = funded_state();
    let mut env = vm(&mut state);

    // Init returns 24577 zero bytes
    let init = [0x62, 0x00, 0x60, 0x01, 0x60, 0x00, 0xF3];
    let result = env.create(CALLER, &init, 1_000_000, U256::zero());
    assert_eq!(result.err, Some(VmError::MaxCodeSizeExceeded));
    assert_eq!(result.gas_left, 0);
    assert!(result.ret.is_empty());
}

/// CALL to an absent account with zero value succeeds without creating it
#[test]
fn call_absent_account_zero_value() {
    let absent = Address::from_bytes([0xAB; 20]);
    let mut code = vec![
        0x60, 0x00, // ret_size
        0x60, 0x00, // ret_off
        0x60, 0x00, // in_size
        0x60, 0x00, // in_off
        0x60, 0x00, // value
        0x73, // PUSH20 target
    ];
    code.extend_from_slice(absent.as_bytes());
    code.extend_from_slice(&[
        0x61, 0x27, 0x10, // PUSH2 10000 (gas)
        0xF1, // CALL
        0x60, 0x00, // PUSH1 0
        0x52, // MSTORE
        0x60, 0x20, 0x60, 0x00, 0xF3, // RETURN 32 bytes
    ]);

    let mut state = funded_state();
    install(&mut state, TARGET, code);
    let mut env = vm(&mut state);
    let result = env.call(CALLER, TARGET, &[], 200_000, U256::zero());

    assert!(result.err.is_none());
    assert_eq!(result.ret[31], 1, "CALL must report success");
    assert!(!state.exist(&absent), "no account may be created");
}

#[test]
fn call_with_value_creates_account_and_transfers() {
    let absent = Address::from_bytes([0xAC; 20]);
    let mut state = funded_state();
    let mut env = vm(&mut state);
    let result = env.call(CALLER, absent, &[], 100_000, U256::from(555u64));
    assert!(result.err.is_none());
    assert!(state.exist(&absent));
    assert_eq!(state.get_balance(&absent), U256::from(555u64));
}

#[test]
fn call_insufficient_balance() {
    let mut state = MemoryState::new();
    let mut env = vm(&mut state);
    let result = env.call(CALLER, TARGET, &[], 50_000, U256::one());
    assert_eq!(result.err, Some(VmError::InsufficientBalance));
    assert_eq!(result.gas_left, 50_000);
}

/// JUMP into a PUSH immediate fails and rolls the frame back
#[test]
fn jump_into_push_immediate_reverts() {
    let mut state = funded_state();
    install(
        &mut state,
        TARGET,
        vec![
            0x60, 0x01, // PUSH1 1
            0x60, 0x00, // PUSH1 0
            0x55, // SSTORE (slot 0 := 1)
            0x62, 0x00, 0x00, 0x01, // PUSH3 1 (byte 1 is inside PUSH1's immediate)
            0x56, // JUMP
        ],
    );

    let mut env = vm(&mut state);
    let result = env.call(CALLER, TARGET, &[], 100_000, U256::zero());
    assert_eq!(result.err, Some(VmError::InvalidJump(1)));
    assert_eq!(result.gas_left, 0, "failed frames consume their gas");
    assert_eq!(
        state.get_state(&TARGET, &H256::ZERO),
        H256::ZERO,
        "the SSTORE must have been rolled back"
    );
}

#[test]
fn invalid_opcode_aborts_frame() {
    let mut state = funded_state();
    install(&mut state, TARGET, vec![0xFE]);
    let mut env = vm(&mut state);
    let result = env.call(CALLER, TARGET, &[], 10_000, U256::zero());
    assert_eq!(result.err, Some(VmError::InvalidOpcode(0xFE)));
}

#[test]
fn out_of_gas_consumes_frame() {
    let mut state = funded_state();
    install(&mut state, TARGET, vec![0x60, 0x01, 0x60, 0x02, 0x01, 0x00]);
    let mut env = vm(&mut state);
    let result = env.call(CALLER, TARGET, &[], 5, U256::zero());
    assert_eq!(result.err, Some(VmError::OutOfGas));
    assert_eq!(result.gas_left, 0);
}

/// A 1025-deep self-call chain: the innermost attempt hits the depth
/// limit, everything above completes
#[test]
fn call_depth_limit() {
    let handle = std::thread::Builder::new()
        .stack_size(64 * 1024 * 1024)
        .spawn(|| {
            // Counter in slot 0, then recurse into self
            let mut code = vec![
                0x60, 0x00, // PUSH1 0
                0x54, // SLOAD
                0x60, 0x01, // PUSH1 1
                0x01, // ADD
                0x60, 0x00, // PUSH1 0
                0x55, // SSTORE
                0x60, 0x00, // ret_size
                0x60, 0x00, // ret_off
                0x60, 0x00, // in_size
                0x60, 0x00, // in_off
                0x60, 0x00, // value
                0x73, // PUSH20 self
            ];
            code.extend_from_slice(TARGET.as_bytes());
            code.extend_from_slice(&[
                0x60, 0x00, // PUSH1 0 (gas; irrelevant unmetered)
                0xF1, // CALL
                0x00, // STOP
            ]);

            let mut state = funded_state();
            install(&mut state, TARGET, code);
            let mut env = vm_unmetered(&mut state);
            let result = env.call(CALLER, TARGET, &[], 0, U256::zero());
            assert!(result.err.is_none());

            // Frames executed at depths 1..=1025; the 1025th's CALL was
            // rejected with the depth error and absorbed as a 0 push
            let counter = state.get_state(&TARGET, &H256::ZERO).to_word();
            assert_eq!(counter, U256::from(1025u64));
        })
        .expect("spawn");
    handle.join().expect("depth test");
}

/// DELEGATECALL keeps the original caller and value visible
#[test]
fn delegate_call_preserves_caller_and_storage_context() {
    let library = Address::from_bytes([0x11; 20]);

    // Library: stores CALLER at slot 0, returns it
    let library_code = vec![
        0x33, // CALLER
        0x80, // DUP1
        0x60, 0x00, // PUSH1 0
        0x55, // SSTORE
        0x60, 0x00, 0x52, // MSTORE at 0
        0x60, 0x20, 0x60, 0x00, 0xF3, // RETURN 32
    ];

    // Proxy: delegatecalls the library and forwards the return word
    let mut proxy_code = vec![
        0x60, 0x20, // out_size
        0x60, 0x00, // out_off
        0x60, 0x00, // in_size
        0x60, 0x00, // in_off
        0x73, // PUSH20 library
    ];
    proxy_code.extend_from_slice(library.as_bytes());
    proxy_code.extend_from_slice(&[
        0x62, 0x00, 0xC3, 0x50, // PUSH3 50000 (gas)
        0xF4, // DELEGATECALL
        0x50, // POP status
        0x60, 0x20, 0x60, 0x00, 0xF3, // RETURN 32
    ]);

    let mut state = funded_state();
    install(&mut state, library, library_code);
    install(&mut state, TARGET, proxy_code);

    let mut env = vm(&mut state);
    let result = env.call(CALLER, TARGET, &[], 500_000, U256::zero());
    assert!(result.err.is_none());

    // CALLER inside the delegate frame is the proxy's caller
    assert_eq!(&result.ret[12..], CALLER.as_bytes());
    // And the write landed in the proxy's storage, not the library's
    let slot = H256::ZERO;
    assert_eq!(
        state.get_state(&TARGET, &slot).to_word(),
        CALLER.to_word()
    );
    assert_eq!(state.get_state(&library, &slot), H256::ZERO);
}

/// CALLCODE runs foreign code against the caller's storage
#[test]
fn call_code_uses_callers_storage() {
    let library = Address::from_bytes([0x22; 20]);
    let library_code = vec![
        0x60, 0x07, // PUSH1 7
        0x60, 0x01, // PUSH1 1
        0x55, // SSTORE
        0x00, // STOP
    ];

    let mut caller_code = vec![
        0x60, 0x00, // ret_size
        0x60, 0x00, // ret_off
        0x60, 0x00, // in_size
        0x60, 0x00, // in_off
        0x60, 0x00, // value
        0x73, // PUSH20 library
    ];
    caller_code.extend_from_slice(library.as_bytes());
    caller_code.extend_from_slice(&[0x62, 0x00, 0xC3, 0x50, 0xF2, 0x00]); // gas, CALLCODE, STOP

    let mut state = funded_state();
    install(&mut state, library, library_code);
    install(&mut state, TARGET, caller_code);

    let mut env = vm(&mut state);
    let result = env.call(CALLER, TARGET, &[], 500_000, U256::zero());
    assert!(result.err.is_none());

    let slot = H256::from_word(U256::one());
    assert_eq!(state.get_state(&TARGET, &slot).to_word(), U256::from(7u64));
    assert_eq!(state.get_state(&library, &slot), H256::ZERO);
}

#[test]
fn suicide_transfers_balance_and_marks_account() {
    let heir = Address::from_bytes([0x77; 20]);
    let mut code = vec![0x73]; // PUSH20 heir
    code.extend_from_slice(heir.as_bytes());
    code.push(0xFF); // SUICIDE

    let mut state = funded_state();
    install(&mut state, TARGET, code);
    state.add_balance(TARGET, U256::from(4_000u64));

    let mut env = vm(&mut state);
    let result = env.call(CALLER, TARGET, &[], 100_000, U256::zero());
    assert!(result.err.is_none());

    assert_eq!(state.get_balance(&heir), U256::from(4_000u64));
    assert_eq!(state.get_balance(&TARGET), U256::zero());
    assert!(state.has_suicided(&TARGET));
}

#[test]
fn log_records_address_topics_and_block() {
    // LOG1 with topic 0x42 over one memory byte
    let code = vec![
        0x60, 0xAA, // PUSH1 0xAA
        0x60, 0x00, // PUSH1 0
        0x53, // MSTORE8
        0x60, 0x42, // topic
        0x60, 0x01, // size
        0x60, 0x00, // offset
        0xA1, // LOG1
        0x00, // STOP
    ];
    let mut state = funded_state();
    install(&mut state, TARGET, code);

    let context = Context {
        block_number: 99,
        ..Default::default()
    };
    let mut env = TiltVm::new(context, &mut state, ChainConfig::default(), VmConfig::default());
    let result = env.call(CALLER, TARGET, &[], 100_000, U256::zero());
    assert!(result.err.is_none());

    let logs = state.logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].address, TARGET);
    assert_eq!(logs[0].topics, vec![H256::from_word(U256::from(0x42u64))]);
    assert_eq!(logs[0].data, vec![0xAA]);
    assert_eq!(logs[0].block_number, 99);
}

#[test]
fn identity_precompile_through_call() {
    let mut state = funded_state();
    let mut env = vm(&mut state);

    let identity = Address::from_bytes({
        let mut b = [0u8; 20];
        b[19] = 4;
        b
    });
    let result = env.call(CALLER, identity, b"echo me", 10_000, U256::zero());
    assert!(result.err.is_none());
    assert_eq!(result.ret, b"echo me");
}

#[test]
fn blockhash_respects_window() {
    let code = vec![
        0x60, 0x05, // PUSH1 5
        0x40, // BLOCKHASH
        0x60, 0x00, 0x52, // MSTORE
        0x60, 0x20, 0x60, 0x00, 0xF3,
    ];
    let mut state = funded_state();
    install(&mut state, TARGET, code.clone());

    // Inside the window: block 10 asking for 5
    let context = Context {
        block_number: 10,
        get_hash: Box::new(|n| tilt_crypto::keccak256(&n.to_be_bytes())),
        ..Default::default()
    };
    let mut env = TiltVm::new(context, &mut state, ChainConfig::default(), VmConfig::default());
    let result = env.call(CALLER, TARGET, &[], 100_000, U256::zero());
    assert_eq!(
        result.ret,
        tilt_crypto::keccak256(&5u64.to_be_bytes()).as_bytes()
    );

    // Outside the window: block 500 asking for 5 yields zero
    let context = Context {
        block_number: 500,
        get_hash: Box::new(|n| tilt_crypto::keccak256(&n.to_be_bytes())),
        ..Default::default()
    };
    let mut env = TiltVm::new(context, &mut state, ChainConfig::default(), VmConfig::default());
    let result = env.call(CALLER, TARGET, &[], 100_000, U256::zero());
    assert_eq!(result.ret, vec![0u8; 32]);
}

#[test]
fn cancel_aborts_interpreter() {
    // Infinite loop: JUMPDEST, PUSH1 0, JUMP
    let code = vec![0x5B, 0x60, 0x00, 0x56];
    let mut state = funded_state();
    install(&mut state, TARGET, code);

    let mut env = vm_unmetered(&mut state);
    let cancel = env.cancel_handle();
    let canceller = std::thread::spawn(move || {
        std::thread::sleep(std::time::Duration::from_millis(50));
        cancel.store(true, std::sync::atomic::Ordering::Release);
    });

    let result = env.call(CALLER, TARGET, &[], 0, U256::zero());
    canceller.join().expect("canceller");
    // A cancelled run surfaces as a clean, empty success
    assert!(result.err.is_none());
    assert!(result.ret.is_empty());
}

#[test]
fn no_recursion_blocks_nested_calls() {
    let inner = Address::from_bytes([0x55; 20]);
    // Inner would write storage if it ever ran
    let inner_code = vec![0x60, 0x01, 0x60, 0x00, 0x55, 0x00];
    let mut outer_code = vec![
        0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x73,
    ];
    outer_code.extend_from_slice(inner.as_bytes());
    outer_code.extend_from_slice(&[0x62, 0x00, 0xC3, 0x50, 0xF1, 0x00]);

    let mut state = funded_state();
    install(&mut state, inner, inner_code);
    install(&mut state, TARGET, outer_code);

    let mut env = TiltVm::new(
        Context::default(),
        &mut state,
        ChainConfig::default(),
        VmConfig {
            no_recursion: true,
            ..Default::default()
        },
    );
    let result = env.call(CALLER, TARGET, &[], 500_000, U256::zero());
    assert!(result.err.is_none());
    assert_eq!(state.get_state(&inner, &H256::ZERO), H256::ZERO);
}

#[test]
fn sstore_gas_depends_on_previous_value() {
    // slot0 := 1 (set, 20000), slot0 := 2 (reset, 5000), slot0 := 0 (clear, 5000)
    let code = vec![
        0x60, 0x01, 0x60, 0x00, 0x55, // set
        0x60, 0x02, 0x60, 0x00, 0x55, // reset
        0x60, 0x00, 0x60, 0x00, 0x55, // clear
        0x00,
    ];
    let mut state = funded_state();
    install(&mut state, TARGET, code);
    let mut env = vm(&mut state);
    let result = env.call(CALLER, TARGET, &[], 100_000, U256::zero());
    assert!(result.err.is_none());
    // 6 pushes at 3 + 20000 + 5000 + 5000
    assert_eq!(100_000 - result.gas_left, 6 * 3 + 30_000);
}
