//! VM error types

use thiserror::Error;

/// Errors surfaced by the virtual machine core
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VmError {
    /// Byte at pc has no jump-table entry
    #[error("invalid opcode 0x{0:02x}")]
    InvalidOpcode(u8),

    /// Pre-execution validation found too few operands
    #[error("stack underflow")]
    StackUnderflow,

    /// Pre-execution validation found the stack would exceed 1024
    #[error("stack overflow (limit 1024)")]
    StackOverflow,

    /// Gas deduction failed (static or dynamic)
    #[error("out of gas")]
    OutOfGas,

    /// Memory expansion size exceeds the 64-bit range
    #[error("gas uint64 overflow")]
    GasUintOverflow,

    /// JUMP/JUMPI target is not a valid JUMPDEST
    #[error("invalid jump destination {0}")]
    InvalidJump(u64),

    /// Recursion above 1024 frames
    #[error("max call depth exceeded")]
    CallDepthExceeded,

    /// Caller lacks funds for the value transfer
    #[error("insufficient balance for transfer")]
    InsufficientBalance,

    /// Contract creation succeeded but cannot pay for storing code
    #[error("contract creation code storage out of gas")]
    CodeStoreOutOfGas,

    /// Created code exceeds the maximum contract size
    #[error("max code size exceeded")]
    MaxCodeSizeExceeded,

    /// A precompiled contract rejected its input
    #[error("precompile failure: {0}")]
    Precompile(String),
}

/// Result type for VM operations
pub type VmResult<T> = Result<T, VmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(format!("{}", VmError::OutOfGas), "out of gas");
        assert_eq!(format!("{}", VmError::StackUnderflow), "stack underflow");
        assert_eq!(
            format!("{}", VmError::InvalidOpcode(0xEF)),
            "invalid opcode 0xef"
        );
        assert_eq!(
            format!("{}", VmError::InvalidJump(42)),
            "invalid jump destination 42"
        );
        assert_eq!(
            format!("{}", VmError::CallDepthExceeded),
            "max call depth exceeded"
        );
    }

    #[test]
    fn test_error_equality() {
        assert_eq!(VmError::OutOfGas, VmError::OutOfGas);
        assert_ne!(VmError::OutOfGas, VmError::StackOverflow);
        assert_ne!(VmError::InvalidJump(1), VmError::InvalidJump(2));
    }
}
