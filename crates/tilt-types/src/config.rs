//! Chain configuration and forkable gas tables

/// Gas costs that changed across protocol forks. The jump table's gas
/// functions read these instead of hard-coding the values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GasTable {
    /// EXTCODESIZE cost
    pub ext_code_size: u64,
    /// EXTCODECOPY base cost
    pub ext_code_copy: u64,
    /// BALANCE cost
    pub balance: u64,
    /// SLOAD cost
    pub sload: u64,
    /// CALL/CALLCODE/DELEGATECALL base cost
    pub calls: u64,
    /// SUICIDE base cost
    pub suicide: u64,
    /// Per-byte cost of the EXP exponent
    pub exp_byte: u64,
    /// Surcharge when SUICIDE credits a fresh account (post-fork only)
    pub create_by_suicide: Option<u64>,
}

impl GasTable {
    /// Original (homestead) cost table
    pub const HOMESTEAD: GasTable = GasTable {
        ext_code_size: 20,
        ext_code_copy: 20,
        balance: 20,
        sload: 50,
        calls: 40,
        suicide: 0,
        exp_byte: 10,
        create_by_suicide: None,
    };

    /// Repriced table for the IO-heavy opcodes
    pub const REPRICED: GasTable = GasTable {
        ext_code_size: 700,
        ext_code_copy: 700,
        balance: 400,
        sload: 200,
        calls: 700,
        suicide: 5000,
        exp_byte: 10,
        create_by_suicide: Some(25000),
    };
}

/// Chain configuration: identity plus fork activation heights
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainConfig {
    /// Chain identifier
    pub chain_id: u64,
    /// Homestead fork block (None = never)
    pub homestead_block: Option<u64>,
    /// Gas repricing fork block (None = never)
    pub reprice_block: Option<u64>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_id: 1,
            homestead_block: Some(0),
            reprice_block: None,
        }
    }
}

impl ChainConfig {
    /// Whether the homestead rules are active at `number`
    pub fn is_homestead(&self, number: u64) -> bool {
        self.homestead_block.is_some_and(|b| number >= b)
    }

    /// Whether the repriced gas rules are active at `number`
    pub fn is_repriced(&self, number: u64) -> bool {
        self.reprice_block.is_some_and(|b| number >= b)
    }

    /// Select the gas table active at `number`
    pub fn gas_table(&self, number: u64) -> GasTable {
        if self.is_repriced(number) {
            GasTable::REPRICED
        } else {
            GasTable::HOMESTEAD
        }
    }
}
