//! Hardcoded token, router and selector allowlists
//!
//! Changing any of these tables requires a build, not a request. Unresolvable
//! input is rejected, never passed through.

use crate::error::{Result, StewardError};
use ethers::types::Address;

/// One allowlisted token
#[derive(Debug, Clone, Copy)]
struct TokenEntry {
    symbol: &'static str,
    address: &'static str,
    decimals: u8,
}

/// Base mainnet tokens
const MAINNET_TOKENS: &[TokenEntry] = &[
    TokenEntry {
        symbol: "USDC",
        address: "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913",
        decimals: 6,
    },
    TokenEntry {
        symbol: "WETH",
        address: "0x4200000000000000000000000000000000000006",
        decimals: 18,
    },
    TokenEntry {
        symbol: "DAI",
        address: "0x50c5725949A6F0c72E6C4a641F24049A917DB0Cb",
        decimals: 18,
    },
    TokenEntry {
        symbol: "CBETH",
        address: "0x2Ae3F1Ec7F1F5012CFEab0185bfc7aa3cf0DEc22",
        decimals: 18,
    },
];

/// Base Sepolia tokens
const TESTNET_TOKENS: &[TokenEntry] = &[
    TokenEntry {
        symbol: "USDC",
        address: "0x036CbD53842c5426634e7929541eC2318f3dCF7e",
        decimals: 6,
    },
    TokenEntry {
        symbol: "WETH",
        address: "0x4200000000000000000000000000000000000006",
        decimals: 18,
    },
];

/// Routers a validated payload may target
const MAINNET_ROUTERS: &[&str] = &[
    // Uniswap SwapRouter02 on Base
    "0x2626664c2603336E57B271c5C0b26F421741e481",
    // Aerodrome router
    "0xcF77a3Ba9A5CA399B7c97c74d54e5b1Beb874E43",
];

const TESTNET_ROUTERS: &[&str] = &[
    // Uniswap SwapRouter02 on Base Sepolia
    "0x94cC0AaC535CCDB3C01d6787D6413C739ae12bc4",
];

/// Selectors the wrapped payload may start with (exact-input swap family)
const KNOWN_SELECTORS: &[[u8; 4]] = &[
    // exactInputSingle(ExactInputSingleParams)
    [0x41, 0x4b, 0xf3, 0x89],
    // exactInputSingle, SwapRouter02 variant without deadline
    [0x04, 0xe4, 0x5a, 0xaf],
    // exactInput(ExactInputParams)
    [0xc0, 0x4b, 0x8d, 0x59],
    // exactInput, SwapRouter02 variant
    [0xb8, 0x58, 0x18, 0x3f],
];

/// A token that passed allowlist resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedToken {
    pub address: Address,
    pub decimals: u8,
}

/// Chain-mode-scoped allowlist tables
#[derive(Debug, Clone)]
pub struct Allowlist {
    testnet: bool,
}

impl Allowlist {
    pub fn new(testnet: bool) -> Self {
        Self { testnet }
    }

    fn tokens(&self) -> &'static [TokenEntry] {
        if self.testnet {
            TESTNET_TOKENS
        } else {
            MAINNET_TOKENS
        }
    }

    fn routers(&self) -> &'static [&'static str] {
        if self.testnet {
            TESTNET_ROUTERS
        } else {
            MAINNET_ROUTERS
        }
    }

    /// Resolve a symbol or 0x-address against the token table.
    pub fn resolve_token(&self, input: &str) -> Result<ResolvedToken> {
        let trimmed = input.trim();

        for entry in self.tokens() {
            let matches_symbol = trimmed.eq_ignore_ascii_case(entry.symbol);
            let matches_address = trimmed.eq_ignore_ascii_case(entry.address);
            if matches_symbol || matches_address {
                let address = entry
                    .address
                    .parse::<Address>()
                    .map_err(|e| StewardError::AddressParsing(e.to_string()))?;
                return Ok(ResolvedToken {
                    address,
                    decimals: entry.decimals,
                });
            }
        }

        Err(StewardError::Validation(format!(
            "token not allowlisted: {}",
            trimmed
        )))
    }

    /// Whether a payload may target this router
    pub fn router_allowed(&self, router: Address) -> bool {
        self.routers().iter().any(|r| {
            r.parse::<Address>()
                .map(|parsed| parsed == router)
                .unwrap_or(false)
        })
    }

    /// Whether the payload starts with a known swap selector
    pub fn selector_known(&self, calldata: &[u8]) -> bool {
        if calldata.len() < 4 {
            return false;
        }
        KNOWN_SELECTORS.iter().any(|s| calldata[..4] == s[..])
    }
}
