// src/abi.rs - Solidity-compatible events and errors for the factory and token ledgers
// Logs and revert data produced by the ledger decode with any EVM client ABI

use alloy_sol_types::sol;

// ============================================================================
// ERROR DEFINITIONS
// ============================================================================

sol! {
    // Input validation
    #[derive(Debug, PartialEq, Eq)]
    error InvalidInput(string reason);
    #[derive(Debug, PartialEq, Eq)]
    error ZeroAddress();
    #[derive(Debug, PartialEq, Eq)]
    error ArithmeticOverflow();

    // Access control
    #[derive(Debug, PartialEq, Eq)]
    error Unauthorized(address caller, address creator);

    // Sale flow
    #[derive(Debug, PartialEq, Eq)]
    error NotForSale();
    #[derive(Debug, PartialEq, Eq)]
    error PaymentMismatch(uint256 expected, uint256 provided);
    #[derive(Debug, PartialEq, Eq)]
    error InsufficientInventory(uint256 available, uint256 requested);
    #[derive(Debug, PartialEq, Eq)]
    error InsufficientBalance(uint256 balance, uint256 required);
    #[derive(Debug, PartialEq, Eq)]
    error InsufficientLiquidity(uint256 liquidity, uint256 required);
    #[derive(Debug, PartialEq, Eq)]
    error InsufficientAllowance(uint256 allowance, uint256 required);

    // Execution environment
    #[derive(Debug, PartialEq, Eq)]
    error InsufficientFunds(uint256 balance, uint256 required);
    #[derive(Debug, PartialEq, Eq)]
    error NotFound(string what);
}

// ============================================================================
// EVENT DEFINITIONS (EVM Compatible)
// ============================================================================

sol! {
    // Factory
    #[derive(Debug, PartialEq, Eq)]
    event TokenCreated(
        address indexed tokenAddress,
        address indexed creator,
        string name,
        string symbol,
        uint256 totalSupply,
        string metadataURI
    );

    // ERC-20 Standard Events
    #[derive(Debug, PartialEq, Eq)]
    event Transfer(address indexed from, address indexed to, uint256 value);
    #[derive(Debug, PartialEq, Eq)]
    event Approval(address indexed owner, address indexed spender, uint256 value);

    // Direct sale
    #[derive(Debug, PartialEq, Eq)]
    event TokensPurchased(address indexed buyer, uint256 amount, uint256 totalPrice);
    #[derive(Debug, PartialEq, Eq)]
    event TokensSold(address indexed seller, uint256 amount, uint256 payout);
    #[derive(Debug, PartialEq, Eq)]
    event PriceUpdated(uint256 oldPrice, uint256 newPrice);
    #[derive(Debug, PartialEq, Eq)]
    event SaleStatusChanged(bool isForSale);
    #[derive(Debug, PartialEq, Eq)]
    event UnsoldTokensWithdrawn(address indexed creator, uint256 amount);
    #[derive(Debug, PartialEq, Eq)]
    event LiquidityAdded(address indexed from, uint256 amount);
}
