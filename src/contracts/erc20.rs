//! ERC-20 interface for the reward token
//!
//! Uses alloy's sol! macro to generate type-safe bindings for the calls the
//! disperser makes against the treasury's reward token.

use alloy::sol;

sol! {
    /// Subset of the ERC-20 standard used for payouts
    #[sol(rpc)]
    contract ERC20 {
        /// Move `amount` of the caller's tokens to `to`
        function transfer(address to, uint256 amount) external returns (bool);

        /// Token balance held by `account`
        function balanceOf(address account) external view returns (uint256);

        event Transfer(address indexed from, address indexed to, uint256 value);
    }
}
