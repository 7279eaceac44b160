//! Destination-chain contract bindings

pub mod erc20;

pub use erc20::ERC20;
