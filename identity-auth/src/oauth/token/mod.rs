//! OAuth tokens and the token retrieval contract.

mod source;
mod tokens;

pub use source::{ExchangedTokens, TokenSource};
pub use tokens::Tokens;
