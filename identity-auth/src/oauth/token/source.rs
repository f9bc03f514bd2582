//! Token retrieval collaborator.

use async_trait::async_trait;

use super::Tokens;
use crate::error::Error;

/// Supplies the access token for the login being resolved.
///
/// Storage and refresh are the implementor's concern. `Ok(None)` means no
/// token has been obtained for this login.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn get_token(&self) -> Result<Option<Tokens>, Error>;
}

/// Tokens just obtained from an authorization-code exchange.
#[derive(Debug, Clone, Default)]
pub struct ExchangedTokens(Option<Tokens>);

impl ExchangedTokens {
    pub fn new(tokens: Tokens) -> Self {
        Self(Some(tokens))
    }

    pub fn empty() -> Self {
        Self(None)
    }
}

#[async_trait]
impl TokenSource for ExchangedTokens {
    async fn get_token(&self) -> Result<Option<Tokens>, Error> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exchanged_tokens_returns_held_tokens() {
        let source = ExchangedTokens::new(Tokens::bearer("abc"));
        let tokens = source.get_token().await.unwrap();
        assert!(tokens.is_some());
    }

    #[tokio::test]
    async fn test_empty_source_returns_none() {
        let source = ExchangedTokens::empty();
        assert!(source.get_token().await.unwrap().is_none());
    }
}
