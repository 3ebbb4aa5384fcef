//! Read-only queries against the ownership token contract.

use adoptchain_core::chain::{ChainGateway, OwnedToken};
use adoptchain_core::error::DomainError;
use alloy_primitives::Address;
use tracing::{debug, instrument};

/// Lists the ownership tokens held by `owner`, in the contract's enumeration
/// order.
///
/// # Errors
///
/// Returns `DomainError::Chain` if any of the read calls fails.
#[instrument(skip(gateway))]
pub async fn owned_tokens(
    owner: Address,
    gateway: &dyn ChainGateway,
) -> Result<Vec<OwnedToken>, DomainError> {
    let balance = gateway.balance_of(owner).await?;
    let mut tokens = Vec::new();
    for index in 0..balance {
        let token_id = gateway.token_of_owner_by_index(owner, index).await?;
        let token_uri = gateway.token_uri(token_id).await?;
        tokens.push(OwnedToken {
            token_id,
            token_uri,
        });
    }
    debug!(count = tokens.len(), "loaded owned tokens");
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use adoptchain_test_support::{ScriptedChainGateway, address};

    #[tokio::test]
    async fn test_owned_tokens_in_enumeration_order() {
        // Arrange
        let gateway = ScriptedChainGateway::new();
        gateway.give_token(address(1), 4, "ipfs://pets/4.json");
        gateway.give_token(address(1), 9, "ipfs://pets/9.json");
        gateway.give_token(address(2), 5, "ipfs://pets/5.json");

        // Act
        let tokens = owned_tokens(address(1), &gateway).await.unwrap();

        // Assert
        assert_eq!(
            tokens,
            vec![
                OwnedToken {
                    token_id: 4,
                    token_uri: "ipfs://pets/4.json".to_owned(),
                },
                OwnedToken {
                    token_id: 9,
                    token_uri: "ipfs://pets/9.json".to_owned(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_owner_without_tokens_gets_empty_list() {
        let gateway = ScriptedChainGateway::new();

        let tokens = owned_tokens(address(3), &gateway).await.unwrap();

        assert!(tokens.is_empty());
    }
}
