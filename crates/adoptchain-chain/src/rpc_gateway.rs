//! `ChainGateway` over an alloy websocket provider.

use std::time::Duration;

use adoptchain_core::chain::{ChainGateway, ContractCall, EventName, LogStream};
use adoptchain_core::error::ChainError;
use adoptchain_core::pet::PetId;
use alloy::network::{EthereumWallet, ReceiptResponse, TransactionBuilder};
use alloy::primitives::{Address, B256, Bytes, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder, WsConnect};
use alloy::rpc::types::{Filter, TransactionRequest};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::{SolCall, SolValue};
use async_trait::async_trait;
use futures::StreamExt;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::abi::{
    balanceOfCall, decode_log, encode_call, event_signature, pet_id_to_u256, tokenOfOwnerByIndexCall,
    tokenURICall, u256_to_pet_id,
};

/// How often receipts and the chain head are polled while waiting for
/// confirmations.
const CONFIRMATION_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// How long a submitted transaction may go without a receipt.
const RECEIPT_DEADLINE: Duration = Duration::from_secs(30 * 60);

fn transport(err: impl std::fmt::Display) -> ChainError {
    ChainError::Transport(err.to_string())
}

/// The adoption contract reached through a signing websocket provider.
#[derive(Clone)]
pub struct RpcChainGateway {
    provider: DynProvider,
    contract: Address,
    operator: Address,
}

impl std::fmt::Debug for RpcChainGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcChainGateway")
            .field("contract", &self.contract)
            .field("operator", &self.operator)
            .finish_non_exhaustive()
    }
}

impl RpcChainGateway {
    /// Connects to `ws_url` and signs transactions with `signer_key`.
    ///
    /// # Errors
    ///
    /// Returns `ChainError::Transport` if the key does not parse or the
    /// websocket cannot be opened.
    pub async fn connect(
        ws_url: &str,
        contract: Address,
        signer_key: &str,
    ) -> Result<Self, ChainError> {
        let signer: PrivateKeySigner = signer_key
            .parse()
            .map_err(|_| ChainError::Transport("invalid signer private key".to_owned()))?;
        let operator = signer.address();
        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_ws(WsConnect::new(ws_url))
            .await
            .map_err(transport)?
            .erased();

        info!(%contract, %operator, "connected to chain node");
        Ok(Self {
            provider,
            contract,
            operator,
        })
    }

    fn request(&self, input: Bytes) -> TransactionRequest {
        TransactionRequest::default()
            .with_from(self.operator)
            .with_to(self.contract)
            .with_input(input)
    }

    async fn read(&self, input: Vec<u8>) -> Result<Bytes, ChainError> {
        self.provider
            .call(self.request(input.into()))
            .await
            .map_err(|err| ChainError::SimulationFailed(err.to_string()))
    }
}

#[async_trait]
impl ChainGateway for RpcChainGateway {
    async fn simulate(&self, call: &ContractCall) -> Result<(), ChainError> {
        let input = encode_call(call)?;
        match self.provider.call(self.request(input)).await {
            Ok(_) => Ok(()),
            Err(err) => {
                error!(function = call.function_name(), error = %err, "simulation failed");
                Err(ChainError::SimulationFailed(err.to_string()))
            }
        }
    }

    async fn submit(&self, call: &ContractCall) -> Result<B256, ChainError> {
        let input = encode_call(call)?;
        let pending = self
            .provider
            .send_transaction(self.request(input))
            .await
            .map_err(|err| {
                error!(function = call.function_name(), error = %err, "transaction not accepted");
                ChainError::TransactionReverted(err.to_string())
            })?;
        Ok(*pending.tx_hash())
    }

    async fn await_confirmations(
        &self,
        tx_hash: B256,
        confirmations: u64,
    ) -> Result<(), ChainError> {
        let deadline = Instant::now() + RECEIPT_DEADLINE;
        loop {
            let receipt = self
                .provider
                .get_transaction_receipt(tx_hash)
                .await
                .map_err(transport)?;

            if let Some(receipt) = receipt {
                if !receipt.status() {
                    error!(%tx_hash, "transaction reverted");
                    return Err(ChainError::TransactionReverted(tx_hash.to_string()));
                }
                let included = receipt
                    .block_number()
                    .ok_or_else(|| transport(format!("receipt for {tx_hash} has no block")))?;
                let head = self.provider.get_block_number().await.map_err(transport)?;
                let depth = head.saturating_sub(included) + 1;
                if depth >= confirmations {
                    debug!(%tx_hash, depth, "transaction confirmed");
                    return Ok(());
                }
            } else if Instant::now() >= deadline {
                error!(%tx_hash, "no receipt before deadline");
                return Err(ChainError::ConfirmationTimeout(tx_hash.to_string()));
            }

            tokio::time::sleep(CONFIRMATION_POLL_INTERVAL).await;
        }
    }

    async fn subscribe(&self, event: EventName) -> Result<LogStream, ChainError> {
        let filter = Filter::new()
            .address(self.contract)
            .event_signature(event_signature(event));
        let subscription = self
            .provider
            .subscribe_logs(&filter)
            .await
            .map_err(transport)?;

        let stream = subscription.into_stream().filter_map(move |log| async move {
            let decoded = decode_log(&log.inner.data);
            if decoded.is_none() {
                warn!(?event, "dropping undecodable contract log");
            }
            decoded.map(|event| vec![event])
        });
        Ok(Box::pin(stream))
    }

    async fn balance_of(&self, owner: Address) -> Result<u64, ChainError> {
        let output = self.read(balanceOfCall { owner }.abi_encode()).await?;
        let balance = U256::abi_decode(&output).map_err(transport)?;
        u64::try_from(balance).map_err(|_| transport(format!("balance {balance} out of range")))
    }

    async fn token_of_owner_by_index(
        &self,
        owner: Address,
        index: u64,
    ) -> Result<PetId, ChainError> {
        let output = self
            .read(
                tokenOfOwnerByIndexCall {
                    owner,
                    index: U256::from(index),
                }
                .abi_encode(),
            )
            .await?;
        let token_id = U256::abi_decode(&output).map_err(transport)?;
        u256_to_pet_id(token_id)
            .ok_or_else(|| transport(format!("token id {token_id} out of range")))
    }

    async fn token_uri(&self, token_id: PetId) -> Result<String, ChainError> {
        let output = self
            .read(
                tokenURICall {
                    tokenId: pet_id_to_u256(token_id)?,
                }
                .abi_encode(),
            )
            .await?;
        <(String,)>::abi_decode_params(&output)
            .map(|(uri,)| uri)
            .map_err(transport)
    }
}
