//! Personal-message signature recovery.

use adoptchain_core::error::AuthError;
use alloy_primitives::{Address, Signature, hex};

/// Recover the address that produced `signature` over `message` using the
/// EIP-191 personal-message prefix.
///
/// # Errors
///
/// Returns `AuthError::InvalidSignature` if the signature is not 65 bytes of
/// hex or does not recover to a valid key.
pub fn recover_signer(message: &str, signature: &str) -> Result<Address, AuthError> {
    let bytes = hex::decode(signature.trim()).map_err(|_| AuthError::InvalidSignature)?;
    let signature =
        Signature::try_from(bytes.as_slice()).map_err(|_| AuthError::InvalidSignature)?;
    signature
        .recover_address_from_msg(message.as_bytes())
        .map_err(|_| AuthError::InvalidSignature)
}

/// Check that `claimed` signed `message`.
///
/// # Errors
///
/// Returns `AuthError::InvalidSignature` if recovery fails or yields another
/// address.
pub fn verify_signed_message(
    claimed: Address,
    message: &str,
    signature: &str,
) -> Result<(), AuthError> {
    if recover_signer(message, signature)? == claimed {
        Ok(())
    } else {
        Err(AuthError::InvalidSignature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::signers::SignerSync;
    use alloy::signers::local::PrivateKeySigner;

    const KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    fn sign(message: &str) -> (Address, String) {
        let signer: PrivateKeySigner = KEY.parse().unwrap();
        let signature = signer.sign_message_sync(message.as_bytes()).unwrap();
        (signer.address(), hex::encode_prefixed(signature.as_bytes()))
    }

    #[test]
    fn test_recover_signer_returns_signing_address() {
        let (address, signature) = sign("Welcome to the shelter");

        assert_eq!(
            recover_signer("Welcome to the shelter", &signature).unwrap(),
            address
        );
    }

    #[test]
    fn test_verify_rejects_signature_over_other_message() {
        let (address, signature) = sign("message one");

        assert_eq!(
            verify_signed_message(address, "message two", &signature),
            Err(AuthError::InvalidSignature)
        );
    }

    #[test]
    fn test_verify_rejects_other_claimed_address() {
        let (_, signature) = sign("hello");

        assert_eq!(
            verify_signed_message(Address::repeat_byte(0x11), "hello", &signature),
            Err(AuthError::InvalidSignature)
        );
    }

    #[test]
    fn test_recover_rejects_garbage() {
        assert_eq!(
            recover_signer("hello", "0xdeadbeef"),
            Err(AuthError::InvalidSignature)
        );
        assert_eq!(
            recover_signer("hello", "not hex"),
            Err(AuthError::InvalidSignature)
        );
    }
}
