use rand::{rngs::OsRng, RngCore};

/// Entropy of verification and password-reset tokens.
pub const TOKEN_BYTES: usize = 16;

/// Opaque single-use token, hex-encoded (32 chars).
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
