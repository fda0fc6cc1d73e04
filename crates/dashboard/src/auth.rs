//! Password hashing shared with the dashboard's login flow.
//!
//! The web application verifies logins with bcrypt, so stored hashes must stay
//! in the `$2b$` format at the cost it expects.

use bcrypt::BcryptError;

/// bcrypt work factor for stored passwords.
pub const PASSWORD_HASH_COST: u32 = 10;

pub fn hash_password(password: &str) -> Result<String, BcryptError> {
    bcrypt::hash(password, PASSWORD_HASH_COST)
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, BcryptError> {
    bcrypt::verify(password, hash)
}
