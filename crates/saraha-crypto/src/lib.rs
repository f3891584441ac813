/// Saraha Crypto Library
///
/// - Password hashing with Argon2id at a configurable cost.
/// - AES-256-GCM encryption for fields stored at rest (phone numbers).

pub mod encrypt;
pub mod keys;
pub mod password;
