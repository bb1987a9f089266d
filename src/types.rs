//! Basic type definitions for the chat relay
//!
//! Provides newtype wrappers for type safety:
//! - `Identity`: authenticated participant handle
//! - `RoomCode`: short uppercase room code

use rand::Rng;

/// Alphabet room codes are drawn from.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Authenticated participant handle (newtype pattern)
///
/// Uniqueness is guaranteed by the identity store; the coordinator
/// treats the handle as opaque. Implements Hash and Eq for use in
/// membership sets and map keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(pub String);

impl Identity {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Room code (short uppercase identifier)
///
/// Used to identify and join chat rooms. Candidates are drawn randomly;
/// uniqueness among live rooms is enforced by the registry, which rechecks
/// each candidate against the live set before accepting it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomCode(pub String);

impl RoomCode {
    /// Draw a random candidate code of the given length
    ///
    /// The result is only a candidate: the caller must check it against
    /// the live-room set before use.
    pub fn candidate(length: usize) -> Self {
        let mut rng = rand::thread_rng();
        let code: String = (0..length)
            .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
            .collect();
        Self(code)
    }

    /// Create a RoomCode from a string (converts to uppercase)
    pub fn from_string(code: impl Into<String>) -> Self {
        Self(code.into().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_length() {
        let code = RoomCode::candidate(4);
        assert_eq!(code.0.len(), 4);
    }

    #[test]
    fn test_candidate_alphabet() {
        let code = RoomCode::candidate(32);
        assert!(code.0.bytes().all(|b| CODE_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_room_code_uppercase() {
        let code = RoomCode::from_string("abcd");
        assert_eq!(code.0, "ABCD");
    }

    #[test]
    fn test_identity_display() {
        let id = Identity::new("alice");
        assert_eq!(id.to_string(), "alice");
    }
}
