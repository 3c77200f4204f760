//! Session token minter port.

use parley_types::error::MintError;

/// Produces the opaque token stored on a session for every write cycle.
///
/// The engine never looks inside the token.
pub trait TokenMinter: Send + Sync {
    fn mint(&self) -> Result<String, MintError>;
}
