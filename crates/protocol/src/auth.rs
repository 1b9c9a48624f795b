use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::error::{ProtocolError, Result};

/// A 256-bit principal identifier, hex-encoded on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(pub [u8; 32]);

impl Address {
    pub const ZERO: Address = Address([0u8; 32]);

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)
            .map_err(|_| ProtocolError::InvalidInput("address must be hex-encoded".into()))?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ProtocolError::InvalidInput("address must be 32 bytes".into()))?;
        Ok(Address(array))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({}..)", hex::encode(&self.0[..4]))
    }
}

/// Capability map for one protocol component: an owner, two independent
/// allow-lists, and one privileged root submitter. Checked once per entry
/// point; the owner passes every check.
#[derive(Clone, Debug)]
pub struct AccessControl {
    owner: Address,
    inserters: HashSet<Address>,
    spenders: HashSet<Address>,
    root_submitter: Address,
}

impl AccessControl {
    pub fn new(owner: Address, root_submitter: Address) -> Self {
        Self {
            owner,
            inserters: HashSet::new(),
            spenders: HashSet::new(),
            root_submitter,
        }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn root_submitter(&self) -> Address {
        self.root_submitter
    }

    pub fn require_owner(&self, caller: Address) -> Result<()> {
        if caller != self.owner {
            return Err(ProtocolError::Unauthorized("caller is not the owner"));
        }
        Ok(())
    }

    pub fn require_inserter(&self, caller: Address) -> Result<()> {
        if caller != self.owner && !self.inserters.contains(&caller) {
            return Err(ProtocolError::Unauthorized(
                "caller may not insert commitments",
            ));
        }
        Ok(())
    }

    pub fn require_spender(&self, caller: Address) -> Result<()> {
        if caller != self.owner && !self.spenders.contains(&caller) {
            return Err(ProtocolError::Unauthorized(
                "caller may not mark nullifiers spent",
            ));
        }
        Ok(())
    }

    pub fn require_root_submitter(&self, caller: Address) -> Result<()> {
        if caller != self.owner && caller != self.root_submitter {
            return Err(ProtocolError::Unauthorized(
                "caller may not submit roots",
            ));
        }
        Ok(())
    }

    pub fn allow_inserter(&mut self, caller: Address, who: Address) -> Result<()> {
        self.require_owner(caller)?;
        self.inserters.insert(who);
        Ok(())
    }

    pub fn revoke_inserter(&mut self, caller: Address, who: Address) -> Result<()> {
        self.require_owner(caller)?;
        self.inserters.remove(&who);
        Ok(())
    }

    pub fn allow_spender(&mut self, caller: Address, who: Address) -> Result<()> {
        self.require_owner(caller)?;
        self.spenders.insert(who);
        Ok(())
    }

    pub fn revoke_spender(&mut self, caller: Address, who: Address) -> Result<()> {
        self.require_owner(caller)?;
        self.spenders.remove(&who);
        Ok(())
    }

    pub fn set_root_submitter(&mut self, caller: Address, who: Address) -> Result<()> {
        self.require_owner(caller)?;
        self.root_submitter = who;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address([byte; 32])
    }

    #[test]
    fn owner_passes_every_check() {
        let acl = AccessControl::new(addr(1), addr(2));
        assert!(acl.require_owner(addr(1)).is_ok());
        assert!(acl.require_inserter(addr(1)).is_ok());
        assert!(acl.require_spender(addr(1)).is_ok());
        assert!(acl.require_root_submitter(addr(1)).is_ok());
    }

    #[test]
    fn allow_lists_are_independent() {
        let mut acl = AccessControl::new(addr(1), addr(2));
        acl.allow_inserter(addr(1), addr(3)).unwrap();

        assert!(acl.require_inserter(addr(3)).is_ok());
        assert_eq!(
            acl.require_spender(addr(3)),
            Err(ProtocolError::Unauthorized(
                "caller may not mark nullifiers spent"
            ))
        );
    }

    #[test]
    fn only_owner_mutates_roles() {
        let mut acl = AccessControl::new(addr(1), addr(2));
        assert!(acl.allow_inserter(addr(3), addr(3)).is_err());
        assert!(acl.set_root_submitter(addr(2), addr(2)).is_err());

        acl.set_root_submitter(addr(1), addr(4)).unwrap();
        assert!(acl.require_root_submitter(addr(4)).is_ok());
        assert!(acl.require_root_submitter(addr(2)).is_err());
    }

    #[test]
    fn address_hex_roundtrip() {
        let a = addr(0xAB);
        let parsed = Address::from_hex(&a.to_hex()).unwrap();
        assert_eq!(a, parsed);
        assert!(Address::from_hex("abcd").is_err());
        assert!(Address::ZERO.is_zero());
    }
}
