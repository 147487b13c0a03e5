//! Test fixtures and helpers.
//!
//! Common setup code for integration tests. A [`Controller`] plays the role
//! of the key holder: it regenerates every key from a phrase and drives a
//! kernel through inception and rotation.

use keri_kernel::{Kernel, KernelConfig, Result};
use keri_kernel_core::{
    sign, Blake3Hash, Credential, CredentialBuilder, Ed25519PublicKey, IndexedSignature,
    KeyChain, KeyConfig, KeyEvent, KeyEventLog, KeySet, Keypair, Prefix, RegistryId, Said,
    Signable,
};
use keri_kernel_store::{MemoryStore, Store};
use serde_json::json;

/// A key holder driven by a recovery phrase.
#[derive(Debug)]
pub struct Controller {
    chain: KeyChain,
    /// Establishment events applied so far, not counting inception.
    rotation: u32,
    prefix: Option<Prefix>,
}

impl Controller {
    /// A controller with one key per rotation.
    pub fn new(phrase: &str) -> Result<Self> {
        Ok(Self {
            chain: KeyChain::new(phrase)?,
            rotation: 0,
            prefix: None,
        })
    }

    /// A controller with `key_count` keys per rotation.
    pub fn multi_key(phrase: &str, key_count: u32) -> Result<Self> {
        Ok(Self {
            chain: KeyChain::with_options(phrase, "signing", key_count)?,
            rotation: 0,
            prefix: None,
        })
    }

    /// The identifier, once incepted.
    pub fn prefix(&self) -> Option<&Prefix> {
        self.prefix.as_ref()
    }

    pub fn rotation(&self) -> u32 {
        self.rotation
    }

    /// Keys in force now.
    pub fn key_set(&self) -> Result<KeySet> {
        Ok(self.chain.key_set(self.rotation)?)
    }

    /// Current signing keypairs.
    pub fn signers(&self) -> Result<Vec<Keypair>> {
        Ok(self.key_set()?.signers)
    }

    /// Sign with every current key.
    pub fn sign<T: Signable + ?Sized>(&self, item: &T) -> Result<Vec<IndexedSignature>> {
        Ok(sign(item, &self.signers()?)?)
    }

    /// Establishment config for inception.
    pub fn inception_config(&self) -> Result<KeyConfig> {
        let keys = self.chain.key_set(0)?;
        Ok(KeyConfig::new(keys.current, keys.next_digests))
    }

    /// Config and revealed keys for the next rotation.
    pub fn rotation_config(&self) -> Result<(KeyConfig, Vec<Ed25519PublicKey>)> {
        let now = self.key_set()?;
        let next = self.chain.key_set(self.rotation + 1)?;
        Ok((KeyConfig::new(next.current, next.next_digests), now.next))
    }

    /// Incept through a kernel.
    pub async fn incept<S: Store>(&mut self, kernel: &Kernel<S>) -> Result<KeyEvent> {
        let icp = kernel.create_identifier(self.inception_config()?).await?;
        self.prefix = Some(icp.prefix().clone());
        self.rotation = 0;
        Ok(icp)
    }

    /// Rotate through a kernel.
    pub async fn rotate<S: Store>(&mut self, kernel: &Kernel<S>) -> Result<KeyEvent> {
        let prefix = self.incepted()?;
        let (config, revealed) = self.rotation_config()?;
        let rot = kernel.rotate(&prefix, config, &revealed).await?;
        self.rotation += 1;
        Ok(rot)
    }

    /// Build a KEL offline: inception, then `interactions` interactions.
    ///
    /// Does not change the controller; useful for import tests.
    pub fn offline_kel(&self, interactions: usize) -> Result<KeyEventLog> {
        let mut kel = KeyEventLog::new();
        kel.incept(self.inception_config()?)?;
        for _ in 0..interactions {
            kel.interact(Vec::new())?;
        }
        Ok(kel)
    }

    fn incepted(&self) -> Result<Prefix> {
        self.prefix.clone().ok_or_else(|| {
            keri_kernel::KernelError::InvalidOperation("controller is not incepted".into())
        })
    }
}

/// A kernel over a fresh memory store with default config.
pub fn memory_kernel() -> Kernel<MemoryStore> {
    Kernel::new(MemoryStore::new(), KernelConfig::default())
}

/// Controllers with distinct phrases for multi-party tests.
pub fn multi_party_controllers(count: usize) -> Result<Vec<Controller>> {
    (0..count)
        .map(|i| Controller::new(&format!("party {} test phrase", i)))
        .collect()
}

/// A stand-in schema SAID.
pub fn schema_said(name: &str) -> Said {
    Said::from_digest(&Blake3Hash::hash(name.as_bytes()))
}

/// A small credential from `issuer` in `registry`.
pub fn sample_credential(
    issuer: &Prefix,
    registry: &RegistryId,
    holder: Option<&Prefix>,
) -> Result<Credential> {
    let mut builder = CredentialBuilder::new(issuer.clone(), schema_said("sample"))
        .registry(registry.clone())
        .attribute("name", json!("Sample Holder"))
        .attribute("level", json!(3));
    if let Some(holder) = holder {
        builder = builder.holder(holder.clone());
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use keri_kernel_core::keys::next_key_digests;

    #[tokio::test]
    async fn test_controller_incept_and_rotate() {
        let kernel = memory_kernel();
        let mut controller = Controller::new("alpha beta gamma").unwrap();

        let icp = controller.incept(&kernel).await.unwrap();
        let rot = controller.rotate(&kernel).await.unwrap();

        assert_eq!(rot.sn(), 1);
        assert_eq!(rot.prior(), Some(icp.said()));
        let state = kernel.key_state(icp.prefix()).await.unwrap();
        assert_eq!(state.current_keys, controller.key_set().unwrap().current);
    }

    #[test]
    fn test_rotation_config_reveals_commitment() {
        let controller = Controller::multi_key("alpha beta gamma", 2).unwrap();
        let committed = controller.inception_config().unwrap().next_key_digests;
        let (_, revealed) = controller.rotation_config().unwrap();
        assert_eq!(next_key_digests(&revealed), committed);
    }

    #[test]
    fn test_offline_kel() {
        let controller = Controller::new("alpha beta gamma").unwrap();
        let kel = controller.offline_kel(3).unwrap();
        assert_eq!(kel.len(), 4);
        assert_eq!(kel.state().unwrap().sn, 3);
    }

    #[test]
    fn test_multi_party() {
        let parties = multi_party_controllers(3).unwrap();
        let keys: Vec<_> = parties
            .iter()
            .map(|p| p.key_set().unwrap().current[0])
            .collect();
        assert_ne!(keys[0], keys[1]);
        assert_ne!(keys[1], keys[2]);
        assert_ne!(keys[0], keys[2]);
    }
}
