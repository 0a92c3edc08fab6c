//! Canonical context instances.

use super::{
    ContextChain, ContextOptions, ExecContext, FirebaseContext, PackTypeContext, UserContext,
};
use crate::core::BitpackError;
use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;

/// Deduplicates context values.
///
/// For each context kind a map from the context's content to the first
/// instance created for it. Establishing an equal context again returns that
/// same `Arc`. Entries are never evicted.
#[derive(Debug, Default)]
pub struct ContextRegistry {
    exec: DashMap<ExecContext, Arc<ExecContext>>,
    pack_type: DashMap<String, Arc<PackTypeContext>>,
    user: DashMap<String, Arc<UserContext>>,
    firebase: DashMap<String, Arc<FirebaseContext>>,
}

fn canonical<K: Eq + Hash, T>(map: &DashMap<K, Arc<T>>, key: K, context: T) -> Arc<T> {
    map.entry(key).or_insert_with(|| Arc::new(context)).value().clone()
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh chain with no contexts established.
    pub fn generate_context_chain(&self) -> ContextChain {
        ContextChain::default()
    }

    pub fn establish_exec(
        &self,
        chain: &mut ContextChain,
        options: &ContextOptions,
    ) -> Result<Arc<ExecContext>, BitpackError> {
        let context = ExecContext::from_options(options)?;
        let canonical = canonical(&self.exec, context.clone(), context);
        chain.set_exec(canonical.clone());
        Ok(canonical)
    }

    pub fn establish_pack_type(
        &self,
        chain: &mut ContextChain,
        pack_type: &str,
    ) -> Result<Arc<PackTypeContext>, BitpackError> {
        let context = PackTypeContext::new(pack_type)?;
        let canonical = canonical(&self.pack_type, context.context_key(), context);
        chain.set_pack_type(canonical.clone());
        Ok(canonical)
    }

    pub fn establish_user(&self, chain: &mut ContextChain, user_id: &str) -> Arc<UserContext> {
        let context = UserContext::new(user_id);
        let canonical = canonical(&self.user, context.context_key(), context);
        chain.set_user(canonical.clone());
        canonical
    }

    pub fn establish_firebase(
        &self,
        chain: &mut ContextChain,
        firebase_url: &str,
    ) -> Result<Arc<FirebaseContext>, BitpackError> {
        let context = FirebaseContext::new(firebase_url)?;
        let canonical = canonical(&self.firebase, context.context_key(), context);
        chain.set_firebase(canonical.clone());
        Ok(canonical)
    }
}
