//! Protocol dispatch.
//!
//! A [`Protocol`] evaluates operations of one kind. Protocols are found by
//! [`ProtocolKey`] (operation tag plus declared result kind) in immutable
//! [`ProtocolFactory`] tables, and a [`ProtocolChain`] consults an ordered
//! list of such sources, first hit wins. Host applications plug in their
//! own operation kinds, or shadow built-in ones, by putting a source ahead
//! of the built-ins.

pub mod builtin;

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tabulon_model::{Operation, OperationTag, Value, ValueKind};
use tracing::trace;

use crate::context::EvalContext;
use crate::error::EvalError;

// ──────────────────────────────────────────────
// Protocol
// ──────────────────────────────────────────────

/// Evaluates one or more operation kinds.
///
/// `execute` is the blocking path and `execute_async` the suspension-capable
/// one; both must give the same result for the same operation and context.
/// Leaf protocols only implement `execute`: the async default delegates to
/// it. Protocols that evaluate child operations or read other cells should
/// override `execute_async` and go through the async methods of
/// [`EvalContext`], so the whole evaluation can yield.
///
/// Returning [`EvalError::Aborted`] or [`EvalError::NotApplicable`] signals
/// that the cell has no answer; any other non-fatal error is recorded as a
/// failure of the cell being evaluated.
#[async_trait]
pub trait Protocol: Send + Sync {
    fn execute(&self, op: &Operation, cx: &EvalContext<'_>) -> Result<Value, EvalError>;

    async fn execute_async(
        &self,
        op: &Operation,
        cx: &EvalContext<'_>,
    ) -> Result<Value, EvalError> {
        self.execute(op, cx)
    }
}

/// Registry key: what kind of operation, producing what kind of value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProtocolKey {
    pub tag: OperationTag,
    pub result: ValueKind,
}

impl ProtocolKey {
    pub fn new(tag: OperationTag, result: ValueKind) -> Self {
        ProtocolKey { tag, result }
    }

    pub fn of(op: &Operation) -> Self {
        ProtocolKey {
            tag: op.tag(),
            result: op.result_kind(),
        }
    }

    /// Key for a host-defined operation kind.
    pub fn custom(name: impl Into<String>, result: ValueKind) -> Self {
        ProtocolKey {
            tag: OperationTag::Custom(name.into()),
            result,
        }
    }
}

impl fmt::Display for ProtocolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.tag, self.result)
    }
}

/// Something that can map a key to a protocol.
pub trait ProtocolSource: Send + Sync {
    fn lookup(&self, key: &ProtocolKey) -> Option<Arc<dyn Protocol>>;
}

// ──────────────────────────────────────────────
// ProtocolFactory
// ──────────────────────────────────────────────

/// What a builder does when a key is registered twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegistrationPolicy {
    /// Keep the first registration, ignore later ones.
    #[default]
    Skip,
}

/// Immutable protocol table.
pub struct ProtocolFactory {
    name: String,
    protocols: HashMap<ProtocolKey, Arc<dyn Protocol>>,
}

impl ProtocolFactory {
    pub fn builder(name: impl Into<String>) -> ProtocolFactoryBuilder {
        ProtocolFactoryBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.protocols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.protocols.is_empty()
    }

    pub fn contains(&self, key: &ProtocolKey) -> bool {
        self.protocols.contains_key(key)
    }
}

impl ProtocolSource for ProtocolFactory {
    fn lookup(&self, key: &ProtocolKey) -> Option<Arc<dyn Protocol>> {
        self.protocols.get(key).cloned()
    }
}

impl fmt::Debug for ProtocolFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<String> = self.protocols.keys().map(ToString::to_string).collect();
        keys.sort();
        f.debug_struct("ProtocolFactory")
            .field("name", &self.name)
            .field("keys", &keys)
            .finish()
    }
}

/// Builds a [`ProtocolFactory`], enforcing the registration policy.
pub struct ProtocolFactoryBuilder {
    name: String,
    policy: RegistrationPolicy,
    protocols: HashMap<ProtocolKey, Arc<dyn Protocol>>,
}

impl ProtocolFactoryBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        ProtocolFactoryBuilder {
            name: name.into(),
            policy: RegistrationPolicy::default(),
            protocols: HashMap::new(),
        }
    }

    pub fn policy(&self) -> RegistrationPolicy {
        self.policy
    }

    pub fn register(mut self, key: ProtocolKey, protocol: Arc<dyn Protocol>) -> Self {
        match self.policy {
            RegistrationPolicy::Skip => {
                if self.protocols.contains_key(&key) {
                    trace!(factory = %self.name, key = %key, "protocol already registered, skipping");
                } else {
                    self.protocols.insert(key, protocol);
                }
            }
        }
        self
    }

    /// Register one protocol under several operation tags for one result kind.
    pub fn register_tags(
        self,
        tags: &[OperationTag],
        result: &ValueKind,
        protocol: Arc<dyn Protocol>,
    ) -> Self {
        tags.iter().fold(self, |builder, tag| {
            builder.register(
                ProtocolKey::new(tag.clone(), result.clone()),
                Arc::clone(&protocol),
            )
        })
    }

    pub fn build(self) -> ProtocolFactory {
        ProtocolFactory {
            name: self.name,
            protocols: self.protocols,
        }
    }
}

// ──────────────────────────────────────────────
// ProtocolChain
// ──────────────────────────────────────────────

/// Ordered protocol sources; the first one that knows a key wins.
#[derive(Clone, Default)]
pub struct ProtocolChain {
    sources: Vec<Arc<dyn ProtocolSource>>,
}

impl ProtocolChain {
    pub fn new(sources: Vec<Arc<dyn ProtocolSource>>) -> Self {
        ProtocolChain { sources }
    }

    /// Host sources first, then the built-in tables for `kinds`.
    pub fn with_builtins(host: &[Arc<dyn ProtocolSource>], kinds: &[ValueKind]) -> Self {
        let mut sources = host.to_vec();
        sources.extend(
            kinds
                .iter()
                .map(|kind| builtin::factory_for(kind) as Arc<dyn ProtocolSource>),
        );
        ProtocolChain { sources }
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn resolve(&self, key: &ProtocolKey) -> Result<Arc<dyn Protocol>, EvalError> {
        self.sources
            .iter()
            .find_map(|source| source.lookup(key))
            .ok_or_else(|| EvalError::ProtocolNotFound {
                tag: key.tag.clone(),
                result: key.result.clone(),
            })
    }
}

impl ProtocolSource for ProtocolChain {
    fn lookup(&self, key: &ProtocolKey) -> Option<Arc<dyn Protocol>> {
        self.sources.iter().find_map(|source| source.lookup(key))
    }
}

impl fmt::Debug for ProtocolChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolChain")
            .field("sources", &self.sources.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(i64);

    impl Protocol for Fixed {
        fn execute(&self, _op: &Operation, _cx: &EvalContext<'_>) -> Result<Value, EvalError> {
            Ok(Value::Int(self.0))
        }
    }

    #[test]
    fn first_registration_wins() {
        let key = ProtocolKey::custom("rate", ValueKind::INT);
        let one: Arc<dyn Protocol> = Arc::new(Fixed(1));
        let factory = ProtocolFactory::builder("host")
            .register(key.clone(), Arc::clone(&one))
            .register(key.clone(), Arc::new(Fixed(2)))
            .build();
        assert_eq!(factory.len(), 1);
        assert!(Arc::ptr_eq(&factory.lookup(&key).unwrap(), &one));
    }

    #[test]
    fn chain_consults_sources_in_order() {
        let key = ProtocolKey::custom("rate", ValueKind::INT);
        let other = ProtocolKey::custom("other", ValueKind::INT);
        let ten: Arc<dyn Protocol> = Arc::new(Fixed(10));
        let thirty: Arc<dyn Protocol> = Arc::new(Fixed(30));
        let first: Arc<dyn ProtocolSource> = Arc::new(
            ProtocolFactory::builder("first")
                .register(key.clone(), Arc::clone(&ten))
                .build(),
        );
        let second: Arc<dyn ProtocolSource> = Arc::new(
            ProtocolFactory::builder("second")
                .register(key.clone(), Arc::new(Fixed(20)))
                .register(other.clone(), Arc::clone(&thirty))
                .build(),
        );
        let chain = ProtocolChain::new(vec![first, second]);
        assert!(Arc::ptr_eq(&chain.resolve(&key).unwrap(), &ten));
        assert!(Arc::ptr_eq(&chain.resolve(&other).unwrap(), &thirty));
    }

    #[test]
    fn missing_key_names_tag_and_kind() {
        let chain = ProtocolChain::default();
        let err = chain
            .resolve(&ProtocolKey::custom("rate", ValueKind::DECIMAL))
            .err()
            .unwrap();
        assert_eq!(
            err,
            EvalError::ProtocolNotFound {
                tag: OperationTag::Custom("rate".into()),
                result: ValueKind::DECIMAL,
            }
        );
    }

    #[test]
    fn builtins_cover_default_kinds() {
        let chain = ProtocolChain::with_builtins(&[], &ValueKind::default_supported());
        for kind in ValueKind::default_supported() {
            assert!(chain
                .resolve(&ProtocolKey::new(OperationTag::GetConst, kind.clone()))
                .is_ok());
        }
        assert!(chain
            .resolve(&ProtocolKey::new(OperationTag::Sum, ValueKind::DECIMAL))
            .is_ok());
        assert!(chain
            .resolve(&ProtocolKey::new(OperationTag::Sum, ValueKind::TEXT))
            .is_err());
    }
}
