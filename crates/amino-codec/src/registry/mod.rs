//! Type identity registry.
//!
//! Holds every named declaration, the registered interfaces and the
//! registered concrete types with their binary identities and type URLs.
//! The registry is populated during initialization and then sealed; once
//! sealed, reads are served from a frozen snapshot without locking.

pub mod identity;

use std::sync::Arc;

use log::{debug, trace};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::model::TypeDecl;

pub use identity::{
    type_url, BinaryIdentity, DisambBytes, PrefixBytes, WireIdentity, DISFIX_MARKER,
    DISFIX_WIRE_LEN,
};

/// Options for [`Registry::register_interface`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterfaceOptions {
    /// Always write the disambiguated identity for implementers, and refuse
    /// prefix-only identities on decode.
    pub always_disambiguate: bool,
}

impl InterfaceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn always_disambiguate(mut self) -> Self {
        self.always_disambiguate = true;
        self
    }
}

/// Options for [`Registry::register_concrete`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConcreteOptions {
    /// Interfaces the concrete type may be stored in.
    pub implements: Vec<String>,
    /// Use `/name` instead of `name` as the type URL.
    pub slash_prefixed_url: bool,
}

impl ConcreteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.implements.push(interface.into());
        self
    }

    pub fn slash_prefixed_url(mut self) -> Self {
        self.slash_prefixed_url = true;
        self
    }
}

/// A registered concrete type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcreteEntry {
    /// Declared type name.
    pub type_name: String,
    /// Registered name, globally unique.
    pub name: String,
    pub identity: BinaryIdentity,
    pub type_url: String,
    pub interfaces: Vec<String>,
}

impl ConcreteEntry {
    pub fn implements(&self, interface: &str) -> bool {
        self.interfaces.iter().any(|i| i == interface)
    }
}

/// A registered interface.
#[derive(Debug, Clone, Default)]
pub struct InterfaceEntry {
    pub name: String,
    pub always_disambiguate: bool,
    implementers: FxHashMap<PrefixBytes, Vec<Arc<ConcreteEntry>>>,
}

impl InterfaceEntry {
    /// Returns the implementers sharing `prefix`.
    pub fn implementers(&self, prefix: &PrefixBytes) -> &[Arc<ConcreteEntry>] {
        self.implementers
            .get(prefix)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Returns the number of registered implementers.
    pub fn implementer_count(&self) -> usize {
        self.implementers.values().map(Vec::len).sum()
    }
}

#[derive(Debug, Clone, Default)]
struct RegistryState {
    decls: FxHashMap<String, Arc<TypeDecl>>,
    interfaces: FxHashMap<String, InterfaceEntry>,
    by_type: FxHashMap<String, Arc<ConcreteEntry>>,
    by_name: FxHashMap<String, Arc<ConcreteEntry>>,
    by_url: FxHashMap<String, Arc<ConcreteEntry>>,
    by_identity: FxHashMap<BinaryIdentity, Arc<ConcreteEntry>>,
    by_prefix: FxHashMap<PrefixBytes, Vec<Arc<ConcreteEntry>>>,
}

impl RegistryState {
    fn ensure_undeclared(&self, name: &str) -> Result<()> {
        if self.decls.contains_key(name) {
            return Err(Error::DuplicateRegistration {
                name: name.to_string(),
            });
        }
        Ok(())
    }
}

/// Registry of declarations, interfaces and concrete types.
#[derive(Debug, Default)]
pub struct Registry {
    state: RwLock<RegistryState>,
    sealed: OnceCell<Arc<RegistryState>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the given declarations. Later duplicates
    /// replace earlier ones.
    pub fn with_declarations(decls: impl IntoIterator<Item = TypeDecl>) -> Self {
        let state = RegistryState {
            decls: decls
                .into_iter()
                .map(|decl| (decl.name.clone(), Arc::new(decl)))
                .collect(),
            ..RegistryState::default()
        };
        Self {
            state: RwLock::new(state),
            sealed: OnceCell::new(),
        }
    }

    // =========================================================================
    // REGISTRATION
    // =========================================================================

    /// Declares a named type without registering it under a name.
    ///
    /// Interfaces declared this way get default [`InterfaceOptions`].
    pub fn declare(&self, decl: TypeDecl) -> Result<()> {
        if decl.is_interface() {
            return self.register_interface(&decl.name, InterfaceOptions::default());
        }
        let mut state = self.state.write();
        self.ensure_unsealed()?;
        state.ensure_undeclared(&decl.name)?;
        debug!("declared type {}", decl.name);
        state.decls.insert(decl.name.clone(), Arc::new(decl));
        Ok(())
    }

    /// Declares and registers an interface type.
    pub fn register_interface(&self, name: &str, options: InterfaceOptions) -> Result<()> {
        let mut state = self.state.write();
        self.ensure_unsealed()?;
        state.ensure_undeclared(name)?;

        state
            .decls
            .insert(name.to_string(), Arc::new(TypeDecl::interface(name)));
        state.interfaces.insert(
            name.to_string(),
            InterfaceEntry {
                name: name.to_string(),
                always_disambiguate: options.always_disambiguate,
                implementers: FxHashMap::default(),
            },
        );
        debug!(
            "registered interface {} (always_disambiguate={})",
            name, options.always_disambiguate
        );
        Ok(())
    }

    /// Declares `decl` and registers it as a concrete type under `name`.
    pub fn register_concrete(
        &self,
        decl: TypeDecl,
        name: &str,
        options: ConcreteOptions,
    ) -> Result<Arc<ConcreteEntry>> {
        if decl.is_interface() {
            return Err(Error::unsupported(&decl.name, "interfaces cannot be concrete types"));
        }
        if name.is_empty() {
            return Err(Error::MalformedIdentity(
                "registered name must not be empty".to_string(),
            ));
        }

        let mut state = self.state.write();
        self.ensure_unsealed()?;
        state.ensure_undeclared(&decl.name)?;
        if state.by_name.contains_key(name) {
            return Err(Error::DuplicateRegistration {
                name: name.to_string(),
            });
        }
        for interface in &options.implements {
            if !state.interfaces.contains_key(interface) {
                return Err(Error::UnknownType(format!(
                    "interface {} is not registered",
                    interface
                )));
            }
        }

        let identity = BinaryIdentity::from_name(name);
        let url = type_url(name, options.slash_prefixed_url);

        if let Some(existing) = state.by_url.get(&url) {
            return Err(Error::IdentityCollision {
                name: name.to_string(),
                existing: existing.name.clone(),
                identity: format!("type URL {}", url),
            });
        }
        if let Some(existing) = state.by_identity.get(&identity) {
            return Err(Error::IdentityCollision {
                name: name.to_string(),
                existing: existing.name.clone(),
                identity: format!("identity {}", identity),
            });
        }
        for interface in &options.implements {
            let entry = &state.interfaces[interface];
            if entry.always_disambiguate {
                continue;
            }
            if let Some(existing) = entry.implementers(&identity.prefix).first() {
                return Err(Error::IdentityCollision {
                    name: name.to_string(),
                    existing: existing.name.clone(),
                    identity: format!("prefix {:02X?} under interface {}", identity.prefix, interface),
                });
            }
        }

        let entry = Arc::new(ConcreteEntry {
            type_name: decl.name.clone(),
            name: name.to_string(),
            identity,
            type_url: url,
            interfaces: options.implements.clone(),
        });

        for interface in &options.implements {
            if let Some(iface) = state.interfaces.get_mut(interface) {
                iface
                    .implementers
                    .entry(identity.prefix)
                    .or_default()
                    .push(entry.clone());
            }
        }
        state.by_prefix.entry(identity.prefix).or_default().push(entry.clone());
        state.by_identity.insert(identity, entry.clone());
        state.by_url.insert(entry.type_url.clone(), entry.clone());
        state.by_name.insert(name.to_string(), entry.clone());
        state.by_type.insert(decl.name.clone(), entry.clone());
        state.decls.insert(decl.name.clone(), Arc::new(decl));

        debug!(
            "registered concrete {} as {:?} (identity {}, url {})",
            entry.type_name, entry.name, entry.identity, entry.type_url
        );
        Ok(entry)
    }

    /// Makes the registry read-only. Idempotent.
    pub fn seal(&self) {
        let mut state = self.state.write();
        if self.sealed.get().is_some() {
            return;
        }
        let snapshot = std::mem::take(&mut *state);
        debug!(
            "sealed registry: {} declarations, {} concrete types",
            snapshot.decls.len(),
            snapshot.by_type.len()
        );
        // The write lock is held, so no other seal can race this set.
        let _ = self.sealed.set(Arc::new(snapshot));
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.get().is_some()
    }

    fn ensure_unsealed(&self) -> Result<()> {
        if self.is_sealed() {
            return Err(Error::RegistrySealed);
        }
        Ok(())
    }

    // =========================================================================
    // LOOKUP
    // =========================================================================

    fn read<R>(&self, f: impl FnOnce(&RegistryState) -> R) -> R {
        if let Some(state) = self.sealed.get() {
            return f(state);
        }
        let guard = self.state.read();
        // Sealing may have emptied the live state before the read lock was taken.
        if let Some(state) = self.sealed.get() {
            return f(state);
        }
        f(&guard)
    }

    /// Returns the declaration of `name`.
    pub fn decl(&self, name: &str) -> Option<Arc<TypeDecl>> {
        self.read(|s| s.decls.get(name).cloned())
    }

    /// Returns the registered interface `name`.
    pub fn interface(&self, name: &str) -> Option<InterfaceEntry> {
        self.read(|s| s.interfaces.get(name).cloned())
    }

    /// Returns the concrete entry of a declared type, if registered.
    pub fn concrete_by_type(&self, type_name: &str) -> Option<Arc<ConcreteEntry>> {
        self.read(|s| s.by_type.get(type_name).cloned())
    }

    /// Returns the concrete entry registered under `name`.
    pub fn concrete_by_name(&self, name: &str) -> Option<Arc<ConcreteEntry>> {
        self.read(|s| s.by_name.get(name).cloned())
    }

    /// Resolves a JSON type URL.
    pub fn resolve_by_url(&self, url: &str) -> Result<Arc<ConcreteEntry>> {
        if url.is_empty() {
            return Err(Error::MalformedIdentity("empty type URL".to_string()));
        }
        let entry = self
            .read(|s| s.by_url.get(url).cloned())
            .ok_or_else(|| Error::UnknownType(format!("unrecognized type URL {:?}", url)))?;
        trace!("resolved type URL {} to {}", url, entry.type_name);
        Ok(entry)
    }

    /// Resolves a binary identity.
    ///
    /// With `interface` set, only its implementers are candidates, and a
    /// prefix-only identity is refused when the interface always
    /// disambiguates. Without it, every registered concrete type is a
    /// candidate.
    pub fn resolve_by_binary_identity(
        &self,
        interface: Option<&str>,
        prefix: PrefixBytes,
        disamb: Option<DisambBytes>,
    ) -> Result<Arc<ConcreteEntry>> {
        let entry = self.read(|s| -> Result<Arc<ConcreteEntry>> {
            let candidates: &[Arc<ConcreteEntry>] = match interface {
                Some(name) => {
                    let iface = s.interfaces.get(name).ok_or_else(|| {
                        Error::UnknownType(format!("interface {} is not registered", name))
                    })?;
                    if iface.always_disambiguate && disamb.is_none() {
                        return Err(Error::UnknownType(format!(
                            "interface {} requires disambiguated identities, got prefix {:02X?}",
                            name, prefix
                        )));
                    }
                    iface.implementers(&prefix)
                }
                None => s.by_prefix.get(&prefix).map(Vec::as_slice).unwrap_or(&[]),
            };

            let found = match disamb {
                Some(disamb) => candidates.iter().find(|c| c.identity.disamb == disamb),
                None if candidates.len() > 1 => {
                    return Err(Error::UnknownType(format!(
                        "prefix {:02X?} is ambiguous without disambiguation bytes",
                        prefix
                    )));
                }
                None => candidates.first(),
            };
            found.cloned().ok_or_else(|| {
                Error::UnknownType(format!(
                    "no concrete type registered for prefix {:02X?} disamb {:02X?}",
                    prefix, disamb
                ))
            })
        })?;
        trace!("resolved binary identity {} to {}", entry.identity, entry.type_name);
        Ok(entry)
    }

    /// Returns true when `entry` must carry its disambiguated identity
    /// inside `interface`.
    pub fn needs_disambiguation(&self, interface: &str, entry: &ConcreteEntry) -> bool {
        self.read(|s| match s.interfaces.get(interface) {
            Some(iface) => {
                iface.always_disambiguate || iface.implementers(&entry.identity.prefix).len() > 1
            }
            None => false,
        })
    }
}
