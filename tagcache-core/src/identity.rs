//! Call identity, resolved once at wrap time.
//!
//! A cache entry written through one calling convention must be visible
//! through every other, so the identity of a wrapped computation is fixed
//! when the memoizer is built, not re-derived per call. The binding form
//! is a closed variant chosen at configuration time.

use std::fmt;

/// How the wrapped computation is bound to its owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Binding {
    /// A free function; identity is `module.name`.
    Free,
    /// Bound to an instance of a type; identity is `module.Type.name`.
    InstanceBound { type_name: String },
    /// Bound to the type itself (associated function); identity is
    /// `module.Type.name`, the same as the instance-bound form.
    TypeBound { type_name: String },
}

/// Identity of a wrapped computation.
///
/// Two memoizers with equal identities (and equal namespaces) share cache
/// entries. Instance-bound and type-bound forms of the same logical method
/// produce the same qualified identity on purpose: an entry written via
/// one calling form is a hit for the other.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    module: String,
    name: String,
    binding: Binding,
}

impl Identity {
    /// Identity for a free function.
    pub fn function(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
            binding: Binding::Free,
        }
    }

    /// Identity for a method called on an instance.
    pub fn instance_method(
        module: impl Into<String>,
        type_name: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
            binding: Binding::InstanceBound {
                type_name: type_name.into(),
            },
        }
    }

    /// Identity for an associated function called on the type.
    pub fn type_method(
        module: impl Into<String>,
        type_name: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
            binding: Binding::TypeBound {
                type_name: type_name.into(),
            },
        }
    }

    /// The fully-qualified identity string used in cache keys.
    pub fn qualified(&self) -> String {
        match &self.binding {
            Binding::Free => format!("{}.{}", self.module, self.name),
            Binding::InstanceBound { type_name } | Binding::TypeBound { type_name } => {
                format!("{}.{}.{}", self.module, type_name, self.name)
            }
        }
    }

    /// The binding form this identity was resolved with.
    pub fn binding(&self) -> &Binding {
        &self.binding
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_function_identity() {
        let id = Identity::function("billing", "add");
        assert_eq!(id.qualified(), "billing.add");
    }

    #[test]
    fn bound_forms_share_identity() {
        let on_instance = Identity::instance_method("billing", "Account", "balance");
        let on_type = Identity::type_method("billing", "Account", "balance");
        assert_eq!(on_instance.qualified(), on_type.qualified());
        assert_eq!(on_instance.qualified(), "billing.Account.balance");
    }

    #[test]
    fn display_matches_qualified() {
        let id = Identity::instance_method("m", "T", "f");
        assert_eq!(id.to_string(), id.qualified());
    }
}
