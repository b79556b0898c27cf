use serde_json::{Map, Value};
use std::collections::BTreeSet;

use crate::resource::types::Verb;

/// A single capability that can be granted on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Ability {
    Get,
    Query,
    Create,
    Update,
    Delete,
}

impl Ability {
    pub const ALL: [Ability; 5] = [
        Ability::Get,
        Ability::Query,
        Ability::Create,
        Ability::Update,
        Ability::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Query => "query",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == raw)
    }
}

/// Abilities any one of which is enough to perform `verb`.
pub fn required_abilities(verb: Verb) -> &'static [Ability] {
    match verb {
        Verb::Get => &[Ability::Get, Ability::Query],
        Verb::Post => &[Ability::Create],
        Verb::Put => &[Ability::Update],
        Verb::Delete => &[Ability::Delete],
    }
}

/// The granted abilities on one resource. Anything not in the set is denied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet(BTreeSet<Ability>);

impl PermissionSet {
    pub fn of(abilities: &[Ability]) -> Self {
        Self(abilities.iter().copied().collect())
    }

    /// Granted on every collection, to everyone.
    pub fn collection_defaults() -> Self {
        Self::of(&[Ability::Create, Ability::Query])
    }

    /// Granted on an object that carries no `_acl`.
    pub fn object_defaults() -> Self {
        Self::of(&[Ability::Get, Ability::Update, Ability::Delete])
    }

    /// Union, over the principal's roles, of the abilities the ACL sets to `true` for that
    /// role. Unknown ability names and non-`true` values grant nothing.
    pub fn from_acl<'a>(acl: &Map<String, Value>, roles: impl IntoIterator<Item = &'a str>) -> Self {
        let mut granted = BTreeSet::new();
        for role in roles {
            let Some(Value::Object(entry)) = acl.get(role) else {
                continue;
            };
            for (name, value) in entry {
                if value == &Value::Bool(true)
                    && let Some(ability) = Ability::parse(name)
                {
                    granted.insert(ability);
                }
            }
        }
        Self(granted)
    }

    pub fn contains(&self, ability: Ability) -> bool {
        self.0.contains(&ability)
    }

    pub fn allows_verb(&self, verb: Verb) -> bool {
        required_abilities(verb).iter().any(|a| self.contains(*a))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
