//! Per-connection subscription manager.
//!
//! Tracks which resources a WebSocket client is subscribed to and
//! provides server-side update filtering.

use std::collections::BTreeSet;

use crate::domain::Resource;

/// Manages the set of resource subscriptions for a single WebSocket connection.
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    /// Subscribed resources. If `subscribe_all` is true, this set is ignored.
    resources: BTreeSet<Resource>,
    /// Whether the client subscribes to every resource (wildcard `"*"`).
    subscribe_all: bool,
}

impl SubscriptionManager {
    /// Creates a new empty subscription manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds resources to the subscription set. `wildcard` enables `"*"`.
    ///
    /// Returns the resources that were not already matched, which are the
    /// ones the client still needs a snapshot of.
    pub fn subscribe(&mut self, resources: &[Resource], wildcard: bool) -> Vec<Resource> {
        let wanted: Vec<Resource> = if wildcard {
            Resource::ALL.to_vec()
        } else {
            resources.to_vec()
        };
        let fresh: Vec<Resource> = wanted.into_iter().filter(|r| !self.matches(*r)).collect();
        if wildcard {
            self.subscribe_all = true;
        }
        self.resources.extend(fresh.iter().copied());
        fresh
    }

    /// Removes resources from the subscription set. Clears the wildcard
    /// when every resource is removed.
    pub fn unsubscribe(&mut self, resources: &[Resource], wildcard: bool) {
        if wildcard {
            self.subscribe_all = false;
            self.resources.clear();
            return;
        }
        for resource in resources {
            self.resources.remove(resource);
        }
        if self.subscribe_all {
            self.subscribe_all = false;
            self.resources = Resource::ALL
                .into_iter()
                .filter(|r| !resources.contains(r))
                .collect();
        }
    }

    /// Returns `true` if updates of `resource` go to this client.
    #[must_use]
    pub fn matches(&self, resource: Resource) -> bool {
        self.subscribe_all || self.resources.contains(&resource)
    }

    /// Returns the subscribed resources.
    #[must_use]
    pub fn subscribed(&self) -> Vec<Resource> {
        if self.subscribe_all {
            Resource::ALL.to_vec()
        } else {
            self.resources.iter().copied().collect()
        }
    }

    /// Returns `true` if the wildcard subscription is active.
    #[must_use]
    pub fn is_subscribed_all(&self) -> bool {
        self.subscribe_all
    }
}

/// Splits raw names into known resources, a wildcard flag, and unknown names.
#[must_use]
pub fn parse_resources(names: &[String]) -> (Vec<Resource>, bool, Vec<String>) {
    let mut resources = Vec::new();
    let mut wildcard = false;
    let mut unknown = Vec::new();
    for name in names {
        if name == "*" {
            wildcard = true;
        } else if let Ok(resource) = name.parse::<Resource>() {
            resources.push(resource);
        } else {
            unknown.push(name.clone());
        }
    }
    (resources, wildcard, unknown)
}
