// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::circuit_breaker::OnStateChange;
use super::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, OnStateChangeArgs};
use crate::{ERR_POISONED_LOCK, ResilienceContext};

/// Lazily creates and caches one [`CircuitBreaker`] per dependency name.
///
/// The registry is an ordinary value: create one per process (or per test) and pass it to
/// whoever needs breakers. Concurrent lookups of the same name always return the same
/// breaker instance.
///
/// # Examples
///
/// ```rust
/// # use std::sync::Arc;
/// # use tick::Clock;
/// use breakwater::ResilienceContext;
/// use breakwater::breaker::{CircuitBreakerConfig, CircuitBreakerRegistry};
///
/// # fn example(clock: Clock) {
/// let registry = CircuitBreakerRegistry::new(&ResilienceContext::new(&clock))
///     .with_defaults(CircuitBreakerConfig::default().failure_threshold(3));
///
/// let users = registry.get("users");
/// assert!(Arc::ptr_eq(&users, &registry.get("users")));
/// assert_eq!(users.config().failure_threshold, 3);
/// # }
/// ```
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
    defaults: CircuitBreakerConfig,
    context: ResilienceContext,
    on_state_change: Option<OnStateChange>,
}

impl CircuitBreakerRegistry {
    /// Creates an empty registry whose breakers use `context` and the default configuration.
    #[must_use]
    pub fn new(context: &ResilienceContext) -> Self {
        Self {
            breakers: RwLock::new(HashMap::new()),
            defaults: CircuitBreakerConfig::default(),
            context: context.clone(),
            on_state_change: None,
        }
    }

    /// Sets the configuration used by breakers created lazily through [`get`][Self::get].
    #[must_use]
    pub fn with_defaults(mut self, config: CircuitBreakerConfig) -> Self {
        self.defaults = config;
        self
    }

    /// Configures a state change callback installed on every breaker the registry creates.
    ///
    /// **Default**: None
    #[must_use]
    pub fn on_state_change(mut self, callback: impl Fn(OnStateChangeArgs<'_>) + Send + Sync + 'static) -> Self {
        self.on_state_change = Some(OnStateChange::new(callback));
        self
    }

    /// Returns the breaker for `name`, creating it with the default configuration if needed.
    #[must_use]
    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        self.get_or_create(name, self.defaults)
    }

    /// Returns the breaker for `name`, creating it with `config` if needed.
    ///
    /// An already registered breaker is returned unchanged; `config` is ignored in that case.
    #[must_use]
    pub fn register(&self, name: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        self.get_or_create(name, config)
    }

    /// Returns the names of all registered breakers, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.breakers.read().expect(ERR_POISONED_LOCK).keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Returns a snapshot of every registered breaker, sorted by name.
    #[must_use]
    pub fn stats(&self) -> Vec<CircuitBreakerStats> {
        let breakers: Vec<_> = self.breakers.read().expect(ERR_POISONED_LOCK).values().cloned().collect();

        let mut stats: Vec<_> = breakers.iter().map(|breaker| breaker.stats()).collect();
        stats.sort_unstable_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    fn get_or_create(&self, name: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.read().expect(ERR_POISONED_LOCK).get(name) {
            return Arc::clone(breaker);
        }

        let mut breakers = self.breakers.write().expect(ERR_POISONED_LOCK);

        // a concurrent caller may have created it between the two locks
        if let Some(breaker) = breakers.get(name) {
            return Arc::clone(breaker);
        }

        let breaker = Arc::new(
            CircuitBreaker::new(name.to_owned(), config, &self.context).with_on_state_change(self.on_state_change.clone()),
        );
        breakers.insert(name.to_owned(), Arc::clone(&breaker));
        breaker
    }
}
