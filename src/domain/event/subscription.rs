//! Event type subscriptions.
//!
//! A [`Subscription`] is an immutable set of event type patterns stored as a
//! segment trie. A pattern segment is either a literal, `?` (exactly one
//! segment) or `*` (any number of trailing segments, only allowed last).
//!
//! Inserting `*` at a node discards everything below that node, so the trie
//! always holds the minimal set of patterns; [`Subscription::query_types`]
//! reads that set back and is what gets requested from the event bus.

use std::collections::BTreeMap;

use crate::domain::foundation::ValidationError;

use super::EventType;

/// Set of event type patterns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subscription {
    root: Node,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Node {
    terminal: bool,
    any_tail: bool,
    children: BTreeMap<String, Node>,
}

impl Subscription {
    /// Builds a subscription from patterns.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if a pattern has an empty segment or a `*`
    /// that is not its last segment.
    pub fn new<I>(patterns: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = EventType>,
    {
        let mut subscription = Self::default();
        for pattern in patterns {
            validate_pattern(&pattern)?;
            subscription.root.insert(pattern.segments());
        }
        Ok(subscription)
    }

    /// Combines subscriptions into one matching any event one of them matches.
    pub fn union<'a, I>(subscriptions: I) -> Self
    where
        I: IntoIterator<Item = &'a Subscription>,
    {
        let mut combined = Self::default();
        for subscription in subscriptions {
            for pattern in subscription.query_types() {
                combined.root.insert(pattern.segments());
            }
        }
        combined
    }

    /// Returns true if the event type matches at least one pattern.
    pub fn matches(&self, event_type: &EventType) -> bool {
        self.root.matches(event_type.segments())
    }

    /// Returns the minimal list of patterns, in a stable order.
    pub fn query_types(&self) -> Vec<EventType> {
        let mut out = Vec::new();
        self.root.collect(&mut Vec::new(), &mut out);
        out
    }

    /// Returns true if the subscription has no patterns.
    pub fn is_empty(&self) -> bool {
        self.root == Node::default()
    }
}

impl Node {
    fn insert(&mut self, segments: &[String]) {
        if self.any_tail {
            return;
        }

        match segments.split_first() {
            None => self.terminal = true,
            Some((head, _)) if head == EventType::ANY_TAIL => {
                self.any_tail = true;
                self.terminal = false;
                self.children.clear();
            }
            Some((head, rest)) => self.children.entry(head.clone()).or_default().insert(rest),
        }
    }

    fn matches(&self, segments: &[String]) -> bool {
        if self.any_tail {
            return true;
        }

        match segments.split_first() {
            None => self.terminal,
            Some((head, rest)) => {
                let literal = self
                    .children
                    .get(head)
                    .is_some_and(|child| child.matches(rest));
                literal
                    || self
                        .children
                        .get(EventType::ANY_SEGMENT)
                        .is_some_and(|child| child.matches(rest))
            }
        }
    }

    fn collect(&self, prefix: &mut Vec<String>, out: &mut Vec<EventType>) {
        if self.any_tail {
            let mut pattern = prefix.clone();
            pattern.push(EventType::ANY_TAIL.to_string());
            out.push(EventType::new(pattern));
            return;
        }

        if self.terminal {
            out.push(EventType::new(prefix.clone()));
        }

        for (segment, child) in &self.children {
            prefix.push(segment.clone());
            child.collect(prefix, out);
            prefix.pop();
        }
    }
}

fn validate_pattern(pattern: &EventType) -> Result<(), ValidationError> {
    let segments = pattern.segments();
    for (i, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            return Err(ValidationError::empty_field("event_type segment"));
        }
        if segment == EventType::ANY_TAIL && i + 1 != segments.len() {
            return Err(ValidationError::invalid_format(
                "event_type",
                format!("'*' must be the last segment in {}", pattern),
            ));
        }
    }
    Ok(())
}
