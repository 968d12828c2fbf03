//! Multi-error accumulator for fan-in boundaries
//!
//! Every task of a pairing records its terminal error here; the aggregate
//! is what `Proxy::run` hands back. Handles are cheap clones sharing one
//! mutex-guarded list.

use crate::error::ProxyError;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Rendering of an empty aggregate
const EMPTY: &str = "N/A";

/// Concurrent-safe, append-only error list
#[derive(Debug, Default, Clone)]
pub struct Errors {
    errs: Arc<Mutex<Vec<ProxyError>>>,
}

impl Errors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one error.
    pub fn add(&self, err: ProxyError) {
        self.errs.lock().expect("errors mutex").push(err);
    }

    /// Moves every error of `other` into this aggregate.
    pub fn absorb(&self, other: Errors) {
        let mut drained = {
            let mut errs = other.errs.lock().expect("errors mutex");
            std::mem::take(&mut *errs)
        };
        self.errs.lock().expect("errors mutex").append(&mut drained);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.errs.lock().expect("errors mutex").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errs.lock().expect("errors mutex").is_empty()
    }

    /// True when any recorded error satisfies `predicate`.
    #[must_use]
    pub fn any<F>(&self, predicate: F) -> bool
    where
        F: Fn(&ProxyError) -> bool,
    {
        self.errs.lock().expect("errors mutex").iter().any(predicate)
    }
}

impl fmt::Display for Errors {
    /// Joins the recorded errors with `,`; an empty aggregate renders as
    /// `N/A`. Equality in tests is by this rendering, not identity.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let errs = self.errs.lock().expect("errors mutex");
        if errs.is_empty() {
            return f.write_str(EMPTY);
        }

        let rendered: Vec<String> = errs.iter().map(ToString::to_string).collect();
        f.write_str(&rendered.join(","))
    }
}

impl std::error::Error for Errors {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_renders_sentinel() {
        assert_eq!(Errors::new().to_string(), "N/A");
    }

    #[test]
    fn test_joined_with_comma() {
        let errs = Errors::new();
        errs.add(ProxyError::ClientDisconnect);
        errs.add(ProxyError::BrokerDisconnect);
        assert_eq!(errs.to_string(), "client disconnect,broker disconnect");
    }

    #[test]
    fn test_absorb_moves_entries() {
        let sink = Errors::new();
        let source = Errors::new();
        source.add(ProxyError::ClientDisconnect);
        source.add(ProxyError::WriteTimeout);

        sink.absorb(source.clone());
        assert_eq!(sink.len(), 2);
        assert!(source.is_empty());
    }

    #[test]
    fn test_concurrent_adds_all_recorded() {
        let errs = Errors::new();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let errs = errs.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    errs.add(ProxyError::ClientDisconnect);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(errs.len(), 800);
    }

    #[test]
    fn test_rendering_is_order_of_insertion_but_set_stable() {
        // Commutativity is by set equality of the rendered parts.
        let a = Errors::new();
        a.add(ProxyError::ClientDisconnect);
        a.add(ProxyError::BrokerDisconnect);

        let b = Errors::new();
        b.add(ProxyError::BrokerDisconnect);
        b.add(ProxyError::ClientDisconnect);

        let set = |errs: &Errors| {
            let rendered = errs.to_string();
            let mut parts: Vec<_> = rendered.split(',').map(str::to_string).collect();
            parts.sort();
            parts
        };
        assert_eq!(set(&a), set(&b));
    }
}
