//! Dependency closure computation over the function registry

use std::collections::HashSet;
use std::vec;

use tracing::{debug, trace};

use crate::error::ResolveError;
use crate::registry::{RawFunction, Registry};

/// A function whose references are still being expanded
struct Frame {
    name: String,
    pending: vec::IntoIter<String>,
}

impl Frame {
    fn new(function: &RawFunction) -> Self {
        Self {
            name: function.name.clone(),
            pending: function.dependencies().into_iter(),
        }
    }
}

/// Computes the ordered set of functions that must exist for a function to compile
pub struct DependencyResolver<'a> {
    registry: &'a Registry,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    /// Full closure of `start`, including `start` itself as the last element.
    pub fn closure(&self, start: &str) -> Result<Vec<String>, ResolveError> {
        self.resolve(&HashSet::new(), start)
    }

    /// Resolve `start`, treating every name in `visited` as already available.
    ///
    /// The result lists each newly reached name once, dependencies before the
    /// functions that call them, in depth-first post-order following the order
    /// references appear across the definitions. Names in `visited` are never
    /// expanded or returned. A cycle is cut at the first name seen twice, so in
    /// that case one member of the cycle precedes a dependency of its own.
    pub fn resolve(
        &self,
        visited: &HashSet<String>,
        start: &str,
    ) -> Result<Vec<String>, ResolveError> {
        let root = self
            .registry
            .get(start)
            .ok_or_else(|| ResolveError::UnknownFunction(start.to_string()))?;

        let mut visited = visited.clone();
        let mut order = Vec::new();

        if !visited.insert(root.name.clone()) {
            debug!("{} already available, nothing to resolve", start);
            return Ok(order);
        }

        let mut stack = vec![Frame::new(root)];

        while let Some(frame) = stack.last_mut() {
            match frame.pending.next() {
                Some(dependency) => {
                    if visited.contains(&dependency) {
                        trace!("{} -> {} (already visited)", frame.name, dependency);
                        continue;
                    }

                    let function = self.registry.get(&dependency).ok_or_else(|| {
                        ResolveError::UnresolvedReference {
                            function: frame.name.clone(),
                            reference: dependency.clone(),
                        }
                    })?;

                    trace!("{} -> {}", frame.name, dependency);
                    visited.insert(dependency);
                    stack.push(Frame::new(function));
                }
                None => {
                    if let Some(done) = stack.pop() {
                        order.push(done.name);
                    }
                }
            }
        }

        debug!("Resolved {} into {:?}", start, order);
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn function(name: &str, body: &str) -> RawFunction {
        RawFunction::new("udf", name, vec![format!("CREATE TEMP FUNCTION udf.{name}() AS ({body})")])
    }

    #[test]
    fn test_chain_orders_dependencies_first() {
        let registry = Registry::from_functions([
            function("a", "udf.b()"),
            function("b", "udf_c()"),
            function("c", "1"),
        ])
        .unwrap();

        let order = DependencyResolver::new(&registry).closure("udf.a").unwrap();
        assert_eq!(order, vec!["udf.c", "udf.b", "udf.a"]);
    }

    #[test]
    fn test_reference_order_is_text_order() {
        let registry = Registry::from_functions([
            function("a", "udf.c() + udf.b()"),
            function("b", "1"),
            function("c", "1"),
        ])
        .unwrap();

        let order = DependencyResolver::new(&registry).closure("udf.a").unwrap();
        assert_eq!(order, vec!["udf.c", "udf.b", "udf.a"]);
    }

    #[test]
    fn test_mutual_cycle_terminates() {
        let registry =
            Registry::from_functions([function("a", "udf.b()"), function("b", "udf.a()")])
                .unwrap();

        let order = DependencyResolver::new(&registry).closure("udf.a").unwrap();
        assert_eq!(order, vec!["udf.b", "udf.a"]);
    }

    #[test]
    fn test_self_reference() {
        let registry = Registry::from_functions([function("a", "udf.a()")]).unwrap();
        let order = DependencyResolver::new(&registry).closure("udf.a").unwrap();
        assert_eq!(order, vec!["udf.a"]);
    }

    #[test]
    fn test_visited_names_are_skipped() {
        let registry = Registry::from_functions([
            function("a", "udf.b() + udf.c()"),
            function("b", "udf.c()"),
            function("c", "1"),
        ])
        .unwrap();

        let visited: HashSet<String> = ["udf.c".to_string()].into();
        let order = DependencyResolver::new(&registry)
            .resolve(&visited, "udf.a")
            .unwrap();
        assert_eq!(order, vec!["udf.b", "udf.a"]);

        let visited: HashSet<String> = ["udf.a".to_string()].into();
        let order = DependencyResolver::new(&registry)
            .resolve(&visited, "udf.a")
            .unwrap();
        assert!(order.is_empty());
    }

    #[test]
    fn test_unresolved_reference() {
        let registry =
            Registry::from_functions([function("a", "udf.b()"), function("b", "udf.missing(1)")])
                .unwrap();

        let err = DependencyResolver::new(&registry).closure("udf.a").unwrap_err();
        assert_eq!(
            err,
            ResolveError::UnresolvedReference {
                function: "udf.b".to_string(),
                reference: "udf.missing".to_string(),
            }
        );
    }

    #[test]
    fn test_unknown_start() {
        let registry = Registry::new();
        let err = DependencyResolver::new(&registry).closure("udf.nope").unwrap_err();
        assert_eq!(err, ResolveError::UnknownFunction("udf.nope".to_string()));
    }
}
