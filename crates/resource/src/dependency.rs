//! Dependency resolution: the `OnStart` handler that starts every declared
//! dependency before the rest of a resource's start logic runs.
//!
//! [`Resource::start`] pushes the resource onto a thread-local stack for as
//! long as it is `Starting`. Reaching a dependency already on the stack is a
//! cycle, whether it was reached through the resolver or through another
//! `OnStart` handler that started a resource.

use std::cell::RefCell;
use std::sync::Weak;

use citadel_eventbus::priority;

use crate::constraint::ConstraintMatch;
use crate::error::{Error, Result};
use crate::manager::ResourceManager;
use crate::resource::Resource;

/// Prefix marking a dependency entry as a constraint expression.
pub const CONSTRAINT_PREFIX: char = '/';

thread_local! {
    static STARTING: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// Keeps a resource on the starting stack; pops it on drop, even on unwind.
pub(crate) struct StartingGuard;

impl StartingGuard {
    pub(crate) fn enter(name: &str) -> Self {
        STARTING.with_borrow_mut(|stack| stack.push(name.to_owned()));
        Self
    }
}

impl Drop for StartingGuard {
    fn drop(&mut self) {
        STARTING.with_borrow_mut(|stack| {
            stack.pop();
        });
    }
}

/// If `dependency` is already starting, render the cycle it closes.
fn cycle_through(dependency: &str) -> Option<String> {
    STARTING.with_borrow(|stack| {
        let start = stack.iter().position(|name| name == dependency)?;
        let mut path: Vec<&str> = stack[start..].iter().map(String::as_str).collect();
        path.push(dependency);
        Some(path.join(" -> "))
    })
}

/// Connect the resolver to `resource` at the earliest priority.
pub(crate) fn attach(resource: &Resource, manager: Weak<ResourceManager>) {
    resource.on_start().connect(priority::FIRST, move |res, ctx| {
        let Some(manager) = manager.upgrade() else {
            return Ok(());
        };
        if let Err(err) = resolve(res, &manager) {
            ctx.cancel_with(err);
        }
        Ok(())
    });
}

/// Start every dependency of `resource`, checking constraints along the way.
pub fn resolve(resource: &Resource, manager: &ResourceManager) -> Result<()> {
    for dependency in resource.manifest().dependencies() {
        if let Some(expression) = dependency.strip_prefix(CONSTRAINT_PREFIX) {
            check_constraint(resource, manager, expression)?;
            continue;
        }

        if let Some(cycle) = cycle_through(dependency) {
            return Err(Error::CyclicDependency {
                resource: resource.name().to_owned(),
                cycle,
            });
        }

        let Some(target) = manager.get_resource(dependency) else {
            return Err(Error::MissingDependency {
                resource: resource.name().to_owned(),
                dependency: dependency.to_owned(),
            });
        };

        tracing::debug!(resource = %resource.name(), dependency, "starting dependency");
        match target.start() {
            Ok(()) => {}
            Err(err @ Error::CyclicDependency { .. }) => return Err(err),
            Err(err) => {
                return Err(Error::DependencyStartFailed {
                    resource: resource.name().to_owned(),
                    dependency: dependency.to_owned(),
                    source: Box::new(err),
                });
            }
        }
    }

    Ok(())
}

fn check_constraint(resource: &Resource, manager: &ResourceManager, expression: &str) -> Result<()> {
    match manager.constraints().match_constraint(expression) {
        ConstraintMatch::Pass | ConstraintMatch::NoConstraint => Ok(()),
        ConstraintMatch::Fail { reason } => Err(Error::ConstraintFailed {
            resource: resource.name().to_owned(),
            constraint: expression.to_owned(),
            reason,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_tracks_the_starting_path() {
        assert!(cycle_through("a").is_none());
        {
            let _a = StartingGuard::enter("a");
            let _b = StartingGuard::enter("b");
            assert_eq!(cycle_through("a").as_deref(), Some("a -> b -> a"));
            assert_eq!(cycle_through("b").as_deref(), Some("b -> b"));
            assert!(cycle_through("c").is_none());
        }
        assert!(cycle_through("a").is_none());
    }
}
