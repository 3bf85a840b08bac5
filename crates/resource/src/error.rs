//! Error types for resource lifecycle operations
use citadel_eventbus::{BoxError, HandlerError};
use thiserror::Error;

use crate::resource::ResourceState;

/// Result type for resource operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for resource lifecycle, mounting and dependency resolution.
///
/// Every variant is recoverable and is returned to the immediate caller.
#[derive(Error, Debug)]
pub enum Error {
    /// Operation is illegal for the resource's current state
    #[error("Cannot {operation} resource '{resource}' while it is {state}")]
    InvalidState {
        /// The resource name
        resource: String,
        /// The state the resource was in
        state: ResourceState,
        /// The attempted operation
        operation: &'static str,
    },

    /// A resource with this name is already registered
    #[error("Resource '{name}' is already registered")]
    DuplicateName {
        /// The conflicting name
        name: String,
    },

    /// The dependency graph reachable from a starting resource has a cycle
    #[error("Cyclic dependency detected while starting '{resource}': {cycle}")]
    CyclicDependency {
        /// The resource whose dependency closed the cycle
        resource: String,
        /// The cycle, rendered as `a -> b -> a`
        cycle: String,
    },

    /// A declared dependency does not resolve to a registered resource
    #[error("Resource '{resource}' depends on '{dependency}', which is not registered")]
    MissingDependency {
        /// The resource being started
        resource: String,
        /// The unresolved dependency name
        dependency: String,
    },

    /// A dependency resolved but failed to start
    #[error("Dependency '{dependency}' of resource '{resource}' failed to start")]
    DependencyStartFailed {
        /// The resource being started
        resource: String,
        /// The dependency that failed
        dependency: String,
        /// Why the dependency failed
        #[source]
        source: Box<Error>,
    },

    /// A dependency constraint (`/key:value`) did not hold
    #[error("Constraint '{constraint}' of resource '{resource}' failed: {reason}")]
    ConstraintFailed {
        /// The resource being started
        resource: String,
        /// The constraint expression
        constraint: String,
        /// Why the constraint failed
        reason: String,
    },

    /// An `OnStart` handler canceled the start without a typed reason
    #[error("Start of resource '{resource}' was canceled: {reason}")]
    StartCanceled {
        /// The resource being started
        resource: String,
        /// The cancellation reason
        reason: String,
    },

    /// The URI could not be parsed
    #[error("Invalid resource URI '{uri}': {reason}")]
    InvalidUri {
        /// The offending URI
        uri: String,
        /// The parse failure
        reason: String,
    },

    /// No mounter claims the URI's scheme
    #[error("No mounter handles scheme '{scheme}' of '{uri}'")]
    UnresolvableScheme {
        /// The URI
        uri: String,
        /// The unclaimed scheme
        scheme: String,
    },

    /// A mounter failed while loading
    #[error("Mounter failed to load '{uri}': {reason}")]
    MounterFailed {
        /// The URI being loaded
        uri: String,
        /// The failure reason
        reason: String,
        /// The underlying error
        #[source]
        source: Option<BoxError>,
    },

    /// The resource must be stopped for this operation
    #[error("Resource '{resource}' is busy ({state}); stop it first")]
    Busy {
        /// The resource name
        resource: String,
        /// The state it was in
        state: ResourceState,
    },

    /// A handler failed
    #[error("Handler for '{event}' failed in resource '{resource}'")]
    Handler {
        /// The resource the handler belongs to
        resource: String,
        /// The event or export being handled
        event: String,
        /// The handler failure
        #[source]
        source: HandlerError,
    },

    /// No resource with this name is registered
    #[error("Resource '{name}' is not registered")]
    NotFound {
        /// The requested name
        name: String,
    },

    /// The export is not declared in the resource's manifest
    #[error("Resource '{resource}' does not declare export '{export}'")]
    ExportNotDeclared {
        /// The resource name
        resource: String,
        /// The export name
        export: String,
    },

    /// The export cannot be called right now
    #[error("Export '{export}' of resource '{resource}' is unavailable: {reason}")]
    ExportUnavailable {
        /// The resource name
        resource: String,
        /// The export name
        export: String,
        /// Why it is unavailable
        reason: String,
    },

    /// Manager configuration is invalid
    #[error("Configuration error: {message}")]
    Configuration {
        /// The error message
        message: String,
    },
}

impl Error {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a mounter failure without an underlying source
    pub fn mounter_failed(uri: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MounterFailed {
            uri: uri.into(),
            reason: reason.into(),
            source: None,
        }
    }

    /// Stable, snake_case name of the error kind, used as a log field
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidState { .. } => "invalid_state",
            Self::DuplicateName { .. } => "duplicate_name",
            Self::CyclicDependency { .. } => "cyclic_dependency",
            Self::MissingDependency { .. } => "missing_dependency",
            Self::DependencyStartFailed { .. } => "dependency_start_failed",
            Self::ConstraintFailed { .. } => "constraint_failed",
            Self::StartCanceled { .. } => "start_canceled",
            Self::InvalidUri { .. } => "invalid_uri",
            Self::UnresolvableScheme { .. } => "unresolvable_scheme",
            Self::MounterFailed { .. } => "mounter_failed",
            Self::Busy { .. } => "busy",
            Self::Handler { .. } => "handler",
            Self::NotFound { .. } => "not_found",
            Self::ExportNotDeclared { .. } => "export_not_declared",
            Self::ExportUnavailable { .. } => "export_unavailable",
            Self::Configuration { .. } => "configuration",
        }
    }

    /// The resource this error concerns (if any)
    #[must_use]
    pub fn resource_name(&self) -> Option<&str> {
        match self {
            Self::InvalidUri { .. }
            | Self::UnresolvableScheme { .. }
            | Self::MounterFailed { .. }
            | Self::Configuration { .. } => None,
            Self::DuplicateName { name } | Self::NotFound { name } => Some(name),
            Self::InvalidState { resource, .. }
            | Self::CyclicDependency { resource, .. }
            | Self::MissingDependency { resource, .. }
            | Self::DependencyStartFailed { resource, .. }
            | Self::ConstraintFailed { resource, .. }
            | Self::StartCanceled { resource, .. }
            | Self::Busy { resource, .. }
            | Self::Handler { resource, .. }
            | Self::ExportNotDeclared { resource, .. }
            | Self::ExportUnavailable { resource, .. } => Some(resource),
        }
    }

    /// The dependency at fault, for dependency-resolution errors
    #[must_use]
    pub fn dependency(&self) -> Option<&str> {
        match self {
            Self::MissingDependency { dependency, .. }
            | Self::DependencyStartFailed { dependency, .. } => Some(dependency),
            Self::ConstraintFailed { constraint, .. } => Some(constraint),
            _ => None,
        }
    }
}
