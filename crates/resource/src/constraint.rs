//! Named compatibility constraints.
//!
//! A constraint is a value (string, integer, boolean or predicate) registered
//! under a key. Resources reference constraints from their dependency list
//! as `/key`, `/key:value`, `/key=value`, `/key!=value` or an ordering such
//! as `/key>=value`;
//! [`ConstraintRegistry::match_constraint`] evaluates the expression after
//! the leading slash.
//!
//! | registered | `key`   | `key=v` / `key==v` | `key!=v`  | `key:v`  | `>=` `>` `<=` `<` |
//! |------------|---------|--------------------|-----------|----------|-------------------|
//! | string     | pass    | equal              | not equal | equal    | fail              |
//! | integer    | pass    | equal              | not equal | at least | compare           |
//! | boolean    | value   | equal              | not equal | equal    | fail              |
//! | predicate  | `f("")` | `f(v)`             | `!f(v)`   | `f(v)`   | `f(v)`            |

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

/// Predicate constraint: receives the expression's value (empty for
/// presence checks) and writes a reason into the `String` when it fails.
pub type ConstraintPredicate = Arc<dyn Fn(&str, &mut String) -> bool + Send + Sync>;

/// A registered constraint value.
#[derive(Clone)]
pub enum ConstraintValue {
    /// Exact string value.
    String(String),
    /// Integer value; `key:n` means "at least n".
    Int(i64),
    /// Feature flag.
    Bool(bool),
    /// Custom predicate.
    Predicate(ConstraintPredicate),
}

impl fmt::Debug for ConstraintValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(v) => f.debug_tuple("String").field(v).finish(),
            Self::Int(v) => f.debug_tuple("Int").field(v).finish(),
            Self::Bool(v) => f.debug_tuple("Bool").field(v).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl From<&str> for ConstraintValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for ConstraintValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for ConstraintValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for ConstraintValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Outcome of [`ConstraintRegistry::match_constraint`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintMatch {
    /// The constraint holds.
    Pass,
    /// The constraint does not hold.
    Fail {
        /// Human-readable reason.
        reason: String,
    },
    /// No constraint is registered for the key, or enforcement is off. The
    /// caller applies its own default.
    NoConstraint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Present,
    Eq,
    Ne,
    Colon,
    AtLeast,
    Greater,
    AtMost,
    Less,
}

impl Operator {
    fn compare(self, actual: i64, wanted: i64) -> bool {
        match self {
            Self::Eq => actual == wanted,
            Self::Ne => actual != wanted,
            Self::Present | Self::Colon | Self::AtLeast => actual >= wanted,
            Self::Greater => actual > wanted,
            Self::AtMost => actual <= wanted,
            Self::Less => actual < wanted,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Self::Eq => "exactly",
            Self::Ne => "anything but",
            Self::Present | Self::Colon | Self::AtLeast => "at least",
            Self::Greater => "more than",
            Self::AtMost => "at most",
            Self::Less => "less than",
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
struct Expression<'a> {
    key: &'a str,
    op: Operator,
    value: &'a str,
}

impl<'a> Expression<'a> {
    fn parse(raw: &'a str) -> Option<Self> {
        let raw = raw.trim();
        let Some(split) = raw.find([':', '=', '!', '>', '<']) else {
            return (!raw.is_empty()).then_some(Self {
                key: raw,
                op: Operator::Present,
                value: "",
            });
        };

        let key = raw[..split].trim();
        let rest = &raw[split..];
        let (op, len) = if rest.starts_with("==") {
            (Operator::Eq, 2)
        } else if rest.starts_with("!=") {
            (Operator::Ne, 2)
        } else if rest.starts_with(">=") {
            (Operator::AtLeast, 2)
        } else if rest.starts_with("<=") {
            (Operator::AtMost, 2)
        } else if rest.starts_with('>') {
            (Operator::Greater, 1)
        } else if rest.starts_with('<') {
            (Operator::Less, 1)
        } else if rest.starts_with('=') {
            (Operator::Eq, 1)
        } else if rest.starts_with(':') {
            (Operator::Colon, 1)
        } else {
            return None;
        };

        if key.is_empty() {
            return None;
        }

        Some(Self {
            key,
            op,
            value: rest[len..].trim(),
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn verdict(ok: bool, reason: impl FnOnce() -> String) -> ConstraintMatch {
    if ok {
        ConstraintMatch::Pass
    } else {
        ConstraintMatch::Fail { reason: reason() }
    }
}

/// Registry of named constraints, shared by a resource manager.
pub struct ConstraintRegistry {
    constraints: RwLock<HashMap<String, ConstraintValue>>,
    enforcing: AtomicBool,
}

impl ConstraintRegistry {
    /// Create an empty, enforcing registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            constraints: RwLock::new(HashMap::new()),
            enforcing: AtomicBool::new(true),
        }
    }

    /// Register a constraint. A later registration for the same key replaces
    /// the earlier one.
    pub fn register(&self, key: impl Into<String>, value: impl Into<ConstraintValue>) {
        let key = key.into();
        let value = value.into();
        tracing::debug!(constraint = %key, value = ?value, "registered constraint");
        self.constraints.write().insert(key, value);
    }

    /// Register a predicate constraint under `key`.
    pub fn register_predicate<F>(&self, key: impl Into<String>, predicate: F)
    where
        F: Fn(&str, &mut String) -> bool + Send + Sync + 'static,
    {
        self.register(key, ConstraintValue::Predicate(Arc::new(predicate)));
    }

    /// Remove a constraint.
    pub fn unregister(&self, key: &str) -> Option<ConstraintValue> {
        self.constraints.write().remove(key)
    }

    /// Turn enforcement on or off. When off, every match is
    /// [`ConstraintMatch::NoConstraint`].
    pub fn set_enforcing(&self, enforcing: bool) {
        self.enforcing.store(enforcing, Ordering::Release);
    }

    /// Whether constraints are being enforced.
    #[must_use]
    pub fn is_enforcing(&self) -> bool {
        self.enforcing.load(Ordering::Acquire)
    }

    /// Evaluate a `key operator value` expression.
    #[must_use]
    pub fn match_constraint(&self, expression: &str) -> ConstraintMatch {
        if !self.is_enforcing() {
            return ConstraintMatch::NoConstraint;
        }

        let Some(expr) = Expression::parse(expression) else {
            return ConstraintMatch::Fail {
                reason: format!("malformed constraint expression '{expression}'"),
            };
        };

        // Clone out so a predicate may consult the registry itself.
        let Some(value) = self.constraints.read().get(expr.key).cloned() else {
            return ConstraintMatch::NoConstraint;
        };

        Self::evaluate(&expr, &value)
    }

    fn evaluate(expr: &Expression<'_>, registered: &ConstraintValue) -> ConstraintMatch {
        let key = expr.key;
        let wanted = expr.value;

        match (registered, expr.op) {
            (ConstraintValue::Predicate(predicate), op) => {
                let mut reason = String::new();
                let held = predicate(wanted, &mut reason);
                let ok = if op == Operator::Ne { !held } else { held };
                verdict(ok, || {
                    if reason.is_empty() {
                        format!("'{key}' rejected '{wanted}'")
                    } else {
                        reason
                    }
                })
            }

            (ConstraintValue::String(_) | ConstraintValue::Int(_), Operator::Present) => {
                ConstraintMatch::Pass
            }
            (ConstraintValue::Bool(actual), Operator::Present) => {
                verdict(*actual, || format!("'{key}' is disabled"))
            }

            (ConstraintValue::String(actual), Operator::Eq | Operator::Colon) => verdict(
                actual == wanted,
                || format!("'{key}' is '{actual}', required '{wanted}'"),
            ),
            (ConstraintValue::String(actual), Operator::Ne) => verdict(actual != wanted, || {
                format!("'{key}' must not be '{wanted}'")
            }),
            (
                ConstraintValue::String(_) | ConstraintValue::Bool(_),
                Operator::AtLeast | Operator::Greater | Operator::AtMost | Operator::Less,
            ) => {
                ConstraintMatch::Fail {
                    reason: format!("'{key}' is not numeric"),
                }
            }

            (ConstraintValue::Int(actual), op) => {
                let Ok(wanted_n) = wanted.parse::<i64>() else {
                    return ConstraintMatch::Fail {
                        reason: format!("'{wanted}' is not an integer (constraint '{key}')"),
                    };
                };
                verdict(op.compare(*actual, wanted_n), || {
                    format!("'{key}' is {actual}, required {} {wanted_n}", op.describe())
                })
            }

            (ConstraintValue::Bool(actual), op) => {
                let Some(wanted_b) = parse_bool(wanted) else {
                    return ConstraintMatch::Fail {
                        reason: format!("'{wanted}' is not a boolean (constraint '{key}')"),
                    };
                };
                let ok = if op == Operator::Ne {
                    *actual != wanted_b
                } else {
                    *actual == wanted_b
                };
                verdict(ok, || format!("'{key}' is {actual}"))
            }
        }
    }

    /// Number of registered constraints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.constraints.read().len()
    }

    /// Whether no constraints are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.constraints.read().is_empty()
    }
}

impl Default for ConstraintRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConstraintRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstraintRegistry")
            .field("count", &self.len())
            .field("enforcing", &self.is_enforcing())
            .finish()
    }
}
