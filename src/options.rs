//! Evaluator configuration. There is no daemon, no socket, and no config
//! file to parse here — the handful of coercion/strictness knobs the spec
//! leaves as open questions are just fields on a plain struct.

/// Tunables resolving the spec's open questions around coercion
/// strictness.
#[derive(Debug, Clone, Copy)]
pub struct EvalOptions {
    /// Whether `weak-int` may truncate a zero-fractional `Double` (and
    /// whether bitwise operators may coerce a `Double` operand at all).
    /// Lua 5.3 allows this; set to `false` to require operands already be
    /// integral.
    pub allow_double_to_int_coercion: bool,
    /// Log a `tracing::warn!` when a `<const>`/`<close>` attribute is seen
    /// on a local declaration (attributes are accepted syntactically but
    /// have no runtime effect in this evaluator).
    pub warn_on_ignored_attributes: bool,
}

impl Default for EvalOptions {
    fn default() -> Self {
        EvalOptions {
            allow_double_to_int_coercion: true,
            warn_on_ignored_attributes: true,
        }
    }
}
