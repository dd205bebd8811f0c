//! Prompt templates compiled into the binary from `.pmt` files.

use tracing::debug;

pub const PRE_PLANNING: &str = include_str!("../../prompts/pre_planning.pmt");
pub const PLANNING: &str = include_str!("../../prompts/planning.pmt");
pub const EXECUTION: &str = include_str!("../../prompts/execution.pmt");
pub const REFLECTION: &str = include_str!("../../prompts/reflection.pmt");
pub const VERIFICATION: &str = include_str!("../../prompts/verification.pmt");
pub const ENVIRONMENT_REPAIR: &str = include_str!("../../prompts/environment_repair.pmt");

pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    match name {
        "pre_planning" => Some(PRE_PLANNING),
        "planning" => Some(PLANNING),
        "execution" => Some(EXECUTION),
        "reflection" => Some(REFLECTION),
        "verification" => Some(VERIFICATION),
        "environment_repair" => Some(ENVIRONMENT_REPAIR),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_phase_template_is_embedded() {
        for name in ["pre_planning", "planning", "execution", "reflection", "verification", "environment_repair"] {
            assert!(get_embedded(name).is_some(), "missing embedded template: {name}");
        }
    }

    #[test]
    fn unknown_template_returns_none() {
        assert!(get_embedded("unknown").is_none());
    }
}
