//! Capabilities advertised by the bridge.

use crate::protocol::Capabilities;

/// Build the capability set returned in the `initialize` response.
///
/// Every flag is stated explicitly, including the unsupported ones, so
/// clients never have to guess at a default.
pub fn bridge_capabilities() -> Capabilities {
    Capabilities {
        supports_configuration_done_request: Some(true),
        supports_conditional_breakpoints: Some(true),
        supports_hit_conditional_breakpoints: Some(false),
        supports_evaluate_for_hovers: Some(true),
        supports_step_back: Some(false),
        supports_set_variable: Some(false),
        supports_data_breakpoints: Some(true),
        supports_completions_request: Some(false),
        supports_cancel_request: Some(false),
        supports_breakpoint_locations_request: Some(false),
        supports_step_in_targets_request: Some(false),
        supports_read_memory_request: Some(false),
        supports_terminate_threads_request: Some(true),
        supports_terminate_request: Some(false),
    }
}
