use logmon_common::{DescriptorError, ReattachDescriptor};

use crate::interfaces::HookState;

/// Hook state key holding the plugin's JSON reattach descriptor.
pub const REATTACH_KEY: &str = "reattach_config";

/// A missing state, a missing key and an empty value all mean "nothing to
/// reattach to". Only a present but malformed value is an error.
pub fn reattach_descriptor_from_state(
    state: Option<&HookState>,
) -> Result<Option<ReattachDescriptor>, DescriptorError> {
    match state.and_then(|s| s.get(REATTACH_KEY)) {
        Some(raw) if !raw.is_empty() => ReattachDescriptor::from_json(raw).map(Some),
        _ => Ok(None),
    }
}

pub fn state_with_descriptor(descriptor: &ReattachDescriptor) -> Result<HookState, DescriptorError> {
    let mut state = HookState::new();
    state.insert(REATTACH_KEY.to_string(), descriptor.to_json()?);
    Ok(state)
}
