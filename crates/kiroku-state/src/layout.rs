//! Layout cleanup.

use tracing::debug;

use crate::DocumentState;

/// Flattens every `Div` wrapper back into its parent. Returns the number of
/// wrappers removed. The next normalization with layouts rebuilds whatever
/// wrappers are still needed.
pub fn cleanup_layouts(state: &mut DocumentState) -> usize {
    let mut removed = 0;
    for id in state.tree_ids() {
        let Some(block) = state.pick(&id) else { continue };
        if block.is_div_wrapper() {
            continue;
        }
        let mut flat = Vec::with_capacity(block.children_ids.len());
        let mut stack: Vec<&str> = block.children_ids.iter().rev().map(String::as_str).collect();
        let mut wrappers = 0;
        while let Some(child_id) = stack.pop() {
            match state.pick(child_id) {
                Some(child) if child.is_div_wrapper() => {
                    wrappers += 1;
                    stack.extend(child.children_ids.iter().rev().map(String::as_str));
                }
                _ => flat.push(child_id.to_string()),
            }
        }
        if wrappers > 0 {
            state.set_children(&id, flat);
            removed += wrappers;
        }
    }
    if removed > 0 {
        debug!(removed, "div wrappers flattened");
    }
    removed
}
