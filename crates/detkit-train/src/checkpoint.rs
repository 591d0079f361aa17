use std::collections::HashMap;
use tracing::debug;

/// Key segment added by data-parallel wrappers around a model.
pub const MODULE_PREFIX: &str = "module.";

/// Remove every `module.` segment from checkpoint keys.
///
/// Order follows the first occurrence of each cleaned key. If two keys clean
/// to the same name, the later value replaces the earlier one in place.
pub fn strip_module_prefix<V>(entries: impl IntoIterator<Item = (String, V)>) -> Vec<(String, V)> {
    strip_prefix_with(entries, MODULE_PREFIX)
}

pub fn strip_prefix_with<V>(
    entries: impl IntoIterator<Item = (String, V)>,
    prefix: &str,
) -> Vec<(String, V)> {
    let mut out: Vec<(String, V)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut collisions = 0usize;

    for (key, value) in entries {
        let key = if prefix.is_empty() { key } else { key.replace(prefix, "") };
        match index.get(&key) {
            Some(&i) => {
                out[i].1 = value;
                collisions += 1;
            }
            None => {
                index.insert(key.clone(), out.len());
                out.push((key, value));
            }
        }
    }

    if collisions > 0 {
        debug!("checkpoint: {} keys collided after stripping {:?}", collisions, prefix);
    }
    out
}
