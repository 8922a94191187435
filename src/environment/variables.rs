use crate::codec::KeyValues;

/// Interpolate `{{key}}` placeholders in a string using the provided variable map.
/// Unknown placeholders are left as they are. Substituted values are never
/// scanned again, so a value containing `{{other}}` is inserted literally.
pub fn interpolate(input: &str, variables: &KeyValues) -> String {
    if !input.contains("{{") {
        return input.to_string();
    }
    let mut result = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("{{") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            result.push_str(&rest[start..]);
            return result;
        };
        let name = &after[..end];
        match variables.get(name) {
            Some(value) if !name.is_empty() => result.push_str(value),
            _ => {
                result.push_str("{{");
                result.push_str(name);
                result.push_str("}}");
            }
        }
        rest = &after[end + 2..];
    }
    result.push_str(rest);
    result
}

/// Interpolate both names and values of a header map.
pub fn interpolate_map(input: &KeyValues, variables: &KeyValues) -> KeyValues {
    input
        .iter()
        .map(|(k, v)| (interpolate(k, variables), interpolate(v, variables)))
        .collect()
}
