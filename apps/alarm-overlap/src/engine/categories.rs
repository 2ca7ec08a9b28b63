use std::collections::BTreeSet;

/// Orders observed categories for column layout.
///
/// Categories named in `priority` come first, in that order; the rest follow
/// in ascending lexical order. Priority entries never observed are left out
/// and repeated entries appear once.
pub fn order_categories<'a>(
    observed: impl IntoIterator<Item = &'a str>,
    priority: &[String],
) -> Vec<String> {
    let mut remaining: BTreeSet<&str> = observed.into_iter().collect();
    let mut ordered = Vec::with_capacity(remaining.len());

    for name in priority {
        if remaining.remove(name.as_str()) {
            ordered.push(name.clone());
        }
    }
    ordered.extend(remaining.into_iter().map(str::to_string));
    ordered
}
