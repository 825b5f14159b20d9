//! Deterministic image tag derivation.

use crate::error::CoreError;

/// Version tag used when a project declares no version axes.
pub const DEFAULT_VERSION_TAG: &str = "latest";

/// Join the version components of a variant with `-`.
pub fn make_version_tag<S: AsRef<str>>(versions: &[S]) -> String {
    if versions.is_empty() {
        return DEFAULT_VERSION_TAG.to_string();
    }
    versions
        .iter()
        .map(|v| v.as_ref())
        .collect::<Vec<_>>()
        .join("-")
}

/// Build `{name}:{tag}`.
pub fn make_image_name(name: &str, tag: &str) -> String {
    format!("{}:{}", name, tag)
}

/// Turn an image tag into something usable as a file name.
pub fn sanitize_tag(tag: &str) -> String {
    tag.chars()
        .map(|c| match c {
            '/' | ':' | '@' => '_',
            c => c,
        })
        .collect()
}

/// Check that `component` can be used as one part of an image tag:
/// non-empty, without whitespace, `:` or `@`.
pub fn check_tag_component(component: &str) -> Result<&str, CoreError> {
    let invalid = component.is_empty()
        || component
            .chars()
            .any(|c| c.is_whitespace() || c == ':' || c == '@');
    if invalid {
        return Err(CoreError::InvalidTag(component.to_string()));
    }
    Ok(component)
}

/// Check a repository part of an image name (project, group, experiment).
/// On top of [`check_tag_component`], repository names must be lowercase.
pub fn check_name_component(component: &str) -> Result<&str, CoreError> {
    check_tag_component(component)?;
    if component.chars().any(|c| c.is_uppercase()) {
        return Err(CoreError::InvalidTag(component.to_string()));
    }
    Ok(component)
}
